//! Execution-mode selection for auxiliary periodic loops.
//!
//! Loops outside the cycle engine (scan polling, housekeeping) pick a wait
//! strategy based on their interval and the platform's RT capabilities.

use std::time::Duration;

use crate::rt;

/// Timing thresholds shared by the loop implementations.
pub mod timing {
    use std::time::Duration;

    /// Spin duration for HYBRID mode before blocking.
    pub const HYBRID_SPIN: Duration = Duration::from_micros(100);

    /// Blocking timeout in HYBRID mode after the spin phase.
    pub const HYBRID_BLOCK_TIMEOUT: Duration = Duration::from_millis(10);

    /// Below this interval, precise software timing is required.
    pub const HIGH_RATE_THRESHOLD: Duration = Duration::from_millis(1);

    /// Below this interval, the spin-then-block approach pays off.
    pub const HYBRID_THRESHOLD: Duration = Duration::from_millis(5);

    /// Event-driven wait timeout, bounding breaker-check latency.
    pub const EVENT_DRIVEN_TIMEOUT: Duration = Duration::from_millis(100);
}

/// Wait strategy for a periodic loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Continuous polling without sleeping. Lowest latency, 100% CPU.
    BusyWait,
    /// Tight polling loop with precise software timing.
    HighRate,
    /// Event-driven with RT thread configuration applied.
    RtEvent,
    /// Spin briefly, then block on events.
    Hybrid,
    /// Block immediately on events. Lowest CPU usage, highest latency.
    EventDriven,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::BusyWait => "BUSY_WAIT",
            Self::HighRate => "HIGH_RATE",
            Self::RtEvent => "RT_EVENT",
            Self::Hybrid => "HYBRID",
            Self::EventDriven => "EVENT_DRIVEN",
        };
        write!(f, "{s}")
    }
}

/// Selects the execution mode for a loop with the given interval.
/// Never returns `BusyWait`; that mode is opt-in only.
pub fn select_mode(interval: Option<Duration>) -> ExecutionMode {
    let Some(interval) = interval else {
        return ExecutionMode::EventDriven;
    };
    if interval < timing::HIGH_RATE_THRESHOLD {
        return if rt::capabilities().any() {
            ExecutionMode::RtEvent
        } else {
            ExecutionMode::HighRate
        };
    }
    if interval < timing::HYBRID_THRESHOLD {
        return ExecutionMode::Hybrid;
    }
    ExecutionMode::EventDriven
}

/// Resolves automatic CPU affinity for a mode: RT-like modes pin to the
/// last hardware core when more than one exists.
pub fn auto_affinity(mode: ExecutionMode) -> i32 {
    match mode {
        ExecutionMode::RtEvent | ExecutionMode::HighRate | ExecutionMode::Hybrid => {
            rt::resolve_auto_affinity()
        }
        _ => rt::CPU_AFFINITY_NONE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_interval_is_event_driven() {
        assert_eq!(select_mode(None), ExecutionMode::EventDriven);
    }

    #[test]
    fn sub_millisecond_is_rt_or_high_rate() {
        let mode = select_mode(Some(Duration::from_micros(500)));
        assert!(matches!(
            mode,
            ExecutionMode::RtEvent | ExecutionMode::HighRate
        ));
    }

    #[test]
    fn low_millisecond_is_hybrid() {
        assert_eq!(
            select_mode(Some(Duration::from_millis(2))),
            ExecutionMode::Hybrid
        );
    }

    #[test]
    fn slow_intervals_are_event_driven() {
        assert_eq!(
            select_mode(Some(Duration::from_millis(5))),
            ExecutionMode::EventDriven
        );
        assert_eq!(
            select_mode(Some(Duration::from_secs(1))),
            ExecutionMode::EventDriven
        );
    }

    #[test]
    fn event_driven_never_pins() {
        assert_eq!(
            auto_affinity(ExecutionMode::EventDriven),
            rt::CPU_AFFINITY_NONE
        );
    }
}
