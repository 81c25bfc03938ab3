//! Real-time thread configuration.
//!
//! Applies scheduling class, priority, CPU affinity, and memory locking to
//! the current thread. Everything is best-effort: features that the
//! platform does not support or the process lacks permissions for are
//! logged and skipped, never turned into hard failures. Callers that need
//! to know up front what will stick query [`capabilities`].
//!
//! Linux gets the full implementation (SCHED_FIFO, SCHED_DEADLINE,
//! `sched_setaffinity`, `mlockall`); every other platform compiles a no-op
//! fallback whose capability snapshot reports nothing as supported.

use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[cfg(target_os = "linux")]
#[path = "rt/linux.rs"]
mod platform;
#[cfg(not(target_os = "linux"))]
#[path = "rt/fallback.rs"]
mod platform;

/// Default real-time priority for SCHED_FIFO (range 1-99).
pub const DEFAULT_RT_PRIORITY: i32 = 47;

/// Sentinel requesting automatic CPU affinity selection (last core).
pub const CPU_AFFINITY_AUTO: i32 = -1;

/// Sentinel disabling CPU pinning.
pub const CPU_AFFINITY_NONE: i32 = -2;

/// Default period for deadline scheduling when none is configured (1 ms).
pub const DEFAULT_RT_PERIOD: Duration = Duration::from_millis(1);

/// Default computation budget per period (200 µs).
pub const DEFAULT_RT_COMPUTATION: Duration = Duration::from_micros(200);

/// Default deadline within the period (500 µs).
pub const DEFAULT_RT_DEADLINE: Duration = Duration::from_micros(500);

/// A single RT feature with platform support and permission status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capability {
    /// The platform implements the feature.
    pub supported: bool,
    /// The current process may use it.
    pub permitted: bool,
}

impl Capability {
    /// True when the feature is both supported and permitted.
    pub fn ok(&self) -> bool {
        self.supported && self.permitted
    }

    /// True when only permissions stand in the way.
    pub fn missing_permissions(&self) -> bool {
        self.supported && !self.permitted
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.supported {
            write!(f, "not supported")
        } else if self.permitted {
            write!(f, "yes")
        } else {
            write!(f, "no (missing permissions)")
        }
    }
}

/// Snapshot of the RT features available to the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct RtCapabilities {
    /// Priority-based scheduling (SCHED_FIFO).
    pub priority_scheduling: Capability,
    /// Deadline-based scheduling (SCHED_DEADLINE).
    pub deadline_scheduling: Capability,
    /// Hard CPU affinity pinning.
    pub cpu_affinity: Capability,
    /// Memory page locking (mlockall).
    pub memory_locking: Capability,
}

impl RtCapabilities {
    /// True if any RT scheduling feature is available and permitted.
    pub fn any(&self) -> bool {
        self.priority_scheduling.ok() || self.deadline_scheduling.ok()
    }

    /// True when supported features are blocked only by permissions.
    pub fn has_permission_issues(&self) -> bool {
        self.priority_scheduling.missing_permissions()
            || self.deadline_scheduling.missing_permissions()
            || self.memory_locking.missing_permissions()
    }
}

impl fmt::Display for RtCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "real-time capabilities:")?;
        writeln!(f, "  priority scheduling: {}", self.priority_scheduling)?;
        writeln!(f, "  deadline scheduling: {}", self.deadline_scheduling)?;
        writeln!(f, "  cpu affinity: {}", self.cpu_affinity)?;
        write!(f, "  memory locking: {}", self.memory_locking)
    }
}

/// Queries platform RT capabilities. Cached after the first call.
pub fn capabilities() -> RtCapabilities {
    static CAPS: OnceLock<RtCapabilities> = OnceLock::new();
    *CAPS.get_or_init(platform::capabilities)
}

/// Real-time properties to apply to a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtConfig {
    /// Whether to enable real-time scheduling. Requires CAP_SYS_NICE or
    /// root on Linux.
    pub enabled: bool,
    /// Real-time priority (1-99, higher preempts lower).
    pub priority: i32,
    /// CPU core to pin to. `>= 0` explicit, [`CPU_AFFINITY_AUTO`], or
    /// [`CPU_AFFINITY_NONE`].
    pub cpu_affinity: i32,
    /// Lock all current and future pages. Requires CAP_IPC_LOCK.
    pub lock_memory: bool,
    /// Cycle period [µs] for deadline scheduling.
    pub period_us: u64,
    /// CPU budget per period [µs] for deadline scheduling.
    pub computation_us: u64,
    /// Completion deadline within the period [µs].
    pub deadline_us: u64,
    /// Prefer SCHED_DEADLINE over SCHED_FIFO when timing is specified.
    pub prefer_deadline_scheduler: bool,
}

impl Default for RtConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            priority: DEFAULT_RT_PRIORITY,
            cpu_affinity: CPU_AFFINITY_NONE,
            lock_memory: false,
            period_us: 0,
            computation_us: 0,
            deadline_us: 0,
            prefer_deadline_scheduler: false,
        }
    }
}

impl RtConfig {
    /// The configured period.
    pub fn period(&self) -> Duration {
        Duration::from_micros(self.period_us)
    }

    /// The configured computation budget.
    pub fn computation(&self) -> Duration {
        Duration::from_micros(self.computation_us)
    }

    /// The configured deadline.
    pub fn deadline(&self) -> Duration {
        Duration::from_micros(self.deadline_us)
    }

    /// True when timing parameters are specified.
    pub fn has_timing(&self) -> bool {
        self.period_us > 0
    }

    /// Returns a copy with default timing values filled in if none are set.
    pub fn with_timing_defaults(&self) -> RtConfig {
        let mut cfg = self.clone();
        if !cfg.has_timing() {
            cfg.period_us = DEFAULT_RT_PERIOD.as_micros() as u64;
            cfg.computation_us = DEFAULT_RT_COMPUTATION.as_micros() as u64;
            cfg.deadline_us = DEFAULT_RT_DEADLINE.as_micros() as u64;
        }
        cfg
    }

    /// Derives timing parameters from a cycle period: the computation
    /// budget is 20% of the period, the deadline 80%.
    pub fn with_cycle_timing(&self, cycle: Duration) -> RtConfig {
        let mut cfg = self.clone();
        let period_us = cycle.as_micros() as u64;
        cfg.period_us = period_us;
        cfg.computation_us = period_us / 5;
        cfg.deadline_us = period_us * 4 / 5;
        cfg.prefer_deadline_scheduler = true;
        cfg
    }
}

/// Applies the configuration to the current thread, best-effort.
///
/// Unsupported or unpermitted features are logged and skipped. Only a
/// platform-reported fatal error surfaces.
pub fn apply(cfg: &RtConfig) -> Result<()> {
    platform::apply(cfg)
}

/// Resolves [`CPU_AFFINITY_AUTO`] to the last hardware core, or
/// [`CPU_AFFINITY_NONE`] on single-core machines.
pub fn resolve_auto_affinity() -> i32 {
    match std::thread::available_parallelism() {
        Ok(n) if n.get() > 1 => (n.get() - 1) as i32,
        _ => CPU_AFFINITY_NONE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_display() {
        let unsupported = Capability::default();
        assert_eq!(unsupported.to_string(), "not supported");
        let blocked = Capability {
            supported: true,
            permitted: false,
        };
        assert_eq!(blocked.to_string(), "no (missing permissions)");
        assert!(blocked.missing_permissions());
    }

    #[test]
    fn timing_defaults_fill_zero_config() {
        let cfg = RtConfig::default();
        assert!(!cfg.has_timing());
        let filled = cfg.with_timing_defaults();
        assert_eq!(filled.period(), DEFAULT_RT_PERIOD);
        assert_eq!(filled.computation(), DEFAULT_RT_COMPUTATION);
        assert_eq!(filled.deadline(), DEFAULT_RT_DEADLINE);
    }

    #[test]
    fn cycle_timing_splits_period() {
        let cfg = RtConfig::default().with_cycle_timing(Duration::from_millis(1));
        assert_eq!(cfg.period_us, 1_000);
        assert_eq!(cfg.computation_us, 200);
        assert_eq!(cfg.deadline_us, 800);
        assert!(cfg.prefer_deadline_scheduler);
    }

    #[test]
    fn apply_disabled_config_is_ok() {
        // A fully disabled config must never fail, on any platform.
        assert!(apply(&RtConfig::default()).is_ok());
    }

    #[test]
    fn rt_config_parses_from_empty_table() {
        let cfg: RtConfig = toml::from_str("").unwrap();
        assert!(!cfg.enabled);
        assert_eq!(cfg.priority, DEFAULT_RT_PRIORITY);
        assert_eq!(cfg.cpu_affinity, CPU_AFFINITY_NONE);
    }
}
