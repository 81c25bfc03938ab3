//! Error types shared across the EtherCAT workspace.

use thiserror::Error;

/// Errors produced by the master, the cyclic engine, and its handles.
///
/// Transient cyclic errors (`Cyclic`, `WorkingCounter`) are coalesced inside
/// the cycle thread and never surface through handle calls. Configuration and
/// activation errors surface synchronously from `open_reader`/`open_writer`
/// after retry exhaustion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Master initialization failed.
    #[error("master initialization failed: {0}")]
    MasterInit(String),

    /// The network interface cannot be opened.
    #[error("network interface error: {0}")]
    Interface(String),

    /// Slave configuration failed.
    #[error("slave configuration failed: {0}")]
    SlaveConfig(String),

    /// PDO mapping is invalid or registration failed.
    #[error("PDO mapping failed: {0}")]
    PdoMapping(String),

    /// Domain creation or registration failed.
    #[error("domain error: {0}")]
    Domain(String),

    /// Master activation failed.
    #[error("master activation failed: {0}")]
    Activation(String),

    /// Cyclic communication failed.
    #[error("cyclic exchange error: {0}")]
    Cyclic(String),

    /// A slave entered an unexpected state.
    #[error("slave state error: {0}")]
    SlaveState(String),

    /// No slave was found at the expected position.
    #[error("slave not found: {0}")]
    SlaveNotFound(String),

    /// A slave disconnected from the bus.
    #[error("slave disconnected: {0}")]
    SlaveDisconnected(String),

    /// The working counter did not match the expected value.
    #[error("working counter mismatch: {0}")]
    WorkingCounter(String),

    /// The cycle time could not be maintained.
    #[error("cycle overrun: {0}")]
    CycleOverrun(String),

    /// A state machine transition failed.
    #[error("state change failed: {0}")]
    StateChange(String),

    /// The engine is mid-reconfigure; retry after a brief delay.
    #[error("engine restarting: {0}")]
    EngineRestarting(String),

    /// PDO discovery failed for a slave.
    #[error("PDO discovery failed: {0}")]
    PdoDiscovery(String),

    /// An SDO read operation failed.
    #[error("SDO read failed: {0}")]
    SdoRead(String),

    /// The slaves reported by the engine do not match the expected identity.
    #[error("topology mismatch: {0}")]
    TopologyMismatch(String),

    /// A requested rate is incompatible with the engine cycle rate.
    #[error("rate mismatch: {0}")]
    RateMismatch(String),

    /// Configuration loading or validation failed.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for EtherCAT operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True when the error signals a retriable mid-reconfigure state rather
    /// than a failure.
    pub fn is_restarting(&self) -> bool {
        matches!(self, Self::EngineRestarting(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_detail() {
        let err = Error::Activation("slave 3 refused OP".to_string());
        assert!(err.to_string().contains("slave 3 refused OP"));
        assert!(err.to_string().contains("activation"));
    }

    #[test]
    fn restarting_classification() {
        assert!(Error::EngineRestarting("reconfigure".into()).is_restarting());
        assert!(!Error::Cyclic("receive failed".into()).is_restarting());
    }
}
