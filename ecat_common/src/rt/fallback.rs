//! No-op RT implementation for platforms without the Linux RT stack.

use tracing::info;

use super::{RtCapabilities, RtConfig};
use crate::error::Result;

pub(super) fn capabilities() -> RtCapabilities {
    RtCapabilities::default()
}

pub(super) fn apply(cfg: &RtConfig) -> Result<()> {
    if cfg.enabled {
        info!("real-time thread configuration is not supported on this platform");
    }
    Ok(())
}
