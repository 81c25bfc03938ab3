//! Linux RT implementation: SCHED_FIFO / SCHED_DEADLINE, affinity, mlockall.

use std::io;

use nix::sched::{CpuSet, sched_setaffinity};
use nix::sys::mman::{MlockAllFlags, mlockall, munlockall};
use nix::unistd::Pid;
use tracing::{debug, warn};

use super::{CPU_AFFINITY_AUTO, Capability, RtCapabilities, RtConfig, resolve_auto_affinity};
use crate::error::Result;

pub(super) fn capabilities() -> RtCapabilities {
    let sched_permitted = probe_sched_fifo();
    RtCapabilities {
        priority_scheduling: Capability {
            supported: true,
            permitted: sched_permitted,
        },
        // CAP_SYS_NICE gates both policies.
        deadline_scheduling: Capability {
            supported: true,
            permitted: sched_permitted,
        },
        cpu_affinity: Capability {
            supported: true,
            permitted: true,
        },
        memory_locking: Capability {
            supported: true,
            permitted: probe_mlockall(),
        },
    }
}

/// Tries SCHED_FIFO at the lowest priority, then restores the original
/// policy. Leaves the thread's scheduling untouched on failure.
fn probe_sched_fifo() -> bool {
    unsafe {
        let orig_policy = libc::sched_getscheduler(0);
        let mut orig_param: libc::sched_param = std::mem::zeroed();
        if orig_policy == -1 || libc::sched_getparam(0, &mut orig_param) == -1 {
            return false;
        }
        let probe = libc::sched_param { sched_priority: 1 };
        if libc::sched_setscheduler(0, libc::SCHED_FIFO, &probe) == 0 {
            libc::sched_setscheduler(0, orig_policy, &orig_param);
            true
        } else {
            false
        }
    }
}

fn probe_mlockall() -> bool {
    match mlockall(MlockAllFlags::MCL_CURRENT) {
        Ok(()) => {
            let _ = munlockall();
            true
        }
        Err(_) => false,
    }
}

pub(super) fn apply(cfg: &RtConfig) -> Result<()> {
    if cfg.enabled {
        let mut scheduled = false;
        if cfg.prefer_deadline_scheduler && cfg.has_timing() {
            match set_deadline_scheduler(cfg) {
                Ok(()) => {
                    debug!(
                        runtime_us = cfg.computation_us,
                        deadline_us = cfg.deadline_us,
                        period_us = cfg.period_us,
                        "applied SCHED_DEADLINE"
                    );
                    scheduled = true;
                }
                Err(err) => warn!(
                    %err,
                    "SCHED_DEADLINE unavailable, falling back to SCHED_FIFO"
                ),
            }
        }
        if !scheduled {
            let param = libc::sched_param {
                sched_priority: cfg.priority,
            };
            if unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) } == -1 {
                warn!(
                    priority = cfg.priority,
                    error = %io::Error::last_os_error(),
                    "failed to set SCHED_FIFO (requires CAP_SYS_NICE or root)"
                );
            } else {
                debug!(priority = cfg.priority, "applied SCHED_FIFO");
            }
        }
    }

    let target = if cfg.cpu_affinity == CPU_AFFINITY_AUTO {
        resolve_auto_affinity()
    } else {
        cfg.cpu_affinity
    };
    if target >= 0 {
        match build_cpuset(target as usize) {
            Ok(cpuset) => {
                if let Err(err) = sched_setaffinity(Pid::from_raw(0), &cpuset) {
                    warn!(core = target, %err, "failed to set CPU affinity");
                } else {
                    debug!(core = target, "pinned to CPU");
                }
            }
            Err(err) => warn!(core = target, %err, "invalid CPU affinity target"),
        }
    }

    if cfg.lock_memory {
        if let Err(err) = mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE) {
            warn!(%err, "failed to lock memory (requires CAP_IPC_LOCK)");
        } else {
            debug!("locked memory pages");
        }
    }

    Ok(())
}

fn build_cpuset(core: usize) -> nix::Result<CpuSet> {
    let mut cpuset = CpuSet::new();
    cpuset.set(core)?;
    Ok(cpuset)
}

/// `sched_attr` for the `sched_setattr` syscall; glibc exposes no wrapper.
#[repr(C)]
struct SchedAttr {
    size: u32,
    sched_policy: u32,
    sched_flags: u64,
    sched_nice: i32,
    sched_priority: u32,
    sched_runtime: u64,
    sched_deadline: u64,
    sched_period: u64,
}

const SCHED_DEADLINE: u32 = 6;

fn set_deadline_scheduler(cfg: &RtConfig) -> io::Result<()> {
    let attr = SchedAttr {
        size: std::mem::size_of::<SchedAttr>() as u32,
        sched_policy: SCHED_DEADLINE,
        sched_flags: 0,
        sched_nice: 0,
        sched_priority: 0,
        sched_runtime: cfg.computation().as_nanos() as u64,
        sched_deadline: cfg.deadline().as_nanos() as u64,
        sched_period: cfg.period().as_nanos() as u64,
    };
    let ret = unsafe { libc::syscall(libc::SYS_sched_setattr, 0, &attr as *const SchedAttr, 0) };
    if ret == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_report_linux_support() {
        let caps = capabilities();
        assert!(caps.priority_scheduling.supported);
        assert!(caps.deadline_scheduling.supported);
        assert!(caps.cpu_affinity.supported);
        assert!(caps.memory_locking.supported);
    }

    #[test]
    fn probe_leaves_scheduler_untouched() {
        let before = unsafe { libc::sched_getscheduler(0) };
        probe_sched_fifo();
        let after = unsafe { libc::sched_getscheduler(0) };
        assert_eq!(before, after);
    }
}
