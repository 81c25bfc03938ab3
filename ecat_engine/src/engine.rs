//! The cyclic PDO exchange engine.
//!
//! One engine owns one master and one cycle thread. Readers and writers
//! register dynamically; every registration change triggers a reconfigure
//! (stop → re-register all entries → activate → restart), which keeps the
//! cycle thread free of any re-resolution logic on the hot path.
//!
//! Input publication uses a seqlock: the cycle thread is the sole writer
//! of the shared input buffer, and any number of readers snapshot it
//! without blocking the publisher. Output staging is a mutex-guarded
//! buffer coalescing writes from any number of producers; the cycle
//! thread snapshots it once per cycle and copies the snapshot into the
//! master's output image outside the lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use ecat_common::breaker::Breaker;
use ecat_common::error::Result;
use ecat_common::rt;
use ecat_common::telem::Rate;
use ecat_common::timer::Timer;
use ecat_master::master::Master;
use ecat_master::pdo::{PdoEntry, PdoOffset};
use ecat_master::slave::SlaveInfo;

use crate::config::EngineConfig;
use crate::reader::Reader;
use crate::writer::Writer;

/// A 64-bit counter on its own cache line, so the seqlock's `seq` and
/// `epoch` never false-share.
#[repr(align(64))]
pub(crate) struct PaddedU64(pub(crate) AtomicU64);

static_assertions::const_assert_eq!(std::mem::align_of::<PaddedU64>(), 64);

/// One reader or writer registration, engine-owned.
///
/// `offsets` parallels `entries` and is only valid for the configuration
/// generation it was resolved under.
pub(crate) struct Registration {
    pub(crate) id: usize,
    pub(crate) entries: Vec<PdoEntry>,
    pub(crate) offsets: Vec<PdoOffset>,
    pub(crate) rate: Rate,
}

/// Output staging buffer and writer registrations, guarded together by the
/// write mutex so a transaction sees offsets and staging consistently.
pub(crate) struct WriteState {
    pub(crate) staging: Vec<u8>,
    pub(crate) registrations: Vec<Registration>,
}

/// Resolved PDO entry held by a reader: offset plus type information.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResolvedPdo {
    pub(crate) offset: PdoOffset,
    pub(crate) data_type: ecat_common::telem::DataType,
    pub(crate) bit_length: u8,
}

/// Coalesces repeated cyclic I/O errors into one warning per failure run
/// and one recovery message.
struct ErrorCoalescer {
    op: &'static str,
    failing: bool,
    count: u64,
}

impl ErrorCoalescer {
    fn new(op: &'static str) -> Self {
        Self {
            op,
            failing: false,
            count: 0,
        }
    }

    fn observe(&mut self, result: Result<()>) {
        match result {
            Err(err) => {
                self.count += 1;
                if !self.failing {
                    warn!(op = self.op, %err, "cyclic I/O error");
                    self.failing = true;
                }
            }
            Ok(()) => {
                if self.failing {
                    info!(op = self.op, errors = self.count, "cyclic I/O recovered");
                    self.failing = false;
                    self.count = 0;
                }
            }
        }
    }

    fn finish(&self) {
        if self.failing {
            warn!(
                op = self.op,
                errors = self.count,
                "engine stopped with outstanding cyclic errors"
            );
        }
    }
}

/// Coordinates cyclic PDO exchange between a master and its tasks.
pub struct Engine {
    config: EngineConfig,

    master: Mutex<Box<dyn Master>>,
    init_mu: Mutex<()>,
    reconfigure_mu: Mutex<()>,

    next_id: AtomicUsize,
    cycle_time_ns: AtomicU64,

    pub(crate) seq: PaddedU64,
    pub(crate) epoch: PaddedU64,
    pub(crate) input_ptr: AtomicPtr<u8>,
    pub(crate) input_len: AtomicUsize,
    // The current buffer plus every superseded one. Retired buffers stay
    // alive for the engine's lifetime so a reader mid-copy never
    // dereferences freed memory across a reconfigure.
    input_buffers: Mutex<Vec<Box<[u8]>>>,

    pub(crate) notify_mu: Mutex<()>,
    pub(crate) read_cv: Condvar,
    pub(crate) read_registrations: Mutex<Vec<Registration>>,
    pub(crate) write: Mutex<WriteState>,

    pub(crate) restarting: AtomicBool,
    pub(crate) config_gen: AtomicU64,
    pub(crate) breaker: Breaker,
    run_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Creates an engine with the default configuration.
    pub fn new(master: Box<dyn Master>) -> Arc<Self> {
        Self::with_config(master, EngineConfig::default())
    }

    /// Creates an engine with the given configuration.
    pub fn with_config(master: Box<dyn Master>, config: EngineConfig) -> Arc<Self> {
        let breaker = Breaker::new(config.retry.clone());
        Arc::new(Self {
            config,
            master: Mutex::new(master),
            init_mu: Mutex::new(()),
            reconfigure_mu: Mutex::new(()),
            next_id: AtomicUsize::new(0),
            cycle_time_ns: AtomicU64::new(Duration::from_millis(1).as_nanos() as u64),
            seq: PaddedU64(AtomicU64::new(0)),
            epoch: PaddedU64(AtomicU64::new(0)),
            input_ptr: AtomicPtr::new(std::ptr::null_mut()),
            input_len: AtomicUsize::new(0),
            input_buffers: Mutex::new(Vec::new()),
            notify_mu: Mutex::new(()),
            read_cv: Condvar::new(),
            read_registrations: Mutex::new(Vec::new()),
            write: Mutex::new(WriteState {
                staging: Vec::new(),
                registrations: Vec::new(),
            }),
            restarting: AtomicBool::new(false),
            config_gen: AtomicU64::new(0),
            breaker,
            run_thread: Mutex::new(None),
        })
    }

    /// Opens a reader for the given input entries.
    ///
    /// Appends a registration, raises the cycle rate if `sample_rate`
    /// exceeds it, and reconfigures the engine. On failure the tentative
    /// registration is rolled back and the error returned.
    pub fn open_reader(
        self: &Arc<Self>,
        entries: Vec<PdoEntry>,
        sample_rate: Rate,
    ) -> Result<Reader> {
        let total_size: usize = entries.iter().map(PdoEntry::byte_length).sum();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut regs = self.read_registrations.lock();
            regs.push(Registration {
                id,
                entries,
                offsets: Vec::new(),
                rate: sample_rate,
            });
        }
        self.update_cycle_time();

        if let Err(err) = self.reconfigure() {
            self.read_registrations.lock().retain(|r| r.id != id);
            self.update_cycle_time();
            return Err(err);
        }

        Ok(Reader::new(Arc::clone(self), id, total_size))
    }

    /// Opens a writer for the given output entries. Symmetric to
    /// [`Engine::open_reader`].
    pub fn open_writer(
        self: &Arc<Self>,
        entries: Vec<PdoEntry>,
        execution_rate: Rate,
    ) -> Result<Writer> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut write = self.write.lock();
            write.registrations.push(Registration {
                id,
                entries,
                offsets: Vec::new(),
                rate: execution_rate,
            });
        }
        self.update_cycle_time();

        if let Err(err) = self.reconfigure() {
            self.write.lock().registrations.retain(|r| r.id != id);
            self.update_cycle_time();
            return Err(err);
        }

        Ok(Writer::new(Arc::clone(self), id))
    }

    /// Initializes the master without activating cyclic exchange.
    /// Idempotent; used by discovery code paths.
    pub fn ensure_initialized(&self) -> Result<()> {
        let _guard = self.init_mu.lock();
        if self.breaker.running() {
            return Ok(());
        }
        self.master.lock().initialize()
    }

    /// Slaves discovered by the master.
    pub fn slaves(&self) -> Vec<SlaveInfo> {
        self.master.lock().slaves()
    }

    /// The network interface this engine's master is bound to.
    pub fn interface_name(&self) -> String {
        self.master.lock().interface_name().to_string()
    }

    /// The current cycle rate.
    pub fn cycle_rate(&self) -> Rate {
        let ns = self.cycle_time_ns.load(Ordering::Acquire);
        Rate(1e9 / ns as f64)
    }

    /// True while the cycle thread is running.
    pub fn running(&self) -> bool {
        self.breaker.running()
    }

    /// Completed exchange cycles since engine creation.
    pub fn epoch(&self) -> u64 {
        self.epoch.0.load(Ordering::Acquire)
    }

    /// The engine configuration.
    pub fn cfg(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of registered readers.
    pub fn reader_count(&self) -> usize {
        self.read_registrations.lock().len()
    }

    /// Number of registered writers.
    pub fn writer_count(&self) -> usize {
        self.write.lock().registrations.len()
    }

    fn cycle_period(&self) -> Duration {
        Duration::from_nanos(self.cycle_time_ns.load(Ordering::Acquire))
    }

    /// Recomputes the cycle time as the period of the fastest registered
    /// rate. Keeps the previous period when no rates remain.
    fn update_cycle_time(&self) {
        let mut max_rate = Rate::ZERO;
        {
            let regs = self.read_registrations.lock();
            for reg in regs.iter() {
                if reg.rate > max_rate {
                    max_rate = reg.rate;
                }
            }
        }
        {
            let write = self.write.lock();
            for reg in write.registrations.iter() {
                if reg.rate > max_rate {
                    max_rate = reg.rate;
                }
            }
        }
        if max_rate.hz() > 0.0 {
            self.cycle_time_ns
                .store(max_rate.period().as_nanos() as u64, Ordering::Release);
        }
    }

    fn should_be_running(&self) -> bool {
        let readers = !self.read_registrations.lock().is_empty();
        let writers = !self.write.lock().registrations.is_empty();
        readers || writers
    }

    pub(crate) fn unregister_reader(&self, id: usize) {
        self.read_registrations.lock().retain(|r| r.id != id);
        self.update_cycle_time();
        if !self.should_be_running() {
            self.stop();
        }
    }

    pub(crate) fn unregister_writer(&self, id: usize) {
        self.write.lock().registrations.retain(|r| r.id != id);
        self.update_cycle_time();
        if !self.should_be_running() {
            self.stop();
        }
    }

    /// Stops the cycle thread and deactivates the master. Idempotent.
    fn stop(&self) {
        if !self.breaker.running() {
            return;
        }
        self.breaker.stop();
        drop(self.notify_mu.lock());
        self.read_cv.notify_all();
        self.join_cycle_thread();
        self.master.lock().deactivate();
    }

    fn join_cycle_thread(&self) {
        let handle = self.run_thread.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn spawn_cycle_thread(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("ecat-cycle".to_string())
            .spawn(move || engine.run())
            .expect("failed to spawn cycle thread");
        *self.run_thread.lock() = Some(handle);
    }

    /// Rebuilds the master's process image for the current registration
    /// set: stop, re-register every entry, activate (with retry/backoff),
    /// resolve offsets, bump the configuration generation, restart.
    ///
    /// One reconfigure runs at a time. Blocked readers observe
    /// `EngineRestarting` for the duration.
    fn reconfigure(self: &Arc<Self>) -> Result<()> {
        let _serial = self.reconfigure_mu.lock();

        if self.breaker.running() {
            info!(
                interface = %self.interface_name(),
                "restarting engine for reconfiguration"
            );
            self.restarting.store(true, Ordering::Release);
            drop(self.notify_mu.lock());
            self.read_cv.notify_all();
            self.breaker.stop();
            self.join_cycle_thread();
            self.master.lock().deactivate();
        }

        let mut all_entries = Vec::new();
        {
            let regs = self.read_registrations.lock();
            for reg in regs.iter() {
                all_entries.extend_from_slice(&reg.entries);
            }
            let write = self.write.lock();
            for reg in write.registrations.iter() {
                all_entries.extend_from_slice(&reg.entries);
            }
        }

        self.breaker.start();
        while self.breaker.running() {
            let step_err = {
                let mut master = self.master.lock();
                if let Err(err) = master.initialize() {
                    Some(err)
                } else if let Err(err) = master.register_pdos(&all_entries) {
                    master.deactivate();
                    Some(err)
                } else if let Err(err) = master.activate() {
                    master.deactivate();
                    Some(err)
                } else {
                    None
                }
            };
            match step_err {
                None => break,
                Some(err) => {
                    if !self.breaker.wait(&err) {
                        self.restarting.store(false, Ordering::Release);
                        self.breaker.reset();
                        return Err(err);
                    }
                }
            }
        }
        self.breaker.reset();

        {
            let mut master = self.master.lock();
            self.update_offsets(master.as_mut());
        }
        self.config_gen.fetch_add(1, Ordering::Release);
        self.restarting.store(false, Ordering::Release);
        self.breaker.start();
        self.spawn_cycle_thread();
        Ok(())
    }

    /// Resolves every registration's offsets against the freshly activated
    /// master and resizes the shared buffers to the new image sizes.
    /// Staged output bytes shorter than the new staging length survive.
    fn update_offsets(&self, master: &mut dyn Master) {
        let input_len = master.input_data().len();
        self.resize_input_buffer(input_len);
        {
            let mut regs = self.read_registrations.lock();
            for reg in regs.iter_mut() {
                reg.offsets.clear();
                for entry in &reg.entries {
                    reg.offsets
                        .push(master.pdo_offset(entry).unwrap_or(PdoOffset::INVALID));
                }
            }
        }

        let output_len = master.output_data().len();
        {
            let mut write = self.write.lock();
            for reg in write.registrations.iter_mut() {
                reg.offsets.clear();
                for entry in &reg.entries {
                    reg.offsets
                        .push(master.pdo_offset(entry).unwrap_or(PdoOffset::INVALID));
                }
            }
            write.staging.resize(output_len, 0);
        }
    }

    /// Installs a fresh zeroed input buffer of `new_len` bytes, retiring
    /// the previous allocation.
    fn resize_input_buffer(&self, new_len: usize) {
        if self.input_len.load(Ordering::Acquire) == new_len
            && !self.input_ptr.load(Ordering::Relaxed).is_null()
        {
            return;
        }
        let mut buffers = self.input_buffers.lock();
        let mut fresh = vec![0u8; new_len].into_boxed_slice();
        let ptr = fresh.as_mut_ptr();
        buffers.push(fresh);
        self.input_ptr.store(ptr, Ordering::Release);
        self.input_len.store(new_len, Ordering::Release);
    }

    /// Publishes one cycle's input image under the seqlock and wakes
    /// waiting readers. Called from the cycle thread only.
    fn publish_inputs(&self, src: &[u8]) {
        let ptr = self.input_ptr.load(Ordering::Relaxed);
        let len = self.input_len.load(Ordering::Relaxed);
        debug_assert_eq!(src.len(), len);
        let n = src.len().min(len);
        self.seq.0.fetch_add(1, Ordering::Release);
        if !ptr.is_null() && n > 0 {
            // SAFETY: the cycle thread is the unique writer of the shared
            // input buffer; ptr/len name the live buffer installed by the
            // last reconfigure and n is bounded by both images.
            unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), ptr, n) };
        }
        self.seq.0.fetch_add(1, Ordering::Release);
        self.epoch.0.fetch_add(1, Ordering::Release);
        drop(self.notify_mu.lock());
        self.read_cv.notify_all();
    }

    /// The cycle thread body: receive → publish inputs → consume outputs →
    /// send → wait, until the breaker stops.
    fn run(&self) {
        let interface = self.interface_name();
        info!(interface = %interface, "cycle engine started");

        let cycle_time = self.cycle_period();
        let mut rt_cfg = self.config.rt.clone();
        if rt_cfg.enabled && !rt_cfg.has_timing() {
            rt_cfg = rt_cfg.with_cycle_timing(cycle_time);
        }
        if let Err(err) = rt::apply(&rt_cfg) {
            warn!(%err, "failed to apply RT configuration");
        }

        let mut timer = Timer::new(cycle_time);
        let max_overrun = self.config.max_overrun();
        let mut receive_errors = ErrorCoalescer::new("receive");
        let mut send_errors = ErrorCoalescer::new("send");
        let mut active: Vec<u8> = Vec::new();

        while self.breaker.running() {
            {
                let mut master = self.master.lock();
                receive_errors.observe(master.receive());
                self.publish_inputs(master.input_data());
            }

            {
                let write = self.write.lock();
                active.resize(write.staging.len(), 0);
                active.copy_from_slice(&write.staging);
            }
            {
                let mut master = self.master.lock();
                let outputs = master.output_data();
                let n = active.len().min(outputs.len());
                outputs[..n].copy_from_slice(&active[..n]);
                send_errors.observe(master.send());
            }

            let (elapsed, on_time) = timer.wait_with(&self.breaker);
            if !on_time && !max_overrun.is_zero() && elapsed > cycle_time + max_overrun {
                debug!(?elapsed, "cycle overrun");
            }
        }

        receive_errors.finish();
        send_errors.finish();
        info!(interface = %interface, "cycle engine stopped");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
        self.master.lock().deactivate();
    }
}
