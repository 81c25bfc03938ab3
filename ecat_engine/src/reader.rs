//! Reader handle: blocks for the next cycle and extracts PDO values.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use ecat_common::breaker::Breaker;
use ecat_common::error::{Error, Result};
use ecat_common::telem::{DataType, Frame};

use crate::codec;
use crate::engine::{Engine, ResolvedPdo};

/// Upper bound on one wait for a publication. Bounds the latency of
/// observing engine stop, restart, and caller cancellation.
const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Outcome of waiting for the next cycle.
enum WaitOutcome {
    /// A new epoch was observed.
    Data,
    /// The caller's breaker stopped; not an error.
    Stopped,
}

/// Single-owner handle reading input PDO values, one cycle at a time.
///
/// Dropping the reader unregisters it; when the last handle goes away the
/// engine stops its cycle thread.
pub struct Reader {
    engine: Arc<Engine>,
    id: usize,
    total_size: usize,
    pdos: Vec<ResolvedPdo>,
    private_buffer: Vec<u8>,
    last_seen_epoch: u64,
    my_config_gen: u64,
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader").field("id", &self.id).finish()
    }
}

impl Reader {
    pub(crate) fn new(engine: Arc<Engine>, id: usize, total_size: usize) -> Self {
        let mut reader = Self {
            engine,
            id,
            total_size,
            pdos: Vec::new(),
            private_buffer: Vec::new(),
            last_seen_epoch: 0,
            my_config_gen: 0,
        };
        reader.refresh_pdos();
        reader
    }

    /// Total size in bytes of all registered PDO entries.
    pub fn size(&self) -> usize {
        self.total_size
    }

    /// Blocks until the next input publication, then extracts one value
    /// per registered PDO into the corresponding frame series.
    ///
    /// Returns `Ok` without touching the frame when `breaker` was stopped
    /// by the caller. Returns `CycleOverrun` when no publication arrived
    /// within the wait timeout, `EngineRestarting` while the engine is
    /// mid-reconfigure, and `Cyclic` when the engine stopped unexpectedly
    /// or the frame has fewer series than registered PDOs.
    pub fn read(&mut self, breaker: &Breaker, frame: &mut Frame) -> Result<()> {
        match self.await_cycle(breaker)? {
            WaitOutcome::Stopped => return Ok(()),
            WaitOutcome::Data => {}
        }

        if self.engine.config_gen.load(Ordering::Acquire) != self.my_config_gen {
            self.refresh_pdos();
        }

        self.snapshot();

        // A reconfigure that landed mid-copy may have shifted the image.
        if self.engine.config_gen.load(Ordering::Acquire) != self.my_config_gen {
            return Err(Error::EngineRestarting("engine restarting".to_string()));
        }

        if frame.series.len() < self.pdos.len() {
            return Err(Error::Cyclic(
                "frame has fewer series than registered PDO entries".to_string(),
            ));
        }

        for (i, pdo) in self.pdos.iter().enumerate() {
            let required = codec::required_bytes(pdo.offset.bit, pdo.bit_length);
            if pdo.offset.byte.saturating_add(required) > self.private_buffer.len() {
                return Err(Error::Cyclic(
                    "PDO offset out of bounds in input buffer".to_string(),
                ));
            }
            let series = &mut frame.series[i];
            let ty = if pdo.data_type == DataType::Unknown {
                series.data_type()
            } else {
                pdo.data_type
            };
            let src = &self.private_buffer[pdo.offset.byte..];
            let value = codec::extract(src, pdo.offset.bit, pdo.bit_length, ty);
            series.write_casted(value);
        }

        Ok(())
    }

    /// Blocks until the next PDO exchange epoch without extracting data.
    /// Same outcome classification as [`Reader::read`].
    pub fn wait(&mut self, breaker: &Breaker) -> Result<()> {
        self.await_cycle(breaker).map(|_| ())
    }

    /// Waits on the engine's read condition variable for a new epoch, a
    /// stop, or a restart, with a bounded timeout.
    fn await_cycle(&mut self, breaker: &Breaker) -> Result<WaitOutcome> {
        let deadline = Instant::now() + READ_TIMEOUT;
        let mut observed_epoch;
        {
            let engine = &self.engine;
            let ready = |observed: u64| {
                !engine.breaker.running()
                    || !breaker.running()
                    || engine.restarting.load(Ordering::Acquire)
                    || observed > self.last_seen_epoch
            };
            let mut guard = engine.notify_mu.lock();
            loop {
                observed_epoch = engine.epoch.0.load(Ordering::Acquire);
                if ready(observed_epoch) {
                    break;
                }
                if engine
                    .read_cv
                    .wait_until(&mut guard, deadline)
                    .timed_out()
                {
                    // One final check: the publication may have raced the
                    // timeout.
                    observed_epoch = engine.epoch.0.load(Ordering::Acquire);
                    if ready(observed_epoch) {
                        break;
                    }
                    return Err(Error::CycleOverrun(
                        "timeout waiting for inputs".to_string(),
                    ));
                }
            }
        }

        if self.engine.restarting.load(Ordering::Acquire) {
            return Err(Error::EngineRestarting("engine restarting".to_string()));
        }
        // User-commanded stop, not an error.
        if !breaker.running() {
            return Ok(WaitOutcome::Stopped);
        }
        if !self.engine.breaker.running() {
            return Err(Error::Cyclic("engine stopped unexpectedly".to_string()));
        }

        self.last_seen_epoch = observed_epoch;
        Ok(WaitOutcome::Data)
    }

    /// Copies the shared input buffer into the private buffer under the
    /// seqlock. The loop retries while the publisher is mid-write, so the
    /// snapshot always corresponds to exactly one publication.
    fn snapshot(&mut self) {
        loop {
            let s0 = self.engine.seq.0.load(Ordering::Acquire);
            if s0 & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }
            let ptr = self.engine.input_ptr.load(Ordering::Acquire);
            let len = self.engine.input_len.load(Ordering::Acquire);
            let n = self.private_buffer.len().min(len);
            if !ptr.is_null() && n > 0 {
                // SAFETY: ptr names a buffer the engine keeps alive for its
                // whole lifetime (superseded buffers are retired, never
                // freed), and n is bounded by both source and destination.
                unsafe {
                    std::ptr::copy_nonoverlapping(ptr, self.private_buffer.as_mut_ptr(), n)
                };
            }
            std::sync::atomic::fence(Ordering::Acquire);
            let s1 = self.engine.seq.0.load(Ordering::Acquire);
            if s0 == s1 {
                break;
            }
        }
    }

    /// Re-materializes offsets and type information from the registration
    /// and resizes the private buffer for the current generation.
    fn refresh_pdos(&mut self) {
        {
            let regs = self.engine.read_registrations.lock();
            if let Some(reg) = regs.iter().find(|r| r.id == self.id) {
                debug_assert_eq!(reg.offsets.len(), reg.entries.len());
                self.pdos.clear();
                self.pdos.reserve(reg.entries.len());
                for (entry, offset) in reg.entries.iter().zip(&reg.offsets) {
                    self.pdos.push(ResolvedPdo {
                        offset: *offset,
                        data_type: entry.data_type,
                        bit_length: entry.bit_length,
                    });
                }
            }
        }
        self.private_buffer
            .resize(self.engine.input_len.load(Ordering::Acquire), 0);
        self.my_config_gen = self.engine.config_gen.load(Ordering::Acquire);
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.engine.unregister_reader(self.id);
    }
}
