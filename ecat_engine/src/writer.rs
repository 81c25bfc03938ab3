//! Writer handle and its RAII transaction over the staging buffer.

use std::sync::Arc;

use parking_lot::MutexGuard;

use ecat_common::telem::{DataType, SampleValue};

use crate::codec;
use crate::engine::{Engine, WriteState};

/// Handle injecting values into the outbound process image.
///
/// A single write opens a [`Transaction`] for one field; batched writes
/// should open one transaction and reuse it so the write lock is taken
/// once. Dropping the writer unregisters it.
pub struct Writer {
    engine: Arc<Engine>,
    id: usize,
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer").field("id", &self.id).finish()
    }
}

impl Writer {
    pub(crate) fn new(engine: Arc<Engine>, id: usize) -> Self {
        Self { engine, id }
    }

    /// Opens a transaction holding the write lock for multiple writes.
    pub fn open_tx(&self) -> Transaction<'_> {
        Transaction {
            state: self.engine.write.lock(),
            id: self.id,
        }
    }

    /// Writes one value to the PDO entry at `pdo_index`.
    pub fn write(&self, pdo_index: usize, value: SampleValue) {
        self.open_tx().write(pdo_index, value);
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        self.engine.unregister_writer(self.id);
    }
}

/// Batch writer holding the staging-buffer lock for its lifetime.
///
/// Values written here become visible on the wire no later than the next
/// cycle after the transaction drops. Writes with an unknown PDO index are
/// silent no-ops, as are writes whose resolved window momentarily exceeds
/// the staging buffer (a stale offset racing a reconfigure that shrank
/// the outputs).
pub struct Transaction<'w> {
    state: MutexGuard<'w, WriteState>,
    id: usize,
}

impl Transaction<'_> {
    /// Writes one value to the PDO entry at `pdo_index`.
    pub fn write(&mut self, pdo_index: usize, value: SampleValue) {
        let state = &mut *self.state;
        let Some(reg) = state.registrations.iter().find(|r| r.id == self.id) else {
            return;
        };
        let (Some(&offset), Some(entry)) = (reg.offsets.get(pdo_index), reg.entries.get(pdo_index))
        else {
            return;
        };
        let data_type = entry.data_type;
        let bit_length = entry.bit_length;

        let required = codec::required_bytes(offset.bit, bit_length);
        if offset.byte.saturating_add(required) > state.staging.len() {
            return;
        }

        let casted = if data_type == DataType::Unknown {
            value
        } else {
            value.cast(data_type)
        };
        codec::insert(
            &mut state.staging[offset.byte..],
            offset.bit,
            bit_length,
            casted,
        );
    }
}
