//! Mock master for tests and simulation.
//!
//! Simulates the master lifecycle and cyclic exchange against an in-memory
//! "bus": `receive()` copies the bus input image into the local process
//! image, `send()` copies the local output image back to the bus. A
//! [`MockHandle`] shares the bus state, so tests can set input bytes,
//! inspect transmitted outputs, inject errors, and shift the image layout
//! while the engine owns the master.

use std::sync::Arc;

use parking_lot::Mutex;

use ecat_common::error::{Error, Result};

use crate::master::Master;
use crate::pdo::{Direction, PdoEntry, PdoOffset};
use crate::slave::{SlaveInfo, SlaveState};

#[derive(Default)]
struct BusState {
    slaves: Vec<SlaveInfo>,
    inputs: Vec<u8>,
    outputs: Vec<u8>,
    input_padding: usize,
    output_padding: usize,
    registered: Vec<(PdoEntry, PdoOffset)>,
    input_size: usize,
    output_size: usize,
    initialized: bool,
    activated: bool,
    init_error: Option<Error>,
    activate_error: Option<Error>,
    receive_error: Option<Error>,
    send_error: Option<Error>,
    call_log: Vec<&'static str>,
}

/// Mock implementation of [`Master`] without real EtherCAT hardware.
pub struct MockMaster {
    interface: String,
    bus: Arc<Mutex<BusState>>,
    inputs: Vec<u8>,
    outputs: Vec<u8>,
}

impl MockMaster {
    /// Creates a mock master bound to the given interface name.
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            bus: Arc::new(Mutex::new(BusState::default())),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Returns a shared handle to the simulated bus.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            bus: Arc::clone(&self.bus),
        }
    }
}

impl Master for MockMaster {
    fn initialize(&mut self) -> Result<()> {
        let mut bus = self.bus.lock();
        bus.call_log.push("initialize");
        if let Some(err) = bus.init_error.clone() {
            return Err(err);
        }
        bus.initialized = true;
        Ok(())
    }

    fn register_pdos(&mut self, entries: &[PdoEntry]) -> Result<()> {
        let mut bus = self.bus.lock();
        bus.call_log.push("register_pdos");
        if !bus.initialized {
            return Err(Error::PdoMapping("master not initialized".to_string()));
        }
        let mut input_size = bus.input_padding;
        let mut output_size = bus.output_padding;
        bus.registered.clear();
        for entry in entries {
            let offset = match entry.direction {
                Direction::Input => {
                    let byte = input_size;
                    input_size += entry.byte_length();
                    PdoOffset { byte, bit: 0 }
                }
                Direction::Output => {
                    let byte = output_size;
                    output_size += entry.byte_length();
                    PdoOffset { byte, bit: 0 }
                }
            };
            bus.registered.push((*entry, offset));
        }
        bus.input_size = input_size;
        bus.output_size = output_size;
        Ok(())
    }

    fn activate(&mut self) -> Result<()> {
        let mut bus = self.bus.lock();
        bus.call_log.push("activate");
        if let Some(err) = bus.activate_error.clone() {
            return Err(err);
        }
        if !bus.initialized {
            return Err(Error::Activation("master not initialized".to_string()));
        }
        bus.activated = true;
        self.inputs.resize(bus.input_size, 0);
        self.inputs.fill(0);
        self.outputs.resize(bus.output_size, 0);
        self.outputs.fill(0);
        if bus.inputs.len() < bus.input_size {
            let target = bus.input_size;
            bus.inputs.resize(target, 0);
        }
        if bus.outputs.len() < bus.output_size {
            let target = bus.output_size;
            bus.outputs.resize(target, 0);
        }
        for slave in &mut bus.slaves {
            slave.state = SlaveState::Op;
        }
        Ok(())
    }

    fn deactivate(&mut self) {
        let mut bus = self.bus.lock();
        bus.call_log.push("deactivate");
        bus.activated = false;
        for slave in &mut bus.slaves {
            slave.state = SlaveState::Init;
        }
    }

    fn receive(&mut self) -> Result<()> {
        let mut bus = self.bus.lock();
        bus.call_log.push("receive");
        if let Some(err) = bus.receive_error.clone() {
            return Err(err);
        }
        let n = self.inputs.len().min(bus.inputs.len());
        self.inputs[..n].copy_from_slice(&bus.inputs[..n]);
        Ok(())
    }

    fn send(&mut self) -> Result<()> {
        let mut bus = self.bus.lock();
        bus.call_log.push("send");
        if let Some(err) = bus.send_error.clone() {
            return Err(err);
        }
        let n = self.outputs.len().min(bus.outputs.len());
        let outputs = &self.outputs[..n];
        bus.outputs[..n].copy_from_slice(outputs);
        Ok(())
    }

    fn input_data(&self) -> &[u8] {
        &self.inputs
    }

    fn output_data(&mut self) -> &mut [u8] {
        &mut self.outputs
    }

    fn pdo_offset(&self, entry: &PdoEntry) -> Option<PdoOffset> {
        let bus = self.bus.lock();
        bus.registered
            .iter()
            .find(|(e, _)| {
                e.slave_position == entry.slave_position
                    && e.index == entry.index
                    && e.subindex == entry.subindex
                    && e.direction == entry.direction
            })
            .map(|(_, offset)| *offset)
    }

    fn slaves(&self) -> Vec<SlaveInfo> {
        self.bus.lock().slaves.clone()
    }

    fn slave_state(&self, position: u16) -> SlaveState {
        self.bus
            .lock()
            .slaves
            .iter()
            .find(|s| s.position == position)
            .map(|s| s.state)
            .unwrap_or(SlaveState::Unknown)
    }

    fn interface_name(&self) -> &str {
        &self.interface
    }
}

/// Shared handle to a [`MockMaster`]'s simulated bus.
#[derive(Clone)]
pub struct MockHandle {
    bus: Arc<Mutex<BusState>>,
}

impl MockHandle {
    /// Adds a simulated slave. Call before the master is initialized.
    pub fn add_slave(&self, slave: SlaveInfo) {
        self.bus.lock().slaves.push(slave);
    }

    /// Writes bytes into the bus input image at an absolute offset,
    /// growing the image if needed. Delivered on the next `receive()`.
    pub fn set_input(&self, offset: usize, bytes: &[u8]) {
        let mut bus = self.bus.lock();
        let end = offset + bytes.len();
        if bus.inputs.len() < end {
            bus.inputs.resize(end, 0);
        }
        bus.inputs[offset..end].copy_from_slice(bytes);
    }

    /// Reads `len` bytes of the last transmitted output image at an
    /// absolute offset. Missing bytes read as zero.
    pub fn output(&self, offset: usize, len: usize) -> Vec<u8> {
        let bus = self.bus.lock();
        (offset..offset + len)
            .map(|i| bus.outputs.get(i).copied().unwrap_or(0))
            .collect()
    }

    /// Prepends padding bytes to the input image layout on the next
    /// registration, simulating a topology-driven shift.
    pub fn set_input_padding(&self, bytes: usize) {
        self.bus.lock().input_padding = bytes;
    }

    /// Prepends padding bytes to the output image layout on the next
    /// registration, simulating a topology-driven shift.
    pub fn set_output_padding(&self, bytes: usize) {
        self.bus.lock().output_padding = bytes;
    }

    /// Injects an error returned by every `initialize()` until cleared.
    pub fn inject_init_error(&self, err: Option<Error>) {
        self.bus.lock().init_error = err;
    }

    /// Injects an error returned by every `activate()` until cleared.
    pub fn inject_activate_error(&self, err: Option<Error>) {
        self.bus.lock().activate_error = err;
    }

    /// Injects an error returned by every `receive()` until cleared.
    pub fn inject_receive_error(&self, err: Option<Error>) {
        self.bus.lock().receive_error = err;
    }

    /// Injects an error returned by every `send()` until cleared.
    pub fn inject_send_error(&self, err: Option<Error>) {
        self.bus.lock().send_error = err;
    }

    /// True once `initialize()` has succeeded.
    pub fn initialized(&self) -> bool {
        self.bus.lock().initialized
    }

    /// True while the master is activated.
    pub fn activated(&self) -> bool {
        self.bus.lock().activated
    }

    /// The log of master method calls, in order.
    pub fn call_log(&self) -> Vec<&'static str> {
        self.bus.lock().call_log.clone()
    }

    /// True when `method` appears in the call log.
    pub fn was_called(&self, method: &str) -> bool {
        self.bus.lock().call_log.iter().any(|m| *m == method)
    }

    /// The currently registered entries with their resolved offsets.
    pub fn registered(&self) -> Vec<(PdoEntry, PdoOffset)> {
        self.bus.lock().registered.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecat_common::telem::DataType;

    fn entry(index: u16, sub: u8, bits: u8) -> PdoEntry {
        PdoEntry::input(0, index, sub, bits, DataType::Uint16)
    }

    #[test]
    fn lifecycle_and_call_log() {
        let mut master = MockMaster::new("mock0");
        let handle = master.handle();
        master.initialize().unwrap();
        master.register_pdos(&[entry(0x6000, 1, 16)]).unwrap();
        master.activate().unwrap();
        assert!(handle.activated());
        master.deactivate();
        assert!(!handle.activated());
        assert_eq!(
            handle.call_log(),
            vec!["initialize", "register_pdos", "activate", "deactivate"]
        );
    }

    #[test]
    fn offsets_assigned_in_registration_order() {
        let mut master = MockMaster::new("mock0");
        master.initialize().unwrap();
        master
            .register_pdos(&[
                entry(0x6000, 1, 16),
                entry(0x6000, 2, 32),
                PdoEntry::output(0, 0x7000, 1, 16, DataType::Int16),
            ])
            .unwrap();
        let e = entry(0x6000, 2, 32);
        assert_eq!(master.pdo_offset(&e), Some(PdoOffset { byte: 2, bit: 0 }));
        let out = PdoEntry::output(0, 0x7000, 1, 16, DataType::Int16);
        assert_eq!(master.pdo_offset(&out), Some(PdoOffset { byte: 0, bit: 0 }));
    }

    #[test]
    fn padding_shifts_layout_on_next_registration() {
        let mut master = MockMaster::new("mock0");
        let handle = master.handle();
        master.initialize().unwrap();
        let out = PdoEntry::output(0, 0x7000, 1, 16, DataType::Int16);
        master.register_pdos(&[out]).unwrap();
        assert_eq!(master.pdo_offset(&out), Some(PdoOffset { byte: 0, bit: 0 }));
        handle.set_output_padding(4);
        master.register_pdos(&[out]).unwrap();
        assert_eq!(master.pdo_offset(&out), Some(PdoOffset { byte: 4, bit: 0 }));
    }

    #[test]
    fn receive_copies_bus_inputs() {
        let mut master = MockMaster::new("mock0");
        let handle = master.handle();
        master.initialize().unwrap();
        master.register_pdos(&[entry(0x6000, 1, 16)]).unwrap();
        master.activate().unwrap();
        handle.set_input(0, &0x1234u16.to_le_bytes());
        master.receive().unwrap();
        assert_eq!(master.input_data(), &0x1234u16.to_le_bytes());
    }

    #[test]
    fn send_publishes_outputs_to_bus() {
        let mut master = MockMaster::new("mock0");
        let handle = master.handle();
        master.initialize().unwrap();
        let out = PdoEntry::output(0, 0x7000, 1, 16, DataType::Int16);
        master.register_pdos(&[out]).unwrap();
        master.activate().unwrap();
        master.output_data().copy_from_slice(&0x5678u16.to_le_bytes());
        master.send().unwrap();
        assert_eq!(handle.output(0, 2), 0x5678u16.to_le_bytes());
    }

    #[test]
    fn injected_errors_are_persistent_until_cleared() {
        let mut master = MockMaster::new("mock0");
        let handle = master.handle();
        handle.inject_init_error(Some(Error::MasterInit("nic down".to_string())));
        assert!(master.initialize().is_err());
        assert!(master.initialize().is_err());
        handle.inject_init_error(None);
        assert!(master.initialize().is_ok());
    }
}
