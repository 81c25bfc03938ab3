//! Slave descriptors discovered during bus enumeration.

use ecat_common::telem::DataType;
use serde::{Deserialize, Serialize};

use crate::pdo::Direction;

/// EtherCAT slave application layer states as defined in ETG.1000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SlaveState {
    /// Slave is not responding or in an unknown state.
    #[default]
    Unknown,
    /// Initialization state.
    Init,
    /// Pre-operational: mailbox communication only, no PDO exchange.
    PreOp,
    /// Safe-operational: inputs valid, outputs in safe state.
    SafeOp,
    /// Operational: full PDO exchange.
    Op,
    /// Bootstrap: firmware update mode.
    Boot,
}

impl std::fmt::Display for SlaveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "UNKNOWN",
            Self::Init => "INIT",
            Self::PreOp => "PRE-OP",
            Self::SafeOp => "SAFE-OP",
            Self::Op => "OP",
            Self::Boot => "BOOT",
        };
        write!(f, "{s}")
    }
}

/// One PDO entry discovered during slave enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdoEntryInfo {
    /// Parent PDO index (e.g. 0x1A00 for TxPDO, 0x1600 for RxPDO).
    pub pdo_index: u16,
    /// Object dictionary index of this entry.
    pub index: u16,
    /// Object dictionary subindex of this entry.
    pub subindex: u8,
    /// Size of the data in bits.
    pub bit_length: u8,
    /// Exchange direction.
    pub direction: Direction,
    /// Name from the CoE object dictionary, or a generated fallback.
    pub name: String,
    /// Data type resolved from the object dictionary.
    pub data_type: DataType,
}

/// An EtherCAT slave device discovered on the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaveInfo {
    /// Position of the slave on the bus (0-based).
    pub position: u16,
    /// Vendor ID assigned by the ETG.
    pub vendor_id: u32,
    /// Product code identifying the slave type.
    pub product_code: u32,
    /// Hardware/firmware revision.
    pub revision: u32,
    /// Device serial number, if available.
    pub serial: u32,
    /// Human-readable device name.
    pub name: String,
    /// Current application layer state.
    pub state: SlaveState,
    /// Total input size in bits.
    pub input_bits: u32,
    /// Total output size in bits.
    pub output_bits: u32,
    /// Discovered input PDO entries (TxPDO).
    pub input_pdos: Vec<PdoEntryInfo>,
    /// Discovered output PDO entries (RxPDO).
    pub output_pdos: Vec<PdoEntryInfo>,
}

impl SlaveInfo {
    /// Creates a slave descriptor with the identity fields set and no
    /// discovered PDOs.
    pub fn new(position: u16, vendor_id: u32, product_code: u32, name: impl Into<String>) -> Self {
        Self {
            position,
            vendor_id,
            product_code,
            revision: 0,
            serial: 0,
            name: name.into(),
            state: SlaveState::Unknown,
            input_bits: 0,
            output_bits: 0,
            input_pdos: Vec::new(),
            output_pdos: Vec::new(),
        }
    }

    /// Total number of discovered PDO entries.
    pub fn pdo_count(&self) -> usize {
        self.input_pdos.len() + self.output_pdos.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_display() {
        assert_eq!(SlaveState::Op.to_string(), "OP");
        assert_eq!(SlaveState::PreOp.to_string(), "PRE-OP");
        assert_eq!(SlaveState::Unknown.to_string(), "UNKNOWN");
    }

    #[test]
    fn pdo_count_sums_directions() {
        let mut slave = SlaveInfo::new(0, 0x2, 0x1389, "EL3004");
        assert_eq!(slave.pdo_count(), 0);
        slave.input_pdos.push(PdoEntryInfo {
            pdo_index: 0x1A00,
            index: 0x6000,
            subindex: 1,
            bit_length: 16,
            direction: Direction::Input,
            name: "status".to_string(),
            data_type: DataType::Int16,
        });
        assert_eq!(slave.pdo_count(), 1);
    }
}
