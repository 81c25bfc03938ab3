//! PDO entry descriptors and resolved process-image offsets.

use ecat_common::telem::DataType;
use serde::{Deserialize, Serialize};

/// Direction of a PDO entry relative to the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// TxPDO, slave to master.
    Input,
    /// RxPDO, master to slave.
    Output,
}

/// A single PDO entry to be exchanged cyclically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PdoEntry {
    /// Position of the slave on the bus.
    pub slave_position: u16,
    /// Object dictionary index (e.g. 0x6000).
    pub index: u16,
    /// Object dictionary subindex.
    pub subindex: u8,
    /// Size of the data in bits (1..=64).
    pub bit_length: u8,
    /// Exchange direction.
    pub direction: Direction,
    /// Hardware data type, `Unknown` until resolved from the wire.
    pub data_type: DataType,
}

impl PdoEntry {
    /// Creates an input (slave-to-master) entry.
    pub fn input(
        slave_position: u16,
        index: u16,
        subindex: u8,
        bit_length: u8,
        data_type: DataType,
    ) -> Self {
        Self {
            slave_position,
            index,
            subindex,
            bit_length,
            direction: Direction::Input,
            data_type,
        }
    }

    /// Creates an output (master-to-slave) entry.
    pub fn output(
        slave_position: u16,
        index: u16,
        subindex: u8,
        bit_length: u8,
        data_type: DataType,
    ) -> Self {
        Self {
            slave_position,
            index,
            subindex,
            bit_length,
            direction: Direction::Output,
            data_type,
        }
    }

    /// Size of this entry in bytes, rounded up from bits.
    pub fn byte_length(&self) -> usize {
        self.bit_length.div_ceil(8) as usize
    }
}

/// Resolved location of a PDO entry within the process image.
///
/// Valid only for the configuration generation it was resolved under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PdoOffset {
    /// Byte offset into the direction's image.
    pub byte: usize,
    /// Bit offset within the byte (0..=7).
    pub bit: u8,
}

impl PdoOffset {
    /// Sentinel for an entry the master could not resolve. Fails every
    /// bounds check, so reads error out and writes are dropped.
    pub const INVALID: PdoOffset = PdoOffset {
        byte: usize::MAX,
        bit: 0,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_length_rounds_up() {
        let entry = PdoEntry::input(0, 0x6000, 1, 1, DataType::Uint8);
        assert_eq!(entry.byte_length(), 1);
        let entry = PdoEntry::input(0, 0x6000, 1, 12, DataType::Uint16);
        assert_eq!(entry.byte_length(), 2);
        let entry = PdoEntry::input(0, 0x6000, 1, 24, DataType::Int32);
        assert_eq!(entry.byte_length(), 3);
        let entry = PdoEntry::input(0, 0x6000, 1, 64, DataType::Uint64);
        assert_eq!(entry.byte_length(), 8);
    }

    #[test]
    fn invalid_offset_is_out_of_range() {
        assert_eq!(PdoOffset::INVALID.byte, usize::MAX);
    }
}
