//! QSPI transaction description.

use super::opcodes;

/// Direction of a transaction's data phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataDirection {
    /// No data phase; the transaction is the command header alone.
    #[default]
    None,
    /// Data moves from the device into a caller-owned buffer.
    Read,
    /// Data moves from a caller-owned buffer into the device.
    Write,
}

/// A single QSPI bus transaction.
///
/// Describes the command header (instruction, optional address, dummy
/// cycles) and the shape of the data phase. Buffers are not part of the
/// transaction; they are handed to the engine alongside it, sized to
/// `len`. Created per call, consumed synchronously, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    /// The instruction opcode byte.
    pub instruction: u8,
    /// Flash byte address, if the command carries an address phase.
    /// Addresses are transferred as 24-bit values.
    pub address: Option<u32>,
    /// Wait cycles between the address and data phases.
    pub dummy_cycles: u8,
    /// Data phase direction.
    pub direction: DataDirection,
    /// Byte count of the data phase.
    pub len: usize,
}

impl Transaction {
    /// A command with no address and no data phase (e.g. WREN).
    pub fn command(instruction: u8) -> Self {
        Self {
            instruction,
            address: None,
            dummy_cycles: 0,
            direction: DataDirection::None,
            len: 0,
        }
    }

    /// Read a register with no address phase (e.g. RDSR, RDID).
    pub fn read_register(instruction: u8, len: usize) -> Self {
        Self {
            instruction,
            address: None,
            dummy_cycles: 0,
            direction: DataDirection::Read,
            len,
        }
    }

    /// Read `len` bytes of flash data starting at `addr`.
    pub fn read(instruction: u8, addr: u32, len: usize) -> Self {
        Self {
            instruction,
            address: Some(addr),
            dummy_cycles: 0,
            direction: DataDirection::Read,
            len,
        }
    }

    /// Write `len` bytes of flash data starting at `addr`.
    pub fn write(instruction: u8, addr: u32, len: usize) -> Self {
        Self {
            instruction,
            address: Some(addr),
            dummy_cycles: 0,
            direction: DataDirection::Write,
            len,
        }
    }

    /// Erase one block at `addr` with the block's dedicated opcode.
    pub fn erase(instruction: u8, addr: u32) -> Self {
        Self {
            instruction,
            address: Some(addr),
            dummy_cycles: 0,
            direction: DataDirection::None,
            len: 0,
        }
    }

    /// Read `len` bytes of the SFDP area starting at `addr`.
    ///
    /// SFDP reads require 8 dummy cycles between address and data.
    pub fn read_sfdp(addr: u32, len: usize) -> Self {
        Self {
            instruction: opcodes::RDSFDP,
            address: Some(addr),
            dummy_cycles: 8,
            direction: DataDirection::Read,
            len,
        }
    }

    /// Returns true if this transaction has a data phase.
    pub fn has_data(&self) -> bool {
        self.direction != DataDirection::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_has_no_data_phase() {
        let txn = Transaction::command(opcodes::WREN);
        assert!(!txn.has_data());
        assert_eq!(txn.address, None);
        assert_eq!(txn.len, 0);
    }

    #[test]
    fn sfdp_read_carries_dummy_cycles() {
        let txn = Transaction::read_sfdp(0x1C, 36);
        assert_eq!(txn.instruction, opcodes::RDSFDP);
        assert_eq!(txn.dummy_cycles, 8);
        assert_eq!(txn.address, Some(0x1C));
        assert_eq!(txn.direction, DataDirection::Read);
        assert_eq!(txn.len, 36);
    }
}
