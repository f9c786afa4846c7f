//! QSPI transaction model and standard NOR flash opcodes.

pub mod opcodes;

mod transaction;

pub use transaction::{DataDirection, Transaction};

use bitflags::bitflags;

bitflags! {
    /// Flash status register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        /// Write In Progress - set while a program or erase is running.
        const WIP = 1 << 0;
        /// Write Enable Latch - set by WREN, cleared when the operation
        /// completes.
        const WEL = 1 << 1;
    }
}
