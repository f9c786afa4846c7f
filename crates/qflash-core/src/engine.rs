//! Command/transaction engine.
//!
//! Executes one bus transaction at a time: issue the command header,
//! arm the DMA transfer for the data phase if there is one, then block
//! the calling thread until the interrupt/DMA path signals completion.
//! Serialization of callers is the facade's job; the engine itself is
//! only ever reached through the device's gate.

use std::time::Duration;

use crate::bus::QspiBus;
use crate::error::IoError;
use crate::qspi::{DataDirection, Transaction};
use crate::sync::Completion;

pub(crate) struct Engine<B> {
    bus: B,
    completion: Completion,
    timeout: Duration,
}

impl<B: QspiBus> Engine<B> {
    pub(crate) fn new(mut bus: B, timeout: Duration) -> Self {
        let completion = Completion::new();
        bus.bind(completion.notifier());
        Self {
            bus,
            completion,
            timeout,
        }
    }

    pub(crate) fn configure(&mut self, prescaler: u8) -> Result<(), IoError> {
        self.bus.configure(prescaler)
    }

    /// Execute a transaction with no data phase.
    pub(crate) fn command(&mut self, txn: &Transaction) -> Result<(), IoError> {
        debug_assert_eq!(txn.direction, DataDirection::None);
        log::debug!("instruction {:#04x}", txn.instruction);

        self.completion.reset();
        self.bus.issue(txn)?;
        self.completion.wait(self.timeout)
    }

    /// Execute a transaction with a device-to-memory data phase.
    pub(crate) fn read(&mut self, txn: &Transaction, buf: &mut [u8]) -> Result<(), IoError> {
        debug_assert_eq!(txn.direction, DataDirection::Read);
        debug_assert_eq!(txn.len, buf.len());
        log::debug!("instruction {:#04x}, read {} bytes", txn.instruction, buf.len());

        self.completion.reset();
        self.bus.issue(txn)?;
        self.bus.start_read(buf)?;
        self.completion.wait(self.timeout)
    }

    /// Execute a transaction with a memory-to-device data phase.
    pub(crate) fn write(&mut self, txn: &Transaction, data: &[u8]) -> Result<(), IoError> {
        debug_assert_eq!(txn.direction, DataDirection::Write);
        debug_assert_eq!(txn.len, data.len());
        log::debug!("instruction {:#04x}, write {} bytes", txn.instruction, data.len());

        self.completion.reset();
        self.bus.issue(txn)?;
        self.bus.start_write(data)?;
        self.completion.wait(self.timeout)
    }
}
