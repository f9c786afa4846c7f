//! Transport interface required from the QSPI peripheral.
//!
//! Implementations wrap a concrete bus peripheral (or a simulator). The
//! driver issues command headers synchronously through [`QspiBus::issue`]
//! and arms DMA transfers for data phases; the transport's interrupt/DMA
//! completion path reports the outcome through the [`Notifier`] bound at
//! construction time. The driver never polls the peripheral - the calling
//! thread blocks on the completion signal until the notifier fires.

use crate::error::IoError;
use crate::qspi::Transaction;
use crate::sync::Notifier;

/// A QSPI bus peripheral capable of executing flash transactions.
pub trait QspiBus: Send {
    /// Bind the completion notifier.
    ///
    /// Called once before any transaction is issued. The transport must
    /// invoke [`Notifier::complete`] from its interrupt/DMA path exactly
    /// once per accepted transaction.
    fn bind(&mut self, notifier: Notifier);

    /// Apply the clock prescaler computed at bring-up.
    ///
    /// The bus clock is divided by `prescaler + 1`.
    fn configure(&mut self, prescaler: u8) -> Result<(), IoError>;

    /// Issue the command header of a transaction.
    ///
    /// This is the immediate accept/reject point: an `Err` here means the
    /// peripheral refused the command and no completion will be signaled.
    /// On `Ok`, a transaction without a data phase completes through the
    /// notifier; a transaction with a data phase completes after the
    /// matching [`start_read`](QspiBus::start_read) or
    /// [`start_write`](QspiBus::start_write).
    fn issue(&mut self, txn: &Transaction) -> Result<(), IoError>;

    /// Arm a DMA transfer moving data from the device into `buf`.
    fn start_read(&mut self, buf: &mut [u8]) -> Result<(), IoError>;

    /// Arm a DMA transfer moving `data` into the device.
    fn start_write(&mut self, data: &[u8]) -> Result<(), IoError>;
}
