//! Error types for qflash-core.

use thiserror::Error;

/// Transport-level failure.
///
/// Raised either synchronously, when the peripheral rejects a command
/// before any completion could be expected, or asynchronously, when the
/// interrupt/DMA path reports a fault.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    /// Command rejected by the peripheral, or a hardware fault reported
    /// by the interrupt/DMA path.
    #[error("QSPI bus error")]
    Bus,
    /// No completion signal arrived within the configured transfer timeout.
    #[error("QSPI transfer timed out")]
    Timeout,
}

/// SFDP discovery failure. Fatal for bring-up.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The 4-byte "SFDP" signature was not found at offset 0.
    #[error("invalid SFDP signature")]
    BadSignature,
    /// The first parameter table is not the standard JEDEC table, or the
    /// table is too short to decode.
    #[error("unsupported SFDP parameter table")]
    UnsupportedTable,
}

/// Driver error type.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Bring-up has not completed successfully; no operation is permitted.
    #[error("device not initialized")]
    NotInitialized,
    /// Requested address/size exceeds the discovered capacity.
    #[error("address out of range")]
    OutOfRange,
    /// Write or erase attempted while the protection flag is set.
    #[error("flash is write protected")]
    WriteProtected,
    /// No discovered erase unit satisfies the requested address/size
    /// combination, or the bus clock cannot be divided down far enough.
    #[error("operation not supported by discovered geometry")]
    Unsupported,
    /// Identification bytes read at bring-up did not match the expected
    /// JEDEC ID.
    #[error("JEDEC ID mismatch")]
    DeviceMismatch,
    /// The discovery table could not be decoded.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    /// The transport failed.
    #[error(transparent)]
    Io(#[from] IoError),
}

/// Result type alias using the driver [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
