//! qflash-core - QSPI NOR flash driver core
//!
//! This crate implements a byte-addressable NOR flash block device driven
//! over a quad-lane serial bus. The transport peripheral is abstracted
//! behind the [`bus::QspiBus`] trait: the driver issues command headers
//! synchronously, arms DMA transfers for data phases, and blocks the
//! calling thread until the transport's interrupt/DMA path reports the
//! outcome through a [`sync::Notifier`].
//!
//! Flash geometry (capacity and erase-block layout) is not configured
//! statically; it is discovered at bring-up by reading and decoding the
//! chip's SFDP parameter table.
//!
//! # Example
//!
//! ```ignore
//! use qflash_core::device::{DeviceConfig, FlashDevice};
//!
//! let mut device = FlashDevice::new(bus, DeviceConfig {
//!     jedec_id: [0xEF, 0x40, 0x18],
//!     clock_hz: 96_000_000,
//!     max_frequency_hz: 80_000_000,
//!     transfer_timeout: core::time::Duration::from_secs(1),
//! });
//! device.init()?;
//!
//! let mut buf = [0u8; 256];
//! device.read(0x1000, &mut buf)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bus;
pub mod device;
pub mod error;
pub mod geometry;
pub mod planner;
pub mod qspi;
pub mod sfdp;
pub mod sync;

mod engine;

pub use error::{DiscoveryError, Error, IoError, Result};
