//! SFDP (Serial Flash Discoverable Parameters) decoding.
//!
//! SFDP is a standardized table stored in a reserved area of the flash
//! chip (JEDEC JESD216), read with the RDSFDP command. The driver uses it
//! to discover capacity and erase-block layout at bring-up instead of
//! carrying static per-chip tables.
//!
//! Decoding is split in two pure steps so the bus reads stay outside the
//! decoder: [`parse_header`] validates the signature and the first
//! parameter header and returns where the JEDEC parameter table lives;
//! the caller fetches that many words and hands them to [`parse_table`],
//! which yields the [`Geometry`](crate::geometry::Geometry).

mod decoder;

pub use decoder::{decode, parse_header, parse_table, TableLocation};

/// SFDP signature magic value ("SFDP" in little-endian).
pub const SFDP_SIGNATURE: u32 = 0x5044_4653;

/// Bytes covered by [`parse_header`]: the 8-byte SFDP header followed by
/// the first 8-byte parameter header.
pub const HEADER_LEN: usize = 16;

/// Minimum JEDEC parameter table length accepted by [`parse_table`]:
/// 9 words per the original JESD216 revision.
pub const MIN_TABLE_LEN: usize = 36;

/// Parameter ID byte of the standard JEDEC table.
pub(crate) const PARAM_ID_JEDEC: u8 = 0x00;
