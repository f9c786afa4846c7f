//! SFDP decoding implementation.

use crate::error::DiscoveryError;
use crate::geometry::{EraseUnit, Geometry};

use super::{HEADER_LEN, MIN_TABLE_LEN, PARAM_ID_JEDEC, SFDP_SIGNATURE};

/// Location of the JEDEC parameter table inside the SFDP area.
///
/// Returned by [`parse_header`]; tells the caller where to point the
/// second discovery read and how much to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLocation {
    /// Byte address of the table in the SFDP area (24-bit).
    pub pointer: u32,
    /// Table length in 4-byte words.
    pub length_words: u8,
}

impl TableLocation {
    /// Table length in bytes.
    pub fn length_bytes(&self) -> usize {
        self.length_words as usize * 4
    }
}

fn word(raw: &[u8], index: usize) -> u32 {
    let offset = index * 4;
    u32::from_le_bytes([
        raw[offset],
        raw[offset + 1],
        raw[offset + 2],
        raw[offset + 3],
    ])
}

/// Validate the SFDP header block and locate the JEDEC parameter table.
///
/// `raw` holds the first [`HEADER_LEN`] bytes of the SFDP area: the SFDP
/// header followed by the first parameter header. Fails with
/// [`DiscoveryError::BadSignature`] if the "SFDP" signature is missing
/// and with [`DiscoveryError::UnsupportedTable`] if the first parameter
/// header does not identify the standard JEDEC table.
pub fn parse_header(raw: &[u8]) -> Result<TableLocation, DiscoveryError> {
    if raw.len() < HEADER_LEN {
        return Err(DiscoveryError::BadSignature);
    }

    let signature = word(raw, 0);
    if signature != SFDP_SIGNATURE {
        log::error!(
            "invalid SFDP signature: expected {:#010x}, received {:#010x}",
            SFDP_SIGNATURE,
            signature
        );
        return Err(DiscoveryError::BadSignature);
    }

    // First parameter header: ID byte, revision, length in words, then a
    // 24-bit table pointer.
    if raw[8] != PARAM_ID_JEDEC {
        log::error!(
            "invalid parameter table id: expected {:#04x}, received {:#04x}",
            PARAM_ID_JEDEC,
            raw[8]
        );
        return Err(DiscoveryError::UnsupportedTable);
    }

    Ok(TableLocation {
        pointer: u32::from_le_bytes([raw[12], raw[13], raw[14], 0]),
        length_words: raw[11],
    })
}

/// Decode the JEDEC parameter table into a [`Geometry`].
///
/// `raw` holds the table words fetched from the location reported by
/// [`parse_header`]. Only words 2, 8 and 9 are consumed:
///
/// - word 2 is the density. Bit 31 set means the remaining bits hold a
///   size exponent in bits, converted to bytes by subtracting 3 and
///   capped at 2^31 (the driver's addressing limit is 31 bits). Bit 31
///   clear means the remaining bits hold the bit count minus one.
/// - words 8 and 9 hold four erase-unit descriptors, two per word, each
///   a size exponent byte followed by an opcode byte.
pub fn parse_table(raw: &[u8]) -> Result<Geometry, DiscoveryError> {
    if raw.len() < MIN_TABLE_LEN {
        return Err(DiscoveryError::UnsupportedTable);
    }

    let density = word(raw, 1);
    let capacity = if density & (1 << 31) != 0 {
        // Convert the bit exponent to a byte exponent.
        let bytes_exp = (density & 0x7FFF_FFFF).saturating_sub(3);
        if bytes_exp < 31 {
            1 << bytes_exp
        } else {
            1 << 31
        }
    } else {
        (density >> 3) + 1
    };

    let dw8 = word(raw, 7);
    let dw9 = word(raw, 8);
    let erase_units = [
        EraseUnit {
            size_exp: (dw8 & 0xFF) as u8,
            opcode: ((dw8 >> 8) & 0xFF) as u8,
        },
        EraseUnit {
            size_exp: ((dw8 >> 16) & 0xFF) as u8,
            opcode: ((dw8 >> 24) & 0xFF) as u8,
        },
        EraseUnit {
            size_exp: (dw9 & 0xFF) as u8,
            opcode: ((dw9 >> 8) & 0xFF) as u8,
        },
        EraseUnit {
            size_exp: ((dw9 >> 16) & 0xFF) as u8,
            opcode: ((dw9 >> 24) & 0xFF) as u8,
        },
    ];

    Ok(Geometry {
        capacity,
        erase_units,
    })
}

/// Decode a geometry from the header block and the parameter table in
/// one step.
///
/// Pure function of the two buffers; identical inputs always yield the
/// identical geometry. `table` may hold more bytes than the header
/// advertises, the excess is ignored.
pub fn decode(header: &[u8], table: &[u8]) -> Result<Geometry, DiscoveryError> {
    let location = parse_header(header)?;
    let len = core::cmp::min(location.length_bytes(), table.len());
    parse_table(&table[..len])
}
