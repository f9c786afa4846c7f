//! Flash geometry discovered from the SFDP parameter table.

/// One erase granularity supported by the chip.
///
/// A zeroed entry (exponent or opcode zero) means "not supported"; a
/// populated entry describes blocks of `1 << size_exp` bytes erasable
/// with `opcode`. The erase planner selects units by size; table order
/// only matters as a tie-break between equal sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EraseUnit {
    /// Block size exponent; the block size is `1 << size_exp` bytes.
    pub size_exp: u8,
    /// Instruction that erases one block of this size.
    pub opcode: u8,
}

impl EraseUnit {
    /// Whether this entry describes a usable erase unit.
    ///
    /// The flash addressing limit is 31 bits, so exponents of 31 or more
    /// are treated as unset alongside zeroed entries.
    pub fn is_defined(&self) -> bool {
        self.size_exp > 0 && self.size_exp < 31 && self.opcode != 0
    }

    /// Block size in bytes, or 0 for an unset entry.
    pub fn size(&self) -> u32 {
        if self.is_defined() {
            1 << self.size_exp
        } else {
            0
        }
    }
}

/// Geometry of the attached flash chip.
///
/// Built once during bring-up by the SFDP decoder and immutable
/// afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Total addressable bytes. Greater than zero after a successful
    /// decode.
    pub capacity: u32,
    /// Up to four erase granularities.
    pub erase_units: [EraseUnit; 4],
}

impl Geometry {
    /// Whether `[addr, addr + len)` lies within the flash.
    pub fn contains(&self, addr: u32, len: usize) -> bool {
        addr as u64 + len as u64 <= self.capacity as u64
    }

    /// Size of the smallest defined erase unit, if any.
    pub fn smallest_erase_size(&self) -> Option<u32> {
        self.erase_units
            .iter()
            .filter(|unit| unit.is_defined())
            .map(|unit| unit.size())
            .min()
    }

    /// Erase-page layout summary exposed to callers: the first erase
    /// unit's block size and how many such blocks cover the chip.
    pub fn page_layout(&self) -> PageLayout {
        let page_size = self.erase_units[0].size().max(1);
        PageLayout {
            page_size,
            page_count: self.capacity / page_size,
        }
    }
}

/// Uniform erase-page layout of the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    /// Size of one erase page in bytes.
    pub page_size: u32,
    /// Number of erase pages covering the chip.
    pub page_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry_16m() -> Geometry {
        Geometry {
            capacity: 16 * 1024 * 1024,
            erase_units: [
                EraseUnit { size_exp: 12, opcode: 0x20 },
                EraseUnit { size_exp: 15, opcode: 0x52 },
                EraseUnit { size_exp: 16, opcode: 0xD8 },
                EraseUnit::default(),
            ],
        }
    }

    #[test]
    fn zeroed_unit_is_unset() {
        let unit = EraseUnit::default();
        assert!(!unit.is_defined());
        assert_eq!(unit.size(), 0);
    }

    #[test]
    fn oversized_exponent_is_unset() {
        let unit = EraseUnit { size_exp: 31, opcode: 0xD8 };
        assert!(!unit.is_defined());
    }

    #[test]
    fn range_validation() {
        let geometry = geometry_16m();
        assert!(geometry.contains(0, 16 * 1024 * 1024));
        assert!(geometry.contains(0xFF_FFFF, 1));
        assert!(!geometry.contains(0xFF_FFFF, 2));
        // Must not wrap on large inputs.
        assert!(!geometry.contains(u32::MAX, usize::MAX));
    }

    #[test]
    fn smallest_unit_and_layout() {
        let geometry = geometry_16m();
        assert_eq!(geometry.smallest_erase_size(), Some(4096));
        let layout = geometry.page_layout();
        assert_eq!(layout.page_size, 4096);
        assert_eq!(layout.page_count, 4096);
    }
}
