//! Address planning: erase-unit selection and page-aligned write
//! chunking.
//!
//! Both planners are pure and lazy - they emit steps for the facade to
//! drive through the transaction engine, and never touch the bus
//! themselves.

use crate::error::Error;
use crate::geometry::Geometry;

/// One step of an erase plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseStep {
    /// Erase the entire chip with the dedicated opcode. Carries no
    /// address phase.
    Chip {
        /// Bytes covered, always the full capacity.
        len: u32,
    },
    /// Erase one block.
    Block {
        /// Erase instruction for this block size.
        opcode: u8,
        /// Block start address, aligned to `len`.
        addr: u32,
        /// Block size in bytes.
        len: u32,
    },
}

impl EraseStep {
    /// Bytes covered by this step.
    pub fn len(&self) -> u32 {
        match self {
            EraseStep::Chip { len } => *len,
            EraseStep::Block { len, .. } => *len,
        }
    }

    /// An erase plan never emits empty steps.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Lazy iterator over the erase steps covering `[addr, addr + len)`.
///
/// Terminates after yielding an error.
pub struct ErasePlan<'a> {
    geometry: &'a Geometry,
    addr: u32,
    remaining: u32,
    failed: bool,
}

/// Plan an erase of `len` bytes starting at `addr`.
///
/// A request covering the whole chip from address 0 becomes a single
/// [`EraseStep::Chip`]. Otherwise each step picks the largest defined
/// erase unit that fits in the remaining length and whose size divides
/// the current address. When two table entries share a size, the first
/// entry wins - the scan keeps an earlier unit over a later one of
/// equal size, so duplicate descriptors resolve deterministically.
///
/// If no unit qualifies at the current address the plan fails with
/// [`Error::Unsupported`].
pub fn plan_erase(geometry: &Geometry, addr: u32, len: u32) -> ErasePlan<'_> {
    ErasePlan {
        geometry,
        addr,
        remaining: len,
        failed: false,
    }
}

impl Iterator for ErasePlan<'_> {
    type Item = Result<EraseStep, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == 0 {
            return None;
        }

        if self.addr == 0 && self.remaining == self.geometry.capacity {
            let len = self.remaining;
            self.remaining = 0;
            return Some(Ok(EraseStep::Chip { len }));
        }

        let mut best = None;
        for unit in self.geometry.erase_units.iter().filter(|u| u.is_defined()) {
            let size = unit.size();
            if size <= self.remaining && self.addr % size == 0 {
                // Strict comparison keeps the earlier of two equal-size
                // entries.
                if best.map_or(true, |b: crate::geometry::EraseUnit| size > b.size()) {
                    best = Some(*unit);
                }
            }
        }

        match best {
            Some(unit) => {
                let step = EraseStep::Block {
                    opcode: unit.opcode,
                    addr: self.addr,
                    len: unit.size(),
                };
                self.addr += unit.size();
                self.remaining -= unit.size();
                Some(Ok(step))
            }
            None => {
                log::debug!(
                    "no erase unit fits at {:#x}, {} bytes remaining",
                    self.addr,
                    self.remaining
                );
                self.failed = true;
                Some(Err(Error::Unsupported))
            }
        }
    }
}

/// Lazy iterator over page-aligned write chunks.
///
/// Yields `(addr, len)` pairs that never exceed the page size and never
/// cross a page boundary; concatenated in order they reconstruct the
/// requested range exactly.
pub struct PageChunks {
    addr: u32,
    remaining: usize,
    page_size: u32,
}

/// Split a write of `len` bytes at `addr` into page-sized,
/// boundary-respecting chunks. `page_size` must be non-zero.
pub fn page_chunks(addr: u32, len: usize, page_size: u32) -> PageChunks {
    debug_assert!(page_size > 0);
    PageChunks {
        addr,
        remaining: len,
        page_size,
    }
}

impl Iterator for PageChunks {
    type Item = (u32, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        // Distance to the next page boundary caps the chunk, which also
        // caps it at one page.
        let to_boundary = (self.page_size - self.addr % self.page_size) as usize;
        let len = self.remaining.min(to_boundary);
        let chunk = (self.addr, len);

        self.addr += len as u32;
        self.remaining -= len;
        Some(chunk)
    }
}
