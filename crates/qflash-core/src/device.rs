//! Flash device facade.
//!
//! Owns the transaction engine behind a mutex, runs bring-up, and
//! exposes the block-device operations. Shared references suffice for
//! all post-init operations, so a `FlashDevice` can sit behind an `Arc`
//! and serve multiple threads; the engine gate serializes them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::bus::QspiBus;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::geometry::{Geometry, PageLayout};
use crate::planner::{page_chunks, plan_erase, EraseStep};
use crate::qspi::{opcodes, Status, Transaction};
use crate::sfdp;

/// Program page size. NOR flash pages are 256 bytes; writes never cross
/// a page boundary.
pub const PAGE_SIZE: u32 = 256;

/// Length of the JEDEC identification read at bring-up.
pub const JEDEC_ID_LEN: usize = 3;

/// Largest prescaler the peripheral accepts. The bus clock is divided
/// by `prescaler + 1`.
const CLOCK_PRESCALER_MAX: u32 = 255;

/// Ceiling applied to the bus clock during bring-up so the SFDP and
/// identification reads work on any chip.
const SFDP_READ_MAX_HZ: u32 = 50_000_000;

/// Static configuration of a [`FlashDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Expected 3-byte JEDEC manufacturer/device ID. Bring-up fails with
    /// [`Error::DeviceMismatch`] if the chip reports anything else.
    pub jedec_id: [u8; JEDEC_ID_LEN],
    /// Input clock of the QSPI peripheral in hertz.
    pub clock_hz: u32,
    /// Maximum bus frequency the attached chip tolerates, in hertz.
    pub max_frequency_hz: u32,
    /// Upper bound on the wait for a single transfer completion.
    pub transfer_timeout: Duration,
}

enum State {
    Uninitialized,
    Ready {
        geometry: Geometry,
        layout: PageLayout,
    },
    Failed,
}

/// A QSPI NOR flash block device.
///
/// Construct with [`new`](FlashDevice::new), then call
/// [`init`](FlashDevice::init) once before any other operation. A failed
/// bring-up latches the device; every subsequent operation returns
/// [`Error::NotInitialized`].
pub struct FlashDevice<B> {
    config: DeviceConfig,
    engine: Mutex<Engine<B>>,
    state: State,
    write_protect: AtomicBool,
}

impl<B: QspiBus> FlashDevice<B> {
    /// Wrap a bus transport. No bus traffic happens until
    /// [`init`](FlashDevice::init).
    pub fn new(bus: B, config: DeviceConfig) -> Self {
        Self {
            engine: Mutex::new(Engine::new(bus, config.transfer_timeout)),
            config,
            state: State::Uninitialized,
            write_protect: AtomicBool::new(false),
        }
    }

    /// Bring the device up: clock the bus down for discovery, verify the
    /// JEDEC ID, and decode the SFDP tables into a geometry.
    ///
    /// Any failure latches the device in a failed state.
    pub fn init(&mut self) -> Result<()> {
        match self.bring_up() {
            Ok((geometry, layout)) => {
                log::info!(
                    "flash initialized: {} bytes, {} x {} byte erase pages",
                    geometry.capacity,
                    layout.page_count,
                    layout.page_size
                );
                self.state = State::Ready { geometry, layout };
                Ok(())
            }
            Err(e) => {
                log::error!("flash bring-up failed: {e}");
                self.state = State::Failed;
                Err(e)
            }
        }
    }

    fn bring_up(&mut self) -> Result<(Geometry, PageLayout)> {
        let prescaler = clock_prescaler(&self.config)?;
        let mut engine = self.lock_engine();
        engine.configure(prescaler)?;

        // Identification first; a wrong or absent chip must not get as
        // far as SFDP decoding.
        let mut id = [0u8; JEDEC_ID_LEN];
        engine.read(&Transaction::read_register(opcodes::RDID, JEDEC_ID_LEN), &mut id)?;
        if id != self.config.jedec_id {
            log::error!(
                "JEDEC ID mismatch: expected {:02x?}, read {:02x?}",
                self.config.jedec_id,
                id
            );
            return Err(Error::DeviceMismatch);
        }

        let mut header = [0u8; sfdp::HEADER_LEN];
        engine.read(&Transaction::read_sfdp(0, sfdp::HEADER_LEN), &mut header)?;
        let location = sfdp::parse_header(&header)?;

        let mut table = vec![0u8; location.length_bytes()];
        engine.read(
            &Transaction::read_sfdp(location.pointer, table.len()),
            &mut table,
        )?;
        let geometry = sfdp::parse_table(&table)?;
        let layout = geometry.page_layout();
        Ok((geometry, layout))
    }

    /// Read `buf.len()` bytes starting at `addr`.
    pub fn read(&self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let geometry = self.geometry()?;
        if !geometry.contains(addr, buf.len()) {
            return Err(Error::OutOfRange);
        }
        if buf.is_empty() {
            return Ok(());
        }

        let mut engine = self.lock_engine();
        engine.read(&Transaction::read(opcodes::READ, addr, buf.len()), buf)?;
        Ok(())
    }

    /// Program `data` starting at `addr`.
    ///
    /// The range is split into page chunks; each chunk is write-enabled,
    /// programmed, and waited out before the next one starts. NOR
    /// programming only clears bits, so the range is expected to be
    /// erased beforehand.
    pub fn write(&self, addr: u32, data: &[u8]) -> Result<()> {
        let geometry = self.geometry()?;
        if self.write_protect.load(Ordering::Acquire) {
            return Err(Error::WriteProtected);
        }
        if !geometry.contains(addr, data.len()) {
            return Err(Error::OutOfRange);
        }
        if data.is_empty() {
            return Ok(());
        }

        let mut engine = self.lock_engine();
        let mut offset = 0usize;
        for (chunk_addr, chunk_len) in page_chunks(addr, data.len(), PAGE_SIZE) {
            let chunk = &data[offset..offset + chunk_len];
            engine.command(&Transaction::command(opcodes::WREN))?;
            engine.write(
                &Transaction::write(opcodes::PP, chunk_addr, chunk_len),
                chunk,
            )?;
            wait_until_ready(&mut engine)?;
            offset += chunk_len;
        }
        Ok(())
    }

    /// Erase `len` bytes starting at `addr`.
    ///
    /// Both must line up with the discovered erase units or the call
    /// fails with [`Error::Unsupported`]. Erasing the whole chip from
    /// address 0 uses the dedicated chip-erase instruction.
    pub fn erase(&self, addr: u32, len: u32) -> Result<()> {
        let geometry = self.geometry()?;
        if self.write_protect.load(Ordering::Acquire) {
            return Err(Error::WriteProtected);
        }
        if !geometry.contains(addr, len as usize) {
            return Err(Error::OutOfRange);
        }
        if len == 0 {
            return Ok(());
        }

        let mut engine = self.lock_engine();
        for step in plan_erase(&geometry, addr, len) {
            let step = step?;
            engine.command(&Transaction::command(opcodes::WREN))?;
            match step {
                EraseStep::Chip { len } => {
                    log::debug!("chip erase, {len} bytes");
                    engine.command(&Transaction::command(opcodes::CE))?;
                }
                EraseStep::Block { opcode, addr, len } => {
                    log::debug!("erase {len} bytes at {addr:#x} with {opcode:#04x}");
                    engine.command(&Transaction::erase(opcode, addr))?;
                }
            }
            wait_until_ready(&mut engine)?;
        }
        Ok(())
    }

    /// Set or clear the software write-protect flag.
    ///
    /// While set, [`write`](FlashDevice::write) and
    /// [`erase`](FlashDevice::erase) fail with [`Error::WriteProtected`]
    /// without touching the bus. Reads are unaffected.
    pub fn set_write_protect(&self, enabled: bool) -> Result<()> {
        self.check_ready()?;
        self.write_protect.store(enabled, Ordering::Release);
        log::debug!("write protect {}", if enabled { "set" } else { "cleared" });
        Ok(())
    }

    /// The geometry discovered at bring-up.
    pub fn geometry(&self) -> Result<Geometry> {
        match &self.state {
            State::Ready { geometry, .. } => Ok(*geometry),
            _ => Err(Error::NotInitialized),
        }
    }

    /// Uniform erase-page layout derived from the discovered geometry.
    pub fn page_layout(&self) -> Result<PageLayout> {
        match &self.state {
            State::Ready { layout, .. } => Ok(*layout),
            _ => Err(Error::NotInitialized),
        }
    }

    fn check_ready(&self) -> Result<()> {
        match &self.state {
            State::Ready { .. } => Ok(()),
            _ => Err(Error::NotInitialized),
        }
    }

    fn lock_engine(&self) -> MutexGuard<'_, Engine<B>> {
        // Poisoning cannot leave the engine in a bad state; every
        // transaction resets the completion slot before use.
        self.engine.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Poll the status register until the write-in-progress bit clears.
fn wait_until_ready<B: QspiBus>(engine: &mut Engine<B>) -> Result<()> {
    loop {
        let mut reg = [0u8; 1];
        engine.read(&Transaction::read_register(opcodes::RDSR, 1), &mut reg)?;
        if !Status::from_bits_truncate(reg[0]).contains(Status::WIP) {
            return Ok(());
        }
    }
}

/// Smallest prescaler that keeps the divided clock at or below both the
/// chip's maximum and the discovery ceiling.
fn clock_prescaler(config: &DeviceConfig) -> Result<u8> {
    let limit = config.max_frequency_hz.min(SFDP_READ_MAX_HZ);
    if limit == 0 {
        return Err(Error::Unsupported);
    }
    for prescaler in 0..=CLOCK_PRESCALER_MAX {
        if config.clock_hz / (prescaler + 1) <= limit {
            return Ok(prescaler as u8);
        }
    }
    log::error!(
        "cannot divide {} Hz down to {} Hz with an 8-bit prescaler",
        config.clock_hz,
        limit
    );
    Err(Error::Unsupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(clock_hz: u32, max_frequency_hz: u32) -> DeviceConfig {
        DeviceConfig {
            jedec_id: [0xEF, 0x40, 0x18],
            clock_hz,
            max_frequency_hz,
            transfer_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn prescaler_passes_slow_clock_through() {
        assert_eq!(clock_prescaler(&config(40_000_000, 80_000_000)), Ok(0));
    }

    #[test]
    fn prescaler_divides_to_discovery_ceiling() {
        // 96 MHz must come down to <= 50 MHz even though the chip takes
        // 80 MHz.
        assert_eq!(clock_prescaler(&config(96_000_000, 80_000_000)), Ok(1));
    }

    #[test]
    fn prescaler_honors_chip_limit() {
        assert_eq!(clock_prescaler(&config(96_000_000, 30_000_000)), Ok(3));
    }

    #[test]
    fn prescaler_range_exhausted() {
        assert_eq!(
            clock_prescaler(&config(u32::MAX, 1)),
            Err(Error::Unsupported)
        );
    }
}
