//! qflash-dummy - In-memory QSPI flash simulator
//!
//! This crate provides a bus transport that emulates a NOR flash chip in
//! memory, including its SFDP area. It's useful for testing and
//! development without real hardware: the driver runs its full bring-up
//! and data path against it, and tests inspect the simulated flash
//! contents through a [`SimHandle`].
//!
//! The simulator completes every transaction synchronously through the
//! bound notifier, standing in for the interrupt/DMA path. Fault
//! injection covers the three transport failure shapes: rejected
//! commands, error completions, and dropped completions (timeouts).

use std::sync::{Arc, Mutex, MutexGuard};

use qflash_core::bus::QspiBus;
use qflash_core::error::IoError;
use qflash_core::qspi::{opcodes, DataDirection, Transaction};
use qflash_core::sync::{Notifier, Outcome};

/// One erase granularity advertised in the simulated SFDP table.
#[derive(Debug, Clone, Copy)]
pub struct SimEraseUnit {
    /// Block size exponent (block size is `1 << size_exp`).
    pub size_exp: u8,
    /// Erase instruction for this block size.
    pub opcode: u8,
}

/// Configuration of the simulated chip.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// JEDEC ID returned for RDID.
    pub jedec_id: [u8; 3],
    /// Flash capacity in bytes. Must be a power of two for the SFDP
    /// density encoding.
    pub capacity: u32,
    /// Up to four erase units advertised through SFDP. Zeroed entries
    /// are emitted as unset descriptors.
    pub erase_units: [SimEraseUnit; 4],
    /// How many RDSR reads report write-in-progress after a program or
    /// erase before the chip goes idle.
    pub busy_polls: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        // W25Q128-shaped: 16 MiB with 4K/32K/64K erase.
        Self {
            jedec_id: [0xEF, 0x40, 0x18],
            capacity: 16 * 1024 * 1024,
            erase_units: [
                SimEraseUnit { size_exp: 12, opcode: 0x20 },
                SimEraseUnit { size_exp: 15, opcode: 0x52 },
                SimEraseUnit { size_exp: 16, opcode: 0xD8 },
                SimEraseUnit { size_exp: 0, opcode: 0 },
            ],
            busy_polls: 1,
        }
    }
}

impl SimConfig {
    /// Build the simulated SFDP area: the SFDP header, one parameter
    /// header pointing at offset 0x10, and a 9-word JEDEC table.
    fn sfdp_image(&self) -> Vec<u8> {
        let mut image = vec![0xFFu8; 16 + 36];

        image[0..4].copy_from_slice(b"SFDP");
        image[4] = 0x00; // minor revision
        image[5] = 0x01; // major revision
        image[6] = 0x00; // one parameter header

        image[8] = 0x00; // JEDEC parameter ID
        image[9] = 0x00;
        image[10] = 0x01;
        image[11] = 9; // table length in words
        image[12..15].copy_from_slice(&[0x10, 0x00, 0x00]); // table pointer

        // Density word: bit count minus one.
        let density: u32 = self.capacity.wrapping_mul(8).wrapping_sub(1);
        image[20..24].copy_from_slice(&density.to_le_bytes());

        let pack = |unit: &SimEraseUnit| u32::from(unit.size_exp) | u32::from(unit.opcode) << 8;
        let dw8 = pack(&self.erase_units[0]) | pack(&self.erase_units[1]) << 16;
        let dw9 = pack(&self.erase_units[2]) | pack(&self.erase_units[3]) << 16;
        image[44..48].copy_from_slice(&dw8.to_le_bytes());
        image[48..52].copy_from_slice(&dw9.to_le_bytes());

        image
    }

    fn erase_size(&self, opcode: u8) -> Option<u32> {
        self.erase_units
            .iter()
            .find(|unit| unit.size_exp > 0 && unit.opcode == opcode)
            .map(|unit| 1 << unit.size_exp)
    }
}

/// Operation counters kept by the simulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    /// Transactions accepted by [`QspiBus::issue`].
    pub transactions: u32,
    /// Page program operations.
    pub programs: u32,
    /// Block and chip erase operations.
    pub erases: u32,
    /// Write-enable commands.
    pub write_enables: u32,
}

/// Pending fault to inject into the next matching bus event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    /// Reject the next command at the issue point.
    Reject,
    /// Complete the next transaction with an error outcome.
    Fail,
    /// Accept the next transaction but never signal completion.
    Drop,
}

struct SimState {
    config: SimConfig,
    memory: Vec<u8>,
    sfdp: Vec<u8>,
    write_enabled: bool,
    busy_remaining: u32,
    stats: SimStats,
    fault: Option<Fault>,
}

impl SimState {
    fn read_data(&self, addr: usize, buf: &mut [u8]) {
        let start = addr.min(self.memory.len());
        let end = (addr + buf.len()).min(self.memory.len());
        let n = end - start;
        buf[..n].copy_from_slice(&self.memory[start..end]);
        // Reads past the end float high, like unselected bus lines.
        buf[n..].fill(0xFF);
    }

    fn read_sfdp(&self, addr: usize, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.sfdp.get(addr + i).copied().unwrap_or(0xFF);
        }
    }

    fn program(&mut self, addr: usize, data: &[u8]) {
        let end = (addr + data.len()).min(self.memory.len());
        // NOR programming only clears bits.
        for (cell, byte) in self.memory[addr..end].iter_mut().zip(data) {
            *cell &= byte;
        }
        self.write_enabled = false;
        self.busy_remaining = self.config.busy_polls;
        self.stats.programs += 1;
    }

    fn erase_block(&mut self, addr: usize, size: u32) {
        let base = addr & !(size as usize - 1);
        let end = (base + size as usize).min(self.memory.len());
        self.memory[base..end].fill(0xFF);
        self.write_enabled = false;
        self.busy_remaining = self.config.busy_polls;
        self.stats.erases += 1;
    }

    fn status(&mut self) -> u8 {
        let mut status = 0u8;
        if self.busy_remaining > 0 {
            self.busy_remaining -= 1;
            status |= 0x01; // WIP
        }
        if self.write_enabled {
            status |= 0x02; // WEL
        }
        status
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Test-side handle onto a [`SimBus`].
///
/// Stays valid after the bus is handed to the driver; use it to seed or
/// inspect flash contents, read counters, and inject faults.
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    /// Snapshot `buf.len()` bytes of simulated flash at `addr`.
    pub fn snapshot(&self, addr: u32, buf: &mut [u8]) {
        lock(&self.state).read_data(addr as usize, buf);
    }

    /// Overwrite simulated flash at `addr`, bypassing NOR semantics.
    pub fn seed(&self, addr: u32, data: &[u8]) {
        let mut state = lock(&self.state);
        let addr = addr as usize;
        let end = (addr + data.len()).min(state.memory.len());
        let n = end - addr;
        state.memory[addr..end].copy_from_slice(&data[..n]);
    }

    /// Operation counters so far.
    pub fn stats(&self) -> SimStats {
        lock(&self.state).stats
    }

    /// Corrupt the SFDP signature so discovery fails.
    pub fn corrupt_sfdp_signature(&self) {
        lock(&self.state).sfdp[0] = b'X';
    }

    /// Reject the next command at the issue point.
    pub fn reject_next(&self) {
        lock(&self.state).fault = Some(Fault::Reject);
    }

    /// Complete the next transaction with a hardware error.
    pub fn fail_next(&self) {
        lock(&self.state).fault = Some(Fault::Fail);
    }

    /// Swallow the next completion so the caller times out.
    pub fn drop_next_completion(&self) {
        lock(&self.state).fault = Some(Fault::Drop);
    }
}

/// The simulated bus transport.
pub struct SimBus {
    state: Arc<Mutex<SimState>>,
    notifier: Option<Notifier>,
    pending: Option<Transaction>,
}

impl SimBus {
    /// Create a simulator and the test handle observing it.
    pub fn new(config: SimConfig) -> (Self, SimHandle) {
        let sfdp = config.sfdp_image();
        let memory = vec![0xFF; config.capacity as usize];
        let state = Arc::new(Mutex::new(SimState {
            config,
            memory,
            sfdp,
            write_enabled: false,
            busy_remaining: 0,
            stats: SimStats::default(),
            fault: None,
        }));
        let handle = SimHandle {
            state: Arc::clone(&state),
        };
        (
            Self {
                state,
                notifier: None,
                pending: None,
            },
            handle,
        )
    }

    fn complete(&self, outcome: Outcome) {
        let outcome = {
            let mut state = lock(&self.state);
            match state.fault {
                // A dropped completion leaves the slot empty and the
                // waiter times out.
                Some(Fault::Drop) => {
                    state.fault = None;
                    return;
                }
                Some(Fault::Fail) => {
                    state.fault = None;
                    Outcome::Error
                }
                _ => outcome,
            }
        };
        if let Some(notifier) = &self.notifier {
            notifier.complete(outcome);
        }
    }

    /// Run a command without a data phase against the simulated chip.
    fn execute_command(&self, txn: &Transaction) {
        let mut state = lock(&self.state);
        match txn.instruction {
            opcodes::WREN => {
                state.write_enabled = true;
                state.stats.write_enables += 1;
            }
            opcodes::CE => {
                if state.write_enabled {
                    state.memory.fill(0xFF);
                    state.write_enabled = false;
                    state.busy_remaining = state.config.busy_polls;
                    state.stats.erases += 1;
                }
            }
            opcode => {
                if let Some(size) = state.config.erase_size(opcode) {
                    if state.write_enabled {
                        let addr = txn.address.unwrap_or(0) as usize;
                        state.erase_block(addr, size);
                    }
                } else {
                    log::warn!("simulator ignoring unknown instruction {opcode:#04x}");
                }
            }
        }
    }
}

impl QspiBus for SimBus {
    fn bind(&mut self, notifier: Notifier) {
        self.notifier = Some(notifier);
    }

    fn configure(&mut self, prescaler: u8) -> Result<(), IoError> {
        log::debug!("simulator clock prescaler {prescaler}");
        Ok(())
    }

    fn issue(&mut self, txn: &Transaction) -> Result<(), IoError> {
        {
            let mut state = lock(&self.state);
            if state.fault == Some(Fault::Reject) {
                state.fault = None;
                return Err(IoError::Bus);
            }
            state.stats.transactions += 1;
        }

        match txn.direction {
            DataDirection::None => {
                self.execute_command(txn);
                self.complete(Outcome::Ok);
            }
            // Data phases execute when the transfer is armed.
            DataDirection::Read | DataDirection::Write => {
                self.pending = Some(*txn);
            }
        }
        Ok(())
    }

    fn start_read(&mut self, buf: &mut [u8]) -> Result<(), IoError> {
        let Some(txn) = self.pending.take() else {
            return Err(IoError::Bus);
        };

        {
            let mut state = lock(&self.state);
            match txn.instruction {
                opcodes::RDID => {
                    let id = state.config.jedec_id;
                    for (i, byte) in buf.iter_mut().enumerate() {
                        *byte = id.get(i).copied().unwrap_or(0x00);
                    }
                }
                opcodes::RDSR => {
                    let status = state.status();
                    buf.fill(status);
                }
                opcodes::RDSFDP => {
                    state.read_sfdp(txn.address.unwrap_or(0) as usize, buf);
                }
                opcodes::READ => {
                    state.read_data(txn.address.unwrap_or(0) as usize, buf);
                }
                opcode => {
                    log::warn!("simulator ignoring unknown read instruction {opcode:#04x}");
                    buf.fill(0xFF);
                }
            }
        }

        self.complete(Outcome::Ok);
        Ok(())
    }

    fn start_write(&mut self, data: &[u8]) -> Result<(), IoError> {
        let Some(txn) = self.pending.take() else {
            return Err(IoError::Bus);
        };

        {
            let mut state = lock(&self.state);
            if txn.instruction == opcodes::PP {
                if state.write_enabled {
                    state.program(txn.address.unwrap_or(0) as usize, data);
                }
            } else {
                log::warn!(
                    "simulator ignoring unknown write instruction {:#04x}",
                    txn.instruction
                );
            }
        }

        self.complete(Outcome::Ok);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use qflash_core::device::{DeviceConfig, FlashDevice, PAGE_SIZE};
    use qflash_core::Error;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn device_config() -> DeviceConfig {
        DeviceConfig {
            jedec_id: [0xEF, 0x40, 0x18],
            clock_hz: 96_000_000,
            max_frequency_hz: 80_000_000,
            transfer_timeout: Duration::from_millis(100),
        }
    }

    fn ready_device() -> (FlashDevice<SimBus>, SimHandle) {
        init_logging();
        let (bus, handle) = SimBus::new(SimConfig::default());
        let mut device = FlashDevice::new(bus, device_config());
        device.init().unwrap();
        (device, handle)
    }

    #[test]
    fn bring_up_discovers_geometry() {
        let (device, _handle) = ready_device();
        let geometry = device.geometry().unwrap();
        assert_eq!(geometry.capacity, 16 * 1024 * 1024);
        assert_eq!(geometry.smallest_erase_size(), Some(4096));

        let layout = device.page_layout().unwrap();
        assert_eq!(layout.page_size, 4096);
        assert_eq!(layout.page_count, 4096);
    }

    #[test]
    fn operations_before_init_are_rejected() {
        let (bus, _handle) = SimBus::new(SimConfig::default());
        let device = FlashDevice::new(bus, device_config());

        let mut buf = [0u8; 4];
        assert_eq!(device.read(0, &mut buf), Err(Error::NotInitialized));
        assert_eq!(device.write(0, &[0xAA]), Err(Error::NotInitialized));
        assert_eq!(device.erase(0, 0x1000), Err(Error::NotInitialized));
        assert_eq!(device.set_write_protect(true), Err(Error::NotInitialized));
    }

    #[test]
    fn jedec_mismatch_latches_failure() {
        let (bus, _handle) = SimBus::new(SimConfig {
            jedec_id: [0xC2, 0x20, 0x18],
            ..SimConfig::default()
        });
        let mut device = FlashDevice::new(bus, device_config());
        assert_eq!(device.init(), Err(Error::DeviceMismatch));

        let mut buf = [0u8; 4];
        assert_eq!(device.read(0, &mut buf), Err(Error::NotInitialized));
    }

    #[test]
    fn bad_sfdp_signature_latches_failure() {
        let (bus, handle) = SimBus::new(SimConfig::default());
        handle.corrupt_sfdp_signature();
        let mut device = FlashDevice::new(bus, device_config());
        assert!(matches!(device.init(), Err(Error::Discovery(_))));
        assert_eq!(device.geometry(), Err(Error::NotInitialized));
    }

    #[test]
    fn read_returns_seeded_data() {
        let (device, handle) = ready_device();
        handle.seed(0x2000, &[1, 2, 3, 4, 5]);

        let mut buf = [0u8; 5];
        device.read(0x2000, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn out_of_range_requests_never_touch_the_bus() {
        let (device, handle) = ready_device();
        let baseline = handle.stats().transactions;

        let capacity = 16 * 1024 * 1024;
        let mut buf = [0u8; 2];
        assert_eq!(device.read(capacity - 1, &mut buf), Err(Error::OutOfRange));
        assert_eq!(device.write(capacity, &[0x00]), Err(Error::OutOfRange));
        assert_eq!(device.erase(capacity - 0x1000, 0x2000), Err(Error::OutOfRange));

        assert_eq!(handle.stats().transactions, baseline);
    }

    #[test]
    fn write_programs_and_chunks_by_page() {
        let (device, handle) = ready_device();

        // Straddles two page boundaries: 3 chunks, each with its own
        // write enable.
        let data: Vec<u8> = (0..600).map(|i| (i % 251) as u8).collect();
        let addr = PAGE_SIZE - 40;
        device.write(addr, &data).unwrap();

        let mut readback = vec![0u8; data.len()];
        device.read(addr, &mut readback).unwrap();
        assert_eq!(readback, data);

        let stats = handle.stats();
        assert_eq!(stats.programs, 3);
        assert_eq!(stats.write_enables, 3);
    }

    #[test]
    fn write_protect_blocks_mutation() {
        let (device, handle) = ready_device();
        device.set_write_protect(true).unwrap();

        assert_eq!(device.write(0, &[0x00]), Err(Error::WriteProtected));
        assert_eq!(device.erase(0, 0x1000), Err(Error::WriteProtected));
        // No bus traffic happened for either call.
        assert_eq!(handle.stats().write_enables, 0);

        // Reads still work, and clearing the flag restores writes.
        let mut buf = [0u8; 1];
        device.read(0, &mut buf).unwrap();
        device.set_write_protect(false).unwrap();
        device.write(0, &[0x5A]).unwrap();
    }

    #[test]
    fn erase_restores_erased_state() {
        let (device, handle) = ready_device();
        device.write(0x1000, &[0u8; 64]).unwrap();

        device.erase(0x1000, 0x1000).unwrap();

        let mut buf = [0u8; 64];
        device.read(0x1000, &mut buf).unwrap();
        assert_eq!(buf, [0xFFu8; 64]);
        assert_eq!(handle.stats().erases, 1);
    }

    #[test]
    fn misaligned_erase_is_unsupported() {
        let (device, _handle) = ready_device();
        assert_eq!(device.erase(0x800, 0x1000), Err(Error::Unsupported));
    }

    #[test]
    fn full_chip_erase_is_single_operation() {
        let (device, handle) = ready_device();
        device.write(0x100, &[0u8; 16]).unwrap();

        device.erase(0, 16 * 1024 * 1024).unwrap();

        let mut buf = [0u8; 16];
        device.read(0x100, &mut buf).unwrap();
        assert_eq!(buf, [0xFFu8; 16]);
        assert_eq!(handle.stats().erases, 1);
    }

    #[test]
    fn rejected_command_surfaces_as_bus_error() {
        let (device, handle) = ready_device();
        handle.reject_next();

        let mut buf = [0u8; 4];
        assert_eq!(
            device.read(0, &mut buf),
            Err(Error::Io(qflash_core::IoError::Bus))
        );

        // The device stays usable afterwards.
        device.read(0, &mut buf).unwrap();
    }

    #[test]
    fn error_completion_surfaces_as_bus_error() {
        let (device, handle) = ready_device();
        handle.fail_next();

        let mut buf = [0u8; 4];
        assert_eq!(
            device.read(0, &mut buf),
            Err(Error::Io(qflash_core::IoError::Bus))
        );
    }

    #[test]
    fn dropped_completion_surfaces_as_timeout() {
        let (device, handle) = ready_device();
        handle.drop_next_completion();

        let mut buf = [0u8; 4];
        assert_eq!(
            device.read(0, &mut buf),
            Err(Error::Io(qflash_core::IoError::Timeout))
        );
    }

    #[test]
    fn concurrent_callers_serialize_on_the_engine() {
        use std::sync::Arc;
        use std::thread;

        let (device, handle) = ready_device();
        let device = Arc::new(device);

        let mut workers = Vec::new();
        for t in 0u8..4 {
            let device = Arc::clone(&device);
            workers.push(thread::spawn(move || {
                let addr = u32::from(t) * 0x1000;
                let data = [t; 64];
                device.write(addr, &data).unwrap();

                let mut buf = [0u8; 64];
                device.read(addr, &mut buf).unwrap();
                assert_eq!(buf, data);
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(handle.stats().programs, 4);
    }
}
