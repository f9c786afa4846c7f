//! Standard JEDEC SPI NOR opcodes used by the driver.

// ============================================================================
// Write control
// ============================================================================

/// Write Enable - required before any program/erase operation
pub const WREN: u8 = 0x06;

// ============================================================================
// Status and identification
// ============================================================================

/// Read Status Register 1
pub const RDSR: u8 = 0x05;
/// Read JEDEC ID (manufacturer + device ID)
pub const RDID: u8 = 0x9F;

// ============================================================================
// Data access
// ============================================================================

/// Read Data
pub const READ: u8 = 0x03;
/// Page Program
pub const PP: u8 = 0x02;

// ============================================================================
// Erase
// ============================================================================

/// Sector Erase 4KB
pub const SE_20: u8 = 0x20;
/// Block Erase 32KB
pub const BE_52: u8 = 0x52;
/// Block Erase 64KB
pub const BE_D8: u8 = 0xD8;
/// Chip Erase (entire chip, no address phase)
pub const CE: u8 = 0xC7;

// ============================================================================
// SFDP (Serial Flash Discoverable Parameters)
// ============================================================================

/// Read SFDP (JEDEC JESD216)
pub const RDSFDP: u8 = 0x5A;
