//! Shared ATA constants: command opcodes, register offsets and transfer-mode encodings.

use serde::{Deserialize, Serialize};

/// Size of an ATA logical sector and of the per-device PIO buffer.
pub const ATA_SECTOR_SIZE: usize = 512;
/// Size of a DVD logical block as addressed by ATAPI READ commands.
pub const DVD_SECTOR_SIZE: usize = 2048;

/// Highest LBA reachable through 28-bit addressing.
pub const MAX_LBA28: u32 = 0x0FFF_FFFF;

// Command opcodes.
pub const ATA_CMD_NOP: u8 = 0x00;
pub const ATA_CMD_DEVICE_RESET: u8 = 0x08;
pub const ATA_CMD_READ_SECTORS: u8 = 0x20;
pub const ATA_CMD_READ_SECTORS_NO_RETRY: u8 = 0x21;
pub const ATA_CMD_WRITE_SECTORS: u8 = 0x30;
pub const ATA_CMD_WRITE_SECTORS_NO_RETRY: u8 = 0x31;
pub const ATA_CMD_READ_VERIFY_SECTORS: u8 = 0x40;
pub const ATA_CMD_READ_VERIFY_SECTORS_NO_RETRY: u8 = 0x41;
pub const ATA_CMD_SEEK: u8 = 0x70;
pub const ATA_CMD_EXECUTE_DEVICE_DIAGNOSTIC: u8 = 0x90;
pub const ATA_CMD_INITIALIZE_DEVICE_PARAMETERS: u8 = 0x91;
pub const ATA_CMD_PACKET: u8 = 0xA0;
pub const ATA_CMD_IDENTIFY_PACKET_DEVICE: u8 = 0xA1;
pub const ATA_CMD_READ_DMA: u8 = 0xC8;
pub const ATA_CMD_READ_DMA_NO_RETRY: u8 = 0xC9;
pub const ATA_CMD_WRITE_DMA: u8 = 0xCA;
pub const ATA_CMD_WRITE_DMA_NO_RETRY: u8 = 0xCB;
pub const ATA_CMD_STANDBY_IMMEDIATE: u8 = 0xE0;
pub const ATA_CMD_IDLE_IMMEDIATE: u8 = 0xE1;
pub const ATA_CMD_CHECK_POWER_MODE: u8 = 0xE5;
pub const ATA_CMD_FLUSH_CACHE: u8 = 0xE7;
pub const ATA_CMD_IDENTIFY_DEVICE: u8 = 0xEC;
pub const ATA_CMD_SET_FEATURES: u8 = 0xEF;
pub const ATA_CMD_SECURITY_UNLOCK: u8 = 0xF2;

// SET FEATURES subcommands (features register).
pub const SETFEATURES_ENABLE_WRITE_CACHE: u8 = 0x02;
pub const SETFEATURES_SET_TRANSFER_MODE: u8 = 0x03;
pub const SETFEATURES_DISABLE_REVERTING: u8 = 0x66;
pub const SETFEATURES_DISABLE_WRITE_CACHE: u8 = 0x82;
pub const SETFEATURES_ENABLE_REVERTING: u8 = 0xCC;

// Command block register offsets relative to the channel's command base port.
pub const REG_DATA: u16 = 0;
pub const REG_ERROR_FEATURES: u16 = 1;
pub const REG_SECTOR_COUNT: u16 = 2;
pub const REG_SECTOR_NUMBER: u16 = 3;
pub const REG_CYLINDER_LOW: u16 = 4;
pub const REG_CYLINDER_HIGH: u16 = 5;
pub const REG_DEVICE_HEAD: u16 = 6;
pub const REG_STATUS_COMMAND: u16 = 7;

/// Device control register bits.
pub const DEVICE_CONTROL_NIEN: u8 = 0x02;
pub const DEVICE_CONTROL_SRST: u8 = 0x04;

/// Device/head register bits.
pub const DEVICE_HEAD_LBA: u8 = 0x40;
pub const DEVICE_HEAD_DEV: u8 = 0x10;
/// Bits 7 and 5 are obsolete and always read back as one.
pub const DEVICE_HEAD_OBSOLETE: u8 = 0xA0;

/// Highest supported PIO flow-control mode.
pub const MAX_PIO_MODE: u8 = 4;
/// Highest supported multiword DMA mode.
pub const MAX_MULTIWORD_DMA_MODE: u8 = 2;
/// Highest supported Ultra DMA mode.
pub const MAX_ULTRA_DMA_MODE: u8 = 2;

/// Which of the two IDE channels a component belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelId {
    Primary,
    Secondary,
}

impl ChannelId {
    pub fn index(self) -> usize {
        match self {
            ChannelId::Primary => 0,
            ChannelId::Secondary => 1,
        }
    }
}

/// Device slot on a channel, selected by the DEV bit of the device/head register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceIndex {
    Master,
    Slave,
}

impl DeviceIndex {
    pub fn index(self) -> usize {
        match self {
            DeviceIndex::Master => 0,
            DeviceIndex::Slave => 1,
        }
    }

    pub fn from_device_head(value: u8) -> Self {
        if value & DEVICE_HEAD_DEV != 0 {
            DeviceIndex::Slave
        } else {
            DeviceIndex::Master
        }
    }
}

/// PIO transfer type selected through SET FEATURES.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PioTransferType {
    /// Default PIO mode.
    Default,
    /// Default PIO mode with IORDY disabled.
    DefaultNoIordy,
    /// PIO flow-control transfer mode `x`.
    FlowControl,
}

/// DMA transfer type selected through SET FEATURES.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DmaTransferType {
    SingleWord,
    MultiWord,
    UltraDma,
}

/// A decoded SET FEATURES "set transfer mode" value (sector count register).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Pio(PioTransferType, u8),
    Dma(DmaTransferType, u8),
}

impl TransferMode {
    /// Decodes the `ttttt mmm` encoding. Returns `None` for reserved transfer types.
    ///
    /// ```
    /// use strikebox_ata::defs::{DmaTransferType, TransferMode};
    ///
    /// assert_eq!(
    ///     TransferMode::decode(0x42),
    ///     Some(TransferMode::Dma(DmaTransferType::UltraDma, 2))
    /// );
    /// ```
    pub fn decode(value: u8) -> Option<Self> {
        let mode = value & 0x07;
        match value >> 3 {
            0b00000 => match mode {
                0 => Some(TransferMode::Pio(PioTransferType::Default, 0)),
                1 => Some(TransferMode::Pio(PioTransferType::DefaultNoIordy, 0)),
                _ => None,
            },
            0b00001 => Some(TransferMode::Pio(PioTransferType::FlowControl, mode)),
            0b00010 => Some(TransferMode::Dma(DmaTransferType::SingleWord, mode)),
            0b00100 => Some(TransferMode::Dma(DmaTransferType::MultiWord, mode)),
            0b01000 => Some(TransferMode::Dma(DmaTransferType::UltraDma, mode)),
            _ => None,
        }
    }

    pub fn encode(self) -> u8 {
        match self {
            TransferMode::Pio(PioTransferType::Default, _) => 0x00,
            TransferMode::Pio(PioTransferType::DefaultNoIordy, _) => 0x01,
            TransferMode::Pio(PioTransferType::FlowControl, mode) => 0x08 | (mode & 0x07),
            TransferMode::Dma(DmaTransferType::SingleWord, mode) => 0x10 | (mode & 0x07),
            TransferMode::Dma(DmaTransferType::MultiWord, mode) => 0x20 | (mode & 0x07),
            TransferMode::Dma(DmaTransferType::UltraDma, mode) => 0x40 | (mode & 0x07),
        }
    }
}

/// Human readable name of an opcode for log output.
pub fn command_name(opcode: u8) -> &'static str {
    match opcode {
        ATA_CMD_NOP => "NOP",
        ATA_CMD_DEVICE_RESET => "DEVICE RESET",
        ATA_CMD_READ_SECTORS | ATA_CMD_READ_SECTORS_NO_RETRY => "READ SECTORS",
        ATA_CMD_WRITE_SECTORS | ATA_CMD_WRITE_SECTORS_NO_RETRY => "WRITE SECTORS",
        ATA_CMD_READ_VERIFY_SECTORS | ATA_CMD_READ_VERIFY_SECTORS_NO_RETRY => {
            "READ VERIFY SECTORS"
        }
        ATA_CMD_SEEK => "SEEK",
        ATA_CMD_EXECUTE_DEVICE_DIAGNOSTIC => "EXECUTE DEVICE DIAGNOSTIC",
        ATA_CMD_INITIALIZE_DEVICE_PARAMETERS => "INITIALIZE DEVICE PARAMETERS",
        ATA_CMD_PACKET => "PACKET",
        ATA_CMD_IDENTIFY_PACKET_DEVICE => "IDENTIFY PACKET DEVICE",
        ATA_CMD_READ_DMA | ATA_CMD_READ_DMA_NO_RETRY => "READ DMA",
        ATA_CMD_WRITE_DMA | ATA_CMD_WRITE_DMA_NO_RETRY => "WRITE DMA",
        ATA_CMD_STANDBY_IMMEDIATE => "STANDBY IMMEDIATE",
        ATA_CMD_IDLE_IMMEDIATE => "IDLE IMMEDIATE",
        ATA_CMD_CHECK_POWER_MODE => "CHECK POWER MODE",
        ATA_CMD_FLUSH_CACHE => "FLUSH CACHE",
        ATA_CMD_IDENTIFY_DEVICE => "IDENTIFY DEVICE",
        ATA_CMD_SET_FEATURES => "SET FEATURES",
        ATA_CMD_SECURITY_UNLOCK => "SECURITY UNLOCK",
        _ => "UNKNOWN",
    }
}
