//! The shared channel register block and its addressing helpers.

use bitflags::bitflags;

use crate::addressing::Chs;
use crate::defs::{DeviceIndex, DEVICE_HEAD_DEV, DEVICE_HEAD_LBA, DEVICE_HEAD_OBSOLETE};

bitflags! {
    /// Status register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Status: u8 {
        const BSY = 0x80;
        const DRDY = 0x40;
        const DF = 0x20;
        const DSC = 0x10;
        const DRQ = 0x08;
        const CORR = 0x04;
        const IDX = 0x02;
        const ERR = 0x01;
    }
}

bitflags! {
    /// Error register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ErrorBits: u8 {
        /// Interface CRC error (Ultra DMA) / bad block.
        const ICRC = 0x80;
        const UNC = 0x40;
        const MC = 0x20;
        const IDNF = 0x10;
        const MCR = 0x08;
        const ABRT = 0x04;
        const TK0NF = 0x02;
        const AMNF = 0x01;
    }
}

/// ATAPI interrupt reason bits, reported through the sector count register.
pub const INTERRUPT_REASON_COD: u8 = 0x01;
pub const INTERRUPT_REASON_IO: u8 = 0x02;

/// Register block shared by both devices on a channel.
///
/// Error and features share one I/O address (read vs write), as do status and command, so they
/// are modelled as separate fields here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtaRegisters {
    pub status: Status,
    pub error: u8,
    pub features: u8,
    pub sector_count: u8,
    pub sector_number: u8,
    pub cylinder_low: u8,
    pub cylinder_high: u8,
    pub device_head: u8,
    pub control: u8,
}

impl Default for AtaRegisters {
    fn default() -> Self {
        Self {
            status: Status::DRDY | Status::DSC,
            error: 0x01,
            features: 0,
            sector_count: 0x01,
            sector_number: 0x01,
            cylinder_low: 0,
            cylinder_high: 0,
            device_head: DEVICE_HEAD_OBSOLETE,
            control: 0,
        }
    }
}

impl AtaRegisters {
    pub fn selected_device(&self) -> DeviceIndex {
        DeviceIndex::from_device_head(self.device_head)
    }

    pub fn select_device(&mut self, index: DeviceIndex) {
        match index {
            DeviceIndex::Master => self.device_head &= !DEVICE_HEAD_DEV,
            DeviceIndex::Slave => self.device_head |= DEVICE_HEAD_DEV,
        }
    }

    pub fn is_lba_mode(&self) -> bool {
        self.device_head & DEVICE_HEAD_LBA != 0
    }

    /// 28-bit LBA assembled from sector number (7:0), cylinder low (15:8), cylinder high (23:16)
    /// and the low nibble of device/head (27:24).
    pub fn lba28(&self) -> u32 {
        u32::from(self.sector_number)
            | (u32::from(self.cylinder_low) << 8)
            | (u32::from(self.cylinder_high) << 16)
            | (u32::from(self.device_head & 0x0F) << 24)
    }

    pub fn set_lba28(&mut self, lba: u32) {
        self.sector_number = lba as u8;
        self.cylinder_low = (lba >> 8) as u8;
        self.cylinder_high = (lba >> 16) as u8;
        self.device_head = (self.device_head & 0xF0) | ((lba >> 24) as u8 & 0x0F) | DEVICE_HEAD_LBA;
    }

    pub fn chs(&self) -> Chs {
        Chs {
            cylinder: u16::from_le_bytes([self.cylinder_low, self.cylinder_high]),
            head: self.device_head & 0x0F,
            sector: self.sector_number,
        }
    }

    pub fn set_chs(&mut self, chs: Chs) {
        let [low, high] = chs.cylinder.to_le_bytes();
        self.cylinder_low = low;
        self.cylinder_high = high;
        self.sector_number = chs.sector;
        self.device_head =
            (self.device_head & 0xF0 & !DEVICE_HEAD_LBA) | (chs.head & 0x0F);
    }

    /// Sector count, where a register value of zero requests 256 sectors.
    pub fn sector_count_or_256(&self) -> u32 {
        match self.sector_count {
            0 => 256,
            n => u32::from(n),
        }
    }

    /// ATAPI byte count limit / transfer length (cylinder high:low).
    pub fn byte_count(&self) -> u16 {
        u16::from_le_bytes([self.cylinder_low, self.cylinder_high])
    }

    pub fn set_byte_count(&mut self, count: u16) {
        let [low, high] = count.to_le_bytes();
        self.cylinder_low = low;
        self.cylinder_high = high;
    }

    pub fn set_interrupt_reason(&mut self, io: bool, cod: bool) {
        let mut reason = self.sector_count & !(INTERRUPT_REASON_IO | INTERRUPT_REASON_COD);
        if io {
            reason |= INTERRUPT_REASON_IO;
        }
        if cod {
            reason |= INTERRUPT_REASON_COD;
        }
        self.sector_count = reason;
    }

    /// Loads the post-reset/diagnostic signature for the selected device class.
    pub fn write_signature(&mut self, packet_device: bool) {
        self.sector_count = 0x01;
        self.sector_number = 0x01;
        if packet_device {
            self.cylinder_low = 0x14;
            self.cylinder_high = 0xEB;
        } else {
            self.cylinder_low = 0x00;
            self.cylinder_high = 0x00;
        }
        self.device_head &= DEVICE_HEAD_DEV | DEVICE_HEAD_OBSOLETE;
    }

    /// Value read back from the device/head register.
    pub fn device_head_readback(&self) -> u8 {
        self.device_head | DEVICE_HEAD_OBSOLETE
    }
}
