use strikebox_storage::StorageBackend;
use tracing::{debug, info};

use crate::defs::{ATA_SECTOR_SIZE, DVD_SECTOR_SIZE};
use crate::drivers::{check_bounds, AtaDeviceDriver};
use crate::error::DriverError;
use crate::identify::{
    IdentifyDeviceData, IdentifyPacketDeviceData, CAPABILITY_DMA, CAPABILITY_IORDY,
    CAPABILITY_LBA, COMMAND_SET_PACKET, FIELD_VALID_WORDS_64_70, FIELD_VALID_WORD_88,
    MAJOR_VERSION_ATA4, WORD_ADVANCED_PIO, WORD_CAPABILITIES, WORD_COMMAND_SETS_ENABLED,
    WORD_COMMAND_SETS_SUPPORTED, WORD_FIELD_VALIDITY, WORD_GENERAL_CONFIG, WORD_MAJOR_VERSION,
    WORD_MULTIWORD_DMA, WORD_ULTRA_DMA,
};

/// Command packet length advertised in IDENTIFY PACKET DEVICE word 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacketSize {
    #[default]
    Bytes12,
    Bytes16,
}

impl PacketSize {
    pub fn len(self) -> usize {
        match self {
            PacketSize::Bytes12 => 12,
            PacketSize::Bytes16 => 16,
        }
    }
}

/// Removable DVD drive backed by a disc image with 2048-byte blocks.
pub struct DvdDrive {
    disc: Option<Box<dyn StorageBackend>>,
    packet_size: PacketSize,
    medium_changed: bool,
    model: String,
    serial: String,
    firmware: String,
}

impl std::fmt::Debug for DvdDrive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DvdDrive")
            .field("has_disc", &self.disc.is_some())
            .field("packet_size", &self.packet_size)
            .field("model", &self.model)
            .finish()
    }
}

impl Default for DvdDrive {
    fn default() -> Self {
        Self::empty()
    }
}

impl DvdDrive {
    /// A drive with its tray closed and no disc.
    pub fn empty() -> Self {
        Self {
            disc: None,
            packet_size: PacketSize::default(),
            medium_changed: false,
            model: "STRIKEBOX DVD-ROM".to_string(),
            serial: "SBDVD0000000000000001".to_string(),
            firmware: "1.0".to_string(),
        }
    }

    pub fn with_disc(disc: Box<dyn StorageBackend>) -> Self {
        let mut drive = Self::empty();
        drive.disc = Some(disc);
        drive
    }

    pub fn with_packet_size(mut self, packet_size: PacketSize) -> Self {
        self.packet_size = packet_size;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn capacity_bytes(&self) -> u64 {
        u64::from(self.medium_capacity_sectors()) * DVD_SECTOR_SIZE as u64
    }
}

impl AtaDeviceDriver for DvdDrive {
    fn identify_device(&self, _data: &mut IdentifyDeviceData) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("IDENTIFY DEVICE on a packet device"))
    }

    fn identify_packet_device(
        &self,
        data: &mut IdentifyPacketDeviceData,
    ) -> Result<(), DriverError> {
        // ATAPI, CD-ROM/DVD class, removable, microprocessor DRQ.
        let mut config = 0x8580;
        if self.packet_size == PacketSize::Bytes16 {
            config |= 0x0001;
        }
        data.set_word(WORD_GENERAL_CONFIG, config);
        data.set_serial_number(&self.serial);
        data.set_firmware_revision(&self.firmware);
        data.set_model_number(&self.model);
        data.set_word(
            WORD_CAPABILITIES,
            CAPABILITY_DMA | CAPABILITY_LBA | CAPABILITY_IORDY,
        );
        data.set_word(
            WORD_FIELD_VALIDITY,
            FIELD_VALID_WORDS_64_70 | FIELD_VALID_WORD_88,
        );
        data.set_word(WORD_MULTIWORD_DMA, 0x0007);
        data.set_word(WORD_ADVANCED_PIO, 0x0003);
        data.set_word(WORD_MAJOR_VERSION, MAJOR_VERSION_ATA4);
        data.set_word(WORD_COMMAND_SETS_SUPPORTED, COMMAND_SET_PACKET);
        data.set_word(WORD_COMMAND_SETS_ENABLED, COMMAND_SET_PACKET);
        data.set_word(WORD_ULTRA_DMA, 0x0007);
        Ok(())
    }

    fn security_unlock(&mut self, _unlock_data: &[u8; ATA_SECTOR_SIZE]) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("security feature set"))
    }

    fn set_device_parameters(
        &mut self,
        _heads: u8,
        _sectors_per_track: u8,
    ) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("CHS addressing on a packet device"))
    }

    fn read(&mut self, byte_address: u64, buf: &mut [u8]) -> Result<(), DriverError> {
        let capacity = self.capacity_bytes();
        let disc = self.disc.as_mut().ok_or(DriverError::NoMedium)?;
        check_bounds(byte_address, buf.len(), capacity)?;
        disc.read_at(byte_address, buf)?;
        Ok(())
    }

    fn write(&mut self, _byte_address: u64, _buf: &[u8]) -> Result<(), DriverError> {
        if self.disc.is_none() {
            return Err(DriverError::NoMedium);
        }
        Err(DriverError::ReadOnlyMedium)
    }

    fn supports_packet_commands(&self) -> bool {
        true
    }

    fn has_medium(&self) -> bool {
        self.disc.is_some()
    }

    fn medium_capacity_sectors(&self) -> u32 {
        self.disc
            .as_ref()
            .map(|disc| (disc.len() / DVD_SECTOR_SIZE as u64).min(u64::from(u32::MAX)) as u32)
            .unwrap_or(0)
    }

    fn sector_size(&self) -> u32 {
        DVD_SECTOR_SIZE as u32
    }

    fn is_lba_address_user_accessible(&self, lba: u32) -> bool {
        lba < self.medium_capacity_sectors()
    }

    fn packet_command_size(&self) -> usize {
        self.packet_size.len()
    }

    fn take_medium_changed(&mut self) -> bool {
        std::mem::take(&mut self.medium_changed)
    }

    fn insert_medium(&mut self, medium: Box<dyn StorageBackend>) -> Result<(), DriverError> {
        info!(len = medium.len(), "disc inserted");
        self.disc = Some(medium);
        self.medium_changed = true;
        Ok(())
    }

    fn eject_medium(&mut self) -> Result<(), DriverError> {
        if self.disc.take().is_some() {
            debug!("disc ejected");
            self.medium_changed = true;
        }
        Ok(())
    }
}
