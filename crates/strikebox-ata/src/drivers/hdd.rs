use strikebox_storage::StorageBackend;
use tracing::{debug, info, warn};

use crate::addressing::Geometry;
use crate::defs::{ATA_SECTOR_SIZE, MAX_LBA28};
use crate::drivers::{check_bounds, AtaDeviceDriver};
use crate::error::DriverError;
use crate::identify::{
    IdentifyDeviceData, IdentifyPacketDeviceData, CAPABILITY_DMA, CAPABILITY_IORDY,
    CAPABILITY_LBA, COMMAND_SET_SECURITY, FIELD_VALID_CURRENT_GEOMETRY, FIELD_VALID_WORDS_64_70,
    FIELD_VALID_WORD_88, MAJOR_VERSION_ATA4, SECURITY_ENABLED,
    SECURITY_LOCKED, SECURITY_SUPPORTED, WORD_ADVANCED_PIO, WORD_CAPABILITIES,
    WORD_COMMAND_SETS_ENABLED, WORD_COMMAND_SETS_SUPPORTED, WORD_CURRENT_CAPACITY,
    WORD_CURRENT_CYLINDERS, WORD_CURRENT_HEADS, WORD_CURRENT_SECTORS_PER_TRACK,
    WORD_DEFAULT_CYLINDERS, WORD_DEFAULT_HEADS, WORD_DEFAULT_SECTORS_PER_TRACK,
    WORD_FIELD_VALIDITY, WORD_GENERAL_CONFIG, WORD_MAJOR_VERSION, WORD_MULTIWORD_DMA,
    WORD_PIO_TIMING, WORD_SECURITY_STATUS, WORD_ULTRA_DMA,
};

/// Length of the password field in a SECURITY UNLOCK data block.
const PASSWORD_LEN: usize = 32;

const DEFAULT_HEADS: u8 = 16;
const DEFAULT_SECTORS_PER_TRACK: u8 = 63;

#[derive(Debug, Clone)]
struct Security {
    password: [u8; PASSWORD_LEN],
    locked: bool,
}

/// Fixed disk backed by a raw image of 512-byte sectors.
///
/// Sectors past `user_sectors` exist on the image but are hidden from guest addressing.
pub struct HardDiskDriver {
    backend: Box<dyn StorageBackend>,
    capacity_sectors: u32,
    user_sectors: u32,
    default_geometry: Geometry,
    geometry: Geometry,
    security: Option<Security>,
    model: String,
    serial: String,
    firmware: String,
}

impl std::fmt::Debug for HardDiskDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardDiskDriver")
            .field("capacity_sectors", &self.capacity_sectors)
            .field("user_sectors", &self.user_sectors)
            .field("geometry", &self.geometry)
            .field("locked", &self.is_security_locked())
            .finish()
    }
}

impl HardDiskDriver {
    /// Wraps a backend whose length is a whole number of sectors.
    pub fn new(backend: Box<dyn StorageBackend>) -> Result<Self, DriverError> {
        let len = backend.len();
        if len % ATA_SECTOR_SIZE as u64 != 0 {
            return Err(DriverError::Unaligned {
                byte_address: 0,
                len: len as usize,
                sector_size: ATA_SECTOR_SIZE as u32,
            });
        }
        let capacity_sectors = (len / ATA_SECTOR_SIZE as u64).min(u64::from(MAX_LBA28) + 1) as u32;
        let default_geometry =
            Geometry::from_capacity(capacity_sectors, DEFAULT_HEADS, DEFAULT_SECTORS_PER_TRACK)
                .ok_or(DriverError::InvalidParameters("default geometry"))?;
        debug!(capacity_sectors, ?default_geometry, "hard disk attached");
        Ok(Self {
            backend,
            capacity_sectors,
            user_sectors: capacity_sectors,
            default_geometry,
            geometry: default_geometry,
            security: None,
            model: "STRIKEBOX HARD DISK".to_string(),
            serial: "SBHDD000000000000001".to_string(),
            firmware: "1.0".to_string(),
        })
    }

    /// Restricts guest-addressable sectors to the first `user_sectors`, leaving the rest as a
    /// reserved area.
    pub fn with_user_sectors(mut self, user_sectors: u32) -> Self {
        self.user_sectors = user_sectors.min(self.capacity_sectors);
        if let Some(geometry) =
            Geometry::from_capacity(self.user_sectors, DEFAULT_HEADS, DEFAULT_SECTORS_PER_TRACK)
        {
            self.default_geometry = geometry;
            self.geometry = geometry;
        }
        self
    }

    /// Overrides the 16-head, 63-sector default translation reported by IDENTIFY DEVICE.
    pub fn with_default_geometry(
        mut self,
        heads: u8,
        sectors_per_track: u8,
    ) -> Result<Self, DriverError> {
        let geometry = Geometry::from_capacity(self.user_sectors, heads, sectors_per_track)
            .ok_or(DriverError::InvalidParameters("heads or sectors per track"))?;
        self.default_geometry = geometry;
        self.geometry = geometry;
        Ok(self)
    }

    /// Enables the security feature set with `password`, leaving the disk locked.
    pub fn with_password(mut self, password: &[u8]) -> Self {
        let mut stored = [0u8; PASSWORD_LEN];
        let len = password.len().min(PASSWORD_LEN);
        stored[..len].copy_from_slice(&password[..len]);
        self.security = Some(Security {
            password: stored,
            locked: true,
        });
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = serial.into();
        self
    }

    pub fn user_sectors(&self) -> u32 {
        self.user_sectors
    }

    fn capacity_bytes(&self) -> u64 {
        u64::from(self.capacity_sectors) * ATA_SECTOR_SIZE as u64
    }

    fn check_access(&self, byte_address: u64, len: usize) -> Result<(), DriverError> {
        if self.is_security_locked() {
            return Err(DriverError::SecurityLocked);
        }
        if byte_address % ATA_SECTOR_SIZE as u64 != 0 || len % ATA_SECTOR_SIZE != 0 {
            return Err(DriverError::Unaligned {
                byte_address,
                len,
                sector_size: ATA_SECTOR_SIZE as u32,
            });
        }
        check_bounds(byte_address, len, self.capacity_bytes())
    }
}

impl AtaDeviceDriver for HardDiskDriver {
    fn identify_device(&self, data: &mut IdentifyDeviceData) -> Result<(), DriverError> {
        // Fixed, non-removable.
        data.set_word(WORD_GENERAL_CONFIG, 0x0040);
        data.set_word(WORD_DEFAULT_CYLINDERS, self.default_geometry.cylinders);
        data.set_word(WORD_DEFAULT_HEADS, u16::from(self.default_geometry.heads));
        data.set_word(
            WORD_DEFAULT_SECTORS_PER_TRACK,
            u16::from(self.default_geometry.sectors_per_track),
        );
        data.set_serial_number(&self.serial);
        data.set_firmware_revision(&self.firmware);
        data.set_model_number(&self.model);
        data.set_word(
            WORD_CAPABILITIES,
            CAPABILITY_DMA | CAPABILITY_LBA | CAPABILITY_IORDY,
        );
        data.set_word(WORD_PIO_TIMING, 0x0200);
        data.set_word(
            WORD_FIELD_VALIDITY,
            FIELD_VALID_CURRENT_GEOMETRY | FIELD_VALID_WORDS_64_70 | FIELD_VALID_WORD_88,
        );
        data.set_word(WORD_CURRENT_CYLINDERS, self.geometry.cylinders);
        data.set_word(WORD_CURRENT_HEADS, u16::from(self.geometry.heads));
        data.set_word(
            WORD_CURRENT_SECTORS_PER_TRACK,
            u16::from(self.geometry.sectors_per_track),
        );
        let current = self.geometry.total_sectors();
        data.set_word(WORD_CURRENT_CAPACITY, current as u16);
        data.set_word(WORD_CURRENT_CAPACITY + 1, (current >> 16) as u16);
        data.set_user_addressable_sectors(self.user_sectors);
        data.set_word(WORD_MULTIWORD_DMA, 0x0007);
        data.set_word(WORD_ADVANCED_PIO, 0x0003);
        data.set_word(WORD_MAJOR_VERSION, MAJOR_VERSION_ATA4);
        data.set_word(WORD_ULTRA_DMA, 0x0007);

        if let Some(security) = &self.security {
            data.set_word(WORD_COMMAND_SETS_SUPPORTED, COMMAND_SET_SECURITY);
            data.set_word(WORD_COMMAND_SETS_ENABLED, COMMAND_SET_SECURITY);
            let mut status = SECURITY_SUPPORTED | SECURITY_ENABLED;
            if security.locked {
                status |= SECURITY_LOCKED;
            }
            data.set_word(WORD_SECURITY_STATUS, status);
        }
        Ok(())
    }

    fn identify_packet_device(
        &self,
        _data: &mut IdentifyPacketDeviceData,
    ) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("PACKET feature set"))
    }

    fn security_unlock(&mut self, unlock_data: &[u8; ATA_SECTOR_SIZE]) -> Result<(), DriverError> {
        let Some(security) = self.security.as_mut() else {
            // Security disabled: the device is already unlocked.
            return Ok(());
        };
        // Word 0 selects user/master password, words 1..=16 carry it.
        let password = &unlock_data[2..2 + PASSWORD_LEN];
        if password != &security.password[..] {
            warn!(locked = security.locked, "security unlock rejected");
            return Err(DriverError::PasswordMismatch);
        }
        if security.locked {
            info!("hard disk unlocked");
        }
        security.locked = false;
        Ok(())
    }

    fn is_security_locked(&self) -> bool {
        self.security.as_ref().is_some_and(|s| s.locked)
    }

    fn set_device_parameters(
        &mut self,
        heads: u8,
        sectors_per_track: u8,
    ) -> Result<(), DriverError> {
        let geometry = Geometry::from_capacity(self.user_sectors, heads, sectors_per_track)
            .ok_or(DriverError::InvalidParameters("heads or sectors per track"))?;
        debug!(?geometry, "translation geometry changed");
        self.geometry = geometry;
        Ok(())
    }

    fn read(&mut self, byte_address: u64, buf: &mut [u8]) -> Result<(), DriverError> {
        self.check_access(byte_address, buf.len())?;
        self.backend.read_at(byte_address, buf)?;
        Ok(())
    }

    fn write(&mut self, byte_address: u64, buf: &[u8]) -> Result<(), DriverError> {
        self.check_access(byte_address, buf.len())?;
        if self.backend.is_read_only() {
            return Err(DriverError::ReadOnlyMedium);
        }
        self.backend.write_at(byte_address, buf)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DriverError> {
        self.backend.flush()?;
        Ok(())
    }

    fn supports_packet_commands(&self) -> bool {
        false
    }

    fn has_medium(&self) -> bool {
        true
    }

    fn medium_capacity_sectors(&self) -> u32 {
        self.capacity_sectors
    }

    fn sector_size(&self) -> u32 {
        ATA_SECTOR_SIZE as u32
    }

    fn is_lba_address_user_accessible(&self, lba: u32) -> bool {
        lba < self.user_sectors
    }

    fn geometry(&self) -> Option<Geometry> {
        Some(self.geometry)
    }
}
