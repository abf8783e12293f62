//! Device drivers: the storage-specific half of an ATA device.
//!
//! An [`AtaDevice`](crate::AtaDevice) owns exactly one driver. Drivers answer capability
//! queries, produce identification data and perform medium access in byte units; everything
//! register-visible lives in the device and command layers.

mod dvd;
mod hdd;
mod null;

pub use dvd::{DvdDrive, PacketSize};
pub use hdd::HardDiskDriver;
pub use null::NullDriver;

use crate::addressing::{Chs, Geometry};
use crate::defs::ATA_SECTOR_SIZE;
use crate::error::DriverError;
use crate::identify::{IdentifyDeviceData, IdentifyPacketDeviceData};

/// Capabilities and medium access of one attached (or absent) storage device.
pub trait AtaDeviceDriver: Send {
    /// Fills an IDENTIFY DEVICE record. Packet devices refuse.
    fn identify_device(&self, data: &mut IdentifyDeviceData) -> Result<(), DriverError>;

    /// Fills an IDENTIFY PACKET DEVICE record. Devices without the PACKET feature set refuse.
    fn identify_packet_device(&self, data: &mut IdentifyPacketDeviceData)
        -> Result<(), DriverError>;

    /// Checks a SECURITY UNLOCK data block against the stored password.
    fn security_unlock(&mut self, unlock_data: &[u8; ATA_SECTOR_SIZE]) -> Result<(), DriverError>;

    /// Whether media access is refused until a successful SECURITY UNLOCK.
    fn is_security_locked(&self) -> bool {
        false
    }

    /// Applies INITIALIZE DEVICE PARAMETERS.
    fn set_device_parameters(&mut self, heads: u8, sectors_per_track: u8)
        -> Result<(), DriverError>;

    /// Reads `buf.len()` bytes starting at `byte_address`.
    fn read(&mut self, byte_address: u64, buf: &mut [u8]) -> Result<(), DriverError>;

    /// Writes `buf` starting at `byte_address`.
    fn write(&mut self, byte_address: u64, buf: &[u8]) -> Result<(), DriverError>;

    fn flush(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    fn is_attached(&self) -> bool {
        true
    }

    fn supports_packet_commands(&self) -> bool;

    fn supports_overlap(&self) -> bool {
        false
    }

    fn is_overlap_enabled(&self) -> bool {
        false
    }

    fn has_medium(&self) -> bool;

    /// Medium size in units of [`Self::sector_size`].
    fn medium_capacity_sectors(&self) -> u32;

    fn sector_size(&self) -> u32;

    fn is_lba_address_user_accessible(&self, lba: u32) -> bool;

    /// Current CHS translation geometry, if the device supports CHS addressing.
    fn geometry(&self) -> Option<Geometry> {
        None
    }

    fn chs_to_lba(&self, chs: Chs) -> Option<u32> {
        self.geometry()?.chs_to_lba(chs)
    }

    fn lba_to_chs(&self, lba: u32) -> Option<Chs> {
        self.geometry()?.lba_to_chs(lba)
    }

    /// Length of the command packet accepted by PACKET.
    fn packet_command_size(&self) -> usize {
        12
    }

    /// Returns and clears the "medium changed since last check" latch.
    fn take_medium_changed(&mut self) -> bool {
        false
    }

    fn insert_medium(
        &mut self,
        _medium: Box<dyn strikebox_storage::StorageBackend>,
    ) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("removable medium"))
    }

    fn eject_medium(&mut self) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("removable medium"))
    }
}

/// Rejects byte ranges that run past `capacity_bytes`.
pub(crate) fn check_bounds(
    byte_address: u64,
    len: usize,
    capacity_bytes: u64,
) -> Result<(), DriverError> {
    strikebox_storage::checked_range(byte_address, len, capacity_bytes)
        .map(|_| ())
        .map_err(|_| DriverError::OutOfRange { byte_address, len })
}
