use crate::defs::ATA_SECTOR_SIZE;
use crate::drivers::AtaDeviceDriver;
use crate::error::DriverError;
use crate::identify::{IdentifyDeviceData, IdentifyPacketDeviceData};

/// Stand-in for an empty device slot.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDriver;

impl AtaDeviceDriver for NullDriver {
    fn identify_device(&self, _data: &mut IdentifyDeviceData) -> Result<(), DriverError> {
        Err(DriverError::NotAttached)
    }

    fn identify_packet_device(
        &self,
        _data: &mut IdentifyPacketDeviceData,
    ) -> Result<(), DriverError> {
        Err(DriverError::NotAttached)
    }

    fn security_unlock(&mut self, _unlock_data: &[u8; ATA_SECTOR_SIZE]) -> Result<(), DriverError> {
        Err(DriverError::NotAttached)
    }

    fn set_device_parameters(
        &mut self,
        _heads: u8,
        _sectors_per_track: u8,
    ) -> Result<(), DriverError> {
        Err(DriverError::NotAttached)
    }

    fn read(&mut self, _byte_address: u64, _buf: &mut [u8]) -> Result<(), DriverError> {
        Err(DriverError::NotAttached)
    }

    fn write(&mut self, _byte_address: u64, _buf: &[u8]) -> Result<(), DriverError> {
        Err(DriverError::NotAttached)
    }

    fn is_attached(&self) -> bool {
        false
    }

    fn supports_packet_commands(&self) -> bool {
        false
    }

    fn has_medium(&self) -> bool {
        false
    }

    fn medium_capacity_sectors(&self) -> u32 {
        0
    }

    fn sector_size(&self) -> u32 {
        ATA_SECTOR_SIZE as u32
    }

    fn is_lba_address_user_accessible(&self, _lba: u32) -> bool {
        false
    }
}
