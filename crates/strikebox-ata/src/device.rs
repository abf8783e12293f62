//! Per-slot ATA device state.

use tracing::{debug, trace, warn};

use crate::atapi::Sense;
use crate::defs::{
    ChannelId, DeviceIndex, DmaTransferType, PioTransferType, TransferMode, ATA_SECTOR_SIZE,
    MAX_MULTIWORD_DMA_MODE, MAX_PIO_MODE, MAX_ULTRA_DMA_MODE, SETFEATURES_DISABLE_REVERTING,
    SETFEATURES_DISABLE_WRITE_CACHE, SETFEATURES_ENABLE_REVERTING, SETFEATURES_ENABLE_WRITE_CACHE,
    SETFEATURES_SET_TRANSFER_MODE,
};
use crate::drivers::{AtaDeviceDriver, NullDriver};
use crate::error::{AtaError, DriverError};
use crate::identify::{IdentifyDeviceData, IdentifyPacketDeviceData};
use crate::regs::AtaRegisters;

/// Direction of a DMA transfer, from the host's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaDirection {
    /// Device to memory (READ DMA).
    Read,
    /// Memory to device (WRITE DMA).
    Write,
}

/// Sector window of an in-progress DMA transfer. `start <= current <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaWindow {
    pub start_lba: u32,
    pub end_lba: u32,
    pub current_lba: u32,
    pub direction: DmaDirection,
}

impl DmaWindow {
    pub fn is_finished(&self) -> bool {
        self.current_lba == self.end_lba
    }
}

/// Half-open LBA range `[start, end)` named by a command's address registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorRange {
    pub start: u32,
    pub end: u32,
}

impl SectorRange {
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    Idle,
    Pio,
    Dma(DmaWindow),
}

/// One device slot on a channel.
///
/// Holds the register-visible device state (transfer modes, the PIO buffer, the DMA window and
/// ATAPI sense data) and delegates medium access to its [`AtaDeviceDriver`]. At most one data
/// transfer, PIO or DMA, is active at a time.
pub struct AtaDevice {
    channel: ChannelId,
    index: DeviceIndex,
    driver: Box<dyn AtaDeviceDriver>,
    pio_transfer: (PioTransferType, u8),
    dma_transfer: Option<(DmaTransferType, u8)>,
    buffer: [u8; ATA_SECTOR_SIZE],
    buffer_len: usize,
    buffer_pos: usize,
    transfer: Transfer,
    sense: Sense,
}

impl std::fmt::Debug for AtaDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtaDevice")
            .field("channel", &self.channel)
            .field("index", &self.index)
            .field("attached", &self.driver.is_attached())
            .field("pio_transfer", &self.pio_transfer)
            .field("dma_transfer", &self.dma_transfer)
            .field("buffer_len", &self.buffer_len)
            .field("buffer_pos", &self.buffer_pos)
            .field("transfer", &self.transfer)
            .finish()
    }
}

impl AtaDevice {
    /// An empty slot.
    pub fn new(channel: ChannelId, index: DeviceIndex) -> Self {
        Self::with_driver(channel, index, Box::new(NullDriver))
    }

    pub fn with_driver(
        channel: ChannelId,
        index: DeviceIndex,
        driver: Box<dyn AtaDeviceDriver>,
    ) -> Self {
        Self {
            channel,
            index,
            driver,
            pio_transfer: (PioTransferType::Default, 0),
            dma_transfer: None,
            buffer: [0; ATA_SECTOR_SIZE],
            buffer_len: 0,
            buffer_pos: 0,
            transfer: Transfer::Idle,
            sense: Sense::default(),
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn index(&self) -> DeviceIndex {
        self.index
    }

    pub fn driver(&self) -> &dyn AtaDeviceDriver {
        self.driver.as_ref()
    }

    pub fn driver_mut(&mut self) -> &mut dyn AtaDeviceDriver {
        self.driver.as_mut()
    }

    /// Replaces the driver, cancelling any transfer. Returns the previous driver.
    pub fn attach(&mut self, driver: Box<dyn AtaDeviceDriver>) -> Box<dyn AtaDeviceDriver> {
        self.reset();
        self.sense = Sense::default();
        std::mem::replace(&mut self.driver, driver)
    }

    pub fn detach(&mut self) -> Box<dyn AtaDeviceDriver> {
        self.attach(Box::new(NullDriver))
    }

    pub fn is_attached(&self) -> bool {
        self.driver.is_attached()
    }

    pub fn is_packet_device(&self) -> bool {
        self.driver.supports_packet_commands()
    }

    /// Cancels any transfer and empties the PIO buffer. Transfer modes are retained.
    pub fn reset(&mut self) {
        self.transfer = Transfer::Idle;
        self.buffer_len = 0;
        self.buffer_pos = 0;
    }

    // ---- PIO buffer ------------------------------------------------------------------------

    /// Copies up to `dest.len()` bytes from the buffer cursor and advances it. Returns the
    /// number of bytes copied, which may be less than requested.
    pub fn read_buffer(&mut self, dest: &mut [u8]) -> usize {
        let n = dest.len().min(self.remaining_buffer_length());
        dest[..n].copy_from_slice(&self.buffer[self.buffer_pos..self.buffer_pos + n]);
        self.buffer_pos += n;
        n
    }

    /// Copies up to `src.len()` bytes into the buffer at the cursor and advances it.
    pub fn write_buffer(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.remaining_buffer_length());
        self.buffer[self.buffer_pos..self.buffer_pos + n].copy_from_slice(&src[..n]);
        self.buffer_pos += n;
        n
    }

    pub fn remaining_buffer_length(&self) -> usize {
        self.buffer_len - self.buffer_pos
    }

    /// Valid bytes of the current buffer block.
    pub fn buffer_contents(&self) -> &[u8] {
        &self.buffer[..self.buffer_len]
    }

    /// Fills the buffer for a data-in block. Data past the buffer size is dropped.
    pub(crate) fn load_buffer(&mut self, data: &[u8]) {
        let n = data.len().min(ATA_SECTOR_SIZE);
        if n < data.len() {
            warn!(len = data.len(), "data-in block truncated to buffer size");
        }
        self.buffer[..n].copy_from_slice(&data[..n]);
        self.buffer_len = n;
        self.buffer_pos = 0;
    }

    /// Prepares an empty buffer window of `len` bytes for a data-out block.
    pub(crate) fn expect_buffer(&mut self, len: usize) {
        let n = len.min(ATA_SECTOR_SIZE);
        self.buffer[..n].fill(0);
        self.buffer_len = n;
        self.buffer_pos = 0;
    }

    // ---- transfer state --------------------------------------------------------------------

    pub fn is_transfer_active(&self) -> bool {
        self.transfer != Transfer::Idle
    }

    pub(crate) fn begin_pio_transfer(&mut self) -> Result<(), AtaError> {
        if self.is_transfer_active() {
            return Err(AtaError::Aborted("transfer already in progress"));
        }
        self.transfer = Transfer::Pio;
        Ok(())
    }

    pub(crate) fn end_pio_transfer(&mut self) {
        if self.transfer == Transfer::Pio {
            self.transfer = Transfer::Idle;
        }
        self.buffer_len = 0;
        self.buffer_pos = 0;
    }

    pub fn dma_window(&self) -> Option<&DmaWindow> {
        match &self.transfer {
            Transfer::Dma(window) => Some(window),
            _ => None,
        }
    }

    /// Arms a DMA read over the sectors named by the address registers.
    pub fn begin_read_dma(&mut self, regs: &AtaRegisters) -> Result<(), AtaError> {
        self.begin_dma(regs, DmaDirection::Read)
    }

    /// Arms a DMA write over the sectors named by the address registers.
    pub fn begin_write_dma(&mut self, regs: &AtaRegisters) -> Result<(), AtaError> {
        self.begin_dma(regs, DmaDirection::Write)
    }

    fn begin_dma(&mut self, regs: &AtaRegisters, direction: DmaDirection) -> Result<(), AtaError> {
        if self.is_transfer_active() {
            return Err(AtaError::Aborted("transfer already in progress"));
        }
        let range = self.sector_range(regs)?;
        debug!(
            channel = ?self.channel,
            device = ?self.index,
            ?direction,
            start = range.start,
            end = range.end,
            "DMA window armed"
        );
        self.transfer = Transfer::Dma(DmaWindow {
            start_lba: range.start,
            end_lba: range.end,
            current_lba: range.start,
            direction,
        });
        Ok(())
    }

    fn next_dma_sector(&self, direction: DmaDirection) -> Result<u32, AtaError> {
        let Transfer::Dma(window) = &self.transfer else {
            warn!(?direction, "DMA sector transfer with no DMA window");
            return Err(AtaError::Aborted("no DMA transfer in progress"));
        };
        if window.direction != direction {
            warn!(?direction, window = ?window.direction, "DMA direction mismatch");
            return Err(AtaError::Aborted("DMA direction mismatch"));
        }
        if window.is_finished() {
            return Err(AtaError::Aborted("DMA window exhausted"));
        }
        Ok(window.current_lba)
    }

    fn advance_dma(&mut self) {
        if let Transfer::Dma(window) = &mut self.transfer {
            window.current_lba += 1;
        }
    }

    /// Reads the next sector of the DMA window into `dst`.
    pub fn read_dma(&mut self, dst: &mut [u8; ATA_SECTOR_SIZE]) -> Result<(), AtaError> {
        let lba = self.next_dma_sector(DmaDirection::Read)?;
        self.driver
            .read(u64::from(lba) * ATA_SECTOR_SIZE as u64, dst)
            .map_err(|err| medium_error(lba, err))?;
        trace!(lba, "DMA sector read");
        self.advance_dma();
        Ok(())
    }

    /// Writes `src` to the next sector of the DMA window.
    pub fn write_dma(&mut self, src: &[u8; ATA_SECTOR_SIZE]) -> Result<(), AtaError> {
        let lba = self.next_dma_sector(DmaDirection::Write)?;
        self.driver
            .write(u64::from(lba) * ATA_SECTOR_SIZE as u64, src)
            .map_err(|err| medium_error(lba, err))?;
        trace!(lba, "DMA sector written");
        self.advance_dma();
        Ok(())
    }

    /// Whether no sectors remain in the DMA window. True when no DMA transfer is armed.
    pub fn is_dma_finished(&self) -> bool {
        match &self.transfer {
            Transfer::Dma(window) => window.is_finished(),
            _ => true,
        }
    }

    /// Drops the DMA window. Idempotent.
    pub fn end_dma(&mut self) {
        if let Transfer::Dma(window) = self.transfer {
            trace!(?window, "DMA window released");
            self.transfer = Transfer::Idle;
        }
    }

    // ---- addressing ------------------------------------------------------------------------

    /// Resolves the LBA or CHS address and sector count registers into a sector range,
    /// validating it against the medium and its user-accessible area.
    pub fn sector_range(&self, regs: &AtaRegisters) -> Result<SectorRange, AtaError> {
        self.check_media_access()?;
        let start = if regs.is_lba_mode() {
            regs.lba28()
        } else {
            self.driver
                .chs_to_lba(regs.chs())
                .ok_or(AtaError::InvalidAddress)?
        };
        let end = start
            .checked_add(regs.sector_count_or_256())
            .ok_or(AtaError::IdNotFound { lba: start })?;
        if end > self.driver.medium_capacity_sectors()
            || !self.driver.is_lba_address_user_accessible(start)
            || !self.driver.is_lba_address_user_accessible(end - 1)
        {
            return Err(AtaError::IdNotFound { lba: start });
        }
        Ok(SectorRange { start, end })
    }

    fn check_media_access(&self) -> Result<(), AtaError> {
        if !self.driver.is_attached() {
            return Err(AtaError::Aborted("no device attached"));
        }
        if !self.driver.has_medium() {
            return Err(AtaError::NoMedium);
        }
        if self.driver.supports_packet_commands() {
            return Err(AtaError::Aborted("sector commands are not valid for packet devices"));
        }
        if self.driver.is_security_locked() {
            return Err(AtaError::Aborted("device is security locked"));
        }
        Ok(())
    }

    /// Loads sector `lba` into the PIO buffer.
    pub(crate) fn read_sector_to_buffer(&mut self, lba: u32) -> Result<(), AtaError> {
        let mut sector = [0u8; ATA_SECTOR_SIZE];
        self.driver
            .read(u64::from(lba) * ATA_SECTOR_SIZE as u64, &mut sector)
            .map_err(|err| medium_error(lba, err))?;
        self.load_buffer(&sector);
        Ok(())
    }

    /// Stores the PIO buffer to sector `lba`.
    pub(crate) fn write_buffer_to_sector(&mut self, lba: u32) -> Result<(), AtaError> {
        self.driver
            .write(u64::from(lba) * ATA_SECTOR_SIZE as u64, &self.buffer)
            .map_err(|err| medium_error(lba, err))
    }

    /// READ VERIFY SECTORS: reads every addressed sector without transferring it.
    pub fn verify_sectors(&mut self, regs: &AtaRegisters) -> Result<(), AtaError> {
        let range = self.sector_range(regs)?;
        let mut scratch = [0u8; ATA_SECTOR_SIZE];
        for lba in range.start..range.end {
            self.driver
                .read(u64::from(lba) * ATA_SECTOR_SIZE as u64, &mut scratch)
                .map_err(|err| medium_error(lba, err))?;
        }
        Ok(())
    }

    /// SEEK: validates the addressed sector.
    pub fn seek(&self, regs: &AtaRegisters) -> Result<(), AtaError> {
        self.check_media_access()?;
        let lba = if regs.is_lba_mode() {
            regs.lba28()
        } else {
            self.driver
                .chs_to_lba(regs.chs())
                .ok_or(AtaError::InvalidAddress)?
        };
        if !self.driver.is_lba_address_user_accessible(lba) {
            return Err(AtaError::IdNotFound { lba });
        }
        Ok(())
    }

    pub fn flush_cache(&mut self) -> Result<(), AtaError> {
        if !self.driver.is_attached() {
            return Err(AtaError::Aborted("no device attached"));
        }
        self.driver.flush()?;
        Ok(())
    }

    // ---- identification --------------------------------------------------------------------

    /// Loads IDENTIFY DEVICE data into the PIO buffer.
    ///
    /// Packet devices refuse and load the packet signature into the registers so the host can
    /// tell them apart.
    pub fn identify_device(&mut self, regs: &mut AtaRegisters) -> Result<(), AtaError> {
        if !self.driver.is_attached() {
            return Err(AtaError::Aborted("no device attached"));
        }
        let mut data = IdentifyDeviceData::default();
        if let Err(err) = self.driver.identify_device(&mut data) {
            debug!(%err, device = ?self.index, "IDENTIFY DEVICE refused");
            if self.driver.supports_packet_commands() {
                regs.write_signature(true);
            }
            return Err(AtaError::Aborted("IDENTIFY DEVICE not supported"));
        }
        data.set_selected_dma_mode(self.dma_transfer);
        self.load_buffer(&data.to_bytes());
        Ok(())
    }

    /// Loads IDENTIFY PACKET DEVICE data into the PIO buffer.
    pub fn identify_packet_device(&mut self) -> Result<(), AtaError> {
        let mut data = IdentifyPacketDeviceData::default();
        if let Err(err) = self.driver.identify_packet_device(&mut data) {
            debug!(%err, device = ?self.index, "IDENTIFY PACKET DEVICE refused");
            return Err(AtaError::Aborted("IDENTIFY PACKET DEVICE not supported"));
        }
        data.set_selected_dma_mode(self.dma_transfer);
        self.load_buffer(&data.to_bytes());
        Ok(())
    }

    // ---- configuration ---------------------------------------------------------------------

    /// SET FEATURES, dispatched on the features register.
    pub fn set_features(&mut self, regs: &AtaRegisters) -> Result<(), AtaError> {
        if !self.driver.is_attached() {
            return Err(AtaError::Aborted("no device attached"));
        }
        match regs.features {
            SETFEATURES_SET_TRANSFER_MODE => self.set_transfer_mode(regs.sector_count),
            SETFEATURES_ENABLE_WRITE_CACHE
            | SETFEATURES_DISABLE_WRITE_CACHE
            | SETFEATURES_DISABLE_REVERTING
            | SETFEATURES_ENABLE_REVERTING => {
                trace!(features = regs.features, "SET FEATURES accepted");
                Ok(())
            }
            other => {
                debug!(features = other, "unsupported SET FEATURES subcommand");
                Err(AtaError::Aborted("unsupported SET FEATURES subcommand"))
            }
        }
    }

    /// Decodes and applies a "set transfer mode" value.
    pub fn set_transfer_mode(&mut self, value: u8) -> Result<(), AtaError> {
        let mode = TransferMode::decode(value).ok_or(AtaError::InvalidTransferMode { value })?;
        let result = match mode {
            TransferMode::Pio(kind, mode) => self.set_pio_transfer_mode(kind, mode),
            TransferMode::Dma(kind, mode) => self.set_dma_transfer_mode(kind, mode),
        };
        result.map_err(|_| AtaError::InvalidTransferMode { value })
    }

    pub fn set_pio_transfer_mode(
        &mut self,
        kind: PioTransferType,
        mode: u8,
    ) -> Result<(), AtaError> {
        let mode = match kind {
            PioTransferType::Default | PioTransferType::DefaultNoIordy => 0,
            PioTransferType::FlowControl if mode <= MAX_PIO_MODE => mode,
            PioTransferType::FlowControl => {
                return Err(AtaError::InvalidTransferMode { value: 0x08 | mode })
            }
        };
        debug!(device = ?self.index, ?kind, mode, "PIO transfer mode selected");
        self.pio_transfer = (kind, mode);
        Ok(())
    }

    pub fn set_dma_transfer_mode(
        &mut self,
        kind: DmaTransferType,
        mode: u8,
    ) -> Result<(), AtaError> {
        let supported = match kind {
            DmaTransferType::SingleWord => false,
            DmaTransferType::MultiWord => mode <= MAX_MULTIWORD_DMA_MODE,
            DmaTransferType::UltraDma => mode <= MAX_ULTRA_DMA_MODE,
        };
        if !supported {
            return Err(AtaError::InvalidTransferMode {
                value: TransferMode::Dma(kind, mode).encode(),
            });
        }
        debug!(device = ?self.index, ?kind, mode, "DMA transfer mode selected");
        self.dma_transfer = Some((kind, mode));
        Ok(())
    }

    pub fn pio_transfer_mode(&self) -> (PioTransferType, u8) {
        self.pio_transfer
    }

    pub fn dma_transfer_mode(&self) -> Option<(DmaTransferType, u8)> {
        self.dma_transfer
    }

    /// INITIALIZE DEVICE PARAMETERS: heads from device/head bits 3..0 (plus one), sectors per
    /// track from the sector count register.
    pub fn initialize_device_parameters(&mut self, regs: &AtaRegisters) -> Result<(), AtaError> {
        let heads = (regs.device_head & 0x0F) + 1;
        let sectors_per_track = regs.sector_count;
        self.driver
            .set_device_parameters(heads, sectors_per_track)
            .map_err(|err| {
                debug!(%err, heads, sectors_per_track, "device parameters rejected");
                AtaError::Aborted("device parameters rejected")
            })
    }

    /// SECURITY UNLOCK using the data block held in the PIO buffer.
    pub fn security_unlock(&mut self) -> Result<(), AtaError> {
        let block = self.buffer;
        self.driver.security_unlock(&block).map_err(|err| {
            debug!(%err, "security unlock failed");
            AtaError::Aborted("security unlock failed")
        })
    }

    // ---- ATAPI sense -----------------------------------------------------------------------

    pub fn sense(&self) -> Sense {
        self.sense
    }

    pub fn set_sense(&mut self, sense: Sense) {
        self.sense = sense;
    }

    pub fn clear_sense(&mut self) {
        self.sense = Sense::default();
    }
}

fn medium_error(lba: u32, err: DriverError) -> AtaError {
    match err {
        DriverError::NoMedium => AtaError::NoMedium,
        DriverError::OutOfRange { .. } => AtaError::IdNotFound { lba },
        other => AtaError::Medium(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{DvdDrive, HardDiskDriver};
    use proptest::prelude::*;
    use strikebox_storage::MemBackend;

    fn hdd_device(sectors: usize) -> AtaDevice {
        let mut data = vec![0u8; sectors * ATA_SECTOR_SIZE];
        for (i, sector) in data.chunks_exact_mut(ATA_SECTOR_SIZE).enumerate() {
            sector.fill(i as u8);
        }
        let driver = HardDiskDriver::new(Box::new(MemBackend::from_vec(data))).unwrap();
        AtaDevice::with_driver(ChannelId::Primary, DeviceIndex::Master, Box::new(driver))
    }

    fn lba_regs(lba: u32, count: u8) -> AtaRegisters {
        let mut regs = AtaRegisters::default();
        regs.set_lba28(lba);
        regs.sector_count = count;
        regs
    }

    #[test]
    fn dma_window_covers_requested_sectors() {
        let mut device = hdd_device(200);
        device.begin_read_dma(&lba_regs(100, 3)).unwrap();
        let window = *device.dma_window().unwrap();
        assert_eq!((window.start_lba, window.end_lba), (100, 103));

        let mut sector = [0u8; ATA_SECTOR_SIZE];
        for expected in 100u8..103 {
            assert!(!device.is_dma_finished());
            device.read_dma(&mut sector).unwrap();
            assert!(sector.iter().all(|&b| b == expected));
        }
        assert!(device.is_dma_finished());
        assert!(device.read_dma(&mut sector).is_err());

        device.end_dma();
        device.end_dma();
        assert!(device.dma_window().is_none());
        assert!(!device.is_transfer_active());
    }

    #[test]
    fn dma_window_keeps_full_lba_width() {
        let mut device = hdd_device(1024);
        device.begin_write_dma(&lba_regs(700, 2)).unwrap();
        let sector = [0xEEu8; ATA_SECTOR_SIZE];
        device.write_dma(&sector).unwrap();
        assert_eq!(device.dma_window().unwrap().current_lba, 701);
    }

    #[test]
    fn dma_direction_is_enforced() {
        let mut device = hdd_device(8);
        device.begin_read_dma(&lba_regs(0, 1)).unwrap();
        assert!(device.write_dma(&[0u8; ATA_SECTOR_SIZE]).is_err());
        assert_eq!(device.dma_window().unwrap().current_lba, 0);
    }

    #[test]
    fn dma_without_window_fails() {
        let mut device = hdd_device(8);
        let mut sector = [0u8; ATA_SECTOR_SIZE];
        assert!(device.read_dma(&mut sector).is_err());
    }

    #[test]
    fn only_one_transfer_at_a_time() {
        let mut device = hdd_device(8);
        device.begin_read_dma(&lba_regs(0, 1)).unwrap();
        assert!(device.begin_pio_transfer().is_err());
        assert!(device.begin_write_dma(&lba_regs(0, 1)).is_err());
    }

    #[test]
    fn range_past_capacity_is_id_not_found() {
        let device = hdd_device(8);
        assert_eq!(
            device.sector_range(&lba_regs(6, 3)),
            Err(AtaError::IdNotFound { lba: 6 })
        );
        assert_eq!(
            device.sector_range(&lba_regs(6, 2)),
            Ok(SectorRange { start: 6, end: 8 })
        );
    }

    #[test]
    fn dvd_refuses_sector_commands() {
        let device = AtaDevice::with_driver(
            ChannelId::Primary,
            DeviceIndex::Slave,
            Box::new(DvdDrive::empty()),
        );
        assert_eq!(device.sector_range(&lba_regs(0, 1)), Err(AtaError::NoMedium));
    }

    #[test]
    fn identify_on_packet_device_writes_signature() {
        let mut device = AtaDevice::with_driver(
            ChannelId::Primary,
            DeviceIndex::Slave,
            Box::new(DvdDrive::empty()),
        );
        let mut regs = AtaRegisters::default();
        assert!(device.identify_device(&mut regs).is_err());
        assert_eq!((regs.cylinder_low, regs.cylinder_high), (0x14, 0xEB));

        device.identify_packet_device().unwrap();
        assert_eq!(device.remaining_buffer_length(), ATA_SECTOR_SIZE);
    }

    #[test]
    fn transfer_modes_are_tracked_separately() {
        let mut device = hdd_device(8);
        device.set_transfer_mode(0x0C).unwrap();
        device.set_transfer_mode(0x42).unwrap();
        assert_eq!(
            device.pio_transfer_mode(),
            (PioTransferType::FlowControl, 4)
        );
        assert_eq!(
            device.dma_transfer_mode(),
            Some((DmaTransferType::UltraDma, 2))
        );
    }

    #[test]
    fn unsupported_transfer_modes_are_rejected() {
        let mut device = hdd_device(8);
        for value in [0x0D, 0x10, 0x23, 0x43, 0x80] {
            assert_eq!(
                device.set_transfer_mode(value),
                Err(AtaError::InvalidTransferMode { value })
            );
        }
        assert_eq!(device.dma_transfer_mode(), None);
    }

    #[test]
    fn identify_reports_selected_dma_mode() {
        let mut device = hdd_device(8);
        device.set_transfer_mode(0x21).unwrap();
        device.identify_device(&mut AtaRegisters::default()).unwrap();
        let mut bytes = [0u8; ATA_SECTOR_SIZE];
        assert_eq!(device.read_buffer(&mut bytes), ATA_SECTOR_SIZE);
        let data = IdentifyDeviceData::from_bytes(&bytes);
        assert_eq!(data.word(63), 0x0207);
        assert_eq!(data.word(88), 0x0007);
    }

    #[test]
    fn partial_buffer_reads() {
        let mut device = hdd_device(4);
        device.read_sector_to_buffer(2).unwrap();
        let mut head = [0u8; 100];
        assert_eq!(device.read_buffer(&mut head), 100);
        assert_eq!(device.remaining_buffer_length(), 412);
        let mut rest = [0u8; 1000];
        assert_eq!(device.read_buffer(&mut rest), 412);
        assert_eq!(device.read_buffer(&mut rest), 0);
    }

    proptest! {
        #[test]
        fn buffer_cursor_never_overruns(reads in proptest::collection::vec(0usize..700, 0..8)) {
            let mut device = hdd_device(1);
            device.read_sector_to_buffer(0).unwrap();
            let mut total = 0;
            for len in reads {
                let before = device.remaining_buffer_length();
                let mut dest = vec![0u8; len];
                let n = device.read_buffer(&mut dest);
                prop_assert_eq!(n, len.min(before));
                prop_assert_eq!(device.remaining_buffer_length(), before - n);
                total += n;
            }
            prop_assert!(total <= ATA_SECTOR_SIZE);
        }
    }
}
