use tracing::{trace, warn};

use crate::cmds::{AtaCommand, CommandContext, CommandCore, CommandState, Protocol};
use crate::device::SectorRange;
use crate::error::AtaError;

/// Device work of a PIO data-in command.
pub trait PioDataInCommand {
    /// Validates the request and returns the number of data blocks to send.
    fn prepare(&mut self, ctx: &mut CommandContext<'_>) -> Result<u32, AtaError>;

    /// Loads block `index` into the device's PIO buffer.
    fn load_block(&mut self, ctx: &mut CommandContext<'_>, index: u32) -> Result<(), AtaError>;
}

/// PIO data-in protocol. Each block is announced with DRQ and an interrupt; reading the final
/// byte of the last block completes the command without a further interrupt.
pub struct PioDataInProtocol<C> {
    core: CommandCore,
    command: C,
    blocks: u32,
    next_block: u32,
}

impl<C: PioDataInCommand> PioDataInProtocol<C> {
    pub fn new(opcode: u8, command: C) -> Self {
        Self {
            core: CommandCore::new(opcode),
            command,
            blocks: 0,
            next_block: 0,
        }
    }

    fn send_next_block(&mut self, ctx: &mut CommandContext<'_>) {
        match self.command.load_block(ctx, self.next_block) {
            Ok(()) => {
                trace!(block = self.next_block, of = self.blocks, "PIO data-in block ready");
                self.next_block += 1;
                self.core.request_data(ctx, true);
            }
            Err(err) => {
                ctx.device.end_pio_transfer();
                self.core.complete(ctx, Err(err), true);
            }
        }
    }
}

impl<C: PioDataInCommand> AtaCommand for PioDataInProtocol<C> {
    fn opcode(&self) -> u8 {
        self.core.opcode()
    }

    fn protocol(&self) -> Protocol {
        Protocol::PioDataIn
    }

    fn state(&self) -> CommandState {
        self.core.state()
    }

    fn execute(&mut self, ctx: &mut CommandContext<'_>) {
        self.core.begin(ctx);
        let blocks = self
            .command
            .prepare(ctx)
            .and_then(|blocks| ctx.device.begin_pio_transfer().map(|()| blocks));
        match blocks {
            Ok(0) => {
                ctx.device.end_pio_transfer();
                self.core.complete(ctx, Ok(()), true);
            }
            Ok(blocks) => {
                self.blocks = blocks;
                self.send_next_block(ctx);
            }
            Err(err) => self.core.complete(ctx, Err(err), true),
        }
    }

    fn read_data(&mut self, ctx: &mut CommandContext<'_>, buf: &mut [u8]) -> usize {
        if !self.core.is_executing() {
            warn!(opcode = self.core.opcode(), "data read outside a data-in phase");
            return 0;
        }
        let n = ctx.device.read_buffer(buf);
        if ctx.device.remaining_buffer_length() == 0 {
            if self.next_block < self.blocks {
                self.core.busy(ctx);
                self.send_next_block(ctx);
            } else {
                ctx.device.end_pio_transfer();
                self.core.complete(ctx, Ok(()), false);
            }
        }
        n
    }

    fn write_data(&mut self, _ctx: &mut CommandContext<'_>, _buf: &[u8]) -> usize {
        warn!(opcode = self.core.opcode(), "data write during data-in command");
        0
    }

    fn abort(&mut self, ctx: &mut CommandContext<'_>) {
        if self.core.is_executing() {
            ctx.device.end_pio_transfer();
            self.core
                .complete(ctx, Err(AtaError::Aborted("command aborted by host")), true);
        }
    }
}

/// IDENTIFY DEVICE (0xEC).
pub struct IdentifyDevice;

impl PioDataInCommand for IdentifyDevice {
    fn prepare(&mut self, _ctx: &mut CommandContext<'_>) -> Result<u32, AtaError> {
        Ok(1)
    }

    fn load_block(&mut self, ctx: &mut CommandContext<'_>, _index: u32) -> Result<(), AtaError> {
        ctx.device.identify_device(ctx.regs)
    }
}

/// IDENTIFY PACKET DEVICE (0xA1).
pub struct IdentifyPacketDevice;

impl PioDataInCommand for IdentifyPacketDevice {
    fn prepare(&mut self, _ctx: &mut CommandContext<'_>) -> Result<u32, AtaError> {
        Ok(1)
    }

    fn load_block(&mut self, ctx: &mut CommandContext<'_>, _index: u32) -> Result<(), AtaError> {
        ctx.device.identify_packet_device()
    }
}

/// READ SECTORS (0x20/0x21).
#[derive(Debug, Default)]
pub struct ReadSectors {
    range: Option<SectorRange>,
}

impl PioDataInCommand for ReadSectors {
    fn prepare(&mut self, ctx: &mut CommandContext<'_>) -> Result<u32, AtaError> {
        let range = ctx.device.sector_range(ctx.regs)?;
        self.range = Some(range);
        Ok(range.len())
    }

    fn load_block(&mut self, ctx: &mut CommandContext<'_>, index: u32) -> Result<(), AtaError> {
        let range = self
            .range
            .ok_or(AtaError::Aborted("READ SECTORS block before prepare"))?;
        let lba = range.start + index;
        let result = ctx.device.read_sector_to_buffer(lba);
        if result.is_err() {
            // Report the failing sector through the address registers.
            ctx.regs.set_lba28(lba);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmds::test_support::Harness;
    use crate::cmds::{build, Outcome};
    use crate::defs::*;
    use crate::device::AtaDevice;
    use crate::drivers::{DvdDrive, HardDiskDriver, NullDriver};
    use crate::identify::IdentifyDeviceData;
    use crate::regs::Status;
    use pretty_assertions::assert_eq;
    use strikebox_storage::MemBackend;

    fn hdd(sectors: usize) -> Harness {
        let mut data = vec![0u8; sectors * ATA_SECTOR_SIZE];
        for (i, sector) in data.chunks_exact_mut(ATA_SECTOR_SIZE).enumerate() {
            sector.fill(i as u8);
        }
        let driver = HardDiskDriver::new(Box::new(MemBackend::from_vec(data))).unwrap();
        Harness::new(AtaDevice::with_driver(
            ChannelId::Primary,
            DeviceIndex::Master,
            Box::new(driver),
        ))
    }

    #[test]
    fn identify_device_delivers_one_block() {
        let mut h = hdd(64);
        let mut cmd = build(ATA_CMD_IDENTIFY_DEVICE);
        cmd.execute(&mut h.ctx());
        assert!(h.regs.status.contains(Status::DRQ));
        assert!(!h.regs.status.contains(Status::BSY));
        assert_eq!(h.line.assert_count(), 1);
        h.ack();

        let mut bytes = [0u8; ATA_SECTOR_SIZE];
        for chunk in bytes.chunks_exact_mut(2) {
            assert_eq!(cmd.read_data(&mut h.ctx(), chunk), 2);
        }
        assert_eq!(cmd.state(), CommandState::Finished(Outcome::Success));
        assert!(!h.regs.status.contains(Status::DRQ));
        // No interrupt after the last block is read.
        assert_eq!(h.line.assert_count(), 1);
        assert!(!h.device.is_transfer_active());

        let data = IdentifyDeviceData::from_bytes(&bytes);
        assert_eq!(data.user_addressable_sectors(), 64);
        assert_eq!(data.model_number(), "STRIKEBOX HARD DISK");
    }

    #[test]
    fn read_sectors_interrupts_per_block() {
        let mut h = hdd(16);
        h.regs.set_lba28(4);
        h.regs.sector_count = 3;
        let mut cmd = build(ATA_CMD_READ_SECTORS);
        cmd.execute(&mut h.ctx());

        for expected in 4u8..7 {
            assert!(h.regs.status.contains(Status::DRQ));
            h.ack();
            let mut sector = [0u8; ATA_SECTOR_SIZE];
            assert_eq!(cmd.read_data(&mut h.ctx(), &mut sector), ATA_SECTOR_SIZE);
            assert!(sector.iter().all(|&b| b == expected));
        }
        assert_eq!(h.line.assert_count(), 3);
        assert_eq!(cmd.state(), CommandState::Finished(Outcome::Success));
        assert_eq!(cmd.read_data(&mut h.ctx(), &mut [0u8; 2]), 0);
    }

    #[test]
    fn read_sectors_on_empty_slot_aborts() {
        let mut h = Harness::new(AtaDevice::with_driver(
            ChannelId::Primary,
            DeviceIndex::Master,
            Box::new(NullDriver),
        ));
        h.regs.set_lba28(0);
        h.regs.sector_count = 1;
        let mut cmd = build(ATA_CMD_READ_SECTORS);
        cmd.execute(&mut h.ctx());
        assert_eq!(cmd.state(), CommandState::Finished(Outcome::Error));
        assert_eq!(h.regs.error, 0x04);
        assert_eq!(h.line.assert_count(), 1);
    }

    #[test]
    fn read_sectors_on_dvd_without_medium_fails_with_interrupt() {
        let mut h = Harness::new(AtaDevice::with_driver(
            ChannelId::Primary,
            DeviceIndex::Slave,
            Box::new(DvdDrive::empty()),
        ));
        h.regs.set_lba28(0);
        h.regs.sector_count = 1;
        let mut cmd = build(ATA_CMD_READ_SECTORS);
        cmd.execute(&mut h.ctx());
        assert_eq!(cmd.state(), CommandState::Finished(Outcome::Error));
        assert!(h.regs.status.contains(Status::ERR));
        assert_eq!(h.line.assert_count(), 1);
    }

    #[test]
    fn identify_device_on_dvd_aborts_with_signature() {
        let mut h = Harness::new(AtaDevice::with_driver(
            ChannelId::Primary,
            DeviceIndex::Slave,
            Box::new(DvdDrive::empty()),
        ));
        let mut cmd = build(ATA_CMD_IDENTIFY_DEVICE);
        cmd.execute(&mut h.ctx());
        assert_eq!(cmd.state(), CommandState::Finished(Outcome::Error));
        assert_eq!(h.regs.error, 0x04);
        assert_eq!((h.regs.cylinder_low, h.regs.cylinder_high), (0x14, 0xEB));
        assert!(!h.device.is_transfer_active());

        let mut cmd = build(ATA_CMD_IDENTIFY_PACKET_DEVICE);
        cmd.execute(&mut h.ctx());
        assert!(h.regs.status.contains(Status::DRQ));
        let mut word = [0u8; 2];
        cmd.read_data(&mut h.ctx(), &mut word);
        assert_eq!(u16::from_le_bytes(word), 0x8580);
    }
}
