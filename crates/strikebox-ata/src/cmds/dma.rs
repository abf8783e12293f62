use tracing::warn;

use crate::cmds::{AtaCommand, CommandContext, CommandCore, CommandState, Protocol};
use crate::defs::ATA_SECTOR_SIZE;
use crate::device::DmaDirection;
use crate::error::AtaError;

/// Device work of a DMA command: arming the transfer window.
pub trait DmaCommand {
    const DIRECTION: DmaDirection;

    fn begin(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), AtaError>;
}

/// DMA protocol. Execution arms the device's DMA window and raises DRQ; the bus master then
/// moves one sector per data call. Exhausting the window completes the command with a single
/// interrupt.
pub struct DmaProtocol<C> {
    core: CommandCore,
    command: C,
}

impl<C: DmaCommand> DmaProtocol<C> {
    pub fn new(opcode: u8, command: C) -> Self {
        Self {
            core: CommandCore::new(opcode),
            command,
        }
    }

    fn after_sector(&mut self, ctx: &mut CommandContext<'_>, result: Result<(), AtaError>) -> bool {
        match result {
            Ok(()) => {
                if ctx.device.is_dma_finished() {
                    ctx.device.end_dma();
                    self.core.complete(ctx, Ok(()), true);
                }
                true
            }
            Err(err) => {
                ctx.device.end_dma();
                self.core.complete(ctx, Err(err), true);
                false
            }
        }
    }
}

impl<C: DmaCommand> AtaCommand for DmaProtocol<C> {
    fn opcode(&self) -> u8 {
        self.core.opcode()
    }

    fn protocol(&self) -> Protocol {
        Protocol::Dma
    }

    fn state(&self) -> CommandState {
        self.core.state()
    }

    fn execute(&mut self, ctx: &mut CommandContext<'_>) {
        self.core.begin(ctx);
        match self.command.begin(ctx) {
            Ok(()) => self.core.request_data(ctx, false),
            Err(err) => self.core.complete(ctx, Err(err), true),
        }
    }

    /// Transfers one sector to the bus master. `buf` must hold exactly one sector.
    fn read_data(&mut self, ctx: &mut CommandContext<'_>, buf: &mut [u8]) -> usize {
        if !self.core.is_executing() || C::DIRECTION != DmaDirection::Read {
            warn!(opcode = self.core.opcode(), "unexpected DMA read");
            return 0;
        }
        let Ok(sector) = <&mut [u8; ATA_SECTOR_SIZE]>::try_from(buf) else {
            warn!("DMA read with a partial sector buffer");
            return 0;
        };
        let result = ctx.device.read_dma(sector);
        if self.after_sector(ctx, result) {
            ATA_SECTOR_SIZE
        } else {
            0
        }
    }

    /// Transfers one sector from the bus master. `buf` must hold exactly one sector.
    fn write_data(&mut self, ctx: &mut CommandContext<'_>, buf: &[u8]) -> usize {
        if !self.core.is_executing() || C::DIRECTION != DmaDirection::Write {
            warn!(opcode = self.core.opcode(), "unexpected DMA write");
            return 0;
        }
        let Ok(sector) = <&[u8; ATA_SECTOR_SIZE]>::try_from(buf) else {
            warn!("DMA write with a partial sector buffer");
            return 0;
        };
        let result = ctx.device.write_dma(sector);
        if self.after_sector(ctx, result) {
            ATA_SECTOR_SIZE
        } else {
            0
        }
    }

    fn abort(&mut self, ctx: &mut CommandContext<'_>) {
        if self.core.is_executing() {
            ctx.device.end_dma();
            self.core
                .complete(ctx, Err(AtaError::Aborted("DMA transfer aborted")), true);
        }
    }
}

/// READ DMA (0xC8/0xC9).
pub struct ReadDma;

impl DmaCommand for ReadDma {
    const DIRECTION: DmaDirection = DmaDirection::Read;

    fn begin(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), AtaError> {
        ctx.device.begin_read_dma(ctx.regs)
    }
}

/// WRITE DMA (0xCA/0xCB).
pub struct WriteDma;

impl DmaCommand for WriteDma {
    const DIRECTION: DmaDirection = DmaDirection::Write;

    fn begin(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), AtaError> {
        ctx.device.begin_write_dma(ctx.regs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmds::test_support::Harness;
    use crate::cmds::{build, Outcome};
    use crate::defs::*;
    use crate::device::AtaDevice;
    use crate::drivers::{DvdDrive, HardDiskDriver};
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
    fn read_dma_completes_after_last_sector() {
        let mut h = hdd(200);
        h.regs.set_lba28(100);
        h.regs.sector_count = 3;
        let mut cmd = build(ATA_CMD_READ_DMA);
        cmd.execute(&mut h.ctx());
        assert!(h.regs.status.contains(Status::DRQ));
        assert_eq!(h.line.assert_count(), 0);

        let mut sector = [0u8; ATA_SECTOR_SIZE];
        for expected in 100u8..103 {
            assert_eq!(cmd.read_data(&mut h.ctx(), &mut sector), ATA_SECTOR_SIZE);
            assert!(sector.iter().all(|&b| b == expected));
        }
        assert_eq!(cmd.state(), CommandState::Finished(Outcome::Success));
        assert!(!h.regs.status.intersects(Status::BSY | Status::DRQ));
        assert_eq!(h.line.assert_count(), 1);
        assert!(h.device.dma_window().is_none());
    }

    #[test]
    fn write_dma_stores_sectors() {
        let mut h = hdd(8);
        h.regs.set_lba28(6);
        h.regs.sector_count = 2;
        let mut cmd = build(ATA_CMD_WRITE_DMA);
        cmd.execute(&mut h.ctx());
        assert_eq!(cmd.write_data(&mut h.ctx(), &[0xA5u8; ATA_SECTOR_SIZE]), ATA_SECTOR_SIZE);
        assert_eq!(cmd.write_data(&mut h.ctx(), &[0x5Au8; ATA_SECTOR_SIZE]), ATA_SECTOR_SIZE);
        assert_eq!(cmd.state(), CommandState::Finished(Outcome::Success));

        let mut back = [0u8; ATA_SECTOR_SIZE];
        h.device.driver_mut().read(7 * 512, &mut back).unwrap();
        assert!(back.iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn wrong_direction_is_ignored() {
        let mut h = hdd(8);
        h.regs.set_lba28(0);
        h.regs.sector_count = 1;
        let mut cmd = build(ATA_CMD_READ_DMA);
        cmd.execute(&mut h.ctx());
        assert_eq!(cmd.write_data(&mut h.ctx(), &[0u8; ATA_SECTOR_SIZE]), 0);
        assert_eq!(cmd.state(), CommandState::Executing);
        assert_eq!(cmd.read_data(&mut h.ctx(), &mut [0u8; 100]), 0);
    }

    #[test]
    fn abort_releases_window() {
        let mut h = hdd(8);
        h.regs.set_lba28(0);
        h.regs.sector_count = 4;
        let mut cmd = build(ATA_CMD_READ_DMA);
        cmd.execute(&mut h.ctx());
        cmd.read_data(&mut h.ctx(), &mut [0u8; ATA_SECTOR_SIZE]);
        cmd.abort(&mut h.ctx());
        assert_eq!(cmd.state(), CommandState::Finished(Outcome::Error));
        assert!(h.device.dma_window().is_none());
        assert_eq!(h.regs.error, 0x04);
    }

    #[test]
    fn dma_on_dvd_without_medium_fails_immediately() {
        let mut h = Harness::new(AtaDevice::with_driver(
            ChannelId::Primary,
            DeviceIndex::Slave,
            Box::new(DvdDrive::empty()),
        ));
        h.regs.set_lba28(0);
        h.regs.sector_count = 1;
        let mut cmd = build(ATA_CMD_READ_DMA);
        cmd.execute(&mut h.ctx());
        assert_eq!(cmd.state(), CommandState::Finished(Outcome::Error));
        assert!(h.regs.status.contains(Status::ERR));
        assert_eq!(h.line.assert_count(), 1);
    }

    #[test]
    fn out_of_range_window_is_id_not_found() {
        let mut h = hdd(8);
        h.regs.set_lba28(7);
        h.regs.sector_count = 2;
        let mut cmd = build(ATA_CMD_READ_DMA);
        cmd.execute(&mut h.ctx());
        assert_eq!(h.regs.error, 0x10);
    }
}
