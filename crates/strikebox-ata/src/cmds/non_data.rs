use tracing::warn;

use crate::cmds::{AtaCommand, CommandContext, CommandCore, CommandState, Protocol};
use crate::error::AtaError;

/// Device work of a command that transfers no data.
pub trait NonDataCommand {
    fn run(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), AtaError>;
}

/// Non-data protocol: execute, then report the outcome with a single interrupt.
pub struct NonDataProtocol<C> {
    core: CommandCore,
    command: C,
}

impl<C: NonDataCommand> NonDataProtocol<C> {
    pub fn new(opcode: u8, command: C) -> Self {
        Self {
            core: CommandCore::new(opcode),
            command,
        }
    }
}

impl<C: NonDataCommand> AtaCommand for NonDataProtocol<C> {
    fn opcode(&self) -> u8 {
        self.core.opcode()
    }

    fn protocol(&self) -> Protocol {
        Protocol::NonData
    }

    fn state(&self) -> CommandState {
        self.core.state()
    }

    fn execute(&mut self, ctx: &mut CommandContext<'_>) {
        self.core.begin(ctx);
        let result = self.command.run(ctx);
        self.core.complete(ctx, result, true);
    }

    fn read_data(&mut self, _ctx: &mut CommandContext<'_>, _buf: &mut [u8]) -> usize {
        warn!(opcode = self.core.opcode(), "data read during non-data command");
        0
    }

    fn write_data(&mut self, _ctx: &mut CommandContext<'_>, _buf: &[u8]) -> usize {
        warn!(opcode = self.core.opcode(), "data write during non-data command");
        0
    }

    fn abort(&mut self, ctx: &mut CommandContext<'_>) {
        if self.core.is_executing() {
            self.core
                .complete(ctx, Err(AtaError::Aborted("command aborted by host")), true);
        }
    }
}

fn require_attached(ctx: &CommandContext<'_>) -> Result<(), AtaError> {
    if ctx.device.is_attached() {
        Ok(())
    } else {
        Err(AtaError::Aborted("no device attached"))
    }
}

/// SET FEATURES (0xEF).
pub struct SetFeatures;

impl NonDataCommand for SetFeatures {
    fn run(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), AtaError> {
        ctx.device.set_features(ctx.regs)
    }
}

/// INITIALIZE DEVICE PARAMETERS (0x91).
pub struct InitializeDeviceParameters;

impl NonDataCommand for InitializeDeviceParameters {
    fn run(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), AtaError> {
        ctx.device.initialize_device_parameters(ctx.regs)
    }
}

/// EXECUTE DEVICE DIAGNOSTIC (0x90). Reports "device passed" with the device signature.
pub struct ExecuteDeviceDiagnostic;

impl NonDataCommand for ExecuteDeviceDiagnostic {
    fn run(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), AtaError> {
        ctx.device.reset();
        ctx.regs.write_signature(ctx.device.is_packet_device());
        ctx.regs.error = 0x01;
        Ok(())
    }
}

/// DEVICE RESET (0x08). Packet devices only.
pub struct DeviceReset;

impl NonDataCommand for DeviceReset {
    fn run(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), AtaError> {
        if !ctx.device.is_packet_device() {
            return Err(AtaError::Aborted("DEVICE RESET requires the PACKET feature set"));
        }
        ctx.device.reset();
        ctx.regs.write_signature(true);
        ctx.regs.error = 0x01;
        Ok(())
    }
}

/// IDLE IMMEDIATE (0xE1).
pub struct IdleImmediate;

impl NonDataCommand for IdleImmediate {
    fn run(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), AtaError> {
        require_attached(ctx)
    }
}

/// STANDBY IMMEDIATE (0xE0).
pub struct StandbyImmediate;

impl NonDataCommand for StandbyImmediate {
    fn run(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), AtaError> {
        require_attached(ctx)?;
        ctx.device.flush_cache()
    }
}

/// CHECK POWER MODE (0xE5). The device is always active.
pub struct CheckPowerMode;

impl NonDataCommand for CheckPowerMode {
    fn run(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), AtaError> {
        require_attached(ctx)?;
        ctx.regs.sector_count = 0xFF;
        Ok(())
    }
}

/// FLUSH CACHE (0xE7).
pub struct FlushCache;

impl NonDataCommand for FlushCache {
    fn run(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), AtaError> {
        ctx.device.flush_cache()
    }
}

/// READ VERIFY SECTORS (0x40/0x41).
pub struct ReadVerifySectors;

impl NonDataCommand for ReadVerifySectors {
    fn run(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), AtaError> {
        ctx.device.verify_sectors(ctx.regs)
    }
}

/// SEEK (0x70).
pub struct Seek;

impl NonDataCommand for Seek {
    fn run(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), AtaError> {
        ctx.device.seek(ctx.regs)?;
        ctx.regs.status.insert(crate::regs::Status::DSC);
        Ok(())
    }
}

/// Any opcode without an implementation.
pub struct Unsupported;

impl NonDataCommand for Unsupported {
    fn run(&mut self, _ctx: &mut CommandContext<'_>) -> Result<(), AtaError> {
        Err(AtaError::Aborted("unsupported command"))
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

    fn hdd() -> Harness {
        let driver =
            HardDiskDriver::new(Box::new(MemBackend::with_len(16 * 63 * 20 * ATA_SECTOR_SIZE)))
                .unwrap();
        Harness::new(AtaDevice::with_driver(
            ChannelId::Primary,
            DeviceIndex::Master,
            Box::new(driver),
        ))
    }

    fn dvd() -> Harness {
        Harness::new(AtaDevice::with_driver(
            ChannelId::Primary,
            DeviceIndex::Slave,
            Box::new(DvdDrive::empty()),
        ))
    }

    #[test]
    fn success_clears_busy_and_interrupts_once() {
        let mut h = hdd();
        h.regs.features = SETFEATURES_SET_TRANSFER_MODE;
        h.regs.sector_count = 0x42;
        let mut cmd = build(ATA_CMD_SET_FEATURES);
        cmd.execute(&mut h.ctx());

        assert_eq!(cmd.state(), CommandState::Finished(Outcome::Success));
        assert!(!h.regs.status.contains(Status::BSY));
        assert!(!h.regs.status.contains(Status::ERR));
        assert_eq!(h.regs.error, 0);
        assert_eq!(h.line.assert_count(), 1);
    }

    #[test]
    fn failure_sets_err_and_abrt() {
        let mut h = hdd();
        h.regs.features = SETFEATURES_SET_TRANSFER_MODE;
        h.regs.sector_count = 0x12;
        let mut cmd = build(ATA_CMD_SET_FEATURES);
        cmd.execute(&mut h.ctx());

        assert_eq!(cmd.state(), CommandState::Finished(Outcome::Error));
        assert!(h.regs.status.contains(Status::ERR));
        assert!(!h.regs.status.contains(Status::BSY));
        assert_eq!(h.regs.error, 0x04);
        assert_eq!(h.line.assert_count(), 1);
    }

    #[test]
    fn data_port_access_changes_nothing() {
        let mut h = hdd();
        let mut cmd = build(ATA_CMD_IDLE_IMMEDIATE);
        cmd.execute(&mut h.ctx());
        let before = h.regs.clone();

        let mut buf = [0u8; 2];
        assert_eq!(cmd.read_data(&mut h.ctx(), &mut buf), 0);
        assert_eq!(cmd.write_data(&mut h.ctx(), &buf), 0);
        assert_eq!(h.regs, before);
        assert_eq!(h.line.assert_count(), 1);
    }

    #[test]
    fn initialize_device_parameters_sets_translation() {
        let mut h = hdd();
        h.regs.device_head = 0xA0 | 0x0F;
        h.regs.sector_count = 63;
        let mut cmd = build(ATA_CMD_INITIALIZE_DEVICE_PARAMETERS);
        cmd.execute(&mut h.ctx());
        assert_eq!(cmd.state(), CommandState::Finished(Outcome::Success));

        let chs = crate::Chs {
            cylinder: 10,
            head: 5,
            sector: 20,
        };
        let driver = h.device.driver();
        assert_eq!(driver.lba_to_chs(driver.chs_to_lba(chs).unwrap()), Some(chs));
    }

    #[test]
    fn initialize_device_parameters_on_dvd_aborts() {
        let mut h = dvd();
        h.regs.sector_count = 63;
        let mut cmd = build(ATA_CMD_INITIALIZE_DEVICE_PARAMETERS);
        cmd.execute(&mut h.ctx());
        assert_eq!(cmd.state(), CommandState::Finished(Outcome::Error));
        assert_eq!(h.regs.error, 0x04);
    }

    #[test]
    fn diagnostic_reports_packet_signature() {
        let mut h = dvd();
        let mut cmd = build(ATA_CMD_EXECUTE_DEVICE_DIAGNOSTIC);
        cmd.execute(&mut h.ctx());
        assert_eq!(h.regs.error, 0x01);
        assert!(!h.regs.status.contains(Status::ERR));
        assert_eq!((h.regs.cylinder_low, h.regs.cylinder_high), (0x14, 0xEB));
    }

    #[test]
    fn device_reset_is_packet_only() {
        let mut h = hdd();
        let mut cmd = build(ATA_CMD_DEVICE_RESET);
        cmd.execute(&mut h.ctx());
        assert_eq!(cmd.state(), CommandState::Finished(Outcome::Error));

        let mut h = dvd();
        let mut cmd = build(ATA_CMD_DEVICE_RESET);
        cmd.execute(&mut h.ctx());
        assert_eq!(cmd.state(), CommandState::Finished(Outcome::Success));
    }

    #[test]
    fn check_power_mode_reports_active() {
        let mut h = hdd();
        let mut cmd = build(ATA_CMD_CHECK_POWER_MODE);
        cmd.execute(&mut h.ctx());
        assert_eq!(h.regs.sector_count, 0xFF);
    }

    #[test]
    fn verify_past_end_is_id_not_found() {
        let mut h = hdd();
        h.regs.set_lba28(16 * 63 * 20 - 1);
        h.regs.sector_count = 2;
        let mut cmd = build(ATA_CMD_READ_VERIFY_SECTORS);
        cmd.execute(&mut h.ctx());
        assert_eq!(h.regs.error, 0x10);
    }

    #[test]
    fn unsupported_opcode_aborts() {
        let mut h = hdd();
        let mut cmd = build(0xB0);
        cmd.execute(&mut h.ctx());
        assert_eq!(cmd.state(), CommandState::Finished(Outcome::Error));
        assert_eq!(h.regs.error, 0x04);
        assert_eq!(h.line.assert_count(), 1);
    }

    #[test]
    fn repeated_commands_interrupt_once_each_after_ack() {
        let mut h = hdd();
        for expected in 1..=3 {
            let mut cmd = build(ATA_CMD_IDLE_IMMEDIATE);
            cmd.execute(&mut h.ctx());
            assert_eq!(h.line.assert_count(), expected);
            h.ack();
        }
    }
}
