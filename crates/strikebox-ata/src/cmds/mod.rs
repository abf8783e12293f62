//! ATA command objects.
//!
//! Each command issued through the command register becomes one single-use object implementing
//! [`AtaCommand`]. The protocol wrappers ([`NonDataProtocol`], [`PioDataInProtocol`],
//! [`PioDataOutProtocol`], [`DmaProtocol`]) own the status/error/interrupt choreography of their
//! protocol class; concrete commands only supply the device work.

mod dma;
mod non_data;
mod packet;
mod pio_in;
mod pio_out;

pub use dma::{DmaCommand, DmaProtocol, ReadDma, WriteDma};
pub use non_data::{
    CheckPowerMode, DeviceReset, ExecuteDeviceDiagnostic, FlushCache, IdleImmediate,
    InitializeDeviceParameters, NonDataCommand, NonDataProtocol, ReadVerifySectors, Seek,
    SetFeatures, StandbyImmediate, Unsupported,
};
pub use packet::PacketCommand;
pub use pio_in::{
    IdentifyDevice, IdentifyPacketDevice, PioDataInCommand, PioDataInProtocol, ReadSectors,
};
pub use pio_out::{PioDataOutCommand, PioDataOutProtocol, SecurityUnlock, WriteSectors};

use tracing::debug;

use crate::defs::*;
use crate::device::AtaDevice;
use crate::error::AtaError;
use crate::irq::AtaInterrupt;
use crate::regs::{AtaRegisters, Status};

/// Everything a command may touch while it runs: the channel registers, the target device and
/// the channel interrupt latch.
pub struct CommandContext<'a> {
    pub regs: &'a mut AtaRegisters,
    pub device: &'a mut AtaDevice,
    pub interrupt: &'a mut AtaInterrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Error,
}

/// Command lifecycle: `Pending -> Executing -> Completed -> Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Pending,
    Executing,
    Completed(Outcome),
    Finished(Outcome),
}

/// Protocol class of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    NonData,
    PioDataIn,
    PioDataOut,
    Dma,
    Packet,
}

pub trait AtaCommand {
    fn opcode(&self) -> u8;

    fn protocol(&self) -> Protocol;

    fn state(&self) -> CommandState;

    /// Starts the command. Called exactly once.
    fn execute(&mut self, ctx: &mut CommandContext<'_>);

    /// Host reads from the data port. Returns the number of bytes produced.
    fn read_data(&mut self, ctx: &mut CommandContext<'_>, buf: &mut [u8]) -> usize;

    /// Host writes to the data port. Returns the number of bytes consumed.
    fn write_data(&mut self, ctx: &mut CommandContext<'_>, buf: &[u8]) -> usize;

    /// Ends the command early with ABRT, releasing any transfer it holds.
    fn abort(&mut self, ctx: &mut CommandContext<'_>);

    fn is_finished(&self) -> bool {
        matches!(self.state(), CommandState::Finished(_))
    }
}

/// Register and lifecycle bookkeeping shared by every protocol.
#[derive(Debug, Clone)]
pub(crate) struct CommandCore {
    opcode: u8,
    state: CommandState,
}

impl CommandCore {
    pub(crate) fn new(opcode: u8) -> Self {
        Self {
            opcode,
            state: CommandState::Pending,
        }
    }

    pub(crate) fn opcode(&self) -> u8 {
        self.opcode
    }

    pub(crate) fn state(&self) -> CommandState {
        self.state
    }

    pub(crate) fn is_executing(&self) -> bool {
        self.state == CommandState::Executing
    }

    /// Enters `Executing`: BSY set, DRQ/ERR clear, error register zeroed.
    pub(crate) fn begin(&mut self, ctx: &mut CommandContext<'_>) {
        debug_assert_eq!(self.state, CommandState::Pending);
        self.state = CommandState::Executing;
        ctx.regs.status.insert(Status::BSY);
        ctx.regs.status.remove(Status::DRQ | Status::ERR | Status::DF);
        ctx.regs.error = 0;
    }

    /// Opens a data block for the host: BSY clear, DRQ set, optional interrupt.
    pub(crate) fn request_data(&mut self, ctx: &mut CommandContext<'_>, interrupt: bool) {
        ctx.regs.status.remove(Status::BSY);
        ctx.regs.status.insert(Status::DRQ);
        if interrupt {
            ctx.interrupt.assert();
        }
    }

    /// Marks the device busy between data blocks.
    pub(crate) fn busy(&mut self, ctx: &mut CommandContext<'_>) {
        ctx.regs.status.insert(Status::BSY);
        ctx.regs.status.remove(Status::DRQ);
    }

    /// Records the outcome, updates status/error and finishes. Raises the interrupt when
    /// `interrupt` is set.
    pub(crate) fn complete(
        &mut self,
        ctx: &mut CommandContext<'_>,
        result: Result<(), AtaError>,
        interrupt: bool,
    ) {
        let outcome = match result {
            Ok(()) => Outcome::Success,
            Err(err) => {
                debug!(
                    opcode = self.opcode,
                    command = command_name(self.opcode),
                    %err,
                    "command failed"
                );
                ctx.regs.status.insert(Status::ERR);
                ctx.regs.error = err.error_bits();
                Outcome::Error
            }
        };
        self.state = CommandState::Completed(outcome);
        ctx.regs.status.remove(Status::BSY | Status::DRQ);
        ctx.regs.status.insert(Status::DRDY);
        if interrupt {
            ctx.interrupt.assert();
        }
        self.finish(outcome);
    }

    fn finish(&mut self, outcome: Outcome) {
        self.state = CommandState::Finished(outcome);
    }
}

/// Builds the command object for `opcode`. Unknown opcodes yield a command that aborts.
pub fn build(opcode: u8) -> Box<dyn AtaCommand> {
    match opcode {
        ATA_CMD_SET_FEATURES => Box::new(NonDataProtocol::new(opcode, SetFeatures)),
        ATA_CMD_INITIALIZE_DEVICE_PARAMETERS => {
            Box::new(NonDataProtocol::new(opcode, InitializeDeviceParameters))
        }
        ATA_CMD_EXECUTE_DEVICE_DIAGNOSTIC => {
            Box::new(NonDataProtocol::new(opcode, ExecuteDeviceDiagnostic))
        }
        ATA_CMD_DEVICE_RESET => Box::new(NonDataProtocol::new(opcode, DeviceReset)),
        ATA_CMD_IDLE_IMMEDIATE => Box::new(NonDataProtocol::new(opcode, IdleImmediate)),
        ATA_CMD_STANDBY_IMMEDIATE => Box::new(NonDataProtocol::new(opcode, StandbyImmediate)),
        ATA_CMD_CHECK_POWER_MODE => Box::new(NonDataProtocol::new(opcode, CheckPowerMode)),
        ATA_CMD_FLUSH_CACHE => Box::new(NonDataProtocol::new(opcode, FlushCache)),
        ATA_CMD_READ_VERIFY_SECTORS | ATA_CMD_READ_VERIFY_SECTORS_NO_RETRY => {
            Box::new(NonDataProtocol::new(opcode, ReadVerifySectors))
        }
        ATA_CMD_SEEK => Box::new(NonDataProtocol::new(opcode, Seek)),
        ATA_CMD_IDENTIFY_DEVICE => Box::new(PioDataInProtocol::new(opcode, IdentifyDevice)),
        ATA_CMD_IDENTIFY_PACKET_DEVICE => {
            Box::new(PioDataInProtocol::new(opcode, IdentifyPacketDevice))
        }
        ATA_CMD_READ_SECTORS | ATA_CMD_READ_SECTORS_NO_RETRY => {
            Box::new(PioDataInProtocol::new(opcode, ReadSectors::default()))
        }
        ATA_CMD_WRITE_SECTORS | ATA_CMD_WRITE_SECTORS_NO_RETRY => {
            Box::new(PioDataOutProtocol::new(opcode, WriteSectors::default()))
        }
        ATA_CMD_SECURITY_UNLOCK => Box::new(PioDataOutProtocol::new(opcode, SecurityUnlock)),
        ATA_CMD_READ_DMA | ATA_CMD_READ_DMA_NO_RETRY => {
            Box::new(DmaProtocol::new(opcode, ReadDma))
        }
        ATA_CMD_WRITE_DMA | ATA_CMD_WRITE_DMA_NO_RETRY => {
            Box::new(DmaProtocol::new(opcode, WriteDma))
        }
        ATA_CMD_PACKET => Box::new(PacketCommand::new()),
        _ => Box::new(NonDataProtocol::new(opcode, Unsupported)),
    }
}
