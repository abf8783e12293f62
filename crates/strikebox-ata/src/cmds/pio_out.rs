use tracing::{trace, warn};

use crate::cmds::{AtaCommand, CommandContext, CommandCore, CommandState, Protocol};
use crate::defs::ATA_SECTOR_SIZE;
use crate::device::SectorRange;
use crate::error::AtaError;

/// Device work of a PIO data-out command.
pub trait PioDataOutCommand {
    /// Validates the request and returns the number of data blocks to accept.
    fn prepare(&mut self, ctx: &mut CommandContext<'_>) -> Result<u32, AtaError>;

    /// Consumes block `index`, which is complete in the device's PIO buffer.
    fn store_block(&mut self, ctx: &mut CommandContext<'_>, index: u32) -> Result<(), AtaError>;
}

/// PIO data-out protocol. The first block is requested without an interrupt; each following
/// block, and completion, is signalled with one.
pub struct PioDataOutProtocol<C> {
    core: CommandCore,
    command: C,
    blocks: u32,
    next_block: u32,
}

impl<C: PioDataOutCommand> PioDataOutProtocol<C> {
    pub fn new(opcode: u8, command: C) -> Self {
        Self {
            core: CommandCore::new(opcode),
            command,
            blocks: 0,
            next_block: 0,
        }
    }
}

impl<C: PioDataOutCommand> AtaCommand for PioDataOutProtocol<C> {
    fn opcode(&self) -> u8 {
        self.core.opcode()
    }

    fn protocol(&self) -> Protocol {
        Protocol::PioDataOut
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
                ctx.device.expect_buffer(ATA_SECTOR_SIZE);
                self.core.request_data(ctx, false);
            }
            Err(err) => self.core.complete(ctx, Err(err), true),
        }
    }

    fn read_data(&mut self, _ctx: &mut CommandContext<'_>, _buf: &mut [u8]) -> usize {
        warn!(opcode = self.core.opcode(), "data read during data-out command");
        0
    }

    fn write_data(&mut self, ctx: &mut CommandContext<'_>, buf: &[u8]) -> usize {
        if !self.core.is_executing() {
            warn!(opcode = self.core.opcode(), "data write outside a data-out phase");
            return 0;
        }
        let n = ctx.device.write_buffer(buf);
        if ctx.device.remaining_buffer_length() > 0 {
            return n;
        }

        self.core.busy(ctx);
        if let Err(err) = self.command.store_block(ctx, self.next_block) {
            ctx.device.end_pio_transfer();
            self.core.complete(ctx, Err(err), true);
            return n;
        }
        trace!(block = self.next_block, of = self.blocks, "PIO data-out block stored");
        self.next_block += 1;
        if self.next_block < self.blocks {
            ctx.device.expect_buffer(ATA_SECTOR_SIZE);
            self.core.request_data(ctx, true);
        } else {
            ctx.device.end_pio_transfer();
            self.core.complete(ctx, Ok(()), true);
        }
        n
    }

    fn abort(&mut self, ctx: &mut CommandContext<'_>) {
        if self.core.is_executing() {
            ctx.device.end_pio_transfer();
            self.core
                .complete(ctx, Err(AtaError::Aborted("command aborted by host")), true);
        }
    }
}

/// WRITE SECTORS (0x30/0x31).
#[derive(Debug, Default)]
pub struct WriteSectors {
    range: Option<SectorRange>,
}

impl PioDataOutCommand for WriteSectors {
    fn prepare(&mut self, ctx: &mut CommandContext<'_>) -> Result<u32, AtaError> {
        let range = ctx.device.sector_range(ctx.regs)?;
        self.range = Some(range);
        Ok(range.len())
    }

    fn store_block(&mut self, ctx: &mut CommandContext<'_>, index: u32) -> Result<(), AtaError> {
        let range = self
            .range
            .ok_or(AtaError::Aborted("WRITE SECTORS block before prepare"))?;
        let lba = range.start + index;
        let result = ctx.device.write_buffer_to_sector(lba);
        if result.is_err() {
            ctx.regs.set_lba28(lba);
        }
        result
    }
}

/// SECURITY UNLOCK (0xF2): one 512-byte password block.
pub struct SecurityUnlock;

impl PioDataOutCommand for SecurityUnlock {
    fn prepare(&mut self, ctx: &mut CommandContext<'_>) -> Result<u32, AtaError> {
        if !ctx.device.is_attached() || ctx.device.is_packet_device() {
            return Err(AtaError::Aborted("security feature set not supported"));
        }
        Ok(1)
    }

    fn store_block(&mut self, ctx: &mut CommandContext<'_>, _index: u32) -> Result<(), AtaError> {
        ctx.device.security_unlock()
    }
}
