use tracing::{debug, trace, warn};

use crate::atapi::{
    self, PacketResult, Sense, SENSE_MEDIUM_ERROR, SENSE_NOT_READY, ASC_MEDIUM_NOT_PRESENT,
    ASC_UNRECOVERED_READ_ERROR,
};
use crate::cmds::{AtaCommand, CommandContext, CommandCore, CommandState, Protocol};
use crate::defs::{ATA_CMD_PACKET, ATA_SECTOR_SIZE, DVD_SECTOR_SIZE};
use crate::error::{AtaError, DriverError};

/// Features register bit requesting DMA for the data phase.
const PACKET_FEATURE_DMA: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Packet,
    DataIn,
    Status,
}

#[derive(Debug)]
enum DataSource {
    Buffer { data: Vec<u8>, offset: usize },
    Medium { byte_address: u64, remaining: u64 },
}

impl DataSource {
    fn remaining(&self) -> u64 {
        match self {
            DataSource::Buffer { data, offset } => (data.len() - offset) as u64,
            DataSource::Medium { remaining, .. } => *remaining,
        }
    }
}

/// PACKET (0xA0), PIO data transfer only.
///
/// The host first writes the command packet through the data port (interrupt reason C/D=1,
/// I/O=0). Response data is then returned in chunks bounded by the byte count limit and the
/// 512-byte buffer (I/O=1, C/D=0), each announced with an interrupt. The command ends in the
/// status phase (I/O=1, C/D=1) with a final interrupt.
pub struct PacketCommand {
    core: CommandCore,
    phase: Phase,
    source: Option<DataSource>,
}

impl Default for PacketCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketCommand {
    pub fn new() -> Self {
        Self {
            core: CommandCore::new(ATA_CMD_PACKET),
            phase: Phase::Idle,
            source: None,
        }
    }

    fn start(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), AtaError> {
        if !ctx.device.is_packet_device() {
            return Err(AtaError::Aborted("PACKET requires a packet device"));
        }
        if ctx.regs.features & PACKET_FEATURE_DMA != 0 {
            return Err(AtaError::Aborted("DMA data phase is not supported for PACKET"));
        }
        ctx.device.begin_pio_transfer()
    }

    fn dispatch(&mut self, ctx: &mut CommandContext<'_>) {
        let packet = ctx.device.buffer_contents().to_vec();
        match atapi::handle_packet(ctx.device, &packet) {
            PacketResult::NoData => self.finish(ctx, Ok(())),
            PacketResult::DataIn(data) => {
                self.source = Some(DataSource::Buffer { data, offset: 0 });
                self.send_next_chunk(ctx);
            }
            PacketResult::ReadBlocks { lba, blocks } => {
                self.source = Some(DataSource::Medium {
                    byte_address: u64::from(lba) * DVD_SECTOR_SIZE as u64,
                    remaining: u64::from(blocks) * DVD_SECTOR_SIZE as u64,
                });
                self.send_next_chunk(ctx);
            }
            PacketResult::CheckCondition(sense) => self.finish(ctx, Err(check_condition(sense))),
        }
    }

    fn send_next_chunk(&mut self, ctx: &mut CommandContext<'_>) {
        let Some(source) = self.source.as_mut() else {
            self.finish(ctx, Ok(()));
            return;
        };
        let remaining = source.remaining();
        if remaining == 0 {
            self.finish(ctx, Ok(()));
            return;
        }

        // Odd limits round down to a whole word, but never below one word.
        let limit = match ctx.regs.byte_count() {
            0 => ATA_SECTOR_SIZE,
            count => usize::from(count & !1).clamp(2, ATA_SECTOR_SIZE),
        };
        let chunk = (remaining.min(limit as u64)) as usize;

        match source {
            DataSource::Buffer { data, offset } => {
                ctx.device.load_buffer(&data[*offset..*offset + chunk]);
                *offset += chunk;
            }
            DataSource::Medium {
                byte_address,
                remaining,
            } => {
                let mut block = [0u8; ATA_SECTOR_SIZE];
                if let Err(err) = ctx.device.driver_mut().read(*byte_address, &mut block[..chunk]) {
                    debug!(%err, byte_address = *byte_address, "ATAPI read failed");
                    let sense = match err {
                        DriverError::NoMedium => {
                            Sense::new(SENSE_NOT_READY, ASC_MEDIUM_NOT_PRESENT, 0)
                        }
                        _ => Sense::new(SENSE_MEDIUM_ERROR, ASC_UNRECOVERED_READ_ERROR, 0),
                    };
                    ctx.device.set_sense(sense);
                    self.finish(ctx, Err(check_condition(sense)));
                    return;
                }
                ctx.device.load_buffer(&block[..chunk]);
                *byte_address += chunk as u64;
                *remaining -= chunk as u64;
            }
        }

        trace!(chunk, remaining = remaining - chunk as u64, "ATAPI data chunk ready");
        ctx.regs.set_byte_count(chunk as u16);
        ctx.regs.set_interrupt_reason(true, false);
        self.phase = Phase::DataIn;
        self.core.request_data(ctx, true);
    }

    fn finish(&mut self, ctx: &mut CommandContext<'_>, result: Result<(), AtaError>) {
        ctx.device.end_pio_transfer();
        ctx.regs.set_interrupt_reason(true, true);
        self.phase = Phase::Status;
        self.source = None;
        self.core.complete(ctx, result, true);
    }
}

fn check_condition(sense: Sense) -> AtaError {
    AtaError::CheckCondition {
        sense_key: sense.key,
        asc: sense.asc,
        ascq: sense.ascq,
    }
}

impl AtaCommand for PacketCommand {
    fn opcode(&self) -> u8 {
        self.core.opcode()
    }

    fn protocol(&self) -> Protocol {
        Protocol::Packet
    }

    fn state(&self) -> CommandState {
        self.core.state()
    }

    fn execute(&mut self, ctx: &mut CommandContext<'_>) {
        self.core.begin(ctx);
        if let Err(err) = self.start(ctx) {
            self.core.complete(ctx, Err(err), true);
            return;
        }
        let packet_len = ctx.device.driver().packet_command_size();
        ctx.device.expect_buffer(packet_len);
        ctx.regs.set_interrupt_reason(false, true);
        self.phase = Phase::Packet;
        self.core.request_data(ctx, false);
    }

    fn read_data(&mut self, ctx: &mut CommandContext<'_>, buf: &mut [u8]) -> usize {
        if self.phase != Phase::DataIn || !self.core.is_executing() {
            warn!(phase = ?self.phase, "data read outside the PACKET data phase");
            return 0;
        }
        let n = ctx.device.read_buffer(buf);
        if ctx.device.remaining_buffer_length() == 0 {
            self.core.busy(ctx);
            self.send_next_chunk(ctx);
        }
        n
    }

    fn write_data(&mut self, ctx: &mut CommandContext<'_>, buf: &[u8]) -> usize {
        if self.phase != Phase::Packet || !self.core.is_executing() {
            warn!(phase = ?self.phase, "data write outside the PACKET command phase");
            return 0;
        }
        let n = ctx.device.write_buffer(buf);
        if ctx.device.remaining_buffer_length() == 0 {
            self.core.busy(ctx);
            self.dispatch(ctx);
        }
        n
    }

    fn abort(&mut self, ctx: &mut CommandContext<'_>) {
        if self.core.is_executing() {
            self.finish(ctx, Err(AtaError::Aborted("command aborted by host")));
        }
    }
}
