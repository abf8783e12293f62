//! One IDE channel: the shared register block, two device slots and the interrupt line.

use tracing::{debug, trace, warn};

use crate::cmds::{self, AtaCommand, CommandContext, Protocol};
use crate::defs::*;
use crate::device::AtaDevice;
use crate::drivers::AtaDeviceDriver;
use crate::irq::{AtaInterrupt, IrqLine};
use crate::regs::{AtaRegisters, Status};

/// Control block offset of alternate status (read) / device control (write).
pub const CTRL_ALT_STATUS_DEVICE_CONTROL: u16 = 0;
/// Control block offset of the drive address register.
pub const CTRL_DRIVE_ADDRESS: u16 = 1;

struct ActiveCommand {
    device: DeviceIndex,
    command: Box<dyn AtaCommand>,
}

/// An IDE channel with a master and a slave slot.
///
/// At most one command is in flight per channel; it stays attached to the device that was
/// selected when it was issued.
pub struct AtaChannel {
    id: ChannelId,
    regs: AtaRegisters,
    devices: [AtaDevice; 2],
    interrupt: AtaInterrupt,
    command: Option<ActiveCommand>,
}

impl std::fmt::Debug for AtaChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtaChannel")
            .field("id", &self.id)
            .field("regs", &self.regs)
            .field("devices", &self.devices)
            .field("interrupt", &self.interrupt)
            .field(
                "command",
                &self.command.as_ref().map(|active| active.command.opcode()),
            )
            .finish()
    }
}

fn floating_bus(size: u8) -> u32 {
    match size {
        1 => 0xFF,
        2 => 0xFFFF,
        _ => 0xFFFF_FFFF,
    }
}

impl AtaChannel {
    pub fn new(id: ChannelId, irq: Box<dyn IrqLine>) -> Self {
        let mut channel = Self {
            id,
            regs: AtaRegisters::default(),
            devices: [
                AtaDevice::new(id, DeviceIndex::Master),
                AtaDevice::new(id, DeviceIndex::Slave),
            ],
            interrupt: AtaInterrupt::new(irq),
            command: None,
        };
        channel.reset();
        channel
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Installs `driver` in slot `index`, returning the previous driver. Any command in flight
    /// on that slot is dropped. Replacing the master reloads the reset signature unless the
    /// slave still has a command in flight, which keeps running.
    pub fn attach(
        &mut self,
        index: DeviceIndex,
        driver: Box<dyn AtaDeviceDriver>,
    ) -> Box<dyn AtaDeviceDriver> {
        if self
            .command
            .as_ref()
            .is_some_and(|active| active.device == index)
        {
            warn!(channel = ?self.id, device = ?index, "device replaced during a command");
            self.command = None;
        }
        let previous = self.devices[index.index()].attach(driver);
        if index == DeviceIndex::Master && self.command.is_none() {
            self.reset();
        }
        previous
    }

    pub fn device(&self, index: DeviceIndex) -> &AtaDevice {
        &self.devices[index.index()]
    }

    pub fn device_mut(&mut self, index: DeviceIndex) -> &mut AtaDevice {
        &mut self.devices[index.index()]
    }

    pub fn registers(&self) -> &AtaRegisters {
        &self.regs
    }

    pub fn is_irq_pending(&self) -> bool {
        self.interrupt.is_pending()
    }

    pub fn is_command_in_progress(&self) -> bool {
        self.command.is_some()
    }

    fn selected(&self) -> &AtaDevice {
        &self.devices[self.regs.selected_device().index()]
    }

    /// Runs `f` against the in-flight command and retires it once it finishes.
    fn with_command<R>(
        &mut self,
        f: impl FnOnce(&mut dyn AtaCommand, &mut CommandContext<'_>) -> R,
    ) -> Option<R> {
        let active = self.command.as_mut()?;
        let mut ctx = CommandContext {
            regs: &mut self.regs,
            device: &mut self.devices[active.device.index()],
            interrupt: &mut self.interrupt,
        };
        let result = f(active.command.as_mut(), &mut ctx);
        if active.command.is_finished() {
            trace!(
                channel = ?self.id,
                opcode = active.command.opcode(),
                state = ?active.command.state(),
                "command retired"
            );
            self.command = None;
        }
        Some(result)
    }

    /// Builds and executes the command for `opcode` on the selected device.
    pub fn execute_command(&mut self, opcode: u8) {
        let index = self.regs.selected_device();
        if self.command.is_some() {
            warn!(channel = ?self.id, opcode, "command issued while another is in flight");
            self.with_command(|command, ctx| command.abort(ctx));
            self.command = None;
        }
        self.interrupt.clear();

        debug!(
            channel = ?self.id,
            device = ?index,
            opcode,
            command = command_name(opcode),
            "ATA command"
        );
        let mut command = cmds::build(opcode);
        let mut ctx = CommandContext {
            regs: &mut self.regs,
            device: &mut self.devices[index.index()],
            interrupt: &mut self.interrupt,
        };
        command.execute(&mut ctx);
        if !command.is_finished() {
            self.command = Some(ActiveCommand {
                device: index,
                command,
            });
        }
    }

    /// Host data-port read. Returns the number of bytes produced.
    pub fn read_data(&mut self, buf: &mut [u8]) -> usize {
        let produced = self.with_command(|command, ctx| {
            if command.protocol() == Protocol::Dma {
                0
            } else {
                command.read_data(ctx, buf)
            }
        });
        produced.unwrap_or_else(|| {
            trace!(channel = ?self.id, "data read with no command in flight");
            0
        })
    }

    /// Host data-port write. Returns the number of bytes consumed.
    pub fn write_data(&mut self, buf: &[u8]) -> usize {
        let consumed = self.with_command(|command, ctx| {
            if command.protocol() == Protocol::Dma {
                0
            } else {
                command.write_data(ctx, buf)
            }
        });
        consumed.unwrap_or_else(|| {
            trace!(channel = ?self.id, "data write with no command in flight");
            0
        })
    }

    // ---- bus master side -------------------------------------------------------------------

    pub fn is_dma_active(&self) -> bool {
        self.command
            .as_ref()
            .is_some_and(|active| active.command.protocol() == Protocol::Dma)
    }

    /// Moves the next sector of the active DMA read into `buf`.
    pub fn read_dma_sector(&mut self, buf: &mut [u8; ATA_SECTOR_SIZE]) -> bool {
        self.with_command(|command, ctx| {
            command.protocol() == Protocol::Dma
                && command.read_data(ctx, buf) == ATA_SECTOR_SIZE
        })
        .unwrap_or(false)
    }

    /// Moves `buf` into the next sector of the active DMA write.
    pub fn write_dma_sector(&mut self, buf: &[u8; ATA_SECTOR_SIZE]) -> bool {
        self.with_command(|command, ctx| {
            command.protocol() == Protocol::Dma
                && command.write_data(ctx, buf) == ATA_SECTOR_SIZE
        })
        .unwrap_or(false)
    }

    /// Whether the active DMA transfer has no sectors left. True when none is active.
    pub fn is_dma_finished(&self) -> bool {
        match &self.command {
            Some(active) if active.command.protocol() == Protocol::Dma => {
                self.devices[active.device.index()].is_dma_finished()
            }
            _ => true,
        }
    }

    /// Bus master stopped early: abort the DMA command. Idempotent.
    pub fn end_dma(&mut self) {
        if self.is_dma_active() {
            debug!(channel = ?self.id, "DMA transfer stopped by bus master");
            self.with_command(|command, ctx| command.abort(ctx));
        }
    }

    // ---- port access -----------------------------------------------------------------------

    /// Read from the command block at `reg` (offset from the command base port).
    pub fn read_command_block(&mut self, reg: u16, size: u8) -> u32 {
        if !self.selected().is_attached() {
            return floating_bus(size);
        }
        match reg {
            REG_DATA => {
                let mut bytes = [0u8; 4];
                let len = usize::from(size.clamp(1, 4));
                self.read_data(&mut bytes[..len]);
                u32::from_le_bytes(bytes)
            }
            REG_ERROR_FEATURES => u32::from(self.regs.error),
            REG_SECTOR_COUNT => u32::from(self.regs.sector_count),
            REG_SECTOR_NUMBER => u32::from(self.regs.sector_number),
            REG_CYLINDER_LOW => u32::from(self.regs.cylinder_low),
            REG_CYLINDER_HIGH => u32::from(self.regs.cylinder_high),
            REG_DEVICE_HEAD => u32::from(self.regs.device_head_readback()),
            REG_STATUS_COMMAND => {
                // Reading status acknowledges the interrupt.
                self.interrupt.clear();
                u32::from(self.regs.status.bits())
            }
            _ => floating_bus(size),
        }
    }

    /// Write to the command block at `reg`.
    pub fn write_command_block(&mut self, reg: u16, size: u8, value: u32) {
        // Device/head is always honoured since it selects the device.
        if reg != REG_DEVICE_HEAD && !self.selected().is_attached() {
            trace!(channel = ?self.id, reg, value, "write to absent device ignored");
            return;
        }
        match reg {
            REG_DATA => {
                let bytes = value.to_le_bytes();
                let len = usize::from(size.clamp(1, 4));
                self.write_data(&bytes[..len]);
            }
            REG_ERROR_FEATURES => self.regs.features = value as u8,
            REG_SECTOR_COUNT => self.regs.sector_count = value as u8,
            REG_SECTOR_NUMBER => self.regs.sector_number = value as u8,
            REG_CYLINDER_LOW => self.regs.cylinder_low = value as u8,
            REG_CYLINDER_HIGH => self.regs.cylinder_high = value as u8,
            REG_DEVICE_HEAD => self.regs.device_head = value as u8,
            REG_STATUS_COMMAND => {
                let opcode = value as u8;
                if self.regs.status.contains(Status::BSY) && opcode != ATA_CMD_DEVICE_RESET {
                    warn!(channel = ?self.id, opcode, "command written while busy ignored");
                    return;
                }
                self.execute_command(opcode);
            }
            _ => {}
        }
    }

    /// Read from the control block at `reg`.
    pub fn read_control_block(&mut self, reg: u16) -> u8 {
        if !self.selected().is_attached() {
            return 0xFF;
        }
        match reg {
            CTRL_ALT_STATUS_DEVICE_CONTROL => self.regs.status.bits(),
            CTRL_DRIVE_ADDRESS => self.drive_address(),
            _ => 0xFF,
        }
    }

    /// Write to the control block at `reg`.
    pub fn write_control_block(&mut self, reg: u16, value: u8) {
        if reg != CTRL_ALT_STATUS_DEVICE_CONTROL {
            return;
        }
        let previous = self.regs.control;
        self.regs.control = value;
        self.interrupt.set_masked(value & DEVICE_CONTROL_NIEN != 0);
        if previous & DEVICE_CONTROL_SRST == 0 && value & DEVICE_CONTROL_SRST != 0 {
            debug!(channel = ?self.id, "software reset");
            self.reset();
        }
    }

    /// Head and device select lines, active low.
    fn drive_address(&self) -> u8 {
        let head = self.regs.device_head & 0x0F;
        let select = match self.regs.selected_device() {
            DeviceIndex::Master => 0x02,
            DeviceIndex::Slave => 0x01,
        };
        0xC0 | ((!head & 0x0F) << 2) | select
    }

    /// Software reset: cancels any command, reloads the master's signature and selects it.
    pub fn reset(&mut self) {
        if let Some(active) = self.command.take() {
            debug!(opcode = active.command.opcode(), "command cancelled by reset");
        }
        for device in &mut self.devices {
            device.reset();
        }
        self.interrupt.clear();

        let control = self.regs.control;
        self.regs = AtaRegisters {
            control,
            ..AtaRegisters::default()
        };
        let master = &self.devices[DeviceIndex::Master.index()];
        self.regs.write_signature(master.is_packet_device());
        self.regs.error = 0x01;
        self.regs.status = if !master.is_attached() || master.is_packet_device() {
            Status::empty()
        } else {
            Status::DRDY | Status::DSC
        };
    }
}
