//! The two-channel IDE controller as seen from guest port I/O.

use tracing::trace;

use crate::channel::AtaChannel;
use crate::defs::{ChannelId, DeviceIndex};
use crate::drivers::AtaDeviceDriver;
use crate::irq::IrqLine;

/// I/O port assignment of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPorts {
    /// Base of the eight command block registers.
    pub command_base: u16,
    /// Alternate status / device control.
    pub control_base: u16,
    /// Legacy ISA interrupt line.
    pub irq: u8,
}

pub const PRIMARY_PORTS: ChannelPorts = ChannelPorts {
    command_base: 0x1F0,
    control_base: 0x3F6,
    irq: 14,
};

pub const SECONDARY_PORTS: ChannelPorts = ChannelPorts {
    command_base: 0x170,
    control_base: 0x376,
    irq: 15,
};

impl ChannelPorts {
    pub fn of(id: ChannelId) -> Self {
        match id {
            ChannelId::Primary => PRIMARY_PORTS,
            ChannelId::Secondary => SECONDARY_PORTS,
        }
    }

    fn decode(&self, port: u16) -> Option<PortTarget> {
        if (self.command_base..self.command_base + 8).contains(&port) {
            Some(PortTarget::Command(port - self.command_base))
        } else if (self.control_base..self.control_base + 2).contains(&port) {
            Some(PortTarget::Control(port - self.control_base))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PortTarget {
    Command(u16),
    Control(u16),
}

/// Primary and secondary channels.
#[derive(Debug)]
pub struct AtaController {
    channels: [AtaChannel; 2],
}

impl AtaController {
    pub fn new(primary_irq: Box<dyn IrqLine>, secondary_irq: Box<dyn IrqLine>) -> Self {
        Self {
            channels: [
                AtaChannel::new(ChannelId::Primary, primary_irq),
                AtaChannel::new(ChannelId::Secondary, secondary_irq),
            ],
        }
    }

    pub fn channel(&self, id: ChannelId) -> &AtaChannel {
        &self.channels[id.index()]
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> &mut AtaChannel {
        &mut self.channels[id.index()]
    }

    pub fn attach(
        &mut self,
        channel: ChannelId,
        index: DeviceIndex,
        driver: Box<dyn AtaDeviceDriver>,
    ) -> Box<dyn AtaDeviceDriver> {
        self.channel_mut(channel).attach(index, driver)
    }

    fn route(&mut self, port: u16) -> Option<(&mut AtaChannel, PortTarget)> {
        let (id, target) = [ChannelId::Primary, ChannelId::Secondary]
            .into_iter()
            .find_map(|id| ChannelPorts::of(id).decode(port).map(|target| (id, target)))?;
        Some((&mut self.channels[id.index()], target))
    }

    /// Whether `port` belongs to either channel.
    pub fn handles_port(port: u16) -> bool {
        PRIMARY_PORTS.decode(port).is_some() || SECONDARY_PORTS.decode(port).is_some()
    }

    pub fn io_read(&mut self, port: u16, size: u8) -> u32 {
        match self.route(port) {
            Some((channel, PortTarget::Command(reg))) => channel.read_command_block(reg, size),
            Some((channel, PortTarget::Control(reg))) => {
                u32::from(channel.read_control_block(reg))
            }
            None => {
                trace!(port, "read from unmapped IDE port");
                0xFFFF_FFFF >> (32 - 8 * u32::from(size.clamp(1, 4)))
            }
        }
    }

    pub fn io_write(&mut self, port: u16, size: u8, value: u32) {
        match self.route(port) {
            Some((channel, PortTarget::Command(reg))) => {
                channel.write_command_block(reg, size, value)
            }
            Some((channel, PortTarget::Control(reg))) => {
                channel.write_control_block(reg, value as u8)
            }
            None => trace!(port, value, "write to unmapped IDE port"),
        }
    }
}
