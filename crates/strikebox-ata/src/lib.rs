//! ATA/ATAPI-4 command and transfer engine for the Original Xbox IDE interface.
//!
//! The subsystem is split into three layers:
//! - [`drivers`]: the device-driver capability ([`AtaDeviceDriver`]) implemented per storage
//!   backend (DVD drive, hard disk, empty slot).
//! - [`AtaDevice`]: per-slot register-visible state (transfer modes, PIO buffer, DMA window) that
//!   delegates medium access to its driver.
//! - [`cmds`]: single-use command objects implementing the non-data, PIO data-in, PIO data-out,
//!   DMA and PACKET protocols on top of the shared channel register block.
//!
//! [`AtaChannel`] and [`AtaController`] glue the layers to guest port I/O and the interrupt line.

#![forbid(unsafe_code)]

pub mod addressing;
pub mod atapi;
pub mod channel;
pub mod cmds;
pub mod config;
pub mod controller;
pub mod defs;
pub mod device;
pub mod drivers;
pub mod error;
pub mod identify;
pub mod irq;
pub mod regs;

pub use addressing::{Chs, Geometry};
pub use channel::AtaChannel;
pub use config::{AtaConfig, ChannelConfig, ConfigError, DriveConfig};
pub use controller::{AtaController, ChannelPorts, PRIMARY_PORTS, SECONDARY_PORTS};
pub use defs::{ChannelId, DeviceIndex, ATA_SECTOR_SIZE, DVD_SECTOR_SIZE};
pub use device::{AtaDevice, DmaDirection, DmaWindow, SectorRange};
pub use drivers::{AtaDeviceDriver, DvdDrive, HardDiskDriver, NullDriver};
pub use error::{AtaError, DriverError};
pub use irq::{AtaInterrupt, IrqLine, TestIrqLine};
pub use regs::{AtaRegisters, ErrorBits, Status};
