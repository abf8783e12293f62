//! Drive topology configuration.
//!
//! ```json
//! {
//!   "primary": {
//!     "master": { "kind": "hard_disk", "image": "xbox_hdd.img", "password": "..." },
//!     "slave": { "kind": "dvd", "image": "game.iso" }
//!   }
//! }
//! ```
//!
//! Relative image paths are resolved against the directory of the configuration file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strikebox_storage::{DiskError, FileBackend, StorageBackend};
use thiserror::Error;
use tracing::info;

use crate::controller::AtaController;
use crate::defs::{ChannelId, DeviceIndex};
use crate::drivers::{AtaDeviceDriver, DvdDrive, HardDiskDriver, NullDriver, PacketSize};
use crate::error::DriverError;
use crate::irq::IrqLine;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to open image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: DiskError,
    },

    #[error("invalid drive {path}: {source}")]
    Drive {
        path: PathBuf,
        #[source]
        source: DriverError,
    },
}

/// One device slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriveConfig {
    #[default]
    None,
    Dvd {
        /// Disc image; an empty tray when absent.
        #[serde(default)]
        image: Option<PathBuf>,
        #[serde(default)]
        packet_size_16: bool,
    },
    HardDisk {
        image: PathBuf,
        #[serde(default)]
        read_only: bool,
        /// Default translation heads; 16 when absent.
        #[serde(default)]
        heads: Option<u8>,
        /// Default translation sectors per track; 63 when absent.
        #[serde(default)]
        sectors_per_track: Option<u8>,
        /// Sectors visible to the guest; the rest of the image is reserved.
        #[serde(default)]
        user_sectors: Option<u32>,
        /// Security feature set password. The disk starts locked when set.
        #[serde(default)]
        password: Option<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    pub master: DriveConfig,
    pub slave: DriveConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AtaConfig {
    pub primary: ChannelConfig,
    pub secondary: ChannelConfig,
}

impl AtaConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads `path` and resolves relative image paths against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json_str(&text)?;
        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        Ok(config)
    }

    /// Rewrites relative image paths as `base.join(path)`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for channel in [&mut self.primary, &mut self.secondary] {
            for drive in [&mut channel.master, &mut channel.slave] {
                let image = match drive {
                    DriveConfig::Dvd {
                        image: Some(image), ..
                    } => image,
                    DriveConfig::HardDisk { image, .. } => image,
                    _ => continue,
                };
                if image.is_relative() {
                    *image = base.join(&*image);
                }
            }
        }
    }

    pub fn channel(&self, id: ChannelId) -> &ChannelConfig {
        match id {
            ChannelId::Primary => &self.primary,
            ChannelId::Secondary => &self.secondary,
        }
    }
}

impl ChannelConfig {
    pub fn drive(&self, index: DeviceIndex) -> &DriveConfig {
        match index {
            DeviceIndex::Master => &self.master,
            DeviceIndex::Slave => &self.slave,
        }
    }
}

impl DriveConfig {
    /// Opens the configured image and builds the driver for this slot.
    pub fn build_driver(&self) -> Result<Box<dyn AtaDeviceDriver>, ConfigError> {
        match self {
            DriveConfig::None => Ok(Box::new(NullDriver)),
            DriveConfig::Dvd {
                image,
                packet_size_16,
            } => {
                let packet_size = if *packet_size_16 {
                    PacketSize::Bytes16
                } else {
                    PacketSize::Bytes12
                };
                let drive = match image {
                    Some(path) => DvdDrive::with_disc(open_image(path, true)?),
                    None => DvdDrive::empty(),
                };
                Ok(Box::new(drive.with_packet_size(packet_size)))
            }
            DriveConfig::HardDisk {
                image,
                read_only,
                heads,
                sectors_per_track,
                user_sectors,
                password,
            } => {
                let backend = open_image(image, *read_only)?;
                let mut driver = HardDiskDriver::new(backend).map_err(|source| {
                    ConfigError::Drive {
                        path: image.clone(),
                        source,
                    }
                })?;
                if let Some(user_sectors) = user_sectors {
                    driver = driver.with_user_sectors(*user_sectors);
                }
                if heads.is_some() || sectors_per_track.is_some() {
                    driver = driver
                        .with_default_geometry(
                            heads.unwrap_or(16),
                            sectors_per_track.unwrap_or(63),
                        )
                        .map_err(|source| ConfigError::Drive {
                            path: image.clone(),
                            source,
                        })?;
                }
                if let Some(password) = password {
                    driver = driver.with_password(password.as_bytes());
                }
                Ok(Box::new(driver))
            }
        }
    }
}

fn open_image(path: &Path, read_only: bool) -> Result<Box<dyn StorageBackend>, ConfigError> {
    let backend = if read_only {
        FileBackend::open_read_only(path)
    } else {
        FileBackend::open(path)
    };
    let backend = backend.map_err(|source| ConfigError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), len = backend.len(), read_only, "image opened");
    Ok(Box::new(backend))
}

impl AtaController {
    /// Builds a controller with every configured drive attached.
    pub fn from_config(
        config: &AtaConfig,
        primary_irq: Box<dyn IrqLine>,
        secondary_irq: Box<dyn IrqLine>,
    ) -> Result<Self, ConfigError> {
        let mut controller = AtaController::new(primary_irq, secondary_irq);
        for channel in [ChannelId::Primary, ChannelId::Secondary] {
            for index in [DeviceIndex::Master, DeviceIndex::Slave] {
                let drive = config.channel(channel).drive(index);
                if *drive == DriveConfig::None {
                    continue;
                }
                controller.attach(channel, index, drive.build_driver()?);
            }
        }
        Ok(controller)
    }
}
