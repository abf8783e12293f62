//! Storage backends for the emulated ATA devices.
//!
//! The ATA layer addresses media in device sectors (512 bytes for hard disks, 2048 bytes for
//! optical discs), but host images are plain byte streams. This crate provides:
//!
//! - [`StorageBackend`]: byte-addressed medium interface with capacity queries
//! - [`MemBackend`]: in-memory image (tests, RAM-backed media)
//! - [`FileBackend`]: host file image, optionally read-only
//!
//! Bounds are validated by the ATA device drivers before a request reaches a backend, but every
//! backend still rejects out-of-range requests instead of growing the image.

mod backend;
mod error;
mod file;
mod util;

pub use backend::{MemBackend, StorageBackend};
pub use error::{DiskError, Result};
pub use file::FileBackend;
pub use util::checked_range;
