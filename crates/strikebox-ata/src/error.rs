use strikebox_storage::DiskError;
use thiserror::Error;

use crate::regs::ErrorBits;

/// Failure reported by a device driver's medium or configuration operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("no device attached")]
    NotAttached,

    #[error("no medium present")]
    NoMedium,

    #[error("medium is read-only")]
    ReadOnlyMedium,

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("access out of range (byte_address={byte_address}, len={len})")]
    OutOfRange { byte_address: u64, len: usize },

    #[error("access not aligned to {sector_size}-byte sectors (byte_address={byte_address}, len={len})")]
    Unaligned {
        byte_address: u64,
        len: usize,
        sector_size: u32,
    },

    #[error("invalid device parameters: {0}")]
    InvalidParameters(&'static str),

    #[error("device is security locked")]
    SecurityLocked,

    #[error("password does not match")]
    PasswordMismatch,

    #[error(transparent)]
    Backend(#[from] DiskError),
}

/// Reason an ATA or ATAPI command failed.
///
/// Device operations return this; the command protocols translate it to status/error register
/// contents through [`AtaError::error_bits`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AtaError {
    #[error("command aborted: {0}")]
    Aborted(&'static str),

    #[error("no medium present")]
    NoMedium,

    #[error("sector {lba} not found")]
    IdNotFound { lba: u32 },

    #[error("CHS address does not map to a sector")]
    InvalidAddress,

    #[error("invalid transfer mode {value:#04x}")]
    InvalidTransferMode { value: u8 },

    #[error("check condition (sense key {sense_key:#x}, asc {asc:#04x})")]
    CheckCondition { sense_key: u8, asc: u8, ascq: u8 },

    #[error("medium access failed: {0}")]
    Medium(#[from] DriverError),
}

impl AtaError {
    /// Error register value reported for this failure.
    pub fn error_bits(&self) -> u8 {
        match self {
            AtaError::IdNotFound { .. } | AtaError::InvalidAddress => ErrorBits::IDNF.bits(),
            AtaError::Medium(DriverError::Backend(_)) => ErrorBits::UNC.bits(),
            AtaError::Medium(DriverError::OutOfRange { .. }) => ErrorBits::IDNF.bits(),
            AtaError::CheckCondition { sense_key, .. } => (sense_key << 4) | ErrorBits::ABRT.bits(),
            AtaError::Aborted(_)
            | AtaError::NoMedium
            | AtaError::InvalidTransferMode { .. }
            | AtaError::Medium(_) => ErrorBits::ABRT.bits(),
        }
    }
}
