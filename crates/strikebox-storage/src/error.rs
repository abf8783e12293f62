use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiskError>;

/// Error type for medium accesses.
///
/// [`DiskError::Io`] stores a human-readable `String` rather than `std::io::Error` so the enum
/// stays `Clone + PartialEq` and can be latched by device models for later inspection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiskError {
    #[error("out of bounds: offset={offset} len={len} capacity={capacity}")]
    OutOfBounds {
        offset: u64,
        len: usize,
        capacity: u64,
    },

    #[error("integer overflow while computing byte offsets")]
    OffsetOverflow,

    #[error("backend is read-only")]
    ReadOnly,

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for DiskError {
    fn from(err: std::io::Error) -> Self {
        DiskError::Io(err.to_string())
    }
}
