use crate::util::checked_range;
use crate::{DiskError, Result};

/// Byte-addressed random-access medium.
///
/// Capacity is fixed for the lifetime of the backend: writes past the end fail with
/// [`DiskError::OutOfBounds`] instead of extending the image.
pub trait StorageBackend: Send {
    /// Medium size in bytes.
    fn len(&self) -> u64;

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

impl<T: StorageBackend + ?Sized> StorageBackend for Box<T> {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn is_read_only(&self) -> bool {
        (**self).is_read_only()
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        (**self).write_at(offset, buf)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// In-memory medium.
#[derive(Debug, Clone, Default)]
pub struct MemBackend {
    data: Vec<u8>,
    read_only: bool,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn byte_range(&self, offset: u64, len: usize) -> Result<std::ops::Range<usize>> {
        let range = checked_range(offset, len, self.len())?;
        let start = usize::try_from(range.start).map_err(|_| DiskError::OffsetOverflow)?;
        let end = usize::try_from(range.end).map_err(|_| DiskError::OffsetOverflow)?;
        Ok(start..end)
    }

    /// Zero-filled medium of `len` bytes.
    pub fn with_len(len: usize) -> Self {
        Self {
            data: vec![0; len],
            read_only: false,
        }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data,
            read_only: false,
        }
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

impl StorageBackend for MemBackend {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let range = self.byte_range(offset, buf.len())?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(DiskError::ReadOnly);
        }
        let range = self.byte_range(offset, buf.len())?;
        self.data[range].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
