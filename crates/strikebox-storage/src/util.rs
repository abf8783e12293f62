use std::ops::Range;

use crate::{DiskError, Result};

/// Byte range `offset..offset + len`, provided it ends within `capacity`.
pub fn checked_range(offset: u64, len: usize, capacity: u64) -> Result<Range<u64>> {
    match offset.checked_add(len as u64) {
        None => Err(DiskError::OffsetOverflow),
        Some(end) if end > capacity => Err(DiskError::OutOfBounds {
            offset,
            len,
            capacity,
        }),
        Some(end) => Ok(offset..end),
    }
}
