//! # HAL Errors

use core::fmt;

/// Mailbox access errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// Access falls outside the shared memory window or a box
    OutOfBounds {
        /// Requested offset
        offset: usize,
        /// Requested length
        len: usize,
        /// Size of the region accessed
        limit: usize,
    },
    /// Box regions overlap or do not fit the window
    InvalidLayout,
}

/// HAL result type
pub type HalResult<T> = Result<T, HalError>;

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds { offset, len, limit } => write!(
                f,
                "mailbox access out of bounds: {} bytes at offset {:#x} (limit {:#x})",
                len, offset, limit
            ),
            Self::InvalidLayout => write!(f, "invalid mailbox layout"),
        }
    }
}

/// Check that `len` bytes at `offset` fit in a region of `limit` bytes
pub(crate) fn check_range(offset: usize, len: usize, limit: usize) -> HalResult<()> {
    match offset.checked_add(len) {
        Some(end) if end <= limit => Ok(()),
        _ => Err(HalError::OutOfBounds { offset, len, limit }),
    }
}
