// SPDX-License-Identifier: MIT

use core::fmt;

/// Result type for SectorIO operations.
pub type BlockIOResult<T = ()> = core::result::Result<T, BlockIOError>;

/// Error type for SectorIO operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockIOError {
    Other(&'static str),
    /// Attempted to read or write past the end of the medium.
    OutOfBounds,
    Unsupported,
    /// Error reported by the host device or file.
    Device(std::io::ErrorKind),
}

impl BlockIOError {
    pub fn msg(&self) -> &'static str {
        match self {
            BlockIOError::Other(msg) => msg,
            BlockIOError::OutOfBounds => "Out of bounds",
            BlockIOError::Unsupported => "Unsupported operation",
            BlockIOError::Device(_) => "Device error",
        }
    }
}

impl From<&'static str> for BlockIOError {
    #[inline]
    fn from(msg: &'static str) -> Self {
        BlockIOError::Other(msg)
    }
}

impl From<std::io::Error> for BlockIOError {
    #[cold]
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => BlockIOError::OutOfBounds,
            kind => BlockIOError::Device(kind),
        }
    }
}

impl fmt::Display for BlockIOError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockIOError::Device(kind) => write!(f, "{}: {}", self.msg(), kind),
            _ => write!(f, "{}", self.msg()),
        }
    }
}

impl std::error::Error for BlockIOError {}
