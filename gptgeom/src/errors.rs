// SPDX-License-Identifier: MIT

use core::fmt;

use sectorio::errors::*;

/// Unified error type for the partition tools (writer, helpers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartError {
    IO(BlockIOError),
    Unsupported,
    Invalid(&'static str),
    Other(&'static str),
}

impl PartError {
    pub fn msg(&self) -> &'static str {
        match self {
            PartError::IO(e) => e.msg(),
            PartError::Unsupported => "Unsupported",
            PartError::Invalid(msg) => msg,
            PartError::Other(msg) => msg,
        }
    }
}

impl From<&'static str> for PartError {
    fn from(s: &'static str) -> Self {
        PartError::Other(s)
    }
}

impl From<BlockIOError> for PartError {
    fn from(e: BlockIOError) -> Self {
        PartError::IO(e)
    }
}

impl fmt::Display for PartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())
    }
}

impl std::error::Error for PartError {}

pub type PartResult<T = ()> = Result<T, PartError>;

/// State of one on-disk header copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderStatus {
    /// Not looked at yet.
    #[default]
    Unknown,
    /// No GPT signature.
    Missing,
    /// Signature present but size or checksum wrong.
    Corrupt,
    /// Checksum fine, contents unusable for this disk.
    Invalid,
    Ok,
}

impl HeaderStatus {
    #[inline]
    pub fn is_ok(self) -> bool {
        self == HeaderStatus::Ok
    }
}

impl fmt::Display for HeaderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HeaderStatus::Unknown => "unknown",
            HeaderStatus::Missing => "missing",
            HeaderStatus::Corrupt => "corrupt",
            HeaderStatus::Invalid => "invalid",
            HeaderStatus::Ok => "ok",
        };
        f.write_str(s)
    }
}

/// Why `decode_header` refused a sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderError {
    pub status: HeaderStatus,
    pub reason: &'static str,
}

impl HeaderError {
    #[inline]
    pub(crate) const fn missing(reason: &'static str) -> Self {
        Self {
            status: HeaderStatus::Missing,
            reason,
        }
    }

    #[inline]
    pub(crate) const fn corrupt(reason: &'static str) -> Self {
        Self {
            status: HeaderStatus::Corrupt,
            reason,
        }
    }

    #[inline]
    pub(crate) const fn invalid(reason: &'static str) -> Self {
        Self {
            status: HeaderStatus::Invalid,
            reason,
        }
    }
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPT header {}: {}", self.status, self.reason)
    }
}

impl std::error::Error for HeaderError {}

/// Why a partition-entry array was rejected as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// Fewer bytes than `num_entries * entry_size`.
    Truncated { expected: u64, got: u64 },
    ChecksumMismatch { expected: u32, computed: u32 },
    /// Larger than the configured allocation guard.
    TooLarge { bytes: u64, limit: u64 },
    Io(BlockIOError),
}

impl From<BlockIOError> for TableError {
    fn from(e: BlockIOError) -> Self {
        TableError::Io(e)
    }
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::Truncated { expected, got } => {
                write!(f, "GPT table truncated: {got} of {expected} bytes")
            }
            TableError::ChecksumMismatch { expected, computed } => write!(
                f,
                "GPT table CRC mismatch: stored {expected:#010x}, computed {computed:#010x}"
            ),
            TableError::TooLarge { bytes, limit } => {
                write!(f, "GPT table of {bytes} bytes exceeds limit of {limit}")
            }
            TableError::Io(e) => write!(f, "GPT table unreadable: {e}"),
        }
    }
}

impl std::error::Error for TableError {}

/// Outcome of a failed discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TasteError {
    /// The sector I/O adapter failed; discovery aborted.
    Io(BlockIOError),
    /// Sector 0 is not a protective MBR: some other scheme owns the disk.
    NoProtectiveMbr,
    /// Neither header copy is usable.
    NoGpt {
        primary: HeaderStatus,
        secondary: HeaderStatus,
    },
    /// Both headers decode but disagree on `field`.
    InconsistentMirrors { field: &'static str },
    /// A header was accepted but no table copy survived.
    Corrupt { primary: TableFault, secondary: TableFault },
    /// The medium cannot hold a GPT at all.
    Geometry(&'static str),
}

/// Short, copyable description of a table failure for `TasteError::Corrupt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFault {
    /// That copy was never tried (its header was not usable).
    NotTried,
    Failed(TableError),
}

impl fmt::Display for TableFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableFault::NotTried => f.write_str("not tried"),
            TableFault::Failed(e) => write!(f, "{e}"),
        }
    }
}

impl TasteError {
    /// `true` for outcomes meaning "this disk is not ours", which are not
    /// worth an operator's attention.
    #[inline]
    pub fn is_foreign(&self) -> bool {
        matches!(
            self,
            TasteError::NoProtectiveMbr | TasteError::NoGpt { .. } | TasteError::Geometry(_)
        )
    }

    /// `true` when no header was usable but at least one carried the GPT
    /// signature, i.e. a GPT is present and broken.
    #[inline]
    pub fn signature_seen(&self) -> bool {
        matches!(
            self,
            TasteError::NoGpt { primary, secondary }
                if *primary != HeaderStatus::Missing || *secondary != HeaderStatus::Missing
        )
    }
}

impl From<BlockIOError> for TasteError {
    fn from(e: BlockIOError) -> Self {
        TasteError::Io(e)
    }
}

impl fmt::Display for TasteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TasteError::Io(e) => write!(f, "I/O error during GPT discovery: {e}"),
            TasteError::NoProtectiveMbr => f.write_str("no protective MBR in sector 0"),
            TasteError::NoGpt { primary, secondary } => write!(
                f,
                "no GPT (primary header {primary}, secondary header {secondary})"
            ),
            TasteError::InconsistentMirrors { field } => write!(
                f,
                "GPT headers are inconsistent: primary and secondary disagree on {field}"
            ),
            TasteError::Corrupt { primary, secondary } => write!(
                f,
                "GPT is corrupt: no usable partition table (primary: {primary}; secondary: {secondary})"
            ),
            TasteError::Geometry(msg) => write!(f, "medium cannot hold a GPT: {msg}"),
        }
    }
}

impl std::error::Error for TasteError {}

/// Per-request failure from the router. Never fatal to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    /// Offset at or past the partition end.
    OutOfRange,
    /// Request not allowed for this partition.
    NotSupported,
    NoSuchPartition(usize),
    /// The device was orphaned, spoiled or destroyed.
    DeviceGone,
    Io(BlockIOError),
}

impl From<BlockIOError> for RouteError {
    fn from(e: BlockIOError) -> Self {
        RouteError::Io(e)
    }
}

impl From<RouteError> for BlockIOError {
    fn from(e: RouteError) -> Self {
        match e {
            RouteError::Io(e) => e,
            RouteError::OutOfRange => BlockIOError::OutOfBounds,
            RouteError::NotSupported => BlockIOError::Unsupported,
            RouteError::NoSuchPartition(_) => BlockIOError::Other("no such partition"),
            RouteError::DeviceGone => BlockIOError::Other("device gone"),
        }
    }
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::OutOfRange => f.write_str("request beyond end of partition"),
            RouteError::NotSupported => f.write_str("operation not supported by partition"),
            RouteError::NoSuchPartition(i) => write!(f, "no partition at index {i}"),
            RouteError::DeviceGone => f.write_str("device gone"),
            RouteError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for RouteError {}
