// SPDX-License-Identifier: MIT

// Core modules
pub mod errors;
pub mod recorder;

// Backend modules
#[cfg(feature = "file")]
mod file;
#[cfg(feature = "mem")]
mod mem;

// Prelude re-exports (central entrypoint)
pub mod prelude {
    pub use super::SectorIO;
    pub use super::SectorIOExt;
    pub use super::SectorIOStructExt;
    pub use super::errors::*;
    pub use super::recorder::*;

    #[cfg(feature = "mem")]
    pub use super::mem::MemSectorIO;

    #[cfg(feature = "file")]
    pub use super::file::FileSectorIO;
}

use errors::*;

/// Size of the scratch buffer used by chunked helpers.
/// 4 KiB = typical page size and the largest common sector size.
pub const BLOCK_BUF_SIZE: usize = 4096;

/// Sector-addressed block device.
///
/// Implementations may target RAM, files or real devices. All methods take
/// `&self`: a backend serialises its own physical I/O, so one handle can be
/// shared by every partition carved out of it.
pub trait SectorIO: Send + Sync {
    /// Reads exactly `buf.len()` bytes from `offset` (absolute).
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> BlockIOResult;

    /// Writes `data` at `offset` (absolute).
    fn write_at(&self, offset: u64, data: &[u8]) -> BlockIOResult;

    /// Flushes any buffered data (may be a no-op).
    fn flush(&self) -> BlockIOResult;

    /// Logical sector size in bytes.
    fn sector_size(&self) -> u64;

    /// Total size of the medium in bytes.
    fn media_size(&self) -> u64;

    /// Capability/attribute query. Backends that know nothing return `None`.
    fn get_attr(&self, _name: &str) -> Option<u64> {
        None
    }
}

/// Offset = LBA * sector_size (with overflow-check)
#[inline]
pub fn lba_offset(lba: u64, sector_size: u64) -> BlockIOResult<u64> {
    lba.checked_mul(sector_size)
        .ok_or(BlockIOError::Other("lba_offset overflow"))
}

/// LBA-aware helpers, so callers don't write `* sector_size` everywhere.
pub trait SectorIOExt: SectorIO {
    /// Number of whole sectors on the medium.
    #[inline]
    fn sector_count(&self) -> u64 {
        match self.sector_size() {
            0 => 0,
            ss => self.media_size() / ss,
        }
    }

    /// Last addressable LBA, `None` on an empty medium.
    #[inline]
    fn last_lba(&self) -> Option<u64> {
        self.sector_count().checked_sub(1)
    }

    /// Reads `count` whole sectors starting at `lba`.
    fn read_lba(&self, lba: u64, count: u64) -> BlockIOResult<Vec<u8>> {
        let ss = self.sector_size();
        let len = count
            .checked_mul(ss)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or(BlockIOError::Other("read_lba length overflow"))?;
        let mut buf = vec![0u8; len];
        self.read_at(lba_offset(lba, ss)?, &mut buf)?;
        Ok(buf)
    }

    /// Writes `data` starting at `lba`.
    #[inline]
    fn write_lba(&self, lba: u64, data: &[u8]) -> BlockIOResult {
        self.write_at(lba_offset(lba, self.sector_size())?, data)
    }

    /// Fills a region with zeroes.
    fn zero_fill(&self, offset: u64, len: usize) -> BlockIOResult {
        const ZERO_BUF: [u8; BLOCK_BUF_SIZE] = [0u8; BLOCK_BUF_SIZE];
        let mut remaining = len;
        let mut off = offset;
        while remaining > 0 {
            let chunk = remaining.min(ZERO_BUF.len());
            self.write_at(off, &ZERO_BUF[..chunk])?;
            off += chunk as u64;
            remaining -= chunk;
        }
        Ok(())
    }
}

impl<T: SectorIO + ?Sized> SectorIOExt for T {}

/// Extension trait for reading and writing structs using zerocopy.
///
/// Requires the struct to implement zerocopy traits for safe conversion.
pub trait SectorIOStructExt: SectorIO {
    /// Reads a struct of type `T` from the given offset.
    fn read_struct<T: zerocopy::FromBytes + zerocopy::KnownLayout + zerocopy::Immutable>(
        &self,
        offset: u64,
    ) -> BlockIOResult<T> {
        let size = core::mem::size_of::<T>();
        if size > BLOCK_BUF_SIZE {
            return Err(BlockIOError::Other("read_struct: type too large"));
        }
        let mut buf = [0u8; BLOCK_BUF_SIZE];
        self.read_at(offset, &mut buf[..size])?;
        T::read_from_bytes(&buf[..size]).map_err(|_| BlockIOError::Other("read_struct failed"))
    }

    /// Writes a struct of type `T` at the given offset.
    fn write_struct<T: zerocopy::IntoBytes + zerocopy::Immutable>(
        &self,
        offset: u64,
        val: &T,
    ) -> BlockIOResult {
        self.write_at(offset, val.as_bytes())
    }
}

impl<T: SectorIO + ?Sized> SectorIOStructExt for T {}
