// SPDX-License-Identifier: MIT

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::{BlockIOError, BlockIOResult, SectorIO};

/// File-backed `SectorIO` (disk images, or raw devices opened as files).
///
/// The media size is sampled once when the handle is created; writes
/// past it are rejected rather than growing the file.
#[derive(Debug)]
pub struct FileSectorIO {
    file: Mutex<File>,
    sector_size: u64,
    media_size: u64,
    read_only: bool,
}

impl FileSectorIO {
    pub fn from_file(mut file: File, sector_size: u64) -> BlockIOResult<Self> {
        let media_size = file.seek(SeekFrom::End(0))?;
        Ok(Self {
            file: Mutex::new(file),
            sector_size,
            media_size,
            read_only: false,
        })
    }

    /// Opens `path` read-only.
    pub fn open(path: impl AsRef<Path>, sector_size: u64) -> BlockIOResult<Self> {
        let file = File::open(path)?;
        let mut io = Self::from_file(file, sector_size)?;
        io.read_only = true;
        Ok(io)
    }

    /// Opens `path` for reading and writing.
    pub fn open_rw(path: impl AsRef<Path>, sector_size: u64) -> BlockIOResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::from_file(file, sector_size)
    }

    #[inline]
    fn check_bounds(&self, offset: u64, len: usize) -> BlockIOResult {
        let end = offset
            .checked_add(len as u64)
            .ok_or(BlockIOError::OutOfBounds)?;
        if end > self.media_size {
            return Err(BlockIOError::OutOfBounds);
        }
        Ok(())
    }
}

impl SectorIO for FileSectorIO {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> BlockIOResult {
        self.check_bounds(offset, buf.len())?;
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> BlockIOResult {
        if self.read_only {
            return Err(BlockIOError::Unsupported);
        }
        self.check_bounds(offset, data.len())?;
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    fn flush(&self) -> BlockIOResult {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.flush()?;
        Ok(())
    }

    #[inline]
    fn sector_size(&self) -> u64 {
        self.sector_size
    }

    #[inline]
    fn media_size(&self) -> u64 {
        self.media_size
    }
}
