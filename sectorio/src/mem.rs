// SPDX-License-Identifier: MIT

use std::sync::{PoisonError, RwLock};

use crate::{BlockIOError, BlockIOResult, SectorIO};

/// In-memory implementation of `SectorIO`.
///
/// Useful for tests and synthetic disk images.
#[derive(Debug)]
pub struct MemSectorIO {
    buffer: RwLock<Vec<u8>>,
    sector_size: u64,
}

impl MemSectorIO {
    /// Zeroed medium of `sectors` sectors.
    #[inline]
    pub fn new(sector_size: u64, sectors: u64) -> Self {
        Self::from_vec(vec![0u8; (sector_size * sectors) as usize], sector_size)
    }

    /// Wraps an existing image. Trailing bytes that don't fill a sector are
    /// not addressable through the LBA helpers but remain readable.
    #[inline]
    pub fn from_vec(buffer: Vec<u8>, sector_size: u64) -> Self {
        Self {
            buffer: RwLock::new(buffer),
            sector_size,
        }
    }

    /// Copy of the whole image.
    pub fn to_vec(&self) -> Vec<u8> {
        self.buffer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Direct mutable access to the image (tests use it to corrupt bytes).
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut guard = self.buffer.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    #[inline]
    fn range(len: usize, offset: u64, n: usize) -> BlockIOResult<core::ops::Range<usize>> {
        let start = usize::try_from(offset).map_err(|_| BlockIOError::OutOfBounds)?;
        let end = start.checked_add(n).ok_or(BlockIOError::OutOfBounds)?;
        if end > len {
            return Err(BlockIOError::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl SectorIO for MemSectorIO {
    #[inline]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> BlockIOResult {
        let guard = self.buffer.read().unwrap_or_else(PoisonError::into_inner);
        let range = Self::range(guard.len(), offset, buf.len())?;
        buf.copy_from_slice(&guard[range]);
        Ok(())
    }

    #[inline]
    fn write_at(&self, offset: u64, data: &[u8]) -> BlockIOResult {
        let mut guard = self.buffer.write().unwrap_or_else(PoisonError::into_inner);
        let range = Self::range(guard.len(), offset, data.len())?;
        guard[range].copy_from_slice(data);
        Ok(())
    }

    #[inline]
    fn flush(&self) -> BlockIOResult {
        Ok(())
    }

    #[inline]
    fn sector_size(&self) -> u64 {
        self.sector_size
    }

    #[inline]
    fn media_size(&self) -> u64 {
        self.buffer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len() as u64
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prelude::*;

    #[test]
    fn test_rw() {
        let io = MemSectorIO::new(512, 1);
        io.write_at(10, &[1, 2, 3, 4]).unwrap();

        let mut output = [0u8; 4];
        io.read_at(10, &mut output).unwrap();
        assert_eq!(output, [1, 2, 3, 4]);
    }

    #[test]
    fn test_out_of_bounds() {
        let io = MemSectorIO::new(512, 2);
        let mut buf = [0u8; 16];
        assert_eq!(io.read_at(1020, &mut buf), Err(BlockIOError::OutOfBounds));
        assert_eq!(io.write_at(u64::MAX, &[1]), Err(BlockIOError::OutOfBounds));
    }

    #[test]
    fn test_geometry() {
        let io = MemSectorIO::new(4096, 8);
        assert_eq!(io.sector_size(), 4096);
        assert_eq!(io.media_size(), 4096 * 8);
        assert_eq!(io.sector_count(), 8);
        assert_eq!(io.last_lba(), Some(7));
        assert_eq!(MemSectorIO::new(512, 0).last_lba(), None);
    }

    #[test]
    fn test_lba_rw() {
        let io = MemSectorIO::new(512, 4);
        io.write_lba(2, &[0xAB; 512]).unwrap();
        let sectors = io.read_lba(1, 2).unwrap();
        assert_eq!(sectors.len(), 1024);
        assert!(sectors[..512].iter().all(|&b| b == 0));
        assert!(sectors[512..].iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_zero_fill() {
        let io = MemSectorIO::from_vec(vec![0xFF; 64], 512);

        io.zero_fill(10, 8).unwrap();

        let mut output = [0xAA; 8];
        io.read_at(10, &mut output).unwrap();
        assert_eq!(output, [0u8; 8]);
        assert_eq!(io.to_vec()[9], 0xFF);
    }
}
