// SPDX-License-Identifier: MIT

use std::sync::{Mutex, PoisonError};

use crate::{BlockIOResult, SectorIO};

/// Simple counters.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct IoStats {
    pub reads: u64,
    pub read_bytes: u64,
    pub writes: u64,
    pub write_bytes: u64,
    pub flushes: u64,
    pub max_read: u64,
    pub max_write: u64,
}

#[derive(Default, Debug)]
struct Journal {
    stats: IoStats,
    reads: Vec<(u64, usize)>,
}

/// Transparent instrumentation wrapper.
///
/// Keeps the ordered list of `(offset, len)` reads on top of the counters,
/// which is what tests use to check the order a prober touches the disk.
#[derive(Debug)]
pub struct IoRecorder<IO: SectorIO> {
    inner: IO,
    journal: Mutex<Journal>,
}

impl<IO: SectorIO> IoRecorder<IO> {
    #[inline]
    pub fn new(inner: IO) -> Self {
        Self {
            inner,
            journal: Mutex::new(Journal::default()),
        }
    }

    #[inline]
    pub fn inner(&self) -> &IO {
        &self.inner
    }

    pub fn snapshot(&self) -> IoStats {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats
    }

    /// Reads issued so far, in order.
    pub fn reads(&self) -> Vec<(u64, usize)> {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reads
            .clone()
    }

    pub fn reset(&self) {
        *self.journal.lock().unwrap_or_else(PoisonError::into_inner) = Journal::default();
    }
}

impl<IO: SectorIO> SectorIO for IoRecorder<IO> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> BlockIOResult {
        {
            let mut j = self.journal.lock().unwrap_or_else(PoisonError::into_inner);
            j.stats.reads += 1;
            j.stats.read_bytes += buf.len() as u64;
            j.stats.max_read = j.stats.max_read.max(buf.len() as u64);
            j.reads.push((offset, buf.len()));
        }
        self.inner.read_at(offset, buf)
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> BlockIOResult {
        {
            let mut j = self.journal.lock().unwrap_or_else(PoisonError::into_inner);
            j.stats.writes += 1;
            j.stats.write_bytes += data.len() as u64;
            j.stats.max_write = j.stats.max_write.max(data.len() as u64);
        }
        self.inner.write_at(offset, data)
    }

    fn flush(&self) -> BlockIOResult {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats
            .flushes += 1;
        self.inner.flush()
    }

    #[inline]
    fn sector_size(&self) -> u64 {
        self.inner.sector_size()
    }

    #[inline]
    fn media_size(&self) -> u64 {
        self.inner.media_size()
    }

    #[inline]
    fn get_attr(&self, name: &str) -> Option<u64> {
        self.inner.get_attr(name)
    }
}

#[cfg(all(test, feature = "mem"))]
mod test {
    use super::*;
    use crate::prelude::*;

    #[test]
    fn records_reads_in_order() {
        let io = IoRecorder::new(MemSectorIO::new(512, 8));
        let mut buf = [0u8; 512];
        io.read_at(512, &mut buf).unwrap();
        io.read_at(0, &mut buf[..16]).unwrap();
        io.write_at(1024, &[1, 2, 3]).unwrap();
        io.flush().unwrap();

        assert_eq!(io.reads(), vec![(512, 512), (0, 16)]);
        let stats = io.snapshot();
        assert_eq!(stats.reads, 2);
        assert_eq!(stats.read_bytes, 528);
        assert_eq!(stats.max_read, 512);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.flushes, 1);

        io.reset();
        assert_eq!(io.snapshot(), IoStats::default());
        assert!(io.reads().is_empty());
    }
}
