// SPDX-License-Identifier: MIT

//! Discovery: protective MBR, both headers, then one (or two) tables.

use sectorio::prelude::*;

use crate::errors::*;
use crate::header::*;
use crate::mbr::{self, MBR_SIZE};
use crate::table::*;

/// 4 MiB, enough for 32768 entries of 128 bytes.
pub const DEFAULT_MAX_TABLE_BYTES: u64 = 4 * 1024 * 1024;

/// Options for tasting a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TasteOptions {
    /// Overrides the sector size reported by the device.
    pub sector_size: Option<u64>,
    /// Lowest header revision accepted.
    pub min_revision: u32,
    /// Entry arrays larger than this are treated as unreadable.
    pub max_table_bytes: u64,
}

impl Default for TasteOptions {
    fn default() -> Self {
        Self {
            sector_size: None,
            min_revision: GPT_MIN_REVISION,
            max_table_bytes: DEFAULT_MAX_TABLE_BYTES,
        }
    }
}

impl TasteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sector_size(mut self, sz: u64) -> Self {
        self.sector_size = Some(sz);
        self
    }

    pub fn with_min_revision(mut self, revision: u32) -> Self {
        self.min_revision = revision;
        self
    }

    pub fn with_max_table_bytes(mut self, limit: u64) -> Self {
        self.max_table_bytes = limit;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyKind {
    Primary,
    Secondary,
}

impl core::fmt::Display for CopyKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CopyKind::Primary => f.write_str("primary"),
            CopyKind::Secondary => f.write_str("secondary"),
        }
    }
}

/// What the validator learned about each copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiscoveryState {
    pub primary: HeaderStatus,
    pub secondary: HeaderStatus,
    /// Header whose table location is preferred.
    pub trusted: Option<CopyKind>,
    /// Copy whose entry array was actually used.
    pub table_source: Option<CopyKind>,
}

impl DiscoveryState {
    /// `true` when some copy is damaged and the GPT should be recovered.
    pub fn needs_recovery(&self) -> bool {
        !(self.primary.is_ok() && self.secondary.is_ok())
            || self.table_source != self.trusted
    }

    fn status_mut(&mut self, copy: CopyKind) -> &mut HeaderStatus {
        match copy {
            CopyKind::Primary => &mut self.primary,
            CopyKind::Secondary => &mut self.secondary,
        }
    }
}

/// Successful discovery result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    /// The trusted header. After a table fallback its `lba_table` still
    /// points at the damaged copy; `state.table_source` names the copy the
    /// entries came from.
    pub header: GptHeader,
    pub entries: Vec<(usize, GptEntry)>,
    pub state: DiscoveryState,
    pub sector_size: u64,
}

/// Per-device discovery run.
///
/// Reads sector 0, LBA 1, the last LBA, then the trusted entry array and, if
/// that one is damaged and the other header is good, the mirrored array.
/// At most one read is in flight.
pub struct Validator<'a, IO: SectorIO + ?Sized> {
    name: &'a str,
    io: &'a IO,
    opts: TasteOptions,
    sector_size: u64,
    last_lba: u64,
    state: DiscoveryState,
}

impl<'a, IO: SectorIO + ?Sized> Validator<'a, IO> {
    pub fn new(name: &'a str, io: &'a IO, opts: &TasteOptions) -> Result<Self, TasteError> {
        let sector_size = opts.sector_size.unwrap_or_else(|| io.sector_size());
        if sector_size < MBR_SIZE as u64 || !sector_size.is_power_of_two() {
            return Err(TasteError::Geometry("unsupported sector size"));
        }
        let sectors = io.media_size() / sector_size;
        if sectors < 3 {
            return Err(TasteError::Geometry("medium too small"));
        }
        Ok(Self {
            name,
            io,
            opts: *opts,
            sector_size,
            last_lba: sectors - 1,
            state: DiscoveryState::default(),
        })
    }

    #[inline]
    pub fn state(&self) -> &DiscoveryState {
        &self.state
    }

    #[inline]
    pub fn sector_size(&self) -> u64 {
        self.sector_size
    }

    fn read_sectors(&self, lba: u64, count: u64) -> BlockIOResult<Vec<u8>> {
        let len = count
            .checked_mul(self.sector_size)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or(BlockIOError::Other("read length overflow"))?;
        let mut buf = vec![0u8; len];
        self.io
            .read_at(sectorio::lba_offset(lba, self.sector_size)?, &mut buf)?;
        Ok(buf)
    }

    fn location(&self, copy: CopyKind) -> HeaderLocation {
        let loc = match copy {
            CopyKind::Primary => HeaderLocation::primary(self.last_lba),
            CopyKind::Secondary => HeaderLocation::secondary(self.last_lba),
        };
        loc.with_min_revision(self.opts.min_revision)
    }

    fn read_header(&mut self, copy: CopyKind) -> Result<Option<GptHeader>, TasteError> {
        let loc = self.location(copy);
        let raw = self.read_sectors(loc.lba_self, 1)?;
        match decode_header(&raw, self.sector_size, &loc) {
            Ok(h) => {
                *self.state.status_mut(copy) = HeaderStatus::Ok;
                Ok(Some(h))
            }
            Err(e) => {
                *self.state.status_mut(copy) = e.status;
                if e.status != HeaderStatus::Missing {
                    log::warn!(
                        "GPT: {}: {} header at LBA {} is {}: {}",
                        self.name,
                        copy,
                        loc.lba_self,
                        e.status,
                        e.reason
                    );
                }
                Ok(None)
            }
        }
    }

    fn read_table(&self, header: &GptHeader) -> Result<Vec<(usize, GptEntry)>, TableError> {
        let bytes = header.table_bytes();
        if bytes > self.opts.max_table_bytes {
            return Err(TableError::TooLarge {
                bytes,
                limit: self.opts.max_table_bytes,
            });
        }
        let raw = self.read_sectors(header.lba_table, header.table_sectors(self.sector_size))?;
        decode_table(&raw, header)
    }

    /// Reads one table copy. I/O failures abort discovery; format failures
    /// are returned for the caller to fall back on.
    fn try_table(
        &self,
        copy: CopyKind,
        header: &GptHeader,
    ) -> Result<Result<Vec<(usize, GptEntry)>, TableError>, TasteError> {
        match self.read_table(header) {
            Err(TableError::Io(e)) => Err(TasteError::Io(e)),
            Err(e) => {
                log::warn!(
                    "GPT: {}: {} table at LBA {} unusable: {}",
                    self.name,
                    copy,
                    header.lba_table,
                    e
                );
                Ok(Err(e))
            }
            Ok(entries) => Ok(Ok(entries)),
        }
    }

    pub fn run(mut self) -> Result<Discovery, TasteError> {
        let sector0 = self.read_sectors(0, 1)?;
        if !mbr::has_protective_mbr(&sector0) {
            log::debug!("GPT: {}: no protective MBR", self.name);
            return Err(TasteError::NoProtectiveMbr);
        }

        let primary = self.read_header(CopyKind::Primary)?;
        let secondary = self.read_header(CopyKind::Secondary)?;

        let (trusted, fallback) = match (primary, secondary) {
            (None, None) => {
                log::debug!(
                    "GPT: {}: no usable header (primary {}, secondary {})",
                    self.name,
                    self.state.primary,
                    self.state.secondary
                );
                return Err(TasteError::NoGpt {
                    primary: self.state.primary,
                    secondary: self.state.secondary,
                });
            }
            (Some(p), Some(s)) => {
                if let Some(field) = p.mirror_mismatch(&s) {
                    return Err(TasteError::InconsistentMirrors { field });
                }
                ((CopyKind::Primary, p), Some((CopyKind::Secondary, s)))
            }
            (Some(p), None) => {
                log::warn!(
                    "GPT: {}: secondary header is {}; using primary, recovery recommended",
                    self.name,
                    self.state.secondary
                );
                ((CopyKind::Primary, p), None)
            }
            (None, Some(s)) => {
                log::warn!(
                    "GPT: {}: primary header is {}; using secondary, recovery recommended",
                    self.name,
                    self.state.primary
                );
                ((CopyKind::Secondary, s), None)
            }
        };

        let (trusted_copy, header) = trusted;
        self.state.trusted = Some(trusted_copy);

        let first_fault = match self.try_table(trusted_copy, &header)? {
            Ok(entries) => {
                self.state.table_source = Some(trusted_copy);
                return Ok(self.finish(header, entries));
            }
            Err(e) => e,
        };

        let second_fault = match fallback {
            Some((copy, alt)) => match self.try_table(copy, &alt)? {
                Ok(entries) => {
                    log::warn!(
                        "GPT: {}: using {} table, recovery recommended",
                        self.name,
                        copy
                    );
                    self.state.table_source = Some(copy);
                    return Ok(self.finish(header, entries));
                }
                Err(e) => TableFault::Failed(e),
            },
            None => TableFault::NotTried,
        };

        let first_fault = TableFault::Failed(first_fault);
        let (primary, secondary) = match trusted_copy {
            CopyKind::Primary => (first_fault, second_fault),
            CopyKind::Secondary => (second_fault, first_fault),
        };
        Err(TasteError::Corrupt { primary, secondary })
    }

    fn finish(self, header: GptHeader, entries: Vec<(usize, GptEntry)>) -> Discovery {
        Discovery {
            header,
            entries,
            state: self.state,
            sector_size: self.sector_size,
        }
    }
}

/// Runs a full discovery on `io`.
pub fn discover<IO: SectorIO + ?Sized>(
    name: &str,
    io: &IO,
    opts: &TasteOptions,
) -> Result<Discovery, TasteError> {
    Validator::new(name, io, opts)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guids::*;
    use crate::writer::write_gpt;
    use uuid::Uuid;

    const TOTAL: u64 = 8192;

    fn entry(n: u128, start: u64, end: u64) -> GptEntry {
        GptEntry::new(
            GPT_PARTITION_TYPE_LINUX_FS,
            Uuid::from_u128(n),
            start,
            end,
            GptAttributes::empty(),
            "data",
        )
    }

    fn image() -> MemSectorIO {
        let io = MemSectorIO::new(512, TOTAL);
        mbr::write_protective_mbr(&io).unwrap();
        write_gpt(&io, &[entry(1, 64, 1023), entry(2, 1024, 4095)], Uuid::from_u128(9)).unwrap();
        io
    }

    fn flip(io: &MemSectorIO, offset: u64) {
        io.with_bytes_mut(|b| b[offset as usize] ^= 0x01);
    }

    #[test]
    fn healthy_disk_uses_primary() {
        let io = image();
        let d = discover("md0", &io, &TasteOptions::default()).unwrap();
        assert_eq!(d.entries.len(), 2);
        assert_eq!(d.state.trusted, Some(CopyKind::Primary));
        assert_eq!(d.state.table_source, Some(CopyKind::Primary));
        assert!(!d.state.needs_recovery());
        assert!(d.header.is_primary());
    }

    #[test]
    fn reads_happen_in_order() {
        let io = IoRecorder::new(image());
        discover("md0", &io, &TasteOptions::default()).unwrap();
        assert_eq!(
            io.reads(),
            vec![
                (0, 512),
                (512, 512),
                ((TOTAL - 1) * 512, 512),
                (1024, 32 * 512)
            ]
        );
    }

    #[test]
    fn blank_disk_is_not_ours() {
        let io = MemSectorIO::new(512, TOTAL);
        assert_eq!(
            discover("md0", &io, &TasteOptions::default()),
            Err(TasteError::NoProtectiveMbr)
        );
    }

    #[test]
    fn protective_mbr_without_gpt() {
        let io = MemSectorIO::new(512, TOTAL);
        mbr::write_protective_mbr(&io).unwrap();
        let err = discover("md0", &io, &TasteOptions::default()).unwrap_err();
        assert_eq!(
            err,
            TasteError::NoGpt {
                primary: HeaderStatus::Missing,
                secondary: HeaderStatus::Missing
            }
        );
        assert!(err.is_foreign());
        assert!(!err.signature_seen());
    }

    #[test]
    fn both_headers_damaged_is_no_gpt_with_signature() {
        let io = image();
        flip(&io, 512 + 40);
        flip(&io, (TOTAL - 1) * 512 + 40);
        let err = discover("md0", &io, &TasteOptions::default()).unwrap_err();
        assert_eq!(
            err,
            TasteError::NoGpt {
                primary: HeaderStatus::Corrupt,
                secondary: HeaderStatus::Corrupt
            }
        );
        assert!(err.is_foreign());
        assert!(err.signature_seen());
    }

    #[test]
    fn damaged_primary_header_falls_back_to_secondary() {
        let io = image();
        flip(&io, 512 + 40);
        let d = discover("md0", &io, &TasteOptions::default()).unwrap();
        assert_eq!(d.state.primary, HeaderStatus::Corrupt);
        assert_eq!(d.state.secondary, HeaderStatus::Ok);
        assert_eq!(d.state.trusted, Some(CopyKind::Secondary));
        assert_eq!(d.state.table_source, Some(CopyKind::Secondary));
        assert!(d.state.needs_recovery());
        assert_eq!(d.entries.len(), 2);
        assert_eq!(d.header.lba_table, TOTAL - 33);
    }

    #[test]
    fn damaged_primary_table_falls_back() {
        let io = image();
        flip(&io, 1024 + 200);
        let d = discover("md0", &io, &TasteOptions::default()).unwrap();
        assert_eq!(d.state.trusted, Some(CopyKind::Primary));
        assert_eq!(d.state.table_source, Some(CopyKind::Secondary));
        assert!(d.state.needs_recovery());
        assert_eq!(d.entries.len(), 2);
        assert!(d.header.is_primary());
        assert_eq!(d.header.lba_table, 2);
    }

    #[test]
    fn both_tables_damaged_is_corrupt() {
        let io = image();
        flip(&io, 1024 + 200);
        flip(&io, (TOTAL - 33) * 512 + 200);
        let err = discover("md0", &io, &TasteOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            TasteError::Corrupt {
                primary: TableFault::Failed(TableError::ChecksumMismatch { .. }),
                secondary: TableFault::Failed(TableError::ChecksumMismatch { .. }),
            }
        ));
        assert!(!err.is_foreign());
    }

    #[test]
    fn single_header_with_bad_table_is_corrupt() {
        let io = image();
        flip(&io, (TOTAL - 1) * 512 + 40);
        flip(&io, 1024 + 200);
        let err = discover("md0", &io, &TasteOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            TasteError::Corrupt {
                primary: TableFault::Failed(_),
                secondary: TableFault::NotTried,
            }
        ));
    }

    #[test]
    fn table_size_guard() {
        let io = image();
        let opts = TasteOptions::new().with_max_table_bytes(1024);
        let err = discover("md0", &io, &opts).unwrap_err();
        assert!(matches!(
            err,
            TasteError::Corrupt {
                primary: TableFault::Failed(TableError::TooLarge { limit: 1024, .. }),
                ..
            }
        ));
    }

    #[test]
    fn wrong_sector_size_finds_nothing() {
        let io = image();
        let err = discover("md0", &io, &TasteOptions::new().with_sector_size(4096)).unwrap_err();
        assert!(matches!(err, TasteError::NoGpt { .. }));
        let err = discover("md0", &io, &TasteOptions::new().with_sector_size(100)).unwrap_err();
        assert!(matches!(err, TasteError::Geometry(_)));
    }

    #[test]
    fn tiny_medium_is_geometry_error() {
        let io = MemSectorIO::new(512, 2);
        assert!(matches!(
            discover("md0", &io, &TasteOptions::default()),
            Err(TasteError::Geometry(_))
        ));
    }

    #[test]
    fn io_failure_aborts() {
        struct Failing;
        impl SectorIO for Failing {
            fn read_at(&self, _: u64, _: &mut [u8]) -> BlockIOResult {
                Err(BlockIOError::Device(std::io::ErrorKind::Other))
            }
            fn write_at(&self, _: u64, _: &[u8]) -> BlockIOResult {
                Err(BlockIOError::Unsupported)
            }
            fn flush(&self) -> BlockIOResult {
                Ok(())
            }
            fn sector_size(&self) -> u64 {
                512
            }
            fn media_size(&self) -> u64 {
                512 * 1024
            }
        }
        assert!(matches!(
            discover("md0", &Failing, &TasteOptions::default()),
            Err(TasteError::Io(_))
        ));
    }

    #[test]
    fn table_read_failure_aborts_without_fallback() {
        /// Fails every read touching the primary entry array.
        struct BadTable(MemSectorIO);
        impl SectorIO for BadTable {
            fn read_at(&self, offset: u64, buf: &mut [u8]) -> BlockIOResult {
                if offset == 2 * 512 {
                    return Err(BlockIOError::Device(std::io::ErrorKind::Other));
                }
                self.0.read_at(offset, buf)
            }
            fn write_at(&self, offset: u64, data: &[u8]) -> BlockIOResult {
                self.0.write_at(offset, data)
            }
            fn flush(&self) -> BlockIOResult {
                self.0.flush()
            }
            fn sector_size(&self) -> u64 {
                self.0.sector_size()
            }
            fn media_size(&self) -> u64 {
                self.0.media_size()
            }
        }

        let io = IoRecorder::new(BadTable(image()));
        assert_eq!(
            discover("md0", &io, &TasteOptions::default()),
            Err(TasteError::Io(BlockIOError::Device(std::io::ErrorKind::Other)))
        );
        // The mirrored array at the end of the disk is never read.
        assert!(io.reads().iter().all(|&(off, _)| off < (TOTAL - 33) * 512));
    }
}
