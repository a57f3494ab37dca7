// SPDX-License-Identifier: MIT

//! Protective MBR detection (and creation, for the writer).

use sectorio::prelude::*;
use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::errors::*;

pub const MBR_SIGNATURE: [u8; 2] = [0x55, 0xAA];
pub const PROTECTIVE_GPT: u8 = 0xEE;
pub const MBR_SIZE: usize = 512;

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned, Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct MbrEntry {
    pub boot_flag: u8,
    pub starting_chs: [u8; 3],
    pub part_type: u8,
    pub end_chs: [u8; 3],
    pub start_lba: U32,
    pub sectors: U32,
}

impl MbrEntry {
    #[inline]
    pub fn new_empty() -> Self {
        Self {
            boot_flag: 0,
            starting_chs: [0; 3],
            part_type: 0,
            end_chs: [0; 3],
            start_lba: U32::new(0),
            sectors: U32::new(0),
        }
    }

    /// Single 0xEE record covering the disk after sector 0, clamped to 2 TiB
    /// worth of 512-byte sectors.
    #[inline]
    pub fn new_protective(total_sectors: u64) -> Self {
        let sectors = total_sectors.saturating_sub(1).min(u32::MAX as u64) as u32;
        Self {
            boot_flag: 0,
            starting_chs: [0x00, 0x02, 0x00],
            part_type: PROTECTIVE_GPT,
            end_chs: [0xFE, 0xFF, 0xFF],
            start_lba: U32::new(1),
            sectors: U32::new(sectors),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.part_type == 0
    }

    #[inline]
    pub fn is_protective(&self) -> bool {
        self.part_type == PROTECTIVE_GPT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbrKind {
    Empty,
    Protective,
    Legacy,
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned, Copy, Clone, Debug)]
#[repr(C)]
pub struct Mbr {
    pub boot_code: [u8; 446],
    pub entries: [MbrEntry; 4],
    pub signature: [u8; 2],
}

impl Mbr {
    #[inline]
    pub fn new_from_entries(entries: [MbrEntry; 4]) -> Self {
        Self {
            boot_code: [0u8; 446],
            entries,
            signature: MBR_SIGNATURE,
        }
    }

    #[inline]
    pub fn new_protective(total_sectors: u64) -> Self {
        let mut es = [MbrEntry::new_empty(); 4];
        es[0] = MbrEntry::new_protective(total_sectors);
        Self::new_from_entries(es)
    }

    /// Reads the first 512 bytes of `sector0`.
    #[inline]
    pub fn parse(sector0: &[u8]) -> Option<Self> {
        Self::read_from_prefix(sector0).ok().map(|(mbr, _)| mbr)
    }

    #[inline]
    pub fn has_valid_signature(&self) -> bool {
        self.signature == MBR_SIGNATURE
    }

    /// Classifies the four records. Any non-0xEE record makes it legacy.
    pub fn kind(&self) -> MbrKind {
        if self.entries.iter().any(|e| !e.is_empty() && !e.is_protective()) {
            MbrKind::Legacy
        } else if self.entries.iter().any(MbrEntry::is_protective) {
            MbrKind::Protective
        } else {
            MbrKind::Empty
        }
    }
}

/// `true` when sector 0 carries the boot signature and every legacy record
/// is either empty or of the GPT-protective type.
pub fn has_protective_mbr(sector0: &[u8]) -> bool {
    let Some(mbr) = Mbr::parse(sector0) else {
        return false;
    };
    mbr.has_valid_signature() && mbr.kind() != MbrKind::Legacy
}

/// Reads the MBR from the first bytes of `io`.
pub fn read_mbr<IO: SectorIO + ?Sized>(io: &IO) -> PartResult<Mbr> {
    Ok(io.read_struct::<Mbr>(0)?)
}

pub fn write_protective_mbr<IO: SectorIO + ?Sized>(io: &IO) -> PartResult<()> {
    let mbr = Mbr::new_protective(io.sector_count());
    io.write_struct(0, &mbr)?;
    io.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_types(types: [u8; 4]) -> Vec<u8> {
        let mut es = [MbrEntry::new_empty(); 4];
        for (e, t) in es.iter_mut().zip(types) {
            if t != 0 {
                *e = MbrEntry::new_protective(2048);
                e.part_type = t;
            }
        }
        Mbr::new_from_entries(es).as_bytes().to_vec()
    }

    #[test]
    fn layout_is_one_sector() {
        assert_eq!(core::mem::size_of::<Mbr>(), MBR_SIZE);
        assert_eq!(core::mem::size_of::<MbrEntry>(), 16);
    }

    #[test]
    fn write_and_detect_protective_mbr() {
        let io = MemSectorIO::new(512, 2048);
        write_protective_mbr(&io).unwrap();

        let sector0 = io.read_lba(0, 1).unwrap();
        assert_eq!(&sector0[510..], &MBR_SIGNATURE);
        assert_eq!(sector0[446 + 4], PROTECTIVE_GPT);
        assert!(has_protective_mbr(&sector0));

        let mbr = Mbr::parse(&sector0).unwrap();
        assert_eq!(mbr.kind(), MbrKind::Protective);
        assert_eq!(mbr.entries[0].sectors.get(), 2047);
    }

    #[test]
    fn read_mbr_from_device() {
        let io = MemSectorIO::new(512, 2048);
        let blank = read_mbr(&io).unwrap();
        assert!(!blank.has_valid_signature());
        assert_eq!(blank.kind(), MbrKind::Empty);

        io.write_at(0, &with_types([0x07, 0x83, 0, 0])).unwrap();
        let legacy = read_mbr(&io).unwrap();
        assert!(legacy.has_valid_signature());
        assert_eq!(legacy.kind(), MbrKind::Legacy);
        assert_eq!(legacy.entries[1].part_type, 0x83);

        let tiny = MemSectorIO::new(512, 0);
        assert!(matches!(read_mbr(&tiny), Err(PartError::IO(_))));
    }

    #[test]
    fn protective_size_is_clamped() {
        let e = MbrEntry::new_protective(u64::from(u32::MAX) + 10);
        assert_eq!(e.sectors.get(), u32::MAX);
    }

    #[test]
    fn missing_signature_is_rejected() {
        let mut sector = with_types([PROTECTIVE_GPT, 0, 0, 0]);
        sector[511] = 0;
        assert!(!has_protective_mbr(&sector));
        assert!(!has_protective_mbr(&[0u8; 512]));
        assert!(!has_protective_mbr(&[0u8; 100]));
    }

    #[test]
    fn legacy_record_anywhere_is_rejected() {
        assert!(has_protective_mbr(&with_types([PROTECTIVE_GPT, 0, 0, 0])));
        assert!(has_protective_mbr(&with_types([0, 0, PROTECTIVE_GPT, 0])));
        assert!(!has_protective_mbr(&with_types([PROTECTIVE_GPT, 0x83, 0, 0])));
        assert!(!has_protective_mbr(&with_types([0x07, 0, 0, 0])));
        assert_eq!(
            Mbr::parse(&with_types([PROTECTIVE_GPT, 0x83, 0, 0])).unwrap().kind(),
            MbrKind::Legacy
        );
    }

    #[test]
    fn all_empty_records_are_accepted() {
        let sector = with_types([0, 0, 0, 0]);
        assert_eq!(Mbr::parse(&sector).unwrap().kind(), MbrKind::Empty);
        assert!(has_protective_mbr(&sector));
    }

    #[test]
    fn larger_sectors_only_use_first_512_bytes() {
        let mut sector = with_types([PROTECTIVE_GPT, 0, 0, 0]);
        sector.resize(4096, 0xAB);
        assert!(has_protective_mbr(&sector));
    }
}
