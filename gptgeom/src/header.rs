// SPDX-License-Identifier: MIT

//! GPT header codec.

use uuid::Uuid;
use zerocopy::byteorder::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::errors::*;

pub const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";
pub const GPT_REVISION: u32 = 0x0001_0000;
pub const GPT_MIN_REVISION: u32 = GPT_REVISION;
pub const GPT_PRIMARY_HEADER_LBA: u64 = 1;
pub const GPT_PRIMARY_TABLE_LBA: u64 = 2;
/// Size of the defined part of the header; anything beyond is reserved.
pub const GPT_HEADER_MIN_SIZE: u32 = 92;
pub const GPT_ENTRY_MIN_SIZE: u32 = 128;
pub const GPT_DEFAULT_NUM_ENTRIES: u32 = 128;

/// Byte range of the `header_crc32` field inside the header.
const HEADER_CRC_RANGE: core::ops::Range<usize> = 16..20;

/// On-disk layout (little-endian, unaligned).
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Clone, Copy, Debug)]
#[repr(C)]
pub(crate) struct RawGptHeader {
    signature: [u8; 8],
    revision: U32,
    header_size: U32,
    header_crc32: U32,
    reserved: U32,
    lba_self: U64,
    lba_alt: U64,
    lba_first_usable: U64,
    lba_last_usable: U64,
    disk_guid: [u8; 16],
    lba_table: U64,
    num_entries: U32,
    entry_size: U32,
    table_crc32: U32,
}

/// One decoded header copy, fields in host order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GptHeader {
    pub signature: [u8; 8],
    pub revision: u32,
    pub header_size: u32,
    pub header_crc32: u32,
    pub reserved: u32,
    pub lba_self: u64,
    pub lba_alt: u64,
    pub lba_first_usable: u64,
    pub lba_last_usable: u64,
    pub disk_guid: Uuid,
    pub lba_table: u64,
    pub num_entries: u32,
    pub entry_size: u32,
    pub table_crc32: u32,
}

impl From<&RawGptHeader> for GptHeader {
    fn from(raw: &RawGptHeader) -> Self {
        Self {
            signature: raw.signature,
            revision: raw.revision.get(),
            header_size: raw.header_size.get(),
            header_crc32: raw.header_crc32.get(),
            reserved: raw.reserved.get(),
            lba_self: raw.lba_self.get(),
            lba_alt: raw.lba_alt.get(),
            lba_first_usable: raw.lba_first_usable.get(),
            lba_last_usable: raw.lba_last_usable.get(),
            disk_guid: Uuid::from_bytes_le(raw.disk_guid),
            lba_table: raw.lba_table.get(),
            num_entries: raw.num_entries.get(),
            entry_size: raw.entry_size.get(),
            table_crc32: raw.table_crc32.get(),
        }
    }
}

impl From<&GptHeader> for RawGptHeader {
    fn from(h: &GptHeader) -> Self {
        Self {
            signature: h.signature,
            revision: U32::new(h.revision),
            header_size: U32::new(h.header_size),
            header_crc32: U32::new(h.header_crc32),
            reserved: U32::new(h.reserved),
            lba_self: U64::new(h.lba_self),
            lba_alt: U64::new(h.lba_alt),
            lba_first_usable: U64::new(h.lba_first_usable),
            lba_last_usable: U64::new(h.lba_last_usable),
            disk_guid: h.disk_guid.to_bytes_le(),
            lba_table: U64::new(h.lba_table),
            num_entries: U32::new(h.num_entries),
            entry_size: U32::new(h.entry_size),
            table_crc32: U32::new(h.table_crc32),
        }
    }
}

/// Where a header copy is expected to sit, and what it must point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLocation {
    pub lba_self: u64,
    pub lba_alt: u64,
    /// Last LBA of the medium.
    pub last_lba: u64,
    pub min_revision: u32,
}

impl HeaderLocation {
    #[inline]
    pub fn primary(last_lba: u64) -> Self {
        Self {
            lba_self: GPT_PRIMARY_HEADER_LBA,
            lba_alt: last_lba,
            last_lba,
            min_revision: GPT_MIN_REVISION,
        }
    }

    #[inline]
    pub fn secondary(last_lba: u64) -> Self {
        Self {
            lba_self: last_lba,
            lba_alt: GPT_PRIMARY_HEADER_LBA,
            last_lba,
            min_revision: GPT_MIN_REVISION,
        }
    }

    pub fn with_min_revision(mut self, revision: u32) -> Self {
        self.min_revision = revision;
        self
    }
}

#[inline]
fn crc32(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

#[inline]
fn ranges_overlap(a_start: u64, a_end: u64, b_start: u64, b_end: u64) -> bool {
    a_start <= b_end && b_start <= a_end
}

impl GptHeader {
    /// Standard layout for a fresh disk: table right after the primary
    /// header, mirrored table right before the secondary one.
    pub fn new_primary(
        total_sectors: u64,
        sector_size: u64,
        disk_guid: Uuid,
        num_entries: u32,
        entry_size: u32,
    ) -> PartResult<Self> {
        if entry_size < GPT_ENTRY_MIN_SIZE || entry_size % 8 != 0 {
            return Err(PartError::Invalid("GPT: invalid entry_size"));
        }
        if num_entries == 0 {
            return Err(PartError::Invalid("GPT: num_entries must be non-zero"));
        }
        if sector_size < GPT_HEADER_MIN_SIZE as u64 {
            return Err(PartError::Invalid("GPT: sector_size too small"));
        }

        let table_sectors = (num_entries as u64 * entry_size as u64).div_ceil(sector_size);
        let last_lba = total_sectors
            .checked_sub(1)
            .ok_or(PartError::Other("GPT: empty disk"))?;
        let lba_first_usable = GPT_PRIMARY_TABLE_LBA + table_sectors;
        let lba_last_usable = last_lba
            .checked_sub(1 + table_sectors)
            .ok_or(PartError::Other("GPT: disk too small (headers/tables)"))?;
        if lba_first_usable > lba_last_usable {
            return Err(PartError::Other("GPT: disk too small (headers/tables)"));
        }

        let mut header = Self {
            signature: *GPT_SIGNATURE,
            revision: GPT_REVISION,
            header_size: GPT_HEADER_MIN_SIZE,
            header_crc32: 0,
            reserved: 0,
            lba_self: GPT_PRIMARY_HEADER_LBA,
            lba_alt: last_lba,
            lba_first_usable,
            lba_last_usable,
            disk_guid,
            lba_table: GPT_PRIMARY_TABLE_LBA,
            num_entries,
            entry_size,
            table_crc32: 0,
        };
        header.header_crc32 = header.compute_header_crc32();
        Ok(header)
    }

    /// The other copy: self/alt swapped, table at `table_lba`, checksum recomputed.
    pub fn mirror(&self, table_lba: u64) -> Self {
        let mut other = *self;
        other.lba_self = self.lba_alt;
        other.lba_alt = self.lba_self;
        other.lba_table = table_lba;
        other.header_crc32 = other.compute_header_crc32();
        other
    }

    /// Stores the table checksum and recomputes the header checksum.
    pub fn seal(&mut self, table_crc32: u32) {
        self.table_crc32 = table_crc32;
        self.header_crc32 = self.compute_header_crc32();
    }

    /// CRC32 over the first `header_size` bytes with the checksum field zeroed.
    pub fn compute_header_crc32(&self) -> u32 {
        let mut raw = RawGptHeader::from(self);
        raw.header_crc32 = U32::new(0);
        let raw_len = core::mem::size_of::<RawGptHeader>();
        let mut buf = vec![0u8; (self.header_size as usize).max(raw_len)];
        buf[..raw_len].copy_from_slice(raw.as_bytes());
        crc32(&buf)
    }

    /// Exact byte length of the entry array.
    #[inline]
    pub fn table_bytes(&self) -> u64 {
        self.num_entries as u64 * self.entry_size as u64
    }

    #[inline]
    pub fn table_sectors(&self, sector_size: u64) -> u64 {
        self.table_bytes().div_ceil(sector_size)
    }

    /// Last LBA occupied by the entry array.
    #[inline]
    pub fn table_last_lba(&self, sector_size: u64) -> u64 {
        self.lba_table
            .saturating_add(self.table_sectors(sector_size).saturating_sub(1))
    }

    #[inline]
    pub fn is_primary(&self) -> bool {
        self.lba_self == GPT_PRIMARY_HEADER_LBA
    }

    /// First field on which two copies disagree, ignoring the ones that
    /// differ by construction (self/alt/table location, header checksum).
    pub fn mirror_mismatch(&self, other: &GptHeader) -> Option<&'static str> {
        if self.disk_guid != other.disk_guid {
            return Some("disk_guid");
        }
        if self.revision != other.revision {
            return Some("revision");
        }
        if self.header_size != other.header_size {
            return Some("header_size");
        }
        if self.lba_first_usable != other.lba_first_usable {
            return Some("lba_first_usable");
        }
        if self.lba_last_usable != other.lba_last_usable {
            return Some("lba_last_usable");
        }
        if self.num_entries != other.num_entries {
            return Some("num_entries");
        }
        if self.entry_size != other.entry_size {
            return Some("entry_size");
        }
        if self.table_crc32 != other.table_crc32 {
            return Some("table_crc32");
        }
        None
    }
}

/// Decodes and validates one header sector.
///
/// Checks run in a fixed order and stop at the first failure; the status
/// tells the caller whether the copy is absent, damaged or merely unusable.
pub fn decode_header(
    raw: &[u8],
    sector_size: u64,
    loc: &HeaderLocation,
) -> Result<GptHeader, HeaderError> {
    let Ok((disk, _)) = RawGptHeader::read_from_prefix(raw) else {
        return Err(HeaderError::missing("short sector"));
    };

    if &disk.signature != GPT_SIGNATURE {
        return Err(HeaderError::missing("no signature"));
    }

    let header_size = disk.header_size.get();
    let max_size = sector_size.min(raw.len() as u64);
    if header_size < GPT_HEADER_MIN_SIZE || header_size as u64 > max_size {
        return Err(HeaderError::corrupt("header_size out of range"));
    }

    let mut covered = raw[..header_size as usize].to_vec();
    covered[HEADER_CRC_RANGE].fill(0);
    if crc32(&covered) != disk.header_crc32.get() {
        return Err(HeaderError::corrupt("header CRC mismatch"));
    }

    let hdr = GptHeader::from(&disk);

    if hdr.revision < loc.min_revision {
        return Err(HeaderError::invalid("unsupported revision"));
    }
    if hdr.lba_self != loc.lba_self {
        return Err(HeaderError::invalid("lba_self does not match header location"));
    }
    if hdr.lba_alt != loc.lba_alt {
        return Err(HeaderError::invalid("lba_alt does not match mirror location"));
    }

    let last = loc.last_lba;
    if hdr.lba_first_usable < 2
        || hdr.lba_first_usable > hdr.lba_last_usable
        || hdr.lba_last_usable >= last
    {
        return Err(HeaderError::invalid("usable range out of bounds"));
    }

    if hdr.lba_table < 2 || hdr.lba_table >= last {
        return Err(HeaderError::invalid("table LBA out of bounds"));
    }
    let table_last = hdr.table_last_lba(sector_size);
    if table_last >= last {
        return Err(HeaderError::invalid("table runs past end of disk"));
    }
    if ranges_overlap(
        hdr.lba_table,
        table_last,
        hdr.lba_first_usable,
        hdr.lba_last_usable,
    ) {
        return Err(HeaderError::invalid("table overlaps usable range"));
    }

    if hdr.num_entries == 0 {
        return Err(HeaderError::invalid("no entries"));
    }
    if hdr.entry_size < GPT_ENTRY_MIN_SIZE || hdr.entry_size % 8 != 0 {
        return Err(HeaderError::invalid("invalid entry_size"));
    }

    Ok(hdr)
}

/// Serialises a header into one zero-padded sector, as stored (no resealing).
pub fn encode_header(header: &GptHeader, sector_size: u64) -> Vec<u8> {
    let raw = RawGptHeader::from(header);
    let len = (sector_size as usize).max(core::mem::size_of::<RawGptHeader>());
    let mut sector = vec![0u8; len];
    sector[..core::mem::size_of::<RawGptHeader>()].copy_from_slice(raw.as_bytes());
    sector
}

#[cfg(test)]
mod tests {
    use super::*;

    const SS: u64 = 512;
    const TOTAL: u64 = 20_000;

    fn sample() -> GptHeader {
        let guid = uuid::uuid!("3F0C5B1E-8A2D-4C7B-9E61-0D2F4A6B8C10");
        let mut h = GptHeader::new_primary(TOTAL, SS, guid, 128, 128).unwrap();
        h.seal(0xDEAD_BEEF);
        h
    }

    fn primary_loc() -> HeaderLocation {
        HeaderLocation::primary(TOTAL - 1)
    }

    #[test]
    fn layout_is_92_bytes() {
        assert_eq!(core::mem::size_of::<RawGptHeader>(), 92);
    }

    #[test]
    fn standard_layout() {
        let h = sample();
        assert_eq!(h.lba_self, 1);
        assert_eq!(h.lba_alt, TOTAL - 1);
        assert_eq!(h.lba_table, 2);
        assert_eq!(h.lba_first_usable, 34);
        assert_eq!(h.lba_last_usable, TOTAL - 34);
        assert_eq!(h.table_sectors(SS), 32);
        assert_eq!(h.table_last_lba(SS), 33);
    }

    #[test]
    fn encode_decode_round_trip() {
        let h = sample();
        let sector = encode_header(&h, SS);
        assert_eq!(sector.len(), 512);
        assert_eq!(decode_header(&sector, SS, &primary_loc()), Ok(h));

        let backup = h.mirror(TOTAL - 33);
        let sector = encode_header(&backup, SS);
        let decoded = decode_header(&sector, SS, &HeaderLocation::secondary(TOTAL - 1)).unwrap();
        assert_eq!(decoded, backup);
        assert_eq!(h.mirror_mismatch(&decoded), None);
    }

    #[test]
    fn disk_guid_uses_mixed_endian_encoding() {
        let h = sample();
        let sector = encode_header(&h, SS);
        assert_eq!(
            &sector[56..72],
            &[
                0x1E, 0x5B, 0x0C, 0x3F, 0x2D, 0x8A, 0x7B, 0x4C, 0x9E, 0x61, 0x0D, 0x2F, 0x4A,
                0x6B, 0x8C, 0x10
            ]
        );
    }

    #[test]
    fn every_bit_flip_in_covered_bytes_is_detected() {
        let sector = encode_header(&sample(), SS);
        for byte in 8..GPT_HEADER_MIN_SIZE as usize {
            if HEADER_CRC_RANGE.contains(&byte) {
                continue;
            }
            for bit in 0..8 {
                let mut bad = sector.clone();
                bad[byte] ^= 1 << bit;
                let err = decode_header(&bad, SS, &primary_loc()).unwrap_err();
                assert_eq!(err.status, HeaderStatus::Corrupt, "byte {byte} bit {bit}");
            }
        }
    }

    #[test]
    fn signature_flip_reads_as_missing() {
        let mut sector = encode_header(&sample(), SS);
        sector[0] ^= 0x01;
        let err = decode_header(&sector, SS, &primary_loc()).unwrap_err();
        assert_eq!(err.status, HeaderStatus::Missing);
    }

    #[test]
    fn padding_beyond_header_size_is_ignored() {
        let mut sector = encode_header(&sample(), SS);
        sector[200] ^= 0x80;
        sector[511] = 0xFF;
        assert!(decode_header(&sector, SS, &primary_loc()).is_ok());
    }

    #[test]
    fn larger_header_size_covers_its_padding() {
        let mut h = sample();
        h.header_size = 128;
        h.header_crc32 = h.compute_header_crc32();
        let mut sector = encode_header(&h, SS);
        assert!(decode_header(&sector, SS, &primary_loc()).is_ok());

        sector[100] = 1;
        let err = decode_header(&sector, SS, &primary_loc()).unwrap_err();
        assert_eq!(err.status, HeaderStatus::Corrupt);
    }

    #[test]
    fn header_size_bounds() {
        for size in [91u32, 513] {
            let mut h = sample();
            h.header_size = size;
            let sector = encode_header(&h, SS);
            let err = decode_header(&sector, SS, &primary_loc()).unwrap_err();
            assert_eq!(err.status, HeaderStatus::Corrupt);
        }
    }

    fn resealed(f: impl FnOnce(&mut GptHeader)) -> Vec<u8> {
        let mut h = sample();
        f(&mut h);
        h.header_crc32 = h.compute_header_crc32();
        encode_header(&h, SS)
    }

    fn status_of(sector: &[u8]) -> HeaderStatus {
        match decode_header(sector, SS, &primary_loc()) {
            Ok(_) => HeaderStatus::Ok,
            Err(e) => e.status,
        }
    }

    #[test]
    fn structural_checks_report_invalid() {
        let cases: [(&str, Box<dyn Fn(&mut GptHeader)>); 11] = [
            ("revision", Box::new(|h: &mut GptHeader| h.revision = 0x0000_FFFF)),
            ("lba_self", Box::new(|h: &mut GptHeader| h.lba_self = 2)),
            ("lba_alt", Box::new(|h: &mut GptHeader| h.lba_alt = TOTAL - 2)),
            ("first_usable<2", Box::new(|h: &mut GptHeader| h.lba_first_usable = 1)),
            (
                "first>last",
                Box::new(|h: &mut GptHeader| h.lba_first_usable = h.lba_last_usable + 1),
            ),
            ("last>=disk end", Box::new(|h: &mut GptHeader| h.lba_last_usable = TOTAL - 1)),
            ("table<2", Box::new(|h: &mut GptHeader| h.lba_table = 1)),
            ("table overlaps", Box::new(|h: &mut GptHeader| h.lba_table = 40)),
            ("no entries", Box::new(|h: &mut GptHeader| h.num_entries = 0)),
            ("entry_size<128", Box::new(|h: &mut GptHeader| h.entry_size = 120)),
            ("entry_size%8", Box::new(|h: &mut GptHeader| h.entry_size = 132)),
        ];
        for (name, f) in cases {
            let sector = resealed(|h| f(h));
            assert_eq!(status_of(&sector), HeaderStatus::Invalid, "{name}");
        }
    }

    #[test]
    fn table_must_end_before_last_lba() {
        let sector = resealed(|h| {
            h.lba_first_usable = 2;
            h.lba_last_usable = 10;
            h.lba_table = TOTAL - 20;
        });
        assert_eq!(status_of(&sector), HeaderStatus::Invalid);

        let sector = resealed(|h| {
            h.lba_first_usable = 2;
            h.lba_last_usable = 10;
            h.lba_table = TOTAL - 33;
        });
        assert_eq!(status_of(&sector), HeaderStatus::Ok);
    }

    #[test]
    fn newer_minor_revision_is_accepted() {
        let sector = resealed(|h| h.revision = 0x0001_0001);
        assert_eq!(status_of(&sector), HeaderStatus::Ok);
        let strict = primary_loc().with_min_revision(0x0002_0000);
        assert_eq!(
            decode_header(&sector, SS, &strict).unwrap_err().status,
            HeaderStatus::Invalid
        );
    }

    #[test]
    fn short_or_blank_input() {
        assert_eq!(status_of(&[0u8; 40]), HeaderStatus::Missing);
        assert_eq!(status_of(&[0u8; 512]), HeaderStatus::Missing);
    }

    #[test]
    fn mismatch_names_first_differing_field() {
        let a = sample();
        let mut b = a.mirror(TOTAL - 33);
        b.num_entries = 64;
        assert_eq!(a.mirror_mismatch(&b), Some("num_entries"));
        b.disk_guid = Uuid::nil();
        assert_eq!(a.mirror_mismatch(&b), Some("disk_guid"));
    }

    #[test]
    fn new_primary_rejects_tiny_disks() {
        assert!(GptHeader::new_primary(60, SS, Uuid::nil(), 128, 128).is_err());
        assert!(GptHeader::new_primary(TOTAL, SS, Uuid::nil(), 128, 100).is_err());
        assert!(GptHeader::new_primary(TOTAL, SS, Uuid::nil(), 0, 128).is_err());
    }
}
