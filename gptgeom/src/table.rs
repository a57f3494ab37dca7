// SPDX-License-Identifier: MIT

//! Partition-entry array codec.

use bitflags::bitflags;
use uuid::Uuid;
use zerocopy::byteorder::little_endian::{U16, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::errors::*;
use crate::guids::GptPartitionKind;
use crate::header::GptHeader;

pub const GPT_NAME_UNITS: usize = 36;

bitflags! {
    /// Entry attribute bits. Bits 48..63 are type-specific and kept as-is.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GptAttributes: u64 {
        /// Platform required; must not be deleted.
        const REQUIRED = 1 << 0;
        /// Firmware must not read the partition.
        const NO_BLOCK_IO = 1 << 1;
        const LEGACY_BIOS_BOOTABLE = 1 << 2;
        const _ = !0;
    }
}

/// On-disk layout of the first 128 bytes of a slot.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Clone, Copy, Debug)]
#[repr(C)]
pub(crate) struct RawGptEntry {
    type_guid: [u8; 16],
    unique_guid: [u8; 16],
    lba_start: U64,
    lba_end: U64,
    attributes: U64,
    name: [U16; GPT_NAME_UNITS],
}

const RAW_ENTRY_SIZE: usize = core::mem::size_of::<RawGptEntry>();

/// One decoded partition slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GptEntry {
    pub type_guid: Uuid,
    pub unique_guid: Uuid,
    pub lba_start: u64,
    /// Inclusive.
    pub lba_end: u64,
    pub attributes: GptAttributes,
    pub name: [u16; GPT_NAME_UNITS],
}

pub fn encode_gpt_name(name: &str) -> [u16; GPT_NAME_UNITS] {
    let mut buf = [0u16; GPT_NAME_UNITS];
    for (i, c) in name.encode_utf16().take(GPT_NAME_UNITS).enumerate() {
        buf[i] = c;
    }
    buf
}

/// Stops at the first NUL, replaces invalid code points.
pub fn decode_gpt_name(name: &[u16; GPT_NAME_UNITS]) -> String {
    let end = name.iter().position(|&c| c == 0).unwrap_or(GPT_NAME_UNITS);
    String::from_utf16_lossy(&name[..end])
}

impl From<&RawGptEntry> for GptEntry {
    fn from(raw: &RawGptEntry) -> Self {
        Self {
            type_guid: Uuid::from_bytes_le(raw.type_guid),
            unique_guid: Uuid::from_bytes_le(raw.unique_guid),
            lba_start: raw.lba_start.get(),
            lba_end: raw.lba_end.get(),
            attributes: GptAttributes::from_bits_retain(raw.attributes.get()),
            name: raw.name.map(|u| u.get()),
        }
    }
}

impl From<&GptEntry> for RawGptEntry {
    fn from(e: &GptEntry) -> Self {
        Self {
            type_guid: e.type_guid.to_bytes_le(),
            unique_guid: e.unique_guid.to_bytes_le(),
            lba_start: U64::new(e.lba_start),
            lba_end: U64::new(e.lba_end),
            attributes: U64::new(e.attributes.bits()),
            name: e.name.map(U16::new),
        }
    }
}

impl GptEntry {
    pub fn new(
        type_guid: Uuid,
        unique_guid: Uuid,
        lba_start: u64,
        lba_end: u64,
        attributes: GptAttributes,
        name: &str,
    ) -> Self {
        Self {
            type_guid,
            unique_guid,
            lba_start,
            lba_end,
            attributes,
            name: encode_gpt_name(name),
        }
    }

    /// An unused slot.
    pub fn unused() -> Self {
        Self {
            type_guid: Uuid::nil(),
            unique_guid: Uuid::nil(),
            lba_start: 0,
            lba_end: 0,
            attributes: GptAttributes::empty(),
            name: [0; GPT_NAME_UNITS],
        }
    }

    /// All-zero type GUID marks a free slot, whatever else it holds.
    #[inline]
    pub fn is_unused(&self) -> bool {
        self.type_guid.is_nil()
    }

    #[inline]
    pub fn kind(&self) -> GptPartitionKind {
        GptPartitionKind::from_guid(&self.type_guid)
    }

    #[inline]
    pub fn name(&self) -> String {
        decode_gpt_name(&self.name)
    }

    /// Number of sectors covered (`lba_end` is inclusive), `None` when the
    /// range is inverted or does not fit a `u64`.
    #[inline]
    pub fn sectors(&self) -> Option<u64> {
        self.lba_end
            .checked_sub(self.lba_start)
            .and_then(|n| n.checked_add(1))
    }

    /// Range check against the usable area of `header`.
    pub fn validate_in_bounds(&self, header: &GptHeader) -> Result<(), &'static str> {
        if self.lba_start > self.lba_end {
            return Err("partition ends before it starts");
        }
        if self.lba_start < header.lba_first_usable {
            return Err("partition starts before first usable LBA");
        }
        if self.lba_end > header.lba_last_usable {
            return Err("partition ends after last usable LBA");
        }
        Ok(())
    }
}

/// CRC32 over the exact entry-array span.
#[inline]
pub fn table_crc32(raw: &[u8]) -> u32 {
    crc32fast::hash(raw)
}

/// Decodes the entry array described by `header`.
///
/// The checksum covers the raw slots, including ones later dropped.
/// Unused slots produce nothing; slots with an impossible range are
/// logged and dropped. Surviving entries keep their slot index.
pub fn decode_table(raw: &[u8], header: &GptHeader) -> Result<Vec<(usize, GptEntry)>, TableError> {
    let span = header.table_bytes();
    if (raw.len() as u64) < span {
        return Err(TableError::Truncated {
            expected: span,
            got: raw.len() as u64,
        });
    }
    let raw = &raw[..span as usize];

    let computed = table_crc32(raw);
    if computed != header.table_crc32 {
        return Err(TableError::ChecksumMismatch {
            expected: header.table_crc32,
            computed,
        });
    }

    // Header validation guarantees >= 128; the clamp only keeps chunking sound.
    let entry_size = (header.entry_size as usize).max(RAW_ENTRY_SIZE);
    let mut out = Vec::new();
    for (index, slot) in raw.chunks_exact(entry_size).enumerate() {
        let Ok((disk, _)) = RawGptEntry::read_from_prefix(slot) else {
            continue;
        };
        let entry = GptEntry::from(&disk);
        if entry.is_unused() {
            continue;
        }
        if let Err(reason) = entry.validate_in_bounds(header) {
            log::warn!(
                "GPT: entry {} ignored ({}): LBA {}..{} outside {}..{}",
                index,
                reason,
                entry.lba_start,
                entry.lba_end,
                header.lba_first_usable,
                header.lba_last_usable
            );
            continue;
        }
        out.push((index, entry));
    }
    Ok(out)
}

/// Encodes `entries` into `num_entries` slots of `entry_size` bytes.
///
/// Slot `i` holds `entries[i]`; the remaining slots and every slot tail
/// beyond 128 bytes are zero.
pub fn encode_table(entries: &[GptEntry], num_entries: u32, entry_size: u32) -> PartResult<Vec<u8>> {
    let entry_size = entry_size as usize;
    if entry_size < RAW_ENTRY_SIZE || entry_size % 8 != 0 {
        return Err(PartError::Invalid("GPT: invalid entry_size"));
    }
    if entries.len() > num_entries as usize {
        return Err(PartError::Invalid("GPT: more entries than slots"));
    }

    let mut buf = vec![0u8; num_entries as usize * entry_size];
    for (slot, entry) in buf.chunks_exact_mut(entry_size).zip(entries) {
        if entry.is_unused() {
            continue;
        }
        slot[..RAW_ENTRY_SIZE].copy_from_slice(RawGptEntry::from(entry).as_bytes());
    }
    Ok(buf)
}
