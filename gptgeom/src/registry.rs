// SPDX-License-Identifier: MIT

//! In-memory model of the partitions exposed for one device.

use std::fmt;
use std::sync::Arc;

use sectorio::SectorIO;
use uuid::Uuid;

use crate::errors::*;
use crate::guids::{GptPartitionKind, is_reserved_type};
use crate::table::{GptAttributes, GptEntry};

/// Separator for ordinary data partitions (`da0p1`).
pub const DATA_SEPARATOR: char = 'p';
/// Separator for boot/system partitions (`da0s1`).
pub const RESERVED_SEPARATOR: char = 's';

/// One exposed sub-device.
#[derive(Clone)]
pub struct Partition {
    /// Slot index in the entry array.
    pub index: usize,
    pub name: String,
    pub byte_offset: u64,
    pub byte_length: u64,
    pub lba_start: u64,
    pub lba_end: u64,
    pub type_guid: Uuid,
    pub unique_guid: Uuid,
    pub attributes: GptAttributes,
    /// Label stored in the entry.
    pub label: String,
    pub backing: Arc<dyn SectorIO>,
}

impl Partition {
    #[inline]
    pub fn kind(&self) -> GptPartitionKind {
        GptPartitionKind::from_guid(&self.type_guid)
    }

    #[inline]
    pub fn is_reserved(&self) -> bool {
        is_reserved_type(&self.type_guid)
    }

    /// Byte just past the end of the partition on the backing device.
    #[inline]
    pub fn byte_end(&self) -> u64 {
        self.byte_offset + self.byte_length
    }

    #[inline]
    pub fn contains(&self, byte_offset: u64) -> bool {
        byte_offset >= self.byte_offset && byte_offset < self.byte_end()
    }
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("byte_offset", &self.byte_offset)
            .field("byte_length", &self.byte_length)
            .field("type_guid", &self.type_guid)
            .field("unique_guid", &self.unique_guid)
            .field("attributes", &self.attributes)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// `{device}{p|s}{index + 1}`.
pub fn partition_name(device: &str, index: usize, type_guid: &Uuid) -> String {
    let sep = if is_reserved_type(type_guid) {
        RESERVED_SEPARATOR
    } else {
        DATA_SEPARATOR
    };
    format!("{device}{sep}{}", index + 1)
}

/// Sole owner of the partitions of one device.
pub struct PartitionRegistry {
    device: String,
    backing: Arc<dyn SectorIO>,
    parts: Vec<Partition>,
}

impl PartitionRegistry {
    pub fn new(device: impl Into<String>, backing: Arc<dyn SectorIO>) -> Self {
        Self {
            device: device.into(),
            backing,
            parts: Vec::new(),
        }
    }

    #[inline]
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Replaces the contents with one partition per entry.
    ///
    /// On error the registry is left empty.
    pub fn populate(&mut self, entries: &[(usize, GptEntry)], sector_size: u64) -> PartResult<()> {
        self.parts.clear();
        let mut parts = Vec::with_capacity(entries.len());
        for (index, e) in entries {
            let byte_offset = e
                .lba_start
                .checked_mul(sector_size)
                .ok_or(PartError::Other("partition offset overflow"))?;
            if e.lba_start > e.lba_end {
                return Err(PartError::Invalid("partition ends before it starts"));
            }
            let byte_length = e
                .sectors()
                .and_then(|n| n.checked_mul(sector_size))
                .ok_or(PartError::Other("partition length overflow"))?;
            byte_offset
                .checked_add(byte_length)
                .ok_or(PartError::Other("partition end overflow"))?;

            parts.push(Partition {
                index: *index,
                name: partition_name(&self.device, *index, &e.type_guid),
                byte_offset,
                byte_length,
                lba_start: e.lba_start,
                lba_end: e.lba_end,
                type_guid: e.type_guid,
                unique_guid: e.unique_guid,
                attributes: e.attributes,
                label: e.name(),
                backing: Arc::clone(&self.backing),
            });
        }
        self.parts = parts;
        Ok(())
    }

    /// Partition whose byte range holds `byte_offset` on the backing device.
    pub fn lookup_by_offset(&self, byte_offset: u64) -> Option<&Partition> {
        self.parts.iter().find(|p| p.contains(byte_offset))
    }

    pub fn lookup_by_index(&self, index: usize) -> Option<&Partition> {
        self.parts.iter().find(|p| p.index == index)
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&Partition> {
        self.parts.iter().find(|p| p.name == name)
    }

    /// Fresh iterator on every call.
    #[inline]
    pub fn all(&self) -> impl Iterator<Item = &Partition> + '_ {
        self.parts.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Drops every partition. Safe to call any number of times.
    pub fn clear(&mut self) {
        self.parts.clear();
    }
}
