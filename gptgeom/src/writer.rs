// SPDX-License-Identifier: MIT

//! Writes a fresh GPT (both copies) onto a device.
//!
//! Entries are written as given. Range checks belong to the reader, which
//! lets tests build deliberately damaged tables.

use sectorio::prelude::*;
use uuid::Uuid;

use crate::errors::*;
use crate::header::*;
use crate::table::*;

pub fn write_gpt<IO: SectorIO + ?Sized>(
    io: &IO,
    entries: &[GptEntry],
    disk_guid: Uuid,
) -> PartResult<GptHeader> {
    write_gpt_with(
        io,
        entries,
        disk_guid,
        GPT_DEFAULT_NUM_ENTRIES,
        GPT_ENTRY_MIN_SIZE,
    )
}

/// Writes primary table and header, then the mirrored table and header at
/// the end of the disk. Returns the primary header as written.
pub fn write_gpt_with<IO: SectorIO + ?Sized>(
    io: &IO,
    entries: &[GptEntry],
    disk_guid: Uuid,
    num_entries: u32,
    entry_size: u32,
) -> PartResult<GptHeader> {
    let ss = io.sector_size();
    let mut primary = GptHeader::new_primary(io.sector_count(), ss, disk_guid, num_entries, entry_size)?;

    let mut table = encode_table(entries, num_entries, entry_size)?;
    primary.seal(table_crc32(&table));

    let table_sectors = primary.table_sectors(ss);
    let padded = usize::try_from(table_sectors * ss)
        .map_err(|_| PartError::Other("GPT: table too large"))?;
    table.resize(padded, 0);

    let backup_table_lba = primary.lba_alt - table_sectors;
    let secondary = primary.mirror(backup_table_lba);

    io.write_lba(primary.lba_table, &table)?;
    io.write_lba(primary.lba_self, &encode_header(&primary, ss))?;
    io.write_lba(secondary.lba_table, &table)?;
    io.write_lba(secondary.lba_self, &encode_header(&secondary, ss))?;

    io.flush()?;
    Ok(primary)
}
