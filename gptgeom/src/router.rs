// SPDX-License-Identifier: MIT

//! Partition-relative requests onto the backing device.
//!
//! No locking here: the backing device serialises its own I/O.

use crate::errors::*;
use crate::guids::is_dump_type;
use crate::registry::Partition;

/// One request addressed to a partition. Offsets are partition-relative.
#[derive(Debug)]
pub enum Request<'a> {
    Read { offset: u64, buf: &'a mut [u8] },
    Write { offset: u64, data: &'a [u8] },
    Flush,
    /// Asks where a kernel dump may be written.
    KernelDump,
    /// Attribute query, answered by the backing device.
    GetAttr(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Bytes transferred; may be less than asked near the partition end.
    Done(usize),
    Flushed,
    /// Absolute byte range on the backing device.
    DumpTarget { offset: u64, length: u64 },
    Attr(Option<u64>),
}

/// Maps `(offset, length)` inside `part` to `(backing_offset, clamped_length)`.
///
/// Lengths running past the partition end are cut short, not refused.
pub fn translate_io(part: &Partition, offset: u64, length: u64) -> Result<(u64, u64), RouteError> {
    if offset >= part.byte_length {
        return Err(RouteError::OutOfRange);
    }
    let backing = part
        .byte_offset
        .checked_add(offset)
        .ok_or(RouteError::OutOfRange)?;
    Ok((backing, length.min(part.byte_length - offset)))
}

/// Dumps may only target swap-like partitions.
pub fn authorize_dump(part: &Partition) -> Result<(), RouteError> {
    if is_dump_type(&part.type_guid) {
        Ok(())
    } else {
        Err(RouteError::NotSupported)
    }
}

pub fn route(part: &Partition, req: Request<'_>) -> Result<Reply, RouteError> {
    match req {
        Request::Read { offset, buf } => {
            let (at, len) = translate_io(part, offset, buf.len() as u64)?;
            let len = len as usize;
            part.backing.read_at(at, &mut buf[..len])?;
            Ok(Reply::Done(len))
        }
        Request::Write { offset, data } => {
            let (at, len) = translate_io(part, offset, data.len() as u64)?;
            let len = len as usize;
            part.backing.write_at(at, &data[..len])?;
            Ok(Reply::Done(len))
        }
        Request::Flush => {
            part.backing.flush()?;
            Ok(Reply::Flushed)
        }
        Request::KernelDump => {
            authorize_dump(part)?;
            Ok(Reply::DumpTarget {
                offset: part.byte_offset,
                length: part.byte_length,
            })
        }
        Request::GetAttr(name) => Ok(Reply::Attr(part.backing.get_attr(name))),
    }
}
