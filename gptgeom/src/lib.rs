// SPDX-License-Identifier: MIT

//! GPT discovery, validation and partition routing.
//!
//! [`GptGeom::taste`] checks the protective MBR, decodes both header copies,
//! cross-checks them, loads a table and exposes one [`Partition`] per valid
//! entry. Requests addressed to a partition go through the [`router`].

#[macro_use]
mod macros;

pub mod errors;
pub mod guids;
pub mod header;
pub mod mbr;
pub mod table;

pub mod geom;
pub mod registry;
pub mod router;
pub mod summary;
pub mod validator;
pub mod writer;

pub use errors::*;
pub use geom::{GptGeom, PartitionProvider};
pub use header::{GptHeader, decode_header, encode_header};
pub use registry::{Partition, PartitionRegistry};
pub use router::{Reply, Request, translate_io};
pub use summary::DiskSummary;
pub use table::{GptAttributes, GptEntry, decode_table, encode_table};
pub use validator::{CopyKind, Discovery, DiscoveryState, TasteOptions, discover};
pub use writer::{write_gpt, write_gpt_with};

pub use mbr::{Mbr, MbrKind, has_protective_mbr, read_mbr, write_protective_mbr};

pub const DEFAULT_SECTOR_SIZE: u64 = 512;
