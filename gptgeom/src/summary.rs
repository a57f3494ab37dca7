// SPDX-License-Identifier: MIT

//! Printable view of an attached device.

use core::fmt;

use uuid::Uuid;

use crate::registry::Partition;
use crate::validator::{CopyKind, DiscoveryState};

#[derive(Debug, Clone)]
pub struct DiskSummary {
    pub name: String,
    pub sector_size: u64,
    pub disk_guid: Uuid,
    pub state: DiscoveryState,
    pub partitions: Vec<Partition>,
}

impl DiskSummary {
    #[inline]
    pub fn needs_recovery(&self) -> bool {
        self.state.needs_recovery()
    }
}

fn copy_label(copy: Option<CopyKind>) -> &'static str {
    match copy {
        Some(CopyKind::Primary) => "primary",
        Some(CopyKind::Secondary) => "secondary",
        None => "none",
    }
}

impl fmt::Display for DiskSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} • sector: {} • GUID: {} • headers: {}/{} • table: {}",
            self.name,
            sep_u64(self.sector_size),
            self.disk_guid.hyphenated(),
            self.state.primary,
            self.state.secondary,
            copy_label(self.state.table_source),
        )?;

        writeln!(
            f,
            "  ┌──────────┬──────────────────────────┬──────────────────────────┬────────────┬────────────┬───────────────┐"
        )?;
        writeln!(
            f,
            "  | Name     | Label                    | Type                     | Start LBA  | End LBA    | Size          |"
        )?;
        writeln!(
            f,
            "  ├──────────┼──────────────────────────┼──────────────────────────┼────────────┼────────────┼───────────────┤"
        )?;

        for p in &self.partitions {
            writeln!(
                f,
                "  | {:<8} | {:<24} | {:<24} | {:>10} | {:>10} | {:>13} |",
                truncate(&p.name, 8),
                truncate(&p.label, 24),
                truncate(&p.kind().to_string(), 24),
                sep_u64(p.lba_start),
                sep_u64(p.lba_end),
                pretty_bytes(p.byte_length),
            )?;
        }

        writeln!(
            f,
            "  └──────────┴──────────────────────────┴──────────────────────────┴────────────┴────────────┴───────────────┘"
        )
    }
}

/// Cuts on a char boundary.
fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

pub fn pretty_bytes(n: u64) -> String {
    const UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];
    let mut val = n as f64;
    let mut idx = 0usize;
    while val >= 1024.0 && idx + 1 < UNITS.len() {
        val /= 1024.0;
        idx += 1;
    }
    if idx == 0 {
        format!("{} {}", sep_u64(n), UNITS[idx])
    } else {
        format!("{:.1} {}", val, UNITS[idx])
    }
}

/// Thousands separated by spaces: `12 345 678`.
pub fn sep_u64(mut n: u64) -> String {
    if n < 1_000 {
        return n.to_string();
    }
    let mut parts: Vec<String> = Vec::new();
    while n >= 1_000 {
        parts.push(format!("{:03}", n % 1_000));
        n /= 1_000;
    }
    parts.push(n.to_string());
    parts.reverse();
    parts.join(" ")
}
