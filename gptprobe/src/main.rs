// SPDX-License-Identifier: MIT

mod config;
mod dump;
mod logger;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use gptgeom::{
    DEFAULT_SECTOR_SIZE, GptGeom, Mbr, MbrKind, Reply, Request, TasteError, TasteOptions, read_mbr,
};
use sectorio::prelude::*;

use crate::config::ProbeConfig;
use crate::dump::{ReadRange, hexdump, parse_read_range};
use crate::logger::LogLevel;

/// Not a GPT disk (no protective MBR or no header).
const EXIT_NOT_GPT: u8 = 2;
/// Broken GPT or I/O failure.
const EXIT_FAILURE: u8 = 1;

#[derive(Parser, Debug)]
#[command(name = "gptprobe", version, about = "Inspect the GPT of a disk image", long_about = None)]
struct Cli {
    /// Disk image or raw device
    image: PathBuf,

    /// Logical sector size in bytes
    #[arg(long)]
    sector_size: Option<u64>,

    /// Device name used for partition names (default: image file stem)
    #[arg(long)]
    name: Option<String>,

    /// TOML file with defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show debug messages
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only show errors
    #[arg(short, long)]
    quiet: bool,

    /// Read LEN bytes at OFFSET inside partition INDEX and hex-dump them
    #[arg(long, value_name = "INDEX:OFFSET:LEN", value_parser = parse_read_range)]
    read: Option<ReadRange>,
}

/// Effective settings once the config file and flags are merged.
#[derive(Debug, PartialEq, Eq)]
struct Settings {
    sector_size: u64,
    name: String,
    log_level: LogLevel,
    taste: TasteOptions,
}

impl Settings {
    fn resolve(cli: &Cli, cfg: ProbeConfig) -> Self {
        let log_level = if cli.verbose {
            LogLevel::Verbose
        } else if cli.quiet {
            LogLevel::Quiet
        } else {
            cfg.log_level.unwrap_or_default()
        };

        let mut taste = TasteOptions::default();
        if let Some(limit) = cfg.max_table_bytes {
            taste = taste.with_max_table_bytes(limit);
        }

        Self {
            sector_size: cli
                .sector_size
                .or(cfg.sector_size)
                .unwrap_or(DEFAULT_SECTOR_SIZE),
            name: cli
                .name
                .clone()
                .or(cfg.name)
                .unwrap_or_else(|| default_name(&cli.image)),
            log_level,
            taste,
        }
    }
}

fn default_name(image: &Path) -> String {
    image
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("disk0")
        .to_string()
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("[gptprobe] {}: {e:#}", "error".red().bold());
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    let cfg = match &cli.config {
        Some(path) => ProbeConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ProbeConfig::default(),
    };
    let settings = Settings::resolve(cli, cfg);
    logger::init(settings.log_level);

    let io = FileSectorIO::open(&cli.image, settings.sector_size)
        .with_context(|| format!("opening {}", cli.image.display()))?;
    let io: Arc<dyn SectorIO> = Arc::new(io);

    let geom = match GptGeom::taste(&settings.name, Arc::clone(&io), &settings.taste) {
        Ok(geom) => geom,
        Err(e) => return Ok(report_taste_error(&settings.name, io.as_ref(), &e)),
    };

    println!("{}", geom.summary());
    if geom.needs_recovery() {
        println!(
            "[gptprobe] {}: {} is damaged, recovery is recommended",
            "warning".yellow().bold(),
            settings.name
        );
    }

    if let Some(range) = cli.read {
        read_range(&geom, range)?;
    }

    geom.destroy();
    Ok(ExitCode::SUCCESS)
}

fn report_taste_error(name: &str, io: &dyn SectorIO, e: &TasteError) -> ExitCode {
    if e.is_foreign() {
        let mbr = match e {
            TasteError::NoProtectiveMbr => read_mbr(io).ok(),
            _ => None,
        };
        println!("[gptprobe] {name}: {} ({e})", foreign_reason(e, mbr.as_ref()));
        ExitCode::from(EXIT_NOT_GPT)
    } else {
        eprintln!("[gptprobe] {}: {name}: {e}", "error".red().bold());
        ExitCode::from(EXIT_FAILURE)
    }
}

/// One-line verdict for a disk that was not claimed.
fn foreign_reason(e: &TasteError, mbr: Option<&Mbr>) -> &'static str {
    if e.signature_seen() {
        return "GPT signature found but no usable header";
    }
    match mbr {
        Some(m) if m.has_valid_signature() && m.kind() == MbrKind::Legacy => {
            "legacy MBR partitions present, not a GPT disk"
        }
        _ => "not a GPT disk",
    }
}

fn read_range(geom: &GptGeom, range: ReadRange) -> anyhow::Result<()> {
    let len = usize::try_from(range.len).context("read length")?;
    let mut buf = vec![0u8; len];
    let reply = geom
        .start(
            range.index,
            Request::Read {
                offset: range.offset,
                buf: &mut buf,
            },
        )
        .with_context(|| {
            format!(
                "reading {} bytes at {} from partition {}",
                range.len, range.offset, range.index
            )
        })?;

    let n = match reply {
        Reply::Done(n) => n,
        other => anyhow::bail!("unexpected reply {other:?}"),
    };
    if (n as u64) < range.len {
        log::warn!("short read: {n} of {} bytes (end of partition)", range.len);
    }
    print!("{}", hexdump(&buf[..n], range.offset));
    Ok(())
}
