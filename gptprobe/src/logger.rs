// SPDX-License-Identifier: MIT

use colored::Colorize;
use log::{Level, LevelFilter, Log, Metadata, Record};
use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl LogLevel {
    pub fn filter(self) -> LevelFilter {
        match self {
            LogLevel::Quiet => LevelFilter::Error,
            LogLevel::Normal => LevelFilter::Warn,
            LogLevel::Verbose => LevelFilter::Debug,
        }
    }
}

/// `[gptprobe]`-prefixed lines on stderr.
struct ProbeLogger {
    filter: LevelFilter,
}

impl Log for ProbeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.filter
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = match record.level() {
            Level::Error => "error".red().bold(),
            Level::Warn => "warn".yellow().bold(),
            Level::Info => "info".green(),
            Level::Debug | Level::Trace => "debug".dimmed(),
        };
        eprintln!("[gptprobe] {tag}: {}", record.args());
    }

    fn flush(&self) {}
}

/// Installs the logger; a second call keeps the first one.
pub fn init(level: LogLevel) {
    let filter = level.filter();
    if log::set_boxed_logger(Box::new(ProbeLogger { filter })).is_ok() {
        log::set_max_level(filter);
    }
}
