// SPDX-License-Identifier: MIT

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::logger::LogLevel;

/// Defaults loaded from a TOML file; command-line flags win.
///
/// ```toml
/// sector_size = 4096
/// name = "ada0"
/// log_level = "verbose"
/// max_table_bytes = 1048576
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeConfig {
    pub sector_size: Option<u64>,
    pub name: Option<String>,
    pub log_level: Option<LogLevel>,
    pub max_table_bytes: Option<u64>,
}

impl ProbeConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}
