// SPDX-License-Identifier: MIT

use std::fmt::Write as _;

/// Largest range `--read` will fetch.
pub const MAX_READ_BYTES: u64 = 16 * 1024 * 1024;

/// `INDEX:OFFSET:LEN`, offsets partition-relative; `0x` prefixes allowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadRange {
    pub index: usize,
    pub offset: u64,
    pub len: u64,
}

fn parse_num(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("bad number {s:?}: {e}"))
}

pub fn parse_read_range(s: &str) -> Result<ReadRange, String> {
    let mut it = s.split(':');
    let (Some(index), Some(offset), Some(len), None) = (it.next(), it.next(), it.next(), it.next())
    else {
        return Err(format!("expected INDEX:OFFSET:LEN, got {s:?}"));
    };
    let index = parse_num(index)?;
    let len = parse_num(len)?;
    if len == 0 || len > MAX_READ_BYTES {
        return Err(format!("length must be between 1 and {MAX_READ_BYTES}"));
    }
    Ok(ReadRange {
        index: usize::try_from(index).map_err(|_| "index too large".to_string())?,
        offset: parse_num(offset)?,
        len,
    })
}

/// Classic 16-bytes-per-line dump; `base` is the offset of `data[0]`.
pub fn hexdump(data: &[u8], base: u64) -> String {
    let mut out = String::new();
    for (i, line) in data.chunks(16).enumerate() {
        let _ = write!(out, "{:08x}  ", base + i as u64 * 16);
        for j in 0..16 {
            match line.get(j) {
                Some(b) => {
                    let _ = write!(out, "{b:02x} ");
                }
                None => out.push_str("   "),
            }
            if j == 7 {
                out.push(' ');
            }
        }
        out.push_str(" |");
        out.extend(line.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push_str("|\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ranges() {
        assert_eq!(
            parse_read_range("1:0x200:512"),
            Ok(ReadRange {
                index: 1,
                offset: 512,
                len: 512
            })
        );
        assert!(parse_read_range("1:2").is_err());
        assert!(parse_read_range("1:2:3:4").is_err());
        assert!(parse_read_range("a:0:16").is_err());
        assert!(parse_read_range("0:0:0").is_err());
    }

    #[test]
    fn dump_layout() {
        let text = hexdump(b"EFI PART\x00\x00\x01\x00\x5c\x00\x00\x00AB", 0x200);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "00000200  45 46 49 20 50 41 52 54  00 00 01 00 5c 00 00 00  |EFI PART....\\...|"
        );
        assert!(lines[1].starts_with("00000210  41 42 "));
        assert!(lines[1].ends_with("|AB|"));
    }
}
