//! Rescue log parser - ddrescue mapfile to [`RescueMap`]
//!
//! Only the shape of the mapfile matters here:
//!
//! ```text
//! # comment lines
//! 0x00120000     ?               1      <- header (current pos / status)
//! 0x00000000  0x00010000  +            <- data: address, length, status
//! ```
//!
//! Only `+` (finished) ranges count as rescued.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::{Interval, RescueMap};
use crate::error::{RescueError, Result};

/// Status character ddrescue uses for successfully read ranges
const RESCUED: char = '+';

/// Open and parse the rescue log at `path`
pub fn load_rescue_log(path: &Path) -> Result<RescueMap> {
    let file = File::open(path).map_err(|source| RescueError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    parse_rescue_log(BufReader::new(file), &path.display().to_string())
}

/// Parse a rescue log into a map of rescued runs.
///
/// `label` names the image in log output.
pub fn parse_rescue_log<R: BufRead>(reader: R, label: &str) -> Result<RescueMap> {
    let mut map = RescueMap::new();
    let mut skipped_header = false;
    let mut ignored = 0usize;

    for raw in reader.split(b'\n') {
        let raw = raw?;
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches('\r');

        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        if !skipped_header {
            skipped_header = true;
            continue;
        }

        let Some((start, length, status)) = parse_data_line(line) else {
            ignored += 1;
            continue;
        };
        if status != RESCUED {
            continue;
        }
        if length == 0 {
            return Err(RescueError::ZeroLength {
                line: line.to_string(),
            });
        }

        if start.checked_add(length).is_none() {
            return Err(RescueError::RangeOverflow { start, len: length });
        }

        map.insert(Interval::new(start, length))?;
    }

    if ignored > 0 {
        tracing::debug!(image = label, ignored, "Skipped malformed rescue log lines");
    }
    tracing::info!(
        image = label,
        runs = map.len(),
        total_bytes = map.total_bytes(),
        "Total bytes rescued"
    );

    Ok(map)
}

/// `<hex address> <hex length> <status>`; anything after the status is ignored
fn parse_data_line(line: &str) -> Option<(u64, u64, char)> {
    let mut tokens = line.split_whitespace();
    let start = parse_hex(tokens.next()?)?;
    let length = parse_hex(tokens.next()?)?;
    let status = tokens.next()?.chars().next()?;
    Some((start, length, status))
}

fn parse_hex(token: &str) -> Option<u64> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u64::from_str_radix(digits, 16).ok()
}
