//! Catalog - name-indexed table of files embedded in an image
//!
//! The text format comes from hand-edited `isodump` listings, so parsing is
//! heuristic and best effort. A usable line looks like
//!
//! ```text
//! <anything>] <hex block> <decimal length> <owner/perm> <name>;1<anything>
//! ```
//!
//! The JPEG scanner writes the same format so its output can be fed back in.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RescueError, Result};
use crate::image::BLOCK_SIZE;

/// Longest file name kept from a catalog line, in bytes
pub const MAX_NAME_LEN: usize = 255;

/// Marker that ends the interesting part of a line (ISO 9660 version suffix)
const VERSION_SUFFIX: &str = ";1";

/// One embedded file: where it starts in the image and how long it is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    /// Byte address in the image
    pub position: u64,
    /// Length in bytes
    pub length: u64,
}

/// Files to extract, keyed by name
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any earlier entry with the same name
    pub fn insert(&mut self, entry: CatalogEntry) -> Option<CatalogEntry> {
        self.entries.insert(entry.name.clone(), entry)
    }

    /// Look up one entry by name, for library callers that extract a single
    /// file or check a scan's output. Extraction itself walks [`Catalog::iter`].
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in name order
    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }
}

/// Open and parse the catalog file at `path`
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let file = File::open(path).map_err(|source| RescueError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    parse_catalog(BufReader::new(file))
}

/// Parse every usable line of a catalog listing; the rest are ignored
pub fn parse_catalog<R: BufRead>(reader: R) -> Result<Catalog> {
    let mut catalog = Catalog::new();
    let mut lines = 0usize;

    for raw in reader.split(b'\n') {
        let raw = raw?;
        lines += 1;
        let Some(entry) = parse_catalog_line(&raw) else {
            continue;
        };
        if let Some(old) = catalog.insert(entry) {
            tracing::debug!(name = %old.name, "Duplicate catalog name, keeping the later entry");
        }
    }

    tracing::info!(lines, entries = catalog.len(), "Parsed catalog");
    Ok(catalog)
}

/// Extract a `(block, length, name)` triplet from one raw line
pub fn parse_catalog_line(raw: &[u8]) -> Option<CatalogEntry> {
    // Text pulled out of binary dumps is often UTF-16ish; dropping the NULs
    // leaves the ASCII behind
    let bytes: Vec<u8> = raw.iter().copied().filter(|&b| b != 0).collect();
    let line = String::from_utf8_lossy(&bytes);

    let open = line.rfind(']').or_else(|| line.rfind('['))?;
    let rest = &line[open + 1..];
    let rest = &rest[..rest.find(VERSION_SUFFIX)?];

    let mut tokens = rest.split_whitespace();
    let block_token = tokens.next()?;
    let block = u64::from_str_radix(
        block_token
            .strip_prefix("0x")
            .or_else(|| block_token.strip_prefix("0X"))
            .unwrap_or(block_token),
        16,
    )
    .ok()?;
    let length: u64 = tokens.next()?.parse().ok()?;

    let meta = tokens.next()?;
    let name = match tokens.next() {
        Some(name) => name,
        // Owner field glued to the name: "00/FILE1.TXT"
        None => meta.rsplit_once('/').map(|(_, name)| name)?,
    };
    if name.is_empty() {
        return None;
    }

    Some(CatalogEntry {
        name: truncate_name(name).to_string(),
        position: block.checked_mul(BLOCK_SIZE as u64)?,
        length,
    })
}

/// Format a line that [`parse_catalog_line`] reads back as the same triplet
pub fn format_catalog_line(block: u64, length: u64, name: &str) -> String {
    format!("] {:x} {} 00/ {}{}", block, length, name, VERSION_SUFFIX)
}

fn truncate_name(name: &str) -> &str {
    if name.len() <= MAX_NAME_LEN {
        return name;
    }
    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
