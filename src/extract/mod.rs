//! Extraction - copy cataloged files out of rescued image regions
//!
//! An entry is extracted only when one rescued run covers all of it. Partly
//! rescued files are reported as missing and never written, so every file
//! that lands in the output directory is byte-for-byte what the disc held.

use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, CatalogEntry};
use crate::error::{RescueError, Result};
use crate::image::{Buffers, ImageSource};
use crate::rescue::RescueMap;

/// Name of the manifest written next to extracted files
pub const MANIFEST_NAME: &str = "rescue-drill-manifest.json";

/// Extraction options
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Directory receiving extracted files (created on first extraction)
    pub output_dir: PathBuf,
    /// Write a JSON manifest with blake3 hashes of every extracted file
    pub write_manifest: bool,
}

/// Progress updates emitted per catalog entry
#[derive(Debug, Clone)]
pub enum ExtractProgress {
    /// Entry written to disk
    Extracted { name: String, bytes: u64 },
    /// Entry not fully covered by one rescued run
    Missing { name: String },
    /// Entry name has no usable file name component
    Skipped { name: String },
}

/// One file written by the extractor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedFile {
    pub name: String,
    pub position: u64,
    pub length: u64,
    pub dest_path: String,
    pub blake3_hash: String,
    pub extracted_at: String,
}

/// Outcome of an extraction pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractResult {
    pub extracted: Vec<ExtractedFile>,
    pub missing: Vec<String>,
    pub skipped: Vec<String>,
    pub total_bytes: u64,
    pub manifest_path: Option<PathBuf>,
}

/// Manifest file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractManifest {
    pub version: u32,
    pub created_at: String,
    pub image: String,
    pub output_dir: String,
    pub total_files: usize,
    pub total_bytes: u64,
    pub entries: Vec<ExtractedFile>,
}

/// Copies catalog entries out of an image
pub struct Extractor {
    options: ExtractOptions,
}

impl Extractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    /// Extract without progress (for tests and non-interactive use)
    pub fn extract<R: Read + Seek>(
        &self,
        catalog: &Catalog,
        map: &RescueMap,
        image: &mut ImageSource<R>,
        buffers: &mut Buffers,
    ) -> Result<ExtractResult> {
        self.extract_with_progress(catalog, map, image, buffers, |_| {})
    }

    /// Extract every catalog entry that `map` fully covers.
    ///
    /// `map` should already be compacted so that files spanning touching
    /// runs are seen as covered.
    pub fn extract_with_progress<R, F>(
        &self,
        catalog: &Catalog,
        map: &RescueMap,
        image: &mut ImageSource<R>,
        buffers: &mut Buffers,
        mut on_progress: F,
    ) -> Result<ExtractResult>
    where
        R: Read + Seek,
        F: FnMut(ExtractProgress),
    {
        let mut result = ExtractResult::default();
        let mut created_dir = false;

        for entry in catalog.iter() {
            if !map.covers(entry.position, entry.length) {
                tracing::warn!(name = %entry.name, "Missing data, can't extract");
                result.missing.push(entry.name.clone());
                on_progress(ExtractProgress::Missing {
                    name: entry.name.clone(),
                });
                continue;
            }

            let Some(file_name) = Path::new(&entry.name).file_name() else {
                tracing::warn!(name = %entry.name, "Catalog name has no file name, skipping");
                result.skipped.push(entry.name.clone());
                on_progress(ExtractProgress::Skipped {
                    name: entry.name.clone(),
                });
                continue;
            };

            if !created_dir {
                fs::create_dir_all(&self.options.output_dir).map_err(|source| {
                    RescueError::Create {
                        path: self.options.output_dir.clone(),
                        source,
                    }
                })?;
                created_dir = true;
            }

            let dest = self.options.output_dir.join(file_name);
            let hash = match copy_entry(entry, image, &dest, &mut buffers.primary) {
                Ok(hash) => hash,
                Err(e @ RescueError::Create { .. }) => return Err(e),
                Err(e) => {
                    // Never leave a partial file behind
                    if let Err(rm) = fs::remove_file(&dest) {
                        tracing::warn!(
                            path = %dest.display(),
                            error = %rm,
                            "Failed to remove partial file"
                        );
                    }
                    return Err(e);
                }
            };

            tracing::info!(name = %entry.name, bytes = entry.length, "Extracted file");
            result.total_bytes += entry.length;
            result.extracted.push(ExtractedFile {
                name: entry.name.clone(),
                position: entry.position,
                length: entry.length,
                dest_path: dest.to_string_lossy().to_string(),
                blake3_hash: hash,
                extracted_at: Utc::now().to_rfc3339(),
            });
            on_progress(ExtractProgress::Extracted {
                name: entry.name.clone(),
                bytes: entry.length,
            });
        }

        if self.options.write_manifest && created_dir {
            result.manifest_path = Some(self.write_manifest(image.label(), &result)?);
        }

        tracing::info!(
            extracted = result.extracted.len(),
            missing = result.missing.len(),
            skipped = result.skipped.len(),
            total_bytes = result.total_bytes,
            "Extraction complete"
        );
        Ok(result)
    }

    fn write_manifest(&self, image: &str, result: &ExtractResult) -> Result<PathBuf> {
        let manifest = ExtractManifest {
            version: 1,
            created_at: Utc::now().to_rfc3339(),
            image: image.to_string(),
            output_dir: self.options.output_dir.to_string_lossy().to_string(),
            total_files: result.extracted.len(),
            total_bytes: result.total_bytes,
            entries: result.extracted.clone(),
        };

        let path = self.options.output_dir.join(MANIFEST_NAME);
        let json = serde_json::to_string_pretty(&manifest).map_err(io::Error::from)?;
        fs::write(&path, json).map_err(|source| RescueError::Create {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

/// Stream one entry's bytes into `dest`, returning the blake3 hex digest
fn copy_entry<R: Read + Seek>(
    entry: &CatalogEntry,
    image: &mut ImageSource<R>,
    dest: &Path,
    buf: &mut [u8],
) -> Result<String> {
    let mut out = File::create(dest).map_err(|source| RescueError::Create {
        path: dest.to_path_buf(),
        source,
    })?;
    let mut hasher = blake3::Hasher::new();

    let mut address = entry.position;
    let end = entry.position + entry.length;
    while address < end {
        let len = (buf.len() as u64).min(end - address) as usize;
        let chunk = &mut buf[..len];
        image.read_at(address, chunk)?;
        out.write_all(chunk)?;
        hasher.update(chunk);
        address += len as u64;
    }
    out.flush()?;

    Ok(hex::encode(hasher.finalize().as_bytes()))
}
