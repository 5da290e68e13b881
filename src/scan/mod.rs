//! JPEG signature scanner - synthesize a catalog from rescued data
//!
//! When the disc's directory is too damaged to list, walk the rescued runs
//! block by block looking for JFIF headers and follow each stream to its
//! end-of-image marker.
//!
//! # Design
//!
//! - **Block aligned**: on a CD-ROM a file always starts on a 2048-byte
//!   sector, so headers are only checked at absolute block boundaries.
//! - **One run at a time**: tracker state survives buffer refills inside a
//!   rescued run but never crosses into the next run. A stream that runs off
//!   the end of its run is dropped, never cataloged.
//! - **Catalog output**: each complete stream becomes one line in the
//!   format [`crate::catalog`] parses, so a later run can extract it.

pub mod jpeg;

use std::io::{Read, Seek, Write};

use serde::{Deserialize, Serialize};

use crate::catalog::format_catalog_line;
use crate::error::Result;
use crate::image::{Buffers, ImageSource, BLOCK_SIZE};
use crate::rescue::RescueMap;
use jpeg::{jfif_header, JpegState, JpegTracker};

const BLOCK: u64 = BLOCK_SIZE as u64;

/// Naming of discovered files
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Prefix before the file number
    pub name_prefix: String,
    /// Extension appended to generated names
    pub extension: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            name_prefix: "File".to_string(),
            extension: "jpg".to_string(),
        }
    }
}

/// A complete JPEG stream found in rescued data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanHit {
    /// Discovery number, counting every header seen
    pub index: usize,
    /// Absolute block number of the header
    pub start_block: u64,
    /// Bytes from the header to just past the end-of-image marker
    pub length: u64,
    /// Generated file name
    pub name: String,
}

impl ScanHit {
    /// The hit as a catalog line
    pub fn catalog_line(&self) -> String {
        format_catalog_line(self.start_block, self.length, &self.name)
    }
}

/// Progress updates emitted during a scan
#[derive(Debug, Clone)]
pub enum ScanProgress {
    /// A JFIF header was matched at `block`
    HeaderFound { block: u64, index: usize },
    /// A stream reached its end-of-image marker
    FileComplete(ScanHit),
    /// Another chunk of rescued data was scanned
    Scanned { bytes: u64 },
}

/// Outcome of a scan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanResult {
    pub hits: Vec<ScanHit>,
    /// Headers matched, including streams that were later abandoned
    pub headers_found: usize,
    /// Streams that ran off the end of their rescued run
    pub abandoned: usize,
    pub bytes_scanned: u64,
}

/// Per-run state threaded through block processing
#[derive(Debug, Default)]
struct RunCursor {
    tracker: JpegTracker,
    start_block: u64,
    length: u64,
    index: usize,
}

/// Scans rescued runs of an image for embedded JPEG streams
pub struct JpegScanner {
    options: ScanOptions,
}

impl JpegScanner {
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    /// Scan without progress (for tests and non-interactive use)
    pub fn scan<R, W>(
        &self,
        map: &RescueMap,
        image: &mut ImageSource<R>,
        buffers: &mut Buffers,
        out: &mut W,
    ) -> Result<ScanResult>
    where
        R: Read + Seek,
        W: Write,
    {
        self.scan_with_progress(map, image, buffers, out, |_| {})
    }

    /// Scan every rescued run of `map`, writing one catalog line per
    /// complete stream to `out`.
    ///
    /// `map` should already be compacted; touching runs would otherwise
    /// split streams that are in fact rescued.
    pub fn scan_with_progress<R, W, F>(
        &self,
        map: &RescueMap,
        image: &mut ImageSource<R>,
        buffers: &mut Buffers,
        out: &mut W,
        mut on_progress: F,
    ) -> Result<ScanResult>
    where
        R: Read + Seek,
        W: Write,
        F: FnMut(ScanProgress),
    {
        let chunk_blocks = (buffers.chunk_size() / BLOCK_SIZE) as u64;
        let mut result = ScanResult::default();

        tracing::info!(
            image = image.label(),
            runs = map.len(),
            rescued_bytes = map.total_bytes(),
            "Starting JPEG scan"
        );

        for run in map.iter() {
            let first_block = run.start.div_ceil(BLOCK);
            let end_block = run.end() / BLOCK;
            if first_block >= end_block {
                continue;
            }

            let mut cursor = RunCursor::default();
            let mut block = first_block;
            while block < end_block {
                let count = chunk_blocks.min(end_block - block);
                let len = (count * BLOCK) as usize;
                let buf = &mut buffers.primary[..len];
                image.read_at(block * BLOCK, buf)?;

                for (i, data) in buf.chunks_exact(BLOCK_SIZE).enumerate() {
                    let number = block + i as u64;
                    let hit = self.scan_block(
                        data,
                        number,
                        &mut cursor,
                        &mut result.headers_found,
                        &mut on_progress,
                    );
                    if let Some(hit) = hit {
                        tracing::info!(
                            name = %hit.name,
                            start_block = hit.start_block,
                            length = hit.length,
                            "JPEG complete"
                        );
                        writeln!(out, "{}", hit.catalog_line())?;
                        on_progress(ScanProgress::FileComplete(hit.clone()));
                        result.hits.push(hit);
                    }
                }

                block += count;
                result.bytes_scanned += len as u64;
                on_progress(ScanProgress::Scanned { bytes: len as u64 });
            }

            if cursor.tracker.state() != JpegState::NoFile {
                tracing::debug!(
                    start_block = cursor.start_block,
                    run_end = run.end(),
                    "JPEG runs past rescued data, dropping"
                );
                result.abandoned += 1;
            }
        }
        out.flush()?;

        tracing::info!(
            headers_found = result.headers_found,
            complete = result.hits.len(),
            abandoned = result.abandoned,
            bytes_scanned = result.bytes_scanned,
            "JPEG scan complete"
        );
        Ok(result)
    }

    /// Advance the cursor over one block, returning a hit if a stream ends
    /// inside it. The rest of a block after an end-of-image marker is not
    /// examined: the next file can only start on the next block.
    fn scan_block<F: FnMut(ScanProgress)>(
        &self,
        data: &[u8],
        number: u64,
        cursor: &mut RunCursor,
        headers_found: &mut usize,
        on_progress: &mut F,
    ) -> Option<ScanHit> {
        let mut pos = 0;

        if cursor.tracker.state() == JpegState::NoFile {
            let segment = jfif_header(data)?;
            *headers_found += 1;
            cursor.start_block = number;
            cursor.length = 0;
            cursor.index = *headers_found;

            // Jump past the APP0 segment
            let next = 4 + usize::from(segment);
            cursor.tracker.begin(next.saturating_sub(data.len()));
            pos = next.min(data.len());

            tracing::debug!(block = number, index = cursor.index, "JPEG header");
            on_progress(ScanProgress::HeaderFound {
                block: number,
                index: cursor.index,
            });
        }

        while pos < data.len() {
            cursor.tracker.step(data[pos]);
            pos += 1;

            if cursor.tracker.state() == JpegState::Complete {
                cursor.length += pos as u64;
                cursor.tracker.reset();
                return Some(ScanHit {
                    index: cursor.index,
                    start_block: cursor.start_block,
                    length: cursor.length,
                    name: format!(
                        "{}{}.{}",
                        self.options.name_prefix, cursor.index, self.options.extension
                    ),
                });
            }
        }

        cursor.length += BLOCK;
        None
    }
}
