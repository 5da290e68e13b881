//! Cross-image comparison - do two rescues of the same disc agree?
//!
//! Only bytes that *both* rescue logs mark as rescued are compared. The
//! first differing byte ends the run; this is an agreement check, not a diff.

use std::io::{Read, Seek};

use serde::{Deserialize, Serialize};

use crate::error::{RescueError, Result};
use crate::image::{Buffers, ImageSource};
use crate::rescue::{Interval, RescueMap};

/// Progress updates emitted while comparing
#[derive(Debug, Clone)]
pub enum CompareProgress {
    /// About to validate an overlap of the two rescues
    Overlap(Interval),
    /// A chunk of `bytes` matched
    Compared { bytes: u64 },
}

/// Outcome of a successful comparison
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompareResult {
    /// Overlapping rescued ranges found and validated
    pub overlaps: usize,
    /// Bytes compared across all overlaps
    pub bytes_compared: u64,
}

/// Compare two images over their commonly rescued ranges, without progress
pub fn compare<A, B>(
    first_map: &RescueMap,
    second_map: &RescueMap,
    first: &mut ImageSource<A>,
    second: &mut ImageSource<B>,
    buffers: &mut Buffers,
) -> Result<CompareResult>
where
    A: Read + Seek,
    B: Read + Seek,
{
    compare_with_progress(first_map, second_map, first, second, buffers, |_| {})
}

/// Compare two images over their commonly rescued ranges.
///
/// Fails with [`RescueError::Mismatch`] at the lowest differing address, or
/// with an I/O error if either image cannot supply a rescued range.
pub fn compare_with_progress<A, B, F>(
    first_map: &RescueMap,
    second_map: &RescueMap,
    first: &mut ImageSource<A>,
    second: &mut ImageSource<B>,
    buffers: &mut Buffers,
    mut on_progress: F,
) -> Result<CompareResult>
where
    A: Read + Seek,
    B: Read + Seek,
    F: FnMut(CompareProgress),
{
    let chunk = buffers.chunk_size() as u64;
    let mut result = CompareResult::default();

    for overlap in first_map.intersect_runs(second_map) {
        tracing::info!(start = overlap.start, length = overlap.length, "Overlap found");
        on_progress(CompareProgress::Overlap(overlap));
        result.overlaps += 1;

        let mut address = overlap.start;
        let end = overlap.end();
        while address < end {
            let len = chunk.min(end - address) as usize;
            let a = &mut buffers.primary[..len];
            let b = &mut buffers.secondary[..len];
            first.read_at(address, a)?;
            second.read_at(address, b)?;

            if let Some(offset) = first_difference(a, b) {
                let address = address + offset as u64;
                tracing::error!(
                    address,
                    first = first.label(),
                    second = second.label(),
                    "Images disagree"
                );
                return Err(RescueError::Mismatch { address });
            }

            address += len as u64;
            result.bytes_compared += len as u64;
            on_progress(CompareProgress::Compared { bytes: len as u64 });
        }
    }

    tracing::info!(
        overlaps = result.overlaps,
        bytes_compared = result.bytes_compared,
        "Images agree on all overlapping rescued ranges"
    );
    Ok(result)
}

fn first_difference(a: &[u8], b: &[u8]) -> Option<usize> {
    if a == b {
        return None;
    }
    a.iter().zip(b).position(|(x, y)| x != y)
}
