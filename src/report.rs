//! Run report - what a single invocation found and did
//!
//! Human-readable text for the terminal or a JSON document for archiving
//! alongside the rescued images.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::compare::CompareResult;
use crate::extract::ExtractResult;
use crate::rescue::RescueMap;
use crate::scan::ScanResult;

/// Rescue coverage of one image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSummary {
    pub image: PathBuf,
    pub log: PathBuf,
    pub runs: usize,
    pub rescued_bytes: u64,
}

impl ImageSummary {
    pub fn new(image: &Path, log: &Path, map: &RescueMap) -> Self {
        Self {
            image: image.to_path_buf(),
            log: log.to_path_buf(),
            runs: map.len(),
            rescued_bytes: map.total_bytes(),
        }
    }
}

/// Extraction totals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractSummary {
    pub output_dir: PathBuf,
    pub extracted: usize,
    pub missing: Vec<String>,
    pub skipped: Vec<String>,
    pub total_bytes: u64,
}

impl ExtractSummary {
    pub fn new(output_dir: &Path, result: &ExtractResult) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            extracted: result.extracted.len(),
            missing: result.missing.clone(),
            skipped: result.skipped.clone(),
            total_bytes: result.total_bytes,
        }
    }
}

/// JPEG scan totals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSummary {
    pub catalog: PathBuf,
    pub headers_found: usize,
    pub complete: usize,
    pub abandoned: usize,
    pub bytes_scanned: u64,
}

impl ScanSummary {
    pub fn new(catalog: &Path, result: &ScanResult) -> Self {
        Self {
            catalog: catalog.to_path_buf(),
            headers_found: result.headers_found,
            complete: result.hits.len(),
            abandoned: result.abandoned,
            bytes_scanned: result.bytes_scanned,
        }
    }
}

/// Everything one run did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub primary: ImageSummary,
    pub secondary: Option<ImageSummary>,
    /// Runs in the primary map after compaction
    pub compacted_runs: usize,
    pub compare: Option<CompareResult>,
    pub extract: Option<ExtractSummary>,
    pub scan: Option<ScanSummary>,
}

impl RunReport {
    pub fn new(primary: ImageSummary) -> Self {
        let now = Utc::now();
        Self {
            started: now,
            finished: now,
            compacted_runs: primary.runs,
            primary,
            secondary: None,
            compare: None,
            extract: None,
            scan: None,
        }
    }

    /// Stamp the finish time
    pub fn finish(&mut self) {
        self.finished = Utc::now();
    }

    pub fn to_human_string(&self) -> String {
        let mut out = String::new();

        out.push_str("\n  Rescue Drill Run Report\n");
        out.push_str("  ========================================\n\n");
        out.push_str(&format!(
            "  Started:         {}\n",
            self.started.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        out.push_str(&format!(
            "  Duration:        {:.1}s\n\n",
            (self.finished - self.started).num_milliseconds() as f64 / 1000.0
        ));

        push_image(&mut out, "Primary", &self.primary);
        if let Some(secondary) = &self.secondary {
            push_image(&mut out, "Secondary", secondary);
        }
        out.push_str(&format!(
            "  Compacted runs:  {}\n\n",
            self.compacted_runs
        ));

        if let Some(compare) = &self.compare {
            out.push_str(&format!(
                "  Compare:         {} overlaps, {} identical\n",
                compare.overlaps,
                humansize::format_size(compare.bytes_compared, humansize::BINARY)
            ));
        }

        if let Some(extract) = &self.extract {
            out.push_str(&format!(
                "  Extract:         {} files ({}) into {}\n",
                extract.extracted,
                humansize::format_size(extract.total_bytes, humansize::BINARY),
                extract.output_dir.display()
            ));
            for name in &extract.missing {
                out.push_str(&format!("    missing: {}\n", name));
            }
            for name in &extract.skipped {
                out.push_str(&format!("    skipped: {}\n", name));
            }
        }

        if let Some(scan) = &self.scan {
            out.push_str(&format!(
                "  JPEG scan:       {} complete, {} abandoned, {} scanned\n",
                scan.complete,
                scan.abandoned,
                humansize::format_size(scan.bytes_scanned, humansize::BINARY)
            ));
            out.push_str(&format!("    catalog: {}\n", scan.catalog.display()));
        }

        out
    }
}

fn push_image(out: &mut String, label: &str, image: &ImageSummary) {
    out.push_str(&format!("  {:<17}{}\n", format!("{}:", label), image.image.display()));
    out.push_str(&format!(
        "    Rescued:       {} in {} runs ({})\n",
        humansize::format_size(image.rescued_bytes, humansize::BINARY),
        image.runs,
        image.log.display()
    ));
}

/// Write the report to `path`, as pretty JSON or as text
pub fn write_report(report: &RunReport, path: &Path, json: bool) -> Result<()> {
    let content = if json {
        serde_json::to_string_pretty(report)?
    } else {
        report.to_human_string()
    };

    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    Ok(())
}
