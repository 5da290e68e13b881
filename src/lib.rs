//! Rescue Drill Library
//!
//! Works on optical-disc images recovered with ddrescue: each image comes
//! with a rescue log saying which byte ranges were actually read.
//!
//! # Features
//!
//! - **Rescue maps**: ordered, non-overlapping rescued runs parsed from the log
//! - **Cross-checking**: two rescues of one disc must agree wherever both have data
//! - **Extraction**: cataloged files are copied out only when fully rescued
//! - **JPEG carving**: JFIF streams are found block by block in rescued data
//! - **Blake3 manifests**: optional hashes of every extracted file
//!
//! # Example
//!
//! ```no_run
//! use rescue_drill::{load_rescue_log, Buffers, ImageSource, JpegScanner, ScanOptions};
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut map = load_rescue_log(Path::new("disc.log"))?;
//!     map.compact();
//!
//!     let mut image = ImageSource::open(Path::new("disc.iso"))?;
//!     let mut found = Vec::<u8>::new();
//!     let result = JpegScanner::new(ScanOptions::default()).scan(
//!         &map,
//!         &mut image,
//!         &mut Buffers::default(),
//!         &mut found,
//!     )?;
//!
//!     println!("Found {} JPEGs", result.hits.len());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod cli;
pub mod compare;
pub mod config;
pub mod error;
pub mod extract;
pub mod image;
pub mod report;
pub mod rescue;
pub mod scan;

// Re-export commonly used types
pub use catalog::{load_catalog, parse_catalog, Catalog, CatalogEntry};
pub use compare::{compare, compare_with_progress, CompareProgress, CompareResult};
pub use config::Config;
pub use error::{RescueError, Result};
pub use extract::{ExtractOptions, ExtractProgress, ExtractResult, Extractor};
pub use image::{Buffers, ImageSource, BLOCK_SIZE};
pub use report::{write_report, RunReport};
pub use rescue::{load_rescue_log, parse_rescue_log, Interval, RescueMap};
pub use scan::{JpegScanner, ScanHit, ScanOptions, ScanProgress, ScanResult};
