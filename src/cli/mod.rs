//! CLI module - Command line interface definitions

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::Parser;

/// Rescue Drill - cross-check, extract and carve ddrescue disc images
///
/// Reads `<BASE>.iso` and its rescue log `<BASE>.log`. All operations on
/// the images are READ-ONLY.
#[derive(Parser, Debug)]
#[command(name = "rescue-drill")]
#[command(version)]
#[command(about = "Cross-check, extract and carve ddrescue disc images", long_about = None)]
pub struct Cli {
    /// Base name of the primary image (reads BASE.iso and BASE.log)
    #[arg(required_unless_present_any = ["sample_config", "init_config"])]
    pub base: Option<PathBuf>,

    /// Compare against a second rescue of the same disc (BASE2.iso, BASE2.log)
    #[arg(long, short = 'c', value_name = "BASE2")]
    pub compare: Option<PathBuf>,

    /// Extract the files listed in DIR.txt into DIR/
    #[arg(long, short = 'x', value_name = "DIR")]
    pub extract: Option<PathBuf>,

    /// Scan rescued data for JPEG files and write a catalog to FILE
    #[arg(long, value_name = "FILE")]
    pub jpg: Option<PathBuf>,

    /// Config file (default: platform config dir)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Read buffer size in 2048-byte blocks
    #[arg(long, value_name = "N")]
    pub buffer_blocks: Option<usize>,

    /// Write a blake3 manifest next to extracted files
    #[arg(long)]
    pub manifest: bool,

    /// Write a run report to this path
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Write the run report as JSON
    #[arg(long, requires = "report")]
    pub json: bool,

    /// Print a commented sample config and exit
    #[arg(long)]
    pub sample_config: bool,

    /// Write the default config to --config (or the platform config dir) and exit
    #[arg(long, conflicts_with = "sample_config")]
    pub init_config: bool,

    /// Verbose output
    #[arg(long, short)]
    pub verbose: bool,
}

/// An image file and the rescue log describing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePair {
    pub image: PathBuf,
    pub log: PathBuf,
}

impl ImagePair {
    pub fn from_base(base: &Path) -> Self {
        Self {
            image: with_suffix(base, ".iso"),
            log: with_suffix(base, ".log"),
        }
    }
}

/// Catalog file read for `-x DIR`
pub fn catalog_path(dir: &Path) -> PathBuf {
    with_suffix(dir, ".txt")
}

/// Append `suffix` to the path as typed, keeping any dots already in it
fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
