//! Error types for rescue log, image, and catalog operations
//!
//! Everything in here is fatal: the run stops at the first one. Inputs that
//! are merely noisy (malformed log or catalog lines, entries without rescued
//! data) never become errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal error raised by the rescue-drill library
#[derive(Error, Debug)]
pub enum RescueError {
    #[error("Failed to read {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Zero length rescued range in log line \"{line}\"")]
    ZeroLength { line: String },

    #[error("Rescued range 0x{start:x} 0x{len:x} runs past the end of the address space")]
    RangeOverflow { start: u64, len: u64 },

    #[error(
        "Overlap of existing 0x{existing_start:x} 0x{existing_len:x} with 0x{start:x} 0x{len:x}"
    )]
    Overlap {
        existing_start: u64,
        existing_len: u64,
        start: u64,
        len: u64,
    },

    #[error("Cannot seek {image} to 0x{address:x}: {source}")]
    Seek {
        image: String,
        address: u64,
        #[source]
        source: io::Error,
    },

    #[error("Short read from {image} at 0x{address:x}: wanted {wanted} bytes, got {got}")]
    ShortRead {
        image: String,
        address: u64,
        wanted: usize,
        got: usize,
    },

    #[error("Images do not match at 0x{address:x}")]
    Mismatch { address: u64 },

    #[error("Cannot create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result alias for library operations
pub type Result<T> = std::result::Result<T, RescueError>;
