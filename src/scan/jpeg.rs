//! JPEG stream tracker
//!
//! Follows a JPEG byte stream marker by marker, skipping segment payloads by
//! their length fields, until the end-of-image marker. It does not decode
//! or validate anything beyond that.

/// SOI followed by the APP0 marker
pub const JFIF_SIGNATURE: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE0];

/// APP0 identifier, including its terminating NUL
const JFIF_IDENT: &[u8; 5] = b"JFIF\0";

const MARKER: u8 = 0xFF;
const EOI: u8 = 0xD9;
const STUFFED: u8 = 0x00;

/// Where the tracker is inside a candidate JPEG stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JpegState {
    /// Not inside a file; waiting for a header at a block boundary
    NoFile,
    /// Inside segment or entropy-coded data
    InProgress,
    /// Just saw `0xFF`
    Found0xFF,
    /// Next byte is the high byte of a segment length
    FoundLenHi,
    /// Next byte is the low byte of a segment length
    FoundLenLo,
    /// Skipping segment payload
    Skipping,
    /// End-of-image marker consumed
    Complete,
}

/// Length of the APP0 segment if `block` starts with a JFIF header
pub fn jfif_header(block: &[u8]) -> Option<u16> {
    if block.len() < 11 || block[..4] != JFIF_SIGNATURE || &block[6..11] != JFIF_IDENT {
        return None;
    }
    Some(u16::from_be_bytes([block[4], block[5]]))
}

/// Marker state plus the pending segment skip count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegTracker {
    state: JpegState,
    skip: i32,
}

impl Default for JpegTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl JpegTracker {
    pub fn new() -> Self {
        Self {
            state: JpegState::NoFile,
            skip: 0,
        }
    }

    pub fn state(&self) -> JpegState {
        self.state
    }

    /// Enter a file whose header was just matched.
    ///
    /// `overflow` is how far the APP0 segment extends past the end of the
    /// current block; those bytes are skipped in the following block(s).
    pub fn begin(&mut self, overflow: usize) {
        if overflow > 0 {
            self.skip = i32::try_from(overflow).unwrap_or(i32::MAX);
            self.state = JpegState::Skipping;
        } else {
            self.skip = 0;
            self.state = JpegState::InProgress;
        }
    }

    /// Back to waiting for a header
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Consume one byte of the stream
    pub fn step(&mut self, byte: u8) {
        self.state = match self.state {
            JpegState::NoFile | JpegState::Complete => self.state,
            JpegState::InProgress => Self::in_progress(byte),
            JpegState::Found0xFF => Self::found_marker(byte),
            JpegState::FoundLenHi => self.length_hi(byte),
            JpegState::FoundLenLo => self.length_lo(byte),
            JpegState::Skipping => self.skipping(),
        };
    }

    fn in_progress(byte: u8) -> JpegState {
        if byte == MARKER {
            JpegState::Found0xFF
        } else {
            JpegState::InProgress
        }
    }

    fn found_marker(byte: u8) -> JpegState {
        match byte {
            EOI => JpegState::Complete,
            // Fill bytes before a marker
            MARKER => JpegState::Found0xFF,
            // Stuffed 0xFF inside entropy-coded data
            STUFFED => JpegState::InProgress,
            // RST0..RST7 carry no length
            0xD0..=0xD7 => JpegState::InProgress,
            0xC0..=0xFF => JpegState::FoundLenHi,
            _ => JpegState::InProgress,
        }
    }

    fn length_hi(&mut self, byte: u8) -> JpegState {
        self.skip = i32::from(byte);
        JpegState::FoundLenLo
    }

    fn length_lo(&mut self, byte: u8) -> JpegState {
        // The stated length counts its own two bytes
        self.skip = ((self.skip << 8) | i32::from(byte)) - 2;
        if self.skip > 0 {
            JpegState::Skipping
        } else {
            JpegState::InProgress
        }
    }

    fn skipping(&mut self) -> JpegState {
        self.skip -= 1;
        if self.skip <= 0 {
            JpegState::InProgress
        } else {
            JpegState::Skipping
        }
    }
}
