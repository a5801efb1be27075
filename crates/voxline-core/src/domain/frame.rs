//! Audio-plane types.
//!
//! Pure data, no I/O.

use std::time::Duration;

use bytes::Bytes;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Sample rate browsers capture and play back at. Agreed out of band; the
/// relay never resamples.
pub const SAMPLE_RATE_HZ: u32 = 48_000;

/// Bytes per sample: signed 16-bit little-endian, mono.
pub const BYTES_PER_SAMPLE: usize = 2;

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// One inbound binary message: raw PCM, forwarded byte-for-byte.
///
/// Cloning is cheap (reference-counted), so fan-out shares one buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame(Bytes);

impl AudioFrame {
    pub fn new(data: Bytes) -> Self {
        Self(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of whole samples in the frame (a trailing odd byte is ignored).
    pub fn sample_count(&self) -> usize {
        self.0.len() / BYTES_PER_SAMPLE
    }

    /// Playback duration at [`SAMPLE_RATE_HZ`]. For logging only.
    pub fn duration(&self) -> Duration {
        Duration::from_micros(self.sample_count() as u64 * 1_000_000 / u64::from(SAMPLE_RATE_HZ))
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Vec<u8>> for AudioFrame {
    fn from(data: Vec<u8>) -> Self {
        Self(Bytes::from(data))
    }
}

impl From<Bytes> for AudioFrame {
    fn from(data: Bytes) -> Self {
        Self(data)
    }
}
