//! The pipeline-wide PCM format.
//!
//! Every intermediate and final audio buffer is raw interleaved signed
//! 16-bit little-endian samples with no header. One second occupies exactly
//! `sample_rate * channels * 2` bytes, which is what makes byte-offset
//! seeking inside PCM files possible.

use serde::{Deserialize, Serialize};

/// Bytes per single-channel sample (16-bit).
pub const BYTES_PER_SAMPLE: usize = 2;

/// Sample layout shared by every component of one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmFormat {
    /// Stereo at the given sample rate.
    pub fn stereo(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 2,
        }
    }

    /// Bytes occupied by one sample frame (all channels).
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * BYTES_PER_SAMPLE
    }

    /// Bytes per second of audio.
    pub fn byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.bytes_per_frame() as u64
    }

    /// Sample frames in `ms` milliseconds, truncating.
    pub fn frames_for_ms(&self, ms: u64) -> u64 {
        ms * self.sample_rate as u64 / 1000
    }

    /// Bytes in `ms` milliseconds, always a whole number of frames.
    pub fn bytes_for_ms(&self, ms: u64) -> u64 {
        self.frames_for_ms(ms) * self.bytes_per_frame() as u64
    }

    /// Presentation time of frame `frames` in microseconds.
    pub fn frames_to_us(&self, frames: u64) -> i64 {
        (frames as i128 * 1_000_000 / self.sample_rate as i128) as i64
    }

    /// Frame index at `us` microseconds, truncating.
    pub fn us_to_frames(&self, us: i64) -> u64 {
        (us.max(0) as i128 * self.sample_rate as i128 / 1_000_000) as u64
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::stereo(48_000)
    }
}
