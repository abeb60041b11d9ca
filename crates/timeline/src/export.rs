//! Caller-supplied export settings.

use serde::{Deserialize, Serialize};

use crate::pcm::PcmFormat;

/// Codec and format selection for one export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Output width in pixels.
    pub width: u32,

    /// Output height in pixels.
    pub height: u32,

    /// Output frame rate.
    pub fps: u32,

    /// Video codec MIME type.
    pub video_codec: String,

    /// Audio codec MIME type.
    pub audio_codec: String,

    /// Video bitrate in kbps.
    pub video_bitrate_kbps: u32,

    /// Audio bitrate in kbps.
    pub audio_bitrate_kbps: u32,

    /// Frames between video sync samples.
    pub keyframe_interval: u32,

    /// PCM layout for every audio buffer in this export.
    pub pcm: PcmFormat,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            video_codec: "video/x-fcv1".to_string(),
            audio_codec: "audio/x-fca1".to_string(),
            video_bitrate_kbps: 8000,
            audio_bitrate_kbps: 192,
            keyframe_interval: 30,
            pcm: PcmFormat::default(),
        }
    }
}

impl ExportSettings {
    /// Check settings that would make the pipeline degenerate.
    pub fn check(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "output size must be non-zero, got {}x{}",
                self.width, self.height
            ));
        }
        if self.fps == 0 {
            return Err("fps must be non-zero".to_string());
        }
        if self.keyframe_interval == 0 {
            return Err("keyframe interval must be non-zero".to_string());
        }
        if self.pcm.sample_rate == 0 || self.pcm.channels == 0 {
            return Err("PCM format must have a sample rate and channels".to_string());
        }
        Ok(())
    }
}
