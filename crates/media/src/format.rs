//! Track formats, compressed samples, and decoded buffers.

use serde::{Deserialize, Serialize};

/// Built-in keyframe/delta RGBA video codec.
pub const MIME_VIDEO_FCV1: &str = "video/x-fcv1";
/// Built-in delta-coded PCM audio codec.
pub const MIME_AUDIO_FCA1: &str = "audio/x-fca1";
/// Interleaved s16le PCM, stored uncompressed.
pub const MIME_AUDIO_RAW: &str = "audio/raw";

/// Elementary stream media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Video => f.write_str("video"),
            TrackKind::Audio => f.write_str("audio"),
        }
    }
}

/// Format of a compressed video track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFormat {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    #[serde(default)]
    pub bitrate_kbps: u32,
    /// Codec-specific configuration bytes, known once the encoder has
    /// produced its output format.
    #[serde(default)]
    pub codec_config: Vec<u8>,
}

/// Format of a compressed audio track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u16,
    #[serde(default)]
    pub bitrate_kbps: u32,
    #[serde(default)]
    pub codec_config: Vec<u8>,
}

/// Format of one elementary stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TrackFormat {
    Video(VideoFormat),
    Audio(AudioFormat),
}

impl TrackFormat {
    pub fn kind(&self) -> TrackKind {
        match self {
            TrackFormat::Video(_) => TrackKind::Video,
            TrackFormat::Audio(_) => TrackKind::Audio,
        }
    }

    pub fn codec(&self) -> &str {
        match self {
            TrackFormat::Video(format) => &format.codec,
            TrackFormat::Audio(format) => &format.codec,
        }
    }

    pub fn codec_config(&self) -> &[u8] {
        match self {
            TrackFormat::Video(format) => &format.codec_config,
            TrackFormat::Audio(format) => &format.codec_config,
        }
    }
}

/// One compressed access unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub data: Vec<u8>,
    pub pts_us: i64,
    pub duration_us: u32,
    /// Decodable without any earlier sample.
    pub is_sync: bool,
}

/// A decoded RGBA frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub pts_us: i64,
    /// Tightly packed RGBA, `width * height * 4` bytes.
    pub data: Vec<u8>,
}

impl VideoFrame {
    /// A frame filled with one color.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4], pts_us: i64) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 4);
        for _ in 0..pixels {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            pts_us,
            data,
        }
    }

    /// Expected byte length for this frame's dimensions.
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }

    /// Pixel at `(x, y)`. Panics when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ]
    }

    pub fn pts_ms(&self) -> u64 {
        framecut_common::clock::us_to_ms(self.pts_us)
    }
}

/// A block of decoded interleaved s16 PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmChunk {
    pub pts_us: i64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl PcmChunk {
    /// Sample frames in this chunk.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_format_tagged_serialization() {
        let format = TrackFormat::Audio(AudioFormat {
            codec: MIME_AUDIO_FCA1.to_string(),
            sample_rate: 48_000,
            channels: 2,
            bitrate_kbps: 192,
            codec_config: vec![1, 2, 3],
        });
        let json = serde_json::to_string(&format).unwrap();
        assert!(json.contains("\"kind\":\"audio\""));
        let parsed: TrackFormat = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, format);
        assert_eq!(parsed.kind(), TrackKind::Audio);
    }

    #[test]
    fn test_filled_frame_pixels() {
        let frame = VideoFrame::filled(4, 2, [10, 20, 30, 255], 0);
        assert_eq!(frame.data.len(), VideoFrame::expected_len(4, 2));
        assert_eq!(frame.pixel(3, 1), [10, 20, 30, 255]);
    }
}
