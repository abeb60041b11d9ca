//! Codec interfaces and the registry that creates codecs by MIME type.
//!
//! Both directions use a queue/dequeue contract: input is queued, output
//! is polled with a timeout and may not be available yet. Decoders may
//! hold several samples before producing the first frame. Encoders report
//! their output format once, after the first input, before any packet.

pub mod fca1;
pub mod fcv1;
pub mod pool;
pub mod rle;

use std::path::Path;
use std::time::Duration;

use framecut_common::config::CodecLimits;
use framecut_common::{FramecutError, FramecutResult};

use crate::format::{
    AudioFormat, PcmChunk, Sample, TrackFormat, VideoFormat, VideoFrame, MIME_AUDIO_FCA1,
    MIME_AUDIO_RAW, MIME_VIDEO_FCV1,
};

pub use pool::{CodecHandle, CodecLease, HardwareCodecPool};

/// One poll of a decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderOutput<T> {
    Frame(T),
    /// Nothing ready yet; queue more input or poll again.
    TryAgainLater,
    /// End of input has been signalled and every frame delivered.
    EndOfStream,
}

/// Decompresses samples of one track.
pub trait Decoder: Send {
    type Output;

    fn name(&self) -> &str;

    /// Hand one compressed sample to the decoder.
    fn queue_input(&mut self, sample: Sample) -> FramecutResult<()>;

    /// No more input follows; remaining frames drain, then
    /// [`DecoderOutput::EndOfStream`].
    fn signal_end_of_input(&mut self);

    /// Poll for a decoded frame, waiting at most `timeout`.
    fn dequeue_output(&mut self, timeout: Duration) -> FramecutResult<DecoderOutput<Self::Output>>;

    /// Drop every pending sample and any reference state. Required after
    /// the demuxer has been repositioned.
    fn flush(&mut self);
}

/// One poll of an encoder.
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderOutput {
    /// The output track format, reported exactly once before any packet.
    FormatChanged(TrackFormat),
    Packet(Sample),
    TryAgainLater,
    EndOfStream,
}

/// Compresses raw frames of one track.
pub trait Encoder: Send {
    type Input;

    fn name(&self) -> &str;

    fn queue_input(&mut self, input: Self::Input) -> FramecutResult<()>;

    fn signal_end_of_input(&mut self);

    fn dequeue_output(&mut self, timeout: Duration) -> FramecutResult<EncoderOutput>;
}

pub type VideoDecoderBox = Box<dyn Decoder<Output = VideoFrame>>;
pub type AudioDecoderBox = Box<dyn Decoder<Output = PcmChunk>>;
pub type VideoEncoderBox = Box<dyn Encoder<Input = VideoFrame>>;
pub type AudioEncoderBox = Box<dyn Encoder<Input = PcmChunk>>;

/// Requested video encoder configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoEncodeParams {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub bitrate_kbps: u32,
    pub keyframe_interval: u32,
}

/// Requested audio encoder configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioEncodeParams {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate_kbps: u32,
}

/// Creates codecs by MIME type, charging hardware-backed ones to a shared
/// [`HardwareCodecPool`].
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    pool: HardwareCodecPool,
    pipeline_depth: usize,
}

impl CodecRegistry {
    pub fn new(pool: HardwareCodecPool) -> Self {
        Self {
            pool,
            pipeline_depth: 0,
        }
    }

    pub fn from_limits(limits: &CodecLimits) -> Self {
        Self::new(HardwareCodecPool::new(limits.max_hardware_instances))
            .with_pipeline_depth(limits.decoder_pipeline_depth)
    }

    /// Samples a video decoder holds before emitting its first frame.
    pub fn with_pipeline_depth(mut self, depth: usize) -> Self {
        self.pipeline_depth = depth;
        self
    }

    pub fn pool(&self) -> &HardwareCodecPool {
        &self.pool
    }

    pub fn supports_decoding(codec: &str) -> bool {
        matches!(codec, MIME_VIDEO_FCV1 | MIME_AUDIO_FCA1 | MIME_AUDIO_RAW)
    }

    /// Decoder for a video track of `source`.
    pub fn create_video_decoder(
        &self,
        format: &VideoFormat,
        source: &Path,
    ) -> FramecutResult<CodecHandle<VideoDecoderBox>> {
        if format.codec != MIME_VIDEO_FCV1 {
            return Err(FramecutError::source_unreadable(
                source,
                format!("no decoder for {}", format.codec),
            ));
        }
        let lease = self.pool.acquire("video decoder")?;
        let decoder = fcv1::Fcv1Decoder::new(format, self.pipeline_depth)
            .map_err(|e| FramecutError::source_unreadable(source, e.to_string()))?;
        Ok(CodecHandle::new(Box::new(decoder), lease))
    }

    /// Decoder for an audio track of `source`.
    pub fn create_audio_decoder(
        &self,
        format: &AudioFormat,
        source: &Path,
    ) -> FramecutResult<CodecHandle<AudioDecoderBox>> {
        match format.codec.as_str() {
            MIME_AUDIO_FCA1 => {
                let lease = self.pool.acquire("audio decoder")?;
                let decoder = fca1::Fca1Decoder::new(format)
                    .map_err(|e| FramecutError::source_unreadable(source, e.to_string()))?;
                Ok(CodecHandle::new(Box::new(decoder), lease))
            }
            // Raw PCM needs no codec instance.
            MIME_AUDIO_RAW => Ok(CodecHandle::unpooled(Box::new(fca1::RawPcmDecoder::new(
                format,
            )))),
            other => Err(FramecutError::source_unreadable(
                source,
                format!("no decoder for {}", other),
            )),
        }
    }

    pub fn create_video_encoder(
        &self,
        params: &VideoEncodeParams,
    ) -> FramecutResult<CodecHandle<VideoEncoderBox>> {
        if params.codec != MIME_VIDEO_FCV1 {
            return Err(FramecutError::unsupported(format!(
                "no video encoder for {}",
                params.codec
            )));
        }
        let encoder = fcv1::Fcv1Encoder::new(params)?;
        let lease = self.pool.acquire("video encoder")?;
        Ok(CodecHandle::new(Box::new(encoder), lease))
    }

    pub fn create_audio_encoder(
        &self,
        params: &AudioEncodeParams,
    ) -> FramecutResult<CodecHandle<AudioEncoderBox>> {
        match params.codec.as_str() {
            MIME_AUDIO_FCA1 => {
                let encoder = fca1::Fca1Encoder::new(params)?;
                let lease = self.pool.acquire("audio encoder")?;
                Ok(CodecHandle::new(Box::new(encoder), lease))
            }
            MIME_AUDIO_RAW => Ok(CodecHandle::unpooled(Box::new(
                fca1::Fca1Encoder::raw(params)?,
            ))),
            other => Err(FramecutError::unsupported(format!(
                "no audio encoder for {}",
                other
            ))),
        }
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::from_limits(&CodecLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn video_format(codec: &str) -> VideoFormat {
        VideoFormat {
            codec: codec.to_string(),
            width: 4,
            height: 4,
            frame_rate: 30,
            bitrate_kbps: 0,
            codec_config: fcv1::codec_config(4, 4),
        }
    }

    #[test]
    fn test_unknown_decoder_is_unreadable_source() {
        let registry = CodecRegistry::new(HardwareCodecPool::new(4));
        let err = registry
            .create_video_decoder(&video_format("video/hevc"), &PathBuf::from("a.fcm"))
            .err()
            .unwrap();
        assert!(matches!(err, FramecutError::SourceUnreadable { .. }));
        assert_eq!(registry.pool().in_use(), 0);
    }

    #[test]
    fn test_unknown_encoder_is_unsupported() {
        let registry = CodecRegistry::new(HardwareCodecPool::new(4));
        let params = AudioEncodeParams {
            codec: "audio/opus".to_string(),
            sample_rate: 48_000,
            channels: 2,
            bitrate_kbps: 128,
        };
        let err = registry.create_audio_encoder(&params).err().unwrap();
        assert!(matches!(err, FramecutError::Unsupported { .. }));
    }

    #[test]
    fn test_decoders_count_against_pool() {
        let registry = CodecRegistry::new(HardwareCodecPool::new(1));
        let path = PathBuf::from("a.fcm");
        let first = registry
            .create_video_decoder(&video_format(MIME_VIDEO_FCV1), &path)
            .unwrap();
        let err = registry
            .create_video_decoder(&video_format(MIME_VIDEO_FCV1), &path)
            .err()
            .unwrap();
        assert!(matches!(err, FramecutError::DecoderExhausted { .. }));

        first.release();
        assert!(registry
            .create_video_decoder(&video_format(MIME_VIDEO_FCV1), &path)
            .is_ok());
    }

    #[test]
    fn test_raw_audio_is_unpooled() {
        let registry = CodecRegistry::new(HardwareCodecPool::new(0));
        let format = AudioFormat {
            codec: MIME_AUDIO_RAW.to_string(),
            sample_rate: 8_000,
            channels: 1,
            bitrate_kbps: 0,
            codec_config: Vec::new(),
        };
        let decoder = registry
            .create_audio_decoder(&format, &PathBuf::from("a.fcm"))
            .unwrap();
        assert!(!decoder.is_pooled());
    }
}
