//! `video/x-fcv1`: lossless RGBA frames as keyframes or XOR deltas.
//!
//! Payload byte 0 is the frame kind, the rest is run-length coded pixel
//! data. A keyframe carries the frame itself; a delta carries the XOR
//! against the previously decoded frame. Codec configuration is width and
//! height as two u32 LE.

use std::collections::VecDeque;
use std::time::Duration;

use framecut_common::clock::FrameClock;
use framecut_common::{FramecutError, FramecutResult};

use super::{rle, Decoder, DecoderOutput, Encoder, EncoderOutput, VideoEncodeParams};
use crate::format::{Sample, TrackFormat, VideoFormat, VideoFrame, MIME_VIDEO_FCV1};

const KIND_DELTA: u8 = 0;
const KIND_KEY: u8 = 1;

/// Configuration bytes for a stream of `width` x `height`.
pub fn codec_config(width: u32, height: u32) -> Vec<u8> {
    let mut csd = Vec::with_capacity(8);
    csd.extend_from_slice(&width.to_le_bytes());
    csd.extend_from_slice(&height.to_le_bytes());
    csd
}

fn parse_codec_config(csd: &[u8]) -> Option<(u32, u32)> {
    if csd.len() != 8 {
        return None;
    }
    let width = u32::from_le_bytes([csd[0], csd[1], csd[2], csd[3]]);
    let height = u32::from_le_bytes([csd[4], csd[5], csd[6], csd[7]]);
    Some((width, height))
}

pub struct Fcv1Encoder {
    params: VideoEncodeParams,
    clock: FrameClock,
    frame_index: u64,
    previous: Option<Vec<u8>>,
    pending: VecDeque<VideoFrame>,
    format_reported: bool,
    input_ended: bool,
}

impl Fcv1Encoder {
    pub fn new(params: &VideoEncodeParams) -> FramecutResult<Self> {
        if params.width == 0 || params.height == 0 || params.frame_rate == 0 {
            return Err(FramecutError::codec(format!(
                "cannot encode {}x{}@{}",
                params.width, params.height, params.frame_rate
            )));
        }
        Ok(Self {
            params: params.clone(),
            clock: FrameClock::new(params.frame_rate),
            frame_index: 0,
            previous: None,
            pending: VecDeque::new(),
            format_reported: false,
            input_ended: false,
        })
    }

    fn output_format(&self) -> TrackFormat {
        TrackFormat::Video(VideoFormat {
            codec: MIME_VIDEO_FCV1.to_string(),
            width: self.params.width,
            height: self.params.height,
            frame_rate: self.params.frame_rate,
            bitrate_kbps: self.params.bitrate_kbps,
            codec_config: codec_config(self.params.width, self.params.height),
        })
    }

    fn encode_frame(&mut self, frame: VideoFrame) -> Sample {
        let keyframe_interval = self.params.keyframe_interval.max(1) as u64;
        let is_sync = self.previous.is_none() || self.frame_index % keyframe_interval == 0;

        let mut payload = Vec::with_capacity(frame.data.len() / 8 + 1);
        match &self.previous {
            Some(previous) if !is_sync => {
                let delta: Vec<u8> = frame
                    .data
                    .iter()
                    .zip(previous.iter())
                    .map(|(a, b)| a ^ b)
                    .collect();
                payload.push(KIND_DELTA);
                payload.extend(rle::encode(&delta));
            }
            _ => {
                payload.push(KIND_KEY);
                payload.extend(rle::encode(&frame.data));
            }
        }

        let duration_us = self.clock.tick_duration_us(self.frame_index) as u32;
        self.frame_index += 1;
        self.previous = Some(frame.data);

        Sample {
            data: payload,
            pts_us: frame.pts_us,
            duration_us,
            is_sync,
        }
    }
}

impl Encoder for Fcv1Encoder {
    type Input = VideoFrame;

    fn name(&self) -> &str {
        "fcv1-encoder"
    }

    fn queue_input(&mut self, frame: VideoFrame) -> FramecutResult<()> {
        if self.input_ended {
            return Err(FramecutError::codec("frame queued after end of input"));
        }
        if frame.width != self.params.width
            || frame.height != self.params.height
            || frame.data.len() != VideoFrame::expected_len(frame.width, frame.height)
        {
            return Err(FramecutError::codec(format!(
                "frame is {}x{} ({} bytes), encoder expects {}x{}",
                frame.width,
                frame.height,
                frame.data.len(),
                self.params.width,
                self.params.height
            )));
        }
        self.pending.push_back(frame);
        Ok(())
    }

    fn signal_end_of_input(&mut self) {
        self.input_ended = true;
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> FramecutResult<EncoderOutput> {
        if !self.format_reported && !self.pending.is_empty() {
            self.format_reported = true;
            return Ok(EncoderOutput::FormatChanged(self.output_format()));
        }
        if let Some(frame) = self.pending.pop_front() {
            return Ok(EncoderOutput::Packet(self.encode_frame(frame)));
        }
        if self.input_ended {
            return Ok(EncoderOutput::EndOfStream);
        }
        Ok(EncoderOutput::TryAgainLater)
    }
}

/// Decoder holding `depth` samples before emitting, like a hardware
/// pipeline.
pub struct Fcv1Decoder {
    width: u32,
    height: u32,
    depth: usize,
    pending: VecDeque<Sample>,
    reference: Option<Vec<u8>>,
    input_ended: bool,
}

impl Fcv1Decoder {
    pub fn new(format: &VideoFormat, depth: usize) -> FramecutResult<Self> {
        match parse_codec_config(&format.codec_config) {
            Some((w, h)) if w == format.width && h == format.height && w > 0 && h > 0 => {}
            _ => {
                return Err(FramecutError::codec(format!(
                    "invalid fcv1 configuration for {}x{} stream",
                    format.width, format.height
                )))
            }
        }
        Ok(Self {
            width: format.width,
            height: format.height,
            depth,
            pending: VecDeque::new(),
            reference: None,
            input_ended: false,
        })
    }

    fn decode(&mut self, sample: Sample) -> FramecutResult<Option<VideoFrame>> {
        let (&kind, body) = sample
            .data
            .split_first()
            .ok_or_else(|| FramecutError::codec("empty fcv1 sample"))?;
        let expected = VideoFrame::expected_len(self.width, self.height);
        let pixels = rle::decode(body, expected).map_err(FramecutError::codec)?;

        let data = match (kind, self.reference.take()) {
            (KIND_KEY, _) => pixels,
            (KIND_DELTA, Some(mut reference)) => {
                for (r, d) in reference.iter_mut().zip(pixels.iter()) {
                    *r ^= d;
                }
                reference
            }
            (KIND_DELTA, None) => {
                tracing::debug!(pts_us = sample.pts_us, "Dropping delta frame without reference");
                return Ok(None);
            }
            (other, _) => {
                return Err(FramecutError::codec(format!(
                    "unknown fcv1 frame kind {}",
                    other
                )))
            }
        };

        self.reference = Some(data.clone());
        Ok(Some(VideoFrame {
            width: self.width,
            height: self.height,
            pts_us: sample.pts_us,
            data,
        }))
    }
}

impl Decoder for Fcv1Decoder {
    type Output = VideoFrame;

    fn name(&self) -> &str {
        "fcv1-decoder"
    }

    fn queue_input(&mut self, sample: Sample) -> FramecutResult<()> {
        if self.input_ended {
            return Err(FramecutError::codec("sample queued after end of input"));
        }
        self.pending.push_back(sample);
        Ok(())
    }

    fn signal_end_of_input(&mut self) {
        self.input_ended = true;
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> FramecutResult<DecoderOutput<VideoFrame>> {
        loop {
            let ready = self.pending.len() > self.depth
                || (self.input_ended && !self.pending.is_empty());
            if !ready {
                break;
            }
            if let Some(sample) = self.pending.pop_front() {
                if let Some(frame) = self.decode(sample)? {
                    return Ok(DecoderOutput::Frame(frame));
                }
            }
        }

        if self.input_ended {
            Ok(DecoderOutput::EndOfStream)
        } else {
            Ok(DecoderOutput::TryAgainLater)
        }
    }

    fn flush(&mut self) {
        self.pending.clear();
        self.reference = None;
        self.input_ended = false;
    }
}
