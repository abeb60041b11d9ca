//! Keyframe-aware frame decoding for one video source.
//!
//! [`FrameDecodeEngine::advance_to`] is a pull-based state machine over a
//! demuxer and a decoder. Sequential requests scan forward without ever
//! seeking. Moving backward replays from the previous sync sample. A far
//! forward jump is detected when a sync sample older than the target shows
//! up while a newer sync sample still lies at or before the target; the
//! engine then seeks once, directly to that newer sync point.

use std::path::{Path, PathBuf};
use std::time::Duration;

use framecut_common::clock::{ms_to_us, us_to_ms};
use framecut_common::{FramecutError, FramecutResult};
use framecut_media::codec::VideoDecoderBox;
use framecut_media::{
    CodecHandle, CodecRegistry, DecoderOutput, MediaDemuxer, SampleRead, SeekMode, TrackFormat,
    TrackKind, VideoFrame,
};

const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(10);

/// Outcome of one [`FrameDecodeEngine::advance_to`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceResult {
    /// A frame at or after the target is available.
    pub delivered: bool,
    /// The current frame changed during this call.
    pub is_new_frame: bool,
}

impl AdvanceResult {
    const NOT_DELIVERED: Self = Self {
        delivered: false,
        is_new_frame: false,
    };
}

/// Owns one demuxer and one decoder instance.
///
/// Not shareable: exactly one caller drives `advance_to` at a time.
pub struct FrameDecodeEngine {
    source: PathBuf,
    demuxer: MediaDemuxer,
    decoder: CodecHandle<VideoDecoderBox>,
    duration_ms: u64,
    frame_step_us: i64,
    current: Option<VideoFrame>,
    latest_decoded_us: Option<i64>,
    previous_requested_ms: Option<u64>,
    input_exhausted: bool,
}

impl FrameDecodeEngine {
    /// Open the video track of `path` and lease a decoder for it.
    pub fn open(path: impl AsRef<Path>, registry: &CodecRegistry) -> FramecutResult<Self> {
        let path = path.as_ref();
        let demuxer = MediaDemuxer::open_track(path, TrackKind::Video)?;
        let format = match demuxer.selected_format() {
            Some(TrackFormat::Video(format)) => format.clone(),
            _ => return Err(FramecutError::source_unreadable(path, "no video track")),
        };
        let decoder = registry.create_video_decoder(&format, path)?;
        Self::new(demuxer, decoder)
    }

    /// Bind an already opened demuxer (video track selected) to a decoder.
    pub fn new(demuxer: MediaDemuxer, decoder: CodecHandle<VideoDecoderBox>) -> FramecutResult<Self> {
        let source = demuxer.path().to_path_buf();
        let info = demuxer.info();
        let video = info
            .video
            .ok_or_else(|| FramecutError::source_unreadable(&source, "no video track"))?;
        let frame_step_us = 1_000_000 / video.format.frame_rate.max(1) as i64;

        tracing::debug!(
            source = %source.display(),
            decoder = decoder.name(),
            duration_us = video.duration_us,
            "Frame decode engine ready"
        );

        Ok(Self {
            source,
            demuxer,
            decoder,
            duration_ms: us_to_ms(video.duration_us),
            frame_step_us,
            current: None,
            latest_decoded_us: None,
            previous_requested_ms: None,
            input_exhausted: false,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// The most recently decoded frame.
    pub fn current_frame(&self) -> Option<&VideoFrame> {
        self.current.as_ref()
    }

    /// Seeks issued to the demuxer so far.
    pub fn seek_count(&self) -> u64 {
        self.demuxer.seek_count()
    }

    /// Make a frame with presentation time at or after `target_ms` current.
    pub fn advance_to(&mut self, target_ms: u64) -> FramecutResult<AdvanceResult> {
        let moved_backward = self
            .previous_requested_ms
            .is_some_and(|previous| target_ms < previous);
        self.previous_requested_ms = Some(target_ms);

        if target_ms > self.duration_ms {
            return Ok(AdvanceResult::NOT_DELIVERED);
        }
        let target_us = ms_to_us(target_ms);

        if moved_backward {
            tracing::debug!(
                source = %self.source.display(),
                target_ms,
                "Backward seek"
            );
            self.seek_and_flush(target_us)?;
            return self.decode_until(target_us, false);
        }

        if let (Some(latest), Some(_)) = (self.latest_decoded_us, &self.current) {
            // Inclusive: a request for exactly the current frame's pts reuses it.
            if target_us <= latest {
                return Ok(AdvanceResult {
                    delivered: true,
                    is_new_frame: false,
                });
            }
        }

        self.decode_until(target_us, true)
    }

    fn seek_and_flush(&mut self, target_us: i64) -> FramecutResult<()> {
        self.demuxer.seek(target_us, SeekMode::PreviousSync)?;
        self.decoder.flush();
        self.input_exhausted = false;
        self.latest_decoded_us = None;
        Ok(())
    }

    /// Feed and drain until a frame at or after `target_us` comes out.
    /// With `allow_correction`, at most one seek may skip ahead.
    fn decode_until(&mut self, target_us: i64, allow_correction: bool) -> FramecutResult<AdvanceResult> {
        let mut may_correct = allow_correction;

        loop {
            match self.decoder.dequeue_output(DEQUEUE_TIMEOUT)? {
                DecoderOutput::Frame(frame) => {
                    let satisfied = frame.pts_us >= target_us;
                    self.latest_decoded_us = Some(frame.pts_us);
                    self.current = Some(frame);
                    if satisfied {
                        return Ok(AdvanceResult {
                            delivered: true,
                            is_new_frame: true,
                        });
                    }
                    continue;
                }
                DecoderOutput::EndOfStream => {
                    tracing::trace!(
                        source = %self.source.display(),
                        target_us,
                        "End of stream before target"
                    );
                    return Ok(AdvanceResult::NOT_DELIVERED);
                }
                DecoderOutput::TryAgainLater => {}
            }

            if self.input_exhausted {
                return Err(FramecutError::codec(format!(
                    "{} stalled after end of input",
                    self.decoder.name()
                )));
            }

            match self.demuxer.read_next_sample()? {
                SampleRead::Sample(sample) => {
                    if may_correct
                        && sample.is_sync
                        && sample.pts_us < target_us - self.frame_step_us
                    {
                        let nearer = self
                            .demuxer
                            .previous_sync_us(target_us)
                            .filter(|&sync| sync > sample.pts_us);
                        if let Some(sync_us) = nearer {
                            tracing::debug!(
                                source = %self.source.display(),
                                from_us = sample.pts_us,
                                sync_us,
                                target_us,
                                "Corrective seek"
                            );
                            may_correct = false;
                            self.seek_and_flush(target_us)?;
                            continue;
                        }
                    }
                    self.decoder.queue_input(sample)?;
                }
                SampleRead::EndOfStream => {
                    self.decoder.signal_end_of_input();
                    self.input_exhausted = true;
                }
            }
        }
    }

    /// Tear down the decoder and return its codec instance.
    pub fn release(self) {
        tracing::debug!(source = %self.source.display(), "Releasing frame decoder");
        self.decoder.release();
    }
}
