//! Track encoding: pull raw input, push it through an encoder, write the
//! compressed stream to a single-track container.
//!
//! The container track cannot be created until the encoder reports its
//! output format, so any packet produced before that is held back and
//! flushed right after the track is added.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use framecut_common::{FramecutError, FramecutResult};
use framecut_media::codec::{AudioEncoderBox, VideoEncoderBox};
use framecut_media::{
    AudioEncodeParams, CodecHandle, CodecRegistry, ContainerWriter, Encoder, EncoderOutput,
    PcmChunk, Sample, VideoEncodeParams, VideoFrame,
};
use framecut_timeline::PcmFormat;

const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(10);

/// Frames per chunk when streaming PCM into an audio encoder.
pub const PCM_CHUNK_FRAMES: usize = 1024;

/// Supplies encoder input until it returns `None`.
pub trait EncoderSource: Send {
    type Item;

    fn next_input(&mut self) -> FramecutResult<Option<Self::Item>>;
}

/// Parameters that know which encoder to create.
pub trait EncodeParams {
    type Input;

    fn create_encoder(
        &self,
        registry: &CodecRegistry,
    ) -> FramecutResult<CodecHandle<Box<dyn Encoder<Input = Self::Input>>>>;
}

impl EncodeParams for VideoEncodeParams {
    type Input = VideoFrame;

    fn create_encoder(&self, registry: &CodecRegistry) -> FramecutResult<CodecHandle<VideoEncoderBox>> {
        registry.create_video_encoder(self)
    }
}

impl EncodeParams for AudioEncodeParams {
    type Input = PcmChunk;

    fn create_encoder(&self, registry: &CodecRegistry) -> FramecutResult<CodecHandle<AudioEncoderBox>> {
        registry.create_audio_encoder(self)
    }
}

/// Totals of one encoded track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodeStats {
    pub inputs: u64,
    pub packets: u64,
    pub bytes: u64,
    /// End of the last packet.
    pub duration_us: i64,
}

/// Drives one encoder into one track file.
pub struct TrackEncodeEngine<I> {
    label: &'static str,
    target: Option<PathBuf>,
    encoder: Option<CodecHandle<Box<dyn Encoder<Input = I>>>>,
}

impl<I> TrackEncodeEngine<I> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            target: None,
            encoder: None,
        }
    }

    pub fn target(&self) -> Option<&Path> {
        self.target.as_deref()
    }

    /// Create the encoder for `params` and bind the output file.
    pub fn prepare<P>(
        &mut self,
        target: impl Into<PathBuf>,
        params: &P,
        registry: &CodecRegistry,
    ) -> FramecutResult<()>
    where
        P: EncodeParams<Input = I>,
    {
        let encoder = params.create_encoder(registry)?;
        self.prepare_with(target, encoder);
        Ok(())
    }

    /// Bind an already created encoder and the output file.
    pub fn prepare_with(
        &mut self,
        target: impl Into<PathBuf>,
        encoder: CodecHandle<Box<dyn Encoder<Input = I>>>,
    ) {
        self.target = Some(target.into());
        self.encoder = Some(encoder);
    }

    /// Encode everything `source` yields.
    ///
    /// The pull loop runs on the blocking pool. `on_packet` sees each
    /// packet as it is written. On cancellation the encoder still receives
    /// end of input, the partial track file is removed, and
    /// [`FramecutError::Cancelled`] is returned.
    pub async fn start<S, F>(
        &mut self,
        source: S,
        cancel: &CancellationToken,
        on_packet: F,
    ) -> FramecutResult<EncodeStats>
    where
        I: Send + 'static,
        S: EncoderSource<Item = I> + 'static,
        F: FnMut(&Sample) + Send + 'static,
    {
        let label = self.label;
        let target = self
            .target
            .clone()
            .ok_or_else(|| FramecutError::render(format!("{} encoder not prepared", label)))?;
        let encoder = self
            .encoder
            .take()
            .ok_or_else(|| FramecutError::render(format!("{} encoder not prepared", label)))?;

        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            encode_track(label, &target, encoder, source, &cancel, on_packet)
        })
        .await
        .map_err(|e| FramecutError::render(format!("{} encode task failed: {}", label, e)))?
    }
}

fn encode_track<I, S, F>(
    label: &'static str,
    target: &Path,
    mut encoder: CodecHandle<Box<dyn Encoder<Input = I>>>,
    mut source: S,
    cancel: &CancellationToken,
    mut on_packet: F,
) -> FramecutResult<EncodeStats>
where
    S: EncoderSource<Item = I>,
    F: FnMut(&Sample),
{
    tracing::debug!(track = label, encoder = encoder.name(), target = %target.display(), "Encoding track");

    let mut writer: Option<(ContainerWriter, usize)> = None;
    let mut held: Vec<Sample> = Vec::new();
    let mut stats = EncodeStats::default();
    let mut input_done = false;

    loop {
        if cancel.is_cancelled() {
            encoder.signal_end_of_input();
            drop(writer);
            encoder.release();
            let _ = std::fs::remove_file(target);
            tracing::debug!(track = label, "Track encode cancelled");
            return Err(FramecutError::Cancelled);
        }

        if !input_done {
            match source.next_input()? {
                Some(input) => {
                    encoder.queue_input(input)?;
                    stats.inputs += 1;
                }
                None => {
                    encoder.signal_end_of_input();
                    input_done = true;
                }
            }
        }

        loop {
            match encoder.dequeue_output(DEQUEUE_TIMEOUT)? {
                EncoderOutput::FormatChanged(format) => {
                    if writer.is_some() {
                        return Err(FramecutError::codec(format!(
                            "{} encoder changed format mid-stream",
                            label
                        )));
                    }
                    let mut container = ContainerWriter::create(target)?;
                    let track = container.add_track(format)?;
                    container.start()?;
                    for packet in held.drain(..) {
                        container.write_sample(track, &packet)?;
                        on_packet(&packet);
                    }
                    writer = Some((container, track));
                }
                EncoderOutput::Packet(packet) => {
                    stats.packets += 1;
                    stats.bytes += packet.data.len() as u64;
                    stats.duration_us = stats
                        .duration_us
                        .max(packet.pts_us + packet.duration_us as i64);
                    match writer.as_mut() {
                        Some((container, track)) => {
                            container.write_sample(*track, &packet)?;
                            on_packet(&packet);
                        }
                        None => held.push(packet),
                    }
                }
                EncoderOutput::TryAgainLater => break,
                EncoderOutput::EndOfStream => {
                    let (container, _) = writer.ok_or_else(|| {
                        FramecutError::codec(format!(
                            "{} encoder ended without reporting a format",
                            label
                        ))
                    })?;
                    container.finish()?;
                    encoder.release();
                    tracing::debug!(
                        track = label,
                        packets = stats.packets,
                        duration_us = stats.duration_us,
                        "Track encoded"
                    );
                    return Ok(stats);
                }
            }
        }
    }
}

/// Streams a raw PCM file as [`PcmChunk`]s.
pub struct PcmFileSource {
    reader: BufReader<File>,
    format: PcmFormat,
    frames_read: u64,
    chunk_frames: usize,
}

impl PcmFileSource {
    pub fn open(path: impl AsRef<Path>, format: PcmFormat) -> FramecutResult<Self> {
        Ok(Self {
            reader: BufReader::new(File::open(path)?),
            format,
            frames_read: 0,
            chunk_frames: PCM_CHUNK_FRAMES,
        })
    }
}

impl EncoderSource for PcmFileSource {
    type Item = PcmChunk;

    fn next_input(&mut self) -> FramecutResult<Option<PcmChunk>> {
        let bpf = self.format.bytes_per_frame();
        let mut bytes = Vec::with_capacity(self.chunk_frames * bpf);
        (&mut self.reader)
            .take((self.chunk_frames * bpf) as u64)
            .read_to_end(&mut bytes)?;
        bytes.truncate(bytes.len() / bpf * bpf);
        if bytes.is_empty() {
            return Ok(None);
        }

        let pts_us = self.format.frames_to_us(self.frames_read);
        self.frames_read += (bytes.len() / bpf) as u64;
        Ok(Some(PcmChunk {
            pts_us,
            sample_rate: self.format.sample_rate,
            channels: self.format.channels,
            samples: framecut_media::convert::bytes_to_samples(&bytes),
        }))
    }
}
