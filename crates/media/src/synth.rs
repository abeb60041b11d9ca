//! Synthetic test media.
//!
//! Video frames stamp their own index into the first pixel so decoded output
//! can be traced back to the source frame; audio is a constant level or a
//! sine tone.

use std::path::Path;
use std::time::Duration;

use framecut_common::clock::FrameClock;
use framecut_common::{FramecutError, FramecutResult};
use framecut_timeline::PcmFormat;

use crate::codec::fca1::Fca1Encoder;
use crate::codec::fcv1::Fcv1Encoder;
use crate::codec::{AudioEncodeParams, Encoder, EncoderOutput, VideoEncodeParams};
use crate::container::ContainerWriter;
use crate::demux::{MediaDemuxer, MediaInfo};
use crate::format::{
    PcmChunk, Sample, TrackFormat, VideoFrame, MIME_AUDIO_FCA1, MIME_AUDIO_RAW, MIME_VIDEO_FCV1,
};

const AUDIO_CHUNK_FRAMES: u64 = 4096;

#[derive(Debug, Clone, PartialEq)]
pub struct SynthVideo {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub duration_ms: u64,
    pub keyframe_interval: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    Constant(i16),
    Sine { frequency_hz: f32, amplitude: i16 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_ms: u64,
    pub waveform: Waveform,
    /// `audio/x-fca1` or `audio/raw`.
    pub codec: String,
}

/// Tracks to generate. At least one must be present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthSpec {
    pub video: Option<SynthVideo>,
    pub audio: Option<SynthAudio>,
}

/// Frame `index` of a synthetic stream.
pub fn synth_frame(video: &SynthVideo, index: u64, pts_us: i64) -> VideoFrame {
    let mut data = Vec::with_capacity(VideoFrame::expected_len(video.width, video.height));
    for y in 0..video.height {
        for x in 0..video.width {
            data.extend_from_slice(&[
                (x as u64 * 4 + index) as u8,
                (y * 4) as u8,
                (index * 2) as u8,
                255,
            ]);
        }
    }
    let stamp = (index as u32).to_le_bytes();
    data[..3].copy_from_slice(&stamp[..3]);

    VideoFrame {
        width: video.width,
        height: video.height,
        pts_us,
        data,
    }
}

/// The index stamped by [`synth_frame`].
pub fn frame_index_of(frame: &VideoFrame) -> u32 {
    u32::from_le_bytes([frame.data[0], frame.data[1], frame.data[2], 0])
}

fn waveform_value(waveform: Waveform, frame: u64, sample_rate: u32) -> i16 {
    match waveform {
        Waveform::Constant(level) => level,
        Waveform::Sine {
            frequency_hz,
            amplitude,
        } => {
            let t = frame as f64 / sample_rate as f64;
            (amplitude as f64 * (std::f64::consts::TAU * frequency_hz as f64 * t).sin()).round()
                as i16
        }
    }
}

/// Poll `encoder` until it stalls, or until end of stream when `to_end`.
fn drain_encoder<E>(
    encoder: &mut E,
    format: &mut Option<TrackFormat>,
    packets: &mut Vec<Sample>,
    to_end: bool,
) -> FramecutResult<()>
where
    E: Encoder + ?Sized,
{
    loop {
        match encoder.dequeue_output(Duration::ZERO)? {
            EncoderOutput::FormatChanged(f) => *format = Some(f),
            EncoderOutput::Packet(p) => packets.push(p),
            EncoderOutput::EndOfStream => return Ok(()),
            EncoderOutput::TryAgainLater if to_end => {
                return Err(FramecutError::codec(format!(
                    "{} stalled before end of stream",
                    encoder.name()
                )))
            }
            EncoderOutput::TryAgainLater => return Ok(()),
        }
    }
}

fn encode_video(video: &SynthVideo) -> FramecutResult<(TrackFormat, Vec<Sample>)> {
    let clock = FrameClock::new(video.fps);
    let mut encoder = Fcv1Encoder::new(&VideoEncodeParams {
        codec: MIME_VIDEO_FCV1.to_string(),
        width: video.width,
        height: video.height,
        frame_rate: video.fps,
        bitrate_kbps: 0,
        keyframe_interval: video.keyframe_interval,
    })?;

    let mut format = None;
    let mut packets = Vec::new();
    for index in 0..clock.tick_count(video.duration_ms) {
        encoder.queue_input(synth_frame(video, index, clock.tick_time_us(index)))?;
        drain_encoder(&mut encoder, &mut format, &mut packets, false)?;
    }
    encoder.signal_end_of_input();
    drain_encoder(&mut encoder, &mut format, &mut packets, true)?;

    let format = format.ok_or_else(|| FramecutError::codec("synthetic video has no frames"))?;
    Ok((format, packets))
}

fn encode_audio(audio: &SynthAudio) -> FramecutResult<(TrackFormat, Vec<Sample>)> {
    let params = AudioEncodeParams {
        codec: audio.codec.clone(),
        sample_rate: audio.sample_rate,
        channels: audio.channels,
        bitrate_kbps: 0,
    };
    let mut encoder = match audio.codec.as_str() {
        MIME_AUDIO_FCA1 => Fca1Encoder::new(&params)?,
        MIME_AUDIO_RAW => Fca1Encoder::raw(&params)?,
        other => {
            return Err(FramecutError::unsupported(format!(
                "cannot synthesize {} audio",
                other
            )))
        }
    };

    let pcm = PcmFormat {
        sample_rate: audio.sample_rate,
        channels: audio.channels,
    };
    let total_frames = pcm.frames_for_ms(audio.duration_ms);
    let mut format = None;
    let mut packets = Vec::new();
    let mut frame = 0;
    while frame < total_frames {
        let count = AUDIO_CHUNK_FRAMES.min(total_frames - frame);
        let mut samples = Vec::with_capacity((count * audio.channels as u64) as usize);
        for f in frame..frame + count {
            let value = waveform_value(audio.waveform, f, audio.sample_rate);
            samples.extend(std::iter::repeat(value).take(audio.channels as usize));
        }
        encoder.queue_input(PcmChunk {
            pts_us: pcm.frames_to_us(frame),
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            samples,
        })?;
        drain_encoder(&mut encoder, &mut format, &mut packets, false)?;
        frame += count;
    }
    encoder.signal_end_of_input();
    drain_encoder(&mut encoder, &mut format, &mut packets, true)?;

    let format = format.ok_or_else(|| FramecutError::codec("synthetic audio has no samples"))?;
    Ok((format, packets))
}

/// Write a synthetic media file to `path` and return its probe info.
pub fn write_synthetic(path: impl AsRef<Path>, spec: &SynthSpec) -> FramecutResult<MediaInfo> {
    let path = path.as_ref();
    if spec.video.is_none() && spec.audio.is_none() {
        return Err(FramecutError::unsupported("synthetic media needs a track"));
    }

    let mut streams = Vec::new();
    if let Some(video) = &spec.video {
        streams.push(encode_video(video)?);
    }
    if let Some(audio) = &spec.audio {
        streams.push(encode_audio(audio)?);
    }

    let mut writer = ContainerWriter::create(path)?;
    let mut tracks = Vec::with_capacity(streams.len());
    for (format, _) in &streams {
        tracks.push(writer.add_track(format.clone())?);
    }
    writer.start()?;
    for (track, (_, packets)) in tracks.into_iter().zip(&streams) {
        for packet in packets {
            writer.write_sample(track, packet)?;
        }
    }
    writer.finish()?;

    let info = MediaDemuxer::open(path)?.info();
    tracing::info!(
        path = %path.display(),
        duration_ms = info.duration_ms,
        "Wrote synthetic media"
    );
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecRegistry;
    use crate::codec::DecoderOutput;
    use crate::demux::SampleRead;
    use crate::format::TrackKind;

    fn video(duration_ms: u64) -> SynthVideo {
        SynthVideo {
            width: 8,
            height: 6,
            fps: 10,
            duration_ms,
            keyframe_interval: 5,
        }
    }

    #[test]
    fn test_frame_index_stamp() {
        let frame = synth_frame(&video(1000), 70_000, 0);
        assert_eq!(frame_index_of(&frame), 70_000);
        assert_eq!(frame.pixel(0, 0)[3], 255);
    }

    #[test]
    fn test_synthetic_file_probes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synth.fcm");
        let info = write_synthetic(
            &path,
            &SynthSpec {
                video: Some(video(2000)),
                audio: Some(SynthAudio {
                    sample_rate: 8_000,
                    channels: 1,
                    duration_ms: 2000,
                    waveform: Waveform::Sine {
                        frequency_hz: 440.0,
                        amplitude: 1000,
                    },
                    codec: MIME_AUDIO_FCA1.to_string(),
                }),
            },
        )
        .unwrap();

        assert_eq!(info.duration_ms, 2000);
        assert_eq!(info.video.as_ref().unwrap().sample_count, 20);
        assert_eq!(info.video.as_ref().unwrap().sync_sample_count, 4);
        assert_eq!(info.audio.as_ref().unwrap().format.channels, 1);
    }

    #[test]
    fn test_decoded_frames_carry_their_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synth.fcm");
        write_synthetic(
            &path,
            &SynthSpec {
                video: Some(video(1000)),
                audio: None,
            },
        )
        .unwrap();

        let mut demuxer = MediaDemuxer::open_track(&path, TrackKind::Video).unwrap();
        let format = match demuxer.selected_format().unwrap() {
            TrackFormat::Video(v) => v.clone(),
            TrackFormat::Audio(_) => panic!("expected video"),
        };
        let registry = CodecRegistry::default().with_pipeline_depth(0);
        let mut decoder = registry.create_video_decoder(&format, &path).unwrap();

        let mut indices = Vec::new();
        while let SampleRead::Sample(sample) = demuxer.read_next_sample().unwrap() {
            decoder.queue_input(sample).unwrap();
            if let DecoderOutput::Frame(frame) = decoder.dequeue_output(Duration::ZERO).unwrap() {
                indices.push(frame_index_of(&frame));
            }
        }
        assert_eq!(indices, (0..10).collect::<Vec<u32>>());
    }

    #[test]
    fn test_empty_spec_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_synthetic(dir.path().join("x.fcm"), &SynthSpec::default()).is_err());
    }
}
