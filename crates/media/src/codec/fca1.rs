//! `audio/x-fca1` and `audio/raw` PCM codecs.
//!
//! An fca1 packet is a u32 LE sample count followed by run-length coded
//! s16 LE deltas, each sample minus the same channel's previous sample.
//! Codec configuration is the sample rate (u32 LE) and channel count
//! (u16 LE). Raw packets are the interleaved samples themselves.

use std::collections::VecDeque;
use std::time::Duration;

use framecut_common::{FramecutError, FramecutResult};
use framecut_timeline::PcmFormat;

use super::{rle, AudioEncodeParams, Decoder, DecoderOutput, Encoder, EncoderOutput};
use crate::convert::{bytes_to_samples, samples_to_bytes};
use crate::format::{
    AudioFormat, PcmChunk, Sample, TrackFormat, MIME_AUDIO_FCA1, MIME_AUDIO_RAW,
};

/// Sample frames per encoded packet.
pub const FRAMES_PER_PACKET: usize = 1024;

pub fn codec_config(sample_rate: u32, channels: u16) -> Vec<u8> {
    let mut csd = Vec::with_capacity(6);
    csd.extend_from_slice(&sample_rate.to_le_bytes());
    csd.extend_from_slice(&channels.to_le_bytes());
    csd
}

fn parse_codec_config(csd: &[u8]) -> Option<(u32, u16)> {
    if csd.len() != 6 {
        return None;
    }
    Some((
        u32::from_le_bytes([csd[0], csd[1], csd[2], csd[3]]),
        u16::from_le_bytes([csd[4], csd[5]]),
    ))
}

fn encode_packet(samples: &[i16], channels: usize) -> Vec<u8> {
    let mut deltas = Vec::with_capacity(samples.len());
    for (i, &s) in samples.iter().enumerate() {
        let previous = if i >= channels { samples[i - channels] } else { 0 };
        deltas.push(s.wrapping_sub(previous));
    }
    let mut payload = Vec::with_capacity(samples.len() / 2 + 4);
    payload.extend_from_slice(&(samples.len() as u32).to_le_bytes());
    payload.extend(rle::encode(&samples_to_bytes(&deltas)));
    payload
}

fn decode_packet(data: &[u8], channels: usize) -> FramecutResult<Vec<i16>> {
    if data.len() < 4 {
        return Err(FramecutError::codec("fca1 packet shorter than its header"));
    }
    let count = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let bytes = rle::decode(&data[4..], count * 2).map_err(FramecutError::codec)?;
    let mut samples = bytes_to_samples(&bytes);
    for i in channels..samples.len() {
        samples[i] = samples[i].wrapping_add(samples[i - channels]);
    }
    Ok(samples)
}

/// Packetizes PCM into fca1 or raw samples of [`FRAMES_PER_PACKET`] frames.
pub struct Fca1Encoder {
    params: AudioEncodeParams,
    format: PcmFormat,
    raw: bool,
    buffer: Vec<i16>,
    base_pts_us: Option<i64>,
    frames_emitted: u64,
    format_reported: bool,
    input_ended: bool,
}

impl Fca1Encoder {
    pub fn new(params: &AudioEncodeParams) -> FramecutResult<Self> {
        Self::build(params, false)
    }

    /// Encoder producing uncompressed `audio/raw` packets.
    pub fn raw(params: &AudioEncodeParams) -> FramecutResult<Self> {
        Self::build(params, true)
    }

    fn build(params: &AudioEncodeParams, raw: bool) -> FramecutResult<Self> {
        if params.sample_rate == 0 || params.channels == 0 {
            return Err(FramecutError::codec(format!(
                "cannot encode {} Hz / {} channels",
                params.sample_rate, params.channels
            )));
        }
        Ok(Self {
            params: params.clone(),
            format: PcmFormat {
                sample_rate: params.sample_rate,
                channels: params.channels,
            },
            raw,
            buffer: Vec::new(),
            base_pts_us: None,
            frames_emitted: 0,
            format_reported: false,
            input_ended: false,
        })
    }

    fn output_format(&self) -> TrackFormat {
        let (codec, codec_config) = if self.raw {
            (MIME_AUDIO_RAW, Vec::new())
        } else {
            (
                MIME_AUDIO_FCA1,
                codec_config(self.params.sample_rate, self.params.channels),
            )
        };
        TrackFormat::Audio(AudioFormat {
            codec: codec.to_string(),
            sample_rate: self.params.sample_rate,
            channels: self.params.channels,
            bitrate_kbps: self.params.bitrate_kbps,
            codec_config,
        })
    }

    fn next_packet(&mut self, sample_count: usize) -> Sample {
        let channels = self.params.channels as usize;
        let samples: Vec<i16> = self.buffer.drain(..sample_count).collect();
        let frames = (sample_count / channels) as u64;

        let base = self.base_pts_us.unwrap_or(0);
        let pts_us = base + self.format.frames_to_us(self.frames_emitted);
        let end_us = base + self.format.frames_to_us(self.frames_emitted + frames);
        self.frames_emitted += frames;

        let data = if self.raw {
            samples_to_bytes(&samples)
        } else {
            encode_packet(&samples, channels)
        };
        Sample {
            data,
            pts_us,
            duration_us: (end_us - pts_us) as u32,
            is_sync: true,
        }
    }
}

impl Encoder for Fca1Encoder {
    type Input = PcmChunk;

    fn name(&self) -> &str {
        if self.raw {
            "raw-pcm-encoder"
        } else {
            "fca1-encoder"
        }
    }

    fn queue_input(&mut self, chunk: PcmChunk) -> FramecutResult<()> {
        if self.input_ended {
            return Err(FramecutError::codec("PCM queued after end of input"));
        }
        if chunk.sample_rate != self.params.sample_rate || chunk.channels != self.params.channels
        {
            return Err(FramecutError::codec(format!(
                "PCM is {} Hz / {} ch, encoder expects {} Hz / {} ch",
                chunk.sample_rate, chunk.channels, self.params.sample_rate, self.params.channels
            )));
        }
        if chunk.samples.len() % self.params.channels as usize != 0 {
            return Err(FramecutError::codec("PCM chunk holds a partial frame"));
        }
        self.base_pts_us.get_or_insert(chunk.pts_us);
        self.buffer.extend_from_slice(&chunk.samples);
        Ok(())
    }

    fn signal_end_of_input(&mut self) {
        self.input_ended = true;
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> FramecutResult<EncoderOutput> {
        if !self.format_reported && self.base_pts_us.is_some() {
            self.format_reported = true;
            return Ok(EncoderOutput::FormatChanged(self.output_format()));
        }

        let packet_samples = FRAMES_PER_PACKET * self.params.channels as usize;
        if self.buffer.len() >= packet_samples {
            return Ok(EncoderOutput::Packet(self.next_packet(packet_samples)));
        }
        if self.input_ended && !self.buffer.is_empty() {
            let remaining = self.buffer.len();
            return Ok(EncoderOutput::Packet(self.next_packet(remaining)));
        }
        if self.input_ended {
            return Ok(EncoderOutput::EndOfStream);
        }
        Ok(EncoderOutput::TryAgainLater)
    }
}

/// Queue shared by the zero-latency PCM decoders.
#[derive(Default)]
struct PacketQueue {
    pending: VecDeque<Sample>,
    input_ended: bool,
}

impl PacketQueue {
    fn push(&mut self, sample: Sample) -> FramecutResult<()> {
        if self.input_ended {
            return Err(FramecutError::codec("sample queued after end of input"));
        }
        self.pending.push_back(sample);
        Ok(())
    }

    fn poll<F>(&mut self, decode: F) -> FramecutResult<DecoderOutput<PcmChunk>>
    where
        F: FnOnce(Sample) -> FramecutResult<PcmChunk>,
    {
        match self.pending.pop_front() {
            Some(sample) => Ok(DecoderOutput::Frame(decode(sample)?)),
            None if self.input_ended => Ok(DecoderOutput::EndOfStream),
            None => Ok(DecoderOutput::TryAgainLater),
        }
    }

    fn flush(&mut self) {
        self.pending.clear();
        self.input_ended = false;
    }
}

pub struct Fca1Decoder {
    sample_rate: u32,
    channels: u16,
    queue: PacketQueue,
}

impl Fca1Decoder {
    pub fn new(format: &AudioFormat) -> FramecutResult<Self> {
        match parse_codec_config(&format.codec_config) {
            Some((rate, channels))
                if rate == format.sample_rate && channels == format.channels && channels > 0 => {}
            _ => {
                return Err(FramecutError::codec(format!(
                    "invalid fca1 configuration for {} Hz / {} ch stream",
                    format.sample_rate, format.channels
                )))
            }
        }
        Ok(Self {
            sample_rate: format.sample_rate,
            channels: format.channels,
            queue: PacketQueue::default(),
        })
    }
}

impl Decoder for Fca1Decoder {
    type Output = PcmChunk;

    fn name(&self) -> &str {
        "fca1-decoder"
    }

    fn queue_input(&mut self, sample: Sample) -> FramecutResult<()> {
        self.queue.push(sample)
    }

    fn signal_end_of_input(&mut self) {
        self.queue.input_ended = true;
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> FramecutResult<DecoderOutput<PcmChunk>> {
        let (sample_rate, channels) = (self.sample_rate, self.channels);
        self.queue.poll(|sample| {
            Ok(PcmChunk {
                pts_us: sample.pts_us,
                sample_rate,
                channels,
                samples: decode_packet(&sample.data, channels as usize)?,
            })
        })
    }

    fn flush(&mut self) {
        self.queue.flush();
    }
}

pub struct RawPcmDecoder {
    sample_rate: u32,
    channels: u16,
    queue: PacketQueue,
}

impl RawPcmDecoder {
    pub fn new(format: &AudioFormat) -> Self {
        Self {
            sample_rate: format.sample_rate,
            channels: format.channels,
            queue: PacketQueue::default(),
        }
    }
}

impl Decoder for RawPcmDecoder {
    type Output = PcmChunk;

    fn name(&self) -> &str {
        "raw-pcm-decoder"
    }

    fn queue_input(&mut self, sample: Sample) -> FramecutResult<()> {
        self.queue.push(sample)
    }

    fn signal_end_of_input(&mut self) {
        self.queue.input_ended = true;
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> FramecutResult<DecoderOutput<PcmChunk>> {
        let (sample_rate, channels) = (self.sample_rate, self.channels);
        self.queue.poll(|sample| {
            if sample.data.len() % 2 != 0 {
                return Err(FramecutError::codec("raw PCM sample has an odd byte count"));
            }
            Ok(PcmChunk {
                pts_us: sample.pts_us,
                sample_rate,
                channels,
                samples: bytes_to_samples(&sample.data),
            })
        })
    }

    fn flush(&mut self) {
        self.queue.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLL: Duration = Duration::from_millis(1);

    fn params(codec: &str) -> AudioEncodeParams {
        AudioEncodeParams {
            codec: codec.to_string(),
            sample_rate: 8_000,
            channels: 2,
            bitrate_kbps: 128,
        }
    }

    fn drain(encoder: &mut Fca1Encoder) -> (TrackFormat, Vec<Sample>) {
        let mut format = None;
        let mut packets = Vec::new();
        loop {
            match encoder.dequeue_output(POLL).unwrap() {
                EncoderOutput::FormatChanged(f) => format = Some(f),
                EncoderOutput::Packet(p) => packets.push(p),
                EncoderOutput::EndOfStream => break,
                EncoderOutput::TryAgainLater => panic!("encoder stalled"),
            }
        }
        (format.unwrap(), packets)
    }

    fn chunk(samples: Vec<i16>) -> PcmChunk {
        PcmChunk {
            pts_us: 0,
            sample_rate: 8_000,
            channels: 2,
            samples,
        }
    }

    #[test]
    fn test_packets_are_contiguous() {
        let mut encoder = Fca1Encoder::new(&params(MIME_AUDIO_FCA1)).unwrap();
        encoder.queue_input(chunk(vec![5; 2 * 2500])).unwrap();
        encoder.signal_end_of_input();
        let (_, packets) = drain(&mut encoder);

        assert_eq!(packets.len(), 3);
        for pair in packets.windows(2) {
            assert_eq!(pair[0].pts_us + pair[0].duration_us as i64, pair[1].pts_us);
        }
        let last = packets.last().unwrap();
        assert_eq!(last.pts_us + last.duration_us as i64, 312_500);
    }

    #[test]
    fn test_constant_signal_compresses() {
        let mut encoder = Fca1Encoder::new(&params(MIME_AUDIO_FCA1)).unwrap();
        encoder.queue_input(chunk(vec![8000; 2 * 1024])).unwrap();
        encoder.signal_end_of_input();
        let (_, packets) = drain(&mut encoder);
        assert!(packets[0].data.len() < 100);
    }

    #[test]
    fn test_fca1_decode_restores_samples() {
        let samples: Vec<i16> = (0..4096).map(|i| ((i * 37) % 2000 - 1000) as i16).collect();
        let mut encoder = Fca1Encoder::new(&params(MIME_AUDIO_FCA1)).unwrap();
        encoder.queue_input(chunk(samples.clone())).unwrap();
        encoder.signal_end_of_input();
        let (format, packets) = drain(&mut encoder);

        let format = match format {
            TrackFormat::Audio(a) => a,
            TrackFormat::Video(_) => panic!("expected audio"),
        };
        let mut decoder = Fca1Decoder::new(&format).unwrap();
        let mut decoded = Vec::new();
        for p in packets {
            decoder.queue_input(p).unwrap();
        }
        decoder.signal_end_of_input();
        while let DecoderOutput::Frame(c) = decoder.dequeue_output(POLL).unwrap() {
            decoded.extend(c.samples);
        }
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_raw_format_has_no_config() {
        let mut encoder = Fca1Encoder::raw(&params(MIME_AUDIO_RAW)).unwrap();
        encoder.queue_input(chunk(vec![1, -1, 2, -2])).unwrap();
        encoder.signal_end_of_input();
        let (format, packets) = drain(&mut encoder);
        assert_eq!(format.codec(), MIME_AUDIO_RAW);
        assert!(format.codec_config().is_empty());
        assert_eq!(packets[0].data, samples_to_bytes(&[1, -1, 2, -2]));
    }

    #[test]
    fn test_mismatched_pcm_rejected() {
        let mut encoder = Fca1Encoder::new(&params(MIME_AUDIO_FCA1)).unwrap();
        let err = encoder
            .queue_input(PcmChunk {
                pts_us: 0,
                sample_rate: 44_100,
                channels: 2,
                samples: vec![0; 4],
            })
            .unwrap_err();
        assert!(matches!(err, FramecutError::Codec { .. }));
    }
}
