//! Summation mixing of decoded PCM clips.
//!
//! The mixer walks the output in one-second windows, asks the caller for
//! the buffers active in each window, and sums them per channel with
//! saturation to the s16 range. Gain is the caller's job; see
//! [`PcmClipReader`].

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use framecut_common::FramecutResult;
use framecut_timeline::{DisplayInterval, PcmFormat, BYTES_PER_SAMPLE};

const WINDOW_MS: u64 = 1000;

/// One mixing window in output coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixWindow {
    pub start_ms: u64,
    pub end_ms: u64,
    pub start_frame: u64,
    pub frame_count: usize,
}

/// Totals of a finished mix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MixStats {
    pub windows: u64,
    pub bytes_written: u64,
    /// Windows in which no buffer was active.
    pub silent_windows: u64,
    /// Samples clamped to the s16 range.
    pub clipped_samples: u64,
}

fn clamp_to_i16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Scale s16le samples in place, saturating.
pub fn apply_gain(pcm: &mut [u8], gain: f32) {
    for pair in pcm.chunks_exact_mut(2) {
        let sample = i16::from_le_bytes([pair[0], pair[1]]) as f32;
        let scaled = clamp_to_i16((sample * gain).round() as i32);
        pair.copy_from_slice(&scaled.to_le_bytes());
    }
}

/// Pure summation-with-saturation mixer.
#[derive(Debug, Clone, Copy)]
pub struct AudioMixEngine {
    format: PcmFormat,
}

impl AudioMixEngine {
    pub fn new(format: PcmFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Windows covering `total_duration_ms`.
    pub fn windows(&self, total_duration_ms: u64) -> impl Iterator<Item = MixWindow> + '_ {
        let count = total_duration_ms.div_ceil(WINDOW_MS);
        (0..count).map(move |i| {
            let start_ms = i * WINDOW_MS;
            let end_ms = (start_ms + WINDOW_MS).min(total_duration_ms);
            let start_frame = self.format.frames_for_ms(start_ms);
            let end_frame = self.format.frames_for_ms(end_ms);
            MixWindow {
                start_ms,
                end_ms,
                start_frame,
                frame_count: (end_frame - start_frame) as usize,
            }
        })
    }

    /// Sum `buffers` into one window of `frame_count` frames. Short buffers
    /// are padded with silence; excess bytes are ignored.
    pub fn mix_window(&self, buffers: &[Vec<u8>], frame_count: usize) -> (Vec<u8>, u64) {
        let len = frame_count * self.format.channels as usize;
        if buffers.is_empty() {
            return (vec![0u8; len * BYTES_PER_SAMPLE], 0);
        }

        let mut acc = vec![0i32; len];
        for buffer in buffers {
            for (slot, pair) in acc.iter_mut().zip(buffer.chunks_exact(2)) {
                *slot += i16::from_le_bytes([pair[0], pair[1]]) as i32;
            }
        }

        let mut clipped = 0;
        let mut out = Vec::with_capacity(len * BYTES_PER_SAMPLE);
        for sum in acc {
            let sample = clamp_to_i16(sum);
            if sample as i32 != sum {
                clipped += 1;
            }
            out.extend_from_slice(&sample.to_le_bytes());
        }
        (out, clipped)
    }

    /// Mix `total_duration_ms` of audio into `output`.
    ///
    /// `active_buffers_at` returns, for each window, one byte buffer per
    /// source active in it, aligned to the window start. Exactly
    /// `format.bytes_for_ms(total_duration_ms)` bytes are written.
    pub fn mix<W, F>(
        &self,
        output: &mut W,
        total_duration_ms: u64,
        mut active_buffers_at: F,
    ) -> FramecutResult<MixStats>
    where
        W: Write,
        F: FnMut(&MixWindow) -> FramecutResult<Vec<Vec<u8>>>,
    {
        let mut stats = MixStats::default();
        for window in self.windows(total_duration_ms) {
            let buffers = active_buffers_at(&window)?;
            if buffers.is_empty() {
                stats.silent_windows += 1;
            }
            let (bytes, clipped) = self.mix_window(&buffers, window.frame_count);
            output.write_all(&bytes)?;
            stats.windows += 1;
            stats.bytes_written += bytes.len() as u64;
            stats.clipped_samples += clipped;
        }
        output.flush()?;

        if stats.clipped_samples > 0 {
            tracing::debug!(clipped = stats.clipped_samples, "Mix saturated samples");
        }
        Ok(stats)
    }
}

/// Reads one decoded clip's PCM by timeline window.
///
/// The file holds the clip's timeline span starting at its interval start,
/// so a window maps to a byte offset directly.
pub struct PcmClipReader {
    path: PathBuf,
    file: File,
    format: PcmFormat,
    start_frame: u64,
    frame_len: u64,
    gain: f32,
}

impl PcmClipReader {
    pub fn open(
        path: impl AsRef<Path>,
        format: PcmFormat,
        interval: &DisplayInterval,
        gain: f32,
    ) -> FramecutResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            format,
            start_frame: format.frames_for_ms(interval.start_ms),
            frame_len: len / format.bytes_per_frame() as u64,
            gain,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The clip's contribution to `window`, or `None` when it is silent
    /// there.
    pub fn read_window(&mut self, window: &MixWindow) -> FramecutResult<Option<Vec<u8>>> {
        let window_end = window.start_frame + window.frame_count as u64;
        let clip_end = self.start_frame + self.frame_len;
        let from = window.start_frame.max(self.start_frame);
        let to = window_end.min(clip_end);
        if from >= to {
            return Ok(None);
        }

        let bpf = self.format.bytes_per_frame();
        let mut buffer = vec![0u8; window.frame_count * bpf];
        let dest = (from - window.start_frame) as usize * bpf;
        let len = (to - from) as usize * bpf;

        self.file
            .seek(SeekFrom::Start((from - self.start_frame) * bpf as u64))?;
        self.file.read_exact(&mut buffer[dest..dest + len])?;

        if (self.gain - 1.0).abs() >= f32::EPSILON {
            apply_gain(&mut buffer[dest..dest + len], self.gain);
        }
        Ok(Some(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecut_media::convert::{bytes_to_samples, samples_to_bytes};
    use proptest::prelude::*;

    fn engine() -> AudioMixEngine {
        AudioMixEngine::new(PcmFormat::stereo(8_000))
    }

    #[test]
    fn test_output_length_is_exact() {
        let engine = engine();
        let mut out = Vec::new();
        let stats = engine.mix(&mut out, 2_500, |_| Ok(Vec::new())).unwrap();
        assert_eq!(out.len() as u64, engine.format().bytes_for_ms(2_500));
        assert_eq!(stats.windows, 3);
        assert_eq!(stats.silent_windows, 3);
    }

    #[test]
    fn test_no_active_clip_is_silence() {
        let engine = engine();
        let mut out = Vec::new();
        engine.mix(&mut out, 1_000, |_| Ok(Vec::new())).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_sum_saturates() {
        let engine = engine();
        let loud = samples_to_bytes(&[30_000, -30_000, 100, -100]);
        let (mixed, clipped) = engine.mix_window(&[loud.clone(), loud], 2);
        assert_eq!(bytes_to_samples(&mixed), vec![32_767, -32_768, 200, -200]);
        assert_eq!(clipped, 2);
    }

    #[test]
    fn test_short_buffer_padded_with_silence() {
        let engine = engine();
        let short = samples_to_bytes(&[5, 5]);
        let (mixed, _) = engine.mix_window(&[short], 3);
        assert_eq!(bytes_to_samples(&mixed), vec![5, 5, 0, 0, 0, 0]);
    }

    #[test]
    fn test_apply_gain_rounds_and_clamps() {
        let mut pcm = samples_to_bytes(&[8_000, -3, 20_000]);
        apply_gain(&mut pcm, 0.5);
        assert_eq!(bytes_to_samples(&pcm), vec![4_000, -2, 10_000]);

        let mut pcm = samples_to_bytes(&[20_000]);
        apply_gain(&mut pcm, 2.0);
        assert_eq!(bytes_to_samples(&pcm), vec![32_767]);
    }

    #[test]
    fn test_clip_reader_windows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.pcm");
        let format = PcmFormat {
            sample_rate: 1_000,
            channels: 1,
        };
        // 1500ms clip placed at 500ms.
        let samples: Vec<i16> = (0..1500).map(|i| i as i16).collect();
        std::fs::write(&path, samples_to_bytes(&samples)).unwrap();

        let interval = DisplayInterval::new(500, 1500);
        let mut reader = PcmClipReader::open(&path, format, &interval, 2.0).unwrap();
        let engine = AudioMixEngine::new(format);
        let windows: Vec<MixWindow> = engine.windows(3_000).collect();

        let first = bytes_to_samples(&reader.read_window(&windows[0]).unwrap().unwrap());
        assert_eq!(first.len(), 1000);
        assert!(first[..500].iter().all(|&s| s == 0));
        assert_eq!(first[500], 0);
        assert_eq!(first[501], 2);

        let second = bytes_to_samples(&reader.read_window(&windows[1]).unwrap().unwrap());
        assert_eq!(second[0], 1000);
        assert_eq!(second[999], 2998);

        assert!(reader.read_window(&windows[2]).unwrap().is_none());
    }

    proptest! {
        #[test]
        fn prop_mix_is_saturated_sum(
            sources in prop::collection::vec(
                prop::collection::vec(any::<i16>(), 16), 0..12
            )
        ) {
            let engine = engine();
            let buffers: Vec<Vec<u8>> = sources.iter().map(|s| samples_to_bytes(s)).collect();
            let (mixed, _) = engine.mix_window(&buffers, 8);
            let mixed = bytes_to_samples(&mixed);

            prop_assert_eq!(mixed.len(), 16);
            for (i, &sample) in mixed.iter().enumerate() {
                let sum: i32 = sources.iter().map(|s| s[i] as i32).sum();
                prop_assert_eq!(sample as i32, sum.clamp(-32_768, 32_767));
            }
        }
    }
}
