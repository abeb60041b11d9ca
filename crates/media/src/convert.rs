//! PCM layout conversion: channel mapping, byte packing, resampling.

/// Pack samples as s16 LE bytes.
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}

/// Unpack s16 LE bytes. A trailing odd byte is ignored.
pub fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Remap interleaved samples from `src_channels` to `dst_channels`.
///
/// Widening repeats source channels cyclically (mono feeds every output).
/// Narrowing averages every source channel `c` into output `c % dst`.
pub fn remap_channels(samples: &[i16], src_channels: u16, dst_channels: u16) -> Vec<i16> {
    let src = src_channels.max(1) as usize;
    let dst = dst_channels.max(1) as usize;
    if src == dst {
        return samples.to_vec();
    }

    let frames = samples.len() / src;
    let mut out = Vec::with_capacity(frames * dst);
    for frame in samples.chunks_exact(src) {
        if src < dst {
            for k in 0..dst {
                out.push(frame[k % src]);
            }
        } else {
            for k in 0..dst {
                let (sum, count) = frame
                    .iter()
                    .skip(k)
                    .step_by(dst)
                    .fold((0i32, 0i32), |(sum, n), &s| (sum + s as i32, n + 1));
                out.push((sum / count.max(1)) as i16);
            }
        }
    }
    out
}

/// Streaming linear-interpolation resampler.
///
/// `step` source frames are consumed per output frame, so a clip played at
/// `speed` from a `src_rate` file into a `dst_rate` pipeline uses
/// `src_rate * speed / dst_rate`. Unconsumed tail frames carry over to the
/// next call.
#[derive(Debug, Clone)]
pub struct StreamResampler {
    channels: usize,
    step: f64,
    position: f64,
    pending: Vec<i16>,
}

impl StreamResampler {
    pub fn new(src_rate: u32, dst_rate: u32, speed: f64, channels: u16) -> Self {
        let step = src_rate as f64 * speed / dst_rate.max(1) as f64;
        Self {
            channels: channels.max(1) as usize,
            step: if step.is_finite() && step > 0.0 { step } else { 1.0 },
            position: 0.0,
            pending: Vec::new(),
        }
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn is_passthrough(&self) -> bool {
        (self.step - 1.0).abs() < f64::EPSILON
    }

    /// Resample `input`, appending to `out`.
    pub fn process(&mut self, input: &[i16], out: &mut Vec<i16>) {
        if self.is_passthrough() {
            out.extend_from_slice(input);
            return;
        }

        let ch = self.channels;
        self.pending.extend_from_slice(input);
        let frames = self.pending.len() / ch;

        while self.position + 1.0 < frames as f64 {
            let i = self.position.floor() as usize;
            let frac = self.position - i as f64;
            for c in 0..ch {
                let a = self.pending[i * ch + c] as f64;
                let b = self.pending[(i + 1) * ch + c] as f64;
                out.push((a + (b - a) * frac).round() as i16);
            }
            self.position += self.step;
        }

        let consumed = (self.position.floor() as usize).min(frames);
        self.pending.drain(..consumed * ch);
        self.position -= consumed as f64;
    }

    /// Emit what remains, holding the last frame instead of interpolating.
    pub fn finish(&mut self, out: &mut Vec<i16>) {
        if self.is_passthrough() {
            return;
        }

        let ch = self.channels;
        let frames = self.pending.len() / ch;
        while self.position < frames as f64 {
            let i = self.position.floor() as usize;
            out.extend_from_slice(&self.pending[i * ch..(i + 1) * ch]);
            self.position += self.step;
        }
        self.pending.clear();
        self.position = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_packing() {
        let samples = vec![0i16, -1, 258, i16::MIN];
        let bytes = samples_to_bytes(&samples);
        assert_eq!(&bytes[4..6], &[2, 1]);
        assert_eq!(bytes_to_samples(&bytes), samples);
    }

    #[test]
    fn test_mono_to_stereo_duplicates() {
        assert_eq!(remap_channels(&[1, 2, 3], 1, 2), vec![1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn test_surround_to_stereo_averages() {
        // 4 channels: L sources are 0 and 2, R sources are 1 and 3.
        let frame = [100, 200, 300, 400];
        assert_eq!(remap_channels(&frame, 4, 2), vec![200, 300]);
    }

    #[test]
    fn test_stereo_to_mono_averages() {
        assert_eq!(remap_channels(&[100, 300, -50, 50], 2, 1), vec![200, 0]);
    }

    #[test]
    fn test_passthrough_when_rates_match() {
        let mut resampler = StreamResampler::new(48_000, 48_000, 1.0, 2);
        assert!(resampler.is_passthrough());
        let mut out = Vec::new();
        resampler.process(&[1, 2, 3, 4], &mut out);
        resampler.finish(&mut out);
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_upsample_length_and_values() {
        let mut resampler = StreamResampler::new(24_000, 48_000, 1.0, 1);
        let input: Vec<i16> = (0..1000).map(|i| i * 10).collect();
        let mut out = Vec::new();
        for chunk in input.chunks(137) {
            resampler.process(chunk, &mut out);
        }
        resampler.finish(&mut out);

        assert_eq!(out.len(), 2000);
        assert_eq!(out[0], 0);
        assert_eq!(out[1], 5);
        assert_eq!(out[2], 10);
    }

    #[test]
    fn test_double_speed_halves_length() {
        let mut resampler = StreamResampler::new(48_000, 48_000, 2.0, 2);
        assert_eq!(resampler.step(), 2.0);
        let input = vec![7i16; 2 * 4800];
        let mut out = Vec::new();
        resampler.process(&input, &mut out);
        resampler.finish(&mut out);
        assert_eq!(out.len(), 2 * 2400);
        assert!(out.iter().all(|&s| s == 7));
    }
}
