//! Generate synthetic test media.

use std::path::PathBuf;

use framecut_media::synth::{write_synthetic, SynthAudio, SynthSpec, SynthVideo, Waveform};
use framecut_media::{MIME_AUDIO_FCA1, MIME_AUDIO_RAW};

pub fn video(
    output: PathBuf,
    width: u32,
    height: u32,
    fps: u32,
    duration_ms: u64,
    keyframe_interval: u32,
    with_audio: bool,
) -> anyhow::Result<()> {
    let spec = SynthSpec {
        video: Some(SynthVideo {
            width,
            height,
            fps,
            duration_ms,
            keyframe_interval,
        }),
        audio: with_audio.then(|| SynthAudio {
            sample_rate: 48_000,
            channels: 2,
            duration_ms,
            waveform: Waveform::Constant(4000),
            codec: MIME_AUDIO_FCA1.to_string(),
        }),
    };

    let info = write_synthetic(&output, &spec)
        .map_err(|e| anyhow::anyhow!("Failed to write synthetic video: {e}"))?;
    println!(
        "Wrote {} ({}x{} @ {}fps, {} ms)",
        output.display(),
        width,
        height,
        fps,
        info.duration_ms
    );
    Ok(())
}

pub fn audio(
    output: PathBuf,
    sample_rate: u32,
    channels: u16,
    duration_ms: u64,
    tone_hz: Option<f32>,
    level: i16,
    raw: bool,
) -> anyhow::Result<()> {
    let waveform = match tone_hz {
        Some(frequency_hz) => Waveform::Sine {
            frequency_hz,
            amplitude: level,
        },
        None => Waveform::Constant(level),
    };
    let codec = if raw { MIME_AUDIO_RAW } else { MIME_AUDIO_FCA1 };

    let info = write_synthetic(
        &output,
        &SynthSpec {
            video: None,
            audio: Some(SynthAudio {
                sample_rate,
                channels,
                duration_ms,
                waveform,
                codec: codec.to_string(),
            }),
        },
    )
    .map_err(|e| anyhow::anyhow!("Failed to write synthetic audio: {e}"))?;

    println!(
        "Wrote {} ({} Hz, {} channels, {}, {} ms)",
        output.display(),
        sample_rate,
        channels,
        codec,
        info.duration_ms
    );
    Ok(())
}
