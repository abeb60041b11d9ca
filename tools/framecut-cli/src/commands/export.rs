//! Render a timeline to a container file.

use std::io::Write;
use std::path::PathBuf;

use framecut_common::config::AppConfig;
use framecut_render_engine::export::{
    ExportJob, ExportOutcome, ExportProgress, ProgressCallback, TimelineExporter,
};
use framecut_timeline::{ExportSettings, PcmFormat, Timeline};

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    pub keyframe_interval: Option<u32>,
    pub sample_rate: Option<u32>,
    pub max_codecs: Option<usize>,
}

/// Export settings from config defaults with flags applied.
pub fn settings_from(config: &AppConfig, overrides: &Overrides) -> ExportSettings {
    let defaults = &config.export;
    ExportSettings {
        width: overrides.width.unwrap_or(defaults.width),
        height: overrides.height.unwrap_or(defaults.height),
        fps: overrides.fps.unwrap_or(defaults.fps),
        video_codec: defaults.video_codec.clone(),
        audio_codec: defaults.audio_codec.clone(),
        video_bitrate_kbps: defaults.video_bitrate_kbps,
        audio_bitrate_kbps: defaults.audio_bitrate_kbps,
        keyframe_interval: overrides
            .keyframe_interval
            .unwrap_or(defaults.keyframe_interval),
        pcm: PcmFormat::stereo(overrides.sample_rate.unwrap_or(defaults.audio_sample_rate)),
    }
}

pub async fn run(
    config: &AppConfig,
    timeline_path: PathBuf,
    output: PathBuf,
    overrides: Overrides,
) -> anyhow::Result<()> {
    println!("Exporting timeline: {}", timeline_path.display());

    let json = std::fs::read_to_string(&timeline_path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", timeline_path.display()))?;
    let timeline =
        Timeline::from_json(&json).map_err(|e| anyhow::anyhow!("Invalid timeline: {e}"))?;

    let settings = settings_from(config, &overrides);
    let mut limits = config.codecs.clone();
    if let Some(max) = overrides.max_codecs {
        limits.max_hardware_instances = max;
    }

    println!("  Output: {}", output.display());
    println!(
        "  Video: {}x{} @ {}fps ({})",
        settings.width, settings.height, settings.fps, settings.video_codec
    );
    println!(
        "  Audio: {} Hz, {} channels ({})",
        settings.pcm.sample_rate, settings.pcm.channels, settings.audio_codec
    );
    println!(
        "  Items: {} video layers, {} audio clips",
        timeline.video_layers.len(),
        timeline.audio_clips.len()
    );

    let job = ExportJob {
        timeline,
        output_path: output,
        settings,
    };

    let progress_cb: ProgressCallback = Box::new(|p: ExportProgress| {
        print!(
            "\r  Progress: {:.1}% ({}/{} ms, {}/{} frames, ETA: {:.0}s) [{:?}]  ",
            p.progress * 100.0,
            p.position_ms,
            p.duration_ms,
            p.frames_encoded,
            p.total_frames,
            p.eta_secs,
            p.stage,
        );
        let _ = std::io::stdout().flush();
    });

    let mut exporter = TimelineExporter::new(&limits);
    if let Some(dir) = &config.work_dir {
        exporter = exporter.with_work_dir(dir);
    }
    let token = exporter.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling export");
            token.cancel();
        }
    });

    match exporter.export(job, Some(progress_cb)).await {
        Ok(ExportOutcome::Completed(summary)) => {
            println!("\nExport complete: {}", summary.output_path.display());
            println!(
                "  {} frames, {} audio packets, {} decode jobs, {} clipped samples",
                summary.frames_encoded,
                summary.audio.packets,
                summary.decode_jobs,
                summary.mix.clipped_samples
            );
            Ok(())
        }
        Ok(ExportOutcome::Cancelled) => {
            println!("\nExport cancelled. No output was written.");
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("Export failed: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let config = AppConfig::default();
        let settings = settings_from(
            &config,
            &Overrides {
                width: Some(640),
                sample_rate: Some(44_100),
                ..Overrides::default()
            },
        );
        assert_eq!(settings.width, 640);
        assert_eq!(settings.height, config.export.height);
        assert_eq!(settings.pcm, PcmFormat::stereo(44_100));
        assert!(settings.check().is_ok());
    }
}
