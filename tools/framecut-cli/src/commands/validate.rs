//! Validate a timeline and its sources.

use std::path::PathBuf;

use framecut_common::config::AppConfig;
use framecut_media::{MediaDemuxer, TrackKind};
use framecut_render_engine::export::audio_decode_permits;
use framecut_timeline::Timeline;

pub fn run(config: &AppConfig, path: PathBuf) -> anyhow::Result<()> {
    println!("Validating timeline at: {}", path.display());

    let json = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
    let timeline = Timeline::from_json(&json).map_err(|e| anyhow::anyhow!("Invalid timeline: {e}"))?;

    println!("  Duration: {} ms", timeline.duration_ms);
    println!("  Video layers: {}", timeline.video_layers.len());
    println!("  Audio clips: {}", timeline.audio_clips.len());
    println!(
        "  Peak concurrent video layers: {}",
        timeline.peak_video_concurrency()
    );

    let mut errors = Vec::new();
    match audio_decode_permits(&config.codecs, &timeline) {
        Ok(permits) => println!("  Audio decode slots: {permits}"),
        Err(e) => errors.push(e.to_string()),
    }

    let sources = timeline
        .video_layers
        .iter()
        .map(|item| (item.id, &item.source, TrackKind::Video))
        .chain(
            timeline
                .audio_clips
                .iter()
                .map(|item| (item.id, &item.source, TrackKind::Audio)),
        );
    for (id, source, kind) in sources {
        if let Err(e) = MediaDemuxer::open_track(source, kind) {
            errors.push(format!("item {id}: {e}"));
        }
    }

    if errors.is_empty() {
        println!("  Sources: All readable");
        println!("\nTimeline is valid.");
        return Ok(());
    }

    println!("\nValidation issues:");
    for error in &errors {
        println!("  - {error}");
    }
    Err(anyhow::anyhow!("{} issue(s) found", errors.len()))
}
