//! Show tracks of a media file.

use std::path::PathBuf;

use framecut_media::MediaDemuxer;

pub fn run(path: PathBuf, json: bool) -> anyhow::Result<()> {
    let demuxer = MediaDemuxer::open(&path)
        .map_err(|e| anyhow::anyhow!("Failed to open media: {e}"))?;
    let info = demuxer.info();

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Media: {}", path.display());
    println!("  Duration: {} ms", info.duration_ms);
    println!();

    if let Some(v) = &info.video {
        println!("Video (track {}):", v.track);
        println!("  Codec: {}", v.format.codec);
        println!(
            "  Resolution: {}x{} @ {}fps",
            v.format.width, v.format.height, v.format.frame_rate
        );
        println!("  Duration: {:.3}s", v.duration_us as f64 / 1_000_000.0);
        println!(
            "  Samples: {} ({} keyframes)",
            v.sample_count, v.sync_sample_count
        );
    }
    if let Some(a) = &info.audio {
        println!("Audio (track {}):", a.track);
        println!("  Codec: {}", a.format.codec);
        println!(
            "  Format: {} Hz, {} channels",
            a.format.sample_rate, a.format.channels
        );
        println!("  Duration: {:.3}s", a.duration_us as f64 / 1_000_000.0);
        println!("  Samples: {}", a.sample_count);
    }

    Ok(())
}
