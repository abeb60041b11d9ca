//! Show codec support and effective configuration.

use framecut_common::config::{config_file_path, AppConfig};
use framecut_media::{CodecRegistry, MIME_AUDIO_FCA1, MIME_AUDIO_RAW, MIME_VIDEO_FCV1};

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Framecut System Check");
    println!("{}", "=".repeat(50));

    let path = config_file_path();
    if path.exists() {
        println!("[OK] Config: {}", path.display());
    } else {
        println!("[--] Config: defaults ({} not found)", path.display());
    }

    for codec in [MIME_VIDEO_FCV1, MIME_AUDIO_FCA1, MIME_AUDIO_RAW] {
        if CodecRegistry::supports_decoding(codec) {
            println!("[OK] Codec: {codec}");
        } else {
            println!("[WARN] Codec: {codec} (no decoder)");
        }
    }

    let c = &config.codecs;
    println!();
    println!("Codec limits:");
    println!("  Hardware instances: {}", c.max_hardware_instances);
    println!("  Concurrent audio decodes: {}", c.max_concurrent_audio_decodes);
    println!("  Decoder pipeline depth: {}", c.decoder_pipeline_depth);

    let e = &config.export;
    println!();
    println!("Export defaults:");
    println!("  Video: {}x{} @ {}fps, {} ({} kbps, keyframe every {})",
        e.width, e.height, e.fps, e.video_codec, e.video_bitrate_kbps, e.keyframe_interval);
    println!("  Audio: {} Hz stereo, {} ({} kbps)", e.audio_sample_rate, e.audio_codec, e.audio_bitrate_kbps);

    println!();
    match config.validate() {
        Ok(()) => {
            println!("Configuration is consistent. Framecut is ready.");
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("Configuration problem: {e}")),
    }
}
