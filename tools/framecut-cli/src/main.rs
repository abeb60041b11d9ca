//! Framecut CLI: export timelines and work with `.fcm` media.
//!
//! Usage:
//!   framecut export <TIMELINE> -o <OUT>   Render a timeline to a container
//!   framecut probe <FILE>                 Show tracks of a media file
//!   framecut synth video|audio <OUT>      Generate test media
//!   framecut validate <TIMELINE>          Check a timeline and its sources
//!   framecut check                        Show codecs and configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "framecut",
    about = "Timeline rendering and encoding pipeline",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a timeline JSON file to one container
    Export {
        /// Path to the timeline JSON
        timeline: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Output width (defaults to config)
        #[arg(long)]
        width: Option<u32>,

        /// Output height (defaults to config)
        #[arg(long)]
        height: Option<u32>,

        /// Output frame rate (defaults to config)
        #[arg(long)]
        fps: Option<u32>,

        /// Frames between keyframes (defaults to config)
        #[arg(long)]
        keyframe_interval: Option<u32>,

        /// PCM sample rate for mixing (defaults to config)
        #[arg(long)]
        sample_rate: Option<u32>,

        /// Maximum codec instances alive at once (defaults to config)
        #[arg(long)]
        max_codecs: Option<usize>,
    },

    /// Show tracks and durations of a media file
    Probe {
        /// Path to an `.fcm` file
        path: PathBuf,

        /// Print the probe result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate synthetic test media
    Synth {
        #[command(subcommand)]
        kind: SynthKind,
    },

    /// Validate a timeline and check that its sources open
    Validate {
        /// Path to the timeline JSON
        timeline: PathBuf,
    },

    /// Show codec support and effective configuration
    Check,
}

#[derive(Subcommand)]
enum SynthKind {
    /// Video whose frames carry their index
    Video {
        /// Output file path
        output: PathBuf,

        #[arg(long, default_value = "320")]
        width: u32,

        #[arg(long, default_value = "240")]
        height: u32,

        #[arg(long, default_value = "30")]
        fps: u32,

        /// Duration in milliseconds
        #[arg(long, default_value = "10000")]
        duration_ms: u64,

        #[arg(long, default_value = "30")]
        keyframe_interval: u32,

        /// Also add a constant-level audio track
        #[arg(long)]
        with_audio: bool,
    },

    /// Constant level or sine tone
    Audio {
        /// Output file path
        output: PathBuf,

        #[arg(long, default_value = "48000")]
        sample_rate: u32,

        #[arg(long, default_value = "2")]
        channels: u16,

        /// Duration in milliseconds
        #[arg(long, default_value = "10000")]
        duration_ms: u64,

        /// Sine frequency in Hz; omit for a constant level
        #[arg(long)]
        tone_hz: Option<f32>,

        /// Constant level, or sine amplitude
        #[arg(long, default_value = "8000")]
        level: i16,

        /// Store raw PCM instead of fca1
        #[arg(long)]
        raw: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = framecut_common::config::AppConfig::load();

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    logging.json |= cli.json_logs;
    framecut_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Export {
            timeline,
            output,
            width,
            height,
            fps,
            keyframe_interval,
            sample_rate,
            max_codecs,
        } => {
            let overrides = commands::export::Overrides {
                width,
                height,
                fps,
                keyframe_interval,
                sample_rate,
                max_codecs,
            };
            commands::export::run(&config, timeline, output, overrides).await
        }
        Commands::Probe { path, json } => commands::probe::run(path, json),
        Commands::Synth { kind } => match kind {
            SynthKind::Video {
                output,
                width,
                height,
                fps,
                duration_ms,
                keyframe_interval,
                with_audio,
            } => commands::synth::video(
                output,
                width,
                height,
                fps,
                duration_ms,
                keyframe_interval,
                with_audio,
            ),
            SynthKind::Audio {
                output,
                sample_rate,
                channels,
                duration_ms,
                tone_hz,
                level,
                raw,
            } => commands::synth::audio(
                output,
                sample_rate,
                channels,
                duration_ms,
                tone_hz,
                level,
                raw,
            ),
        },
        Commands::Validate { timeline } => commands::validate::run(&config, timeline),
        Commands::Check => commands::check::run(&config),
    }
}
