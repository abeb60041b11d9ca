//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory for intermediate export files. When unset, each export
    /// keeps its scratch directory next to the destination file.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Default export parameters.
    #[serde(default)]
    pub export: ExportDefaults,

    /// Hardware codec limits.
    #[serde(default)]
    pub codecs: CodecLimits,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDefaults {
    /// Output frame width.
    pub width: u32,

    /// Output frame height.
    pub height: u32,

    /// Output frame rate.
    pub fps: u32,

    /// Video codec MIME type.
    pub video_codec: String,

    /// Audio codec MIME type.
    pub audio_codec: String,

    /// Target video bitrate.
    pub video_bitrate_kbps: u32,

    /// Target audio bitrate.
    pub audio_bitrate_kbps: u32,

    /// Frames between sync samples in the encoded video track.
    pub keyframe_interval: u32,

    /// Sample rate of every intermediate and final PCM buffer.
    pub audio_sample_rate: u32,
}

/// Limits on concurrently live hardware codec instances.
///
/// Exhausting the platform codec pool takes the process down, so
/// `max_hardware_instances` is a hard ceiling rather than a tuning knob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecLimits {
    /// Maximum decoder + encoder instances alive at once.
    pub max_hardware_instances: usize,

    /// Upper bound on audio decode jobs running in parallel.
    pub max_concurrent_audio_decodes: usize,

    /// Samples a decoder holds before emitting its first output.
    pub decoder_pipeline_depth: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "framecut=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            video_codec: "video/x-fcv1".to_string(),
            audio_codec: "audio/x-fca1".to_string(),
            video_bitrate_kbps: 8000,
            audio_bitrate_kbps: 192,
            keyframe_interval: 30,
            audio_sample_rate: 48000,
        }
    }
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_hardware_instances: 8,
            max_concurrent_audio_decodes: 3,
            decoder_pipeline_depth: 2,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Check internal consistency of the codec limits.
    pub fn validate(&self) -> Result<(), crate::error::FramecutError> {
        if self.codecs.max_concurrent_audio_decodes == 0 {
            return Err(crate::error::FramecutError::config(
                "max_concurrent_audio_decodes must be at least 1",
            ));
        }
        // Two encoders plus at least one decoder.
        if self.codecs.max_hardware_instances < 3 {
            return Err(crate::error::FramecutError::config(
                "max_hardware_instances must be at least 3",
            ));
        }
        if self.export.fps == 0 || self.export.audio_sample_rate == 0 {
            return Err(crate::error::FramecutError::config(
                "fps and audio_sample_rate must be non-zero",
            ));
        }
        Ok(())
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("framecut").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.export.audio_sample_rate, 48000);
        assert!(config.codecs.max_concurrent_audio_decodes < config.codecs.max_hardware_instances);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{ "codecs": { "max_hardware_instances": 4, "max_concurrent_audio_decodes": 1, "decoder_pipeline_depth": 0 } }"#)
                .unwrap();
        assert_eq!(parsed.codecs.max_hardware_instances, 4);
        assert_eq!(parsed.export.fps, 30);
        assert_eq!(parsed.logging.level, "info");
        assert!(parsed.work_dir.is_none());
    }

    #[test]
    fn test_zero_audio_decodes_rejected() {
        let mut config = AppConfig::default();
        config.codecs.max_concurrent_audio_decodes = 0;
        assert!(config.validate().is_err());
    }
}
