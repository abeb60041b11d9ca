//! Timeline items and the timeline container.
//!
//! The timeline is an unordered set of video layers and audio clips, each
//! uniquely identified. Every item's display interval must lie within
//! `[0, duration_ms]`.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::interval::DisplayInterval;

/// Stable identity of a timeline item.
pub type ItemId = Uuid;

fn unity_gain() -> f32 {
    1.0
}

/// Placement of a video layer inside the output frame, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl LayerRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A rect covering the whole output frame.
    pub fn full_frame(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }
}

/// A video source placed on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoLayerItem {
    pub id: ItemId,

    /// Source media file.
    pub source: PathBuf,

    pub interval: DisplayInterval,

    /// Target position/size in the output frame.
    pub rect: LayerRect,

    /// Compositing order; lower indices are drawn first.
    #[serde(default)]
    pub layer_index: i32,
}

impl VideoLayerItem {
    pub fn new(source: impl Into<PathBuf>, interval: DisplayInterval, rect: LayerRect) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            interval,
            rect,
            layer_index: 0,
        }
    }

    pub fn with_layer_index(mut self, layer_index: i32) -> Self {
        self.layer_index = layer_index;
        self
    }
}

/// An audio source placed on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioClipItem {
    pub id: ItemId,

    /// Source media file.
    pub source: PathBuf,

    pub interval: DisplayInterval,

    /// Linear gain applied to every sample. Omitted means identity.
    #[serde(default = "unity_gain")]
    pub volume: f32,
}

impl AudioClipItem {
    pub fn new(source: impl Into<PathBuf>, interval: DisplayInterval) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            interval,
            volume: 1.0,
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    /// Whether the gain leaves samples untouched.
    pub fn has_identity_gain(&self) -> bool {
        (self.volume - 1.0).abs() < f32::EPSILON
    }
}

/// Decode lifecycle of an audio clip inside a decode pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeState {
    Pending,
    Decoding,
    Ready,
    Cancelled,
    Failed,
}

impl DecodeState {
    /// Ready, Cancelled and Failed never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Cancelled | Self::Failed)
    }
}

/// The editing timeline consumed by the export pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    /// Total duration in milliseconds (> 0).
    pub duration_ms: u64,

    #[serde(default)]
    pub video_layers: Vec<VideoLayerItem>,

    #[serde(default)]
    pub audio_clips: Vec<AudioClipItem>,
}

impl Timeline {
    /// Create an empty timeline.
    pub fn new(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            video_layers: Vec::new(),
            audio_clips: Vec::new(),
        }
    }

    /// Parse a timeline from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, TimelineError> {
        let timeline: Timeline = serde_json::from_str(json)?;
        timeline.validate()?;
        Ok(timeline)
    }

    /// Add a video layer, checking it fits the timeline.
    pub fn add_video_layer(&mut self, item: VideoLayerItem) -> Result<ItemId, TimelineError> {
        self.check_new_item(item.id, &item.interval)?;
        let id = item.id;
        self.video_layers.push(item);
        Ok(id)
    }

    /// Add an audio clip, checking it fits the timeline.
    pub fn add_audio_clip(&mut self, item: AudioClipItem) -> Result<ItemId, TimelineError> {
        self.check_new_item(item.id, &item.interval)?;
        if !(item.volume.is_finite() && item.volume >= 0.0) {
            return Err(TimelineError::InvalidInterval {
                id: item.id,
                reason: format!("volume must be a non-negative number, got {}", item.volume),
            });
        }
        let id = item.id;
        self.audio_clips.push(item);
        Ok(id)
    }

    fn check_new_item(&self, id: ItemId, interval: &DisplayInterval) -> Result<(), TimelineError> {
        if self.contains_id(id) {
            return Err(TimelineError::DuplicateId(id));
        }
        self.check_interval(id, interval)
    }

    fn check_interval(&self, id: ItemId, interval: &DisplayInterval) -> Result<(), TimelineError> {
        interval
            .check()
            .map_err(|reason| TimelineError::InvalidInterval { id, reason })?;
        if interval.end_ms() > self.duration_ms {
            return Err(TimelineError::OutOfRange {
                id,
                end_ms: interval.end_ms(),
                duration_ms: self.duration_ms,
            });
        }
        Ok(())
    }

    fn contains_id(&self, id: ItemId) -> bool {
        self.video_layers.iter().any(|item| item.id == id)
            || self.audio_clips.iter().any(|item| item.id == id)
    }

    /// Check every timeline invariant.
    pub fn validate(&self) -> Result<(), TimelineError> {
        if self.duration_ms == 0 {
            return Err(TimelineError::InvalidDuration);
        }

        let mut seen = HashSet::new();
        let ids = self
            .video_layers
            .iter()
            .map(|item| (item.id, &item.interval))
            .chain(self.audio_clips.iter().map(|item| (item.id, &item.interval)));
        for (id, interval) in ids {
            if !seen.insert(id) {
                return Err(TimelineError::DuplicateId(id));
            }
            self.check_interval(id, interval)?;
        }

        for clip in &self.audio_clips {
            if !(clip.volume.is_finite() && clip.volume >= 0.0) {
                return Err(TimelineError::InvalidInterval {
                    id: clip.id,
                    reason: format!("volume must be a non-negative number, got {}", clip.volume),
                });
            }
        }
        Ok(())
    }

    /// Video layers visible at `t_ms`, ordered by compositing index.
    pub fn video_layers_at(&self, t_ms: u64) -> Vec<&VideoLayerItem> {
        let mut layers: Vec<&VideoLayerItem> = self
            .video_layers
            .iter()
            .filter(|item| item.interval.contains(t_ms))
            .collect();
        layers.sort_by_key(|item| item.layer_index);
        layers
    }

    /// The largest number of video layers visible at any one instant.
    pub fn peak_video_concurrency(&self) -> usize {
        let mut edges: Vec<(u64, i32)> = Vec::with_capacity(self.video_layers.len() * 2);
        for item in &self.video_layers {
            edges.push((item.interval.start_ms, 1));
            edges.push((item.interval.end_ms(), -1));
        }
        // Ends sort before starts at the same instant: [start, end) intervals.
        edges.sort();

        let mut active = 0i32;
        let mut peak = 0i32;
        for (_, delta) in edges {
            active += delta;
            peak = peak.max(active);
        }
        peak as usize
    }

    pub fn video_layer(&self, id: ItemId) -> Option<&VideoLayerItem> {
        self.video_layers.iter().find(|item| item.id == id)
    }

    pub fn audio_clip(&self, id: ItemId) -> Option<&AudioClipItem> {
        self.audio_clips.iter().find(|item| item.id == id)
    }

    /// Split the item `id` at timeline position `at_ms`.
    ///
    /// The original item keeps its id and becomes the left half; the right
    /// half is inserted with a fresh id, which is returned.
    pub fn split_item(&mut self, id: ItemId, at_ms: u64) -> Result<ItemId, TimelineError> {
        if let Some(index) = self.video_layers.iter().position(|item| item.id == id) {
            let (left, right) = self.video_layers[index].interval.split_at(at_ms)?;
            let mut right_item = self.video_layers[index].clone();
            right_item.id = Uuid::new_v4();
            right_item.interval = right;
            self.video_layers[index].interval = left;
            let new_id = right_item.id;
            self.video_layers.push(right_item);
            return Ok(new_id);
        }

        if let Some(index) = self.audio_clips.iter().position(|item| item.id == id) {
            let (left, right) = self.audio_clips[index].interval.split_at(at_ms)?;
            let mut right_item = self.audio_clips[index].clone();
            right_item.id = Uuid::new_v4();
            right_item.interval = right;
            self.audio_clips[index].interval = left;
            let new_id = right_item.id;
            self.audio_clips.push(right_item);
            return Ok(new_id);
        }

        Err(TimelineError::ItemNotFound(id))
    }
}

/// Errors raised by timeline construction and validation.
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("Timeline duration must be positive")]
    InvalidDuration,

    #[error("Duplicate item id {0}")]
    DuplicateId(ItemId),

    #[error("Item {id} has an invalid interval: {reason}")]
    InvalidInterval { id: ItemId, reason: String },

    #[error("Item {id} ends at {end_ms}ms, past the timeline duration of {duration_ms}ms")]
    OutOfRange {
        id: ItemId,
        end_ms: u64,
        duration_ms: u64,
    },

    #[error("Item {0} not found")]
    ItemNotFound(ItemId),

    #[error("Cannot split at {at_ms}ms: outside ({start_ms}ms, {end_ms}ms)")]
    SplitOutOfRange {
        at_ms: u64,
        start_ms: u64,
        end_ms: u64,
    },

    #[error("Failed to parse timeline: {0}")]
    Parse(#[from] serde_json::Error),
}
