//! Framecut Render Engine
//!
//! Offline pipeline that turns a timeline of video layers and audio clips
//! into one encoded container file.
//!
//! # Pipeline Architecture
//!
//! ```text
//! video layers ── FrameDecodeEngine ──┐
//!                  (per layer)        ├── FrameCompositor ── TrackEncodeEngine ──┐
//!                                     ┘    (per tick)           (video)          │
//!                                                                                ├── ContainerMuxer
//! audio clips ─── AudioDecodePool ──── AudioMixEngine ──── TrackEncodeEngine ────┘        │
//!                 (bounded jobs)      (1s windows)            (audio)                     ▼
//!                                                                                   output.fcm
//! ```
//!
//! Both halves run concurrently under one cancellation token inside an
//! [`EncodeSession`](session::EncodeSession); [`TimelineExporter`] owns the
//! state machine and publishes the result atomically.

pub mod audio_pool;
pub mod compositor;
pub mod encode;
pub mod export;
pub mod frame_decode;
pub mod mixer;
pub mod mux;
pub mod session;

pub use audio_pool::AudioDecodePool;
pub use compositor::{FrameCompositor, SoftwareCompositor};
pub use encode::{EncoderSource, TrackEncodeEngine};
pub use export::*;
pub use frame_decode::{AdvanceResult, FrameDecodeEngine};
pub use mixer::AudioMixEngine;
pub use mux::ContainerMuxer;
pub use session::EncodeSession;
