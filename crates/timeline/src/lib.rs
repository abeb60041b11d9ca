//! Framecut Timeline Model
//!
//! Defines the data contracts the export pipeline consumes:
//! - **Intervals:** where an item sits on the timeline and which source range it reads
//! - **Timeline:** video layers and audio clips with their invariants
//! - **PCM format:** the sample layout shared by every audio buffer
//! - **Export settings:** caller-supplied codec and format selection
//!
//! Timeline positions are milliseconds. Source consumption and timeline
//! occupancy differ whenever `playback_speed != 1.0`; see [`interval`].

pub mod export;
pub mod interval;
pub mod pcm;
pub mod timeline;

pub use export::*;
pub use interval::*;
pub use pcm::*;
pub use timeline::*;
