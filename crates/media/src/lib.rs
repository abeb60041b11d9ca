//! Framecut Media Layer
//!
//! Everything between a file on disk and a decoded buffer:
//! - **Container:** the `.fcm` track/sample layout, its writer and demuxer
//! - **Codecs:** queue/dequeue decoder and encoder traits, the built-in
//!   software codecs, and the hardware instance pool they are charged to
//! - **Conversion:** channel remapping and streaming resampling of PCM
//! - **Synthesis:** generated test media with traceable frames

pub mod codec;
pub mod container;
pub mod convert;
pub mod demux;
pub mod format;
pub mod synth;

pub use codec::{
    AudioEncodeParams, CodecHandle, CodecRegistry, Decoder, DecoderOutput, Encoder,
    EncoderOutput, HardwareCodecPool, VideoEncodeParams,
};
pub use container::{ContainerStats, ContainerWriter};
pub use demux::{MediaDemuxer, MediaInfo, SampleRead, SeekMode};
pub use format::*;
