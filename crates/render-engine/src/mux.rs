//! Joins elementary-stream files into one container without re-encoding.

use std::path::{Path, PathBuf};

use framecut_common::FramecutResult;
use framecut_media::{ContainerStats, ContainerWriter, MediaDemuxer, SampleRead};

struct InputTrack {
    demuxer: MediaDemuxer,
    output_track: usize,
    done: bool,
}

/// Copies samples from track files into one output container.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContainerMuxer;

impl ContainerMuxer {
    pub fn new() -> Self {
        Self
    }

    /// Mux every track of every file in `tracks` into `output`.
    ///
    /// Output tracks follow input order. Samples are copied round-robin,
    /// one per track per turn, until every input is exhausted. A format
    /// the container rejects fails with `MuxIncompatible` before any
    /// sample is written. On failure `output` is removed.
    pub fn mux(&self, output: &Path, tracks: &[PathBuf]) -> FramecutResult<ContainerStats> {
        let result = Self::copy_tracks(output, tracks);
        if result.is_err() {
            let _ = std::fs::remove_file(output);
        }
        result
    }

    fn copy_tracks(output: &Path, tracks: &[PathBuf]) -> FramecutResult<ContainerStats> {
        let mut writer = ContainerWriter::create(output)?;
        let mut inputs = Vec::new();

        for path in tracks {
            let probe = MediaDemuxer::open(path)?;
            for (index, format) in probe.tracks().iter().enumerate() {
                let output_track = writer.add_track(format.clone())?;
                let mut demuxer = MediaDemuxer::open(path)?;
                demuxer.select_track(index)?;
                tracing::debug!(
                    input = %path.display(),
                    kind = %format.kind(),
                    codec = format.codec(),
                    output_track,
                    "Muxing track"
                );
                inputs.push(InputTrack {
                    demuxer,
                    output_track,
                    done: false,
                });
            }
        }

        writer.start()?;

        let mut remaining = inputs.len();
        while remaining > 0 {
            for input in inputs.iter_mut().filter(|i| !i.done) {
                match input.demuxer.read_next_sample()? {
                    SampleRead::Sample(sample) => writer.write_sample(input.output_track, &sample)?,
                    SampleRead::EndOfStream => {
                        input.done = true;
                        remaining -= 1;
                    }
                }
            }
        }

        let stats = writer.finish()?;
        tracing::info!(
            output = %output.display(),
            tracks = inputs.len(),
            bytes = stats.bytes_written,
            "Container muxed"
        );
        Ok(stats)
    }

    /// Mux a video track file and an audio track file, in that order.
    pub fn mux_av(&self, output: &Path, video: &Path, audio: &Path) -> FramecutResult<ContainerStats> {
        self.mux(output, &[video.to_path_buf(), audio.to_path_buf()])
    }
}
