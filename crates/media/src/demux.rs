//! Reading side of the `.fcm` container.
//!
//! Opening a file scans every record header once and builds a per-track
//! sample index, so seeking is an index lookup and reading a sample is one
//! positioned read.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use framecut_common::{FramecutError, FramecutResult};
use serde::Serialize;

use crate::container::{read_header, RecordHeader, FLAG_SYNC, RECORD_HEADER_LEN};
use crate::format::{AudioFormat, Sample, TrackFormat, TrackKind, VideoFormat};

/// Where a seek lands relative to the requested time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// Last sync sample at or before the time.
    PreviousSync,
    /// First sync sample at or after the time.
    NextSync,
    /// Sync sample nearest to the time.
    ClosestSync,
}

/// Result of reading from the selected track.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleRead {
    Sample(Sample),
    EndOfStream,
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    offset: u64,
    len: u32,
    pts_us: i64,
    duration_us: u32,
    is_sync: bool,
}

/// Summary of a video track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoTrackInfo {
    pub track: usize,
    pub format: VideoFormat,
    pub duration_us: i64,
    pub sample_count: usize,
    pub sync_sample_count: usize,
}

/// Summary of an audio track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioTrackInfo {
    pub track: usize,
    pub format: AudioFormat,
    pub duration_us: i64,
    pub sample_count: usize,
}

/// What a probe of a media file reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaInfo {
    pub video: Option<VideoTrackInfo>,
    pub audio: Option<AudioTrackInfo>,
    /// Longest track end, in milliseconds.
    pub duration_ms: u64,
}

impl MediaInfo {
    pub fn width(&self) -> Option<u32> {
        self.video.as_ref().map(|v| v.format.width)
    }

    pub fn height(&self) -> Option<u32> {
        self.video.as_ref().map(|v| v.format.height)
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.audio.as_ref().map(|a| a.format.sample_rate)
    }
}

/// Demultiplexes one `.fcm` file.
#[derive(Debug)]
pub struct MediaDemuxer {
    path: PathBuf,
    file: File,
    tracks: Vec<TrackFormat>,
    index: Vec<Vec<IndexEntry>>,
    selected: Option<usize>,
    cursor: usize,
    seek_count: u64,
}

impl MediaDemuxer {
    /// Open and index `path`. Any failure is reported as
    /// [`FramecutError::SourceUnreadable`].
    pub fn open(path: impl AsRef<Path>) -> FramecutResult<Self> {
        let path = path.as_ref().to_path_buf();
        let unreadable = |msg: String| FramecutError::source_unreadable(&path, msg);

        let file = File::open(&path).map_err(|e| unreadable(e.to_string()))?;
        let file_len = file
            .metadata()
            .map_err(|e| unreadable(e.to_string()))?
            .len();

        let mut reader = BufReader::new(file);
        let (tracks, mut offset) = read_header(&mut reader).map_err(unreadable)?;
        let mut index: Vec<Vec<IndexEntry>> = vec![Vec::new(); tracks.len()];

        while offset < file_len {
            if file_len - offset < RECORD_HEADER_LEN as u64 {
                return Err(unreadable(format!(
                    "truncated record header at offset {}",
                    offset
                )));
            }
            let mut buf = [0u8; RECORD_HEADER_LEN];
            reader
                .read_exact(&mut buf)
                .map_err(|e| unreadable(e.to_string()))?;
            let header = RecordHeader::from_bytes(&buf);
            let payload_offset = offset + RECORD_HEADER_LEN as u64;
            if payload_offset + header.len as u64 > file_len {
                return Err(unreadable(format!(
                    "record at offset {} runs past end of file",
                    offset
                )));
            }
            let entries = index.get_mut(header.track as usize).ok_or_else(|| {
                unreadable(format!("record references unknown track {}", header.track))
            })?;
            entries.push(IndexEntry {
                offset: payload_offset,
                len: header.len,
                pts_us: header.pts_us,
                duration_us: header.duration_us,
                is_sync: header.flags & FLAG_SYNC != 0,
            });
            reader
                .seek_relative(header.len as i64)
                .map_err(|e| unreadable(e.to_string()))?;
            offset = payload_offset + header.len as u64;
        }

        // Presentation order is what seeking and reading rely on.
        for entries in &mut index {
            entries.sort_by_key(|e| e.pts_us);
        }

        tracing::debug!(
            path = %path.display(),
            tracks = tracks.len(),
            samples = index.iter().map(Vec::len).sum::<usize>(),
            "Indexed media file"
        );

        Ok(Self {
            path,
            file: reader.into_inner(),
            tracks,
            index,
            selected: None,
            cursor: 0,
            seek_count: 0,
        })
    }

    /// Open `path` with its track of `kind` already selected.
    pub fn open_track(path: impl AsRef<Path>, kind: TrackKind) -> FramecutResult<Self> {
        let mut demuxer = Self::open(path)?;
        let track = demuxer.track_of_kind(kind).ok_or_else(|| {
            FramecutError::source_unreadable(&demuxer.path, format!("no {} track", kind))
        })?;
        demuxer.select_track(track)?;
        Ok(demuxer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tracks(&self) -> &[TrackFormat] {
        &self.tracks
    }

    pub fn track_of_kind(&self, kind: TrackKind) -> Option<usize> {
        self.tracks.iter().position(|t| t.kind() == kind)
    }

    /// Select the track subsequent reads and seeks apply to. Resets the
    /// read position to the first sample.
    pub fn select_track(&mut self, track: usize) -> FramecutResult<()> {
        if track >= self.tracks.len() {
            return Err(FramecutError::source_unreadable(
                &self.path,
                format!("no track {}", track),
            ));
        }
        self.selected = Some(track);
        self.cursor = 0;
        Ok(())
    }

    pub fn selected_format(&self) -> Option<&TrackFormat> {
        self.selected.and_then(|t| self.tracks.get(t))
    }

    fn track_duration_us(&self, track: usize) -> i64 {
        self.index[track]
            .iter()
            .map(|e| e.pts_us + e.duration_us as i64)
            .max()
            .unwrap_or(0)
    }

    /// Probe summary of every track.
    pub fn info(&self) -> MediaInfo {
        let mut video = None;
        let mut audio = None;
        for (track, format) in self.tracks.iter().enumerate() {
            let entries = &self.index[track];
            match format {
                TrackFormat::Video(format) if video.is_none() => {
                    video = Some(VideoTrackInfo {
                        track,
                        format: format.clone(),
                        duration_us: self.track_duration_us(track),
                        sample_count: entries.len(),
                        sync_sample_count: entries.iter().filter(|e| e.is_sync).count(),
                    });
                }
                TrackFormat::Audio(format) if audio.is_none() => {
                    audio = Some(AudioTrackInfo {
                        track,
                        format: format.clone(),
                        duration_us: self.track_duration_us(track),
                        sample_count: entries.len(),
                    });
                }
                _ => {}
            }
        }

        let duration_us = (0..self.tracks.len())
            .map(|t| self.track_duration_us(t))
            .max()
            .unwrap_or(0);

        MediaInfo {
            video,
            audio,
            duration_ms: framecut_common::clock::us_to_ms(duration_us),
        }
    }

    fn selected_entries(&self) -> FramecutResult<&[IndexEntry]> {
        let track = self
            .selected
            .ok_or_else(|| FramecutError::source_unreadable(&self.path, "no track selected"))?;
        Ok(&self.index[track])
    }

    /// Read the next sample of the selected track.
    pub fn read_next_sample(&mut self) -> FramecutResult<SampleRead> {
        let entry = match self.selected_entries()?.get(self.cursor) {
            Some(entry) => *entry,
            None => return Ok(SampleRead::EndOfStream),
        };

        let mut data = vec![0u8; entry.len as usize];
        self.file.seek(SeekFrom::Start(entry.offset))?;
        self.file.read_exact(&mut data).map_err(|e| {
            FramecutError::source_unreadable(&self.path, format!("sample read failed: {}", e))
        })?;
        self.cursor += 1;

        Ok(SampleRead::Sample(Sample {
            data,
            pts_us: entry.pts_us,
            duration_us: entry.duration_us,
            is_sync: entry.is_sync,
        }))
    }

    /// Timestamp of the last sync sample at or before `time_us`.
    pub fn previous_sync_us(&self, time_us: i64) -> Option<i64> {
        let entries = self.selected.map(|t| self.index[t].as_slice())?;
        entries
            .iter()
            .take_while(|e| e.pts_us <= time_us)
            .filter(|e| e.is_sync)
            .last()
            .map(|e| e.pts_us)
    }

    /// Reposition the selected track. Returns the timestamp of the sample
    /// reading resumes from, or `None` when the seek lands past the end.
    pub fn seek(&mut self, time_us: i64, mode: SeekMode) -> FramecutResult<Option<i64>> {
        let entries = self.selected_entries()?;
        let syncs = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_sync)
            .map(|(i, e)| (i, e.pts_us));

        let target = match mode {
            SeekMode::PreviousSync => syncs
                .clone()
                .take_while(|&(_, pts)| pts <= time_us)
                .last()
                .or_else(|| syncs.clone().next()),
            SeekMode::NextSync => syncs.clone().find(|&(_, pts)| pts >= time_us),
            SeekMode::ClosestSync => syncs.clone().min_by_key(|&(_, pts)| (pts - time_us).abs()),
        };

        let end = entries.len();
        let landed = target.map(|(_, pts)| pts);
        self.cursor = target.map_or(end, |(i, _)| i);
        self.seek_count += 1;

        tracing::trace!(
            path = %self.path.display(),
            time_us,
            ?mode,
            landed_us = ?landed,
            "Demuxer seek"
        );
        Ok(landed)
    }

    /// Seeks performed since open.
    pub fn seek_count(&self) -> u64 {
        self.seek_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerWriter;
    use crate::format::{MIME_AUDIO_RAW, MIME_VIDEO_FCV1};

    fn write_fixture(path: &Path) {
        let mut writer = ContainerWriter::create(path).unwrap();
        let video = writer
            .add_track(TrackFormat::Video(VideoFormat {
                codec: MIME_VIDEO_FCV1.to_string(),
                width: 2,
                height: 2,
                frame_rate: 10,
                bitrate_kbps: 0,
                codec_config: vec![2, 0, 0, 0, 2, 0, 0, 0],
            }))
            .unwrap();
        let audio = writer
            .add_track(TrackFormat::Audio(AudioFormat {
                codec: MIME_AUDIO_RAW.to_string(),
                sample_rate: 1000,
                channels: 1,
                bitrate_kbps: 0,
                codec_config: Vec::new(),
            }))
            .unwrap();
        writer.start().unwrap();
        for i in 0..10i64 {
            writer
                .write_sample(
                    video,
                    &Sample {
                        data: vec![i as u8; 3],
                        pts_us: i * 100_000,
                        duration_us: 100_000,
                        is_sync: i % 4 == 0,
                    },
                )
                .unwrap();
            writer
                .write_sample(
                    audio,
                    &Sample {
                        data: vec![0; 200],
                        pts_us: i * 100_000,
                        duration_us: 100_000,
                        is_sync: true,
                    },
                )
                .unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_open_missing_file_is_unreadable() {
        let err = MediaDemuxer::open("/nonexistent/clip.fcm").unwrap_err();
        assert!(matches!(err, FramecutError::SourceUnreadable { .. }));
    }

    #[test]
    fn test_garbage_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.fcm");
        std::fs::write(&path, b"definitely not media").unwrap();
        let err = MediaDemuxer::open(&path).unwrap_err();
        assert!(matches!(err, FramecutError::SourceUnreadable { .. }));
    }

    #[test]
    fn test_truncated_record_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.fcm");
        write_fixture(&path);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();
        assert!(MediaDemuxer::open(&path).is_err());
    }

    #[test]
    fn test_info_reports_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.fcm");
        write_fixture(&path);

        let demuxer = MediaDemuxer::open(&path).unwrap();
        let info = demuxer.info();
        assert_eq!(info.duration_ms, 1000);
        assert_eq!(info.width(), Some(2));
        assert_eq!(info.sample_rate(), Some(1000));
        let video = info.video.unwrap();
        assert_eq!(video.sample_count, 10);
        assert_eq!(video.sync_sample_count, 3);
    }

    #[test]
    fn test_reads_selected_track_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.fcm");
        write_fixture(&path);

        let mut demuxer = MediaDemuxer::open_track(&path, TrackKind::Video).unwrap();
        let mut pts = Vec::new();
        while let SampleRead::Sample(sample) = demuxer.read_next_sample().unwrap() {
            assert_eq!(sample.data.len(), 3);
            pts.push(sample.pts_us);
        }
        assert_eq!(pts.len(), 10);
        assert!(pts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_seek_modes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.fcm");
        write_fixture(&path);

        let mut demuxer = MediaDemuxer::open_track(&path, TrackKind::Video).unwrap();
        // Sync samples at 0, 400_000, 800_000.
        assert_eq!(
            demuxer.seek(650_000, SeekMode::PreviousSync).unwrap(),
            Some(400_000)
        );
        assert_eq!(
            demuxer.seek(650_000, SeekMode::NextSync).unwrap(),
            Some(800_000)
        );
        assert_eq!(
            demuxer.seek(550_000, SeekMode::ClosestSync).unwrap(),
            Some(400_000)
        );
        assert_eq!(demuxer.seek(900_000, SeekMode::NextSync).unwrap(), None);
        assert_eq!(
            demuxer.read_next_sample().unwrap(),
            SampleRead::EndOfStream
        );
        assert_eq!(demuxer.seek_count(), 4);
        assert_eq!(demuxer.previous_sync_us(799_999), Some(400_000));
    }

    #[test]
    fn test_read_after_seek_resumes_at_sync() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.fcm");
        write_fixture(&path);

        let mut demuxer = MediaDemuxer::open_track(&path, TrackKind::Video).unwrap();
        demuxer.seek(500_000, SeekMode::PreviousSync).unwrap();
        match demuxer.read_next_sample().unwrap() {
            SampleRead::Sample(sample) => {
                assert!(sample.is_sync);
                assert_eq!(sample.pts_us, 400_000);
                assert_eq!(sample.data, vec![4u8; 3]);
            }
            SampleRead::EndOfStream => panic!("expected a sample"),
        }
    }
}
