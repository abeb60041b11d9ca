//! The `.fcm` container: writing side and on-disk layout.
//!
//! ```text
//! "FCM1"  u16 version  u8 track_count
//! track_count x { u32 json_len, json TrackFormat }
//! records until EOF: u8 track, u8 flags, i64 pts_us, u32 duration_us, u32 len, payload
//! ```
//!
//! All integers are little-endian. Flag bit 0 marks a sync sample.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use framecut_common::{FramecutError, FramecutResult};

use crate::format::{
    Sample, TrackFormat, TrackKind, MIME_AUDIO_FCA1, MIME_AUDIO_RAW, MIME_VIDEO_FCV1,
};

pub const MAGIC: &[u8; 4] = b"FCM1";
pub const VERSION: u16 = 1;
pub const FLAG_SYNC: u8 = 0x01;
/// Bytes preceding each record payload.
pub const RECORD_HEADER_LEN: usize = 1 + 1 + 8 + 4 + 4;

const MAX_TRACKS: usize = 8;
const MAX_FORMAT_JSON: u32 = 64 * 1024;

/// Parsed fixed fields of one sample record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordHeader {
    pub track: u8,
    pub flags: u8,
    pub pts_us: i64,
    pub duration_us: u32,
    pub len: u32,
}

impl RecordHeader {
    pub(crate) fn to_bytes(self) -> [u8; RECORD_HEADER_LEN] {
        let mut buf = [0u8; RECORD_HEADER_LEN];
        buf[0] = self.track;
        buf[1] = self.flags;
        buf[2..10].copy_from_slice(&self.pts_us.to_le_bytes());
        buf[10..14].copy_from_slice(&self.duration_us.to_le_bytes());
        buf[14..18].copy_from_slice(&self.len.to_le_bytes());
        buf
    }

    pub(crate) fn from_bytes(buf: &[u8; RECORD_HEADER_LEN]) -> Self {
        let mut pts = [0u8; 8];
        pts.copy_from_slice(&buf[2..10]);
        let mut duration = [0u8; 4];
        duration.copy_from_slice(&buf[10..14]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&buf[14..18]);
        Self {
            track: buf[0],
            flags: buf[1],
            pts_us: i64::from_le_bytes(pts),
            duration_us: u32::from_le_bytes(duration),
            len: u32::from_le_bytes(len),
        }
    }
}

/// Read the file header and track table. Returns the formats and the byte
/// offset of the first record.
pub(crate) fn read_header(reader: &mut impl Read) -> Result<(Vec<TrackFormat>, u64), String> {
    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|e| format!("missing container header: {}", e))?;
    if &magic != MAGIC {
        return Err("not an FCM1 container".to_string());
    }

    let mut fixed = [0u8; 3];
    reader
        .read_exact(&mut fixed)
        .map_err(|e| format!("truncated container header: {}", e))?;
    let version = u16::from_le_bytes([fixed[0], fixed[1]]);
    if version != VERSION {
        return Err(format!("unsupported container version {}", version));
    }
    let track_count = fixed[2] as usize;
    if track_count > MAX_TRACKS {
        return Err(format!("container declares {} tracks", track_count));
    }

    let mut offset = 7u64;
    let mut tracks = Vec::with_capacity(track_count);
    for index in 0..track_count {
        let mut len = [0u8; 4];
        reader
            .read_exact(&mut len)
            .map_err(|e| format!("truncated track table: {}", e))?;
        let len = u32::from_le_bytes(len);
        if len > MAX_FORMAT_JSON {
            return Err(format!("track {} format is {} bytes", index, len));
        }
        let mut json = vec![0u8; len as usize];
        reader
            .read_exact(&mut json)
            .map_err(|e| format!("truncated track table: {}", e))?;
        let format: TrackFormat = serde_json::from_slice(&json)
            .map_err(|e| format!("invalid format for track {}: {}", index, e))?;
        tracks.push(format);
        offset += 4 + len as u64;
    }

    Ok((tracks, offset))
}

/// Check that `format` can join a container already holding `existing`.
pub fn check_track_compatible(existing: &[TrackFormat], format: &TrackFormat) -> FramecutResult<()> {
    if existing.len() >= MAX_TRACKS {
        return Err(FramecutError::mux_incompatible("container track limit reached"));
    }
    if existing.iter().any(|t| t.kind() == format.kind()) {
        return Err(FramecutError::mux_incompatible(format!(
            "container already has a {} track",
            format.kind()
        )));
    }

    match format {
        TrackFormat::Video(video) => {
            if video.codec != MIME_VIDEO_FCV1 {
                return Err(FramecutError::mux_incompatible(format!(
                    "codec {} cannot be stored in a video track",
                    video.codec
                )));
            }
            if video.width == 0 || video.height == 0 || video.frame_rate == 0 {
                return Err(FramecutError::mux_incompatible(format!(
                    "video track has degenerate geometry {}x{}@{}",
                    video.width, video.height, video.frame_rate
                )));
            }
        }
        TrackFormat::Audio(audio) => {
            if audio.codec != MIME_AUDIO_FCA1 && audio.codec != MIME_AUDIO_RAW {
                return Err(FramecutError::mux_incompatible(format!(
                    "codec {} cannot be stored in an audio track",
                    audio.codec
                )));
            }
            if audio.sample_rate == 0 || audio.channels == 0 {
                return Err(FramecutError::mux_incompatible(
                    "audio track needs a sample rate and channels",
                ));
            }
        }
    }

    if format.codec() != MIME_AUDIO_RAW && format.codec_config().is_empty() {
        return Err(FramecutError::mux_incompatible(format!(
            "{} track is missing codec configuration",
            format.codec()
        )));
    }

    Ok(())
}

/// Totals reported when a container is finalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerStats {
    pub samples_per_track: Vec<u64>,
    pub bytes_written: u64,
}

/// Writes an `.fcm` file.
///
/// Tracks are declared first, then `start` commits the header, then samples
/// are appended in any track order. Presentation times must not decrease
/// within one track.
pub struct ContainerWriter {
    path: PathBuf,
    out: BufWriter<File>,
    tracks: Vec<TrackFormat>,
    started: bool,
    last_pts: Vec<Option<i64>>,
    stats: ContainerStats,
}

impl ContainerWriter {
    /// Create (or truncate) the output file.
    pub fn create(path: impl AsRef<Path>) -> FramecutResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
            tracks: Vec::new(),
            started: false,
            last_pts: Vec::new(),
            stats: ContainerStats::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tracks(&self) -> &[TrackFormat] {
        &self.tracks
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Declare a track. Returns its index.
    pub fn add_track(&mut self, format: TrackFormat) -> FramecutResult<usize> {
        if self.started {
            return Err(FramecutError::mux_incompatible(
                "tracks cannot be added after the container has started",
            ));
        }
        check_track_compatible(&self.tracks, &format)?;
        self.tracks.push(format);
        self.last_pts.push(None);
        self.stats.samples_per_track.push(0);
        Ok(self.tracks.len() - 1)
    }

    /// Commit the header. No tracks may be added afterwards.
    pub fn start(&mut self) -> FramecutResult<()> {
        if self.started {
            return Ok(());
        }
        if self.tracks.is_empty() {
            return Err(FramecutError::mux_incompatible("container has no tracks"));
        }

        self.out.write_all(MAGIC)?;
        self.out.write_all(&VERSION.to_le_bytes())?;
        self.out.write_all(&[self.tracks.len() as u8])?;
        self.stats.bytes_written += 7;
        for format in &self.tracks {
            let json = serde_json::to_vec(format)?;
            self.out.write_all(&(json.len() as u32).to_le_bytes())?;
            self.out.write_all(&json)?;
            self.stats.bytes_written += 4 + json.len() as u64;
        }
        self.started = true;
        Ok(())
    }

    /// Append one sample to `track`.
    pub fn write_sample(&mut self, track: usize, sample: &Sample) -> FramecutResult<()> {
        if !self.started {
            return Err(FramecutError::render("container written before start"));
        }
        let last = self
            .last_pts
            .get_mut(track)
            .ok_or_else(|| FramecutError::render(format!("no track {} in container", track)))?;
        if let Some(previous) = *last {
            if sample.pts_us < previous {
                return Err(FramecutError::render(format!(
                    "track {} timestamps went backwards: {}us after {}us",
                    track, sample.pts_us, previous
                )));
            }
        }
        *last = Some(sample.pts_us);

        let header = RecordHeader {
            track: track as u8,
            flags: if sample.is_sync { FLAG_SYNC } else { 0 },
            pts_us: sample.pts_us,
            duration_us: sample.duration_us,
            len: sample.data.len() as u32,
        };
        self.out.write_all(&header.to_bytes())?;
        self.out.write_all(&sample.data)?;
        self.stats.bytes_written += (RECORD_HEADER_LEN + sample.data.len()) as u64;
        self.stats.samples_per_track[track] += 1;
        Ok(())
    }

    /// Flush and sync the file.
    pub fn finish(mut self) -> FramecutResult<ContainerStats> {
        if !self.started {
            self.start()?;
        }
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        tracing::debug!(
            path = %self.path.display(),
            bytes = self.stats.bytes_written,
            "Container finalized"
        );
        Ok(self.stats)
    }

    /// Kind of the track at `index`.
    pub fn track_kind(&self, index: usize) -> Option<TrackKind> {
        self.tracks.get(index).map(TrackFormat::kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{AudioFormat, VideoFormat};

    fn video_format() -> TrackFormat {
        TrackFormat::Video(VideoFormat {
            codec: MIME_VIDEO_FCV1.to_string(),
            width: 16,
            height: 8,
            frame_rate: 30,
            bitrate_kbps: 0,
            codec_config: vec![16, 0, 0, 0, 8, 0, 0, 0],
        })
    }

    fn raw_audio_format() -> TrackFormat {
        TrackFormat::Audio(AudioFormat {
            codec: MIME_AUDIO_RAW.to_string(),
            sample_rate: 48_000,
            channels: 2,
            bitrate_kbps: 0,
            codec_config: Vec::new(),
        })
    }

    #[test]
    fn test_record_header_layout() {
        let header = RecordHeader {
            track: 1,
            flags: FLAG_SYNC,
            pts_us: -5,
            duration_us: 33_333,
            len: 42,
        };
        let bytes = header.to_bytes();
        assert_eq!(RecordHeader::from_bytes(&bytes), header);
        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[14..18], &42u32.to_le_bytes());
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ContainerWriter::create(dir.path().join("a.fcm")).unwrap();
        writer.add_track(video_format()).unwrap();
        let err = writer.add_track(video_format()).unwrap_err();
        assert!(matches!(err, FramecutError::MuxIncompatible { .. }));
    }

    #[test]
    fn test_unknown_codec_rejected() {
        let mut format = video_format();
        if let TrackFormat::Video(v) = &mut format {
            v.codec = "video/avc".to_string();
        }
        let err = check_track_compatible(&[], &format).unwrap_err();
        assert!(matches!(err, FramecutError::MuxIncompatible { .. }));
    }

    #[test]
    fn test_missing_codec_config_rejected() {
        let mut format = video_format();
        if let TrackFormat::Video(v) = &mut format {
            v.codec_config.clear();
        }
        assert!(check_track_compatible(&[], &format).is_err());
        // Raw PCM carries no configuration.
        assert!(check_track_compatible(&[], &raw_audio_format()).is_ok());
    }

    #[test]
    fn test_add_track_after_start_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ContainerWriter::create(dir.path().join("a.fcm")).unwrap();
        writer.add_track(raw_audio_format()).unwrap();
        writer.start().unwrap();
        assert!(writer.add_track(video_format()).is_err());
    }

    #[test]
    fn test_backwards_timestamps_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ContainerWriter::create(dir.path().join("a.fcm")).unwrap();
        let track = writer.add_track(raw_audio_format()).unwrap();
        writer.start().unwrap();
        let sample = |pts_us| Sample {
            data: vec![0; 4],
            pts_us,
            duration_us: 10,
            is_sync: true,
        };
        writer.write_sample(track, &sample(100)).unwrap();
        writer.write_sample(track, &sample(100)).unwrap();
        assert!(writer.write_sample(track, &sample(50)).is_err());
    }

    #[test]
    fn test_header_roundtrip_through_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.fcm");
        let mut writer = ContainerWriter::create(&path).unwrap();
        writer.add_track(video_format()).unwrap();
        writer.add_track(raw_audio_format()).unwrap();
        writer.start().unwrap();
        let stats = writer.finish().unwrap();

        let mut file = File::open(&path).unwrap();
        let (tracks, offset) = read_header(&mut file).unwrap();
        assert_eq!(tracks, vec![video_format(), raw_audio_format()]);
        assert_eq!(offset, stats.bytes_written);
    }
}
