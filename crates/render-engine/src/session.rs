//! Per-export scratch space.
//!
//! Every intermediate file of an export lives in a hidden session
//! directory, either next to the destination or under a configured work
//! directory. The muxed result is moved into place on success; dropping
//! the session removes everything else.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use framecut_common::clock::ProgressWatermark;
use framecut_common::{FramecutError, FramecutResult};

pub const SESSION_PREFIX: &str = ".framecut-session-";
const MANIFEST_FILE: &str = "session.json";

/// Session directories older than this are considered abandoned.
pub fn stale_session_age() -> Duration {
    Duration::hours(24)
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionManifest {
    destination: PathBuf,
    created_at: DateTime<Utc>,
    duration_ms: u64,
}

/// Scratch directory, file layout and progress watermark of one export.
#[derive(Debug)]
pub struct EncodeSession {
    dir: TempDir,
    destination: PathBuf,
    duration_ms: u64,
    watermark: ProgressWatermark,
}

impl EncodeSession {
    /// Create a session next to `destination`.
    pub fn create(destination: impl Into<PathBuf>, duration_ms: u64) -> FramecutResult<Self> {
        let destination = destination.into();
        let parent = destination_dir(&destination);
        Self::create_in(&parent, destination, duration_ms)
    }

    /// Create a session under `root` for an export to `destination`.
    pub fn create_in(
        root: &Path,
        destination: impl Into<PathBuf>,
        duration_ms: u64,
    ) -> FramecutResult<Self> {
        let destination = destination.into();
        for dir in [root.to_path_buf(), destination_dir(&destination)] {
            if !dir.is_dir() {
                return Err(FramecutError::FileNotFound { path: dir });
            }
        }

        let dir = tempfile::Builder::new()
            .prefix(SESSION_PREFIX)
            .tempdir_in(root)?;
        fs::create_dir(dir.path().join("decoded"))?;

        let manifest = SessionManifest {
            destination: destination.clone(),
            created_at: Utc::now(),
            duration_ms,
        };
        fs::write(
            dir.path().join(MANIFEST_FILE),
            serde_json::to_vec_pretty(&manifest)?,
        )?;

        tracing::debug!(session = %dir.path().display(), "Created encode session");
        Ok(Self {
            dir,
            destination,
            duration_ms,
            watermark: ProgressWatermark::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Where decoded audio clips are written.
    pub fn decode_dir(&self) -> PathBuf {
        self.dir().join("decoded")
    }

    pub fn mix_path(&self) -> PathBuf {
        self.dir().join("mix.pcm")
    }

    pub fn video_track_path(&self) -> PathBuf {
        self.dir().join("video.fcm")
    }

    pub fn audio_track_path(&self) -> PathBuf {
        self.dir().join("audio.fcm")
    }

    pub fn muxed_path(&self) -> PathBuf {
        self.dir().join("muxed.fcm")
    }

    /// Raise the encode position; returns the watermark.
    pub fn advance(&self, position_ms: u64) -> u64 {
        self.watermark.advance(position_ms.min(self.duration_ms))
    }

    pub fn position_ms(&self) -> u64 {
        self.watermark.position_ms()
    }

    /// Fraction of the timeline encoded, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.duration_ms == 0 {
            return 1.0;
        }
        self.watermark.position_ms() as f64 / self.duration_ms as f64
    }

    /// Move the muxed file to the destination and remove the session.
    ///
    /// A session on another filesystem is copied into a temporary file
    /// beside the destination first, so the final step is still a rename.
    pub fn publish(self) -> FramecutResult<PathBuf> {
        let muxed = self.muxed_path();
        if !muxed.is_file() {
            return Err(FramecutError::render("nothing to publish: muxed file missing"));
        }
        if let Err(e) = fs::rename(&muxed, &self.destination) {
            tracing::debug!(error = %e, "Rename failed, copying across filesystems");
            let staged = tempfile::NamedTempFile::new_in(destination_dir(&self.destination))?;
            fs::copy(&muxed, staged.path())?;
            staged
                .persist(&self.destination)
                .map_err(|e| FramecutError::Io(e.error))?;
        }
        let destination = self.destination.clone();
        self.close();
        tracing::debug!(path = %destination.display(), "Published export");
        Ok(destination)
    }

    /// Remove the session directory and everything in it.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            tracing::warn!(session = %path.display(), error = %e, "Failed to remove session directory");
        }
    }
}

fn destination_dir(destination: &Path) -> PathBuf {
    match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn session_created_at(dir: &Path) -> Option<DateTime<Utc>> {
    if let Ok(bytes) = fs::read(dir.join(MANIFEST_FILE)) {
        if let Ok(manifest) = serde_json::from_slice::<SessionManifest>(&bytes) {
            return Some(manifest.created_at);
        }
    }
    fs::metadata(dir)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

/// Delete session directories in `dir` created before `now - max_age`.
///
/// Returns how many were removed.
pub fn cleanup_stale_sessions(dir: &Path, max_age: Duration, now: DateTime<Utc>) -> FramecutResult<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(SESSION_PREFIX) || !entry.path().is_dir() {
            continue;
        }
        let Some(created_at) = session_created_at(&entry.path()) else {
            continue;
        };
        if now - created_at <= max_age {
            continue;
        }
        match fs::remove_dir_all(entry.path()) {
            Ok(()) => {
                removed += 1;
                tracing::info!(session = %entry.path().display(), created_at = %created_at, "Removed stale session");
            }
            Err(e) => {
                tracing::warn!(session = %entry.path().display(), error = %e, "Failed to remove stale session");
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_session_lives_next_to_destination() {
        let dir = tempfile::tempdir().unwrap();
        let session = EncodeSession::create(dir.path().join("out.fcm"), 1_000).unwrap();
        assert_eq!(session.dir().parent().unwrap(), dir.path());
        assert!(session.decode_dir().is_dir());
        assert!(entries(dir.path())[0].starts_with(SESSION_PREFIX));
    }

    #[test]
    fn test_session_lands_under_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");
        let out = dir.path().join("out");
        fs::create_dir(&work).unwrap();
        fs::create_dir(&out).unwrap();
        let destination = out.join("out.fcm");

        let session = EncodeSession::create_in(&work, &destination, 1_000).unwrap();
        assert_eq!(session.dir().parent().unwrap(), work.as_path());
        assert!(entries(&out).is_empty());

        fs::write(session.muxed_path(), b"muxed").unwrap();
        assert_eq!(session.publish().unwrap(), destination);
        assert_eq!(fs::read(&destination).unwrap(), b"muxed");
        assert!(entries(&work).is_empty());
    }

    #[test]
    fn test_work_dir_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = EncodeSession::create_in(&dir.path().join("missing"), dir.path().join("out.fcm"), 1_000)
            .unwrap_err();
        assert!(matches!(err, FramecutError::FileNotFound { .. }));
    }

    #[test]
    fn test_publish_moves_muxed_and_removes_session() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out.fcm");
        let session = EncodeSession::create(&destination, 1_000).unwrap();
        fs::write(session.muxed_path(), b"muxed").unwrap();
        fs::write(session.mix_path(), b"pcm").unwrap();

        assert_eq!(session.publish().unwrap(), destination);
        assert_eq!(fs::read(&destination).unwrap(), b"muxed");
        assert_eq!(entries(dir.path()), vec!["out.fcm".to_string()]);
    }

    #[test]
    fn test_publish_without_muxed_fails() {
        let dir = tempfile::tempdir().unwrap();
        let session = EncodeSession::create(dir.path().join("out.fcm"), 1_000).unwrap();
        assert!(session.publish().is_err());
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn test_dropped_session_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        {
            let session = EncodeSession::create(dir.path().join("out.fcm"), 1_000).unwrap();
            fs::write(session.video_track_path(), b"partial").unwrap();
        }
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn test_watermark_is_monotonic_and_capped() {
        let dir = tempfile::tempdir().unwrap();
        let session = EncodeSession::create(dir.path().join("out.fcm"), 1_000).unwrap();
        assert_eq!(session.advance(400), 400);
        assert_eq!(session.advance(300), 400);
        assert_eq!(session.advance(5_000), 1_000);
        assert!((session.progress() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = EncodeSession::create(dir.path().join("nope/out.fcm"), 1_000).unwrap_err();
        assert!(matches!(err, FramecutError::FileNotFound { .. }));
    }

    #[test]
    fn test_cleanup_removes_only_stale_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let abandoned = dir.path().join(format!("{}crashed", SESSION_PREFIX));
        fs::create_dir(&abandoned).unwrap();
        let manifest = SessionManifest {
            destination: dir.path().join("a.fcm"),
            created_at: Utc::now() - Duration::hours(48),
            duration_ms: 1_000,
        };
        fs::write(
            abandoned.join(MANIFEST_FILE),
            serde_json::to_vec(&manifest).unwrap(),
        )
        .unwrap();
        fs::create_dir(dir.path().join("keep-me")).unwrap();
        let live = EncodeSession::create(dir.path().join("b.fcm"), 1_000).unwrap();

        let removed = cleanup_stale_sessions(dir.path(), stale_session_age(), Utc::now()).unwrap();
        assert_eq!(removed, 1);
        assert!(!abandoned.exists());
        assert!(live.dir().exists());
        assert!(dir.path().join("keep-me").exists());

        let later = Utc::now() + Duration::hours(25);
        assert_eq!(cleanup_stale_sessions(dir.path(), stale_session_age(), later).unwrap(), 1);
        assert!(!live.dir().exists());
    }
}
