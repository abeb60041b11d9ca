//! Bounded-concurrency decoding of audio clips into canonical PCM files.
//!
//! Each job demuxes and decodes one clip's source range, remaps channels,
//! resamples to the pipeline format (folding in playback speed), and writes
//! exactly the clip's timeline span as raw PCM. Jobs wait on a semaphore
//! sized below the hardware codec limit; they queue rather than fail.
//!
//! Outputs are content-addressed: clips reading the same source range in
//! the same format share one job and one file.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use framecut_common::clock::ms_to_us;
use framecut_common::{FramecutError, FramecutResult};
use framecut_media::convert::{remap_channels, samples_to_bytes, StreamResampler};
use framecut_media::{
    CodecRegistry, DecoderOutput, MediaDemuxer, SampleRead, SeekMode, TrackFormat, TrackKind,
};
use framecut_timeline::{AudioClipItem, DecodeState, DisplayInterval, ItemId, PcmFormat};

const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(10);
const PCM_EXTENSION: &str = "pcm";
const PART_EXTENSION: &str = "pcm.part";

/// Content-addressed output name for `clip` decoded into `format`.
///
/// Gain is applied at mix time, so clips differing only in volume share a
/// decode.
pub fn output_name_for(clip: &AudioClipItem, format: &PcmFormat) -> String {
    let mut hasher = Sha256::new();
    hasher.update(clip.source.to_string_lossy().as_bytes());
    hasher.update(clip.interval.source_offset_ms.to_le_bytes());
    hasher.update(clip.interval.duration_ms.to_le_bytes());
    hasher.update(clip.interval.playback_speed.to_bits().to_le_bytes());
    hasher.update(format.sample_rate.to_le_bytes());
    hasher.update(format.channels.to_le_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("clip-{}", &digest[..24])
}

struct DecodeJob {
    output_path: PathBuf,
    part_path: PathBuf,
    token: CancellationToken,
    state: watch::Receiver<DecodeState>,
    handle: Option<JoinHandle<FramecutResult<()>>>,
    /// Why the job failed, kept after its handle has been joined.
    failure: Option<String>,
}

impl DecodeJob {
    fn state(&self) -> DecodeState {
        *self.state.borrow()
    }

    fn is_live(&self) -> bool {
        !matches!(self.state(), DecodeState::Cancelled | DecodeState::Failed)
    }

    async fn join(&mut self) -> FramecutResult<()> {
        let result = match self.handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| FramecutError::render(format!("decode task aborted: {}", e)))
                .and_then(|result| result),
            None => return Ok(()),
        };
        if let Err(e) = &result {
            if !e.is_cancelled() {
                self.failure = Some(e.to_string());
            }
        }
        result
    }

    fn delete_files(&self) {
        for path in [&self.part_path, &self.output_path] {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to delete decode output");
                }
            }
        }
    }
}

/// Owns every audio decode job of one pipeline.
pub struct AudioDecodePool {
    registry: CodecRegistry,
    format: PcmFormat,
    output_dir: PathBuf,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    jobs: HashMap<String, DecodeJob>,
    clips: HashMap<ItemId, String>,
    jobs_spawned: usize,
}

impl AudioDecodePool {
    /// Pool writing into `output_dir` with at most `max_concurrent` jobs
    /// holding a decoder at once.
    pub fn new(
        registry: CodecRegistry,
        format: PcmFormat,
        output_dir: impl Into<PathBuf>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            registry,
            format,
            output_dir: output_dir.into(),
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            cancel: CancellationToken::new(),
            jobs: HashMap::new(),
            clips: HashMap::new(),
            jobs_spawned: 0,
        }
    }

    /// Derive job cancellation from `parent`.
    pub fn with_parent_token(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Decode jobs started over the pool's lifetime.
    pub fn jobs_spawned(&self) -> usize {
        self.jobs_spawned
    }

    fn job_for(&self, clip_id: ItemId) -> Option<&DecodeJob> {
        self.clips.get(&clip_id).and_then(|name| self.jobs.get(name))
    }

    /// Whether `clip_id` has a queued, running or finished decode.
    pub fn has_job(&self, clip_id: ItemId) -> bool {
        self.job_for(clip_id).is_some_and(DecodeJob::is_live)
    }

    pub fn state(&self, clip_id: ItemId) -> Option<DecodeState> {
        self.job_for(clip_id).map(DecodeJob::state)
    }

    /// Decoded PCM for `clip_id`, once its job is ready.
    pub fn output_path(&self, clip_id: ItemId) -> Option<&Path> {
        self.job_for(clip_id)
            .filter(|job| job.state() == DecodeState::Ready)
            .map(|job| job.output_path.as_path())
    }

    /// Enqueue a decode of `clip` into `output_name` and return at once.
    ///
    /// Returns `false` when an existing live job already covers the clip or
    /// its content.
    pub fn submit(&mut self, clip: &AudioClipItem, output_name: &str) -> FramecutResult<bool> {
        if self.has_job(clip.id) {
            return Ok(false);
        }

        if let Some(existing) = self.jobs.get(output_name) {
            if existing.is_live() {
                tracing::debug!(clip = %clip.id, output = output_name, "Reusing decode job");
                self.clips.insert(clip.id, output_name.to_string());
                return Ok(false);
            }
            if let Some(stale) = self.jobs.remove(output_name) {
                stale.delete_files();
            }
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| FramecutError::render("audio decode pool used outside a tokio runtime"))?;

        let output_path = self
            .output_dir
            .join(format!("{}.{}", output_name, PCM_EXTENSION));
        let part_path = self
            .output_dir
            .join(format!("{}.{}", output_name, PART_EXTENSION));
        let token = self.cancel.child_token();
        let (state_tx, state_rx) = watch::channel(DecodeState::Pending);

        let job = JobContext {
            task: DecodeTask {
                clip_id: clip.id,
                source: clip.source.clone(),
                interval: clip.interval,
                format: self.format,
                part_path: part_path.clone(),
                registry: self.registry.clone(),
                token: token.clone(),
            },
            output_path: output_path.clone(),
            semaphore: Arc::clone(&self.semaphore),
            state: state_tx,
        };
        let handle = runtime.spawn(job.run());

        tracing::debug!(
            clip = %clip.id,
            source = %clip.source.display(),
            output = output_name,
            "Submitted audio decode"
        );

        self.jobs.insert(
            output_name.to_string(),
            DecodeJob {
                output_path,
                part_path,
                token,
                state: state_rx,
                handle: Some(handle),
                failure: None,
            },
        );
        self.clips.insert(clip.id, output_name.to_string());
        self.jobs_spawned += 1;
        Ok(true)
    }

    /// Cancel the decode for `clip_id` and delete its output.
    ///
    /// Returns once the job has terminated and its files are gone. A job
    /// still shared with another clip keeps running.
    pub async fn cancel_and_delete(&mut self, clip_id: ItemId) -> FramecutResult<bool> {
        let Some(name) = self.clips.remove(&clip_id) else {
            return Ok(false);
        };
        if self.clips.values().any(|other| other == &name) {
            tracing::debug!(clip = %clip_id, output = %name, "Decode still shared, keeping job");
            return Ok(true);
        }
        let Some(mut job) = self.jobs.remove(&name) else {
            return Ok(false);
        };

        job.token.cancel();
        match job.join().await {
            Ok(()) | Err(FramecutError::Cancelled) => {}
            Err(e) => tracing::debug!(clip = %clip_id, error = %e, "Cancelled decode had failed"),
        }
        job.delete_files();

        tracing::info!(clip = %clip_id, "Cancelled audio decode");
        Ok(true)
    }

    /// Wait until every submitted job has reached a terminal state.
    ///
    /// The first failure is returned after all jobs have finished. Jobs
    /// that failed during an earlier call still fail this one.
    pub async fn await_all(&mut self) -> FramecutResult<()> {
        let mut first_error = None;
        for (name, job) in &mut self.jobs {
            match job.join().await {
                Ok(()) => {}
                Err(FramecutError::Cancelled) => {}
                Err(e) => {
                    tracing::warn!(output = %name, error = %e, "Audio decode failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if let Some((name, job)) = self
            .jobs
            .iter()
            .find(|(_, job)| job.state() == DecodeState::Failed)
        {
            let reason = job.failure.as_deref().unwrap_or("unknown error");
            return Err(FramecutError::codec(format!(
                "audio decode {} failed: {}",
                name, reason
            )));
        }
        if self.cancel.is_cancelled() {
            return Err(FramecutError::Cancelled);
        }
        Ok(())
    }

    /// Cancel every job, wait for all of them, and delete every output.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        for (_, mut job) in self.jobs.drain() {
            let _ = job.join().await;
            job.delete_files();
        }
        self.clips.clear();
    }
}

struct JobContext {
    task: DecodeTask,
    output_path: PathBuf,
    semaphore: Arc<Semaphore>,
    state: watch::Sender<DecodeState>,
}

impl JobContext {
    async fn run(self) -> FramecutResult<()> {
        let Self {
            task,
            output_path,
            semaphore,
            state,
        } = self;
        let token = task.token.clone();
        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            permit = semaphore.acquire_owned() => Some(
                permit.map_err(|_| FramecutError::render("decode semaphore closed"))?,
            ),
        };
        let Some(_permit) = permit else {
            state.send_replace(DecodeState::Cancelled);
            return Err(FramecutError::Cancelled);
        };

        state.send_replace(DecodeState::Decoding);
        let clip_id = task.clip_id;
        let part_path = task.part_path.clone();
        let result = tokio::task::spawn_blocking(move || task.decode())
            .await
            .map_err(|e| FramecutError::render(format!("decode task failed: {}", e)))
            .and_then(|result| result)
            .and_then(|frames| {
                std::fs::rename(&part_path, &output_path)?;
                Ok(frames)
            });

        match result {
            Ok(frames) => {
                state.send_replace(DecodeState::Ready);
                tracing::debug!(clip = %clip_id, frames, "Audio decode ready");
                Ok(())
            }
            Err(e) => {
                let _ = std::fs::remove_file(&part_path);
                let terminal = if e.is_cancelled() {
                    DecodeState::Cancelled
                } else {
                    DecodeState::Failed
                };
                state.send_replace(terminal);
                Err(e)
            }
        }
    }
}

/// The synchronous part of a job. Runs on the blocking pool and checks
/// its token between decoder steps.
struct DecodeTask {
    clip_id: ItemId,
    source: PathBuf,
    interval: DisplayInterval,
    format: PcmFormat,
    part_path: PathBuf,
    registry: CodecRegistry,
    token: CancellationToken,
}

impl DecodeTask {
    /// Decode into the part file. Returns the PCM frames written.
    fn decode(&self) -> FramecutResult<u64> {
        let mut demuxer = MediaDemuxer::open_track(&self.source, TrackKind::Audio)?;
        let source_format = match demuxer.selected_format() {
            Some(TrackFormat::Audio(format)) => format.clone(),
            _ => return Err(FramecutError::source_unreadable(&self.source, "no audio track")),
        };
        let mut decoder = self
            .registry
            .create_audio_decoder(&source_format, &self.source)?;

        let source_pcm = PcmFormat {
            sample_rate: source_format.sample_rate,
            channels: source_format.channels,
        };
        let (range_start_ms, range_end_ms) = self.interval.source_range_ms();
        let want_start = source_pcm.frames_for_ms(range_start_ms);
        let want_end = source_pcm.frames_for_ms(range_end_ms);
        let expected_frames = self
            .format
            .frames_for_ms(self.interval.end_ms() - self.interval.start_ms);

        demuxer.seek(ms_to_us(range_start_ms), SeekMode::PreviousSync)?;

        let mut resampler = StreamResampler::new(
            source_pcm.sample_rate,
            self.format.sample_rate,
            self.interval.playback_speed,
            self.format.channels,
        );
        let mut writer = PcmFileWriter::create(&self.part_path, self.format, expected_frames)?;
        let mut position: Option<u64> = None;
        let mut input_ended = false;
        let mut resampled = Vec::new();

        loop {
            if self.token.is_cancelled() {
                return Err(FramecutError::Cancelled);
            }

            match decoder.dequeue_output(DEQUEUE_TIMEOUT)? {
                DecoderOutput::Frame(chunk) => {
                    let frames = chunk.frames() as u64;
                    let first = *position.get_or_insert_with(|| {
                        let rate = chunk.sample_rate as i128;
                        ((chunk.pts_us.max(0) as i128 * rate + 500_000) / 1_000_000) as u64
                    });
                    position = Some(first + frames);

                    let lo = want_start.saturating_sub(first).min(frames) as usize;
                    let hi = want_end.saturating_sub(first).min(frames) as usize;
                    if lo < hi {
                        let channels = chunk.channels as usize;
                        let slice = &chunk.samples[lo * channels..hi * channels];
                        let remapped = remap_channels(slice, chunk.channels, self.format.channels);
                        resampled.clear();
                        resampler.process(&remapped, &mut resampled);
                        writer.write(&resampled)?;
                    }
                    if first + frames >= want_end {
                        break;
                    }
                }
                DecoderOutput::EndOfStream => break,
                DecoderOutput::TryAgainLater => {
                    if input_ended {
                        return Err(FramecutError::codec(format!(
                            "{} stalled after end of input",
                            decoder.name()
                        )));
                    }
                    match demuxer.read_next_sample()? {
                        SampleRead::Sample(sample) => decoder.queue_input(sample)?,
                        SampleRead::EndOfStream => {
                            decoder.signal_end_of_input();
                            input_ended = true;
                        }
                    }
                }
            }
        }

        resampled.clear();
        resampler.finish(&mut resampled);
        writer.write(&resampled)?;
        decoder.release();
        writer.finish()
    }
}

/// Writes exactly `expected_frames` PCM frames, dropping any excess and
/// padding a short decode with silence.
struct PcmFileWriter {
    out: BufWriter<File>,
    format: PcmFormat,
    expected_frames: u64,
    written_frames: u64,
}

impl PcmFileWriter {
    fn create(path: &Path, format: PcmFormat, expected_frames: u64) -> FramecutResult<Self> {
        Ok(Self {
            out: BufWriter::new(File::create(path)?),
            format,
            expected_frames,
            written_frames: 0,
        })
    }

    fn write(&mut self, samples: &[i16]) -> FramecutResult<()> {
        let channels = self.format.channels as usize;
        let remaining = (self.expected_frames - self.written_frames) as usize;
        let frames = (samples.len() / channels).min(remaining);
        if frames > 0 {
            self.out
                .write_all(&samples_to_bytes(&samples[..frames * channels]))?;
            self.written_frames += frames as u64;
        }
        Ok(())
    }

    fn finish(mut self) -> FramecutResult<u64> {
        let missing = self.expected_frames - self.written_frames;
        if missing > 0 {
            tracing::debug!(frames = missing, "Padding short decode with silence");
            let silence = vec![0u8; missing as usize * self.format.bytes_per_frame()];
            self.out.write_all(&silence)?;
        }
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        Ok(self.expected_frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecut_media::container::ContainerWriter;
    use framecut_media::synth::{write_synthetic, SynthAudio, SynthSpec, Waveform};
    use framecut_media::{AudioFormat, HardwareCodecPool, Sample, MIME_AUDIO_FCA1, MIME_AUDIO_RAW};

    fn registry() -> CodecRegistry {
        CodecRegistry::new(HardwareCodecPool::new(8))
    }

    fn constant_source(dir: &Path, name: &str, level: i16, duration_ms: u64) -> PathBuf {
        let path = dir.join(name);
        write_synthetic(
            &path,
            &SynthSpec {
                video: None,
                audio: Some(SynthAudio {
                    sample_rate: 8_000,
                    channels: 1,
                    duration_ms,
                    waveform: Waveform::Constant(level),
                    codec: MIME_AUDIO_FCA1.to_string(),
                }),
            },
        )
        .unwrap();
        path
    }

    /// Raw 1 kHz mono source whose sample `i` has value `i`.
    fn ramp_source(dir: &Path) -> PathBuf {
        let path = dir.join("ramp.fcm");
        let mut writer = ContainerWriter::create(&path).unwrap();
        let track = writer
            .add_track(TrackFormat::Audio(AudioFormat {
                codec: MIME_AUDIO_RAW.to_string(),
                sample_rate: 1_000,
                channels: 1,
                bitrate_kbps: 0,
                codec_config: Vec::new(),
            }))
            .unwrap();
        writer.start().unwrap();
        for packet in 0..20i64 {
            let samples: Vec<i16> = (0..100).map(|i| (packet * 100 + i) as i16).collect();
            writer
                .write_sample(
                    track,
                    &Sample {
                        data: samples_to_bytes(&samples),
                        pts_us: packet * 100_000,
                        duration_us: 100_000,
                        is_sync: true,
                    },
                )
                .unwrap();
        }
        writer.finish().unwrap();
        path
    }

    fn read_samples(path: &Path) -> Vec<i16> {
        framecut_media::convert::bytes_to_samples(&std::fs::read(path).unwrap())
    }

    #[tokio::test]
    async fn test_decode_normalizes_to_pipeline_format() {
        let dir = tempfile::tempdir().unwrap();
        let source = constant_source(dir.path(), "a.fcm", 1200, 2000);
        let format = PcmFormat::stereo(48_000);
        let mut pool = AudioDecodePool::new(registry(), format, dir.path(), 2);

        let clip = AudioClipItem::new(&source, DisplayInterval::new(0, 1500));
        let name = output_name_for(&clip, &format);
        assert!(pool.submit(&clip, &name).unwrap());
        pool.await_all().await.unwrap();

        assert_eq!(pool.state(clip.id), Some(DecodeState::Ready));
        let output = pool.output_path(clip.id).unwrap();
        let samples = read_samples(output);
        assert_eq!(samples.len() as u64 * 2, format.bytes_for_ms(1500));
        assert!(samples.iter().all(|&s| s == 1200));
    }

    #[tokio::test]
    async fn test_submit_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let source = constant_source(dir.path(), "a.fcm", 100, 1000);
        let format = PcmFormat::default();
        let mut pool = AudioDecodePool::new(registry(), format, dir.path(), 2);

        let clip = AudioClipItem::new(&source, DisplayInterval::new(0, 1000));
        let name = output_name_for(&clip, &format);
        assert!(pool.submit(&clip, &name).unwrap());
        assert!(!pool.submit(&clip, &name).unwrap());
        assert!(pool.has_job(clip.id));
        pool.await_all().await.unwrap();
        assert!(!pool.submit(&clip, &name).unwrap());
        assert_eq!(pool.jobs_spawned(), 1);
    }

    #[tokio::test]
    async fn test_identical_content_shares_one_job() {
        let dir = tempfile::tempdir().unwrap();
        let source = constant_source(dir.path(), "a.fcm", 100, 1000);
        let format = PcmFormat::default();
        let mut pool = AudioDecodePool::new(registry(), format, dir.path(), 2);

        let loud = AudioClipItem::new(&source, DisplayInterval::new(0, 1000));
        let quiet = AudioClipItem::new(&source, DisplayInterval::new(0, 1000)).with_volume(0.2);
        assert_eq!(output_name_for(&loud, &format), output_name_for(&quiet, &format));

        pool.submit(&loud, &output_name_for(&loud, &format)).unwrap();
        pool.submit(&quiet, &output_name_for(&quiet, &format)).unwrap();
        pool.await_all().await.unwrap();

        assert_eq!(pool.jobs_spawned(), 1);
        assert_eq!(pool.output_path(loud.id), pool.output_path(quiet.id));
    }

    #[tokio::test]
    async fn test_source_offset_and_speed() {
        let dir = tempfile::tempdir().unwrap();
        let source = ramp_source(dir.path());
        let format = PcmFormat {
            sample_rate: 1_000,
            channels: 1,
        };
        let mut pool = AudioDecodePool::new(registry(), format, dir.path(), 2);

        let trimmed = AudioClipItem::new(
            &source,
            DisplayInterval::new(0, 200).with_source_offset(500),
        );
        let doubled = AudioClipItem::new(
            &source,
            DisplayInterval::new(0, 400).with_source_offset(1000).with_speed(2.0),
        );
        pool.submit(&trimmed, &output_name_for(&trimmed, &format)).unwrap();
        pool.submit(&doubled, &output_name_for(&doubled, &format)).unwrap();
        pool.await_all().await.unwrap();

        let samples = read_samples(pool.output_path(trimmed.id).unwrap());
        assert_eq!(samples, (500..700).collect::<Vec<i16>>());

        // 400ms of source at 2x fills 200ms of timeline.
        let samples = read_samples(pool.output_path(doubled.id).unwrap());
        assert_eq!(samples.len(), 200);
        assert_eq!(samples[0], 1000);
        assert_eq!(samples[1], 1002);
    }

    #[tokio::test]
    async fn test_cancel_mid_decode_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = constant_source(dir.path(), "long.fcm", 500, 600_000);
        let out_dir = dir.path().join("pcm");
        std::fs::create_dir(&out_dir).unwrap();
        let format = PcmFormat {
            sample_rate: 8_000,
            channels: 1,
        };
        let mut pool = AudioDecodePool::new(registry(), format, &out_dir, 1);

        let clip = AudioClipItem::new(&source, DisplayInterval::new(0, 600_000));
        let name = output_name_for(&clip, &format);
        pool.submit(&clip, &name).unwrap();
        while pool.state(clip.id) == Some(DecodeState::Pending) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(pool.state(clip.id), Some(DecodeState::Decoding));

        assert!(pool.cancel_and_delete(clip.id).await.unwrap());
        assert!(!pool.has_job(clip.id));
        assert!(!out_dir.join(format!("{}.{}", name, PCM_EXTENSION)).exists());
        assert!(!out_dir.join(format!("{}.{}", name, PART_EXTENSION)).exists());
        assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_queued_job_cancelled_before_permit() {
        let dir = tempfile::tempdir().unwrap();
        let source = constant_source(dir.path(), "a.fcm", 500, 1000);
        let out_dir = dir.path().join("pcm");
        std::fs::create_dir(&out_dir).unwrap();
        let format = PcmFormat::default();
        let mut pool = AudioDecodePool::new(registry(), format, &out_dir, 1);

        let first = AudioClipItem::new(&source, DisplayInterval::new(0, 1000));
        let second = AudioClipItem::new(&source, DisplayInterval::new(0, 500));
        pool.submit(&first, &output_name_for(&first, &format)).unwrap();
        pool.submit(&second, &output_name_for(&second, &format)).unwrap();

        pool.cancel_and_delete(second.id).await.unwrap();
        pool.await_all().await.unwrap();

        assert_eq!(pool.state(first.id), Some(DecodeState::Ready));
        assert_eq!(pool.state(second.id), None);
        assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_source_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        let format = PcmFormat::default();
        let mut pool = AudioDecodePool::new(registry(), format, dir.path(), 1);

        let clip = AudioClipItem::new(dir.path().join("missing.fcm"), DisplayInterval::new(0, 1000));
        pool.submit(&clip, &output_name_for(&clip, &format)).unwrap();

        let err = pool.await_all().await.unwrap_err();
        assert!(matches!(err, FramecutError::SourceUnreadable { .. }));
        assert_eq!(pool.state(clip.id), Some(DecodeState::Failed));

        let again = pool.await_all().await.unwrap_err();
        assert!(matches!(again, FramecutError::Codec { .. }));
        assert!(!pool.has_job(clip.id));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_deletes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let source = constant_source(dir.path(), "a.fcm", 500, 1000);
        let out_dir = dir.path().join("pcm");
        std::fs::create_dir(&out_dir).unwrap();
        let format = PcmFormat::default();
        let mut pool = AudioDecodePool::new(registry(), format, &out_dir, 2);

        let clip = AudioClipItem::new(&source, DisplayInterval::new(0, 1000));
        pool.submit(&clip, &output_name_for(&clip, &format)).unwrap();
        pool.await_all().await.unwrap();
        pool.shutdown().await;

        assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 0);
    }
}
