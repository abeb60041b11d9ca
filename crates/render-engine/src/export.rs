//! Export orchestration: timeline in, one muxed container out.
//!
//! The video pipeline (frame decode, composite, encode) and the audio
//! pipeline (decode pool, mix, encode) run as two concurrent tasks that
//! share one cancellation token. Muxing waits for both. All intermediate
//! files live in an [`EncodeSession`], so the destination only ever sees
//! the finished file.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use framecut_common::clock::{us_to_ms, FrameClock};
use framecut_common::config::CodecLimits;
use framecut_common::{FramecutError, FramecutResult};
use framecut_media::{AudioEncodeParams, CodecRegistry, ContainerStats, VideoEncodeParams, VideoFrame};
use framecut_timeline::{ExportSettings, ItemId, Timeline};

use crate::audio_pool::{output_name_for, AudioDecodePool};
use crate::compositor::{plan_frame, CompositeLayer, FrameCompositor, LayerContent, SoftwareCompositor};
use crate::encode::{EncodeStats, EncoderSource, PcmFileSource, TrackEncodeEngine};
use crate::frame_decode::FrameDecodeEngine;
use crate::mixer::{AudioMixEngine, MixStats, PcmClipReader};
use crate::mux::ContainerMuxer;
use crate::session::{cleanup_stale_sessions, stale_session_age, EncodeSession};

/// Codec instances an export holds outside the audio decode pool: one
/// video encoder and one audio encoder.
const ENCODER_INSTANCES: usize = 2;

/// An export job ready to be rendered.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub timeline: Timeline,

    /// Output file path.
    pub output_path: PathBuf,

    pub settings: ExportSettings,
}

/// Progress callback for export rendering.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send + Sync>;

/// Export progress report.
#[derive(Debug, Clone)]
pub struct ExportProgress {
    /// Encode position watermark. Never decreases.
    pub position_ms: u64,

    /// Timeline duration.
    pub duration_ms: u64,

    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Video frames encoded so far.
    pub frames_encoded: u64,

    /// Total frames to encode.
    pub total_frames: u64,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,

    /// Current stage.
    pub stage: ExportStage,
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Preparing,
    Rendering,
    /// Video is done; waiting for the audio track.
    Encoding,
    Finalizing,
    Complete,
    Failed,
    Cancelled,
}

/// Lifecycle of a [`TimelineExporter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl ExportState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// What a completed export produced.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub output_path: PathBuf,
    pub duration_ms: u64,
    pub frames_encoded: u64,
    pub video: EncodeStats,
    pub audio: EncodeStats,
    pub mix: MixStats,
    pub container: ContainerStats,
    /// Audio decode jobs started (shared content decodes once).
    pub decode_jobs: usize,
}

/// Terminal result of an export. Cancellation is not an error.
#[derive(Debug, Clone)]
pub enum ExportOutcome {
    Completed(ExportSummary),
    Cancelled,
}

/// Audio decode jobs allowed at once for `timeline`.
///
/// Video decoders (one per concurrently visible layer) and both encoders
/// are reserved first; the audio pool gets what remains of the hardware
/// limit, capped by the configured maximum.
pub fn audio_decode_permits(limits: &CodecLimits, timeline: &Timeline) -> FramecutResult<usize> {
    let reserved = timeline.peak_video_concurrency() + ENCODER_INSTANCES;
    let spare = limits.max_hardware_instances.saturating_sub(reserved);
    if spare == 0 {
        return Err(FramecutError::unsupported(format!(
            "timeline needs {} codec instances for video and encoding, limit is {}",
            reserved + 1,
            limits.max_hardware_instances
        )));
    }
    Ok(limits.max_concurrent_audio_decodes.clamp(1, spare))
}

fn progress_report(
    position_ms: u64,
    duration_ms: u64,
    progress: f64,
    frames_encoded: u64,
    total_frames: u64,
    elapsed_secs: f64,
    stage: ExportStage,
) -> ExportProgress {
    let progress = progress.clamp(0.0, 1.0);
    let eta_secs = if progress > 0.0 {
        (elapsed_secs / progress) - elapsed_secs
    } else {
        0.0
    }
    .max(0.0);

    ExportProgress {
        position_ms,
        duration_ms,
        progress: if stage == ExportStage::Complete { 1.0 } else { progress },
        frames_encoded,
        total_frames,
        eta_secs,
        stage,
    }
}

struct ProgressReporter {
    callback: Option<ProgressCallback>,
    total_frames: u64,
    started: Instant,
}

impl ProgressReporter {
    /// Report the encode position held by `session`.
    fn report(&self, session: &EncodeSession, frames_encoded: u64, stage: ExportStage) {
        self.emit(
            session.position_ms(),
            session.duration_ms(),
            session.progress(),
            frames_encoded,
            stage,
        );
    }

    fn report_complete(&self, duration_ms: u64, frames_encoded: u64) {
        self.emit(duration_ms, duration_ms, 1.0, frames_encoded, ExportStage::Complete);
    }

    fn emit(
        &self,
        position_ms: u64,
        duration_ms: u64,
        progress: f64,
        frames: u64,
        stage: ExportStage,
    ) {
        if let Some(cb) = &self.callback {
            cb(progress_report(
                position_ms,
                duration_ms,
                progress,
                frames,
                self.total_frames,
                self.started.elapsed().as_secs_f64(),
                stage,
            ));
        }
    }
}

/// Drives one export from `Idle` to a terminal state.
///
/// An exporter runs a single job. Cancel it from elsewhere with the token
/// from [`TimelineExporter::cancel_token`].
pub struct TimelineExporter {
    registry: CodecRegistry,
    limits: CodecLimits,
    work_dir: Option<PathBuf>,
    compositor: Option<Box<dyn FrameCompositor>>,
    cancel: CancellationToken,
    state: watch::Sender<ExportState>,
}

impl TimelineExporter {
    pub fn new(limits: &CodecLimits) -> Self {
        Self::with_registry(CodecRegistry::from_limits(limits), limits)
    }

    /// Use an existing registry; its pool is shared with other users.
    pub fn with_registry(registry: CodecRegistry, limits: &CodecLimits) -> Self {
        let (state, _) = watch::channel(ExportState::Idle);
        Self {
            registry,
            limits: limits.clone(),
            work_dir: None,
            compositor: None,
            cancel: CancellationToken::new(),
            state,
        }
    }

    /// Replace the default software compositor.
    pub fn with_compositor(mut self, compositor: Box<dyn FrameCompositor>) -> Self {
        self.compositor = Some(compositor);
        self
    }

    /// Keep session directories under `dir` instead of next to the output.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> ExportState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ExportState> {
        self.state.subscribe()
    }

    /// Render `job` to its output path.
    pub async fn export(
        &mut self,
        job: ExportJob,
        progress: Option<ProgressCallback>,
    ) -> FramecutResult<ExportOutcome> {
        if self.state() != ExportState::Idle {
            return Err(FramecutError::render("exporter has already run"));
        }

        tracing::info!(
            output = %job.output_path.display(),
            duration_ms = job.timeline.duration_ms,
            video_layers = job.timeline.video_layers.len(),
            audio_clips = job.timeline.audio_clips.len(),
            "Starting export"
        );

        let result = self.run(job, progress).await;
        let state = match &result {
            Ok(ExportOutcome::Completed(_)) => ExportState::Completed,
            Ok(ExportOutcome::Cancelled) => ExportState::Cancelled,
            Err(_) => ExportState::Failed,
        };
        self.state.send_replace(state);

        match &result {
            Ok(ExportOutcome::Completed(summary)) => tracing::info!(
                output = %summary.output_path.display(),
                frames = summary.frames_encoded,
                decode_jobs = summary.decode_jobs,
                "Export complete"
            ),
            Ok(ExportOutcome::Cancelled) => tracing::info!("Export cancelled"),
            Err(e) => tracing::error!(error = %e, "Export failed"),
        }
        result
    }

    async fn run(
        &mut self,
        job: ExportJob,
        progress: Option<ProgressCallback>,
    ) -> FramecutResult<ExportOutcome> {
        job.timeline
            .validate()
            .map_err(|e| FramecutError::timeline(e.to_string()))?;
        job.settings.check().map_err(FramecutError::config)?;
        let permits = audio_decode_permits(&self.limits, &job.timeline)?;

        if let Some(parent) = job.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let scratch_root = match &self.work_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                dir.clone()
            }
            None => match job.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                Some(parent) => parent.to_path_buf(),
                None => PathBuf::from("."),
            },
        };
        match cleanup_stale_sessions(&scratch_root, stale_session_age(), chrono::Utc::now()) {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "Cleaned up stale export sessions"),
            Err(e) => tracing::warn!(error = %e, "Stale session cleanup failed"),
        }

        let session = Arc::new(EncodeSession::create_in(
            &scratch_root,
            &job.output_path,
            job.timeline.duration_ms,
        )?);
        self.state.send_replace(ExportState::Running);

        let clock = FrameClock::new(job.settings.fps);
        let reporter = Arc::new(ProgressReporter {
            callback: progress,
            total_frames: clock.tick_count(job.timeline.duration_ms),
            started: Instant::now(),
        });
        reporter.report(&session, 0, ExportStage::Preparing);

        let pipeline_token = self.cancel.child_token();
        let compositor = self.compositor.take().unwrap_or_else(|| {
            Box::new(SoftwareCompositor::new(job.settings.width, job.settings.height))
                as Box<dyn FrameCompositor>
        });

        let video = VideoPipeline {
            timeline: job.timeline.clone(),
            settings: job.settings.clone(),
            clock,
            registry: self.registry.clone(),
            compositor,
            session: Arc::clone(&session),
            token: pipeline_token.clone(),
            reporter: Arc::clone(&reporter),
        };
        let audio = AudioPipeline {
            timeline: job.timeline.clone(),
            settings: job.settings.clone(),
            registry: self.registry.clone(),
            decode_dir: session.decode_dir(),
            mix_path: session.mix_path(),
            target: session.audio_track_path(),
            permits,
            token: pipeline_token.clone(),
        };

        let video_handle = tokio::spawn(video.run());
        let audio_handle = tokio::spawn(audio.run());

        let (video_result, audio_result) = tokio::join!(
            async {
                let result = join_pipeline("video", video_handle).await;
                if result.is_err() {
                    pipeline_token.cancel();
                }
                result
            },
            async {
                let result = join_pipeline("audio", audio_handle).await;
                if result.is_err() {
                    pipeline_token.cancel();
                }
                result
            }
        );

        // Both pipeline tasks have finished, so this is the last handle.
        let session = Arc::try_unwrap(session)
            .map_err(|_| FramecutError::render("encode session still shared after pipelines joined"))?;

        if self.cancel.is_cancelled() {
            reporter.report(&session, 0, ExportStage::Cancelled);
            session.close();
            return Ok(ExportOutcome::Cancelled);
        }

        let (video_stats, audio_outcome) = match (video_result, audio_result) {
            (Ok(v), Ok(a)) => (v, a),
            (video, audio) => {
                reporter.report(&session, 0, ExportStage::Failed);
                session.close();
                return Err(first_failure(video.err(), audio.err()));
            }
        };

        let frames_encoded = video_stats.packets;
        reporter.report(&session, frames_encoded, ExportStage::Finalizing);

        let muxed = session.muxed_path();
        let video_track = session.video_track_path();
        let audio_track = session.audio_track_path();
        let container = tokio::task::spawn_blocking(move || {
            ContainerMuxer::new().mux_av(&muxed, &video_track, &audio_track)
        })
        .await
        .map_err(|e| FramecutError::render(format!("mux task failed: {}", e)))?;
        let container = match container {
            Ok(stats) => stats,
            Err(e) => {
                reporter.report(&session, frames_encoded, ExportStage::Failed);
                session.close();
                return Err(e);
            }
        };

        if self.cancel.is_cancelled() {
            reporter.report(&session, frames_encoded, ExportStage::Cancelled);
            session.close();
            return Ok(ExportOutcome::Cancelled);
        }

        let duration_ms = session.duration_ms();
        let output_path = session.publish()?;
        reporter.report_complete(duration_ms, frames_encoded);

        Ok(ExportOutcome::Completed(ExportSummary {
            output_path,
            duration_ms,
            frames_encoded,
            video: video_stats,
            audio: audio_outcome.encode,
            mix: audio_outcome.mix,
            container,
            decode_jobs: audio_outcome.decode_jobs,
        }))
    }
}

/// The error that stopped the pipelines. The other side usually reports
/// `Cancelled` because the failing side cancelled it.
fn first_failure(video: Option<FramecutError>, audio: Option<FramecutError>) -> FramecutError {
    let mut errors: Vec<FramecutError> = video.into_iter().chain(audio).collect();
    match errors.iter().position(|e| !e.is_cancelled()) {
        Some(index) => errors.swap_remove(index),
        None => FramecutError::Cancelled,
    }
}

async fn join_pipeline<T>(
    name: &str,
    handle: tokio::task::JoinHandle<FramecutResult<T>>,
) -> FramecutResult<T> {
    match handle.await {
        Ok(result) => result,
        Err(e) => Err(FramecutError::render(format!("{} pipeline task failed: {}", name, e))),
    }
}

/// Pulls composited frames tick by tick.
///
/// A layer's decode engine is opened when the layer first becomes visible
/// and released once the timeline moves past it, so at most
/// `peak_video_concurrency` decoders are leased at once.
struct TimelineFrameSource {
    timeline: Timeline,
    clock: FrameClock,
    registry: CodecRegistry,
    compositor: Box<dyn FrameCompositor>,
    engines: HashMap<ItemId, FrameDecodeEngine>,
    next_frame: u64,
    total_frames: u64,
}

impl TimelineFrameSource {
    fn release_finished(&mut self, timestamp_ms: u64) {
        let timeline = &self.timeline;
        let finished: Vec<ItemId> = self
            .engines
            .keys()
            .copied()
            .filter(|id| {
                timeline
                    .video_layer(*id)
                    .map_or(true, |layer| layer.interval.end_ms() <= timestamp_ms)
            })
            .collect();
        for id in finished {
            if let Some(engine) = self.engines.remove(&id) {
                tracing::debug!(layer = %id, "Releasing frame decoder");
                engine.release();
            }
        }
    }

    fn release_all(&mut self) {
        for (_, engine) in self.engines.drain() {
            engine.release();
        }
    }
}

impl EncoderSource for TimelineFrameSource {
    type Item = VideoFrame;

    fn next_input(&mut self) -> FramecutResult<Option<VideoFrame>> {
        if self.next_frame >= self.total_frames {
            self.release_all();
            return Ok(None);
        }

        let plan = plan_frame(&self.timeline, &self.clock, self.next_frame);
        self.release_finished(plan.timestamp_ms);

        for layer in &plan.layers {
            if !self.engines.contains_key(&layer.item) {
                let source = match self.timeline.video_layer(layer.item) {
                    Some(item) => item.source.clone(),
                    None => continue,
                };
                let engine = FrameDecodeEngine::open(&source, &self.registry)?;
                self.engines.insert(layer.item, engine);
            }
            if let Some(engine) = self.engines.get_mut(&layer.item) {
                let advanced = engine.advance_to(layer.source_time_ms)?;
                if !advanced.delivered {
                    tracing::debug!(
                        layer = %layer.item,
                        source_time_ms = layer.source_time_ms,
                        "No frame at source time, holding last frame"
                    );
                }
            }
        }

        let engines = &self.engines;
        let layers: Vec<CompositeLayer<'_>> = plan
            .layers
            .iter()
            .filter_map(|layer| {
                let frame = engines.get(&layer.item)?.current_frame()?;
                Some(CompositeLayer {
                    content: LayerContent::Frame(frame),
                    rect: layer.rect,
                })
            })
            .collect();

        let mut frame = self.compositor.composite(&layers, plan.timestamp_ms)?;
        frame.pts_us = plan.pts_us;
        self.next_frame += 1;
        Ok(Some(frame))
    }
}

struct VideoPipeline {
    timeline: Timeline,
    settings: ExportSettings,
    clock: FrameClock,
    registry: CodecRegistry,
    compositor: Box<dyn FrameCompositor>,
    session: Arc<EncodeSession>,
    token: CancellationToken,
    reporter: Arc<ProgressReporter>,
}

impl VideoPipeline {
    async fn run(self) -> FramecutResult<EncodeStats> {
        let params = VideoEncodeParams {
            codec: self.settings.video_codec.clone(),
            width: self.settings.width,
            height: self.settings.height,
            frame_rate: self.settings.fps,
            bitrate_kbps: self.settings.video_bitrate_kbps,
            keyframe_interval: self.settings.keyframe_interval,
        };
        let mut encoder = TrackEncodeEngine::new("video");
        encoder.prepare(self.session.video_track_path(), &params, &self.registry)?;

        tracing::debug!(compositor = self.compositor.name(), "Video pipeline started");
        let total_frames = self.clock.tick_count(self.timeline.duration_ms);
        let source = TimelineFrameSource {
            timeline: self.timeline,
            clock: self.clock,
            registry: self.registry,
            compositor: self.compositor,
            engines: HashMap::new(),
            next_frame: 0,
            total_frames,
        };

        let reporter = Arc::clone(&self.reporter);
        let session = Arc::clone(&self.session);
        let mut frames = 0u64;
        let stats = encoder
            .start(source, &self.token, move |packet| {
                frames += 1;
                session.advance(us_to_ms(packet.pts_us + packet.duration_us as i64));
                reporter.report(&session, frames, ExportStage::Rendering);
            })
            .await?;

        self.reporter.report(&self.session, stats.packets, ExportStage::Encoding);
        Ok(stats)
    }
}

struct AudioOutcome {
    mix: MixStats,
    encode: EncodeStats,
    decode_jobs: usize,
}

struct AudioPipeline {
    timeline: Timeline,
    settings: ExportSettings,
    registry: CodecRegistry,
    decode_dir: PathBuf,
    mix_path: PathBuf,
    target: PathBuf,
    permits: usize,
    token: CancellationToken,
}

impl AudioPipeline {
    async fn run(self) -> FramecutResult<AudioOutcome> {
        let format = self.settings.pcm;
        let mut pool = AudioDecodePool::new(self.registry.clone(), format, &self.decode_dir, self.permits)
            .with_parent_token(&self.token);

        let mixed = self.decode_and_mix(&mut pool).await;
        let decode_jobs = pool.jobs_spawned();
        pool.shutdown().await;
        let mix = mixed?;

        let params = AudioEncodeParams {
            codec: self.settings.audio_codec.clone(),
            sample_rate: format.sample_rate,
            channels: format.channels,
            bitrate_kbps: self.settings.audio_bitrate_kbps,
        };
        let mut encoder = TrackEncodeEngine::new("audio");
        encoder.prepare(&self.target, &params, &self.registry)?;
        let source = PcmFileSource::open(&self.mix_path, format)?;
        let encode = encoder.start(source, &self.token, |_| {}).await;
        let _ = std::fs::remove_file(&self.mix_path);

        Ok(AudioOutcome {
            mix,
            encode: encode?,
            decode_jobs,
        })
    }

    async fn decode_and_mix(&self, pool: &mut AudioDecodePool) -> FramecutResult<MixStats> {
        let format = pool.format();
        for clip in &self.timeline.audio_clips {
            pool.submit(clip, &output_name_for(clip, &format))?;
        }
        pool.await_all().await?;

        let mut readers = Vec::with_capacity(self.timeline.audio_clips.len());
        for clip in &self.timeline.audio_clips {
            let path = pool.output_path(clip.id).ok_or_else(|| {
                FramecutError::render(format!("decoded audio for clip {} is missing", clip.id))
            })?;
            readers.push(PcmClipReader::open(path, format, &clip.interval, clip.volume)?);
        }

        let duration_ms = self.timeline.duration_ms;
        let mix_path = self.mix_path.clone();
        let token = self.token.clone();
        let stats = tokio::task::spawn_blocking(move || {
            mix_to_file(&mix_path, format, duration_ms, &mut readers, &token)
        })
        .await
        .map_err(|e| FramecutError::render(format!("mix task failed: {}", e)))??;

        tracing::debug!(
            windows = stats.windows,
            silent = stats.silent_windows,
            clipped = stats.clipped_samples,
            "Audio mixed"
        );
        Ok(stats)
    }
}

fn mix_to_file(
    path: &Path,
    format: framecut_timeline::PcmFormat,
    duration_ms: u64,
    readers: &mut [PcmClipReader],
    token: &CancellationToken,
) -> FramecutResult<MixStats> {
    let mut out = BufWriter::new(File::create(path)?);
    AudioMixEngine::new(format).mix(&mut out, duration_ms, |window| {
        if token.is_cancelled() {
            return Err(FramecutError::Cancelled);
        }
        let mut buffers = Vec::new();
        for reader in readers.iter_mut() {
            if let Some(buffer) = reader.read_window(window)? {
                buffers.push(buffer);
            }
        }
        Ok(buffers)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecut_timeline::{DisplayInterval, LayerRect, VideoLayerItem};

    fn layer(start_ms: u64, duration_ms: u64) -> VideoLayerItem {
        VideoLayerItem::new(
            "v.fcm",
            DisplayInterval::new(start_ms, duration_ms),
            LayerRect::full_frame(4, 4),
        )
    }

    #[test]
    fn test_permits_leave_room_for_video() {
        let limits = CodecLimits {
            max_hardware_instances: 6,
            max_concurrent_audio_decodes: 3,
            decoder_pipeline_depth: 2,
        };
        let mut timeline = Timeline::new(10_000);
        assert_eq!(audio_decode_permits(&limits, &timeline).unwrap(), 3);

        timeline.add_video_layer(layer(0, 5_000)).unwrap();
        timeline.add_video_layer(layer(1_000, 5_000)).unwrap();
        timeline.add_video_layer(layer(6_000, 1_000)).unwrap();
        assert_eq!(timeline.peak_video_concurrency(), 2);
        assert_eq!(audio_decode_permits(&limits, &timeline).unwrap(), 2);

        timeline.add_video_layer(layer(2_000, 1_000)).unwrap();
        timeline.add_video_layer(layer(2_000, 1_000)).unwrap();
        let err = audio_decode_permits(&limits, &timeline).unwrap_err();
        assert!(matches!(err, FramecutError::Unsupported { .. }));
    }

    #[test]
    fn test_progress_report_fraction_and_eta() {
        let report = progress_report(2_500, 10_000, 0.25, 75, 300, 5.0, ExportStage::Rendering);
        assert!((report.progress - 0.25).abs() < 1e-9);
        assert!((report.eta_secs - 15.0).abs() < 1e-9);

        let start = progress_report(0, 10_000, 0.0, 0, 300, 0.0, ExportStage::Preparing);
        assert_eq!(start.progress, 0.0);
        assert_eq!(start.eta_secs, 0.0);

        let done = progress_report(9_990, 10_000, 0.999, 300, 300, 3.0, ExportStage::Complete);
        assert_eq!(done.progress, 1.0);
    }

    #[test]
    fn test_first_failure_skips_cancelled() {
        let err = first_failure(
            Some(FramecutError::Cancelled),
            Some(FramecutError::source_unreadable("a.fcm", "bad")),
        );
        assert!(matches!(err, FramecutError::SourceUnreadable { .. }));
        assert!(first_failure(Some(FramecutError::Cancelled), None).is_cancelled());
    }

    #[tokio::test]
    async fn test_invalid_timeline_fails_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = TimelineExporter::new(&CodecLimits::default());
        let job = ExportJob {
            timeline: Timeline::new(0),
            output_path: dir.path().join("out.fcm"),
            settings: ExportSettings::default(),
        };

        let err = exporter.export(job, None).await.unwrap_err();
        assert!(matches!(err, FramecutError::Timeline { .. }));
        assert_eq!(exporter.state(), ExportState::Failed);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_exporter_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = TimelineExporter::new(&CodecLimits::default());
        let job = ExportJob {
            timeline: Timeline::new(0),
            output_path: dir.path().join("out.fcm"),
            settings: ExportSettings::default(),
        };
        let _ = exporter.export(job.clone(), None).await;

        let err = exporter.export(job, None).await.unwrap_err();
        assert!(matches!(err, FramecutError::Render { .. }));
    }
}
