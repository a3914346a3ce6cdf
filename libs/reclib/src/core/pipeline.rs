// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Recording pipeline orchestrator.
//!
//! A [`RecordSession`] owns one recording end to end: two encoder loop
//! threads, the muxer, and the gate that starts the container only after
//! both encoders have negotiated their formats. The registration count and
//! the start decision live in one mutex-guarded critical section, so the
//! second format to arrive triggers `begin` exactly once no matter which
//! thread gets there first.
//!
//! Lifecycle: `Idle → Preparing → Running → Stopping → Stopped`. One
//! session per recording; a new recording is a new session.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::codec::{
    AudioEncoderConfig, CodecRegistry, NegotiatedFormat, TrackKind, VideoEncoderConfig,
};
use crate::core::encoder::{AccessUnitEncoder, TrackSink};
use crate::core::error::{RecordError, Result};
use crate::core::frames::AccessUnit;
use crate::core::muxer::{Mp4Muxer, Mp4MuxerConfig, TrackHandle};
use crate::core::source::{PcmSource, SurfaceWriter};

/// How long `stop` waits for each encoder thread to exit.
const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Poll interval while waiting for a thread to finish.
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Observable pipeline lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    Preparing,
    Running,
    Stopping,
    Stopped,
}

impl PipelineState {
    fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::Preparing => "Preparing",
            PipelineState::Running => "Running",
            PipelineState::Stopping => "Stopping",
            PipelineState::Stopped => "Stopped",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Recording orientation, fixed at session creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    Landscape,
    Portrait,
}

impl Orientation {
    /// Display rotation hint for the container.
    pub fn rotation_degrees(&self) -> u16 {
        match self {
            Orientation::Landscape => 0,
            Orientation::Portrait => 90,
        }
    }
}

/// Configuration for one recording session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Video encoder configuration.
    pub video: VideoEncoderConfig,
    /// Audio encoder configuration.
    pub audio: AudioEncoderConfig,
    /// Output MP4 path.
    pub output_path: PathBuf,
    /// Recording orientation.
    pub orientation: Orientation,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            video: VideoEncoderConfig::default(),
            audio: AudioEncoderConfig::default(),
            output_path: PathBuf::from("/tmp/recording.mp4"),
            orientation: Orientation::default(),
        }
    }
}

impl RecorderConfig {
    pub fn new(output_path: PathBuf) -> Self {
        Self {
            output_path,
            ..Default::default()
        }
    }

    /// Set the video encoder configuration.
    pub fn with_video(mut self, video: VideoEncoderConfig) -> Self {
        self.video = video;
        self
    }

    /// Set the audio encoder configuration.
    pub fn with_audio(mut self, audio: AudioEncoderConfig) -> Self {
        self.audio = audio;
        self
    }

    /// Set the recording orientation.
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }
}

/// What a finished recording produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSummary {
    /// Path of the finalized container.
    pub output_path: PathBuf,
    /// Video samples written.
    pub video_samples: u64,
    /// Audio samples written.
    pub audio_samples: u64,
    /// True when an encoder loop died on a runtime error or teardown
    /// timed out; the container is still finalized with what arrived.
    pub degraded: bool,
}

struct GateInner {
    muxer: Mp4Muxer,
    registered: usize,
    expected: usize,
}

/// Serializes track registration, the start decision, and sample writes.
struct MuxGate {
    inner: Mutex<GateInner>,
}

impl MuxGate {
    fn new(muxer: Mp4Muxer, expected: usize) -> Self {
        Self {
            inner: Mutex::new(GateInner {
                muxer,
                registered: 0,
                expected,
            }),
        }
    }

    /// Register a track; the registration completing the expected set
    /// starts the container, still under the same lock.
    fn register_and_maybe_begin(&self, format: &NegotiatedFormat) -> Result<TrackHandle> {
        let mut inner = self.inner.lock();
        let handle = inner.muxer.register_track(format)?;
        inner.registered += 1;
        if inner.registered == inner.expected {
            inner.muxer.begin()?;
        }
        Ok(handle)
    }

    /// Append a sample. `Ok(false)` means the container has not started
    /// yet and the sample was dropped.
    fn write(&self, handle: TrackHandle, au: &AccessUnit<'_>) -> Result<bool> {
        let mut inner = self.inner.lock();
        if !inner.muxer.is_started() {
            return Ok(false);
        }
        inner.muxer.write_sample(handle, au)?;
        Ok(true)
    }

    fn finish(&self) -> Result<()> {
        self.inner.lock().muxer.finish()
    }

    fn samples(&self) -> (u64, u64) {
        let inner = self.inner.lock();
        (
            inner.muxer.samples_written(TrackKind::Video),
            inner.muxer.samples_written(TrackKind::Audio),
        )
    }
}

/// Per-track sink bridging an encoder loop into the shared gate.
struct GatedTrackWriter {
    gate: Arc<MuxGate>,
    track: TrackKind,
    handle: Option<TrackHandle>,
    dropped_before_start: u64,
}

impl GatedTrackWriter {
    fn new(gate: Arc<MuxGate>, track: TrackKind) -> Self {
        Self {
            gate,
            track,
            handle: None,
            dropped_before_start: 0,
        }
    }
}

impl TrackSink for GatedTrackWriter {
    fn format_ready(&mut self, format: NegotiatedFormat) -> Result<()> {
        let handle = self.gate.register_and_maybe_begin(&format)?;
        self.handle = Some(handle);
        Ok(())
    }

    fn write(&mut self, au: &AccessUnit<'_>) -> Result<()> {
        let handle = self.handle.ok_or_else(|| {
            RecordError::CodecRuntime(format!("{} sample before format negotiation", self.track))
        })?;
        if !self.gate.write(handle, au)? {
            // The other track has not negotiated yet.
            self.dropped_before_start += 1;
            tracing::trace!(
                "[{}] Dropped sample pts={}µs, container not started",
                self.track,
                au.pts_us
            );
        }
        Ok(())
    }
}

struct EncoderWorker {
    track: TrackKind,
    shutdown_tx: crossbeam_channel::Sender<()>,
    handle: JoinHandle<AccessUnitEncoder>,
}

/// One recording, from configuration to finalized file.
pub struct RecordSession {
    config: RecorderConfig,
    state: PipelineState,
    pcm_source: Option<Box<dyn PcmSource>>,
    video_encoder: Option<AccessUnitEncoder>,
    audio_encoder: Option<AccessUnitEncoder>,
    surface: Option<SurfaceWriter>,
    muxer: Option<Mp4Muxer>,
    gate: Option<Arc<MuxGate>>,
    workers: Vec<EncoderWorker>,
    degraded: Arc<AtomicBool>,
    join_timeout: Duration,
}

impl RecordSession {
    /// Create an idle session. `pcm_source` is the microphone pull seam.
    pub fn new(config: RecorderConfig, pcm_source: Box<dyn PcmSource>) -> Self {
        Self {
            config,
            state: PipelineState::Idle,
            pcm_source: Some(pcm_source),
            video_encoder: None,
            audio_encoder: None,
            surface: None,
            muxer: None,
            gate: None,
            workers: Vec::new(),
            degraded: Arc::new(AtomicBool::new(false)),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }

    /// Override the per-thread join timeout used by `stop`.
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Surface writer for the camera collaborator. Available after a
    /// successful `prepare`.
    pub fn surface(&self) -> Option<SurfaceWriter> {
        self.surface.clone()
    }

    fn expect_state(&self, expected: PipelineState) -> Result<()> {
        if self.state != expected {
            return Err(RecordError::InvalidState {
                expected: expected.name(),
                actual: self.state.name(),
            });
        }
        Ok(())
    }

    /// Configure both encoders, then create the output file. Any failure
    /// releases whatever was configured and leaves no file behind.
    pub fn prepare(&mut self, registry: &CodecRegistry) -> Result<()> {
        self.expect_state(PipelineState::Idle)?;
        self.state = PipelineState::Preparing;
        tracing::info!("Preparing recording to {:?}", self.config.output_path);

        if let Err(e) = self.prepare_inner(registry) {
            tracing::warn!("Prepare failed: {}", e);
            self.release_resources();
            self.state = PipelineState::Stopped;
            return Err(e);
        }
        Ok(())
    }

    fn prepare_inner(&mut self, registry: &CodecRegistry) -> Result<()> {
        let pcm_source = self.pcm_source.take().ok_or(RecordError::InvalidState {
            expected: "Idle",
            actual: "consumed",
        })?;

        let (video_encoder, surface) = AccessUnitEncoder::video(&self.config.video, registry)?;
        self.video_encoder = Some(video_encoder);
        self.surface = Some(surface);

        self.audio_encoder = Some(AccessUnitEncoder::audio(
            &self.config.audio,
            registry,
            pcm_source,
        )?);

        // The output file is created last so configure failures never
        // leave a file behind.
        let muxer_config = Mp4MuxerConfig::new(self.config.output_path.clone())
            .with_rotation(self.config.orientation.rotation_degrees())
            .with_expected_tracks(2);
        self.muxer = Some(Mp4Muxer::create(muxer_config)?);
        Ok(())
    }

    /// Spawn both encoder loops and transition to Running.
    pub fn start(&mut self) -> Result<()> {
        self.expect_state(PipelineState::Preparing)?;

        let video = self.video_encoder.take().ok_or(RecordError::InvalidState {
            expected: "Preparing",
            actual: "missing video encoder",
        })?;
        let audio = self.audio_encoder.take().ok_or(RecordError::InvalidState {
            expected: "Preparing",
            actual: "missing audio encoder",
        })?;
        let muxer = self.muxer.take().ok_or(RecordError::InvalidState {
            expected: "Preparing",
            actual: "missing muxer",
        })?;

        let gate = Arc::new(MuxGate::new(muxer, 2));
        self.gate = Some(Arc::clone(&gate));

        // If the second thread fails to spawn, stop() reaps the first.
        let video_worker = spawn_worker(video, Arc::clone(&gate), Arc::clone(&self.degraded))?;
        self.workers.push(video_worker);
        self.state = PipelineState::Running;
        match spawn_worker(audio, gate, Arc::clone(&self.degraded)) {
            Ok(worker) => self.workers.push(worker),
            Err(e) => {
                tracing::error!("Audio encoder thread failed to spawn: {}", e);
                let _ = self.stop();
                return Err(e);
            }
        }

        tracing::info!("Recording started");
        Ok(())
    }

    /// Signal both loops, join with a bounded wait, release encoders,
    /// finalize the container. Past the state check this never fails:
    /// problems are logged and surface as `degraded` in the summary.
    pub fn stop(&mut self) -> Result<RecordingSummary> {
        self.expect_state(PipelineState::Running)?;
        self.state = PipelineState::Stopping;
        tracing::info!("Stopping recording");

        for worker in &self.workers {
            // A full buffer or a hung-up receiver both mean the signal
            // already landed.
            let _ = worker.shutdown_tx.try_send(());
        }
        for worker in self.workers.drain(..) {
            join_worker(worker, self.join_timeout, &self.degraded);
        }

        self.finalize()
    }

    fn finalize(&mut self) -> Result<RecordingSummary> {
        // Encoders still held here never ran; release them directly.
        if let Some(mut encoder) = self.video_encoder.take() {
            encoder.release();
        }
        if let Some(mut encoder) = self.audio_encoder.take() {
            encoder.release();
        }
        self.surface = None;

        let (video_samples, audio_samples) = match (self.gate.take(), self.muxer.take()) {
            (Some(gate), _) => {
                if let Err(e) = gate.finish() {
                    tracing::error!("Muxer finalization failed: {}", e);
                    self.degraded.store(true, Ordering::Release);
                }
                gate.samples()
            }
            (None, Some(mut muxer)) => {
                if let Err(e) = muxer.finish() {
                    tracing::error!("Muxer finalization failed: {}", e);
                    self.degraded.store(true, Ordering::Release);
                }
                (
                    muxer.samples_written(TrackKind::Video),
                    muxer.samples_written(TrackKind::Audio),
                )
            }
            (None, None) => (0, 0),
        };

        self.state = PipelineState::Stopped;
        let summary = RecordingSummary {
            output_path: self.config.output_path.clone(),
            video_samples,
            audio_samples,
            degraded: self.degraded.load(Ordering::Acquire),
        };
        tracing::info!(
            "Recording stopped: {} video / {} audio samples{}",
            summary.video_samples,
            summary.audio_samples,
            if summary.degraded { " (degraded)" } else { "" }
        );
        Ok(summary)
    }

    /// Best-effort teardown from any state. Idempotent.
    pub fn release(&mut self) {
        match self.state {
            PipelineState::Running => {
                if let Err(e) = self.stop() {
                    tracing::warn!("Release: stop failed: {}", e);
                }
            }
            PipelineState::Preparing => {
                // Prepared but never started: finalize directly.
                if let Err(e) = self.finalize() {
                    tracing::warn!("Release: finalize failed: {}", e);
                }
            }
            _ => {}
        }
        self.release_resources();
        self.state = PipelineState::Stopped;
    }

    fn release_resources(&mut self) {
        if let Some(mut encoder) = self.video_encoder.take() {
            encoder.release();
        }
        if let Some(mut encoder) = self.audio_encoder.take() {
            encoder.release();
        }
        self.surface = None;
        self.pcm_source = None;
        self.muxer = None;
        self.gate = None;
    }
}

fn spawn_worker(
    mut encoder: AccessUnitEncoder,
    gate: Arc<MuxGate>,
    degraded: Arc<AtomicBool>,
) -> Result<EncoderWorker> {
    let track = encoder.track();
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);

    let handle = std::thread::Builder::new()
        .name(format!("reclib-{track}-encoder"))
        .spawn(move || {
            let mut sink = GatedTrackWriter::new(gate, track);
            if let Err(e) = encoder.run(&shutdown_rx, &mut sink) {
                tracing::error!("[{}] Encoder loop failed: {}", track, e);
                degraded.store(true, Ordering::Release);
            }
            if sink.dropped_before_start > 0 {
                tracing::warn!(
                    "[{}] {} samples arrived before the container started",
                    track,
                    sink.dropped_before_start
                );
            }
            encoder
        })?;

    Ok(EncoderWorker {
        track,
        shutdown_tx,
        handle,
    })
}

/// Join an encoder thread with a deadline. Expiry is logged and marks the
/// recording degraded; the thread's resources are dropped whenever it
/// eventually exits.
fn join_worker(worker: EncoderWorker, timeout: Duration, degraded: &AtomicBool) {
    let deadline = Instant::now() + timeout;
    while !worker.handle.is_finished() {
        if Instant::now() >= deadline {
            let err = RecordError::TeardownTimeout {
                track: worker.track.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            };
            tracing::error!("{}", err);
            degraded.store(true, Ordering::Release);
            return;
        }
        std::thread::sleep(JOIN_POLL_INTERVAL);
    }

    match worker.handle.join() {
        Ok(mut encoder) => encoder.release(),
        Err(_) => {
            tracing::error!("[{}] Encoder thread panicked", worker.track);
            degraded.store(true, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent_source() -> Box<dyn PcmSource> {
        Box::new(|_buf: &mut [u8]| -> Result<usize> { Ok(0) })
    }

    fn session() -> RecordSession {
        RecordSession::new(RecorderConfig::default(), silent_source())
    }

    #[test]
    fn start_before_prepare_is_invalid() {
        let mut session = session();
        assert!(matches!(
            session.start(),
            Err(RecordError::InvalidState { .. })
        ));
        assert_eq!(session.state(), PipelineState::Idle);
    }

    #[test]
    fn stop_before_start_is_invalid() {
        let mut session = session();
        assert!(matches!(
            session.stop(),
            Err(RecordError::InvalidState { .. })
        ));
    }

    #[test]
    fn prepare_twice_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecorderConfig::new(dir.path().join("out.mp4"));
        let mut session = RecordSession::new(config, silent_source());
        let registry = CodecRegistry::loopback();

        session.prepare(&registry).unwrap();
        assert!(matches!(
            session.prepare(&registry),
            Err(RecordError::InvalidState { .. })
        ));
        session.release();
    }

    #[test]
    fn failed_prepare_reaches_stopped_and_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        let config = RecorderConfig::new(path.clone())
            .with_video(VideoEncoderConfig::new(0, 0));
        let mut session = RecordSession::new(config, silent_source());

        assert!(session.prepare(&CodecRegistry::loopback()).is_err());
        assert_eq!(session.state(), PipelineState::Stopped);
        assert!(!path.exists());
    }

    #[test]
    fn empty_registry_fails_prepare_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        let mut session = RecordSession::new(RecorderConfig::new(path.clone()), silent_source());

        let err = session.prepare(&CodecRegistry::platform()).unwrap_err();
        assert!(matches!(err, RecordError::NoCodecAvailable { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn release_from_idle_is_safe_and_idempotent() {
        let mut session = session();
        session.release();
        session.release();
        assert_eq!(session.state(), PipelineState::Stopped);
    }

    #[test]
    fn orientation_maps_to_rotation() {
        assert_eq!(Orientation::Landscape.rotation_degrees(), 0);
        assert_eq!(Orientation::Portrait.rotation_degrees(), 90);
    }
}
