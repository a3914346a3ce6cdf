// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Access-unit encoder driver.
//!
//! One [`AccessUnitEncoder`] drives one codec session on a dedicated
//! thread: pull input (audio), poll output, hand compressed access units
//! to a [`TrackSink`]. The loop is cooperative — every codec wait is
//! bounded by [`POLL_TIMEOUT`] so the shutdown signal is observed within
//! one iteration.
//!
//! Ordering contract: the negotiated format reaches the sink exactly once,
//! before any data access unit. A data buffer arriving first is a codec
//! protocol violation and kills the loop.

use std::time::Instant;

use crate::core::codec::{
    AudioEncoderConfig, CodecId, CodecRegistry, CodecSession, NegotiatedFormat, OutputPoll,
    SessionRequest, TrackKind, VideoEncoderConfig, POLL_TIMEOUT,
};
use crate::core::error::{RecordError, Result};
use crate::core::frames::AccessUnit;
use crate::core::source::{frame_surface, PcmSource, SurfaceWriter};

/// Where an encoder delivers its negotiated format and access units.
pub trait TrackSink {
    /// Called exactly once, before any [`TrackSink::write`].
    fn format_ready(&mut self, format: NegotiatedFormat) -> Result<()>;

    /// One compressed access unit. The borrow ends when the call returns.
    fn write(&mut self, au: &AccessUnit<'_>) -> Result<()>;
}

/// Drives one configured codec session until shutdown or error.
pub struct AccessUnitEncoder {
    track: TrackKind,
    implementation_name: String,
    session: Option<Box<dyn CodecSession>>,
    pcm_source: Option<Box<dyn PcmSource>>,
    clock: Instant,
}

impl AccessUnitEncoder {
    /// Configure a video encoder. Returns the encoder and the surface
    /// writer the camera collaborator pushes raw frames into.
    pub fn video(
        config: &VideoEncoderConfig,
        registry: &CodecRegistry,
    ) -> Result<(Self, SurfaceWriter)> {
        config.validate()?;
        let implementation = registry.select(CodecId::Video(config.codec), config.force_software)?;
        let (writer, surface) = frame_surface();
        let session = implementation.create_session(SessionRequest::Video { config, surface })?;
        tracing::info!(
            "Configured video encoder '{}': {}x{}@{} {}",
            implementation.name(),
            config.width,
            config.height,
            config.fps,
            config.codec.mime_type()
        );
        Ok((
            Self {
                track: TrackKind::Video,
                implementation_name: implementation.name().to_string(),
                session: Some(session),
                pcm_source: None,
                clock: Instant::now(),
            },
            writer,
        ))
    }

    /// Configure an audio encoder fed by a pull-based PCM source.
    pub fn audio(
        config: &AudioEncoderConfig,
        registry: &CodecRegistry,
        source: Box<dyn PcmSource>,
    ) -> Result<Self> {
        config.validate()?;
        let implementation = registry.select(CodecId::Audio(config.codec), config.force_software)?;
        let session = implementation.create_session(SessionRequest::Audio { config })?;
        tracing::info!(
            "Configured audio encoder '{}': {}Hz {}ch {}",
            implementation.name(),
            config.sample_rate,
            config.channels,
            config.codec.mime_type()
        );
        Ok(Self {
            track: TrackKind::Audio,
            implementation_name: implementation.name().to_string(),
            session: Some(session),
            pcm_source: Some(source),
            clock: Instant::now(),
        })
    }

    pub fn track(&self) -> TrackKind {
        self.track
    }

    pub fn implementation_name(&self) -> &str {
        &self.implementation_name
    }

    /// Run the poll loop until shutdown or error.
    pub fn run(
        &mut self,
        shutdown_rx: &crossbeam_channel::Receiver<()>,
        sink: &mut dyn TrackSink,
    ) -> Result<()> {
        let track = self.track;
        let session = self.session.as_mut().ok_or_else(|| {
            RecordError::CodecRuntime(format!("{track} encoder run after release"))
        })?;
        let mut source = self.pcm_source.as_mut();
        let clock = &self.clock;

        tracing::info!("[{}] Encoder loop started", track);
        let mut format_emitted = false;

        loop {
            if shutdown_rx.try_recv().is_ok() {
                tracing::debug!("[{}] Shutdown signal received", track);
                break;
            }

            // Pull-fed input: at most one buffer per iteration, timestamped
            // at queue time from the loop's monotonic clock.
            if let Some(source) = source.as_deref_mut() {
                if let Some(index) = session.dequeue_input(POLL_TIMEOUT)? {
                    let buf = session.input_buffer(index)?;
                    let len = source.read(buf)?;
                    let pts_us = clock.elapsed().as_micros() as i64;
                    session.queue_input(index, len, pts_us)?;
                }
            }

            match session.dequeue_output(POLL_TIMEOUT)? {
                OutputPoll::Format(format) => {
                    if format_emitted {
                        tracing::warn!("[{}] Repeated format change ignored", track);
                        continue;
                    }
                    format_emitted = true;
                    tracing::info!("[{}] Format negotiated: {}", track, format.mime_type());
                    sink.format_ready(format)?;
                }
                OutputPoll::Buffer(info) => {
                    // Payloads of one byte or less carry no media.
                    if info.len <= 1 {
                        tracing::trace!("[{}] Skipping {}-byte output buffer", track, info.len);
                        session.release_output(info.index)?;
                        continue;
                    }
                    if !format_emitted {
                        session.release_output(info.index)?;
                        return Err(RecordError::CodecRuntime(format!(
                            "{track} codec produced data before announcing its format"
                        )));
                    }
                    {
                        let data = session.output_buffer(info.index)?;
                        let au = AccessUnit {
                            data: &data[..info.len],
                            pts_us: info.pts_us,
                            flags: info.flags,
                        };
                        sink.write(&au)?;
                    }
                    session.release_output(info.index)?;
                }
                OutputPoll::TimedOut => {}
            }
        }

        tracing::info!("[{}] Encoder loop stopped", track);
        Ok(())
    }

    /// Stop the codec session and drop the input seam. Idempotent;
    /// in-flight buffers are abandoned.
    pub fn release(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop();
            tracing::debug!("[{}] Encoder released", self.track);
        }
        self.pcm_source = None;
    }
}
