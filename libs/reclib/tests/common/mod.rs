// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Shared fixtures for the pipeline integration tests.

// Each test binary compiles its own copy; not every binary uses every
// fixture.
#![allow(dead_code)]

use std::time::Duration;

use reclib::{
    AudioCodec, CodecId, CodecImplementation, CodecRegistry, CodecSession, FormatParams,
    NegotiatedFormat, OutputPoll, RecordError, Result, SessionRequest, VideoCodec,
};

/// Install a fmt subscriber once so `RUST_LOG=debug cargo test` shows the
/// pipeline's tracing output.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// A codec session that announces its format after a fixed delay and then
/// produces no media. Used to force either track to negotiate first.
pub struct DelayedFormatSession {
    format: NegotiatedFormat,
    delay: Duration,
    announced: bool,
}

impl DelayedFormatSession {
    fn new(format: NegotiatedFormat, delay: Duration) -> Self {
        Self {
            format,
            delay,
            announced: false,
        }
    }
}

impl CodecSession for DelayedFormatSession {
    fn dequeue_output(&mut self, timeout: Duration) -> Result<OutputPoll> {
        if !self.announced {
            std::thread::sleep(self.delay);
            self.announced = true;
            return Ok(OutputPoll::Format(self.format.clone()));
        }
        std::thread::sleep(timeout);
        Ok(OutputPoll::TimedOut)
    }

    fn output_buffer(&mut self, _index: usize) -> Result<&[u8]> {
        Err(RecordError::CodecRuntime(
            "delayed session has no output buffers".into(),
        ))
    }

    fn release_output(&mut self, _index: usize) -> Result<()> {
        Err(RecordError::CodecRuntime(
            "delayed session has no output buffers".into(),
        ))
    }

    fn stop(&mut self) {}
}

/// Registry whose video/audio codecs negotiate after the given delays.
pub fn delayed_registry(video_delay: Duration, audio_delay: Duration) -> CodecRegistry {
    let mut registry = CodecRegistry::new();

    registry.register(CodecImplementation::new(
        "test.delayed.h264",
        CodecId::Video(VideoCodec::H264),
        true,
        move |request| match request {
            SessionRequest::Video { config, .. } => {
                let format = NegotiatedFormat {
                    params: FormatParams::Video {
                        codec: config.codec,
                        width: config.width,
                        height: config.height,
                        fps: config.fps,
                    },
                    codec_config: vec![
                        vec![0x67, 0x42, 0xc0, 0x1f],
                        vec![0x68, 0xce, 0x3c, 0x80],
                    ],
                    nominal_duration_us: config.frame_duration_us(),
                };
                Ok(Box::new(DelayedFormatSession::new(format, video_delay)))
            }
            SessionRequest::Audio { .. } => Err(RecordError::Configuration(
                "video session request expected".into(),
            )),
        },
    ));

    registry.register(CodecImplementation::new(
        "test.delayed.aac",
        CodecId::Audio(AudioCodec::Aac),
        true,
        move |request| match request {
            SessionRequest::Audio { config } => {
                let format = NegotiatedFormat {
                    params: FormatParams::Audio {
                        codec: config.codec,
                        sample_rate: config.sample_rate,
                        channels: config.channels,
                        bitrate_bps: config.bitrate_bps,
                    },
                    codec_config: vec![vec![0x12, 0x10]],
                    nominal_duration_us: config.frame_duration_us(),
                };
                Ok(Box::new(DelayedFormatSession::new(format, audio_delay)))
            }
            SessionRequest::Video { .. } => Err(RecordError::Configuration(
                "audio session request expected".into(),
            )),
        },
    ));

    registry
}
