// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Synchronized camera + microphone recording pipeline.
//!
//! Two access-unit encoder loops (video fed through a frame surface,
//! audio pulled from a PCM source) feed one MP4 muxer. The container
//! starts only after both encoders have negotiated their output formats,
//! and teardown is deterministic: signal, bounded join, release, finalize.
//!
//! ```no_run
//! use reclib::{CodecRegistry, RecordSession, RecorderConfig, Result};
//!
//! fn main() -> Result<()> {
//!     let registry = CodecRegistry::loopback();
//!     let microphone = Box::new(|buf: &mut [u8]| -> Result<usize> {
//!         buf.fill(0);
//!         Ok(buf.len())
//!     });
//!
//!     let mut session = RecordSession::new(
//!         RecorderConfig::new("/tmp/clip.mp4".into()),
//!         microphone,
//!     );
//!     session.prepare(&registry)?;
//!     session.start()?;
//!     // ... camera pushes frames into session.surface() ...
//!     let summary = session.stop()?;
//!     println!("{} video samples", summary.video_samples);
//!     Ok(())
//! }
//! ```

// Re-export crossbeam_channel so collaborators can build shutdown wiring
// against the same version.
pub use crossbeam_channel;

pub mod core;

pub use core::{
    AccessUnit,
    AccessUnitEncoder,
    AccessUnitFlags,
    AudioCodec,
    AudioEncoderConfig,
    CodecId,
    CodecImplementation,
    CodecRegistry,
    CodecSession,
    FormatParams,
    FrameSurface,
    Mp4Muxer,
    Mp4MuxerConfig,
    NegotiatedFormat,
    Orientation,
    OutputBuffer,
    OutputPoll,
    PcmSource,
    PipelineState,
    RawVideoFrame,
    RecordError,
    RecordSession,
    RecorderConfig,
    RecordingSummary,
    Result,
    SessionRequest,
    SurfaceWriter,
    TrackHandle,
    TrackKind,
    TrackSink,
    VideoCodec,
    VideoEncoderConfig,
    frame_surface,
    FOURCC_H264,
    POLL_TIMEOUT,
};
