// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The codec buffer-queue protocol.
//!
//! A [`CodecSession`] is one configured encoder instance. The driver polls
//! it cooperatively: dequeue an input slot, fill it, queue it back; dequeue
//! output, consume the buffer, release the slot. Every wait is bounded by
//! the caller's timeout so a shutdown signal is observed within one loop
//! iteration.
//!
//! Surface-fed video codecs consume frames directly from their
//! [`FrameSurface`] and expose no input queue; the input-side defaults
//! reflect that.
//!
//! [`FrameSurface`]: crate::core::source::FrameSurface

use std::time::Duration;

use super::NegotiatedFormat;
use crate::core::codec::{AudioEncoderConfig, VideoEncoderConfig};
use crate::core::error::{RecordError, Result};
use crate::core::frames::AccessUnitFlags;
use crate::core::source::FrameSurface;

/// Bounded wait used by the encoder driver for every codec poll.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// What a codec factory needs to build a session.
pub enum SessionRequest<'a> {
    Video {
        config: &'a VideoEncoderConfig,
        /// Consumer side of the input surface the camera writes into.
        surface: FrameSurface,
    },
    Audio {
        config: &'a AudioEncoderConfig,
    },
}

/// Metadata for a dequeued output buffer. The payload itself stays inside
/// the session until [`CodecSession::release_output`].
#[derive(Debug, Clone, Copy)]
pub struct OutputBuffer {
    /// Slot index, valid until released.
    pub index: usize,
    /// Valid byte count within the slot.
    pub len: usize,
    /// Presentation timestamp in microseconds.
    pub pts_us: i64,
    /// Access unit flags.
    pub flags: AccessUnitFlags,
}

/// Result of one bounded output poll.
#[derive(Debug)]
pub enum OutputPoll {
    /// The codec fixed its output format. Happens exactly once per
    /// session, before any data buffer.
    Format(NegotiatedFormat),
    /// A compressed buffer is ready.
    Buffer(OutputBuffer),
    /// Nothing became ready within the timeout.
    TimedOut,
}

/// One configured encoder instance speaking the buffer-queue protocol.
pub trait CodecSession: Send {
    /// Dequeue a free input slot, waiting up to `timeout`. `Ok(None)`
    /// means no slot became free (or the codec takes no queued input).
    fn dequeue_input(&mut self, _timeout: Duration) -> Result<Option<usize>> {
        Ok(None)
    }

    /// Writable view of a dequeued input slot.
    fn input_buffer(&mut self, _index: usize) -> Result<&mut [u8]> {
        Err(RecordError::CodecRuntime(
            "codec has no input buffer queue".into(),
        ))
    }

    /// Queue a filled input slot. `len == 0` returns the slot unused.
    fn queue_input(&mut self, _index: usize, _len: usize, _pts_us: i64) -> Result<()> {
        Err(RecordError::CodecRuntime(
            "codec has no input buffer queue".into(),
        ))
    }

    /// Poll for output, waiting up to `timeout`.
    fn dequeue_output(&mut self, timeout: Duration) -> Result<OutputPoll>;

    /// Read-only view of a dequeued output buffer.
    fn output_buffer(&mut self, index: usize) -> Result<&[u8]>;

    /// Return an output slot to the codec.
    fn release_output(&mut self, index: usize) -> Result<()>;

    /// Stop the session and free codec resources. Idempotent; any
    /// in-flight buffers are abandoned.
    fn stop(&mut self);
}
