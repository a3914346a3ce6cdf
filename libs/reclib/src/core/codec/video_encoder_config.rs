// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Video encoder configuration.

use serde::{Deserialize, Serialize};

use super::VideoCodec;
use crate::core::error::{RecordError, Result};

/// Video encoder configuration.
///
/// Immutable once an encoder has been configured with it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoEncoderConfig {
    /// Video width in pixels.
    pub width: u32,
    /// Video height in pixels.
    pub height: u32,
    /// Frames per second.
    pub fps: u32,
    /// Target bitrate in bits per second.
    pub bitrate_bps: u32,
    /// Keyframe interval in frames.
    pub keyframe_interval_frames: u32,
    /// Video codec to use.
    pub codec: VideoCodec,
    /// Restrict codec selection to software-only implementations.
    pub force_software: bool,
}

impl Default for VideoEncoderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            bitrate_bps: 10_000_000,
            keyframe_interval_frames: 30,
            codec: VideoCodec::default(),
            force_software: false,
        }
    }
}

impl VideoEncoderConfig {
    /// Create a new config with specified dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Set the frames per second.
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Set the target bitrate in bits per second.
    pub fn with_bitrate(mut self, bitrate_bps: u32) -> Self {
        self.bitrate_bps = bitrate_bps;
        self
    }

    /// Set the keyframe interval in frames.
    pub fn with_keyframe_interval(mut self, frames: u32) -> Self {
        self.keyframe_interval_frames = frames;
        self
    }

    /// Set the video codec.
    pub fn with_codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Restrict codec selection to software-only implementations.
    pub fn with_force_software(mut self, enabled: bool) -> Self {
        self.force_software = enabled;
        self
    }

    /// Validate the configuration. Called once at encoder configure time.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RecordError::Configuration(format!(
                "video dimensions must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(RecordError::Configuration(format!(
                "video dimensions must be even for 4:2:0 encoding, got {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(RecordError::Configuration("fps must be non-zero".into()));
        }
        if self.bitrate_bps == 0 {
            return Err(RecordError::Configuration(
                "bitrate_bps must be non-zero".into(),
            ));
        }
        if self.keyframe_interval_frames == 0 {
            return Err(RecordError::Configuration(
                "keyframe_interval_frames must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Nominal duration of one access unit in microseconds.
    pub fn frame_duration_us(&self) -> u32 {
        1_000_000 / self.fps
    }
}
