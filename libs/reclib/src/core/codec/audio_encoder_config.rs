// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Audio encoder configuration.

use serde::{Deserialize, Serialize};

use super::AudioCodec;
use crate::core::error::{RecordError, Result};

/// Sample rates the AAC track of an MP4 file can carry.
const SUPPORTED_SAMPLE_RATES: &[u32] = &[
    8000, 11025, 12000, 16000, 22050, 24000, 32000, 44100, 48000, 64000, 88200, 96000,
];

/// Audio encoder configuration.
///
/// Immutable once an encoder has been configured with it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioEncoderConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count (1 = mono, 2 = stereo).
    pub channels: u16,
    /// Target bitrate in bits per second.
    pub bitrate_bps: u32,
    /// Audio codec to use.
    pub codec: AudioCodec,
    /// Restrict codec selection to software-only implementations.
    pub force_software: bool,
}

impl Default for AudioEncoderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            bitrate_bps: 128_000,
            codec: AudioCodec::default(),
            force_software: false,
        }
    }
}

impl AudioEncoderConfig {
    /// Create a new config with the specified sample rate and channel count.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            ..Default::default()
        }
    }

    /// Set the target bitrate in bits per second.
    pub fn with_bitrate(mut self, bitrate_bps: u32) -> Self {
        self.bitrate_bps = bitrate_bps;
        self
    }

    /// Restrict codec selection to software-only implementations.
    pub fn with_force_software(mut self, enabled: bool) -> Self {
        self.force_software = enabled;
        self
    }

    /// Validate the configuration. Called once at encoder configure time.
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(RecordError::Configuration(format!(
                "unsupported sample rate {}Hz",
                self.sample_rate
            )));
        }
        if self.channels == 0 || self.channels > 2 {
            return Err(RecordError::Configuration(format!(
                "channel count must be 1 or 2, got {}",
                self.channels
            )));
        }
        if self.bitrate_bps == 0 {
            return Err(RecordError::Configuration(
                "bitrate_bps must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Nominal duration of one 1024-sample AAC access unit in microseconds.
    pub fn frame_duration_us(&self) -> u32 {
        (1024 * 1_000_000 / self.sample_rate as u64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(AudioEncoderConfig::default().validate().is_ok());
    }

    #[test]
    fn unsupported_sample_rate_rejected() {
        let config = AudioEncoderConfig::new(44_000, 2);
        assert!(matches!(
            config.validate(),
            Err(RecordError::Configuration(_))
        ));
    }

    #[test]
    fn surround_channel_count_rejected() {
        let config = AudioEncoderConfig::new(48_000, 6);
        assert!(matches!(
            config.validate(),
            Err(RecordError::Configuration(_))
        ));
    }

    #[test]
    fn frame_duration_at_44100() {
        // 1024 samples at 44.1kHz
        assert_eq!(AudioEncoderConfig::default().frame_duration_us(), 23_219);
    }
}
