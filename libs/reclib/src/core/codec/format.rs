// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Negotiated track formats.
//!
//! An encoder announces its final output format exactly once, after the
//! codec has seen enough input to fix parameter sets and before any data
//! access unit. The muxer registers tracks from these, never from the
//! requested configs.

use serde::{Deserialize, Serialize};

use super::{AudioCodec, VideoCodec};

/// Logical track kind within the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    Video,
    Audio,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Video => f.write_str("video"),
            TrackKind::Audio => f.write_str("audio"),
        }
    }
}

/// Final per-track parameters, as negotiated by the codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FormatParams {
    Video {
        codec: VideoCodec,
        width: u32,
        height: u32,
        fps: u32,
    },
    Audio {
        codec: AudioCodec,
        sample_rate: u32,
        channels: u16,
        bitrate_bps: u32,
    },
}

/// The format an encoder settled on, emitted once per track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiatedFormat {
    /// Codec identity and stream parameters.
    pub params: FormatParams,
    /// Out-of-band codec configuration blobs in codec-defined order
    /// (H.264: SPS then PPS; AAC: AudioSpecificConfig).
    pub codec_config: Vec<Vec<u8>>,
    /// Nominal access-unit duration in microseconds.
    pub nominal_duration_us: u32,
}

impl NegotiatedFormat {
    /// Track kind this format describes.
    pub fn kind(&self) -> TrackKind {
        match self.params {
            FormatParams::Video { .. } => TrackKind::Video,
            FormatParams::Audio { .. } => TrackKind::Audio,
        }
    }

    /// Codec MIME type.
    pub fn mime_type(&self) -> &'static str {
        match self.params {
            FormatParams::Video { codec, .. } => codec.mime_type(),
            FormatParams::Audio { codec, .. } => codec.mime_type(),
        }
    }
}
