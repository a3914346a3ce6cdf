// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Codec identity, encoder configuration, the session protocol and the
//! implementation registry.

mod audio_codec;
mod audio_encoder_config;
mod format;
mod loopback;
mod registry;
mod session;
mod video_codec;
mod video_encoder_config;

pub use audio_codec::AudioCodec;
pub use audio_encoder_config::AudioEncoderConfig;
pub use format::{FormatParams, NegotiatedFormat, TrackKind};
pub use registry::{CodecId, CodecImplementation, CodecRegistry};
pub use session::{CodecSession, OutputBuffer, OutputPoll, SessionRequest, POLL_TIMEOUT};
pub use video_codec::{VideoCodec, FOURCC_H264};
pub use video_encoder_config::VideoEncoderConfig;
