// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod codec;
pub mod encoder;
pub mod error;
pub mod frames;
pub mod muxer;
pub mod pipeline;
pub mod source;

pub use codec::*;
pub use encoder::*;
pub use error::*;
pub use frames::*;
pub use muxer::*;
pub use pipeline::*;
pub use source::{frame_surface, FrameSurface, PcmSource, SurfaceWriter};
