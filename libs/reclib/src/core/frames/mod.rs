// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Frame types moving through the pipeline: raw frames in, access units out.

mod access_unit;
mod raw_frame;

pub use access_unit::{AccessUnit, AccessUnitFlags};
pub use raw_frame::RawVideoFrame;
