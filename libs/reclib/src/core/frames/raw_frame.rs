// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Raw video frames as the camera collaborator delivers them.

/// One uncompressed video frame pushed into a [`SurfaceWriter`].
///
/// [`SurfaceWriter`]: crate::core::source::SurfaceWriter
#[derive(Debug, Clone)]
pub struct RawVideoFrame {
    /// Pixel data in the layout the configured codec expects.
    pub data: Vec<u8>,
    /// Capture timestamp in microseconds, monotonic.
    pub pts_us: i64,
}

impl RawVideoFrame {
    pub fn new(data: Vec<u8>, pts_us: i64) -> Self {
        Self { data, pts_us }
    }
}
