// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Compressed access units as they leave an encoder.

use bitflags::bitflags;

bitflags! {
    /// Flags attached to a compressed access unit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessUnitFlags: u32 {
        /// Sync sample (video keyframe; every audio access unit).
        const KEYFRAME = 1 << 0;
        /// Out-of-band codec configuration data, not media.
        const CODEC_CONFIG = 1 << 1;
        /// Last access unit of the stream.
        const END_OF_STREAM = 1 << 2;
    }
}

/// One compressed access unit, borrowed from the codec's output buffer.
///
/// Valid only for the duration of a single sink call; the encoder driver
/// releases the underlying codec slot as soon as the sink returns.
#[derive(Debug)]
pub struct AccessUnit<'a> {
    /// Compressed payload bytes.
    pub data: &'a [u8],
    /// Presentation timestamp in microseconds, monotonic within a track.
    pub pts_us: i64,
    /// Access unit flags.
    pub flags: AccessUnitFlags,
}

impl AccessUnit<'_> {
    /// Whether this access unit is a sync sample.
    pub fn is_sync(&self) -> bool {
        self.flags.contains(AccessUnitFlags::KEYFRAME)
    }

    /// Whether this access unit carries codec configuration, not media.
    pub fn is_codec_config(&self) -> bool {
        self.flags.contains(AccessUnitFlags::CODEC_CONFIG)
    }
}
