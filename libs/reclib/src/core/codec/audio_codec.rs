// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Audio codec types.

use serde::{Deserialize, Serialize};

/// Audio codec type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioCodec {
    /// AAC-LC codec.
    Aac,
}

impl Default for AudioCodec {
    fn default() -> Self {
        AudioCodec::Aac
    }
}

impl AudioCodec {
    /// MIME type for this codec.
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioCodec::Aac => "audio/mp4a-latm",
        }
    }
}

impl std::fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mime_type())
    }
}
