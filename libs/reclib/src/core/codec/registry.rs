// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Codec implementation registry.
//!
//! Mirrors the platform's codec list: an ordered set of implementations,
//! each claiming one codec and flagged hardware or software. Selection is
//! hardware-preferred; `force_software` restricts the search to
//! software-only entries and fails when none exists, rather than silently
//! falling back to hardware.

use super::loopback::{loopback_audio_session, loopback_video_session};
use super::session::{CodecSession, SessionRequest};
use super::{AudioCodec, VideoCodec};
use crate::core::error::{RecordError, Result};

/// Codec identity across both track kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    Video(VideoCodec),
    Audio(AudioCodec),
}

impl std::fmt::Display for CodecId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecId::Video(codec) => f.write_str(codec.mime_type()),
            CodecId::Audio(codec) => f.write_str(codec.mime_type()),
        }
    }
}

type SessionFactory = Box<dyn Fn(SessionRequest<'_>) -> Result<Box<dyn CodecSession>> + Send + Sync>;

/// One registered codec implementation.
pub struct CodecImplementation {
    name: String,
    codec: CodecId,
    software_only: bool,
    factory: SessionFactory,
}

impl CodecImplementation {
    pub fn new(
        name: impl Into<String>,
        codec: CodecId,
        software_only: bool,
        factory: impl Fn(SessionRequest<'_>) -> Result<Box<dyn CodecSession>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            codec,
            software_only,
            factory: Box::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn codec(&self) -> CodecId {
        self.codec
    }

    pub fn is_software_only(&self) -> bool {
        self.software_only
    }

    /// Instantiate a session from this implementation.
    pub fn create_session(&self, request: SessionRequest<'_>) -> Result<Box<dyn CodecSession>> {
        (self.factory)(request)
    }
}

impl std::fmt::Debug for CodecImplementation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecImplementation")
            .field("name", &self.name)
            .field("codec", &self.codec)
            .field("software_only", &self.software_only)
            .finish_non_exhaustive()
    }
}

/// Ordered codec implementation list with selection rules.
#[derive(Debug, Default)]
pub struct CodecRegistry {
    implementations: Vec<CodecImplementation>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation. Earlier registrations win ties.
    pub fn register(&mut self, implementation: CodecImplementation) {
        tracing::debug!(
            "Registered codec implementation '{}' for {} (software_only={})",
            implementation.name(),
            implementation.codec(),
            implementation.is_software_only()
        );
        self.implementations.push(implementation);
    }

    /// The codecs the running platform provides.
    ///
    /// Nothing is wired up for this target yet; platform backends
    /// (VideoToolbox, MediaCodec, VA-API) register here as they land.
    pub fn platform() -> Self {
        Self::new()
    }

    /// The built-in deterministic loopback codecs: passthrough "encoders"
    /// that frame raw input into access units with canned parameter sets.
    /// Used by demos and tests; registered as software-only.
    pub fn loopback() -> Self {
        let mut registry = Self::new();
        registry.register(CodecImplementation::new(
            "reclib.loopback.h264",
            CodecId::Video(VideoCodec::H264),
            true,
            loopback_video_session,
        ));
        registry.register(CodecImplementation::new(
            "reclib.loopback.aac",
            CodecId::Audio(AudioCodec::Aac),
            true,
            loopback_audio_session,
        ));
        registry
    }

    pub fn is_empty(&self) -> bool {
        self.implementations.is_empty()
    }

    /// Select an implementation for `codec`.
    ///
    /// Hardware entries are preferred. With `force_software` only
    /// software-only entries are considered and absence is an error, never
    /// a hardware fallback.
    pub fn select(&self, codec: CodecId, force_software: bool) -> Result<&CodecImplementation> {
        let mut candidates = self
            .implementations
            .iter()
            .filter(|imp| imp.codec() == codec);

        if force_software {
            return candidates
                .find(|imp| imp.is_software_only())
                .ok_or(RecordError::NoSoftwareCodecAvailable {
                    codec: codec.to_string(),
                });
        }

        let candidates: Vec<_> = candidates.collect();
        candidates
            .iter()
            .find(|imp| !imp.is_software_only())
            .or_else(|| candidates.first())
            .copied()
            .ok_or(RecordError::NoCodecAvailable {
                codec: codec.to_string(),
            })
    }
}
