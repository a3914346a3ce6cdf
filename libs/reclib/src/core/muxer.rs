// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! MP4 container multiplexer.
//!
//! Wraps the `mp4` crate's writer behind the pipeline's track lifecycle:
//! register every expected track from its [`NegotiatedFormat`], then
//! `begin` exactly once, then append samples, then `finish`. Lifecycle
//! misuse (write before begin, register after begin, begin twice,
//! non-monotonic timestamps) fails fast with [`RecordError::Mux`] —
//! nothing is buffered or reordered on the caller's behalf.
//!
//! The file is created at construction but the container header is only
//! written at `begin`; `finish` without `begin` still produces a valid,
//! empty container so best-effort teardown never leaves a corrupt file.

use std::fs::File;
use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::core::codec::{FormatParams, NegotiatedFormat, TrackKind, VideoCodec};
use crate::core::error::{RecordError, Result};
use crate::core::frames::AccessUnit;

/// All sample timestamps are microseconds; the track timescale says so.
const TRACK_TIMESCALE: u32 = 1_000_000;

/// Movie-level timescale (milliseconds, the common default).
const MOVIE_TIMESCALE: u32 = 1000;

/// MP4 muxer configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mp4MuxerConfig {
    /// Output file path.
    pub output_path: PathBuf,
    /// Display rotation hint in degrees (0, 90, 180, 270). Decided once,
    /// at creation, from the recording orientation.
    pub rotation_degrees: u16,
    /// Number of tracks that must be registered before `begin`.
    pub expected_tracks: usize,
}

impl Default for Mp4MuxerConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("/tmp/recording.mp4"),
            rotation_degrees: 0,
            expected_tracks: 2,
        }
    }
}

impl Mp4MuxerConfig {
    pub fn new(output_path: PathBuf) -> Self {
        Self {
            output_path,
            ..Default::default()
        }
    }

    /// Set the display rotation hint.
    pub fn with_rotation(mut self, degrees: u16) -> Self {
        self.rotation_degrees = degrees;
        self
    }

    /// Set the number of tracks `begin` waits for.
    pub fn with_expected_tracks(mut self, count: usize) -> Self {
        self.expected_tracks = count;
        self
    }
}

/// Opaque handle to a registered track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackHandle(u32);

struct RegisteredTrack {
    kind: TrackKind,
    config: mp4::TrackConfig,
    default_duration_us: u32,
    last_pts_us: Option<i64>,
    samples_written: u64,
}

/// MP4 container writer with the pipeline's track lifecycle.
pub struct Mp4Muxer {
    output_path: PathBuf,
    rotation_degrees: u16,
    expected_tracks: usize,
    // Held between create and begin; the writer takes it at begin.
    file: Option<File>,
    writer: Option<mp4::Mp4Writer<File>>,
    tracks: Vec<RegisteredTrack>,
    finished: bool,
}

fn mux_err(e: mp4::Error) -> RecordError {
    RecordError::Mux(e.to_string())
}

impl Mp4Muxer {
    /// Create the output file. No container data is written until `begin`.
    pub fn create(config: Mp4MuxerConfig) -> Result<Self> {
        if config.expected_tracks == 0 {
            return Err(RecordError::Configuration(
                "muxer needs at least one expected track".into(),
            ));
        }
        if config.rotation_degrees % 90 != 0 || config.rotation_degrees >= 360 {
            return Err(RecordError::Configuration(format!(
                "rotation must be 0/90/180/270 degrees, got {}",
                config.rotation_degrees
            )));
        }

        let file = File::create(&config.output_path)?;
        tracing::debug!(
            "Created MP4 output file {:?} (rotation={}°)",
            config.output_path,
            config.rotation_degrees
        );

        Ok(Self {
            output_path: config.output_path,
            rotation_degrees: config.rotation_degrees,
            expected_tracks: config.expected_tracks,
            file: Some(file),
            writer: None,
            tracks: Vec::new(),
            finished: false,
        })
    }

    pub fn output_path(&self) -> &std::path::Path {
        &self.output_path
    }

    pub fn rotation_degrees(&self) -> u16 {
        self.rotation_degrees
    }

    /// Whether `begin` has run.
    pub fn is_started(&self) -> bool {
        self.writer.is_some()
    }

    /// Register a track from its negotiated format. At most once per track
    /// kind, and only before `begin`.
    pub fn register_track(&mut self, format: &NegotiatedFormat) -> Result<TrackHandle> {
        if self.finished {
            return Err(RecordError::Mux("track registration after finish".into()));
        }
        if self.writer.is_some() {
            return Err(RecordError::Mux("track registration after begin".into()));
        }
        let kind = format.kind();
        if self.tracks.iter().any(|t| t.kind == kind) {
            return Err(RecordError::Mux(format!("{kind} track already registered")));
        }
        if self.tracks.len() >= self.expected_tracks {
            return Err(RecordError::Mux(format!(
                "all {} expected tracks already registered",
                self.expected_tracks
            )));
        }

        let config = track_config(format)?;
        self.tracks.push(RegisteredTrack {
            kind,
            config,
            default_duration_us: format.nominal_duration_us,
            last_pts_us: None,
            samples_written: 0,
        });

        // Track ids are 1-based and assigned in registration order, which
        // is exactly how the writer numbers them at begin.
        let handle = TrackHandle(self.tracks.len() as u32);
        tracing::info!(
            "Registered {} track ({}) as #{}",
            kind,
            format.mime_type(),
            handle.0
        );
        Ok(handle)
    }

    /// Write the container header and open all registered tracks. Exactly
    /// once, and only after every expected track is registered.
    pub fn begin(&mut self) -> Result<()> {
        if self.finished {
            return Err(RecordError::Mux("begin after finish".into()));
        }
        if self.writer.is_some() {
            return Err(RecordError::Mux("begin called twice".into()));
        }
        if self.tracks.len() != self.expected_tracks {
            return Err(RecordError::Mux(format!(
                "begin with {} of {} expected tracks registered",
                self.tracks.len(),
                self.expected_tracks
            )));
        }

        // The file handle is only None once a writer exists, and no writer
        // exists here.
        let file = self
            .file
            .take()
            .ok_or_else(|| RecordError::Mux("output file handle missing".into()))?;

        let mut writer = mp4::Mp4Writer::write_start(file, &container_config()?).map_err(mux_err)?;
        for track in &self.tracks {
            writer.add_track(&track.config).map_err(mux_err)?;
        }
        self.writer = Some(writer);

        tracing::info!(
            "Muxer started: {} tracks, rotation {}°, {:?}",
            self.tracks.len(),
            self.rotation_degrees,
            self.output_path
        );
        Ok(())
    }

    /// Append one access unit to a track. Timestamps must be non-decreasing
    /// within the track; codec-config units are consumed without writing
    /// (their payload already entered the container via the track header).
    pub fn write_sample(&mut self, handle: TrackHandle, au: &AccessUnit<'_>) -> Result<()> {
        if self.finished {
            return Err(RecordError::Mux("write after finish".into()));
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| RecordError::Mux("write before begin".into()))?;
        let track = self
            .tracks
            .get_mut(handle.0 as usize - 1)
            .ok_or_else(|| RecordError::Mux(format!("unknown track handle {}", handle.0)))?;

        if au.is_codec_config() {
            tracing::trace!("Skipping codec-config unit on {} track", track.kind);
            return Ok(());
        }
        if au.pts_us < 0 {
            return Err(RecordError::Mux(format!(
                "negative timestamp {}µs on {} track",
                au.pts_us, track.kind
            )));
        }
        if let Some(last) = track.last_pts_us {
            if au.pts_us < last {
                return Err(RecordError::Mux(format!(
                    "non-monotonic timestamp on {} track: {}µs after {}µs",
                    track.kind, au.pts_us, last
                )));
            }
        }

        let sample = mp4::Mp4Sample {
            start_time: au.pts_us as u64,
            duration: track.default_duration_us,
            rendering_offset: 0,
            is_sync: au.is_sync(),
            bytes: Bytes::copy_from_slice(au.data),
        };
        writer.write_sample(handle.0, &sample).map_err(mux_err)?;

        track.last_pts_us = Some(au.pts_us);
        track.samples_written += 1;
        tracing::trace!(
            "Wrote {} sample #{} pts={}µs len={}",
            track.kind,
            track.samples_written,
            au.pts_us,
            au.data.len()
        );
        Ok(())
    }

    /// Samples written so far to the track of the given kind.
    pub fn samples_written(&self, kind: TrackKind) -> u64 {
        self.tracks
            .iter()
            .filter(|t| t.kind == kind)
            .map(|t| t.samples_written)
            .sum()
    }

    /// Finalize the container. Idempotent. If `begin` never ran, writes a
    /// valid empty container so teardown always leaves a readable file.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            tracing::debug!("Muxer finish called again, ignoring");
            return Ok(());
        }

        match self.writer.as_mut() {
            Some(writer) => {
                writer.write_end().map_err(mux_err)?;
            }
            None => {
                let file = self
                    .file
                    .take()
                    .ok_or_else(|| RecordError::Mux("output file handle missing".into()))?;
                let mut writer =
                    mp4::Mp4Writer::write_start(file, &container_config()?).map_err(mux_err)?;
                writer.write_end().map_err(mux_err)?;
                tracing::warn!("Muxer finished without begin, wrote empty container");
            }
        }

        self.finished = true;
        tracing::info!(
            "Finalized {:?} ({} video / {} audio samples)",
            self.output_path,
            self.samples_written(TrackKind::Video),
            self.samples_written(TrackKind::Audio)
        );
        Ok(())
    }
}

fn container_config() -> Result<mp4::Mp4Config> {
    Ok(mp4::Mp4Config {
        major_brand: "isom".parse().map_err(mux_err)?,
        minor_version: 512,
        compatible_brands: vec![
            "isom".parse().map_err(mux_err)?,
            "iso2".parse().map_err(mux_err)?,
            "avc1".parse().map_err(mux_err)?,
            "mp41".parse().map_err(mux_err)?,
        ],
        timescale: MOVIE_TIMESCALE,
    })
}

fn track_config(format: &NegotiatedFormat) -> Result<mp4::TrackConfig> {
    match &format.params {
        FormatParams::Video {
            codec,
            width,
            height,
            ..
        } => {
            let width = u16::try_from(*width).map_err(|_| {
                RecordError::Mux(format!("video width {width} exceeds container limit"))
            })?;
            let height = u16::try_from(*height).map_err(|_| {
                RecordError::Mux(format!("video height {height} exceeds container limit"))
            })?;

            let media_conf = match codec {
                VideoCodec::H264 => {
                    let [sps, pps] = format.codec_config.as_slice() else {
                        return Err(RecordError::Mux(
                            "H.264 track needs SPS and PPS codec-config blobs".into(),
                        ));
                    };
                    mp4::MediaConfig::AvcConfig(mp4::AvcConfig {
                        width,
                        height,
                        seq_param_set: sps.clone(),
                        pic_param_set: pps.clone(),
                    })
                }
                VideoCodec::H265 => mp4::MediaConfig::HevcConfig(mp4::HevcConfig { width, height }),
                VideoCodec::Av1 => {
                    return Err(RecordError::Mux(
                        "AV1 tracks are not supported by the container writer".into(),
                    ));
                }
            };

            Ok(mp4::TrackConfig {
                track_type: mp4::TrackType::Video,
                timescale: TRACK_TIMESCALE,
                language: "und".into(),
                media_conf,
            })
        }
        FormatParams::Audio {
            sample_rate,
            channels,
            bitrate_bps,
            ..
        } => {
            let freq_index = sample_freq_index(*sample_rate)?;
            let chan_conf = match channels {
                1 => mp4::ChannelConfig::Mono,
                2 => mp4::ChannelConfig::Stereo,
                other => {
                    return Err(RecordError::Mux(format!(
                        "unsupported channel count {other}"
                    )));
                }
            };

            Ok(mp4::TrackConfig {
                track_type: mp4::TrackType::Audio,
                timescale: TRACK_TIMESCALE,
                language: "und".into(),
                media_conf: mp4::MediaConfig::AacConfig(mp4::AacConfig {
                    bitrate: *bitrate_bps,
                    profile: mp4::AudioObjectType::AacLowComplexity,
                    freq_index,
                    chan_conf,
                }),
            })
        }
    }
}

fn sample_freq_index(sample_rate: u32) -> Result<mp4::SampleFreqIndex> {
    let index = match sample_rate {
        96000 => mp4::SampleFreqIndex::Freq96000,
        88200 => mp4::SampleFreqIndex::Freq88200,
        64000 => mp4::SampleFreqIndex::Freq64000,
        48000 => mp4::SampleFreqIndex::Freq48000,
        44100 => mp4::SampleFreqIndex::Freq44100,
        32000 => mp4::SampleFreqIndex::Freq32000,
        24000 => mp4::SampleFreqIndex::Freq24000,
        22050 => mp4::SampleFreqIndex::Freq22050,
        16000 => mp4::SampleFreqIndex::Freq16000,
        12000 => mp4::SampleFreqIndex::Freq12000,
        11025 => mp4::SampleFreqIndex::Freq11025,
        8000 => mp4::SampleFreqIndex::Freq8000,
        other => {
            return Err(RecordError::Mux(format!(
                "sample rate {other}Hz has no AAC frequency index"
            )));
        }
    };
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::AudioCodec;
    use crate::core::frames::AccessUnitFlags;
    use std::fs::File;

    fn video_format() -> NegotiatedFormat {
        NegotiatedFormat {
            params: FormatParams::Video {
                codec: VideoCodec::H264,
                width: 1280,
                height: 720,
                fps: 30,
            },
            codec_config: vec![vec![0x67, 0x42, 0xc0, 0x1f], vec![0x68, 0xce, 0x3c, 0x80]],
            nominal_duration_us: 33_333,
        }
    }

    fn audio_format() -> NegotiatedFormat {
        NegotiatedFormat {
            params: FormatParams::Audio {
                codec: AudioCodec::Aac,
                sample_rate: 44_100,
                channels: 2,
                bitrate_bps: 128_000,
            },
            codec_config: vec![vec![0x12, 0x10]],
            nominal_duration_us: 23_219,
        }
    }

    fn au(data: &[u8], pts_us: i64, flags: AccessUnitFlags) -> AccessUnit<'_> {
        AccessUnit {
            data,
            pts_us,
            flags,
        }
    }

    fn muxer_in(dir: &tempfile::TempDir) -> Mp4Muxer {
        let config = Mp4MuxerConfig::new(dir.path().join("out.mp4"));
        Mp4Muxer::create(config).unwrap()
    }

    fn started_muxer(dir: &tempfile::TempDir) -> (Mp4Muxer, TrackHandle, TrackHandle) {
        let mut muxer = muxer_in(dir);
        let video = muxer.register_track(&video_format()).unwrap();
        let audio = muxer.register_track(&audio_format()).unwrap();
        muxer.begin().unwrap();
        (muxer, video, audio)
    }

    #[test]
    fn begin_requires_all_expected_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let mut muxer = muxer_in(&dir);
        muxer.register_track(&video_format()).unwrap();

        assert!(matches!(muxer.begin(), Err(RecordError::Mux(_))));
    }

    #[test]
    fn begin_twice_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (mut muxer, _, _) = started_muxer(&dir);
        assert!(matches!(muxer.begin(), Err(RecordError::Mux(_))));
    }

    #[test]
    fn register_after_begin_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut muxer = Mp4Muxer::create(
            Mp4MuxerConfig::new(dir.path().join("out.mp4")).with_expected_tracks(1),
        )
        .unwrap();
        muxer.register_track(&video_format()).unwrap();
        muxer.begin().unwrap();

        assert!(matches!(
            muxer.register_track(&audio_format()),
            Err(RecordError::Mux(_))
        ));
    }

    #[test]
    fn duplicate_track_kind_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut muxer = muxer_in(&dir);
        muxer.register_track(&video_format()).unwrap();

        assert!(matches!(
            muxer.register_track(&video_format()),
            Err(RecordError::Mux(_))
        ));
    }

    #[test]
    fn write_before_begin_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut muxer = muxer_in(&dir);
        let video = muxer.register_track(&video_format()).unwrap();

        let result = muxer.write_sample(video, &au(&[0; 8], 0, AccessUnitFlags::KEYFRAME));
        assert!(matches!(result, Err(RecordError::Mux(_))));
    }

    #[test]
    fn non_monotonic_timestamp_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (mut muxer, video, _) = started_muxer(&dir);

        muxer
            .write_sample(video, &au(&[0; 8], 33_000, AccessUnitFlags::KEYFRAME))
            .unwrap();
        let result = muxer.write_sample(video, &au(&[0; 8], 1_000, AccessUnitFlags::empty()));
        assert!(matches!(result, Err(RecordError::Mux(_))));
    }

    #[test]
    fn codec_config_units_not_written_as_samples() {
        let dir = tempfile::tempdir().unwrap();
        let (mut muxer, video, _) = started_muxer(&dir);

        muxer
            .write_sample(video, &au(&[0x67, 0x42], 0, AccessUnitFlags::CODEC_CONFIG))
            .unwrap();
        assert_eq!(muxer.samples_written(TrackKind::Video), 0);
    }

    #[test]
    fn finish_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (mut muxer, video, _) = started_muxer(&dir);
        muxer
            .write_sample(video, &au(&[0; 8], 0, AccessUnitFlags::KEYFRAME))
            .unwrap();

        muxer.finish().unwrap();
        muxer.finish().unwrap();
    }

    #[test]
    fn finish_without_begin_writes_valid_empty_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        let mut muxer = Mp4Muxer::create(Mp4MuxerConfig::new(path.clone())).unwrap();
        muxer.finish().unwrap();

        let file = File::open(&path).unwrap();
        let size = file.metadata().unwrap().len();
        let reader = mp4::Mp4Reader::read_header(file, size).unwrap();
        assert!(reader.tracks().is_empty());
    }

    #[test]
    fn write_after_finish_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (mut muxer, video, _) = started_muxer(&dir);
        muxer.finish().unwrap();

        let result = muxer.write_sample(video, &au(&[0; 8], 0, AccessUnitFlags::KEYFRAME));
        assert!(matches!(result, Err(RecordError::Mux(_))));
    }

    #[test]
    fn av1_track_rejected_at_registration() {
        let dir = tempfile::tempdir().unwrap();
        let mut muxer = muxer_in(&dir);
        let mut format = video_format();
        if let FormatParams::Video { codec, .. } = &mut format.params {
            *codec = VideoCodec::Av1;
        }

        assert!(matches!(
            muxer.register_track(&format),
            Err(RecordError::Mux(_))
        ));
    }

    #[test]
    fn invalid_rotation_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = Mp4MuxerConfig::new(dir.path().join("out.mp4")).with_rotation(45);
        assert!(matches!(
            Mp4Muxer::create(config),
            Err(RecordError::Configuration(_))
        ));
    }
}
