// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Built-in loopback software codecs.
//!
//! Deterministic passthrough "encoders" for demos and tests: raw payloads
//! come back out unchanged, framed as access units with canned parameter
//! sets and the same timestamps they went in with. Registered software-only
//! in [`CodecRegistry::loopback`].
//!
//! [`CodecRegistry::loopback`]: super::CodecRegistry::loopback

use std::collections::VecDeque;
use std::time::Duration;

use super::session::{CodecSession, OutputBuffer, OutputPoll, SessionRequest};
use super::{FormatParams, NegotiatedFormat};
use crate::core::codec::{AudioEncoderConfig, VideoEncoderConfig};
use crate::core::error::{RecordError, Result};
use crate::core::frames::AccessUnitFlags;
use crate::core::source::FrameSurface;

/// Output slots per session, matching the small pools real codecs expose.
const OUTPUT_SLOTS: usize = 4;

/// Input slot capacity of the audio session, sized for one PCM pull.
const AUDIO_INPUT_CAPACITY: usize = 4096;

// Canned H.264 parameter sets (baseline, level 3.1). The loopback codec
// does not derive these from the config; container-level dimensions come
// from the negotiated format instead.
const H264_SPS: &[u8] = &[
    0x67, 0x42, 0xc0, 0x1f, 0x8c, 0x8d, 0x40, 0x50, 0x1e, 0x90, 0x0f, 0x08, 0x84, 0x6a,
];
const H264_PPS: &[u8] = &[0x68, 0xce, 0x3c, 0x80];

pub(crate) fn loopback_video_session(request: SessionRequest<'_>) -> Result<Box<dyn CodecSession>> {
    match request {
        SessionRequest::Video { config, surface } => {
            config.validate()?;
            Ok(Box::new(LoopbackVideoSession::new(config.clone(), surface)))
        }
        SessionRequest::Audio { .. } => Err(RecordError::Configuration(
            "loopback video codec requires a video session request".into(),
        )),
    }
}

pub(crate) fn loopback_audio_session(request: SessionRequest<'_>) -> Result<Box<dyn CodecSession>> {
    match request {
        SessionRequest::Audio { config } => {
            config.validate()?;
            Ok(Box::new(LoopbackAudioSession::new(config.clone())))
        }
        SessionRequest::Video { .. } => Err(RecordError::Configuration(
            "loopback audio codec requires an audio session request".into(),
        )),
    }
}

/// Surface-fed passthrough video session.
struct LoopbackVideoSession {
    config: VideoEncoderConfig,
    surface: FrameSurface,
    slots: Vec<Option<Vec<u8>>>,
    format_announced: bool,
    frame_index: u64,
    stopped: bool,
}

impl LoopbackVideoSession {
    fn new(config: VideoEncoderConfig, surface: FrameSurface) -> Self {
        Self {
            config,
            surface,
            slots: (0..OUTPUT_SLOTS).map(|_| None).collect(),
            format_announced: false,
            frame_index: 0,
            stopped: false,
        }
    }

    fn negotiated_format(&self) -> NegotiatedFormat {
        NegotiatedFormat {
            params: FormatParams::Video {
                codec: self.config.codec,
                width: self.config.width,
                height: self.config.height,
                fps: self.config.fps,
            },
            codec_config: vec![H264_SPS.to_vec(), H264_PPS.to_vec()],
            nominal_duration_us: self.config.frame_duration_us(),
        }
    }
}

impl CodecSession for LoopbackVideoSession {
    fn dequeue_output(&mut self, timeout: Duration) -> Result<OutputPoll> {
        if self.stopped {
            return Err(RecordError::CodecRuntime(
                "dequeue_output on a stopped session".into(),
            ));
        }

        if !self.format_announced {
            self.format_announced = true;
            return Ok(OutputPoll::Format(self.negotiated_format()));
        }

        let Some(frame) = self.surface.await_frame(timeout) else {
            return Ok(OutputPoll::TimedOut);
        };

        let Some(index) = self.slots.iter().position(Option::is_none) else {
            // All slots held by the consumer; the frame is dropped.
            tracing::trace!("Loopback video: no free output slot, dropping frame");
            return Ok(OutputPoll::TimedOut);
        };

        let keyframe = self.frame_index % self.config.keyframe_interval_frames as u64 == 0;
        self.frame_index += 1;

        let len = frame.data.len();
        let pts_us = frame.pts_us;
        self.slots[index] = Some(frame.data);

        let mut flags = AccessUnitFlags::empty();
        if keyframe {
            flags |= AccessUnitFlags::KEYFRAME;
        }

        Ok(OutputPoll::Buffer(OutputBuffer {
            index,
            len,
            pts_us,
            flags,
        }))
    }

    fn output_buffer(&mut self, index: usize) -> Result<&[u8]> {
        self.slots
            .get(index)
            .and_then(|slot| slot.as_deref())
            .ok_or_else(|| RecordError::CodecRuntime(format!("invalid output slot {index}")))
    }

    fn release_output(&mut self, index: usize) -> Result<()> {
        match self.slots.get_mut(index) {
            Some(slot @ Some(_)) => {
                *slot = None;
                Ok(())
            }
            _ => Err(RecordError::CodecRuntime(format!(
                "release of unheld output slot {index}"
            ))),
        }
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}

struct PendingUnit {
    data: Vec<u8>,
    pts_us: i64,
}

/// Queue-fed passthrough audio session.
struct LoopbackAudioSession {
    config: AudioEncoderConfig,
    input_slots: Vec<(Vec<u8>, bool)>, // (buffer, in_flight)
    pending: VecDeque<PendingUnit>,
    output_slots: Vec<Option<Vec<u8>>>,
    format_announced: bool,
    stopped: bool,
}

impl LoopbackAudioSession {
    fn new(config: AudioEncoderConfig) -> Self {
        Self {
            config,
            input_slots: (0..OUTPUT_SLOTS)
                .map(|_| (vec![0u8; AUDIO_INPUT_CAPACITY], false))
                .collect(),
            pending: VecDeque::new(),
            output_slots: (0..OUTPUT_SLOTS).map(|_| None).collect(),
            format_announced: false,
            stopped: false,
        }
    }

    fn negotiated_format(&self) -> NegotiatedFormat {
        NegotiatedFormat {
            params: FormatParams::Audio {
                codec: self.config.codec,
                sample_rate: self.config.sample_rate,
                channels: self.config.channels,
                bitrate_bps: self.config.bitrate_bps,
            },
            codec_config: vec![audio_specific_config(
                self.config.sample_rate,
                self.config.channels,
            )],
            nominal_duration_us: self.config.frame_duration_us(),
        }
    }
}

impl CodecSession for LoopbackAudioSession {
    fn dequeue_input(&mut self, _timeout: Duration) -> Result<Option<usize>> {
        if self.stopped {
            return Err(RecordError::CodecRuntime(
                "dequeue_input on a stopped session".into(),
            ));
        }
        let slot = self.input_slots.iter().position(|(_, in_flight)| !in_flight);
        if let Some(index) = slot {
            self.input_slots[index].1 = true;
        }
        Ok(slot)
    }

    fn input_buffer(&mut self, index: usize) -> Result<&mut [u8]> {
        match self.input_slots.get_mut(index) {
            Some((buf, true)) => Ok(buf.as_mut_slice()),
            _ => Err(RecordError::CodecRuntime(format!(
                "input slot {index} was not dequeued"
            ))),
        }
    }

    fn queue_input(&mut self, index: usize, len: usize, pts_us: i64) -> Result<()> {
        let (buf, in_flight) = self.input_slots.get_mut(index).ok_or_else(|| {
            RecordError::CodecRuntime(format!("queue of invalid input slot {index}"))
        })?;
        if !*in_flight {
            return Err(RecordError::CodecRuntime(format!(
                "queue of input slot {index} that was not dequeued"
            )));
        }
        if len > buf.len() {
            return Err(RecordError::CodecRuntime(format!(
                "input length {len} exceeds slot capacity {}",
                buf.len()
            )));
        }
        *in_flight = false;
        if len == 0 {
            return Ok(());
        }
        let data = buf[..len].to_vec();
        self.pending.push_back(PendingUnit { data, pts_us });
        Ok(())
    }

    fn dequeue_output(&mut self, timeout: Duration) -> Result<OutputPoll> {
        if self.stopped {
            return Err(RecordError::CodecRuntime(
                "dequeue_output on a stopped session".into(),
            ));
        }

        if !self.format_announced {
            self.format_announced = true;
            return Ok(OutputPoll::Format(self.negotiated_format()));
        }

        let Some(unit) = self.pending.pop_front() else {
            // Pace the poll loop the way a real codec's bounded wait would.
            std::thread::sleep(timeout);
            return Ok(OutputPoll::TimedOut);
        };

        let Some(index) = self.output_slots.iter().position(Option::is_none) else {
            self.pending.push_front(unit);
            return Ok(OutputPoll::TimedOut);
        };

        let len = unit.data.len();
        let pts_us = unit.pts_us;
        self.output_slots[index] = Some(unit.data);

        Ok(OutputPoll::Buffer(OutputBuffer {
            index,
            len,
            pts_us,
            flags: AccessUnitFlags::KEYFRAME,
        }))
    }

    fn output_buffer(&mut self, index: usize) -> Result<&[u8]> {
        self.output_slots
            .get(index)
            .and_then(|slot| slot.as_deref())
            .ok_or_else(|| RecordError::CodecRuntime(format!("invalid output slot {index}")))
    }

    fn release_output(&mut self, index: usize) -> Result<()> {
        match self.output_slots.get_mut(index) {
            Some(slot @ Some(_)) => {
                *slot = None;
                Ok(())
            }
            _ => Err(RecordError::CodecRuntime(format!(
                "release of unheld output slot {index}"
            ))),
        }
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.pending.clear();
        self.output_slots.iter_mut().for_each(|slot| *slot = None);
    }
}

/// Two-byte MPEG-4 AudioSpecificConfig for AAC-LC.
fn audio_specific_config(sample_rate: u32, channels: u16) -> Vec<u8> {
    let freq_index = aac_frequency_index(sample_rate);
    let channel_config = channels as u8;
    const AAC_LC: u8 = 2;
    vec![
        (AAC_LC << 3) | (freq_index >> 1),
        ((freq_index & 1) << 7) | (channel_config << 3),
    ]
}

/// MPEG-4 sampling frequency index table. Config validation guarantees the
/// rate is one of these.
fn aac_frequency_index(sample_rate: u32) -> u8 {
    match sample_rate {
        96000 => 0,
        88200 => 1,
        64000 => 2,
        48000 => 3,
        44100 => 4,
        32000 => 5,
        24000 => 6,
        22050 => 7,
        16000 => 8,
        12000 => 9,
        11025 => 10,
        _ => 11, // 8000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frames::RawVideoFrame;
    use crate::core::source::frame_surface;

    const TIMEOUT: Duration = Duration::from_millis(20);

    #[test]
    fn video_session_announces_format_before_data() {
        let (writer, surface) = frame_surface();
        let mut session =
            LoopbackVideoSession::new(VideoEncoderConfig::default(), surface);
        writer.push_frame(RawVideoFrame::new(vec![1; 64], 0));

        let first = session.dequeue_output(TIMEOUT).unwrap();
        let OutputPoll::Format(format) = first else {
            panic!("expected format announcement, got {first:?}");
        };
        assert_eq!(format.codec_config.len(), 2);
        assert_eq!(format.nominal_duration_us, 33_333);

        let second = session.dequeue_output(TIMEOUT).unwrap();
        assert!(matches!(second, OutputPoll::Buffer(_)));
    }

    #[test]
    fn video_session_keyframes_first_and_every_nth() {
        let (writer, surface) = frame_surface();
        let config = VideoEncoderConfig::default().with_keyframe_interval(2);
        let mut session = LoopbackVideoSession::new(config, surface);

        // Consume the format announcement.
        session.dequeue_output(TIMEOUT).unwrap();

        let mut sync_flags = Vec::new();
        for i in 0..4 {
            writer.push_frame(RawVideoFrame::new(vec![0; 16], i * 33_000));
            let OutputPoll::Buffer(info) = session.dequeue_output(TIMEOUT).unwrap() else {
                panic!("expected buffer");
            };
            sync_flags.push(info.flags.contains(AccessUnitFlags::KEYFRAME));
            session.release_output(info.index).unwrap();
        }
        assert_eq!(sync_flags, vec![true, false, true, false]);
    }

    #[test]
    fn audio_session_passes_pcm_through_with_timestamps() {
        let mut session = LoopbackAudioSession::new(AudioEncoderConfig::default());

        // Format first.
        let first = session.dequeue_output(TIMEOUT).unwrap();
        assert!(matches!(first, OutputPoll::Format(_)));

        let slot = session.dequeue_input(TIMEOUT).unwrap().unwrap();
        let buf = session.input_buffer(slot).unwrap();
        buf[..4].copy_from_slice(&[9, 8, 7, 6]);
        session.queue_input(slot, 4, 20_000).unwrap();

        let OutputPoll::Buffer(info) = session.dequeue_output(TIMEOUT).unwrap() else {
            panic!("expected buffer");
        };
        assert_eq!(info.pts_us, 20_000);
        assert_eq!(info.len, 4);
        assert_eq!(session.output_buffer(info.index).unwrap(), &[9, 8, 7, 6]);
        session.release_output(info.index).unwrap();
    }

    #[test]
    fn zero_length_queue_returns_slot_unused() {
        let mut session = LoopbackAudioSession::new(AudioEncoderConfig::default());
        session.dequeue_output(TIMEOUT).unwrap(); // format

        let slot = session.dequeue_input(TIMEOUT).unwrap().unwrap();
        session.queue_input(slot, 0, 0).unwrap();

        assert!(matches!(
            session.dequeue_output(Duration::from_millis(1)).unwrap(),
            OutputPoll::TimedOut
        ));
        // The slot is free again.
        assert!(session.dequeue_input(TIMEOUT).unwrap().is_some());
    }

    #[test]
    fn audio_specific_config_for_stereo_44100() {
        // AAC-LC (2), frequency index 4, channel config 2
        assert_eq!(audio_specific_config(44_100, 2), vec![0x12, 0x10]);
    }

    #[test]
    fn stopped_session_rejects_polls() {
        let mut session = LoopbackAudioSession::new(AudioEncoderConfig::default());
        session.stop();
        assert!(session.dequeue_output(TIMEOUT).is_err());
        assert!(session.dequeue_input(TIMEOUT).is_err());
    }
}
