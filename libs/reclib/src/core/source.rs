// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Media input seams.
//!
//! The camera collaborator pushes raw frames through a [`SurfaceWriter`];
//! the owning codec session consumes them from the paired [`FrameSurface`].
//! Audio is pull-based: the encoder driver reads PCM bytes from a
//! [`PcmSource`] whenever the codec has an input slot free.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::core::error::Result;
use crate::core::frames::RawVideoFrame;

struct SurfaceShared {
    slot: Mutex<Option<RawVideoFrame>>,
    frame_ready: Condvar,
    dropped_frames: AtomicU64,
}

/// Producer side of the video input surface. Held by the camera
/// collaborator; cloneable so it can cross thread boundaries.
///
/// The surface holds at most one pending frame. A push while the previous
/// frame is still unconsumed replaces it (latest wins), which keeps a slow
/// encoder from backing up the capture path.
#[derive(Clone)]
pub struct SurfaceWriter {
    shared: Arc<SurfaceShared>,
}

/// Consumer side of the video input surface. Owned by the codec session.
pub struct FrameSurface {
    shared: Arc<SurfaceShared>,
}

/// Create a connected writer/surface pair.
pub fn frame_surface() -> (SurfaceWriter, FrameSurface) {
    let shared = Arc::new(SurfaceShared {
        slot: Mutex::new(None),
        frame_ready: Condvar::new(),
        dropped_frames: AtomicU64::new(0),
    });
    (
        SurfaceWriter {
            shared: Arc::clone(&shared),
        },
        FrameSurface { shared },
    )
}

impl SurfaceWriter {
    /// Push a frame into the surface, replacing any unconsumed one.
    pub fn push_frame(&self, frame: RawVideoFrame) {
        let mut slot = self.shared.slot.lock();
        if slot.replace(frame).is_some() {
            let dropped = self.shared.dropped_frames.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::trace!("Frame surface overwrote an unconsumed frame (total {dropped})");
        }
        self.shared.frame_ready.notify_one();
    }

    /// Frames overwritten before the encoder consumed them.
    pub fn dropped_frames(&self) -> u64 {
        self.shared.dropped_frames.load(Ordering::Relaxed)
    }
}

impl FrameSurface {
    /// Take the pending frame, waiting up to `timeout` for one to arrive.
    pub fn await_frame(&self, timeout: Duration) -> Option<RawVideoFrame> {
        let mut slot = self.shared.slot.lock();
        if slot.is_none() {
            self.shared.frame_ready.wait_for(&mut slot, timeout);
        }
        slot.take()
    }
}

/// Pull-based PCM byte source, the microphone contract.
///
/// `read` fills as much of `buf` as is available right now and returns the
/// byte count. It may block briefly on the capture device, but must not
/// block indefinitely: a slow read only delays loop cancellation until the
/// call returns.
pub trait PcmSource: Send {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

impl<F> PcmSource for F
where
    F: FnMut(&mut [u8]) -> Result<usize> + Send,
{
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn await_frame_returns_pushed_frame() {
        let (writer, surface) = frame_surface();
        writer.push_frame(RawVideoFrame::new(vec![1, 2, 3], 1000));

        let frame = surface.await_frame(Duration::from_millis(50));
        assert_eq!(frame.map(|f| f.pts_us), Some(1000));
    }

    #[test]
    fn await_frame_times_out_when_empty() {
        let (_writer, surface) = frame_surface();
        let start = Instant::now();
        assert!(surface.await_frame(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn latest_frame_wins() {
        let (writer, surface) = frame_surface();
        writer.push_frame(RawVideoFrame::new(vec![0], 1000));
        writer.push_frame(RawVideoFrame::new(vec![1], 2000));

        let frame = surface.await_frame(Duration::from_millis(10));
        assert_eq!(frame.map(|f| f.pts_us), Some(2000));
        assert_eq!(writer.dropped_frames(), 1);
    }

    #[test]
    fn await_frame_wakes_on_cross_thread_push() {
        let (writer, surface) = frame_surface();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            writer.push_frame(RawVideoFrame::new(vec![7], 3000));
        });

        let frame = surface.await_frame(Duration::from_millis(500));
        assert_eq!(frame.map(|f| f.pts_us), Some(3000));
        handle.join().unwrap();
    }

    #[test]
    fn closure_acts_as_pcm_source() {
        let mut source = |buf: &mut [u8]| -> Result<usize> {
            buf.fill(0x55);
            Ok(buf.len())
        };
        let mut buf = [0u8; 16];
        assert_eq!(PcmSource::read(&mut source, &mut buf).unwrap(), 16);
        assert_eq!(buf[0], 0x55);
    }
}
