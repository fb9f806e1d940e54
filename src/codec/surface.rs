use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::av::MediaFormat;
use crate::error::{CompressError, Result};

/// A decoded picture in flight between decoder and encoder.
///
/// `data` shares storage with the decoder's output; handing a frame over
/// never copies pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub presentation_time_us: i64,
    /// Decoded from a sync sample
    pub key_frame: bool,
}

/// Outcome of waiting on a surface.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfacePoll {
    Frame(Frame),
    /// The producer finished and every frame was consumed
    EndOfStream,
    /// Nothing arrived within the timeout
    Empty,
}

struct SurfaceState {
    frames: VecDeque<Frame>,
    end_of_stream: bool,
    capacity: usize,
    producer_format: Option<MediaFormat>,
}

struct SurfaceInner {
    state: Mutex<SurfaceState>,
    ready: Condvar,
}

/// Bounded frame queue owned by an encoder and written by a decoder.
#[derive(Clone)]
pub struct Surface {
    inner: Arc<SurfaceInner>,
}

impl Surface {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(SurfaceInner {
                state: Mutex::new(SurfaceState {
                    frames: VecDeque::with_capacity(capacity),
                    end_of_stream: false,
                    capacity: capacity.max(1),
                    producer_format: None,
                }),
                ready: Condvar::new(),
            }),
        }
    }

    /// True while another frame can be queued without overflowing.
    pub fn has_capacity(&self) -> bool {
        let state = self.inner.state.lock();
        state.frames.len() < state.capacity
    }

    /// Records the stream the producer decodes onto this surface.
    pub fn set_producer_format(&self, format: MediaFormat) {
        self.inner.state.lock().producer_format = Some(format);
    }

    pub fn producer_format(&self) -> Option<MediaFormat> {
        self.inner.state.lock().producer_format.clone()
    }

    pub fn queued(&self) -> usize {
        self.inner.state.lock().frames.len()
    }

    pub fn queue_frame(&self, frame: Frame) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.end_of_stream {
            return Err(CompressError::Codec(
                "frame rendered after end of stream".into(),
            ));
        }
        if state.frames.len() >= state.capacity {
            return Err(CompressError::Codec("surface queue overflow".into()));
        }
        state.frames.push_back(frame);
        self.inner.ready.notify_one();
        Ok(())
    }

    pub fn signal_end_of_stream(&self) {
        let mut state = self.inner.state.lock();
        state.end_of_stream = true;
        self.inner.ready.notify_all();
    }

    /// Takes the oldest frame, waiting at most `timeout` for one to arrive.
    pub fn acquire_frame(&self, timeout: Duration) -> SurfacePoll {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        loop {
            if let Some(frame) = state.frames.pop_front() {
                return SurfacePoll::Frame(frame);
            }
            if state.end_of_stream {
                return SurfacePoll::EndOfStream;
            }
            if self.inner.ready.wait_until(&mut state, deadline).timed_out() {
                return match state.frames.pop_front() {
                    Some(frame) => SurfacePoll::Frame(frame),
                    None if state.end_of_stream => SurfacePoll::EndOfStream,
                    None => SurfacePoll::Empty,
                };
            }
        }
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Surface")
            .field("queued", &state.frames.len())
            .field("capacity", &state.capacity)
            .field("end_of_stream", &state.end_of_stream)
            .finish()
    }
}
