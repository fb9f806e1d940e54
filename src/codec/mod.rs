//! # Codec Interfaces
//!
//! Slot-based decoder/encoder contracts modelled on hardware codecs: the
//! caller borrows input slots, queues filled slots, and polls for output
//! with a bounded timeout. A decoder renders straight into the encoder's
//! input [`Surface`], so decoded frames never pass through caller memory.

use bytes::BytesMut;
use std::time::Duration;

use crate::av::{MediaFormat, Releasable, SampleInfo};
use crate::error::{CompressError, Result};

pub mod aac;
pub mod h264;

/// Software reference codecs
pub mod loopback;

mod surface;

pub use loopback::{LoopbackCodecs, LoopbackDecoder, LoopbackEncoder};
pub use surface::{Frame, Surface, SurfacePoll};

pub const MIME_VIDEO_AVC: &str = "video/avc";
pub const MIME_VIDEO_HEVC: &str = "video/hevc";
pub const MIME_AUDIO_AAC: &str = "audio/mp4a-latm";

/// Result of polling a codec for output.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    /// Nothing ready within the timeout
    TryAgainLater,
    /// The definitive output format; precedes any data buffer
    FormatChanged(MediaFormat),
    /// Output slot `index` holds data described by `info`
    Buffer { index: usize, info: SampleInfo },
}

/// Decodes compressed samples onto an output surface.
pub trait VideoDecoder: Releasable + Send {
    fn configure(&mut self, format: &MediaFormat, surface: Surface) -> Result<()>;

    fn start(&mut self) -> Result<()>;

    /// Borrows a free input slot, waiting at most `timeout`.
    fn dequeue_input_buffer(&mut self, timeout: Duration) -> Result<Option<usize>>;

    /// Storage behind a borrowed input slot.
    fn input_buffer(&mut self, index: usize) -> Result<&mut BytesMut>;

    /// Hands a filled slot back for decoding.
    fn queue_input_buffer(&mut self, index: usize, info: SampleInfo) -> Result<()>;

    fn dequeue_output_buffer(&mut self, timeout: Duration) -> Result<OutputEvent>;

    /// Returns an output slot; with `render` the frame is pushed to the surface.
    fn release_output_buffer(&mut self, index: usize, render: bool) -> Result<()>;
}

/// Encodes frames arriving on its own input surface.
pub trait VideoEncoder: Releasable + Send {
    fn configure(&mut self, format: &MediaFormat) -> Result<()>;

    /// Creates the surface a decoder renders into. Call between
    /// `configure` and `start`.
    fn create_input_surface(&mut self) -> Result<Surface>;

    fn start(&mut self) -> Result<()>;

    /// No more frames will be rendered to the input surface.
    fn signal_end_of_input_stream(&mut self) -> Result<()>;

    fn dequeue_output_buffer(&mut self, timeout: Duration) -> Result<OutputEvent>;

    /// Storage behind a dequeued output slot.
    fn output_buffer(&self, index: usize) -> Result<&[u8]>;

    fn release_output_buffer(&mut self, index: usize) -> Result<()>;
}

/// Creates codec instances by mime type.
pub trait CodecFactory: Send + Sync {
    fn create_decoder(&self, mime: &str) -> Result<Box<dyn VideoDecoder>>;

    fn create_encoder(&self, mime: &str) -> Result<Box<dyn VideoEncoder>>;
}

/// Lifecycle position shared by codec implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecState {
    Uninitialized,
    Configured,
    Running,
    Stopped,
    Released,
}

impl CodecState {
    /// Fails with a codec error unless the state is `expected`.
    pub fn expect(self, expected: CodecState, operation: &str) -> Result<()> {
        if self == expected {
            Ok(())
        } else {
            Err(CompressError::Codec(format!(
                "{} called in state {:?}, expected {:?}",
                operation, self, expected
            )))
        }
    }
}
