//! Software codecs that honour the slot protocol without touching pixels.
//!
//! `LoopbackDecoder` turns every queued sample into a frame whose payload is
//! the sample itself, handing frames out in presentation order;
//! `LoopbackEncoder` turns every frame on its surface back into an output
//! sample. The pair neither scales nor re-encodes: the encoder announces the
//! decoder's input stream (parameter sets and coded size) as its output
//! format, so what it emits is a copy of the source H.264 stream at the
//! source size. It only accepts H.264 input.
//!
//! Timestamps, end-of-stream propagation, the one-time format announcement
//! and back-pressure behave like a hardware codec pair, which makes the pair
//! a stand-in for device codecs when exercising the pipeline. Real
//! compression needs a platform [`CodecFactory`].

use bytes::{Bytes, BytesMut};
use log::debug;
use std::collections::VecDeque;
use std::time::Duration;

use super::{
    CodecFactory, CodecState, Frame, OutputEvent, Surface, SurfacePoll, VideoDecoder,
    VideoEncoder, MIME_VIDEO_AVC,
};
use crate::av::{ColorFormat, MediaFormat, Releasable, SampleFlags, SampleInfo};
use crate::error::{CompressError, Result};

const DEFAULT_INPUT_SLOTS: usize = 4;
const DEFAULT_OUTPUT_SLOTS: usize = 4;
const DEFAULT_SURFACE_CAPACITY: usize = 4;
const DEFAULT_INPUT_CAPACITY: usize = 64 * 1024;
/// Frames held back to restore presentation order
const DEFAULT_REORDER_DEPTH: usize = 4;

/// Factory for loopback codec pairs.
#[derive(Debug, Clone, Copy)]
pub struct LoopbackCodecs {
    pub input_slots: usize,
    pub output_slots: usize,
    pub surface_capacity: usize,
    pub reorder_depth: usize,
}

impl Default for LoopbackCodecs {
    fn default() -> Self {
        Self {
            input_slots: DEFAULT_INPUT_SLOTS,
            output_slots: DEFAULT_OUTPUT_SLOTS,
            surface_capacity: DEFAULT_SURFACE_CAPACITY,
            reorder_depth: DEFAULT_REORDER_DEPTH,
        }
    }
}

impl CodecFactory for LoopbackCodecs {
    fn create_decoder(&self, mime: &str) -> Result<Box<dyn VideoDecoder>> {
        if !mime.starts_with("video/") {
            return Err(CompressError::Codec(format!("No decoder for {}", mime)));
        }
        Ok(Box::new(
            LoopbackDecoder::new(self.input_slots, self.output_slots)
                .with_reorder_depth(self.reorder_depth),
        ))
    }

    fn create_encoder(&self, mime: &str) -> Result<Box<dyn VideoEncoder>> {
        if mime != MIME_VIDEO_AVC {
            return Err(CompressError::Codec(format!("No encoder for {}", mime)));
        }
        Ok(Box::new(LoopbackEncoder::new(self.surface_capacity)))
    }
}

struct Decoded {
    data: Bytes,
    info: SampleInfo,
}

/// Decoder half of the loopback pair.
pub struct LoopbackDecoder {
    state: CodecState,
    width: u32,
    height: u32,
    surface: Option<Surface>,
    inputs: Vec<BytesMut>,
    input_lent: Vec<bool>,
    free_inputs: VecDeque<usize>,
    /// Decoded frames not yet known to be next in presentation order
    reorder: Vec<Decoded>,
    reorder_depth: usize,
    decoded: VecDeque<Decoded>,
    outputs: Vec<Option<Decoded>>,
    output_limit: usize,
    format_announced: bool,
}

impl LoopbackDecoder {
    pub fn new(input_slots: usize, output_slots: usize) -> Self {
        let input_slots = input_slots.max(1);
        Self {
            state: CodecState::Uninitialized,
            width: 0,
            height: 0,
            surface: None,
            inputs: (0..input_slots)
                .map(|_| BytesMut::with_capacity(DEFAULT_INPUT_CAPACITY))
                .collect(),
            input_lent: vec![false; input_slots],
            free_inputs: (0..input_slots).collect(),
            reorder: Vec::new(),
            reorder_depth: DEFAULT_REORDER_DEPTH,
            decoded: VecDeque::new(),
            outputs: Vec::new(),
            output_limit: output_slots.max(1),
            format_announced: false,
        }
    }

    /// Frames are released in presentation order once more than `depth`
    /// are pending; 0 keeps decode order.
    pub fn with_reorder_depth(mut self, depth: usize) -> Self {
        self.reorder_depth = depth;
        self
    }

    /// Moves the earliest pending frame to the output queue.
    fn release_earliest(&mut self) {
        let earliest = self
            .reorder
            .iter()
            .enumerate()
            .min_by_key(|(_, d)| d.info.presentation_time_us)
            .map(|(index, _)| index);
        if let Some(index) = earliest {
            let decoded = self.reorder.swap_remove(index);
            self.decoded.push_back(decoded);
        }
    }

    fn outstanding_outputs(&self) -> usize {
        self.outputs.iter().filter(|slot| slot.is_some()).count()
    }

    fn check_lent_input(&self, index: usize) -> Result<()> {
        match self.input_lent.get(index) {
            Some(true) => Ok(()),
            _ => Err(CompressError::Codec(format!(
                "input slot {} is not dequeued",
                index
            ))),
        }
    }
}

impl Releasable for LoopbackDecoder {
    fn stop(&mut self) -> Result<()> {
        if self.state == CodecState::Running {
            self.state = CodecState::Stopped;
        }
        self.reorder.clear();
        self.decoded.clear();
        Ok(())
    }

    fn release(&mut self) {
        self.state = CodecState::Released;
        self.surface = None;
        self.inputs.clear();
        self.outputs.clear();
        self.reorder.clear();
        self.decoded.clear();
    }
}

impl VideoDecoder for LoopbackDecoder {
    fn configure(&mut self, format: &MediaFormat, surface: Surface) -> Result<()> {
        self.state.expect(CodecState::Uninitialized, "configure")?;
        self.width = format.width.unwrap_or(0);
        self.height = format.height.unwrap_or(0);
        surface.set_producer_format(format.clone());
        self.surface = Some(surface);
        self.state = CodecState::Configured;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.state.expect(CodecState::Configured, "start")?;
        self.state = CodecState::Running;
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, _timeout: Duration) -> Result<Option<usize>> {
        self.state.expect(CodecState::Running, "dequeue_input_buffer")?;
        if self.decoded.len() >= self.output_limit {
            return Ok(None);
        }
        let Some(index) = self.free_inputs.pop_front() else {
            return Ok(None);
        };
        self.input_lent[index] = true;
        self.inputs[index].clear();
        Ok(Some(index))
    }

    fn input_buffer(&mut self, index: usize) -> Result<&mut BytesMut> {
        self.check_lent_input(index)?;
        Ok(&mut self.inputs[index])
    }

    fn queue_input_buffer(&mut self, index: usize, info: SampleInfo) -> Result<()> {
        self.state.expect(CodecState::Running, "queue_input_buffer")?;
        self.check_lent_input(index)?;

        let end = info
            .end()
            .filter(|end| *end <= self.inputs[index].len())
            .ok_or_else(|| {
                CompressError::Codec(format!(
                    "sample region {}+{} exceeds input slot {}",
                    info.offset, info.size, index
                ))
            })?;
        let data = self.inputs[index].split().freeze().slice(info.offset..end);
        self.input_lent[index] = false;
        self.free_inputs.push_back(index);

        if info.is_codec_config() {
            return Ok(());
        }

        if !data.is_empty() {
            let flags = info.flags & SampleFlags::KEY_FRAME;
            self.reorder.push(Decoded {
                info: SampleInfo::new(data.len(), info.presentation_time_us).with_flags(flags),
                data,
            });
        }
        if info.is_end_of_stream() {
            while !self.reorder.is_empty() {
                self.release_earliest();
            }
            self.decoded.push_back(Decoded {
                data: Bytes::new(),
                info: SampleInfo::end_of_stream(info.presentation_time_us),
            });
        } else {
            while self.reorder.len() > self.reorder_depth {
                self.release_earliest();
            }
        }
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, _timeout: Duration) -> Result<OutputEvent> {
        self.state.expect(CodecState::Running, "dequeue_output_buffer")?;

        if !self.format_announced {
            self.format_announced = true;
            return Ok(OutputEvent::FormatChanged(
                MediaFormat::video("video/raw", self.width, self.height)
                    .with_color_format(ColorFormat::Surface),
            ));
        }

        let Some(next) = self.decoded.front() else {
            return Ok(OutputEvent::TryAgainLater);
        };
        let renders_frame = !next.info.is_end_of_stream() && next.info.size > 0;
        let surface_full = self
            .surface
            .as_ref()
            .map(|surface| !surface.has_capacity())
            .unwrap_or(false);
        if (renders_frame && surface_full) || self.outstanding_outputs() >= self.output_limit {
            return Ok(OutputEvent::TryAgainLater);
        }

        let Some(decoded) = self.decoded.pop_front() else {
            return Ok(OutputEvent::TryAgainLater);
        };
        let info = decoded.info;
        let index = match self.outputs.iter().position(|slot| slot.is_none()) {
            Some(index) => {
                self.outputs[index] = Some(decoded);
                index
            }
            None => {
                self.outputs.push(Some(decoded));
                self.outputs.len() - 1
            }
        };
        Ok(OutputEvent::Buffer { index, info })
    }

    fn release_output_buffer(&mut self, index: usize, render: bool) -> Result<()> {
        let decoded = self
            .outputs
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(|| {
                CompressError::Codec(format!("output slot {} is not dequeued", index))
            })?;

        if render && decoded.info.size > 0 && !decoded.info.is_end_of_stream() {
            let surface = self
                .surface
                .as_ref()
                .ok_or_else(|| CompressError::Codec("decoder has no output surface".into()))?;
            surface.queue_frame(Frame {
                data: decoded.data,
                width: self.width,
                height: self.height,
                presentation_time_us: decoded.info.presentation_time_us,
                key_frame: decoded.info.is_key_frame(),
            })?;
        }
        Ok(())
    }
}

/// Encoder half of the loopback pair.
pub struct LoopbackEncoder {
    state: CodecState,
    format: Option<MediaFormat>,
    surface: Option<Surface>,
    surface_capacity: usize,
    outputs: Vec<Option<Bytes>>,
    format_announced: bool,
    end_of_stream_emitted: bool,
}

impl LoopbackEncoder {
    pub fn new(surface_capacity: usize) -> Self {
        Self {
            state: CodecState::Uninitialized,
            format: None,
            surface: None,
            surface_capacity,
            outputs: Vec::new(),
            format_announced: false,
            end_of_stream_emitted: false,
        }
    }

    /// The stream the decoder feeds in, relabelled with the configured
    /// rate settings.
    fn output_format(&self) -> Result<MediaFormat> {
        let configured = self
            .format
            .as_ref()
            .ok_or_else(|| CompressError::Codec("encoder is not configured".into()))?;
        let source = self
            .surface
            .as_ref()
            .and_then(Surface::producer_format)
            .ok_or_else(|| CompressError::Codec("no decoder renders to the input surface".into()))?;
        if source.mime != MIME_VIDEO_AVC {
            return Err(CompressError::Codec(format!(
                "loopback encoder cannot turn {} into {}",
                source.mime, MIME_VIDEO_AVC
            )));
        }
        let (width, height) = source.width.zip(source.height).ok_or_else(|| {
            CompressError::Codec("decoder input format has no dimensions".into())
        })?;
        if (width, height) != (configured.width.unwrap_or(0), configured.height.unwrap_or(0)) {
            debug!(
                "Loopback encoder keeps the source size {}x{}; configured {:?}x{:?}",
                width, height, configured.width, configured.height
            );
        }

        let mut format = MediaFormat::video(MIME_VIDEO_AVC, width, height);
        format.csd = source.csd;
        format.bit_rate = configured.bit_rate;
        format.frame_rate = configured.frame_rate;
        Ok(format)
    }

    fn store_output(&mut self, data: Bytes) -> usize {
        match self.outputs.iter().position(|slot| slot.is_none()) {
            Some(index) => {
                self.outputs[index] = Some(data);
                index
            }
            None => {
                self.outputs.push(Some(data));
                self.outputs.len() - 1
            }
        }
    }
}

impl Releasable for LoopbackEncoder {
    fn stop(&mut self) -> Result<()> {
        if self.state == CodecState::Running {
            self.state = CodecState::Stopped;
        }
        Ok(())
    }

    fn release(&mut self) {
        self.state = CodecState::Released;
        self.surface = None;
        self.outputs.clear();
    }
}

impl VideoEncoder for LoopbackEncoder {
    fn configure(&mut self, format: &MediaFormat) -> Result<()> {
        self.state.expect(CodecState::Uninitialized, "configure")?;
        if format.mime != MIME_VIDEO_AVC {
            return Err(CompressError::Codec(format!(
                "unsupported encoder mime {}",
                format.mime
            )));
        }
        match (format.width, format.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 && w % 2 == 0 && h % 2 == 0 => {}
            (w, h) => {
                return Err(CompressError::Codec(format!(
                    "encoder needs positive even dimensions, got {:?}x{:?}",
                    w, h
                )))
            }
        }
        if format.bit_rate.unwrap_or(0) == 0 {
            return Err(CompressError::Codec("encoder bit rate missing".into()));
        }
        self.format = Some(format.clone());
        self.state = CodecState::Configured;
        Ok(())
    }

    fn create_input_surface(&mut self) -> Result<Surface> {
        self.state.expect(CodecState::Configured, "create_input_surface")?;
        let surface = Surface::new(self.surface_capacity);
        self.surface = Some(surface.clone());
        Ok(surface)
    }

    fn start(&mut self) -> Result<()> {
        self.state.expect(CodecState::Configured, "start")?;
        let surface_input = self
            .format
            .as_ref()
            .map(|f| f.color_format == Some(ColorFormat::Surface))
            .unwrap_or(false);
        if surface_input && self.surface.is_none() {
            return Err(CompressError::Codec(
                "surface input configured but no input surface created".into(),
            ));
        }
        self.state = CodecState::Running;
        Ok(())
    }

    fn signal_end_of_input_stream(&mut self) -> Result<()> {
        self.state.expect(CodecState::Running, "signal_end_of_input_stream")?;
        let surface = self
            .surface
            .as_ref()
            .ok_or_else(|| CompressError::Codec("encoder has no input surface".into()))?;
        surface.signal_end_of_stream();
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, timeout: Duration) -> Result<OutputEvent> {
        self.state.expect(CodecState::Running, "dequeue_output_buffer")?;

        if !self.format_announced {
            self.format_announced = true;
            return Ok(OutputEvent::FormatChanged(self.output_format()?));
        }
        if self.end_of_stream_emitted {
            return Ok(OutputEvent::TryAgainLater);
        }

        let Some(surface) = self.surface.clone() else {
            return Ok(OutputEvent::TryAgainLater);
        };
        match surface.acquire_frame(timeout) {
            SurfacePoll::Frame(frame) => {
                let flags = if frame.key_frame {
                    SampleFlags::KEY_FRAME
                } else {
                    SampleFlags::empty()
                };
                let info = SampleInfo::new(frame.data.len(), frame.presentation_time_us)
                    .with_flags(flags);
                let index = self.store_output(frame.data);
                Ok(OutputEvent::Buffer { index, info })
            }
            SurfacePoll::EndOfStream => {
                self.end_of_stream_emitted = true;
                let index = self.store_output(Bytes::new());
                Ok(OutputEvent::Buffer {
                    index,
                    info: SampleInfo::end_of_stream(0),
                })
            }
            SurfacePoll::Empty => Ok(OutputEvent::TryAgainLater),
        }
    }

    fn output_buffer(&self, index: usize) -> Result<&[u8]> {
        self.outputs
            .get(index)
            .and_then(Option::as_ref)
            .map(|data| data.as_ref())
            .ok_or_else(|| CompressError::Codec(format!("output slot {} is not dequeued", index)))
    }

    fn release_output_buffer(&mut self, index: usize) -> Result<()> {
        self.outputs
            .get_mut(index)
            .and_then(Option::take)
            .map(|_| ())
            .ok_or_else(|| CompressError::Codec(format!("output slot {} is not dequeued", index)))
    }
}
