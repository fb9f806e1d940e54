//! Shared fixtures: in-memory sources and a backend that records every
//! acquire/stop/release and can fail at a chosen point.

#![allow(dead_code)]

use bytes::BytesMut;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use vcompress::av::probe::{MetadataKey, MetadataSource};
use vcompress::av::{
    Demuxer, MediaBackend, MediaFormat, MemoryBackend, Muxer, Releasable, Sample, SampleInfo,
    SeekMode, SourceDescriptor,
};
use vcompress::codec::{
    OutputEvent, Surface, VideoDecoder, VideoEncoder, MIME_AUDIO_AAC, MIME_VIDEO_AVC,
};
use vcompress::format::memory::{MemoryMedia, MemoryMetadata, MuxRecording};
use vcompress::{CompressError, Result};

pub const ASC_48K_STEREO: [u8; 2] = [0x11, 0x90];

pub fn video_samples(count: i64, frame_us: i64) -> Vec<Sample> {
    (0..count)
        .map(|n| {
            let nal = if n == 0 { 0x65 } else { 0x41 };
            Sample::new(vec![0, 0, 0, 1, nal, 0x9A, n as u8], n * frame_us).with_key_flag(n == 0)
        })
        .collect()
}

pub fn audio_samples(count: i64) -> Vec<Sample> {
    audio_samples_every(count, 21_333)
}

/// AAC-like packets `frame_us` apart. Multiples of 20 ms are exact in a
/// 48 kHz timescale.
pub fn audio_samples_every(count: i64, frame_us: i64) -> Vec<Sample> {
    (0..count)
        .map(|n| Sample::new(vec![0x21, 0x10, n as u8, 0xFF], n * frame_us).with_key_flag(true))
        .collect()
}

pub fn video_format(width: u32, height: u32) -> MediaFormat {
    MediaFormat::video(MIME_VIDEO_AVC, width, height)
}

pub fn audio_format() -> MediaFormat {
    MediaFormat::audio(MIME_AUDIO_AAC, 48_000, 2).with_csd(ASC_48K_STEREO.to_vec())
}

/// Video plus audio, in that track order.
pub fn media_with_audio(width: u32, height: u32) -> MemoryMedia {
    MemoryMedia::new()
        .with_track(video_format(width, height), video_samples(6, 33_333))
        .with_track(audio_format(), audio_samples(9))
}

/// Where a [`ScriptedBackend`] injects a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Nowhere,
    Probe,
    DecoderStart,
    EncoderStart,
    /// The n-th encoder output poll (1-based)
    LoopIteration(usize),
    MuxerStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Acquire,
    Stop,
    Release,
}

/// Calls made on every resource a backend handed out.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    calls: Arc<Mutex<Vec<(String, Call)>>>,
    encoder_formats: Arc<Mutex<Vec<MediaFormat>>>,
}

impl Ledger {
    fn record(&self, name: &str, call: Call) {
        self.calls.lock().push((name.to_string(), call));
    }

    /// Format the encoder was last configured with.
    pub fn encoder_format(&self) -> Option<MediaFormat> {
        self.encoder_formats.lock().last().cloned()
    }

    pub fn calls(&self) -> Vec<(String, Call)> {
        self.calls.lock().clone()
    }

    pub fn acquired(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(_, call)| *call == Call::Acquire)
            .map(|(name, _)| name)
            .collect()
    }

    pub fn count(&self, name: &str, call: Call) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(n, c)| n == name && *c == call)
            .count()
    }

    /// Index of the first `call` on `name`.
    pub fn position(&self, name: &str, call: Call) -> Option<usize> {
        self.calls
            .lock()
            .iter()
            .position(|(n, c)| n == name && *c == call)
    }

    /// Every acquired resource released once, stopped at most once, and
    /// stopped before released.
    pub fn assert_all_released_once(&self) {
        for name in self.acquired() {
            assert_eq!(self.count(&name, Call::Release), 1, "{} releases", name);
            assert!(self.count(&name, Call::Stop) <= 1, "{} stopped twice", name);
            if let Some(stop) = self.position(&name, Call::Stop) {
                let release = self.position(&name, Call::Release).unwrap();
                assert!(stop < release, "{} released before stop", name);
            }
        }
    }
}

fn injected(point: &str) -> CompressError {
    CompressError::Codec(format!("injected failure at {}", point))
}

struct TrackedMetadata {
    inner: Box<dyn MetadataSource>,
    ledger: Ledger,
}

impl Releasable for TrackedMetadata {
    fn stop(&mut self) -> Result<()> {
        self.ledger.record("metadata", Call::Stop);
        self.inner.stop()
    }

    fn release(&mut self) {
        self.ledger.record("metadata", Call::Release);
        self.inner.release();
    }
}

impl MetadataSource for TrackedMetadata {
    fn extract(&mut self, key: MetadataKey) -> Result<Option<i64>> {
        self.inner.extract(key)
    }
}

struct TrackedDemuxer {
    name: String,
    inner: Box<dyn Demuxer>,
    ledger: Ledger,
}

impl Releasable for TrackedDemuxer {
    fn stop(&mut self) -> Result<()> {
        self.ledger.record(&self.name, Call::Stop);
        self.inner.stop()
    }

    fn release(&mut self) {
        self.ledger.record(&self.name, Call::Release);
        self.inner.release();
    }
}

impl Demuxer for TrackedDemuxer {
    fn track_count(&self) -> usize {
        self.inner.track_count()
    }

    fn track_format(&self, index: usize) -> Result<MediaFormat> {
        self.inner.track_format(index)
    }

    fn select_track(&mut self, index: usize) -> Result<()> {
        self.inner.select_track(index)
    }

    fn read_sample(&mut self, buffer: &mut BytesMut) -> Result<Option<SampleInfo>> {
        self.inner.read_sample(buffer)
    }

    fn advance(&mut self) -> bool {
        self.inner.advance()
    }

    fn seek_to(&mut self, time_us: i64, mode: SeekMode) -> Result<()> {
        self.inner.seek_to(time_us, mode)
    }
}

struct TrackedDecoder {
    inner: Box<dyn VideoDecoder>,
    ledger: Ledger,
    fail_start: bool,
}

impl Releasable for TrackedDecoder {
    fn stop(&mut self) -> Result<()> {
        self.ledger.record("decoder", Call::Stop);
        self.inner.stop()
    }

    fn release(&mut self) {
        self.ledger.record("decoder", Call::Release);
        self.inner.release();
    }
}

impl VideoDecoder for TrackedDecoder {
    fn configure(&mut self, format: &MediaFormat, surface: Surface) -> Result<()> {
        self.inner.configure(format, surface)
    }

    fn start(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(injected("decoder start"));
        }
        self.inner.start()
    }

    fn dequeue_input_buffer(&mut self, timeout: Duration) -> Result<Option<usize>> {
        self.inner.dequeue_input_buffer(timeout)
    }

    fn input_buffer(&mut self, index: usize) -> Result<&mut BytesMut> {
        self.inner.input_buffer(index)
    }

    fn queue_input_buffer(&mut self, index: usize, info: SampleInfo) -> Result<()> {
        self.inner.queue_input_buffer(index, info)
    }

    fn dequeue_output_buffer(&mut self, timeout: Duration) -> Result<OutputEvent> {
        self.inner.dequeue_output_buffer(timeout)
    }

    fn release_output_buffer(&mut self, index: usize, render: bool) -> Result<()> {
        self.inner.release_output_buffer(index, render)
    }
}

struct TrackedEncoder {
    inner: Box<dyn VideoEncoder>,
    ledger: Ledger,
    fail_start: bool,
    fail_on_poll: Option<usize>,
    polls: usize,
}

impl Releasable for TrackedEncoder {
    fn stop(&mut self) -> Result<()> {
        self.ledger.record("encoder", Call::Stop);
        self.inner.stop()
    }

    fn release(&mut self) {
        self.ledger.record("encoder", Call::Release);
        self.inner.release();
    }
}

impl VideoEncoder for TrackedEncoder {
    fn configure(&mut self, format: &MediaFormat) -> Result<()> {
        self.ledger.encoder_formats.lock().push(format.clone());
        self.inner.configure(format)
    }

    fn create_input_surface(&mut self) -> Result<Surface> {
        self.inner.create_input_surface()
    }

    fn start(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(injected("encoder start"));
        }
        self.inner.start()
    }

    fn signal_end_of_input_stream(&mut self) -> Result<()> {
        self.inner.signal_end_of_input_stream()
    }

    fn dequeue_output_buffer(&mut self, timeout: Duration) -> Result<OutputEvent> {
        self.polls += 1;
        if self.fail_on_poll == Some(self.polls) {
            return Err(injected("encoder poll"));
        }
        self.inner.dequeue_output_buffer(timeout)
    }

    fn output_buffer(&self, index: usize) -> Result<&[u8]> {
        self.inner.output_buffer(index)
    }

    fn release_output_buffer(&mut self, index: usize) -> Result<()> {
        self.inner.release_output_buffer(index)
    }
}

struct TrackedMuxer {
    inner: Box<dyn Muxer>,
    ledger: Ledger,
    fail_stop: bool,
}

impl Releasable for TrackedMuxer {
    fn stop(&mut self) -> Result<()> {
        self.ledger.record("muxer", Call::Stop);
        let stopped = self.inner.stop();
        if self.fail_stop {
            return Err(CompressError::Muxer("injected failure at muxer stop".into()));
        }
        stopped
    }

    fn release(&mut self) {
        self.ledger.record("muxer", Call::Release);
        self.inner.release();
    }
}

impl Muxer for TrackedMuxer {
    fn add_track(&mut self, format: &MediaFormat) -> Result<usize> {
        self.inner.add_track(format)
    }

    fn set_orientation_hint(&mut self, degrees: u32) -> Result<()> {
        self.inner.set_orientation_hint(degrees)
    }

    fn start(&mut self) -> Result<()> {
        self.inner.start()
    }

    fn write_sample(&mut self, track: usize, buffer: &[u8], info: &SampleInfo) -> Result<()> {
        self.inner.write_sample(track, buffer, info)
    }
}

/// [`MemoryBackend`] wrapped so every handed-out resource reports to a
/// [`Ledger`], with an optional injected failure.
pub struct ScriptedBackend {
    inner: MemoryBackend,
    ledger: Ledger,
    fail_at: FailAt,
    demuxers: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(media: MemoryMedia, metadata: MemoryMetadata) -> Self {
        Self {
            inner: MemoryBackend::loopback(media, metadata),
            ledger: Ledger::default(),
            fail_at: FailAt::Nowhere,
            demuxers: AtomicUsize::new(0),
        }
    }

    pub fn failing_at(mut self, fail_at: FailAt) -> Self {
        self.fail_at = fail_at;
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn recording(&self) -> &MuxRecording {
        self.inner.recording()
    }
}

impl MediaBackend for ScriptedBackend {
    fn open_metadata(&self, source: &SourceDescriptor) -> Result<Box<dyn MetadataSource>> {
        if self.fail_at == FailAt::Probe {
            return Err(CompressError::Container("injected failure at probe".into()));
        }
        let inner = self.inner.open_metadata(source)?;
        self.ledger.record("metadata", Call::Acquire);
        Ok(Box::new(TrackedMetadata {
            inner,
            ledger: self.ledger.clone(),
        }))
    }

    fn open_demuxer(&self, source: &SourceDescriptor) -> Result<Box<dyn Demuxer>> {
        let inner = self.inner.open_demuxer(source)?;
        let name = format!("demuxer{}", self.demuxers.fetch_add(1, Ordering::SeqCst));
        self.ledger.record(&name, Call::Acquire);
        Ok(Box::new(TrackedDemuxer {
            name,
            inner,
            ledger: self.ledger.clone(),
        }))
    }

    fn create_decoder(&self, mime: &str) -> Result<Box<dyn VideoDecoder>> {
        let inner = self.inner.create_decoder(mime)?;
        self.ledger.record("decoder", Call::Acquire);
        Ok(Box::new(TrackedDecoder {
            inner,
            ledger: self.ledger.clone(),
            fail_start: self.fail_at == FailAt::DecoderStart,
        }))
    }

    fn create_encoder(&self, mime: &str) -> Result<Box<dyn VideoEncoder>> {
        let inner = self.inner.create_encoder(mime)?;
        self.ledger.record("encoder", Call::Acquire);
        let fail_on_poll = match self.fail_at {
            FailAt::LoopIteration(n) => Some(n),
            _ => None,
        };
        Ok(Box::new(TrackedEncoder {
            inner,
            ledger: self.ledger.clone(),
            fail_start: self.fail_at == FailAt::EncoderStart,
            fail_on_poll,
            polls: 0,
        }))
    }

    fn create_muxer(&self, output: &Path) -> Result<Box<dyn Muxer>> {
        let inner = self.inner.create_muxer(output)?;
        self.ledger.record("muxer", Call::Acquire);
        Ok(Box::new(TrackedMuxer {
            inner,
            ledger: self.ledger.clone(),
            fail_stop: self.fail_at == FailAt::MuxerStop,
        }))
    }
}
