use std::path::Path;

use super::probe::MetadataSource;
use super::{Demuxer, Muxer, SourceDescriptor};
use crate::codec::{CodecFactory, LoopbackCodecs, VideoDecoder, VideoEncoder};
use crate::error::Result;
use crate::format::memory::{MemoryMedia, MemoryMetadata, MemoryMuxer, MuxRecording};
use crate::format::mp4::{Mp4Demuxer, Mp4Metadata, Mp4Muxer};

/// Factory for every platform resource one compression run acquires.
pub trait MediaBackend: Send + Sync + 'static {
    fn open_metadata(&self, source: &SourceDescriptor) -> Result<Box<dyn MetadataSource>>;

    /// Opens a demuxer with its own read position. Called once per
    /// independently read track.
    fn open_demuxer(&self, source: &SourceDescriptor) -> Result<Box<dyn Demuxer>>;

    fn create_decoder(&self, mime: &str) -> Result<Box<dyn VideoDecoder>>;

    fn create_encoder(&self, mime: &str) -> Result<Box<dyn VideoEncoder>>;

    fn create_muxer(&self, output: &Path) -> Result<Box<dyn Muxer>>;
}

/// MP4 files on the local filesystem with pluggable codecs.
#[derive(Debug, Clone, Default)]
pub struct FileBackend<C = LoopbackCodecs> {
    codecs: C,
}

impl FileBackend<LoopbackCodecs> {
    /// File containers with the software loopback codecs.
    pub fn loopback() -> Self {
        Self::default()
    }
}

impl<C: CodecFactory> FileBackend<C> {
    pub fn new(codecs: C) -> Self {
        Self { codecs }
    }
}

impl<C: CodecFactory + 'static> MediaBackend for FileBackend<C> {
    fn open_metadata(&self, source: &SourceDescriptor) -> Result<Box<dyn MetadataSource>> {
        Ok(Box::new(Mp4Metadata::open(source.require_path()?)?))
    }

    fn open_demuxer(&self, source: &SourceDescriptor) -> Result<Box<dyn Demuxer>> {
        Ok(Box::new(Mp4Demuxer::open(source.require_path()?)?))
    }

    fn create_decoder(&self, mime: &str) -> Result<Box<dyn VideoDecoder>> {
        self.codecs.create_decoder(mime)
    }

    fn create_encoder(&self, mime: &str) -> Result<Box<dyn VideoEncoder>> {
        self.codecs.create_encoder(mime)
    }

    fn create_muxer(&self, output: &Path) -> Result<Box<dyn Muxer>> {
        Ok(Box::new(Mp4Muxer::create(output)?))
    }
}

/// In-memory media with a recording muxer. Every muxer it creates appends to
/// the same [`MuxRecording`]; the output path is ignored.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend<C = LoopbackCodecs> {
    media: MemoryMedia,
    metadata: MemoryMetadata,
    recording: MuxRecording,
    codecs: C,
}

impl MemoryBackend<LoopbackCodecs> {
    pub fn loopback(media: MemoryMedia, metadata: MemoryMetadata) -> Self {
        Self::new(media, metadata, LoopbackCodecs::default())
    }
}

impl<C: CodecFactory> MemoryBackend<C> {
    pub fn new(media: MemoryMedia, metadata: MemoryMetadata, codecs: C) -> Self {
        Self {
            media,
            metadata,
            recording: MuxRecording::new(),
            codecs,
        }
    }

    pub fn recording(&self) -> &MuxRecording {
        &self.recording
    }
}

impl<C: CodecFactory + 'static> MediaBackend for MemoryBackend<C> {
    fn open_metadata(&self, _source: &SourceDescriptor) -> Result<Box<dyn MetadataSource>> {
        Ok(Box::new(self.metadata.clone()))
    }

    fn open_demuxer(&self, _source: &SourceDescriptor) -> Result<Box<dyn Demuxer>> {
        Ok(Box::new(self.media.demuxer()))
    }

    fn create_decoder(&self, mime: &str) -> Result<Box<dyn VideoDecoder>> {
        self.codecs.create_decoder(mime)
    }

    fn create_encoder(&self, mime: &str) -> Result<Box<dyn VideoEncoder>> {
        self.codecs.create_encoder(mime)
    }

    fn create_muxer(&self, _output: &Path) -> Result<Box<dyn Muxer>> {
        Ok(Box::new(MemoryMuxer::new(self.recording.clone())))
    }
}
