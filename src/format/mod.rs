//! # Container Formats
//!
//! Demuxers, muxers and metadata sources implementing the
//! [`Demuxer`](crate::av::Demuxer), [`Muxer`](crate::av::Muxer) and
//! [`MetadataSource`](crate::av::probe::MetadataSource) contracts.
//!
//! - [`mp4`]: ISO-BMFF files on disk
//! - [`memory`]: in-memory tracks and a recording muxer

mod cursor;

/// In-memory containers
pub mod memory;

/// MP4 (ISO-BMFF) reading and writing
pub mod mp4;

pub use memory::{MemoryDemuxer, MemoryMedia, MemoryMetadata, MemoryMuxer, MemoryTrack, MuxEvent, MuxRecording};
pub use mp4::{Mp4Demuxer, Mp4Metadata, Mp4Muxer};
