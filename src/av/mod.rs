//! # Audio/Video Base Types
//!
//! Media-level vocabulary shared by every stage of the compression pipeline:
//! format records, timestamped samples, the demuxer/muxer contracts and the
//! release protocol every codec and container handle follows.

use bytes::BytesMut;

use crate::error::Result;

mod backend;
mod media_format;
mod sample;
mod source;

/// Container-level metadata probing
pub mod probe;

/// Decode → encode → mux pipeline
pub mod transcode;

pub use backend::{FileBackend, MediaBackend, MemoryBackend};
pub use media_format::{ColorFormat, MediaFormat, MediaType, TrackDescriptor};
pub use sample::{Sample, SampleFlags, SampleInfo};
pub use source::SourceDescriptor;

/// Stop/release protocol shared by codecs, demuxers and muxers.
///
/// `stop` is only ever invoked on a resource whose `start` succeeded;
/// `release` is invoked exactly once on every acquired resource.
pub trait Releasable {
    /// Stops a started resource. Muxers finalize their output here.
    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    /// Frees everything the resource holds.
    fn release(&mut self);
}

/// Where a demuxer lands when repositioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// Last sync sample at or before the requested time
    PreviousSync,
    /// First sync sample at or after the requested time
    NextSync,
    /// Sync sample nearest to the requested time
    ClosestSync,
}

/// Reads a container and exposes its elementary streams as sequences of
/// timestamped compressed samples.
pub trait Demuxer: Releasable + Send {
    /// Number of tracks in the container.
    fn track_count(&self) -> usize;

    /// Format of the track at `index`.
    fn track_format(&self, index: usize) -> Result<MediaFormat>;

    /// Adds a track to the set samples are read from.
    fn select_track(&mut self, index: usize) -> Result<()>;

    /// Copies the current sample into `buffer` (replacing its contents) without
    /// advancing. Returns `None` once no selected track has samples left.
    fn read_sample(&mut self, buffer: &mut BytesMut) -> Result<Option<SampleInfo>>;

    /// Moves to the next sample. Returns `false` when none remain.
    fn advance(&mut self) -> bool;

    /// Repositions every selected track to a sync point near `time_us`.
    fn seek_to(&mut self, time_us: i64, mode: SeekMode) -> Result<()>;
}

/// Writes elementary streams into one output container.
///
/// Every track must be added before `start`; samples are accepted only
/// between `start` and `stop`.
pub trait Muxer: Releasable + Send {
    /// Registers a track and returns its destination index.
    fn add_track(&mut self, format: &MediaFormat) -> Result<usize>;

    /// Records a playback rotation (0, 90, 180 or 270 degrees).
    fn set_orientation_hint(&mut self, degrees: u32) -> Result<()>;

    /// Starts the muxer. No track can be added afterwards.
    fn start(&mut self) -> Result<()>;

    /// Writes `buffer[info.offset..info.offset + info.size]` to `track`.
    fn write_sample(&mut self, track: usize, buffer: &[u8], info: &SampleInfo) -> Result<()>;
}
