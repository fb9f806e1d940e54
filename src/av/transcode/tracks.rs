use crate::av::{Demuxer, MediaType, TrackDescriptor};
use crate::error::Result;

/// Returns the lowest-indexed track whose mime starts with the prefix of
/// `media_type`, or `None`. Leaves the demuxer's selection untouched.
pub fn find_track(demuxer: &dyn Demuxer, media_type: MediaType) -> Result<Option<TrackDescriptor>> {
    let prefix = media_type.mime_prefix();
    for index in 0..demuxer.track_count() {
        let format = demuxer.track_format(index)?;
        if format.mime.starts_with(prefix) {
            return Ok(Some(TrackDescriptor::new(index, format)));
        }
    }
    Ok(None)
}

/// Source track index paired with the destination index the muxer assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackMapping {
    pub source_index: usize,
    pub destination_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackMappings {
    pub video: TrackMapping,
    pub audio: Option<TrackMapping>,
}

/// Whether the destination muxer has been started, and with which tracks.
///
/// Samples can only be written in `Started`, which is entered after every
/// destination track is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MuxState {
    #[default]
    Pending,
    Started(TrackMappings),
}

impl MuxState {
    pub fn mappings(&self) -> Option<&TrackMappings> {
        match self {
            MuxState::Pending => None,
            MuxState::Started(mappings) => Some(mappings),
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(self, MuxState::Started(_))
    }
}
