use bytes::BytesMut;
use log::debug;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use super::movie::{Movie, TrackInfo};
use crate::av::{Demuxer, MediaFormat, Releasable, SampleFlags, SampleInfo, SeekMode};
use crate::codec::h264::avcc_to_annex_b;
use crate::error::{CompressError, Result};
use crate::format::cursor::{SampleTable, SelectionCursor};

impl SampleTable for TrackInfo {
    fn sample_count(&self) -> usize {
        self.samples.len()
    }

    fn decode_time_us(&self, sample: usize) -> i64 {
        self.samples[sample].decode_time_us
    }

    fn presentation_time_us(&self, sample: usize) -> i64 {
        self.samples[sample].presentation_time_us
    }

    fn is_sync(&self, sample: usize) -> bool {
        self.samples[sample].sync
    }
}

/// Reads samples out of an MP4 file.
///
/// H.264 samples are returned in Annex-B form, the layout decoders take.
pub struct Mp4Demuxer {
    file: Option<File>,
    tracks: Vec<TrackInfo>,
    cursor: SelectionCursor,
    scratch: Vec<u8>,
}

impl Mp4Demuxer {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path.as_ref())?;
        let movie = Movie::read(&mut file)?;
        debug!(
            "Opened {} with track ids {:?}",
            path.as_ref().display(),
            movie.tracks.iter().map(|t| t.track_id).collect::<Vec<_>>()
        );

        Ok(Self {
            file: Some(file),
            cursor: SelectionCursor::new(movie.tracks.len()),
            tracks: movie.tracks,
            scratch: Vec::new(),
        })
    }
}

impl Releasable for Mp4Demuxer {
    fn release(&mut self) {
        self.file = None;
        self.scratch = Vec::new();
    }
}

impl Demuxer for Mp4Demuxer {
    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_format(&self, index: usize) -> Result<MediaFormat> {
        self.tracks
            .get(index)
            .map(|t| t.format.clone())
            .ok_or_else(|| CompressError::Container(format!("track {} out of range", index)))
    }

    fn select_track(&mut self, index: usize) -> Result<()> {
        self.cursor.select(index)
    }

    fn read_sample(&mut self, buffer: &mut BytesMut) -> Result<Option<SampleInfo>> {
        let Some((track, index)) = self.cursor.current(&self.tracks) else {
            return Ok(None);
        };
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CompressError::Container("demuxer already released".into()))?;

        let info = &self.tracks[track];
        let stored = info.samples[index];
        self.scratch.resize(stored.size as usize, 0);
        file.seek(SeekFrom::Start(stored.offset))?;
        file.read_exact(&mut self.scratch)?;

        buffer.clear();
        match info.nal_length_size {
            Some(length_size) => avcc_to_annex_b(&self.scratch, length_size, buffer)?,
            None => buffer.extend_from_slice(&self.scratch),
        }

        let mut flags = SampleFlags::empty();
        if stored.sync {
            flags.insert(SampleFlags::KEY_FRAME);
        }
        Ok(Some(
            SampleInfo::new(buffer.len(), stored.presentation_time_us).with_flags(flags),
        ))
    }

    fn advance(&mut self) -> bool {
        self.cursor.advance(&self.tracks)
    }

    fn seek_to(&mut self, time_us: i64, mode: SeekMode) -> Result<()> {
        self.cursor.seek(&self.tracks, time_us, mode);
        Ok(())
    }
}
