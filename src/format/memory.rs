//! In-memory containers.
//!
//! [`MemoryMedia`] holds tracks of ready-made samples and opens any number of
//! independent [`MemoryDemuxer`]s over them. [`MemoryMuxer`] validates the
//! same call protocol as a file muxer and records every accepted operation in
//! a shared [`MuxRecording`].

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::sync::Arc;

use super::cursor::{SampleTable, SelectionCursor};
use crate::av::probe::{MetadataKey, MetadataSource};
use crate::av::{Demuxer, MediaFormat, Muxer, Releasable, Sample, SampleInfo, SeekMode};
use crate::error::{CompressError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTrack {
    pub format: MediaFormat,
    pub samples: Vec<Sample>,
}

impl SampleTable for MemoryTrack {
    fn sample_count(&self) -> usize {
        self.samples.len()
    }

    fn decode_time_us(&self, sample: usize) -> i64 {
        self.samples[sample].presentation_time_us
    }

    fn presentation_time_us(&self, sample: usize) -> i64 {
        self.samples[sample].presentation_time_us
    }

    fn is_sync(&self, sample: usize) -> bool {
        self.samples[sample].is_key_frame()
    }
}

/// Shared, immutable set of tracks.
#[derive(Debug, Clone, Default)]
pub struct MemoryMedia {
    tracks: Arc<Vec<MemoryTrack>>,
}

impl MemoryMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_track(mut self, format: MediaFormat, samples: Vec<Sample>) -> Self {
        Arc::make_mut(&mut self.tracks).push(MemoryTrack { format, samples });
        self
    }

    pub fn tracks(&self) -> &[MemoryTrack] {
        &self.tracks
    }

    /// Opens a demuxer with its own read position.
    pub fn demuxer(&self) -> MemoryDemuxer {
        MemoryDemuxer {
            tracks: Arc::clone(&self.tracks),
            cursor: SelectionCursor::new(self.tracks.len()),
            released: false,
        }
    }
}

pub struct MemoryDemuxer {
    tracks: Arc<Vec<MemoryTrack>>,
    cursor: SelectionCursor,
    released: bool,
}

impl MemoryDemuxer {
    fn ensure_open(&self) -> Result<()> {
        if self.released {
            Err(CompressError::Container("demuxer already released".into()))
        } else {
            Ok(())
        }
    }
}

impl Releasable for MemoryDemuxer {
    fn release(&mut self) {
        self.released = true;
    }
}

impl Demuxer for MemoryDemuxer {
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
        self.ensure_open()?;
        self.cursor.select(index)
    }

    fn read_sample(&mut self, buffer: &mut BytesMut) -> Result<Option<SampleInfo>> {
        self.ensure_open()?;
        let Some((track, index)) = self.cursor.current(self.tracks.as_slice()) else {
            return Ok(None);
        };
        let sample = &self.tracks[track].samples[index];
        buffer.clear();
        buffer.extend_from_slice(&sample.data);
        Ok(Some(sample.info()))
    }

    fn advance(&mut self) -> bool {
        !self.released && self.cursor.advance(self.tracks.as_slice())
    }

    fn seek_to(&mut self, time_us: i64, mode: SeekMode) -> Result<()> {
        self.ensure_open()?;
        self.cursor.seek(self.tracks.as_slice(), time_us, mode);
        Ok(())
    }
}

/// One accepted muxer call.
#[derive(Debug, Clone, PartialEq)]
pub enum MuxEvent {
    AddTrack { index: usize, format: MediaFormat },
    OrientationHint(u32),
    Start,
    Sample { track: usize, sample: Sample },
    Stop,
}

#[derive(Debug, Default)]
struct RecordingState {
    events: Vec<MuxEvent>,
    released: bool,
}

/// Shared log of what a [`MemoryMuxer`] accepted; outlives the muxer.
#[derive(Debug, Clone, Default)]
pub struct MuxRecording {
    inner: Arc<Mutex<RecordingState>>,
}

impl MuxRecording {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MuxEvent> {
        self.inner.lock().events.clone()
    }

    pub fn track_formats(&self) -> Vec<MediaFormat> {
        self.inner
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                MuxEvent::AddTrack { format, .. } => Some(format.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn samples(&self, track: usize) -> Vec<Sample> {
        self.inner
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                MuxEvent::Sample { track: t, sample } if *t == track => Some(sample.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn orientation_hint(&self) -> Option<u32> {
        self.inner.lock().events.iter().find_map(|event| match event {
            MuxEvent::OrientationHint(degrees) => Some(*degrees),
            _ => None,
        })
    }

    pub fn is_started(&self) -> bool {
        self.inner.lock().events.contains(&MuxEvent::Start)
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.lock().events.contains(&MuxEvent::Stop)
    }

    pub fn is_released(&self) -> bool {
        self.inner.lock().released
    }

    fn push(&self, event: MuxEvent) {
        self.inner.lock().events.push(event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemoryMuxerState {
    Initialized,
    Started,
    Stopped,
}

/// Muxer that keeps samples in memory.
pub struct MemoryMuxer {
    recording: MuxRecording,
    state: MemoryMuxerState,
    last_pts: Vec<Option<i64>>,
    fail_on_stop: bool,
}

impl MemoryMuxer {
    pub fn new(recording: MuxRecording) -> Self {
        Self {
            recording,
            state: MemoryMuxerState::Initialized,
            last_pts: Vec::new(),
            fail_on_stop: false,
        }
    }

    /// Makes `stop` fail after validating state, as a muxer does when
    /// finalization hits an I/O error.
    pub fn fail_on_stop(mut self) -> Self {
        self.fail_on_stop = true;
        self
    }

    fn require_state(&self, expected: MemoryMuxerState, operation: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CompressError::Muxer(format!(
                "{} called in state {:?}",
                operation, self.state
            )))
        }
    }
}

impl Releasable for MemoryMuxer {
    fn stop(&mut self) -> Result<()> {
        self.require_state(MemoryMuxerState::Started, "stop")?;
        self.state = MemoryMuxerState::Stopped;
        if self.fail_on_stop {
            return Err(CompressError::Muxer("failed to finalize output".into()));
        }
        self.recording.push(MuxEvent::Stop);
        Ok(())
    }

    fn release(&mut self) {
        self.recording.inner.lock().released = true;
    }
}

impl Muxer for MemoryMuxer {
    fn add_track(&mut self, format: &MediaFormat) -> Result<usize> {
        self.require_state(MemoryMuxerState::Initialized, "add_track")?;
        let index = self.last_pts.len();
        self.last_pts.push(None);
        self.recording.push(MuxEvent::AddTrack {
            index,
            format: format.clone(),
        });
        Ok(index)
    }

    fn set_orientation_hint(&mut self, degrees: u32) -> Result<()> {
        self.require_state(MemoryMuxerState::Initialized, "set_orientation_hint")?;
        if !matches!(degrees, 0 | 90 | 180 | 270) {
            return Err(CompressError::Muxer(format!(
                "unsupported orientation {}",
                degrees
            )));
        }
        self.recording.push(MuxEvent::OrientationHint(degrees));
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.require_state(MemoryMuxerState::Initialized, "start")?;
        if self.last_pts.is_empty() {
            return Err(CompressError::Muxer("no tracks added".into()));
        }
        self.state = MemoryMuxerState::Started;
        self.recording.push(MuxEvent::Start);
        Ok(())
    }

    fn write_sample(&mut self, track: usize, buffer: &[u8], info: &SampleInfo) -> Result<()> {
        self.require_state(MemoryMuxerState::Started, "write_sample")?;
        let region = info
            .end()
            .and_then(|end| buffer.get(info.offset..end))
            .ok_or_else(|| CompressError::Muxer("sample region exceeds buffer".into()))?;
        let last = self
            .last_pts
            .get_mut(track)
            .ok_or_else(|| CompressError::Muxer(format!("unknown track {}", track)))?;

        if let Some(previous) = *last {
            if info.presentation_time_us < previous {
                return Err(CompressError::Muxer(format!(
                    "timestamp {} before {} on track {}",
                    info.presentation_time_us, previous, track
                )));
            }
        }
        *last = Some(info.presentation_time_us);

        self.recording.push(MuxEvent::Sample {
            track,
            sample: Sample::new(Bytes::copy_from_slice(region), info.presentation_time_us)
                .with_flags(info.flags),
        });
        Ok(())
    }
}

/// Metadata source with fixed values; unset fields read as absent.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetadata {
    width: Option<i64>,
    height: Option<i64>,
    duration_ms: Option<i64>,
    rotation: Option<i64>,
    released: bool,
}

impl MemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimensions(mut self, width: i64, height: i64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: i64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_rotation(mut self, degrees: i64) -> Self {
        self.rotation = Some(degrees);
        self
    }
}

impl Releasable for MemoryMetadata {
    fn release(&mut self) {
        self.released = true;
    }
}

impl MetadataSource for MemoryMetadata {
    fn extract(&mut self, key: MetadataKey) -> Result<Option<i64>> {
        if self.released {
            return Err(CompressError::Container("metadata source released".into()));
        }
        Ok(match key {
            MetadataKey::VideoWidth => self.width,
            MetadataKey::VideoHeight => self.height,
            MetadataKey::DurationMillis => self.duration_ms,
            MetadataKey::VideoRotation => self.rotation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::SampleFlags;
    use pretty_assertions::assert_eq;

    fn media() -> MemoryMedia {
        MemoryMedia::new()
            .with_track(
                MediaFormat::video("video/avc", 320, 240),
                vec![
                    Sample::new(&b"v0"[..], 0).with_key_flag(true),
                    Sample::new(&b"v1"[..], 33_333),
                ],
            )
            .with_track(
                MediaFormat::audio("audio/mp4a-latm", 44_100, 2),
                vec![Sample::new(&b"a0"[..], 0), Sample::new(&b"a1"[..], 23_220)],
            )
    }

    #[test]
    fn test_demuxers_have_independent_positions() {
        let media = media();
        let mut first = media.demuxer();
        let mut second = media.demuxer();
        first.select_track(1).unwrap();
        second.select_track(1).unwrap();

        let mut buffer = BytesMut::new();
        first.advance();
        first.read_sample(&mut buffer).unwrap();
        assert_eq!(&buffer[..], b"a1");

        second.read_sample(&mut buffer).unwrap();
        assert_eq!(&buffer[..], b"a0");
    }

    #[test]
    fn test_read_replaces_buffer_contents() {
        let mut demuxer = media().demuxer();
        demuxer.select_track(0).unwrap();

        let mut buffer = BytesMut::from(&b"stale bytes"[..]);
        let info = demuxer.read_sample(&mut buffer).unwrap().unwrap();
        assert_eq!(&buffer[..], b"v0");
        assert_eq!(info.size, 2);
        assert!(info.is_key_frame());

        assert!(demuxer.advance());
        assert!(!demuxer.advance());
        assert!(demuxer.read_sample(&mut buffer).unwrap().is_none());
    }

    #[test]
    fn test_muxer_records_operations() {
        let recording = MuxRecording::new();
        let mut muxer = MemoryMuxer::new(recording.clone());

        let format = MediaFormat::video("video/avc", 320, 240);
        assert_eq!(muxer.add_track(&format).unwrap(), 0);
        muxer.set_orientation_hint(270).unwrap();
        muxer.start().unwrap();

        let info = SampleInfo::new(2, 10).with_offset(1).with_flags(SampleFlags::KEY_FRAME);
        muxer.write_sample(0, b"xabx", &info).unwrap();
        muxer.stop().unwrap();
        muxer.release();

        assert_eq!(recording.track_formats(), vec![format]);
        assert_eq!(recording.orientation_hint(), Some(270));
        assert_eq!(
            recording.samples(0),
            vec![Sample::new(&b"ab"[..], 10).with_key_flag(true)]
        );
        assert!(recording.is_stopped());
        assert!(recording.is_released());
    }

    #[test]
    fn test_muxer_protocol_violations() {
        let mut muxer = MemoryMuxer::new(MuxRecording::new());
        assert!(muxer.start().is_err());
        assert!(muxer.stop().is_err());
        assert!(muxer.write_sample(0, b"a", &SampleInfo::new(1, 0)).is_err());

        muxer.add_track(&MediaFormat::new("audio/raw")).unwrap();
        muxer.start().unwrap();
        assert!(muxer.add_track(&MediaFormat::new("audio/raw")).is_err());

        muxer.write_sample(0, b"a", &SampleInfo::new(1, 100)).unwrap();
        assert!(muxer.write_sample(0, b"a", &SampleInfo::new(1, 99)).is_err());
        assert!(muxer.write_sample(1, b"a", &SampleInfo::new(1, 200)).is_err());
    }

    #[test]
    fn test_failing_stop_reports_error() {
        let recording = MuxRecording::new();
        let mut muxer = MemoryMuxer::new(recording.clone()).fail_on_stop();
        muxer.add_track(&MediaFormat::new("audio/raw")).unwrap();
        muxer.start().unwrap();
        assert!(muxer.stop().is_err());
        assert!(!recording.is_stopped());
    }
}
