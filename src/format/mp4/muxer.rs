use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, info};
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::boxes::{put_rotation_matrix, write_box, write_full_box};
use crate::av::{MediaFormat, Muxer, Releasable, SampleFlags, SampleInfo};
use crate::codec::aac::{
    parse_audio_specific_config, write_audio_specific_config, AudioObjectType,
    AudioSpecificConfig,
};
use crate::codec::h264::{
    annex_b_to_avcc, is_annex_b, split_annex_b, AvcDecoderConfig, NALUnitType,
};
use crate::codec::{MIME_AUDIO_AAC, MIME_VIDEO_AVC};
use crate::error::{CompressError, Result};

const VIDEO_TIMESCALE: u32 = 90_000;
const MOVIE_TIMESCALE: u32 = 1_000;
const DEFAULT_FRAME_RATE: u32 = 30;
const AAC_FRAME_SAMPLES: u32 = 1024;
const LANGUAGE_UND: u16 = 0x55C4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MuxerState {
    Initialized,
    Started,
    Stopped,
}

enum TrackCodec {
    Avc {
        config: AvcDecoderConfig,
        width: u32,
        height: u32,
    },
    Aac {
        config: Bytes,
        sample_rate: u32,
        channels: u32,
    },
}

struct WrittenSample {
    size: u32,
    presentation_time_us: i64,
    sync: bool,
}

struct Chunk {
    offset: u64,
    samples: u32,
}

struct TrackWriter {
    codec: TrackCodec,
    timescale: u32,
    bit_rate: u32,
    samples: Vec<WrittenSample>,
    chunks: Vec<Chunk>,
}

impl TrackWriter {
    fn is_video(&self) -> bool {
        matches!(self.codec, TrackCodec::Avc { .. })
    }

    fn last_presentation_time_us(&self) -> Option<i64> {
        self.samples.last().map(|s| s.presentation_time_us)
    }

    /// Presentation time of the first sample. It is kept in the output as
    /// an initial empty edit, since the sample table itself starts at 0.
    fn start_offset_us(&self) -> i64 {
        self.samples
            .first()
            .map_or(0, |s| s.presentation_time_us.max(0))
    }

    /// Sample durations in track timescale; the last one repeats the
    /// previous delta (or a nominal frame duration for single samples).
    fn durations(&self) -> Vec<u32> {
        let ticks: Vec<i64> = self
            .samples
            .iter()
            .map(|s| {
                let relative = s.presentation_time_us - self.samples[0].presentation_time_us;
                (i128::from(relative) * i128::from(self.timescale) / 1_000_000) as i64
            })
            .collect();

        let mut durations: Vec<u32> = ticks
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).clamp(0, i64::from(u32::MAX)) as u32)
            .collect();
        if !ticks.is_empty() {
            let nominal = if self.is_video() {
                self.timescale / DEFAULT_FRAME_RATE
            } else {
                AAC_FRAME_SAMPLES
            };
            durations.push(durations.last().copied().unwrap_or(nominal));
        }
        durations
    }
}

/// Writes an MP4 (ISO-BMFF) file: `ftyp`, one `mdat`, and a `moov` built
/// at stop.
///
/// Tracks are added before `start`; samples are accepted only while started
/// and must not go back in time within a track. Annex-B H.264 samples are
/// stored length-prefixed.
pub struct Mp4Muxer {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    state: MuxerState,
    tracks: Vec<TrackWriter>,
    orientation: u32,
    mdat_start: u64,
    position: u64,
    last_track: Option<usize>,
    scratch: BytesMut,
}

impl Mp4Muxer {
    /// Creates (or truncates) the output file.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            state: MuxerState::Initialized,
            tracks: Vec::new(),
            orientation: 0,
            mdat_start: 0,
            position: 0,
            last_track: None,
            scratch: BytesMut::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| CompressError::Muxer("muxer already released".into()))
    }

    fn require_state(&self, expected: MuxerState, operation: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CompressError::Muxer(format!(
                "{} called in state {:?}",
                operation, self.state
            )))
        }
    }

    fn write_ftyp(&mut self) -> Result<()> {
        let has_video = self.tracks.iter().any(TrackWriter::is_video);
        let mut out = BytesMut::new();
        write_box(&mut out, b"ftyp", |out| {
            out.put_slice(b"isom");
            out.put_u32(0x200);
            out.put_slice(b"isom");
            out.put_slice(b"iso2");
            if has_video {
                out.put_slice(b"avc1");
            }
            out.put_slice(b"mp41");
        });

        // 64-bit mdat header, size patched at stop
        self.mdat_start = out.len() as u64;
        out.put_u32(1);
        out.put_slice(b"mdat");
        out.put_u64(0);

        self.position = out.len() as u64;
        self.writer()?.write_all(&out)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let mdat_size = self.position - self.mdat_start;
        let moov = self.build_moov();
        let mdat_size_at = self.mdat_start + 8;
        let end = self.position;

        let writer = self.writer()?;
        writer.seek(SeekFrom::Start(mdat_size_at))?;
        writer.write_all(&mdat_size.to_be_bytes())?;
        writer.seek(SeekFrom::Start(end))?;
        writer.write_all(&moov)?;
        writer.flush()?;
        Ok(())
    }

    fn build_moov(&self) -> Bytes {
        let durations: Vec<Vec<u32>> = self.tracks.iter().map(TrackWriter::durations).collect();
        let media_durations: Vec<u64> = durations
            .iter()
            .map(|d| d.iter().map(|v| u64::from(*v)).sum())
            .collect();
        let edits: Vec<TrackEdit> = self
            .tracks
            .iter()
            .zip(&media_durations)
            .map(|(track, media)| TrackEdit {
                empty: us_to_ticks(track.start_offset_us(), MOVIE_TIMESCALE),
                media: media * u64::from(MOVIE_TIMESCALE) / u64::from(track.timescale),
            })
            .collect();
        let movie_duration = edits.iter().map(TrackEdit::total).max().unwrap_or(0);

        let mut out = BytesMut::new();
        write_box(&mut out, b"moov", |out| {
            let version = u8::from(movie_duration > u64::from(u32::MAX));
            write_full_box(out, b"mvhd", version, 0, |out| {
                put_times(out, version, MOVIE_TIMESCALE, movie_duration);
                out.put_u32(0x0001_0000); // rate
                out.put_u16(0x0100); // volume
                out.put_slice(&[0u8; 10]);
                put_rotation_matrix(out, 0);
                out.put_slice(&[0u8; 24]);
                out.put_u32(self.tracks.len() as u32 + 1);
            });

            for (index, track) in self.tracks.iter().enumerate() {
                self.write_trak(
                    out,
                    track,
                    index as u32 + 1,
                    &edits[index],
                    media_durations[index],
                    &durations[index],
                );
            }
        });
        out.freeze()
    }

    fn write_trak(
        &self,
        out: &mut BytesMut,
        track: &TrackWriter,
        track_id: u32,
        edit: &TrackEdit,
        media_duration: u64,
        durations: &[u32],
    ) {
        let movie_duration = edit.total();
        write_box(out, b"trak", |out| {
            let version = u8::from(movie_duration > u64::from(u32::MAX));
            write_full_box(out, b"tkhd", version, 0x3, |out| {
                if version == 1 {
                    out.put_u64(0);
                    out.put_u64(0);
                    out.put_u32(track_id);
                    out.put_u32(0);
                    out.put_u64(movie_duration);
                } else {
                    out.put_u32(0);
                    out.put_u32(0);
                    out.put_u32(track_id);
                    out.put_u32(0);
                    out.put_u32(movie_duration as u32);
                }
                out.put_slice(&[0u8; 8]);
                out.put_u16(0); // layer
                out.put_u16(0); // alternate group
                out.put_u16(if track.is_video() { 0 } else { 0x0100 });
                out.put_u16(0);
                match track.codec {
                    TrackCodec::Avc { width, height, .. } => {
                        put_rotation_matrix(out, self.orientation);
                        out.put_u32(width << 16);
                        out.put_u32(height << 16);
                    }
                    TrackCodec::Aac { .. } => {
                        put_rotation_matrix(out, 0);
                        out.put_u64(0);
                    }
                }
            });

            if edit.empty > 0 {
                write_edit_list(out, edit);
            }

            write_box(out, b"mdia", |out| {
                let version = u8::from(media_duration > u64::from(u32::MAX));
                write_full_box(out, b"mdhd", version, 0, |out| {
                    put_times(out, version, track.timescale, media_duration);
                    out.put_u16(LANGUAGE_UND);
                    out.put_u16(0);
                });

                let (handler, name): (&[u8; 4], &str) = if track.is_video() {
                    (b"vide", "VideoHandle")
                } else {
                    (b"soun", "SoundHandle")
                };
                write_full_box(out, b"hdlr", 0, 0, |out| {
                    out.put_u32(0);
                    out.put_slice(handler);
                    out.put_slice(&[0u8; 12]);
                    out.put_slice(name.as_bytes());
                    out.put_u8(0);
                });

                write_box(out, b"minf", |out| {
                    if track.is_video() {
                        write_full_box(out, b"vmhd", 0, 1, |out| out.put_u64(0));
                    } else {
                        write_full_box(out, b"smhd", 0, 0, |out| out.put_u32(0));
                    }
                    write_box(out, b"dinf", |out| {
                        write_full_box(out, b"dref", 0, 0, |out| {
                            out.put_u32(1);
                            write_full_box(out, b"url ", 0, 1, |_| {});
                        });
                    });
                    write_box(out, b"stbl", |out| {
                        write_sample_description(out, track, track_id);
                        write_sample_tables(out, track, durations);
                    });
                });
            });
        });
    }
}

/// Track timeline in movie timescale: an optional leading gap, then the
/// whole media.
struct TrackEdit {
    empty: u64,
    media: u64,
}

impl TrackEdit {
    fn total(&self) -> u64 {
        self.empty + self.media
    }
}

fn us_to_ticks(time_us: i64, timescale: u32) -> u64 {
    (i128::from(time_us.max(0)) * i128::from(timescale) / 1_000_000) as u64
}

/// `edts` with an empty edit for the leading gap followed by the media at
/// normal rate.
fn write_edit_list(out: &mut BytesMut, edit: &TrackEdit) {
    let version = u8::from(edit.total() > u64::from(u32::MAX));
    write_box(out, b"edts", |out| {
        write_full_box(out, b"elst", version, 0, |out| {
            out.put_u32(2);
            for (segment, media_time) in [(edit.empty, -1i64), (edit.media, 0)] {
                if version == 1 {
                    out.put_u64(segment);
                    out.put_i64(media_time);
                } else {
                    out.put_u32(segment as u32);
                    out.put_i32(media_time as i32);
                }
                out.put_u32(0x0001_0000); // rate 1.0
            }
        });
    });
}

fn put_times(out: &mut BytesMut, version: u8, timescale: u32, duration: u64) {
    if version == 1 {
        out.put_u64(0);
        out.put_u64(0);
        out.put_u32(timescale);
        out.put_u64(duration);
    } else {
        out.put_u32(0);
        out.put_u32(0);
        out.put_u32(timescale);
        out.put_u32(duration as u32);
    }
}

fn write_sample_description(out: &mut BytesMut, track: &TrackWriter, track_id: u32) {
    write_full_box(out, b"stsd", 0, 0, |out| {
        out.put_u32(1);
        match &track.codec {
            TrackCodec::Avc {
                config,
                width,
                height,
            } => write_box(out, b"avc1", |out| {
                out.put_slice(&[0u8; 6]);
                out.put_u16(1); // data reference index
                out.put_slice(&[0u8; 16]);
                out.put_u16(*width as u16);
                out.put_u16(*height as u16);
                out.put_u32(0x0048_0000);
                out.put_u32(0x0048_0000);
                out.put_u32(0);
                out.put_u16(1); // frame count
                out.put_slice(&[0u8; 32]);
                out.put_u16(0x0018);
                out.put_u16(0xFFFF);
                write_box(out, b"avcC", |out| out.put_slice(&config.to_bytes()));
            }),
            TrackCodec::Aac {
                config,
                sample_rate,
                channels,
            } => write_box(out, b"mp4a", |out| {
                out.put_slice(&[0u8; 6]);
                out.put_u16(1);
                out.put_u64(0);
                out.put_u16(*channels as u16);
                out.put_u16(16);
                out.put_u32(0);
                out.put_u32((*sample_rate & 0xFFFF) << 16);
                write_full_box(out, b"esds", 0, 0, |out| {
                    write_descriptor(out, 0x03, |out| {
                        out.put_u16(track_id as u16);
                        out.put_u8(0);
                        write_descriptor(out, 0x04, |out| {
                            out.put_u8(0x40); // MPEG-4 audio
                            out.put_u8(0x15); // audio stream
                            out.put_slice(&[0u8; 3]);
                            out.put_u32(track.bit_rate);
                            out.put_u32(track.bit_rate);
                            write_descriptor(out, 0x05, |out| out.put_slice(config));
                        });
                        write_descriptor(out, 0x06, |out| out.put_u8(0x02));
                    });
                });
            }),
        }
    });
}

fn write_sample_tables(out: &mut BytesMut, track: &TrackWriter, durations: &[u32]) {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for duration in durations {
        match runs.last_mut() {
            Some((count, delta)) if *delta == *duration => *count += 1,
            _ => runs.push((1, *duration)),
        }
    }
    write_full_box(out, b"stts", 0, 0, |out| {
        out.put_u32(runs.len() as u32);
        for (count, delta) in &runs {
            out.put_u32(*count);
            out.put_u32(*delta);
        }
    });

    if track.is_video() {
        let sync: Vec<u32> = track
            .samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.sync)
            .map(|(i, _)| i as u32 + 1)
            .collect();
        write_full_box(out, b"stss", 0, 0, |out| {
            out.put_u32(sync.len() as u32);
            for number in &sync {
                out.put_u32(*number);
            }
        });
    }

    let mut stsc: Vec<(u32, u32)> = Vec::new();
    for (index, chunk) in track.chunks.iter().enumerate() {
        if stsc.last().map(|(_, n)| *n) != Some(chunk.samples) {
            stsc.push((index as u32 + 1, chunk.samples));
        }
    }
    write_full_box(out, b"stsc", 0, 0, |out| {
        out.put_u32(stsc.len() as u32);
        for (first_chunk, per_chunk) in &stsc {
            out.put_u32(*first_chunk);
            out.put_u32(*per_chunk);
            out.put_u32(1);
        }
    });

    write_full_box(out, b"stsz", 0, 0, |out| {
        out.put_u32(0);
        out.put_u32(track.samples.len() as u32);
        for sample in &track.samples {
            out.put_u32(sample.size);
        }
    });

    let large = track.chunks.iter().any(|c| c.offset > u64::from(u32::MAX));
    let kind = if large { b"co64" } else { b"stco" };
    write_full_box(out, kind, 0, 0, |out| {
        out.put_u32(track.chunks.len() as u32);
        for chunk in &track.chunks {
            if large {
                out.put_u64(chunk.offset);
            } else {
                out.put_u32(chunk.offset as u32);
            }
        }
    });
}

/// MPEG-4 descriptor with an expandable length field.
fn write_descriptor<F>(out: &mut BytesMut, tag: u8, body: F)
where
    F: FnOnce(&mut BytesMut),
{
    let mut payload = BytesMut::new();
    body(&mut payload);

    out.put_u8(tag);
    let len = payload.len();
    let mut started = false;
    for shift in [21, 14, 7] {
        let group = ((len >> shift) & 0x7F) as u8;
        if group != 0 || started {
            out.put_u8(0x80 | group);
            started = true;
        }
    }
    out.put_u8((len & 0x7F) as u8);
    out.put_slice(&payload);
}

fn avc_track(format: &MediaFormat) -> Result<TrackCodec> {
    let (width, height) = format
        .width
        .zip(format.height)
        .filter(|(w, h)| *w > 0 && *h > 0)
        .ok_or_else(|| CompressError::Muxer("video track needs width and height".into()))?;

    let mut sps = None;
    let mut pps = None;
    for csd in &format.csd {
        let units = if is_annex_b(csd) {
            split_annex_b(csd)
        } else {
            vec![&csd[..]]
        };
        for unit in units.into_iter().filter(|u| !u.is_empty()) {
            match NALUnitType::from(unit[0]) {
                NALUnitType::SPS if sps.is_none() => sps = Some(Bytes::copy_from_slice(unit)),
                NALUnitType::PPS if pps.is_none() => pps = Some(Bytes::copy_from_slice(unit)),
                _ => {}
            }
        }
    }

    let (sps, pps) = sps
        .zip(pps)
        .ok_or_else(|| CompressError::Muxer("video track needs SPS and PPS in csd".into()))?;
    Ok(TrackCodec::Avc {
        config: AvcDecoderConfig::from_parameter_sets(sps, pps)?,
        width,
        height,
    })
}

fn aac_track(format: &MediaFormat) -> Result<TrackCodec> {
    let parsed = format
        .csd(0)
        .map(|csd| parse_audio_specific_config(csd))
        .transpose()?;

    let sample_rate = format
        .sample_rate
        .or(parsed.map(|c| c.sample_rate))
        .filter(|rate| *rate > 0)
        .ok_or_else(|| CompressError::Muxer("audio track needs a sample rate".into()))?;
    let channels = format
        .channel_count
        .or(parsed.map(|c| u32::from(c.channel_configuration)))
        .unwrap_or(2);

    let config = match format.csd(0) {
        Some(csd) => csd.clone(),
        None => write_audio_specific_config(&AudioSpecificConfig::new(
            AudioObjectType::LC,
            sample_rate,
            channels as u8,
        )),
    };
    Ok(TrackCodec::Aac {
        config,
        sample_rate,
        channels,
    })
}

impl Releasable for Mp4Muxer {
    fn stop(&mut self) -> Result<()> {
        self.require_state(MuxerState::Started, "stop")?;
        self.finish()?;
        self.state = MuxerState::Stopped;
        info!(
            "Finalized {} ({} tracks, {} bytes of media)",
            self.path.display(),
            self.tracks.len(),
            self.position - self.mdat_start
        );
        Ok(())
    }

    fn release(&mut self) {
        self.writer = None;
        self.scratch = BytesMut::new();
    }
}

impl Muxer for Mp4Muxer {
    fn add_track(&mut self, format: &MediaFormat) -> Result<usize> {
        self.require_state(MuxerState::Initialized, "add_track")?;

        let codec = match format.mime.as_str() {
            MIME_VIDEO_AVC => avc_track(format)?,
            MIME_AUDIO_AAC => aac_track(format)?,
            other => {
                return Err(CompressError::Muxer(format!(
                    "unsupported track mime {}",
                    other
                )))
            }
        };
        let timescale = match &codec {
            TrackCodec::Avc { .. } => VIDEO_TIMESCALE,
            TrackCodec::Aac { sample_rate, .. } => *sample_rate,
        };

        self.tracks.push(TrackWriter {
            codec,
            timescale,
            bit_rate: format.bit_rate.unwrap_or(0),
            samples: Vec::new(),
            chunks: Vec::new(),
        });
        debug!("Added {} track {}", format.mime, self.tracks.len() - 1);
        Ok(self.tracks.len() - 1)
    }

    fn set_orientation_hint(&mut self, degrees: u32) -> Result<()> {
        self.require_state(MuxerState::Initialized, "set_orientation_hint")?;
        if !matches!(degrees, 0 | 90 | 180 | 270) {
            return Err(CompressError::Muxer(format!(
                "unsupported orientation {}",
                degrees
            )));
        }
        self.orientation = degrees;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.require_state(MuxerState::Initialized, "start")?;
        if self.tracks.is_empty() {
            return Err(CompressError::Muxer("no tracks added".into()));
        }
        self.write_ftyp()?;
        self.state = MuxerState::Started;
        Ok(())
    }

    fn write_sample(&mut self, track: usize, buffer: &[u8], info: &SampleInfo) -> Result<()> {
        self.require_state(MuxerState::Started, "write_sample")?;
        let region = info
            .end()
            .and_then(|end| buffer.get(info.offset..end))
            .ok_or_else(|| CompressError::Muxer("sample region exceeds buffer".into()))?;
        let writer = self
            .tracks
            .get(track)
            .ok_or_else(|| CompressError::Muxer(format!("unknown track {}", track)))?;

        if info.flags.contains(SampleFlags::CODEC_CONFIG) || region.is_empty() {
            return Ok(());
        }
        if let Some(last) = writer.last_presentation_time_us() {
            if info.presentation_time_us < last {
                return Err(CompressError::Muxer(format!(
                    "timestamp {} before {} on track {}",
                    info.presentation_time_us, last, track
                )));
            }
        }

        let payload: &[u8] = if writer.is_video() && is_annex_b(region) {
            self.scratch.clear();
            annex_b_to_avcc(region, &mut self.scratch);
            &self.scratch
        } else {
            region
        };
        let size = payload.len() as u32;
        let offset = self.position;
        match self.writer.as_mut() {
            Some(out) => out.write_all(payload)?,
            None => return Err(CompressError::Muxer("muxer already released".into())),
        }
        self.position += u64::from(size);

        let contiguous = self.last_track == Some(track);
        self.last_track = Some(track);
        let writer = &mut self.tracks[track];
        match writer.chunks.last_mut() {
            Some(chunk) if contiguous => chunk.samples += 1,
            _ => writer.chunks.push(Chunk { offset, samples: 1 }),
        }
        writer.samples.push(WrittenSample {
            size,
            presentation_time_us: info.presentation_time_us,
            sync: info.is_key_frame(),
        });
        Ok(())
    }
}
