use bytes::{BufMut, Bytes, BytesMut};
use log::debug;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};

use super::boxes::{find_box, require_box, rotation_from_matrix, BoxIter, Reader};
use crate::av::MediaFormat;
use crate::codec::aac::parse_audio_specific_config;
use crate::codec::h264::AvcDecoderConfig;
use crate::codec::{MIME_AUDIO_AAC, MIME_VIDEO_AVC, MIME_VIDEO_HEVC};
use crate::error::{CompressError, Result};

const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// Location and timing of one stored sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StoredSample {
    pub offset: u64,
    pub size: u32,
    pub decode_time_us: i64,
    pub presentation_time_us: i64,
    pub sync: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct TrackInfo {
    pub track_id: u32,
    pub format: MediaFormat,
    /// Clockwise rotation from the track matrix
    pub rotation: u32,
    /// Display size from `tkhd`
    pub display_size: Option<(u32, u32)>,
    /// Set for length-prefixed H.264 samples
    pub nal_length_size: Option<u8>,
    pub samples: Vec<StoredSample>,
}

#[derive(Debug, Clone)]
pub(crate) struct Movie {
    pub duration_ms: Option<i64>,
    pub tracks: Vec<TrackInfo>,
}

impl Movie {
    /// Scans the top-level boxes of `file` and parses its `moov`.
    pub(crate) fn read(file: &mut File) -> Result<Self> {
        file.seek(SeekFrom::Start(0))?;
        loop {
            let mut header = [0u8; 8];
            match file.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let kind = [header[4], header[5], header[6], header[7]];
            let (header_len, size) = match u32::from_be_bytes([header[0], header[1], header[2], header[3]]) {
                0 => break,
                1 => {
                    let mut large = [0u8; 8];
                    file.read_exact(&mut large)?;
                    (16u64, u64::from_be_bytes(large))
                }
                size => (8u64, u64::from(size)),
            };
            let payload_len = size.checked_sub(header_len).ok_or_else(|| {
                CompressError::Container(format!(
                    "invalid size for {} box",
                    String::from_utf8_lossy(&kind)
                ))
            })?;

            if &kind == b"moov" {
                let mut moov = vec![0u8; payload_len as usize];
                file.read_exact(&mut moov)?;
                return Movie::parse(&moov);
            }
            file.seek(SeekFrom::Current(payload_len as i64))?;
        }
        Err(CompressError::Container("no moov box".into()))
    }

    pub(crate) fn parse(moov: &[u8]) -> Result<Self> {
        let (movie_timescale, duration) = find_box(moov, b"mvhd")?
            .map(parse_mvhd)
            .transpose()?
            .unwrap_or((0, 0));
        let duration_ms = (movie_timescale > 0).then(|| ticks_to(duration, movie_timescale, 1_000));

        let mut tracks = Vec::new();
        for entry in BoxIter::new(moov) {
            let (kind, payload) = entry?;
            if &kind == b"trak" {
                tracks.push(parse_trak(payload, movie_timescale)?);
            }
        }
        debug!("Parsed moov with {} tracks", tracks.len());

        Ok(Movie { duration_ms, tracks })
    }

    pub(crate) fn first_video(&self) -> Option<&TrackInfo> {
        self.tracks
            .iter()
            .find(|t| t.format.mime.starts_with("video/"))
    }
}

/// Movie timescale and duration.
fn parse_mvhd(payload: &[u8]) -> Result<(u32, u64)> {
    let mut r = Reader::new(payload);
    let version = r.u8()?;
    r.skip(3)?;
    if version == 1 {
        r.skip(16)?;
        Ok((r.u32()?, r.u64()?))
    } else {
        r.skip(8)?;
        Ok((r.u32()?, u64::from(r.u32()?)))
    }
}

/// Shift from media time to movie time, in microseconds, from the track's
/// edit list: leading empty edits delay the track, and the first media
/// edit's start time is skipped. Edits after the first media edit are
/// ignored.
pub(crate) fn edit_offset_us(trak: &[u8], movie_timescale: u32, media_timescale: u32) -> Result<i64> {
    let Some(edts) = find_box(trak, b"edts")? else {
        return Ok(0);
    };
    let Some(elst) = find_box(edts, b"elst")? else {
        return Ok(0);
    };
    if movie_timescale == 0 {
        return Ok(0);
    }

    let mut r = Reader::new(elst);
    let version = r.u8()?;
    r.skip(3)?;
    let mut empty_us = 0i64;
    for _ in 0..r.u32()? {
        let (segment, media_time) = if version == 1 {
            (r.u64()?, r.u64()? as i64)
        } else {
            (u64::from(r.u32()?), i64::from(r.u32()? as i32))
        };
        r.skip(4)?;
        if media_time == -1 {
            empty_us += ticks_to(segment, movie_timescale, 1_000_000);
        } else {
            let skipped = ticks_to(media_time.max(0) as u64, media_timescale, 1_000_000);
            return Ok(empty_us - skipped);
        }
    }
    Ok(empty_us)
}

struct TrackHeader {
    track_id: u32,
    rotation: u32,
    width: u32,
    height: u32,
}

fn parse_tkhd(payload: &[u8]) -> Result<TrackHeader> {
    let mut r = Reader::new(payload);
    let version = r.u8()?;
    r.skip(3)?;
    let track_id = if version == 1 {
        r.skip(16)?;
        let id = r.u32()?;
        r.skip(4 + 8)?;
        id
    } else {
        r.skip(8)?;
        let id = r.u32()?;
        r.skip(4 + 4)?;
        id
    };
    // reserved, layer, alternate group, volume, reserved
    r.skip(16)?;
    let a = r.u32()?;
    let b = r.u32()?;
    r.skip(4)?;
    let c = r.u32()?;
    let d = r.u32()?;
    r.skip(16)?;
    let width = r.u32()? >> 16;
    let height = r.u32()? >> 16;

    Ok(TrackHeader {
        track_id,
        rotation: rotation_from_matrix(a, b, c, d),
        width,
        height,
    })
}

fn parse_mdhd(payload: &[u8]) -> Result<(u32, u64)> {
    let mut r = Reader::new(payload);
    let version = r.u8()?;
    r.skip(3)?;
    if version == 1 {
        r.skip(16)?;
        Ok((r.u32()?, r.u64()?))
    } else {
        r.skip(8)?;
        Ok((r.u32()?, u64::from(r.u32()?)))
    }
}

fn parse_trak(trak: &[u8], movie_timescale: u32) -> Result<TrackInfo> {
    let header = parse_tkhd(require_box(trak, b"tkhd")?)?;
    let mdia = require_box(trak, b"mdia")?;
    let (timescale, duration) = parse_mdhd(require_box(mdia, b"mdhd")?)?;
    if timescale == 0 {
        return Err(CompressError::Container("track timescale is zero".into()));
    }

    let mut hdlr = Reader::new(require_box(mdia, b"hdlr")?);
    hdlr.skip(8)?;
    let mut handler = [0u8; 4];
    handler.copy_from_slice(hdlr.bytes(4)?);

    let stbl = require_box(require_box(mdia, b"minf")?, b"stbl")?;
    let (mut format, nal_length_size) = parse_stsd(require_box(stbl, b"stsd")?, &handler)?;
    format.duration_us = Some(ticks_to(duration, timescale, 1_000_000));
    if format.mime.starts_with("video/") {
        format.rotation_degrees = Some(header.rotation);
    }

    let mut samples = parse_sample_table(stbl, timescale)?;
    let offset_us = edit_offset_us(trak, movie_timescale, timescale)?;
    if offset_us != 0 {
        debug!("Track {} edit list shifts by {} us", header.track_id, offset_us);
        for sample in &mut samples {
            sample.decode_time_us += offset_us;
            sample.presentation_time_us += offset_us;
        }
    }
    Ok(TrackInfo {
        track_id: header.track_id,
        format,
        rotation: header.rotation,
        display_size: (header.width > 0 && header.height > 0)
            .then_some((header.width, header.height)),
        nal_length_size,
        samples,
    })
}

fn parse_stsd(stsd: &[u8], handler: &[u8; 4]) -> Result<(MediaFormat, Option<u8>)> {
    let mut r = Reader::new(stsd);
    r.skip(8)?;
    let (kind, entry) = BoxIter::new(r.rest())
        .next()
        .ok_or_else(|| CompressError::Container("empty stsd".into()))??;

    match &kind {
        b"avc1" | b"avc3" => {
            let (width, height, children) = visual_entry(entry)?;
            let config = AvcDecoderConfig::parse(require_box(children, b"avcC")?)?;
            let mut format = MediaFormat::video(MIME_VIDEO_AVC, width, height);
            if let Some(sps) = config.sps.first() {
                format = format.with_csd(with_start_code(sps));
            }
            if let Some(pps) = config.pps.first() {
                format = format.with_csd(with_start_code(pps));
            }
            Ok((format, Some(config.length_size)))
        }
        b"hvc1" | b"hev1" => {
            let (width, height, _) = visual_entry(entry)?;
            Ok((MediaFormat::video(MIME_VIDEO_HEVC, width, height), None))
        }
        b"mp4a" => {
            let (mut sample_rate, mut channels, children) = audio_entry(entry)?;
            let mut format = MediaFormat::new(MIME_AUDIO_AAC);
            if let Some(esds) = find_box(children, b"esds")? {
                if let Some(asc) = decoder_specific_info(esds)? {
                    match parse_audio_specific_config(asc) {
                        Ok(config) => {
                            sample_rate = config.sample_rate;
                            if config.channel_configuration > 0 {
                                channels = u32::from(config.channel_configuration);
                            }
                        }
                        Err(e) => debug!("Keeping mp4a entry fields, bad esds config: {}", e),
                    }
                    format = format.with_csd(Bytes::copy_from_slice(asc));
                }
            }
            format.sample_rate = Some(sample_rate);
            format.channel_count = Some(channels);
            Ok((format, None))
        }
        other => {
            let fourcc = String::from_utf8_lossy(other).trim().to_string();
            let mime = match handler {
                b"vide" => format!("video/x-{}", fourcc),
                b"soun" => format!("audio/x-{}", fourcc),
                _ => format!("application/x-{}", fourcc),
            };
            Ok((MediaFormat::new(mime), None))
        }
    }
}

fn visual_entry(entry: &[u8]) -> Result<(u32, u32, &[u8])> {
    let mut r = Reader::new(entry);
    r.skip(24)?;
    let width = u32::from(r.u16()?);
    let height = u32::from(r.u16()?);
    r.skip(50)?;
    Ok((width, height, r.rest()))
}

fn audio_entry(entry: &[u8]) -> Result<(u32, u32, &[u8])> {
    let mut r = Reader::new(entry);
    r.skip(8)?;
    let version = r.u16()?;
    r.skip(6)?;
    let channels = u32::from(r.u16()?);
    r.skip(6)?;
    let sample_rate = r.u32()? >> 16;
    match version {
        1 => r.skip(16)?,
        2 => r.skip(36)?,
        _ => {}
    }
    Ok((sample_rate, channels, r.rest()))
}

/// Walks the `esds` descriptors down to DecoderSpecificInfo.
fn decoder_specific_info(esds: &[u8]) -> Result<Option<&[u8]>> {
    let mut r = Reader::new(esds);
    r.skip(4)?;

    while r.position() < esds.len() {
        let tag = r.u8()?;
        let len = descriptor_len(&mut r)?;
        match tag {
            0x03 => {
                r.skip(2)?;
                let flags = r.u8()?;
                if flags & 0x80 != 0 {
                    r.skip(2)?;
                }
                if flags & 0x40 != 0 {
                    let url_len = r.u8()? as usize;
                    r.skip(url_len)?;
                }
                if flags & 0x20 != 0 {
                    r.skip(2)?;
                }
            }
            0x04 => r.skip(13)?,
            0x05 => return Ok(Some(r.bytes(len)?)),
            _ => r.skip(len)?,
        }
    }
    Ok(None)
}

fn descriptor_len(r: &mut Reader<'_>) -> Result<usize> {
    let mut len = 0usize;
    for _ in 0..4 {
        let byte = r.u8()?;
        len = (len << 7) | (byte & 0x7F) as usize;
        if byte & 0x80 == 0 {
            break;
        }
    }
    Ok(len)
}

fn with_start_code(unit: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(unit.len() + 4);
    out.put_slice(&START_CODE);
    out.put_slice(unit);
    out.freeze()
}

fn ticks_to(ticks: u64, timescale: u32, units_per_second: i64) -> i64 {
    (i128::from(ticks) * i128::from(units_per_second) / i128::from(timescale)) as i64
}

fn run_table(payload: &[u8]) -> Result<Vec<(u32, u32)>> {
    let mut r = Reader::new(payload);
    r.skip(4)?;
    let count = r.u32()?;
    (0..count).map(|_| Ok((r.u32()?, r.u32()?))).collect()
}

fn parse_sample_table(stbl: &[u8], timescale: u32) -> Result<Vec<StoredSample>> {
    let sizes = {
        let mut r = Reader::new(require_box(stbl, b"stsz")?);
        r.skip(4)?;
        let uniform = r.u32()?;
        let count = r.u32()? as usize;
        if uniform != 0 {
            vec![uniform; count]
        } else {
            (0..count).map(|_| r.u32()).collect::<Result<Vec<_>>>()?
        }
    };
    let count = sizes.len();

    let mut decode_times = Vec::with_capacity(count);
    let mut ticks = 0u64;
    'runs: for (run, delta) in run_table(require_box(stbl, b"stts")?)? {
        for _ in 0..run {
            if decode_times.len() == count {
                break 'runs;
            }
            decode_times.push(ticks);
            ticks += u64::from(delta);
        }
    }
    if decode_times.len() < count {
        return Err(CompressError::Container(
            "stts covers fewer samples than stsz".into(),
        ));
    }

    let mut composition = vec![0i64; count];
    if let Some(ctts) = find_box(stbl, b"ctts")? {
        let mut index = 0;
        for (run, offset) in run_table(ctts)? {
            for _ in 0..run {
                if let Some(slot) = composition.get_mut(index) {
                    *slot = i64::from(offset as i32);
                }
                index += 1;
            }
        }
    }

    let sync = match find_box(stbl, b"stss")? {
        Some(stss) => {
            let mut flags = vec![false; count];
            let mut r = Reader::new(stss);
            r.skip(4)?;
            for _ in 0..r.u32()? {
                let number = r.u32()? as usize;
                if let Some(flag) = number.checked_sub(1).and_then(|i| flags.get_mut(i)) {
                    *flag = true;
                }
            }
            flags
        }
        None => vec![true; count],
    };

    let chunk_offsets: Vec<u64> = if let Some(stco) = find_box(stbl, b"stco")? {
        let mut r = Reader::new(stco);
        r.skip(4)?;
        (0..r.u32()?)
            .map(|_| r.u32().map(u64::from))
            .collect::<Result<_>>()?
    } else {
        let mut r = Reader::new(require_box(stbl, b"co64")?);
        r.skip(4)?;
        (0..r.u32()?).map(|_| r.u64()).collect::<Result<_>>()?
    };

    let stsc: Vec<(u32, u32)> = {
        let mut r = Reader::new(require_box(stbl, b"stsc")?);
        r.skip(4)?;
        (0..r.u32()?)
            .map(|_| {
                let first_chunk = r.u32()?;
                let per_chunk = r.u32()?;
                r.skip(4)?;
                Ok((first_chunk, per_chunk))
            })
            .collect::<Result<_>>()?
    };

    let mut offsets = Vec::with_capacity(count);
    for (chunk, chunk_offset) in chunk_offsets.iter().enumerate() {
        let chunk_number = chunk as u32 + 1;
        let per_chunk = stsc
            .iter()
            .rev()
            .find(|(first, _)| *first <= chunk_number)
            .map(|(_, n)| *n)
            .unwrap_or(0);
        let mut offset = *chunk_offset;
        for _ in 0..per_chunk {
            let Some(size) = sizes.get(offsets.len()) else {
                break;
            };
            offsets.push(offset);
            offset += u64::from(*size);
        }
    }
    if offsets.len() < count {
        return Err(CompressError::Container(
            "chunk table covers fewer samples than stsz".into(),
        ));
    }

    Ok((0..count)
        .map(|i| {
            let dts = decode_times[i] as i64;
            StoredSample {
                offset: offsets[i],
                size: sizes[i],
                decode_time_us: ticks_to(dts as u64, timescale, 1_000_000),
                presentation_time_us: ticks_to(
                    (dts + composition[i]).max(0) as u64,
                    timescale,
                    1_000_000,
                ),
                sync: sync[i],
            }
        })
        .collect())
}
