use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CompressError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NALUnitType {
    Unspecified,
    CodedSliceNonIDR,
    CodedSliceIDR,
    SEI,
    SPS,
    PPS,
    AccessUnitDelimiter,
    Other(u8),
}

impl From<u8> for NALUnitType {
    fn from(header: u8) -> Self {
        match header & 0x1F {
            0 => NALUnitType::Unspecified,
            1 => NALUnitType::CodedSliceNonIDR,
            5 => NALUnitType::CodedSliceIDR,
            6 => NALUnitType::SEI,
            7 => NALUnitType::SPS,
            8 => NALUnitType::PPS,
            9 => NALUnitType::AccessUnitDelimiter,
            other => NALUnitType::Other(other),
        }
    }
}

impl NALUnitType {
    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NALUnitType::SPS | NALUnitType::PPS)
    }
}

/// Contents of an `avcC` box (AVCDecoderConfigurationRecord).
#[derive(Debug, Clone, PartialEq)]
pub struct AvcDecoderConfig {
    pub profile_idc: u8,
    pub profile_compatibility: u8,
    pub level_idc: u8,
    /// Bytes used by each NAL length prefix in samples
    pub length_size: u8,
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
}

impl AvcDecoderConfig {
    /// Builds a record from bare (start-code free) parameter sets.
    pub fn from_parameter_sets(sps: Bytes, pps: Bytes) -> Result<Self> {
        if sps.len() < 4 || NALUnitType::from(sps[0]) != NALUnitType::SPS {
            return Err(CompressError::InvalidData("malformed SPS".into()));
        }
        if pps.is_empty() || NALUnitType::from(pps[0]) != NALUnitType::PPS {
            return Err(CompressError::InvalidData("malformed PPS".into()));
        }
        Ok(Self {
            profile_idc: sps[1],
            profile_compatibility: sps[2],
            level_idc: sps[3],
            length_size: 4,
            sps: vec![sps],
            pps: vec![pps],
        })
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let truncated = || CompressError::InvalidData("truncated avcC".into());
        if data.len() < 7 || data[0] != 1 {
            return Err(CompressError::InvalidData("unsupported avcC version".into()));
        }

        let mut config = Self {
            profile_idc: data[1],
            profile_compatibility: data[2],
            level_idc: data[3],
            length_size: (data[4] & 0x03) + 1,
            sps: Vec::new(),
            pps: Vec::new(),
        };

        let mut pos = 5;
        let sps_count = data[pos] & 0x1F;
        pos += 1;
        for _ in 0..sps_count {
            let (unit, next) = read_parameter_set(data, pos).ok_or_else(truncated)?;
            config.sps.push(unit);
            pos = next;
        }

        let pps_count = *data.get(pos).ok_or_else(truncated)?;
        pos += 1;
        for _ in 0..pps_count {
            let (unit, next) = read_parameter_set(data, pos).ok_or_else(truncated)?;
            config.pps.push(unit);
            pos = next;
        }

        Ok(config)
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u8(1);
        out.put_u8(self.profile_idc);
        out.put_u8(self.profile_compatibility);
        out.put_u8(self.level_idc);
        out.put_u8(0xFC | (self.length_size.saturating_sub(1) & 0x03));
        out.put_u8(0xE0 | (self.sps.len() as u8 & 0x1F));
        for sps in &self.sps {
            out.put_u16(sps.len() as u16);
            out.put_slice(sps);
        }
        out.put_u8(self.pps.len() as u8);
        for pps in &self.pps {
            out.put_u16(pps.len() as u16);
            out.put_slice(pps);
        }
        out.freeze()
    }
}

fn read_parameter_set(data: &[u8], pos: usize) -> Option<(Bytes, usize)> {
    let len = u16::from_be_bytes([*data.get(pos)?, *data.get(pos + 1)?]) as usize;
    let start = pos + 2;
    let unit = data.get(start..start + len)?;
    Some((Bytes::copy_from_slice(unit), start + len))
}
