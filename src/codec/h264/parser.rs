use bytes::{BufMut, BytesMut};

use super::types::NALUnitType;
use crate::error::{CompressError, Result};

const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// True when `data` opens with a 3- or 4-byte start code.
pub fn is_annex_b(data: &[u8]) -> bool {
    data.starts_with(&[0, 0, 1]) || data.starts_with(&START_CODE)
}

/// Splits an Annex-B byte stream into NAL units without start codes.
pub fn split_annex_b(data: &[u8]) -> Vec<&[u8]> {
    let mut units = Vec::new();
    let Some((first, len)) = find_start_code(data, 0) else {
        return units;
    };

    let mut start = first + len;
    loop {
        let (end, next) = match find_start_code(data, start) {
            Some((pos, len)) => (pos, Some(pos + len)),
            None => (data.len(), None),
        };
        let unit = trim_trailing_zeros(&data[start..end]);
        if !unit.is_empty() {
            units.push(unit);
        }
        match next {
            Some(next) => start = next,
            None => break,
        }
    }
    units
}

/// Drops a leading start code, if any.
pub fn strip_start_code(data: &[u8]) -> &[u8] {
    if data.starts_with(&START_CODE) {
        &data[4..]
    } else if data.starts_with(&[0, 0, 1]) {
        &data[3..]
    } else {
        data
    }
}

/// Rewrites an Annex-B access unit with 4-byte big-endian length prefixes.
pub fn annex_b_to_avcc(data: &[u8], out: &mut BytesMut) {
    for unit in split_annex_b(data) {
        out.put_u32(unit.len() as u32);
        out.put_slice(unit);
    }
}

/// Rewrites a length-prefixed access unit in Annex-B form.
pub fn avcc_to_annex_b(data: &[u8], length_size: u8, out: &mut BytesMut) -> Result<()> {
    let length_size = length_size as usize;
    if !(1..=4).contains(&length_size) {
        return Err(CompressError::InvalidData(format!(
            "invalid NAL length size {}",
            length_size
        )));
    }

    let mut pos = 0;
    while pos < data.len() {
        let prefix = data.get(pos..pos + length_size).ok_or_else(|| {
            CompressError::InvalidData("truncated NAL length prefix".into())
        })?;
        let len = prefix.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
        pos += length_size;
        let unit = data
            .get(pos..pos + len)
            .ok_or_else(|| CompressError::InvalidData("NAL unit overruns sample".into()))?;
        out.put_slice(&START_CODE);
        out.put_slice(unit);
        pos += len;
    }
    Ok(())
}

/// True when an Annex-B access unit carries an IDR slice.
pub fn contains_idr(data: &[u8]) -> bool {
    split_annex_b(data)
        .iter()
        .any(|unit| NALUnitType::from(unit[0]) == NALUnitType::CodedSliceIDR)
}

fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            if i > from && data[i - 1] == 0 {
                return Some((i - 1, 4));
            }
            return Some((i, 3));
        }
        i += 1;
    }
    None
}

fn trim_trailing_zeros(mut unit: &[u8]) -> &[u8] {
    while let [rest @ .., 0] = unit {
        unit = rest;
    }
    unit
}
