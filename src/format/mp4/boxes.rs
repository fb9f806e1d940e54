use bytes::{BufMut, BytesMut};

use crate::error::{CompressError, Result};

const FIXED_ONE: u32 = 0x0001_0000;
const FIXED_MINUS_ONE: u32 = 0xFFFF_0000;
const FIXED_W: u32 = 0x4000_0000;

/// Appends a box of type `kind`; `body` writes the payload.
pub(crate) fn write_box<F>(out: &mut BytesMut, kind: &[u8; 4], body: F)
where
    F: FnOnce(&mut BytesMut),
{
    let start = out.len();
    out.put_u32(0);
    out.put_slice(kind);
    body(out);
    let size = (out.len() - start) as u32;
    out[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

/// Appends a full box (version and flags precede the payload).
pub(crate) fn write_full_box<F>(out: &mut BytesMut, kind: &[u8; 4], version: u8, flags: u32, body: F)
where
    F: FnOnce(&mut BytesMut),
{
    write_box(out, kind, |out| {
        out.put_u32((u32::from(version) << 24) | (flags & 0x00FF_FFFF));
        body(out);
    });
}

/// Writes the 3x3 transformation matrix for a clockwise rotation.
pub(crate) fn put_rotation_matrix(out: &mut BytesMut, degrees: u32) {
    let (a, b, c, d) = match degrees {
        90 => (0, FIXED_ONE, FIXED_MINUS_ONE, 0),
        180 => (FIXED_MINUS_ONE, 0, 0, FIXED_MINUS_ONE),
        270 => (0, FIXED_MINUS_ONE, FIXED_ONE, 0),
        _ => (FIXED_ONE, 0, 0, FIXED_ONE),
    };
    for value in [a, b, 0, c, d, 0, 0, 0, FIXED_W] {
        out.put_u32(value);
    }
}

/// Clockwise rotation encoded by the matrix's `a b c d` entries.
pub(crate) fn rotation_from_matrix(a: u32, b: u32, c: u32, d: u32) -> u32 {
    match (a, b, c, d) {
        (0, FIXED_ONE, FIXED_MINUS_ONE, 0) => 90,
        (FIXED_MINUS_ONE, 0, 0, FIXED_MINUS_ONE) => 180,
        (0, FIXED_MINUS_ONE, FIXED_ONE, 0) => 270,
        _ => 0,
    }
}

/// Iterates over the boxes packed in `data`.
pub(crate) struct BoxIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BoxIter<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for BoxIter<'a> {
    type Item = Result<([u8; 4], &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.data.get(self.pos..)?;
        if rest.len() < 8 {
            return None;
        }

        let mut kind = [0u8; 4];
        kind.copy_from_slice(&rest[4..8]);
        let (header, size) = match u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) {
            0 => (8, rest.len() as u64),
            1 => match rest.get(8..16) {
                Some(large) => {
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(large);
                    (16, u64::from_be_bytes(buf))
                }
                None => return Some(Err(truncated(&kind))),
            },
            size => (8, u64::from(size)),
        };

        if size < header as u64 || size > rest.len() as u64 {
            self.pos = self.data.len();
            return Some(Err(truncated(&kind)));
        }
        let size = size as usize;
        self.pos += size;
        Some(Ok((kind, &rest[header..size])))
    }
}

/// Payload of the first child box of type `kind`.
pub(crate) fn find_box<'a>(data: &'a [u8], kind: &[u8; 4]) -> Result<Option<&'a [u8]>> {
    for entry in BoxIter::new(data) {
        let (found, payload) = entry?;
        if &found == kind {
            return Ok(Some(payload));
        }
    }
    Ok(None)
}

pub(crate) fn require_box<'a>(data: &'a [u8], kind: &[u8; 4]) -> Result<&'a [u8]> {
    find_box(data, kind)?.ok_or_else(|| {
        CompressError::Container(format!("missing {} box", String::from_utf8_lossy(kind)))
    })
}

fn truncated(kind: &[u8; 4]) -> CompressError {
    CompressError::Container(format!("truncated {} box", String::from_utf8_lossy(kind)))
}

/// Bounds-checked big-endian reader over a box payload.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let slice = self
            .pos
            .checked_add(n)
            .and_then(|end| self.data.get(self.pos..end))
            .ok_or_else(|| CompressError::Container("box payload too short".into()))?;
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<()> {
        self.bytes(n).map(|_| ())
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u24(&mut self) -> Result<u32> {
        let b = self.bytes(3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        let b = self.bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_be_bytes(buf))
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let rest = self.data.get(self.pos..).unwrap_or(&[]);
        self.pos = self.data.len();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_sizes_are_patched() {
        let mut out = BytesMut::new();
        write_box(&mut out, b"moov", |out| {
            write_full_box(out, b"mvhd", 0, 0, |out| out.put_u32(7));
        });

        assert_eq!(&out[..8], &[0, 0, 0, 24, b'm', b'o', b'o', b'v']);
        let moov = require_box(&out, b"moov").unwrap();
        let mvhd = require_box(moov, b"mvhd").unwrap();
        assert_eq!(mvhd, &[0, 0, 0, 0, 0, 0, 0, 7]);
        assert!(find_box(moov, b"trak").unwrap().is_none());
    }

    #[test]
    fn test_rotation_matrix_round_trip() {
        for degrees in [0, 90, 180, 270] {
            let mut out = BytesMut::new();
            put_rotation_matrix(&mut out, degrees);
            let mut reader = Reader::new(&out);
            let a = reader.u32().unwrap();
            let b = reader.u32().unwrap();
            reader.skip(4).unwrap();
            let c = reader.u32().unwrap();
            let d = reader.u32().unwrap();
            assert_eq!(rotation_from_matrix(a, b, c, d), degrees);
        }
    }

    #[test]
    fn test_oversized_box_is_an_error() {
        let data = [0, 0, 0, 64, b'f', b'r', b'e', b'e', 0, 0];
        let mut boxes = BoxIter::new(&data);
        assert!(matches!(boxes.next(), Some(Err(_))));
        assert!(boxes.next().is_none());
    }

    #[test]
    fn test_reader_bounds() {
        let mut reader = Reader::new(&[1, 2, 3]);
        assert_eq!(reader.u16().unwrap(), 0x0102);
        assert!(reader.u16().is_err());
        assert_eq!(reader.rest(), &[3]);
    }
}
