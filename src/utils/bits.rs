use crate::error::{CompressError, Result};

/// MSB-first bit reader over a byte slice.
///
/// ```
/// use vcompress::utils::BitReader;
///
/// let data = [0b1011_0011];
/// let mut reader = BitReader::new(&data);
///
/// assert_eq!(reader.read_bit().unwrap(), true);
/// assert_eq!(reader.read_bits(3).unwrap(), 0b011);
/// assert_eq!(reader.available_bits(), 4);
/// ```
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_offset: usize,
    bit_offset: u8,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            byte_offset: 0,
            bit_offset: 0,
        }
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        let byte = *self
            .data
            .get(self.byte_offset)
            .ok_or_else(|| CompressError::InvalidData("bitstream exhausted".into()))?;

        let bit = (byte >> (7 - self.bit_offset)) & 1;
        self.bit_offset += 1;
        if self.bit_offset == 8 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }
        Ok(bit == 1)
    }

    /// Reads `n` bits (at most 32) as a big-endian number.
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(CompressError::InvalidData(format!(
                "cannot read {} bits at once",
                n
            )));
        }
        if n as usize > self.available_bits() {
            return Err(CompressError::InvalidData("bitstream exhausted".into()));
        }

        let mut value = 0u64;
        for _ in 0..n {
            value = (value << 1) | u64::from(self.read_bit()?);
        }
        Ok(value as u32)
    }

    pub fn skip_bits(&mut self, n: usize) -> Result<()> {
        if n > self.available_bits() {
            return Err(CompressError::InvalidData("bitstream exhausted".into()));
        }
        let absolute = self.byte_offset * 8 + self.bit_offset as usize + n;
        self.byte_offset = absolute / 8;
        self.bit_offset = (absolute % 8) as u8;
        Ok(())
    }

    pub fn available_bits(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.byte_offset * 8 + self.bit_offset as usize)
    }
}
