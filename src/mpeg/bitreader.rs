//! MSB-first bit reader for MPEG-1/2 headers
//!
//! MPEG-1/2 headers carry no emulation prevention bytes, so the reader works
//! directly on the payload that follows a start code.

use crate::error::BitstreamError;

pub struct BitReader<'a> {
    data: &'a [u8],
    /// Bit position from the start of `data`
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    pub fn bits_read(&self) -> usize {
        self.bit_pos
    }

    pub fn bits_left(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.bit_pos)
    }

    /// Read `n` bits (at most 32), most significant first.
    pub fn read_bits(&mut self, n: u32) -> Result<u32, BitstreamError> {
        debug_assert!(n <= 32);
        self.ensure(n as usize)?;

        let mut value: u32 = 0;
        let mut remaining = n;
        while remaining > 0 {
            let byte = self.data[self.bit_pos / 8];
            let offset = (self.bit_pos % 8) as u32;
            let available = 8 - offset;
            let take = remaining.min(available);

            let bits = (byte >> (available - take)) & ((1u16 << take) - 1) as u8;
            value = (value << take) | u32::from(bits);

            self.bit_pos += take as usize;
            remaining -= take;
        }

        Ok(value)
    }

    pub fn read_flag(&mut self) -> Result<bool, BitstreamError> {
        Ok(self.read_bits(1)? == 1)
    }

    pub fn skip_bits(&mut self, n: usize) -> Result<(), BitstreamError> {
        self.ensure(n)?;
        self.bit_pos += n;
        Ok(())
    }

    /// Advance to the next byte boundary.
    pub fn byte_align(&mut self) {
        self.bit_pos = (self.bit_pos + 7) & !7;
    }

    fn ensure(&self, needed: usize) -> Result<(), BitstreamError> {
        let available = self.bits_left();
        if needed > available {
            return Err(BitstreamError::Truncated { needed, available });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bits_across_bytes() {
        let data = [0b1011_0001, 0b0101_0101, 0xFF];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(4).unwrap(), 0b1011);
        assert_eq!(br.read_bits(6).unwrap(), 0b0001_01);
        assert_eq!(br.read_bits(6).unwrap(), 0b01_0101);
        assert_eq!(br.bits_read(), 16);
        assert!(br.read_flag().unwrap());
        assert_eq!(br.bits_left(), 7);
    }

    #[test]
    fn test_read_32_bits() {
        let data = [0x12, 0x34, 0x56, 0x78];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(32).unwrap(), 0x1234_5678);
        assert_eq!(br.bits_left(), 0);
    }

    #[test]
    fn test_truncation_is_reported_not_panicking() {
        let data = [0xAB];
        let mut br = BitReader::new(&data);
        br.skip_bits(3).unwrap();
        assert_eq!(
            br.read_bits(10),
            Err(BitstreamError::Truncated {
                needed: 10,
                available: 5
            })
        );
        // A failed read does not move the cursor.
        assert_eq!(br.bits_read(), 3);
    }

    #[test]
    fn test_byte_align() {
        let data = [0x00, 0x80];
        let mut br = BitReader::new(&data);
        br.read_bits(3).unwrap();
        br.byte_align();
        assert_eq!(br.bits_read(), 8);
        br.byte_align();
        assert_eq!(br.bits_read(), 8);
        assert!(br.read_flag().unwrap());
    }
}
