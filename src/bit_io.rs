//! Bit-level reader/writer used by the quantization table codec.
//!
//! The table codec only depends on [`BitRead`] and [`BitWrite`], so the entropy
//! layer of a full codec can plug its own reader/writer in. [`BitReader`] and
//! [`BitWriter`] are plain MSB-first implementations without byte stuffing.

use crate::error::{DequantError, Result};

pub trait BitRead {
    /// Reads `count` (at most 32) bits, most significant first.
    fn read_bits(&mut self, count: u8) -> Result<u32>;

    fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Reads an IEEE-754 single precision value.
    fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_bits(32)?))
    }
}

pub trait BitWrite {
    /// Writes the low `count` (at most 32) bits of `value`, most significant first.
    fn write_bits(&mut self, value: u32, count: u8);

    fn write_bool(&mut self, value: bool) {
        self.write_bits(value as u32, 1);
    }

    fn write_f32(&mut self, value: f32) {
        self.write_bits(value.to_bits(), 32);
    }
}

pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit_buffer: u8,
    bits_left: u8,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            bit_buffer: 0,
            bits_left: 0,
        }
    }

    pub fn read_bit(&mut self) -> Result<u8> {
        if self.bits_left == 0 {
            let Some(&b) = self.data.get(self.pos) else {
                return Err(DequantError::NeedMoreData);
            };
            self.pos += 1;
            self.bit_buffer = b;
            self.bits_left = 8;
        }

        let bit = (self.bit_buffer >> (self.bits_left - 1)) & 1;
        self.bits_left -= 1;
        Ok(bit)
    }

    pub fn has_data(&self) -> bool {
        self.pos < self.data.len() || self.bits_left > 0
    }

    /// Finishes reading. The unread bits of the current byte are zero padding
    /// written by [`BitWriter::zero_pad_to_byte`]; anything else means the
    /// section was shorter than what the writer produced.
    pub fn close(self) -> Result<()> {
        let mask = (1u16 << self.bits_left) - 1;
        if (self.bit_buffer as u16) & mask != 0 {
            return Err(DequantError::InvalidData);
        }
        Ok(())
    }
}

impl BitRead for BitReader<'_> {
    fn read_bits(&mut self, mut count: u8) -> Result<u32> {
        debug_assert!(count <= 32);
        let mut bits = 0u32;
        while count > 0 {
            let bit = self.read_bit()?;
            bits = (bits << 1) | (bit as u32);
            count -= 1;
        }
        Ok(bits)
    }
}

#[derive(Debug, Default)]
pub struct BitWriter {
    data: Vec<u8>,
    bit_buffer: u8,
    bits_count: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bit(&mut self, bit: u8) {
        self.bit_buffer = (self.bit_buffer << 1) | (bit & 1);
        self.bits_count += 1;
        if self.bits_count == 8 {
            self.flush_byte();
        }
    }

    fn flush_byte(&mut self) {
        self.data.push(self.bit_buffer);
        self.bit_buffer = 0;
        self.bits_count = 0;
    }

    /// Pads the pending byte with zero bits.
    pub fn zero_pad_to_byte(&mut self) {
        if self.bits_count > 0 {
            self.bit_buffer <<= 8 - self.bits_count;
            self.flush_byte();
        }
    }

    /// Total number of bits written, padding included.
    pub fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.bits_count as usize
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.zero_pad_to_byte();
        self.data
    }
}

impl BitWrite for BitWriter {
    fn write_bits(&mut self, value: u32, count: u8) {
        debug_assert!(count <= 32);
        for shift in (0..count).rev() {
            self.write_bit(((value >> shift) & 1) as u8);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_roundtrip() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b101, 3);
        writer.write_bool(true);
        writer.write_bits(0xDEAD_BEEF, 32);
        writer.write_f32(-0.15625);
        assert_eq!(writer.bits_written(), 3 + 1 + 32 + 32);
        let buffer = writer.finish();
        assert_eq!(buffer.len(), 9);

        let mut reader = BitReader::new(&buffer);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_bits(32).unwrap(), 0xDEAD_BEEF);
        assert_eq!(reader.read_f32().unwrap(), -0.15625);
        reader.close().unwrap();
    }

    #[test]
    fn test_read_past_end() {
        let buffer = [0xFFu8];
        let mut reader = BitReader::new(&buffer);
        assert_eq!(reader.read_bits(8).unwrap(), 0xFF);
        assert!(!reader.has_data());
        assert_eq!(reader.read_bit(), Err(DequantError::NeedMoreData));
    }

    #[test]
    fn test_close_rejects_unread_bits() {
        let buffer = [0b1010_0000u8];
        let mut reader = BitReader::new(&buffer);
        assert_eq!(reader.read_bits(1).unwrap(), 1);
        assert_eq!(reader.close(), Err(DequantError::InvalidData));
    }
}
