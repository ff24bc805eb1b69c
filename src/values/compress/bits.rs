//! MSB-first bit I/O backing the range coder. Grounded on the teacher's
//! `byteorder`-based reader/writer convention, extended one level down to
//! bit granularity since the compressed format (spec.md §4.6) packs
//! variable-length codes rather than fixed-width integers.

use std::io::{Read, Write};

use crate::error::Result;

pub struct BitWriter<W: Write> {
    inner: W,
    current: u8,
    filled: u8,
}

impl<W: Write> BitWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, current: 0, filled: 0 }
    }

    pub fn write_bit(&mut self, bit: bool) -> Result<()> {
        self.current = (self.current << 1) | u8::from(bit);
        self.filled += 1;
        if self.filled == 8 {
            self.inner.write_all(&[self.current])?;
            self.current = 0;
            self.filled = 0;
        }
        Ok(())
    }

    pub fn write_bits(&mut self, value: u32, len: u8) -> Result<()> {
        for i in (0..len).rev() {
            self.write_bit((value >> i) & 1 == 1)?;
        }
        Ok(())
    }

    /// pads the final partial byte with zero bits and flushes.
    pub fn finish(mut self) -> Result<W> {
        while self.filled != 0 {
            self.write_bit(false)?;
        }
        Ok(self.inner)
    }
}

pub struct BitReader<R: Read> {
    inner: R,
    current: u8,
    remaining: u8,
}

impl<R: Read> BitReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, current: 0, remaining: 0 }
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        if self.remaining == 0 {
            let mut byte = [0u8; 1];
            self.inner.read_exact(&mut byte)?;
            self.current = byte[0];
            self.remaining = 8;
        }
        self.remaining -= 1;
        Ok((self.current >> self.remaining) & 1 == 1)
    }

    pub fn read_bits(&mut self, len: u8) -> Result<u32> {
        let mut value = 0u32;
        for _ in 0..len {
            value = (value << 1) | u32::from(self.read_bit()?);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_round_trip_across_byte_boundaries() {
        let mut buf = Vec::new();
        {
            let mut w = BitWriter::new(&mut buf);
            w.write_bits(0b101, 3).unwrap();
            w.write_bits(0b11110000, 8).unwrap();
            w.write_bits(0b1, 1).unwrap();
            w.finish().unwrap();
        }
        let mut r = BitReader::new(&buf[..]);
        assert_eq!(r.read_bits(3).unwrap(), 0b101);
        assert_eq!(r.read_bits(8).unwrap(), 0b11110000);
        assert_eq!(r.read_bits(1).unwrap(), 0b1);
    }
}
