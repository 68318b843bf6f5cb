//! Bounds-checked big-endian reader over a byte slice.

use crate::domain::Protocol;
use crate::error::DecodeError;

pub(crate) struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    layer: Protocol,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8], layer: Protocol) -> Self {
        Self { data, pos: 0, layer }
    }

    pub fn at(data: &'a [u8], pos: usize, layer: Protocol) -> Self {
        Self { data, pos, layer }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn truncated(&self, needed: usize) -> DecodeError {
        DecodeError::Truncated {
            layer: self.layer,
            expected: self.pos + needed,
            actual: self.data.len(),
        }
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(self.truncated(n));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        self.take(n).map(|_| ())
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u24(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}
