//! Bounds-checked extraction of fixed-width fields from a borrowed buffer.
//!
//! Every read either returns the value and advances, or returns
//! [`OutOfRange`] and leaves the position untouched. Values are assembled
//! with `from_le_bytes` / `from_be_bytes`, so results do not depend on host
//! endianness.

use thiserror::Error;

/// A read ran past the end of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("read of {wanted} bytes at offset {offset} exceeds buffer of {len} bytes")]
pub struct OutOfRange {
    pub offset: usize,
    pub wanted: usize,
    pub len: usize,
}

pub type CursorResult<T> = Result<T, OutOfRange>;

#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Borrow the next `count` bytes and advance past them.
    pub fn take(&mut self, count: usize) -> CursorResult<&'a [u8]> {
        let end = self.pos.checked_add(count).ok_or(self.out_of_range(count))?;
        let bytes = self.buf.get(self.pos..end).ok_or(self.out_of_range(count))?;
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> CursorResult<[u8; N]> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn skip(&mut self, count: usize) -> CursorResult<()> {
        self.take(count).map(|_| ())
    }

    pub fn peek_u8(&self) -> CursorResult<u8> {
        self.buf.get(self.pos).copied().ok_or(self.out_of_range(1))
    }

    pub fn read_u8(&mut self) -> CursorResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub fn read_u16_le(&mut self) -> CursorResult<u16> {
        self.array().map(u16::from_le_bytes)
    }

    pub fn read_u16_be(&mut self) -> CursorResult<u16> {
        self.array().map(u16::from_be_bytes)
    }

    pub fn read_i16_le(&mut self) -> CursorResult<i16> {
        self.array().map(i16::from_le_bytes)
    }

    pub fn read_u32_le(&mut self) -> CursorResult<u32> {
        self.array().map(u32::from_le_bytes)
    }

    pub fn read_i32_le(&mut self) -> CursorResult<i32> {
        self.array().map(i32::from_le_bytes)
    }

    pub fn read_u32_be(&mut self) -> CursorResult<u32> {
        self.array().map(u32::from_be_bytes)
    }

    pub fn read_i32_be(&mut self) -> CursorResult<i32> {
        self.array().map(i32::from_be_bytes)
    }

    pub fn read_f32_le(&mut self) -> CursorResult<f32> {
        self.array().map(f32::from_le_bytes)
    }

    pub fn read_f64_be(&mut self) -> CursorResult<f64> {
        self.array().map(f64::from_be_bytes)
    }

    /// Three consecutive little-endian `f32`s widened to `f64`.
    pub fn read_f32x3_le(&mut self) -> CursorResult<[f64; 3]> {
        let mut ahead = *self;
        let out = [
            f64::from(ahead.read_f32_le()?),
            f64::from(ahead.read_f32_le()?),
            f64::from(ahead.read_f32_le()?),
        ];
        *self = ahead;
        Ok(out)
    }

    fn out_of_range(&self, wanted: usize) -> OutOfRange {
        OutOfRange {
            offset: self.pos,
            wanted,
            len: self.buf.len(),
        }
    }
}

/// Appends fixed-width fields to a byte vector. Used by the encoders.
#[derive(Debug, Default)]
pub struct ReportWriter {
    buffer: Vec<u8>,
}

impl ReportWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buffer.push(value);
        self
    }

    pub fn write_u16_be(&mut self, value: u16) -> &mut Self {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_i16_le(&mut self, value: i16) -> &mut Self {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u32_le(&mut self, value: u32) -> &mut Self {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i32_le(&mut self, value: i32) -> &mut Self {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u32_be(&mut self, value: u32) -> &mut Self {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_i32_be(&mut self, value: i32) -> &mut Self {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_f32_le(&mut self, value: f32) -> &mut Self {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_f64_be(&mut self, value: f64) -> &mut Self {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(data);
        self
    }

    /// Zero-fill up to the next multiple of `align`.
    pub fn pad_to(&mut self, align: usize) -> &mut Self {
        if align > 1 {
            while self.buffer.len() % align != 0 {
                self.buffer.push(0);
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}
