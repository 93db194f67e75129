//! Big-endian read and write cursors over borrowed byte buffers.
//!
//! # Alignment
//! Both cursors share one alignment rule: `align(n)` always moves forward by
//! `n - pos % n` bytes, so a position already on a boundary still advances a
//! full `n`.  Bundles in the wild were produced by tools with this rule and
//! the size arithmetic in `bundle::writer` depends on it, so it is not
//! "fixed" here.

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

/// Default alignment boundary used throughout the bundle layout.
pub const DEFAULT_ALIGNMENT: usize = 16;
/// Safety cap for NUL-terminated strings read without an explicit limit.
pub const MAX_STRING_LENGTH: usize = 32767;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    #[error("unexpected end of data: needed {needed} byte(s) at offset {position}, buffer holds {len}")]
    UnexpectedEndOfData { position: usize, needed: usize, len: usize },
    #[error("buffer overflow: writing {needed} byte(s) at offset {position} exceeds capacity {capacity}")]
    BufferOverflow { position: usize, needed: usize, capacity: usize },
    #[error("string at offset {position} is not valid UTF-8")]
    InvalidString { position: usize },
}

/// Number of bytes `align(alignment)` moves from `position`. Always in `1..=alignment`.
#[inline]
pub fn padding_for(position: usize, alignment: usize) -> usize {
    alignment - position % alignment
}

// ── Reader ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data:     &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize { self.position }

    /// Move the cursor. Out-of-range positions are allowed; the next read fails.
    #[inline]
    pub fn set_position(&mut self, position: usize) { self.position = position; }

    #[inline]
    pub fn len(&self) -> usize { self.data.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    #[inline]
    pub fn remaining(&self) -> usize { self.data.len().saturating_sub(self.position) }

    /// The whole underlying buffer, independent of the cursor position.
    #[inline]
    pub fn data(&self) -> &'a [u8] { self.data }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], CursorError> {
        let end = self
            .position
            .checked_add(count)
            .filter(|&end| end <= self.data.len())
            .ok_or(CursorError::UnexpectedEndOfData {
                position: self.position,
                needed:   count,
                len:      self.data.len(),
            })?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, CursorError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, CursorError> {
        Ok(BigEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_i16(&mut self) -> Result<i16, CursorError> {
        Ok(BigEndian::read_i16(self.read_bytes(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CursorError> {
        Ok(BigEndian::read_u32(self.read_bytes(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CursorError> {
        Ok(BigEndian::read_u64(self.read_bytes(8)?))
    }

    /// Read the raw bytes of a NUL-terminated string of at most `max_length`
    /// bytes, without the terminator.
    ///
    /// Reaching `max_length` without a terminator ends the string there; the
    /// cap only bounds the scan. Running off the buffer fails.
    pub fn read_cstring_bytes(&mut self, max_length: usize) -> Result<Vec<u8>, CursorError> {
        let mut bytes = Vec::new();
        for _ in 0..max_length {
            let b = self.read_u8()?;
            if b == 0 {
                break;
            }
            bytes.push(b);
        }
        Ok(bytes)
    }

    /// Like [`ByteReader::read_cstring_bytes`], but the bytes must be UTF-8.
    pub fn read_string(&mut self, max_length: usize) -> Result<String, CursorError> {
        let start = self.position;
        let bytes = self.read_cstring_bytes(max_length)?;
        String::from_utf8(bytes).map_err(|_| CursorError::InvalidString { position: start })
    }

    /// NUL-terminated byte string, taken as is.
    pub fn read_cstring(&mut self) -> Result<Vec<u8>, CursorError> {
        self.read_cstring_bytes(MAX_STRING_LENGTH)
    }

    pub fn align(&mut self, alignment: usize) {
        self.position += padding_for(self.position, alignment);
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// Writer over a fixed-capacity buffer. It never grows the buffer: the
/// caller sizes it up front and an overrun is reported as `BufferOverflow`.
#[derive(Debug)]
pub struct ByteWriter<'a> {
    data:     &'a mut [u8],
    position: usize,
}

impl<'a> ByteWriter<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data, position: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize { self.position }

    #[inline]
    pub fn capacity(&self) -> usize { self.data.len() }

    fn slot(&mut self, count: usize) -> Result<&mut [u8], CursorError> {
        let end = self
            .position
            .checked_add(count)
            .filter(|&end| end <= self.data.len())
            .ok_or(CursorError::BufferOverflow {
                position: self.position,
                needed:   count,
                capacity: self.data.len(),
            })?;
        let start = self.position;
        self.position = end;
        Ok(&mut self.data[start..end])
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), CursorError> {
        self.slot(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), CursorError> {
        self.slot(1)?[0] = value;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), CursorError> {
        BigEndian::write_u16(self.slot(2)?, value);
        Ok(())
    }

    pub fn write_i16(&mut self, value: i16) -> Result<(), CursorError> {
        BigEndian::write_i16(self.slot(2)?, value);
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), CursorError> {
        BigEndian::write_u32(self.slot(4)?, value);
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), CursorError> {
        BigEndian::write_u64(self.slot(8)?, value);
        Ok(())
    }

    pub fn write_cstring<S: AsRef<[u8]> + ?Sized>(&mut self, value: &S) -> Result<(), CursorError> {
        self.write_bytes(value.as_ref())?;
        self.write_u8(0)
    }

    /// Pad with zero bytes using the same rule as [`ByteReader::align`].
    pub fn align(&mut self, alignment: usize) -> Result<(), CursorError> {
        let padding = padding_for(self.position, alignment);
        self.slot(padding)?.fill(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn reads_are_big_endian() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0, 0x01, 0x02, 0xff, 0xfe];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u64().unwrap(), 0x1234_5678_9abc_def0);
        assert_eq!(r.read_u16().unwrap(), 0x0102);
        assert_eq!(r.read_i16().unwrap(), -2);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn read_past_end_fails_without_moving() {
        let data = [0u8; 3];
        let mut r = ByteReader::new(&data);
        let err = r.read_u32().unwrap_err();
        assert_eq!(err, CursorError::UnexpectedEndOfData { position: 0, needed: 4, len: 3 });
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn string_requires_terminator_before_end() {
        let mut r = ByteReader::new(b"UnityFS\0rest");
        assert_eq!(r.read_cstring().unwrap(), b"UnityFS");
        assert_eq!(r.position(), 8);
        assert!(matches!(
            r.read_cstring(),
            Err(CursorError::UnexpectedEndOfData { .. })
        ));
    }

    #[test]
    fn cstring_keeps_non_utf8_bytes() {
        let mut r = ByteReader::new(b"CAB-\xb2\xe2\xca\xd4\0");
        assert_eq!(r.read_cstring().unwrap(), b"CAB-\xb2\xe2\xca\xd4");
        r.set_position(0);
        assert_eq!(r.read_string(32), Err(CursorError::InvalidString { position: 0 }));
    }

    #[test]
    fn string_cap_stops_scan() {
        let mut r = ByteReader::new(b"abcdef\0");
        assert_eq!(r.read_string(4).unwrap(), "abcd");
        assert_eq!(r.position(), 4);
    }

    #[test]
    fn aligned_position_advances_full_boundary() {
        let data = [0u8; 64];
        let mut r = ByteReader::new(&data);
        r.set_position(16);
        r.align(DEFAULT_ALIGNMENT);
        assert_eq!(r.position(), 32);
        r.set_position(17);
        r.align(DEFAULT_ALIGNMENT);
        assert_eq!(r.position(), 32);
    }

    #[test]
    fn writer_pads_with_zeros_and_reports_overflow() {
        let mut buf = [0xAAu8; 20];
        let mut w = ByteWriter::new(&mut buf);
        w.write_u32(0xDEAD_BEEF).unwrap();
        w.align(16).unwrap();
        assert_eq!(w.position(), 16);
        let err = w.write_u64(1).unwrap_err();
        assert!(matches!(err, CursorError::BufferOverflow { position: 16, needed: 8, capacity: 20 }));
        assert_eq!(&buf[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(buf[4..16].iter().all(|&b| b == 0));
    }

    #[test]
    fn writer_string_is_nul_terminated() {
        let mut buf = [0xFFu8; 8];
        let mut w = ByteWriter::new(&mut buf);
        w.write_cstring("5.x.x").unwrap();
        assert_eq!(w.position(), 6);
        assert_eq!(&buf[..6], b"5.x.x\0");
    }

    proptest! {
        #[test]
        fn align_lands_on_boundary(pos in 0usize..100_000) {
            let pad = padding_for(pos, DEFAULT_ALIGNMENT);
            prop_assert!((1..=DEFAULT_ALIGNMENT).contains(&pad));
            prop_assert_eq!((pos + pad) % DEFAULT_ALIGNMENT, 0);
        }

        #[test]
        fn reader_and_writer_agree_on_alignment(prefix in 0usize..64) {
            let mut buf = vec![0u8; 128];
            let written = {
                let mut w = ByteWriter::new(&mut buf);
                w.write_bytes(&vec![1u8; prefix]).unwrap();
                w.align(DEFAULT_ALIGNMENT).unwrap();
                w.position()
            };
            let mut r = ByteReader::new(&buf);
            r.read_bytes(prefix).unwrap();
            r.align(DEFAULT_ALIGNMENT);
            prop_assert_eq!(r.position(), written);
        }
    }
}
