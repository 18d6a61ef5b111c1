// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `io` module implements byte-level I/O over in-memory bitstreams.
//!
//! All readers operating on bytes of data at a time implement the [`ReadBytes`] trait. IAMF
//! bitstreams are big-endian, and sizes and identifiers are coded as unsigned LEB128 integers
//! which may be read with [`ReadBytes::read_leb128`].

use std::io;

mod buf_reader;

pub use buf_reader::BufReader;

/// The maximum number of bytes in a LEB128 coded integer.
pub const MAX_LEB128_LEN: usize = 8;

/// `ReadBytes` reads bytes and interprets them as big-endian integers or LEB128 values.
pub trait ReadBytes {
    /// Reads a single byte.
    fn read_byte(&mut self) -> io::Result<u8>;

    /// Reads two bytes in read-order.
    fn read_double_bytes(&mut self) -> io::Result<[u8; 2]>;

    /// Reads three bytes in read-order.
    fn read_triple_bytes(&mut self) -> io::Result<[u8; 3]>;

    /// Reads four bytes in read-order.
    fn read_quad_bytes(&mut self) -> io::Result<[u8; 4]>;

    /// Fills `buf` or returns an error if not enough bytes remain.
    fn read_buf_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Skips `count` bytes.
    fn ignore_bytes(&mut self, count: u64) -> io::Result<()>;

    #[inline(always)]
    fn read_u8(&mut self) -> io::Result<u8> {
        self.read_byte()
    }

    #[inline(always)]
    fn read_be_u16(&mut self) -> io::Result<u16> {
        Ok(u16::from_be_bytes(self.read_double_bytes()?))
    }

    #[inline(always)]
    fn read_be_i16(&mut self) -> io::Result<i16> {
        Ok(i16::from_be_bytes(self.read_double_bytes()?))
    }

    #[inline(always)]
    fn read_be_u24(&mut self) -> io::Result<u32> {
        let [a, b, c] = self.read_triple_bytes()?;
        Ok(u32::from_be_bytes([0, a, b, c]))
    }

    #[inline(always)]
    fn read_be_u32(&mut self) -> io::Result<u32> {
        Ok(u32::from_be_bytes(self.read_quad_bytes()?))
    }

    /// Reads an unsigned LEB128 coded integer of at most [`MAX_LEB128_LEN`] bytes.
    ///
    /// A value that is not terminated within the maximum length is an error.
    fn read_leb128(&mut self) -> io::Result<u64> {
        let mut value = 0u64;

        for i in 0..MAX_LEB128_LEN {
            let byte = self.read_byte()?;
            // At most 8 bytes of 7 bits each are read, so the value always fits in 56 bits.
            value |= u64::from(byte & 0x7f) << (7 * i);

            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }

        Err(io::Error::new(io::ErrorKind::InvalidData, "leb128 too long"))
    }
}

impl<R: ReadBytes> ReadBytes for &mut R {
    #[inline(always)]
    fn read_byte(&mut self) -> io::Result<u8> {
        (*self).read_byte()
    }

    #[inline(always)]
    fn read_double_bytes(&mut self) -> io::Result<[u8; 2]> {
        (*self).read_double_bytes()
    }

    #[inline(always)]
    fn read_triple_bytes(&mut self) -> io::Result<[u8; 3]> {
        (*self).read_triple_bytes()
    }

    #[inline(always)]
    fn read_quad_bytes(&mut self) -> io::Result<[u8; 4]> {
        (*self).read_quad_bytes()
    }

    #[inline(always)]
    fn read_buf_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        (*self).read_buf_exact(buf)
    }

    #[inline(always)]
    fn ignore_bytes(&mut self, count: u64) -> io::Result<()> {
        (*self).ignore_bytes(count)
    }
}

/// A stream over a buffer of known length.
pub trait FiniteStream {
    /// Returns the number of bytes that have been read.
    fn bytes_read(&self) -> u64;

    /// Returns the number of bytes available for reading.
    fn bytes_available(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::{BufReader, FiniteStream, ReadBytes};

    #[test]
    fn verify_read_leb128() {
        assert_eq!(BufReader::new(&[0x00]).read_leb128().unwrap(), 0);
        assert_eq!(BufReader::new(&[0x7f]).read_leb128().unwrap(), 127);
        assert_eq!(BufReader::new(&[0x80, 0x01]).read_leb128().unwrap(), 128);
        assert_eq!(BufReader::new(&[0xe5, 0x8e, 0x26]).read_leb128().unwrap(), 624485);
        // Redundant padding bytes are permitted.
        assert_eq!(BufReader::new(&[0x81, 0x80, 0x80, 0x00]).read_leb128().unwrap(), 1);
    }

    #[test]
    fn verify_read_leb128_limits() {
        // Unterminated after 8 bytes.
        let long = [0x80u8; 9];
        assert!(BufReader::new(&long).read_leb128().is_err());
        // Truncated.
        assert!(BufReader::new(&[0x80]).read_leb128().is_err());
    }

    #[test]
    fn verify_read_be() {
        let mut reader = BufReader::new(&[0x12, 0x34, 0xff, 0xfe, 0x00, 0x00, 0xbb, 0x80]);
        assert_eq!(reader.read_be_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_be_i16().unwrap(), -2);
        assert_eq!(reader.read_be_u32().unwrap(), 48000);
    }

    #[test]
    fn verify_underrun() {
        let mut reader = BufReader::new(&[0x01, 0x02, 0x03, 0x04, 0x05]);
        assert_eq!(reader.read_be_u24().unwrap(), 0x010203);
        assert_eq!(reader.bytes_available(), 2);

        let mut buf = [0u8; 3];
        let err = reader.read_buf_exact(&mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);

        reader.ignore_bytes(2).unwrap();
        assert_eq!(reader.bytes_read(), 5);
        assert!(reader.ignore_bytes(1).is_err());
    }
}
