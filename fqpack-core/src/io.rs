// fqpack
// Copyright (c) 2019-2026 The fqpack Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Byte-level I/O capabilities shared by the container, block, and
//! arithmetic-coder layers.
//!
//! Rather than hard-wiring the codec to a file handle, the container and
//! block layers are generic over [`ByteSink`] and [`ByteSource`], two
//! narrow capabilities blanket-implemented for anything implementing
//! [`std::io::Write`] / [`std::io::Read`]. This lets the same encoder write
//! to a file, a `Vec<u8>`, or (per sub-stream, per block) an in-memory
//! scratch buffer, without the upper layers caring which.

use std::io;

/// A byte sink that must write all bytes it is given or fail fatally; the
/// container and block layers never tolerate a short write.
pub trait ByteSink {
    fn write_all_bytes(&mut self, buf: &[u8]) -> io::Result<()>;

    fn write_u8(&mut self, v: u8) -> io::Result<()> {
        self.write_all_bytes(&[v])
    }

    fn write_u32_be(&mut self, v: u32) -> io::Result<()> {
        self.write_all_bytes(&v.to_be_bytes())
    }

    fn write_u64_be(&mut self, v: u64) -> io::Result<()> {
        self.write_all_bytes(&v.to_be_bytes())
    }
}

impl<W: io::Write + ?Sized> ByteSink for W {
    fn write_all_bytes(&mut self, buf: &[u8]) -> io::Result<()> {
        self.write_all(buf)
    }
}

/// A byte source for the container/block framing.
///
/// A short read *inside* a declared field (`read_exact_bytes`) is fatal and
/// surfaces as [`std::io::ErrorKind::UnexpectedEof`]; a short read between
/// blocks (`read_some_bytes`, used only to probe for a clean end-of-stream)
/// is legal and simply returns fewer bytes than requested.
pub trait ByteSource {
    fn read_exact_bytes(&mut self, buf: &mut [u8]) -> io::Result<()>;

    fn read_some_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn read_u8(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact_bytes(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u32_be(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact_bytes(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    fn read_u64_be(&mut self) -> io::Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact_bytes(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }
}

impl<R: io::Read + ?Sized> ByteSource for R {
    fn read_exact_bytes(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.read_exact(buf)
    }

    fn read_some_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // `Read::read` is permitted to return a short read for reasons other
        // than end-of-stream; loop until either the buffer fills or a read
        // returns zero (the only unambiguous EOF signal).
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_all_bytes_round_trips_integers() {
        let mut buf: Vec<u8> = Vec::new();
        buf.write_u32_be(0xdead_beef).unwrap();
        buf.write_u64_be(0x0102_0304_0506_0708).unwrap();
        assert_eq!(&buf[0..4], &[0xde, 0xad, 0xbe, 0xef]);

        let mut cursor: &[u8] = &buf;
        assert_eq!(cursor.read_u32_be().unwrap(), 0xdead_beef);
        assert_eq!(cursor.read_u64_be().unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn read_some_bytes_reports_clean_eof() {
        let data = [1u8, 2, 3];
        let mut cursor: &[u8] = &data;
        let mut out = [0u8; 8];
        let n = cursor.read_some_bytes(&mut out).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&out[..3], &data);
    }

    #[test]
    fn read_exact_bytes_is_fatal_on_short_field() {
        let data = [1u8, 2];
        let mut cursor: &[u8] = &data;
        let mut out = [0u8; 4];
        assert!(cursor.read_exact_bytes(&mut out).is_err());
    }
}
