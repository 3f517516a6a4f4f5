// ABOUTME: Byte sources the decoder reads from: in-memory slices and any `std::io::Read`.
// ABOUTME: Sources do not track consumed positions; the decoder counts bytes itself.

#![allow(clippy::missing_errors_doc)]

use crate::error::{Error, Result};
use std::io::Read;

/// Largest single allocation made for a length-declared byte run before the
/// bytes are actually available.
const READ_CHUNK: usize = 8 * 1024;

/// An input stream of bytes with fixed-width little-endian reads.
pub trait ByteSource {
    /// Read a single byte.
    fn read_byte(&mut self) -> Result<u8>;

    /// Fill `buf` completely or fail with [`Error::TruncatedStream`].
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Read bytes into `buf` until a zero byte is found or `buf` is full.
    ///
    /// Returns the number of bytes stored and whether the terminator was found.
    /// The terminator is consumed but not stored. `found` is only false when
    /// the whole buffer was filled.
    fn read_until_nul(&mut self, buf: &mut [u8]) -> Result<(usize, bool)> {
        for i in 0..buf.len() {
            let b = self.read_byte()?;
            if b == 0 {
                return Ok((i, true));
            }
            buf[i] = b;
        }
        Ok((buf.len(), false))
    }

    /// Read exactly `len` bytes into a new vector.
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len.min(READ_CHUNK));
        let mut remaining = len;
        while remaining > 0 {
            let take = remaining.min(READ_CHUNK);
            let start = out.len();
            out.resize(start + take, 0);
            self.read_exact(&mut out[start..])?;
            remaining -= take;
        }
        Ok(out)
    }

    /// Read a fixed number of bytes into an array.
    #[inline]
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    #[inline]
    fn read_i32_le(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    #[inline]
    fn read_i64_le(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    #[inline]
    fn read_f64_le(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }
}

/// A byte source over an in-memory slice.
#[derive(Debug, Clone)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Get the current position in the input.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Get the remaining bytes.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Check if we've reached the end of input.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }
}

impl ByteSource for SliceSource<'_> {
    #[inline]
    fn read_byte(&mut self) -> Result<u8> {
        let Some(&b) = self.data.get(self.pos) else {
            return Err(Error::TruncatedStream);
        };
        self.pos += 1;
        Ok(b)
    }

    #[inline]
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            return Err(Error::TruncatedStream);
        }
        buf.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    fn read_until_nul(&mut self, buf: &mut [u8]) -> Result<(usize, bool)> {
        let rest = self.remaining();
        let window = &rest[..rest.len().min(buf.len())];
        match memchr::memchr(0, window) {
            Some(n) => {
                buf[..n].copy_from_slice(&window[..n]);
                self.pos += n + 1;
                Ok((n, true))
            }
            None if window.len() == buf.len() => {
                buf.copy_from_slice(window);
                self.pos += window.len();
                Ok((window.len(), false))
            }
            None => Err(Error::TruncatedStream),
        }
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        if len > self.data.len() - self.pos {
            return Err(Error::TruncatedStream);
        }
        let bytes = self.data[self.pos..self.pos + len].to_vec();
        self.pos += len;
        Ok(bytes)
    }
}

/// A byte source over any reader.
///
/// Reads are issued one field at a time, so wrap unbuffered readers in a
/// `std::io::BufReader`.
#[derive(Debug)]
pub struct ReaderSource<R> {
    inner: R,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Unwrap the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    #[inline]
    fn read_byte(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.inner.read_exact(&mut b)?;
        Ok(b[0])
    }

    #[inline]
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf)?;
        Ok(())
    }
}
