// ABOUTME: Incremental UTF-8 string decoding through a fixed-size scratch buffer.
// ABOUTME: Multi-byte characters split across chunk boundaries are carried into the next chunk.

#![allow(clippy::missing_errors_doc)]

use crate::error::{Error, Result};
use crate::source::ByteSource;

/// Longest possible incomplete UTF-8 tail (a 4-byte sequence missing its last byte).
const MAX_CARRY: usize = 3;

/// Upper bound on the capacity reserved up front for a length-prefixed string.
const MAX_PREALLOC: usize = 64 * 1024;

/// Validate and convert bytes to a UTF-8 string.
/// Uses simdutf8 for SIMD-accelerated validation when the feature is enabled.
#[cfg(feature = "simd-utf8")]
#[inline]
fn validate_utf8(bytes: &[u8]) -> Result<&str> {
    simdutf8::basic::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
}

#[cfg(not(feature = "simd-utf8"))]
#[inline]
fn validate_utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
}

/// Sequence length announced by a lead byte, or `None` for a continuation byte.
///
/// ASCII counts as a 1-byte sequence. Bytes that can never start a valid
/// sequence (0xc0, 0xc1, 0xf5..) are classified by their high bits; validation
/// rejects them later.
#[inline]
const fn sequence_len(b: u8) -> Option<usize> {
    match b {
        0x00..=0x7f => Some(1),
        0x80..=0xbf => None,
        0xc0..=0xdf => Some(2),
        0xe0..=0xef => Some(3),
        _ => Some(4),
    }
}

/// Number of trailing bytes in `buf` that belong to an incomplete multi-byte
/// sequence and must be deferred to the next chunk.
pub(crate) fn incomplete_tail_len(buf: &[u8]) -> usize {
    let Some(&last) = buf.last() else {
        return 0;
    };
    match sequence_len(last) {
        Some(1) => 0,
        Some(_) => 1,
        None => {
            // Walk back over continuation bytes to the lead.
            let floor = buf.len().saturating_sub(MAX_CARRY + 1);
            for i in (floor..buf.len() - 1).rev() {
                match sequence_len(buf[i]) {
                    None => continue,
                    Some(1) => return 0,
                    Some(len) => {
                        let distance = buf.len() - i;
                        return if distance < len { distance } else { 0 };
                    }
                }
            }
            0
        }
    }
}

/// Decodes null-terminated and length-prefixed strings through a reusable
/// scratch buffer of `chunk_size` bytes.
///
/// Returned text is identical whatever the chunk size: a character cut by a
/// chunk boundary is moved to the front of the buffer and completed by the
/// next read.
#[derive(Debug)]
pub(crate) struct StringDecoder {
    chunk_size: usize,
    /// Allocated on first use; `chunk_size + MAX_CARRY` bytes.
    scratch: Vec<u8>,
}

impl StringDecoder {
    pub(crate) fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            scratch: Vec::new(),
        }
    }

    #[inline]
    fn ensure_scratch(&mut self) {
        if self.scratch.is_empty() {
            self.scratch = vec![0; self.chunk_size + MAX_CARRY];
        }
    }

    /// Read a null-terminated string.
    ///
    /// Returns the text (without terminator) and the number of bytes consumed
    /// (with terminator).
    pub(crate) fn read_cstring<S: ByteSource>(&mut self, src: &mut S) -> Result<(String, usize)> {
        self.ensure_scratch();
        let chunk = self.chunk_size;
        let mut out = String::new();
        let mut consumed = 0;
        let mut carry = 0;
        loop {
            let (n, found) = src.read_until_nul(&mut self.scratch[carry..carry + chunk])?;
            consumed += n;
            let filled = carry + n;
            if found {
                self.finish(filled, &mut out)?;
                return Ok((out, consumed + 1));
            }
            carry = self.flush_complete(filled, &mut out)?;
        }
    }

    /// Read a length-prefixed string: a 4-byte length L, L-1 payload bytes, and
    /// a terminator byte that is skipped without inspection.
    ///
    /// Returns the text and the number of bytes consumed (`4 + L`).
    #[allow(clippy::cast_sign_loss)]
    pub(crate) fn read_string<S: ByteSource>(&mut self, src: &mut S) -> Result<(String, usize)> {
        let declared = src.read_i32_le()?;
        if declared < 1 {
            return Err(Error::malformed(format!(
                "string length {declared} is less than 1"
            )));
        }
        let len = (declared - 1) as usize;

        self.ensure_scratch();
        let chunk = self.chunk_size;
        let mut out = String::with_capacity(len.min(MAX_PREALLOC));
        let mut remaining = len;
        let mut carry = 0;
        while remaining > 0 {
            let take = remaining.min(chunk);
            src.read_exact(&mut self.scratch[carry..carry + take])?;
            remaining -= take;
            let filled = carry + take;
            if remaining == 0 {
                self.finish(filled, &mut out)?;
            } else {
                carry = self.flush_complete(filled, &mut out)?;
            }
        }
        src.read_byte()?;

        Ok((out, 4 + declared as usize))
    }

    /// Append every complete character in `scratch[..filled]` to `out` and move
    /// the incomplete tail to the front of the scratch buffer.
    ///
    /// Returns the length of the carried tail.
    fn flush_complete(&mut self, filled: usize, out: &mut String) -> Result<usize> {
        let carry = incomplete_tail_len(&self.scratch[..filled]);
        let complete = filled - carry;
        out.push_str(validate_utf8(&self.scratch[..complete])?);
        self.scratch.copy_within(complete..filled, 0);
        Ok(carry)
    }

    /// Append the final chunk; any incomplete tail is an error here.
    fn finish(&self, filled: usize, out: &mut String) -> Result<()> {
        out.push_str(validate_utf8(&self.scratch[..filled])?);
        Ok(())
    }
}
