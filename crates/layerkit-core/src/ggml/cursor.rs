//! Little-endian field reader over a positional source.
//!
//! Tracks the absolute offset of every field so decode failures can name the
//! exact byte where a document went bad. Skipping a payload only moves the
//! cursor; tensor data is never read during decoding.

use super::source::{read_full_at, ReadAt};
use crate::error::{LayerError, Result};

/// Window size for buffered header reads.
const WINDOW: usize = 64 * 1024;

/// Longest string a header field may declare.
const MAX_STRING_LEN: u64 = 1 << 30;

pub(crate) struct FieldReader<'a> {
    src: &'a dyn ReadAt,
    len: u64,
    pos: u64,
    window: Vec<u8>,
    window_start: u64,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(src: &'a dyn ReadAt, len: u64, pos: u64) -> Self {
        Self {
            src,
            len,
            pos,
            window: Vec::new(),
            window_start: 0,
        }
    }

    /// Absolute offset of the next byte to be read.
    pub(crate) fn position(&self) -> u64 {
        self.pos
    }

    pub(crate) fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.pos)
    }

    fn window_end(&self) -> u64 {
        self.window_start + self.window.len() as u64
    }

    fn refill(&mut self) -> Result<()> {
        let want = WINDOW.min(usize::try_from(self.remaining()).unwrap_or(WINDOW));
        self.window.resize(want, 0);
        let n = read_full_at(self.src, &mut self.window, self.pos)?;
        self.window.truncate(n);
        self.window_start = self.pos;
        Ok(())
    }

    fn fill(&mut self, out: &mut [u8], what: &str) -> Result<()> {
        let start = self.pos;
        let mut filled = 0;
        while filled < out.len() {
            if self.pos < self.window_start || self.pos >= self.window_end() {
                self.refill()?;
                if self.window.is_empty() {
                    return Err(LayerError::format(
                        start,
                        format!("unexpected end of stream reading {what}"),
                    ));
                }
            }
            let at = (self.pos - self.window_start) as usize;
            let n = (out.len() - filled).min(self.window.len() - at);
            out[filled..filled + n].copy_from_slice(&self.window[at..at + n]);
            filled += n;
            self.pos += n as u64;
        }
        Ok(())
    }

    fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.fill(&mut buf, what)?;
        Ok(buf)
    }

    /// Read a u32, or `None` if the stream ends cleanly before it.
    pub(crate) fn try_u32(&mut self, what: &str) -> Result<Option<u32>> {
        if self.remaining() == 0 {
            return Ok(None);
        }
        self.u32(what).map(Some)
    }

    pub(crate) fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.array::<1>(what)?[0])
    }

    pub(crate) fn i8(&mut self, what: &str) -> Result<i8> {
        Ok(i8::from_le_bytes(self.array(what)?))
    }

    pub(crate) fn u16(&mut self, what: &str) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array(what)?))
    }

    pub(crate) fn i16(&mut self, what: &str) -> Result<i16> {
        Ok(i16::from_le_bytes(self.array(what)?))
    }

    pub(crate) fn u32(&mut self, what: &str) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array(what)?))
    }

    pub(crate) fn i32(&mut self, what: &str) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array(what)?))
    }

    pub(crate) fn u64(&mut self, what: &str) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array(what)?))
    }

    pub(crate) fn i64(&mut self, what: &str) -> Result<i64> {
        Ok(i64::from_le_bytes(self.array(what)?))
    }

    pub(crate) fn f32(&mut self, what: &str) -> Result<f32> {
        Ok(f32::from_le_bytes(self.array(what)?))
    }

    pub(crate) fn f64(&mut self, what: &str) -> Result<f64> {
        Ok(f64::from_le_bytes(self.array(what)?))
    }

    pub(crate) fn bool(&mut self, what: &str) -> Result<bool> {
        let at = self.pos;
        match self.u8(what)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(LayerError::format(
                at,
                format!("invalid bool value {other} in {what}"),
            )),
        }
    }

    /// Read a count that is 32-bit in GGUF v1 and 64-bit afterwards.
    pub(crate) fn count(&mut self, wide: bool, what: &str) -> Result<u64> {
        if wide {
            self.u64(what)
        } else {
            self.u32(what).map(u64::from)
        }
    }

    /// Read `len` bytes as UTF-8.
    pub(crate) fn string_of_len(&mut self, len: u64, what: &str) -> Result<String> {
        let at = self.pos;
        if len > MAX_STRING_LEN || len > self.remaining() {
            return Err(LayerError::format(
                at,
                format!("{what} declares length {len} beyond the end of stream"),
            ));
        }
        let mut buf = vec![0u8; len as usize];
        self.fill(&mut buf, what)?;
        String::from_utf8(buf)
            .map_err(|_| LayerError::format(at, format!("invalid UTF-8 in {what}")))
    }

    /// Read a length-prefixed string.
    pub(crate) fn string(&mut self, wide: bool, what: &str) -> Result<String> {
        let len = self.count(wide, what)?;
        self.string_of_len(len, what)
    }

    /// Advance past `n` bytes without reading them.
    pub(crate) fn skip(&mut self, n: u64, what: &str) -> Result<()> {
        if n > self.remaining() {
            return Err(LayerError::format(
                self.pos,
                format!("{what} runs {} bytes past the end of stream", n - self.remaining()),
            ));
        }
        self.pos += n;
        Ok(())
    }
}
