//! Sortable key construction.
//!
//! Keys are the byte concatenation of per-slot [`Iv`] encodings. A
//! [`KeyBuilder`] owns its buffer and is reset between keys; each writer or
//! reader keeps its own builder and never shares one across threads.

use crate::error::{Error, Result};
use crate::iv::{Iv, NULL_FLAG};

/// Reusable key buffer.
#[derive(Debug, Default)]
pub struct KeyBuilder {
    buf: Vec<u8>,
}

impl KeyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    /// Clear the buffer, keeping its allocation.
    #[inline]
    pub fn reset(&mut self) -> &mut Self {
        self.buf.clear();
        self
    }

    #[inline]
    pub fn append(&mut self, iv: &Iv) -> &mut Self {
        iv.encode_into(&mut self.buf);
        self
    }

    /// Append a context slot; `None` encodes as the null flag.
    #[inline]
    pub fn append_context(&mut self, c: Option<&Iv>) -> &mut Self {
        match c {
            Some(iv) => iv.encode_into(&mut self.buf),
            None => self.buf.push(NULL_FLAG),
        }
        self
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Copy of the current key.
    pub fn key(&self) -> Vec<u8> {
        self.buf.clone()
    }
}

/// Decode a context slot from the front of `bytes`.
pub fn decode_context(bytes: &[u8]) -> Result<(Option<Iv>, usize)> {
    match bytes.first() {
        Some(&NULL_FLAG) => Ok((None, 1)),
        Some(_) => Iv::decode(bytes).map(|(iv, n)| (Some(iv), n)),
        None => Err(Error::invalid_key("unexpected end of key")),
    }
}

/// Smallest byte string strictly greater than every string prefixed by `key`.
///
/// Increments the last byte, dropping trailing `0xFF` bytes as it carries.
/// Fails for an empty key or a key made only of `0xFF` bytes.
pub fn successor(key: &[u8]) -> Result<Vec<u8>> {
    let mut out = key.to_vec();
    while let Some(last) = out.pop() {
        if last != 0xFF {
            out.push(last + 1);
            return Ok(out);
        }
    }
    Err(Error::NoSuccessor(key.len()))
}
