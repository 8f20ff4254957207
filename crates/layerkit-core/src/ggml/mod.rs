//! GGUF and GGLA document decoding.
//!
//! A source may hold several documents back to back. [`decode_document`]
//! decodes the one starting at a given absolute offset and reports where it
//! ends, so callers can walk a stream document by document. Only headers are
//! read; tensor payloads are located, never loaded.

mod cursor;
mod ggla;
mod gguf;
pub mod kind;
pub mod metadata;
pub mod source;
pub mod tensor;
pub mod writer;

#[cfg(test)]
pub(crate) mod fixture;

use std::fmt;

use crate::config::ImportConfig;
use crate::error::{LayerError, Result};
use cursor::FieldReader;
use source::{read_full_at, ReadAt};

pub use kind::TensorKind;
pub use metadata::{Metadata, MetadataValue, ValueType};
pub use tensor::{is_sorted, tensor_order, TensorDescriptor};

/// Magic numbers, read as a little-endian u32 of the first four bytes.
pub(crate) mod magic {
    /// "GGUF"
    pub const GGUF_LE: u32 = 0x4655_4747;
    /// "FUGG", a GGUF document written big-endian
    pub const GGUF_BE: u32 = 0x4747_5546;
    /// "algg", LoRA adapter format
    pub const GGLA: u32 = 0x6767_6c61;
    /// Legacy unversioned ggml
    pub const GGML: u32 = 0x6767_6d6c;
    pub const GGMF: u32 = 0x6767_6d66;
    pub const GGJT: u32 = 0x6767_6a74;
}

/// Well-known metadata keys.
pub struct GgufKeys;

impl GgufKeys {
    pub const ARCHITECTURE: &'static str = "general.architecture";
    pub const ALIGNMENT: &'static str = "general.alignment";
    pub const CHAT_TEMPLATE: &'static str = "tokenizer.chat_template";
}

/// Native container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Gguf,
    Ggla,
}

impl Container {
    pub fn name(&self) -> &'static str {
        match self {
            Container::Gguf => "gguf",
            Container::Ggla => "ggla",
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Classify a byte prefix by its magic number.
///
/// Both GGUF byte orders count as GGUF here; the decoder is what rejects the
/// big-endian form.
pub fn detect_container(prefix: &[u8]) -> Option<Container> {
    let magic = u32::from_le_bytes(prefix.get(..4)?.try_into().ok()?);
    match magic {
        magic::GGUF_LE | magic::GGUF_BE => Some(Container::Gguf),
        magic::GGLA => Some(Container::Ggla),
        _ => None,
    }
}

/// One decoded document and its location within the source.
#[derive(Debug, Clone, PartialEq)]
pub struct GgmlDocument {
    pub container: Container,
    pub version: u32,
    pub metadata: Metadata,
    pub tensors: Vec<TensorDescriptor>,
    /// Absolute offset of the magic number.
    pub start: u64,
    /// Absolute offset one past the last payload byte.
    pub end: u64,
    /// Absolute offset tensor offsets are relative to.
    pub data_offset: u64,
    /// Tensor data alignment, relative to `start`.
    pub alignment: u64,
}

impl GgmlDocument {
    pub fn architecture(&self) -> Option<&str> {
        self.metadata.get_str(GgufKeys::ARCHITECTURE)
    }

    pub fn chat_template(&self) -> Option<&str> {
        self.metadata.get_str(GgufKeys::CHAT_TEMPLATE)
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Total bytes occupied by the document.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Absolute offset of a tensor's payload.
    pub fn tensor_position(&self, tensor: &TensorDescriptor) -> u64 {
        self.data_offset + tensor.offset
    }
}

/// Decode the document starting at `offset`.
///
/// Returns `Ok(None)` when `offset` is at or past the end of the source.
pub fn decode_document(
    src: &dyn ReadAt,
    offset: u64,
    config: &ImportConfig,
) -> Result<Option<GgmlDocument>> {
    let len = src.size()?;
    if offset >= len {
        return Ok(None);
    }

    let mut head = [0u8; 4];
    let n = read_full_at(src, &mut head, offset)?;
    if n < head.len() {
        return Err(LayerError::format(
            offset,
            format!("trailing {n} bytes are too short for a document header"),
        ));
    }

    let mut reader = FieldReader::new(src, len, offset + 4);
    match u32::from_le_bytes(head) {
        magic::GGUF_LE => gguf::decode(&mut reader, offset, config.default_alignment).map(Some),
        magic::GGLA => ggla::decode(&mut reader, offset).map(Some),
        magic::GGUF_BE => Err(LayerError::format(
            offset,
            "big-endian gguf is not supported",
        )),
        magic::GGML | magic::GGMF | magic::GGJT => Err(LayerError::format(
            offset,
            "unsupported legacy ggml format",
        )),
        other => Err(LayerError::format(
            offset,
            format!("invalid file magic 0x{other:08x}"),
        )),
    }
}

pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// [`align_up`] for alignments read from untrusted headers.
pub(crate) fn checked_align_up(value: u64, alignment: u64) -> Option<u64> {
    value.div_ceil(alignment).checked_mul(alignment)
}
