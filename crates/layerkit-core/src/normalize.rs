//! Tensor layout normalization.
//!
//! A document whose tensor directory is already in serializer order passes
//! through byte for byte. Anything else is re-described (shapes flipped to the
//! serializer's axis convention, payloads left in place) and streamed out
//! through a [`GgufWriter`].

use std::io::{self, Read};

use tracing::debug;

use crate::error::Result;
use crate::ggml::source::{SectionReader, SharedSource};
use crate::ggml::writer::{GgufWriter, WriterTensor};
use crate::ggml::{is_sorted, GgmlDocument};

/// The bytes a document should be materialized from.
pub enum NormalizedDocument {
    /// The original document range, unchanged.
    Passthrough(SectionReader),
    /// A lazily re-serialized replacement.
    Rewritten(GgufWriter),
}

impl NormalizedDocument {
    pub fn is_rewritten(&self) -> bool {
        matches!(self, NormalizedDocument::Rewritten(_))
    }

    pub fn len(&self) -> u64 {
        match self {
            NormalizedDocument::Passthrough(section) => section.len(),
            NormalizedDocument::Rewritten(writer) => writer.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Read for NormalizedDocument {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            NormalizedDocument::Passthrough(section) => section.read(buf),
            NormalizedDocument::Rewritten(writer) => writer.read(buf),
        }
    }
}

/// Produce the canonical byte stream for `doc`, which was decoded from `src`.
pub fn normalize(src: &SharedSource, doc: &GgmlDocument) -> Result<NormalizedDocument> {
    if is_sorted(&doc.tensors) {
        return Ok(NormalizedDocument::Passthrough(SectionReader::new(
            src.clone(),
            doc.start,
            doc.len(),
        )));
    }

    debug!(
        "Rewriting {} document at offset {} with {} tensors out of order",
        doc.container,
        doc.start,
        doc.tensors.len()
    );
    let tensors = doc
        .tensors
        .iter()
        .map(|t| WriterTensor {
            descriptor: t.with_reversed_shape(),
            data: SectionReader::new(src.clone(), doc.tensor_position(t), t.size),
        })
        .collect();

    let writer = GgufWriter::new(doc.metadata.clone(), tensors, doc.alignment())?;
    Ok(NormalizedDocument::Rewritten(writer))
}
