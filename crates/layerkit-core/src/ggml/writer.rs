//! Lazy GGUF v3 serializer.
//!
//! The header, metadata and tensor directory are small and encoded up front.
//! Tensor payloads stay behind [`SectionReader`]s onto their original source
//! and are only pulled when the writer itself is read, so rewriting a
//! multi-gigabyte document costs a few kilobytes of memory.

use bytes::{Buf, Bytes};
use std::collections::VecDeque;
use std::io::{self, Read};

use super::metadata::{Metadata, MetadataValue};
use super::source::SectionReader;
use super::tensor::{tensor_order, TensorDescriptor};
use super::{checked_align_up, GgufKeys};
use crate::error::{LayerError, Result};

const VERSION: u32 = 3;

/// A tensor to serialize and the view its payload is read from.
#[derive(Debug, Clone)]
pub struct WriterTensor {
    pub descriptor: TensorDescriptor,
    pub data: SectionReader,
}

enum Segment {
    Bytes(Bytes),
    Section(SectionReader),
    Zeros(u64),
}

/// A canonical GGUF document produced on demand.
pub struct GgufWriter {
    tensors: Vec<TensorDescriptor>,
    segments: VecDeque<Segment>,
    len: u64,
}

impl GgufWriter {
    /// Lay out `tensors` in serializer order behind an encoded header.
    ///
    /// Descriptor offsets are reassigned. Shapes are in the writer's axis
    /// order, the reverse of the directory's, and are written last-to-first.
    pub fn new(mut metadata: Metadata, tensors: Vec<WriterTensor>, alignment: u64) -> Result<Self> {
        if alignment == 0 {
            return Err(LayerError::Other("gguf alignment must be nonzero".into()));
        }
        if alignment != 32 && metadata.get(GgufKeys::ALIGNMENT).is_none() {
            let value = u32::try_from(alignment)
                .map_err(|_| LayerError::Other(format!("alignment {alignment} too large")))?;
            metadata.insert(GgufKeys::ALIGNMENT, MetadataValue::U32(value));
        }

        let mut tensors = tensors;
        tensors.sort_by(|a, b| tensor_order(&a.descriptor, &b.descriptor));

        let mut offset = 0u64;
        for tensor in &mut tensors {
            if tensor.data.len() != tensor.descriptor.size {
                return Err(LayerError::Other(format!(
                    "tensor {} has {} bytes of data but needs {}",
                    tensor.descriptor.name,
                    tensor.data.len(),
                    tensor.descriptor.size
                )));
            }
            let placed = checked_align_up(offset, alignment)
                .and_then(|start| Some((start, start.checked_add(tensor.descriptor.size)?)));
            let Some((start, end)) = placed else {
                return Err(LayerError::Other(format!(
                    "tensor {} does not fit in a gguf data section",
                    tensor.descriptor.name
                )));
            };
            tensor.descriptor.offset = start;
            offset = end;
        }

        let mut header = Vec::new();
        header.extend_from_slice(b"GGUF");
        put_u32(&mut header, VERSION);
        put_u64(&mut header, tensors.len() as u64);
        put_u64(&mut header, metadata.len() as u64);
        for (key, value) in metadata.iter() {
            put_string(&mut header, key);
            put_u32(&mut header, value.value_type().id());
            put_value(&mut header, value);
        }
        for tensor in &tensors {
            let t = &tensor.descriptor;
            put_string(&mut header, &t.name);
            put_u32(&mut header, t.shape.len() as u32);
            for dim in t.shape.iter().rev() {
                put_u64(&mut header, *dim);
            }
            put_u32(&mut header, t.kind.id());
            put_u64(&mut header, t.offset);
        }

        let header_len = header.len() as u64;
        let data_start = checked_align_up(header_len, alignment)
            .ok_or_else(|| LayerError::Other(format!("alignment {alignment} too large")))?;
        let mut segments = VecDeque::new();
        segments.push_back(Segment::Bytes(Bytes::from(header)));
        segments.push_back(Segment::Zeros(data_start - header_len));

        let mut written = 0u64;
        let mut descriptors = Vec::with_capacity(tensors.len());
        for tensor in tensors {
            let gap = tensor.descriptor.offset - written;
            if gap > 0 {
                segments.push_back(Segment::Zeros(gap));
            }
            written = tensor.descriptor.offset + tensor.descriptor.size;
            segments.push_back(Segment::Section(tensor.data));
            descriptors.push(tensor.descriptor);
        }

        let len = data_start
            .checked_add(written)
            .ok_or_else(|| LayerError::Other("gguf document length overflows".into()))?;
        Ok(Self {
            tensors: descriptors,
            segments,
            len,
        })
    }

    /// The tensor directory as it will be written.
    pub fn tensors(&self) -> &[TensorDescriptor] {
        &self.tensors
    }

    /// Total serialized length.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Read for GgufWriter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while let Some(segment) = self.segments.front_mut() {
            let n = match segment {
                Segment::Bytes(bytes) => {
                    let n = buf.len().min(bytes.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    bytes.advance(n);
                    n
                }
                Segment::Section(section) => section.read(buf)?,
                Segment::Zeros(remaining) => {
                    let n = buf.len().min(usize::try_from(*remaining).unwrap_or(usize::MAX));
                    buf[..n].fill(0);
                    *remaining -= n as u64;
                    n
                }
            };
            if n > 0 {
                return Ok(n);
            }
            self.segments.pop_front();
        }
        Ok(0)
    }
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_string(out: &mut Vec<u8>, s: &str) {
    put_u64(out, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
}

fn put_value(out: &mut Vec<u8>, value: &MetadataValue) {
    match value {
        MetadataValue::U8(v) => out.push(*v),
        MetadataValue::I8(v) => out.extend_from_slice(&v.to_le_bytes()),
        MetadataValue::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
        MetadataValue::I16(v) => out.extend_from_slice(&v.to_le_bytes()),
        MetadataValue::U32(v) => put_u32(out, *v),
        MetadataValue::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
        MetadataValue::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
        MetadataValue::Bool(v) => out.push(u8::from(*v)),
        MetadataValue::String(s) => put_string(out, s),
        MetadataValue::Array(element_type, values) => {
            put_u32(out, element_type.id());
            put_u64(out, values.len() as u64);
            for v in values {
                put_value(out, v);
            }
        }
        MetadataValue::U64(v) => put_u64(out, *v),
        MetadataValue::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
        MetadataValue::F64(v) => out.extend_from_slice(&v.to_le_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixture::GgufFixture;
    use super::super::source::SharedSource;
    use super::super::{decode_document, is_sorted};
    use super::*;
    use crate::config::ImportConfig;
    use std::sync::Arc;

    fn rewrite(data: Vec<u8>) -> (SharedSource, Vec<u8>) {
        let src: SharedSource = Arc::new(Bytes::from(data));
        let doc = decode_document(src.as_ref(), 0, &ImportConfig::default())
            .unwrap()
            .unwrap();
        let tensors = doc
            .tensors
            .iter()
            .map(|t| WriterTensor {
                descriptor: t.with_reversed_shape(),
                data: SectionReader::new(src.clone(), doc.tensor_position(t), t.size),
            })
            .collect();
        let mut writer = GgufWriter::new(doc.metadata.clone(), tensors, doc.alignment()).unwrap();
        let expected_len = writer.len();
        let mut out = Vec::new();
        writer.read_to_end(&mut out).unwrap();
        assert_eq!(out.len() as u64, expected_len);
        (src, out)
    }

    #[test]
    fn test_rewrite_sorts_and_preserves_payloads() {
        let input = GgufFixture::new()
            .kv_str("general.architecture", "llama")
            .tensor_f32("blk.10.ffn.weight", &[3])
            .tensor_f32("blk.2.ffn.weight", &[5])
            .tensor_f32("token_embd.weight", &[7])
            .build();
        let (src, out) = rewrite(input);
        let original = decode_document(src.as_ref(), 0, &ImportConfig::default())
            .unwrap()
            .unwrap();

        let out = Bytes::from(out);
        let doc = decode_document(&out, 0, &ImportConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(doc.version, 3);
        assert_eq!(doc.end, out.len() as u64);
        assert!(is_sorted(&doc.tensors));
        assert_eq!(doc.architecture(), Some("llama"));

        for tensor in &doc.tensors {
            let before = original
                .tensors
                .iter()
                .find(|t| t.name == tensor.name)
                .unwrap();
            let mut expected = vec![0u8; before.size as usize];
            let n = super::super::source::read_full_at(
                src.as_ref(),
                &mut expected,
                original.tensor_position(before),
            )
            .unwrap();
            assert_eq!(n, expected.len());

            assert_eq!(tensor.shape, before.shape);
            let at = doc.tensor_position(tensor) as usize;
            assert_eq!(&out[at..at + tensor.size as usize], &expected[..]);
        }
    }

    #[test]
    fn test_rewrite_of_sorted_document_is_identical() {
        let input = GgufFixture::new()
            .kv_str("general.architecture", "llama")
            .kv_str_array("tokenizer.ggml.tokens", &["a", "b"])
            .tensor_f32("output.weight", &[4])
            .tensor_f32("blk.0.attn_q.weight", &[2, 2])
            .tensor_f32("blk.1.attn_q.weight", &[2, 2])
            .build();
        let (_, out) = rewrite(input.clone());
        assert_eq!(out, input);
    }

    #[test]
    fn test_payload_length_mismatch_rejected() {
        let src: SharedSource = Arc::new(Bytes::from_static(&[0; 8]));
        let tensor = WriterTensor {
            descriptor: TensorDescriptor {
                name: "a".into(),
                kind: super::super::TensorKind::F32,
                shape: vec![4],
                offset: 0,
                size: 16,
            },
            data: SectionReader::new(src, 0, 8),
        };
        assert!(GgufWriter::new(Metadata::new(), vec![tensor], 32).is_err());
    }

    #[test]
    fn test_empty_document() {
        let mut writer = GgufWriter::new(Metadata::new(), Vec::new(), 32).unwrap();
        let mut out = Vec::new();
        writer.read_to_end(&mut out).unwrap();
        // magic, version, two counts, padded to 32
        assert_eq!(out.len(), 32);
        assert_eq!(&out[..4], b"GGUF");
    }
}
