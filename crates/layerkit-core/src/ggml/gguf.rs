//! GGUF v1-v3 header decoding.
//!
//! Layout after the magic:
//! - version: u32
//! - tensor count, kv count: u64 (u32 in v1)
//! - kv pairs: key string, value type u32, value
//! - tensor infos: name, n_dims u32, dims u64 (u32 in v1), type u32, offset u64
//! - padding to alignment, then tensor data

use super::cursor::FieldReader;
use super::metadata::{Metadata, MetadataValue, ValueType};
use super::tensor::TensorDescriptor;
use super::{checked_align_up, Container, GgmlDocument, GgufKeys, TensorKind};
use crate::error::{LayerError, Result};

/// Deepest array nesting accepted in metadata.
const MAX_ARRAY_DEPTH: usize = 10;

/// Most dimensions a tensor may declare.
const MAX_DIMS: u32 = 8;

pub(super) fn decode(
    reader: &mut FieldReader<'_>,
    start: u64,
    default_alignment: u64,
) -> Result<GgmlDocument> {
    let version_at = reader.position();
    let version = reader.u32("gguf version")?;
    if !(1..=3).contains(&version) {
        return Err(LayerError::format(
            version_at,
            format!("unsupported gguf version {version}"),
        ));
    }
    let wide = version > 1;

    let tensor_count = reader.count(wide, "tensor count")?;
    let kv_count = reader.count(wide, "metadata count")?;

    let mut metadata = Metadata::new();
    for _ in 0..kv_count {
        let key = reader.string(wide, "metadata key")?;
        let type_at = reader.position();
        let value_type = read_value_type(reader, type_at)?;
        let value = read_value(reader, value_type, wide, 0)?;
        metadata.insert(key, value);
    }

    let mut tensors = Vec::new();
    for _ in 0..tensor_count {
        tensors.push(read_tensor_info(reader, wide)?);
    }

    let alignment = match metadata.get(GgufKeys::ALIGNMENT) {
        Some(value) => value.as_u64().unwrap_or(0),
        None => default_alignment,
    };
    if alignment == 0 {
        return Err(LayerError::format(start, "invalid gguf alignment 0"));
    }

    let header_len = reader.position() - start;
    let data_offset = checked_align_up(header_len, alignment)
        .and_then(|padded| start.checked_add(padded))
        .ok_or_else(|| {
            LayerError::format(
                start,
                format!("gguf alignment {alignment} overflows the data section offset"),
            )
        })?;

    let mut data_len = 0u64;
    for tensor in &tensors {
        let tensor_end = tensor.offset.checked_add(tensor.size).ok_or_else(|| {
            LayerError::format(data_offset, format!("tensor {} overflows", tensor.name))
        })?;
        data_len = data_len.max(tensor_end);
    }

    let available = reader.position() + reader.remaining();
    let end = if tensors.is_empty() {
        // Without tensors the trailing padding is optional.
        data_offset.min(available)
    } else {
        data_offset.saturating_add(data_len)
    };
    if end > available {
        return Err(LayerError::format(
            data_offset,
            format!(
                "tensor data ends at {end} but the source ends at {available}"
            ),
        ));
    }

    Ok(GgmlDocument {
        container: Container::Gguf,
        version,
        metadata,
        tensors,
        start,
        end,
        data_offset,
        alignment,
    })
}

fn read_value_type(reader: &mut FieldReader<'_>, at: u64) -> Result<ValueType> {
    let id = reader.u32("value type")?;
    ValueType::from_id(id)
        .ok_or_else(|| LayerError::format(at, format!("unknown metadata value type {id}")))
}

fn read_value(
    reader: &mut FieldReader<'_>,
    value_type: ValueType,
    wide: bool,
    depth: usize,
) -> Result<MetadataValue> {
    Ok(match value_type {
        ValueType::U8 => MetadataValue::U8(reader.u8("u8 value")?),
        ValueType::I8 => MetadataValue::I8(reader.i8("i8 value")?),
        ValueType::U16 => MetadataValue::U16(reader.u16("u16 value")?),
        ValueType::I16 => MetadataValue::I16(reader.i16("i16 value")?),
        ValueType::U32 => MetadataValue::U32(reader.u32("u32 value")?),
        ValueType::I32 => MetadataValue::I32(reader.i32("i32 value")?),
        ValueType::F32 => MetadataValue::F32(reader.f32("f32 value")?),
        ValueType::Bool => MetadataValue::Bool(reader.bool("bool value")?),
        ValueType::String => MetadataValue::String(reader.string(wide, "string value")?),
        ValueType::U64 => MetadataValue::U64(reader.u64("u64 value")?),
        ValueType::I64 => MetadataValue::I64(reader.i64("i64 value")?),
        ValueType::F64 => MetadataValue::F64(reader.f64("f64 value")?),
        ValueType::Array => {
            let at = reader.position();
            if depth >= MAX_ARRAY_DEPTH {
                return Err(LayerError::format(at, "metadata array nesting too deep"));
            }
            let element_type = read_value_type(reader, at)?;
            let count = reader.count(wide, "array length")?;
            // Every element takes at least one byte.
            if count > reader.remaining() {
                return Err(LayerError::format(
                    at,
                    format!("array of {count} values runs past the end of stream"),
                ));
            }
            let mut values = Vec::with_capacity(count.min(4096) as usize);
            for _ in 0..count {
                values.push(read_value(reader, element_type, wide, depth + 1)?);
            }
            MetadataValue::Array(element_type, values)
        }
    })
}

fn read_tensor_info(reader: &mut FieldReader<'_>, wide: bool) -> Result<TensorDescriptor> {
    let at = reader.position();
    let name = reader.string(wide, "tensor name")?;

    let n_dims = reader.u32("tensor dimension count")?;
    if n_dims > MAX_DIMS {
        return Err(LayerError::format(
            at,
            format!("tensor {name} declares {n_dims} dimensions"),
        ));
    }
    let mut shape = Vec::with_capacity(n_dims as usize);
    for _ in 0..n_dims {
        shape.push(reader.count(wide, "tensor dimension")?);
    }

    let kind_id = reader.u32("tensor type")?;
    let kind = TensorKind::from_id(kind_id).ok_or_else(|| {
        LayerError::format(at, format!("tensor {name} has unknown type {kind_id}"))
    })?;
    let offset = reader.u64("tensor offset")?;

    let mut tensor = TensorDescriptor {
        name,
        kind,
        shape,
        offset,
        size: 0,
    };
    tensor.size = tensor
        .elements()
        .and_then(|elements| kind.byte_size(elements))
        .ok_or_else(|| {
            LayerError::format(
                at,
                format!(
                    "tensor {} shape {:?} does not fit type {kind}",
                    tensor.name, tensor.shape
                ),
            )
        })?;
    Ok(tensor)
}
