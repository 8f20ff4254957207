//! GGLA (legacy LoRA adapter) decoding.
//!
//! After the magic: version u32 (only 1), `r` u32, `alpha` u32, then tensor
//! records until the stream ends. Each record is dims u32, name length u32,
//! type u32, dims x u32, the name, padding to 32 bytes, then the payload.

use super::cursor::FieldReader;
use super::metadata::{Metadata, MetadataValue};
use super::tensor::TensorDescriptor;
use super::{align_up, Container, GgmlDocument, TensorKind};
use crate::error::{LayerError, Result};

const PAYLOAD_ALIGNMENT: u64 = 32;

pub(super) fn decode(reader: &mut FieldReader<'_>, start: u64) -> Result<GgmlDocument> {
    let version_at = reader.position();
    let version = reader.u32("ggla version")?;
    if version != 1 {
        return Err(LayerError::format(
            version_at,
            format!("unsupported ggla version {version}"),
        ));
    }

    let mut metadata = Metadata::new();
    metadata.insert("r", MetadataValue::U32(reader.u32("lora r")?));
    metadata.insert("alpha", MetadataValue::U32(reader.u32("lora alpha")?));

    let mut tensors = Vec::new();
    let mut end = reader.position();
    loop {
        let record_at = reader.position();
        let Some(n_dims) = reader.try_u32("tensor dimension count")? else {
            break;
        };
        let name_len = reader.u32("tensor name length")?;
        let kind_id = reader.u32("tensor type")?;
        let kind = TensorKind::from_id(kind_id).ok_or_else(|| {
            LayerError::format(record_at, format!("unknown tensor type {kind_id}"))
        })?;

        let mut shape = Vec::with_capacity(n_dims.min(8) as usize);
        for _ in 0..n_dims {
            shape.push(u64::from(reader.u32("tensor dimension")?));
        }
        let name = reader.string_of_len(u64::from(name_len), "tensor name")?;

        let relative = reader.position() - start;
        reader.skip(
            align_up(relative, PAYLOAD_ALIGNMENT) - relative,
            "tensor padding",
        )?;

        let mut tensor = TensorDescriptor {
            name,
            kind,
            shape,
            offset: reader.position() - start,
            size: 0,
        };
        tensor.size = tensor
            .elements()
            .and_then(|elements| kind.byte_size(elements))
            .ok_or_else(|| {
                LayerError::format(
                    record_at,
                    format!("tensor {} shape does not fit type {kind}", tensor.name),
                )
            })?;
        reader.skip(tensor.size, "tensor data")?;
        end = reader.position();
        tensors.push(tensor);
    }

    Ok(GgmlDocument {
        container: Container::Ggla,
        version,
        metadata,
        tensors,
        start,
        end,
        data_offset: start,
        alignment: PAYLOAD_ALIGNMENT,
    })
}
