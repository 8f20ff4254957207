//! Byte-level document builders for tests.

use super::{align_up, GgufKeys, TensorKind};

fn payload(seed: u8, index: usize, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(7) ^ (index as u8).wrapping_mul(31) ^ seed)
        .collect()
}

enum Value {
    Str(String),
    U32(u32),
    U64(u64),
    StrArray(Vec<String>),
}

struct Tensor {
    name: String,
    kind: TensorKind,
    shape: Vec<u64>,
    data: Vec<u8>,
}

/// Writes a GGUF document in exactly the order it was described.
pub(crate) struct GgufFixture {
    version: u32,
    alignment: u64,
    seed: u8,
    kvs: Vec<(String, Value)>,
    tensors: Vec<Tensor>,
}

impl GgufFixture {
    pub(crate) fn new() -> Self {
        Self {
            version: 3,
            alignment: 32,
            seed: 0,
            kvs: Vec::new(),
            tensors: Vec::new(),
        }
    }

    pub(crate) fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub(crate) fn alignment(mut self, alignment: u32) -> Self {
        self.alignment = u64::from(alignment);
        self.kv_u32(GgufKeys::ALIGNMENT, alignment)
    }

    /// Varies tensor payload bytes so otherwise identical documents differ.
    pub(crate) fn seed(mut self, seed: u8) -> Self {
        self.seed = seed;
        self
    }

    pub(crate) fn kv_str(mut self, key: &str, value: &str) -> Self {
        self.kvs.push((key.to_string(), Value::Str(value.to_string())));
        self
    }

    pub(crate) fn kv_u32(mut self, key: &str, value: u32) -> Self {
        self.kvs.push((key.to_string(), Value::U32(value)));
        self
    }

    pub(crate) fn kv_u64(mut self, key: &str, value: u64) -> Self {
        self.kvs.push((key.to_string(), Value::U64(value)));
        self
    }

    pub(crate) fn kv_str_array(mut self, key: &str, values: &[&str]) -> Self {
        let values = values.iter().map(|v| v.to_string()).collect();
        self.kvs.push((key.to_string(), Value::StrArray(values)));
        self
    }

    pub(crate) fn tensor_f32(mut self, name: &str, shape: &[u64]) -> Self {
        let elements: u64 = shape.iter().product();
        let data = payload(self.seed, self.tensors.len(), elements as usize * 4);
        self.tensors.push(Tensor {
            name: name.to_string(),
            kind: TensorKind::F32,
            shape: shape.to_vec(),
            data,
        });
        self
    }

    fn count(&self, out: &mut Vec<u8>, n: u64) {
        if self.version == 1 {
            out.extend_from_slice(&(n as u32).to_le_bytes());
        } else {
            out.extend_from_slice(&n.to_le_bytes());
        }
    }

    fn string(&self, out: &mut Vec<u8>, s: &str) {
        self.count(out, s.len() as u64);
        out.extend_from_slice(s.as_bytes());
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let mut out = b"GGUF".to_vec();
        out.extend_from_slice(&self.version.to_le_bytes());
        self.count(&mut out, self.tensors.len() as u64);
        self.count(&mut out, self.kvs.len() as u64);

        for (key, value) in &self.kvs {
            self.string(&mut out, key);
            match value {
                Value::Str(s) => {
                    out.extend_from_slice(&8u32.to_le_bytes());
                    self.string(&mut out, s);
                }
                Value::U32(v) => {
                    out.extend_from_slice(&4u32.to_le_bytes());
                    out.extend_from_slice(&v.to_le_bytes());
                }
                Value::U64(v) => {
                    out.extend_from_slice(&10u32.to_le_bytes());
                    out.extend_from_slice(&v.to_le_bytes());
                }
                Value::StrArray(values) => {
                    out.extend_from_slice(&9u32.to_le_bytes());
                    out.extend_from_slice(&8u32.to_le_bytes());
                    self.count(&mut out, values.len() as u64);
                    for v in values {
                        self.string(&mut out, v);
                    }
                }
            }
        }

        let mut offset = 0u64;
        let mut offsets = Vec::new();
        for tensor in &self.tensors {
            offset = align_up(offset, self.alignment);
            offsets.push(offset);
            offset += tensor.data.len() as u64;
        }

        for (tensor, offset) in self.tensors.iter().zip(&offsets) {
            self.string(&mut out, &tensor.name);
            out.extend_from_slice(&(tensor.shape.len() as u32).to_le_bytes());
            for dim in &tensor.shape {
                self.count(&mut out, *dim);
            }
            out.extend_from_slice(&tensor.kind.id().to_le_bytes());
            out.extend_from_slice(&offset.to_le_bytes());
        }

        let data_start = align_up(out.len() as u64, self.alignment);
        out.resize(data_start as usize, 0);
        for (tensor, offset) in self.tensors.iter().zip(&offsets) {
            out.resize((data_start + offset) as usize, 0);
            out.extend_from_slice(&tensor.data);
        }
        out
    }
}

/// Writes a GGLA adapter document.
pub(crate) struct GglaFixture {
    r: u32,
    alpha: u32,
    tensors: Vec<Tensor>,
}

impl GglaFixture {
    pub(crate) fn new(r: u32, alpha: u32) -> Self {
        Self {
            r,
            alpha,
            tensors: Vec::new(),
        }
    }

    pub(crate) fn tensor_f32(mut self, name: &str, shape: &[u64]) -> Self {
        let elements: u64 = shape.iter().product();
        let data = payload(0, self.tensors.len(), elements as usize * 4);
        self.tensors.push(Tensor {
            name: name.to_string(),
            kind: TensorKind::F32,
            shape: shape.to_vec(),
            data,
        });
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let mut out = b"algg".to_vec();
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&self.r.to_le_bytes());
        out.extend_from_slice(&self.alpha.to_le_bytes());
        for tensor in &self.tensors {
            out.extend_from_slice(&(tensor.shape.len() as u32).to_le_bytes());
            out.extend_from_slice(&(tensor.name.len() as u32).to_le_bytes());
            out.extend_from_slice(&tensor.kind.id().to_le_bytes());
            for dim in &tensor.shape {
                out.extend_from_slice(&(*dim as u32).to_le_bytes());
            }
            out.extend_from_slice(tensor.name.as_bytes());
            let padded = align_up(out.len() as u64, 32);
            out.resize(padded as usize, 0);
            out.extend_from_slice(&tensor.data);
        }
        out
    }
}
