//! Tensor element kinds (ggml_type values) and their storage geometry.

use std::fmt;

/// Element kind of a tensor, identified by its on-disk ggml type id.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TensorKind {
    F32,
    F16,
    Q4_0,
    Q4_1,
    Q5_0,
    Q5_1,
    Q8_0,
    Q8_1,
    Q2_K,
    Q3_K,
    Q4_K,
    Q5_K,
    Q6_K,
    Q8_K,
    IQ2_XXS,
    IQ2_XS,
    IQ3_XXS,
    IQ1_S,
    IQ4_NL,
    IQ3_S,
    IQ2_S,
    IQ4_XS,
    I8,
    I16,
    I32,
    I64,
    F64,
    IQ1_M,
    BF16,
}

/// Super-block length shared by the k-quant and most i-quant formats.
const QK_K: u64 = 256;

impl TensorKind {
    /// Look up a kind by its ggml type id. Ids 4 and 5 were retired upstream.
    pub fn from_id(id: u32) -> Option<Self> {
        Some(match id {
            0 => TensorKind::F32,
            1 => TensorKind::F16,
            2 => TensorKind::Q4_0,
            3 => TensorKind::Q4_1,
            6 => TensorKind::Q5_0,
            7 => TensorKind::Q5_1,
            8 => TensorKind::Q8_0,
            9 => TensorKind::Q8_1,
            10 => TensorKind::Q2_K,
            11 => TensorKind::Q3_K,
            12 => TensorKind::Q4_K,
            13 => TensorKind::Q5_K,
            14 => TensorKind::Q6_K,
            15 => TensorKind::Q8_K,
            16 => TensorKind::IQ2_XXS,
            17 => TensorKind::IQ2_XS,
            18 => TensorKind::IQ3_XXS,
            19 => TensorKind::IQ1_S,
            20 => TensorKind::IQ4_NL,
            21 => TensorKind::IQ3_S,
            22 => TensorKind::IQ2_S,
            23 => TensorKind::IQ4_XS,
            24 => TensorKind::I8,
            25 => TensorKind::I16,
            26 => TensorKind::I32,
            27 => TensorKind::I64,
            28 => TensorKind::F64,
            29 => TensorKind::IQ1_M,
            30 => TensorKind::BF16,
            _ => return None,
        })
    }

    pub fn id(&self) -> u32 {
        match self {
            TensorKind::F32 => 0,
            TensorKind::F16 => 1,
            TensorKind::Q4_0 => 2,
            TensorKind::Q4_1 => 3,
            TensorKind::Q5_0 => 6,
            TensorKind::Q5_1 => 7,
            TensorKind::Q8_0 => 8,
            TensorKind::Q8_1 => 9,
            TensorKind::Q2_K => 10,
            TensorKind::Q3_K => 11,
            TensorKind::Q4_K => 12,
            TensorKind::Q5_K => 13,
            TensorKind::Q6_K => 14,
            TensorKind::Q8_K => 15,
            TensorKind::IQ2_XXS => 16,
            TensorKind::IQ2_XS => 17,
            TensorKind::IQ3_XXS => 18,
            TensorKind::IQ1_S => 19,
            TensorKind::IQ4_NL => 20,
            TensorKind::IQ3_S => 21,
            TensorKind::IQ2_S => 22,
            TensorKind::IQ4_XS => 23,
            TensorKind::I8 => 24,
            TensorKind::I16 => 25,
            TensorKind::I32 => 26,
            TensorKind::I64 => 27,
            TensorKind::F64 => 28,
            TensorKind::IQ1_M => 29,
            TensorKind::BF16 => 30,
        }
    }

    /// Number of elements packed into one storage block.
    pub fn block_size(&self) -> u64 {
        match self {
            TensorKind::F32
            | TensorKind::F16
            | TensorKind::BF16
            | TensorKind::F64
            | TensorKind::I8
            | TensorKind::I16
            | TensorKind::I32
            | TensorKind::I64 => 1,
            TensorKind::Q4_0
            | TensorKind::Q4_1
            | TensorKind::Q5_0
            | TensorKind::Q5_1
            | TensorKind::Q8_0
            | TensorKind::Q8_1
            | TensorKind::IQ4_NL => 32,
            _ => QK_K,
        }
    }

    /// Bytes occupied by one storage block.
    pub fn type_size(&self) -> u64 {
        match self {
            TensorKind::F32 => 4,
            TensorKind::F16 => 2,
            TensorKind::BF16 => 2,
            TensorKind::F64 => 8,
            TensorKind::I8 => 1,
            TensorKind::I16 => 2,
            TensorKind::I32 => 4,
            TensorKind::I64 => 8,
            TensorKind::Q4_0 => 2 + 16,
            TensorKind::Q4_1 => 2 + 2 + 16,
            TensorKind::Q5_0 => 2 + 4 + 16,
            TensorKind::Q5_1 => 2 + 2 + 4 + 16,
            TensorKind::Q8_0 => 2 + 32,
            TensorKind::Q8_1 => 2 + 2 + 32,
            TensorKind::IQ4_NL => 2 + 16,
            TensorKind::Q2_K => QK_K / 16 + QK_K / 4 + 2 + 2,
            TensorKind::Q3_K => QK_K / 8 + QK_K / 4 + 12 + 2,
            TensorKind::Q4_K => 2 + 2 + 12 + QK_K / 2,
            TensorKind::Q5_K => 2 + 2 + 12 + QK_K / 8 + QK_K / 2,
            TensorKind::Q6_K => QK_K / 2 + QK_K / 4 + QK_K / 16 + 2,
            TensorKind::Q8_K => 4 + QK_K + QK_K / 16 * 2,
            TensorKind::IQ2_XXS => 2 + QK_K / 8 * 2,
            TensorKind::IQ2_XS => 2 + QK_K / 8 * 2 + QK_K / 32,
            TensorKind::IQ3_XXS => 2 + QK_K / 4 + QK_K / 8,
            TensorKind::IQ1_S => 2 + QK_K / 8 + QK_K / 16,
            TensorKind::IQ3_S => 2 + QK_K / 4 + QK_K / 8 + QK_K / 32 + 4,
            TensorKind::IQ2_S => 2 + QK_K / 4 + QK_K / 16,
            TensorKind::IQ4_XS => 2 + 2 + QK_K / 2 + QK_K / 64,
            TensorKind::IQ1_M => QK_K / 8 + QK_K / 16 + QK_K / 32,
        }
    }

    /// Byte size of `elements` values of this kind, if it divides into whole blocks.
    pub fn byte_size(&self, elements: u64) -> Option<u64> {
        let block = self.block_size();
        if elements % block != 0 {
            return None;
        }
        (elements / block).checked_mul(self.type_size())
    }

    pub fn name(&self) -> &'static str {
        match self {
            TensorKind::F32 => "F32",
            TensorKind::F16 => "F16",
            TensorKind::Q4_0 => "Q4_0",
            TensorKind::Q4_1 => "Q4_1",
            TensorKind::Q5_0 => "Q5_0",
            TensorKind::Q5_1 => "Q5_1",
            TensorKind::Q8_0 => "Q8_0",
            TensorKind::Q8_1 => "Q8_1",
            TensorKind::Q2_K => "Q2_K",
            TensorKind::Q3_K => "Q3_K",
            TensorKind::Q4_K => "Q4_K",
            TensorKind::Q5_K => "Q5_K",
            TensorKind::Q6_K => "Q6_K",
            TensorKind::Q8_K => "Q8_K",
            TensorKind::IQ2_XXS => "IQ2_XXS",
            TensorKind::IQ2_XS => "IQ2_XS",
            TensorKind::IQ3_XXS => "IQ3_XXS",
            TensorKind::IQ1_S => "IQ1_S",
            TensorKind::IQ4_NL => "IQ4_NL",
            TensorKind::IQ3_S => "IQ3_S",
            TensorKind::IQ2_S => "IQ2_S",
            TensorKind::IQ4_XS => "IQ4_XS",
            TensorKind::I8 => "I8",
            TensorKind::I16 => "I16",
            TensorKind::I32 => "I32",
            TensorKind::I64 => "I64",
            TensorKind::F64 => "F64",
            TensorKind::IQ1_M => "IQ1_M",
            TensorKind::BF16 => "BF16",
        }
    }
}

impl fmt::Display for TensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
