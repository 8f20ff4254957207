//! Tensor directory entries and the serializer's ordering.

use std::cmp::Ordering;

use super::kind::TensorKind;

/// One entry of a document's tensor directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorDescriptor {
    /// Unique within a document.
    pub name: String,
    pub kind: TensorKind,
    /// Dimension sizes, in the document's own axis convention.
    pub shape: Vec<u64>,
    /// Offset of the payload relative to the owning document's data section.
    pub offset: u64,
    /// Payload length in bytes.
    pub size: u64,
}

impl TensorDescriptor {
    /// Total number of elements, or `None` on overflow.
    pub fn elements(&self) -> Option<u64> {
        self.shape
            .iter()
            .try_fold(1u64, |acc, &dim| acc.checked_mul(dim))
    }

    /// The `N` of a `blk.N.*` tensor name.
    pub fn block_index(&self) -> Option<u64> {
        let rest = self.name.strip_prefix("blk.")?;
        let digits = rest.split('.').next()?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Same tensor with its dimensions in the opposite axis order.
    pub fn with_reversed_shape(&self) -> Self {
        let mut reversed = self.clone();
        reversed.shape.reverse();
        reversed
    }
}

/// Total order the serializer requires of a tensor directory.
///
/// Non-block tensors come first by name, then `blk.N.*` tensors by numeric
/// block index, ties broken by name.
pub fn tensor_order(a: &TensorDescriptor, b: &TensorDescriptor) -> Ordering {
    a.block_index()
        .cmp(&b.block_index())
        .then_with(|| a.name.cmp(&b.name))
}

/// Whether the directory is already in [`tensor_order`].
pub fn is_sorted(tensors: &[TensorDescriptor]) -> bool {
    tensors
        .windows(2)
        .all(|pair| tensor_order(&pair[0], &pair[1]) != Ordering::Greater)
}
