//! Checkpoint conversion seam.
//!
//! Zip imports unpack a checkpoint directory and hand it to a
//! [`FormatConverter`], which produces a canonical GGUF document. The
//! conversion itself lives outside this crate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::error::{LayerError, Result};

/// Checkpoint parameters, read from the directory's `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionParams {
    #[serde(default)]
    pub architectures: Vec<String>,
    #[serde(default)]
    pub vocab_size: Option<u64>,
    /// Every other field, kept for the converter.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ConversionParams {
    pub const CONFIG_FILE: &'static str = "config.json";

    /// Read `config.json` from an extracted checkpoint directory.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(Self::CONFIG_FILE);
        let contents = fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => LayerError::Conversion {
                message: format!("checkpoint has no {}", Self::CONFIG_FILE),
            },
            _ => LayerError::io_with_path(e, &path),
        })?;
        serde_json::from_slice(&contents).map_err(|e| LayerError::Json {
            message: format!("Failed to parse {}: {}", path.display(), e),
            source: Some(e),
        })
    }

    /// The first declared architecture, if any.
    pub fn architecture(&self) -> Option<&str> {
        self.architectures.first().map(String::as_str)
    }
}

/// Recognizes a checkpoint layout and opens it for conversion.
pub trait FormatConverter: Send + Sync {
    /// Inspect an extracted checkpoint directory.
    ///
    /// Fails with `Conversion` when the layout is not one this converter handles.
    fn open(&self, dir: &Path) -> Result<Box<dyn ModelArchitecture>>;
}

/// An opened checkpoint, driven in order: tensors, vocabulary, then output.
pub trait ModelArchitecture: Send {
    fn params(&self) -> &ConversionParams;

    fn load_tensors(&mut self) -> Result<()>;

    fn load_vocab(&mut self) -> Result<()>;

    /// Serialize the converted model as a canonical GGUF document.
    fn write_gguf(&mut self, out: &mut dyn Write) -> Result<()>;
}
