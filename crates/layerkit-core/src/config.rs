//! Import configuration.
//!
//! Tunables for content sniffing, scratch directories and document
//! classification. Defaults match what downstream consumers expect; hosts can
//! override them from their own configuration files through serde.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::manifest::PullOptions;

/// Configuration for an [`Importer`](crate::Importer).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ImportConfig {
    /// Number of leading bytes handed to the content-type detector.
    pub sniff_len: usize,
    /// Buffer size used when streaming sources into the blob store.
    pub copy_chunk_size: usize,
    /// Tensor data alignment when a document does not declare one.
    pub default_alignment: u64,
    /// Architecture tag that marks a document as a vision projector.
    pub projector_architecture: String,
    /// Prefix for scratch directories created during archive extraction.
    pub scratch_prefix: String,
    /// Parent directory for scratch space. When unset, the source file's
    /// directory is used, falling back to the system temp dir.
    pub scratch_root: Option<PathBuf>,
    /// Options forwarded to the remote puller on a manifest miss.
    pub pull: PullOptions,
}

impl ImportConfig {
    pub const DEFAULT_SNIFF_LEN: usize = 512;
    /// 8MB, same chunking the hashing code uses.
    pub const DEFAULT_COPY_CHUNK_SIZE: usize = 8 * 1024 * 1024;
    pub const DEFAULT_ALIGNMENT: u64 = 32;
    pub const DEFAULT_PROJECTOR_ARCHITECTURE: &'static str = "clip";
    pub const DEFAULT_SCRATCH_PREFIX: &'static str = ".tmp_import_";

    /// Resolve the directory that scratch space for `source` should live in.
    pub fn scratch_dir_for(&self, source: Option<&Path>) -> PathBuf {
        if let Some(root) = &self.scratch_root {
            return root.clone();
        }
        source
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            sniff_len: Self::DEFAULT_SNIFF_LEN,
            copy_chunk_size: Self::DEFAULT_COPY_CHUNK_SIZE,
            default_alignment: Self::DEFAULT_ALIGNMENT,
            projector_architecture: Self::DEFAULT_PROJECTOR_ARCHITECTURE.to_string(),
            scratch_prefix: Self::DEFAULT_SCRATCH_PREFIX.to_string(),
            scratch_root: None,
            pull: PullOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ImportConfig::default();
        assert_eq!(config.sniff_len, 512);
        assert_eq!(config.default_alignment, 32);
        assert_eq!(config.projector_architecture, "clip");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ImportConfig =
            serde_json::from_str(r#"{"projector_architecture": "mllama"}"#).unwrap();
        assert_eq!(config.projector_architecture, "mllama");
        assert_eq!(config.sniff_len, ImportConfig::DEFAULT_SNIFF_LEN);
        assert!(config.scratch_root.is_none());
    }

    #[test]
    fn test_scratch_dir_prefers_configured_root() {
        let config = ImportConfig {
            scratch_root: Some(PathBuf::from("/var/scratch")),
            ..Default::default()
        };
        assert_eq!(
            config.scratch_dir_for(Some(Path::new("/models/upload.zip"))),
            PathBuf::from("/var/scratch")
        );
    }

    #[test]
    fn test_scratch_dir_falls_back_to_source_parent() {
        let config = ImportConfig::default();
        assert_eq!(
            config.scratch_dir_for(Some(Path::new("/models/upload.zip"))),
            PathBuf::from("/models")
        );
        assert_eq!(config.scratch_dir_for(None), std::env::temp_dir());
        assert_eq!(
            config.scratch_dir_for(Some(Path::new("upload.zip"))),
            std::env::temp_dir()
        );
    }
}
