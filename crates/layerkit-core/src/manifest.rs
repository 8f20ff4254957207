//! Manifests, local manifest lookup and the remote pull seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::archive::is_local;
use crate::digest::Digest;
use crate::error::{LayerError, Result};
use crate::layer::MediaType;
use crate::progress::ProgressFn;

/// One layer reference in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestLayer {
    pub media_type: MediaType,
    pub digest: Digest,
    #[serde(default)]
    pub size: u64,
}

/// A named, ordered list of layer references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default = "Manifest::default_schema_version")]
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ManifestLayer>,
    #[serde(default)]
    pub layers: Vec<ManifestLayer>,
}

impl Manifest {
    pub const MEDIA_TYPE: &'static str = "application/vnd.docker.distribution.manifest.v2+json";

    fn default_schema_version() -> u32 {
        2
    }

    pub fn new(layers: Vec<ManifestLayer>) -> Self {
        Self {
            schema_version: Self::default_schema_version(),
            media_type: Some(Self::MEDIA_TYPE.to_string()),
            config: None,
            layers,
        }
    }
}

/// Local manifest lookup.
pub trait ManifestStore: Send + Sync {
    /// Returns `ManifestNotFound` when no manifest is stored under `name`.
    fn lookup(&self, name: &str) -> Result<Manifest>;
}

/// Options forwarded to a [`RemotePuller`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullOptions {
    /// Allow plain HTTP and unverified TLS.
    pub insecure: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Fetches a model's manifest and blobs from a registry into local storage.
#[async_trait]
pub trait RemotePuller: Send + Sync {
    async fn pull(&self, name: &str, options: &PullOptions, progress: ProgressFn) -> Result<()>;
}

/// Manifests stored as JSON files under a root directory.
///
/// `registry.example.com/library/llama3:8b` lives at
/// `<root>/registry.example.com/library/llama3/8b`. A missing tag means
/// `latest`.
#[derive(Debug, Clone)]
pub struct DirManifestStore {
    root: PathBuf,
}

impl DirManifestStore {
    pub const DEFAULT_TAG: &'static str = "latest";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path for a model name.
    pub fn manifest_path(&self, name: &str) -> Result<PathBuf> {
        let (repo, tag) = split_tag(name);
        let mut path = self.root.clone();
        for segment in repo.split('/') {
            if segment.is_empty() || !is_local(segment) || segment.contains('\\') {
                return Err(LayerError::Other(format!("invalid model name: {name}")));
            }
            path.push(segment);
        }
        if !is_local(tag) || tag.contains('/') || tag.contains('\\') {
            return Err(LayerError::Other(format!("invalid model tag: {name}")));
        }
        path.push(tag);
        Ok(path)
    }

    /// Write a manifest atomically (temp file in the same directory, then rename).
    pub fn save(&self, name: &str, manifest: &Manifest) -> Result<()> {
        let path = self.manifest_path(name)?;
        let parent = path
            .parent()
            .ok_or_else(|| LayerError::Other(format!("invalid manifest path for {name}")))?;
        fs::create_dir_all(parent).map_err(|e| LayerError::io_with_path(e, parent))?;

        let serialized = serde_json::to_vec_pretty(manifest)?;
        let mut temp = tempfile::Builder::new()
            .prefix(".tmp_manifest_")
            .tempfile_in(parent)
            .map_err(|e| LayerError::io_with_path(e, parent))?;
        temp.write_all(&serialized)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| LayerError::io_with_path(e, temp.path()))?;
        temp.persist(&path)
            .map_err(|e| LayerError::io_with_path(e.error, &path))?;

        debug!("Saved manifest for {} to {}", name, path.display());
        Ok(())
    }
}

impl ManifestStore for DirManifestStore {
    fn lookup(&self, name: &str) -> Result<Manifest> {
        let path = self.manifest_path(name)?;
        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(LayerError::ManifestNotFound {
                    name: name.to_string(),
                })
            }
            Err(e) => return Err(LayerError::io_with_path(e, path)),
        };
        serde_json::from_slice(&contents).map_err(|e| LayerError::Json {
            message: format!("Failed to parse manifest {}: {}", path.display(), e),
            source: Some(e),
        })
    }
}

/// Split `repo:tag`, ignoring colons that belong to a registry port.
fn split_tag(name: &str) -> (&str, &str) {
    let last_slash = name.rfind('/').map_or(0, |i| i + 1);
    match name[last_slash..].rfind(':') {
        Some(i) => (&name[..last_slash + i], &name[last_slash + i + 1..]),
        None => (name, DirManifestStore::DEFAULT_TAG),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Manifest {
        Manifest::new(vec![
            ManifestLayer {
                media_type: MediaType::Model,
                digest: Digest::of_bytes(b"weights"),
                size: 7,
            },
            ManifestLayer {
                media_type: MediaType::from("application/vnd.ollama.image.license"),
                digest: Digest::of_bytes(b"MIT"),
                size: 3,
            },
        ])
    }

    #[test]
    fn test_split_tag() {
        assert_eq!(split_tag("llama3"), ("llama3", "latest"));
        assert_eq!(split_tag("library/llama3:8b"), ("library/llama3", "8b"));
        assert_eq!(
            split_tag("localhost:5000/llama3"),
            ("localhost:5000/llama3", "latest")
        );
    }

    #[test]
    fn test_save_then_lookup() {
        let dir = TempDir::new().unwrap();
        let store = DirManifestStore::new(dir.path());
        store.save("library/llama3:8b", &sample()).unwrap();

        assert!(dir.path().join("library/llama3/8b").is_file());
        let manifest = store.lookup("library/llama3:8b").unwrap();
        assert_eq!(manifest, sample());
    }

    #[test]
    fn test_missing_manifest_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = DirManifestStore::new(dir.path());
        let err = store.lookup("nothing").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_traversal_in_name_rejected() {
        let dir = TempDir::new().unwrap();
        let store = DirManifestStore::new(dir.path());
        assert!(store.manifest_path("../../etc/passwd").is_err());
        assert!(store.manifest_path("library/llama3:..").is_err());
        assert!(store.manifest_path("a//b").is_err());
    }

    #[test]
    fn test_manifest_json_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["schemaVersion"], 2);
        assert_eq!(json["layers"][0]["mediaType"], MediaType::MODEL);
        assert!(json["layers"][0]["digest"]
            .as_str()
            .unwrap()
            .starts_with("sha256:"));
    }
}
