//! Zip checkpoint import: extract, convert, store one model layer.

use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use super::{blocking, enter, ImportStage, Importer, ImporterInner, Origin};
use crate::archive::extract_zip;
use crate::cancel::CancellationToken;
use crate::digest::digest_file;
use crate::error::{LayerError, Result};
use crate::ggml::decode_document;
use crate::ggml::source::{SectionReader, SharedSource};
use crate::layer::{ImportedLayer, Layer, MediaType};
use crate::progress::{report, ProgressFn};

impl Importer {
    /// Convert a zip-packaged checkpoint into a single model layer.
    ///
    /// Conversions are memoized by source digest, so importing the same
    /// archive again, or concurrently, runs the converter once.
    pub(super) async fn parse_zip(
        &self,
        src: SharedSource,
        origin: Origin,
        label: &str,
        progress: ProgressFn,
        cancel: &CancellationToken,
    ) -> Result<ImportedLayer> {
        let (source_digest, scratch_dir) = match origin {
            Origin::Blob(digest) => (digest, self.inner.config.scratch_dir_for(None)),
            Origin::File(path) => {
                let scratch_dir = self.inner.config.scratch_dir_for(Some(&path));
                let token = cancel.clone();
                let (digest, _) = blocking(move || digest_file(&path, &token)).await?;
                (digest, scratch_dir)
            }
        };

        let mut produced: Option<Layer> = None;
        let slot = &mut produced;
        let inner = self.inner.clone();
        let convert_src = src.clone();
        let convert_label = label.to_string();
        let convert_progress = progress.clone();
        let convert_cancel = cancel.clone();
        let (layer_digest, cached) = self
            .inner
            .cache
            .get_or_convert(&source_digest, move || async move {
                let layer = blocking(move || {
                    convert(
                        &inner,
                        convert_src,
                        scratch_dir,
                        &convert_label,
                        &convert_progress,
                        &convert_cancel,
                    )
                })
                .await?;
                let digest = layer.digest.clone();
                *slot = Some(layer);
                Ok(digest)
            })
            .await?;

        let store = self.inner.store.clone();
        let config = self.inner.config.clone();
        let open_digest = layer_digest.clone();
        let (doc, size) = blocking(move || {
            let blob = store.open(&open_digest)?;
            let size = blob.size()?;
            let doc = decode_document(blob.as_ref(), 0, &config)?.ok_or_else(|| {
                LayerError::Conversion {
                    message: format!("converter produced an empty layer {}", open_digest),
                }
            })?;
            Ok((doc, size))
        })
        .await?;

        let layer = match produced {
            Some(layer) => layer,
            None => {
                let status = format!("using existing layer {}", layer_digest);
                let layer = Layer::new(MediaType::Model, layer_digest, size).with_status(status);
                if let Some(status) = &layer.status {
                    report(&progress, status.clone());
                }
                layer
            }
        };
        if cached {
            info!("Reused converted layer {} for {}", layer.digest, label);
        }

        Ok(ImportedLayer::with_metadata(layer, doc))
    }
}

/// Extract and convert inside a scratch directory that is removed on every
/// exit path, then store the converted document.
fn convert(
    inner: &Arc<ImporterInner>,
    src: SharedSource,
    scratch_dir: PathBuf,
    label: &str,
    progress: &ProgressFn,
    cancel: &CancellationToken,
) -> Result<Layer> {
    let converter = inner.converter.as_ref().ok_or_else(|| LayerError::Conversion {
        message: "no checkpoint converter configured".into(),
    })?;

    let scratch = tempfile::Builder::new()
        .prefix(&inner.config.scratch_prefix)
        .tempdir_in(&scratch_dir)
        .map_err(|e| LayerError::io_with_path(e, &scratch_dir))?;

    enter(ImportStage::Extracting, label);
    report(progress, "unpacking model metadata");
    let archive = SectionReader::whole(src)?;
    extract_zip(scratch.path(), archive, cancel)?;

    let mut arch = converter.open(scratch.path())?;
    let params = arch.params();
    info!(
        "Converting {} checkpoint ({} tokens) from {}",
        params.architecture().unwrap_or("unknown"),
        params.vocab_size.map_or_else(|| "?".to_string(), |n| n.to_string()),
        label
    );
    report(progress, "processing tensors");
    arch.load_tensors()?;
    arch.load_vocab()?;
    cancel.check()?;

    report(progress, "converting model");
    let mut converted = tempfile::Builder::new()
        .prefix(&inner.config.scratch_prefix)
        .suffix(".gguf")
        .tempfile_in(scratch.path())
        .map_err(|e| LayerError::io_with_path(e, scratch.path()))?;
    {
        let mut out = BufWriter::new(converted.as_file_mut());
        arch.write_gguf(&mut out)?;
        out.flush()?;
    }
    converted.as_file_mut().seek(SeekFrom::Start(0))?;

    enter(ImportStage::Materializing, label);
    let layer = inner
        .materializer
        .materialize(converted.as_file_mut(), MediaType::Model, cancel)?;
    if let Some(status) = &layer.status {
        report(progress, status.clone());
    }
    Ok(layer)
}
