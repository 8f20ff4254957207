//! Secure zip extraction into a scratch directory.

use std::fs::{self, File};
use std::io::{self, Read, Seek};
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::cancel::{CancelAwareReader, CancellationToken};
use crate::error::{LayerError, Result};

/// Whether `name` stays inside whatever directory it is joined onto.
///
/// Purely lexical: rejects empty names, absolute paths, drive prefixes and
/// any `..` that climbs above the starting point. Backslashes count as
/// separators so archives built on Windows are held to the same rule.
pub fn is_local(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let normalized = name.replace('\\', "/");
    if normalized.starts_with('/') {
        return false;
    }

    let mut depth = 0usize;
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    // A Windows drive letter is a normal component on unix.
    !normalized
        .split('/')
        .next()
        .is_some_and(|first| first.len() == 2 && first.ends_with(':'))
}

/// Extract every entry of a zip archive under `dest`.
///
/// Fails on the first entry whose name would escape `dest`; nothing is
/// skipped silently. Returns the number of files written. Partially
/// extracted content is left for the caller, which owns `dest`.
pub fn extract_zip<R: Read + Seek>(
    dest: &Path,
    reader: R,
    cancel: &CancellationToken,
) -> Result<usize> {
    let mut archive = zip::ZipArchive::new(reader).map_err(|e| LayerError::Archive {
        message: format!("Invalid zip archive: {}", e),
        source: Some(e),
    })?;

    let mut files = 0;
    for i in 0..archive.len() {
        cancel.check()?;
        let mut entry = archive.by_index(i).map_err(|e| LayerError::Archive {
            message: format!("Failed to read zip entry {}: {}", i, e),
            source: Some(e),
        })?;

        let name = entry.name().to_string();
        if !is_local(&name) {
            return Err(LayerError::InsecurePath { entry: name });
        }
        let outpath: PathBuf = dest.join(name.replace('\\', "/"));

        if entry.is_dir() {
            fs::create_dir_all(&outpath).map_err(|e| LayerError::io_with_path(e, &outpath))?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent).map_err(|e| LayerError::io_with_path(e, parent))?;
        }

        let mut outfile =
            File::create(&outpath).map_err(|e| LayerError::io_with_path(e, &outpath))?;
        let mut source = CancelAwareReader::new(&mut entry, cancel.clone());
        io::copy(&mut source, &mut outfile).map_err(|e| LayerError::io_with_path(e, &outpath))?;
        files += 1;
    }

    debug!("Extracted {} files into {}", files, dest.display());
    Ok(files)
}
