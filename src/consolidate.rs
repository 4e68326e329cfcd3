//! Consolidation: merge the retrieved invoices into one document.
//!
//! Inputs are deleted only after the merger reports success. A failed merge
//! leaves every individual file where it was.

use crate::error::InvoiceMergeError;
use crate::pipeline::merge::Merger;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The merged document produced by [`consolidate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consolidated {
    pub output: PathBuf,
    pub pages: usize,
}

/// Append `.ext` when `destination` has no extension.
pub fn destination_with_extension(destination: &Path, extension: &str) -> PathBuf {
    if destination.extension().is_some() {
        destination.to_path_buf()
    } else {
        destination.with_extension(extension)
    }
}

/// Normalise `destination` and check it can be written to.
///
/// # Errors
/// [`InvoiceMergeError::InvalidDestination`] when the path has no file name
/// or its parent directory does not exist.
pub fn resolve_destination(
    destination: &Path,
    extension: &str,
) -> Result<PathBuf, InvoiceMergeError> {
    let invalid = |reason: &str| InvoiceMergeError::InvalidDestination {
        path: destination.to_path_buf(),
        reason: reason.to_string(),
    };

    if destination.file_name().is_none() {
        return Err(invalid("no file name"));
    }
    let path = destination_with_extension(destination, extension);
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(invalid("parent directory does not exist"))
        }
        _ => Ok(path),
    }
}

/// Reject a `destination` that would land inside `workspace`, which is
/// removed once the run succeeds.
///
/// # Errors
/// [`InvoiceMergeError::InvalidDestination`] when the destination's directory
/// is the workspace or below it, or no longer exists.
pub fn ensure_outside(destination: &Path, workspace: &Path) -> Result<(), InvoiceMergeError> {
    let invalid = |reason: String| InvoiceMergeError::InvalidDestination {
        path: destination.to_path_buf(),
        reason,
    };

    let parent = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let parent = std::fs::canonicalize(parent)
        .map_err(|e| invalid(format!("parent directory unavailable: {e}")))?;
    let workspace = std::fs::canonicalize(workspace)
        .map_err(|e| invalid(format!("workspace unavailable: {e}")))?;

    if parent.starts_with(&workspace) {
        return Err(invalid(format!(
            "inside the run workspace {}, which is removed after the run",
            workspace.display()
        )));
    }
    Ok(())
}

/// Merge `files` in order into `destination`, then delete them.
///
/// Deletion and removal of the emptied directory are best-effort.
pub async fn consolidate(
    files: &[PathBuf],
    destination: &Path,
    merger: &Arc<dyn Merger>,
) -> Result<Consolidated, InvoiceMergeError> {
    if files.is_empty() {
        return Err(InvoiceMergeError::MergeFailed {
            path: destination.to_path_buf(),
            detail: "no documents to merge".to_string(),
        });
    }

    info!("Merging {} invoices into {}", files.len(), destination.display());
    let merger = Arc::clone(merger);
    let inputs = files.to_vec();
    let output = destination.to_path_buf();
    let pages = tokio::task::spawn_blocking(move || merger.merge(&inputs, &output))
        .await
        .map_err(|e| InvoiceMergeError::Internal(format!("Merge task panicked: {}", e)))??;

    remove_inputs(files);

    Ok(Consolidated {
        output: destination.to_path_buf(),
        pages,
    })
}

fn remove_inputs(files: &[PathBuf]) {
    let mut dirs = BTreeSet::new();
    for file in files {
        if let Err(e) = std::fs::remove_file(file) {
            warn!("Cannot remove {}: {}", file.display(), e);
        }
        if let Some(dir) = file.parent() {
            dirs.insert(dir.to_path_buf());
        }
    }
    for dir in dirs {
        // Fails while the directory still holds other run files.
        match std::fs::remove_dir(&dir) {
            Ok(()) => debug!("Removed {}", dir.display()),
            Err(e) => debug!("Kept {}: {}", dir.display(), e),
        }
    }
}
