//! The per-run scratch directory.
//!
//! A [`RunWorkspace`] is deliberately not a `TempDir`: nothing is removed on
//! drop. Only an explicit [`RunWorkspace::cleanup`] deletes it, so a failed
//! run leaves its downloads and converted report on disk for inspection.

use crate::config::WorkspaceNaming;
use crate::error::InvoiceMergeError;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Scratch directory holding the converted report and the downloads.
#[derive(Debug)]
pub struct RunWorkspace {
    path: PathBuf,
}

impl RunWorkspace {
    /// Create the workspace under `parent`.
    ///
    /// With [`WorkspaceNaming::Fixed`] any residue of an earlier run at the
    /// same path is wiped first. With [`WorkspaceNaming::Timestamped`] the
    /// directory must not exist yet.
    pub fn create(parent: &Path, naming: &WorkspaceNaming) -> Result<Self, InvoiceMergeError> {
        let fail = |path: &Path, source: std::io::Error| InvoiceMergeError::WorkspaceFailed {
            path: path.to_path_buf(),
            source,
        };

        let name = match naming {
            WorkspaceNaming::Fixed(name) | WorkspaceNaming::Timestamped(name) => name,
        };
        if !is_single_component(name) {
            return Err(InvoiceMergeError::InvalidConfig(format!(
                "Workspace name must be a single path component, got {name:?}"
            )));
        }

        std::fs::create_dir_all(parent).map_err(|e| fail(parent, e))?;

        let path = match naming {
            WorkspaceNaming::Fixed(name) => {
                let path = parent.join(name);
                if path.exists() {
                    info!("Removing leftover workspace {}", path.display());
                    std::fs::remove_dir_all(&path).map_err(|e| fail(&path, e))?;
                }
                std::fs::create_dir(&path).map_err(|e| fail(&path, e))?;
                path
            }
            WorkspaceNaming::Timestamped(prefix) => {
                let path = parent.join(timestamped_name(prefix));
                std::fs::create_dir(&path).map_err(|e| fail(&path, e))?;
                path
            }
        };

        debug!("Workspace ready at {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove everything left in the workspace, then the directory itself.
    ///
    /// Best-effort: failures are logged and reported as `false`, never raised.
    pub fn cleanup(self) -> bool {
        let entries = match std::fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return true,
            Err(e) => {
                warn!("Cannot list workspace {}: {}", self.path.display(), e);
                return false;
            }
        };

        let mut clean = true;
        for entry in entries.flatten() {
            let path = entry.path();
            let removed = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            if let Err(e) = removed {
                warn!("Cannot remove {}: {}", path.display(), e);
                clean = false;
            }
        }

        if let Err(e) = std::fs::remove_dir(&self.path) {
            warn!("Cannot remove workspace {}: {}", self.path.display(), e);
            clean = false;
        } else {
            info!("Removed workspace {}", self.path.display());
        }
        clean
    }
}

/// True when `name` names exactly one ordinary directory entry: not empty,
/// not `.` or `..`, no separators.
pub(crate) fn is_single_component(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// `<prefix>_<YYYYMMDD-HHMMSS>` in local time.
pub fn timestamped_name(prefix: &str) -> String {
    format!("{}_{}", prefix, chrono::Local::now().format("%Y%m%d-%H%M%S"))
}
