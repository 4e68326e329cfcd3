//! Spreadsheet → flat ODS conversion through an external converter.
//!
//! The converter is blocking and slow (it boots an office suite), so the
//! default implementation runs it on the blocking thread pool.

use crate::error::InvoiceMergeError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// Produces a flat-text (markup) rendering of a spreadsheet.
#[async_trait]
pub trait SheetConverter: Send + Sync {
    /// Convert `input` into `out_dir` and return the produced file path.
    async fn convert(&self, input: &Path, out_dir: &Path) -> Result<PathBuf, InvoiceMergeError>;
}

/// [`SheetConverter`] driving LibreOffice via `soffice-auto`.
#[derive(Debug, Default, Clone)]
pub struct SofficeConverter {
    /// Explicit executable; located automatically when `None`.
    pub program: Option<PathBuf>,
}

#[async_trait]
impl SheetConverter for SofficeConverter {
    async fn convert(&self, input: &Path, out_dir: &Path) -> Result<PathBuf, InvoiceMergeError> {
        let input = input.to_path_buf();
        let out_dir = out_dir.to_path_buf();
        let program = self.program.clone();
        info!("Converting {} to flat ODS", input.display());

        let produced = tokio::task::spawn_blocking(move || match program {
            Some(p) => soffice_auto::convert_with(&p, &input, &out_dir),
            None => soffice_auto::convert_to_fods(&input, &out_dir),
        })
        .await
        .map_err(|e| InvoiceMergeError::Internal(format!("Converter task panicked: {}", e)))??;

        info!("Converted report written to {}", produced.display());
        Ok(produced)
    }
}
