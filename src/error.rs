//! Error types for the invoice-merge library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`InvoiceMergeError`] is **fatal**: the run cannot proceed at all
//!   (report unreadable, converter missing, identifier/URL count mismatch,
//!   merge failed). Returned as `Err(InvoiceMergeError)` from [`crate::run`]
//!   and the stage functions; the run driver retains the workspace.
//!
//! * [`DownloadError`] is **non-fatal**: a single invoice could not be
//!   retrieved. Stored inside [`crate::output::DownloadOutcome`] and counted
//!   in the [`crate::output::RetrievalReport`]; the run continues with
//!   whatever was retrieved.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the invoice-merge library.
///
/// Per-invoice failures use [`DownloadError`] and never surface here.
#[derive(Debug, Error)]
pub enum InvoiceMergeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Report file was not found at the given path.
    #[error("Report file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The spreadsheet could not be opened or parsed.
    #[error("Cannot open spreadsheet '{path}': {detail}")]
    ReportUnreadable { path: PathBuf, detail: String },

    /// The spreadsheet has no readable first sheet.
    #[error("Spreadsheet '{path}' has no readable sheet")]
    NoSheet { path: PathBuf },

    /// The external spreadsheet converter failed.
    #[error("Cannot convert '{path}' to flat ODS: {detail}")]
    ConversionFailed { path: PathBuf, detail: String },

    /// The converted flat-text report could not be read.
    #[error("Cannot read converted report '{path}': {source}")]
    UrlScanFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A link-bearing line of the converted report holds no usable URL.
    #[error("Line {line} of '{path}' looks like an invoice link but holds no valid URL")]
    MalformedLink { path: PathBuf, line: usize },

    // ── Correlation errors ────────────────────────────────────────────────
    /// Identifier and URL sequences have different lengths.
    #[error(
        "Invoice count mismatch: {ids} identifiers but {urls} URLs found in the report.\n\
The URL extraction is out of sync with the report layout."
    )]
    CountMismatch { ids: usize, urls: usize },

    /// Every download failed; there is nothing to merge.
    #[error("None of the {total} invoices could be downloaded.\nFirst error: {first_error}")]
    NothingRetrieved { total: usize, first_error: String },

    // ── Workspace / output errors ─────────────────────────────────────────
    /// The scratch workspace could not be prepared.
    #[error("Cannot prepare workspace '{path}': {source}")]
    WorkspaceFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The destination path is unusable (no file name, missing parent).
    #[error("Invalid destination '{path}': {reason}")]
    InvalidDestination { path: PathBuf, reason: String },

    /// Merging the downloaded documents failed. Individual files are kept.
    #[error("Cannot merge invoices into '{path}': {detail}\nIndividual invoices were not removed.")]
    MergeFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<soffice_auto::SofficeError> for InvoiceMergeError {
    fn from(e: soffice_auto::SofficeError) -> Self {
        let path = match &e {
            soffice_auto::SofficeError::Failed { input, .. } => input.clone(),
            soffice_auto::SofficeError::MissingOutput { path } => path.clone(),
            _ => PathBuf::new(),
        };
        InvoiceMergeError::ConversionFailed {
            path,
            detail: e.to_string(),
        }
    }
}

/// A non-fatal error for a single invoice download.
///
/// Network errors, non-success HTTP status and local write errors are all
/// treated the same way: logged, counted, and excluded from the merge.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum DownloadError {
    /// The request could not be sent or the body could not be read.
    #[error("request to {url} failed: {detail}")]
    Transport { url: String, detail: String },

    /// The server answered with a non-success status.
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    /// The request exceeded the configured timeout.
    #[error("request to {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    /// The downloaded body could not be written to the workspace.
    #[error("cannot write {path}: {detail}")]
    Write { path: PathBuf, detail: String },
}
