//! # invoice-merge
//!
//! Download every invoice listed in a spreadsheet report and merge them into
//! a single PDF for review.
//!
//! The report is exported by a clinic's billing system. Its first sheet lists
//! one invoice per row (identifier in column I, after four metadata rows) and
//! the invoice download links are hyperlinks in the same rows. The links are
//! not visible as cell values, so the report is also converted to flat ODS
//! and the links are scanned from that text.
//!
//! ## Pipeline Overview
//!
//! ```text
//! report.xls
//!  │
//!  ├─ 1. Identifiers  first sheet, column I, skipping the header rows
//!  ├─ 2. Convert      LibreOffice → report.fods (spawn_blocking)
//!  ├─ 3. URLs         line scan of the flat ODS for invoice links
//!  ├─ 4. Pair         identifiers[i] ↔ urls[i], count mismatch is fatal
//!  ├─ 5. Retrieve     concurrent GETs, bounded, failures are per invoice
//!  └─ 6. Merge        lopdf concatenation, inputs removed on success
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use invoice_merge::{run, RunConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RunConfig::default();
//!     let report = run("marzo.xls", "marzo-fatture.pdf", &config).await?;
//!     println!("{}", report.retrieval.summary());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoice-merge` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod consolidate;
pub mod error;
pub mod invoice;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod retrieve;
pub mod run;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ReportLayout, RunConfig, RunConfigBuilder, WorkspaceNaming, DEFAULT_URL_MARKER};
pub use consolidate::{consolidate, Consolidated};
pub use error::{DownloadError, InvoiceMergeError};
pub use invoice::{pair_requests, InvoiceId, InvoiceRequest, InvoiceUrl};
pub use output::{DownloadOutcome, FailedDownload, RetrievalReport, RunReport};
pub use pipeline::fetch::{Fetcher, HttpFetcher};
pub use pipeline::merge::{LopdfMerger, Merger};
pub use pipeline::report::{CalamineReader, ReportReader};
pub use pipeline::sheet::{SheetConverter, SofficeConverter};
pub use progress::{NoopProgressCallback, ProgressCallback, RetrievalProgressCallback};
pub use retrieve::{retrieve, retrieve_pairs, RetrievalTarget};
pub use run::{run, run_sync, RunFailure, RunStage};
pub use workspace::RunWorkspace;
