//! Run lifecycle: one report in, one merged document out.
//!
//! ```text
//! Initializing ─▶ WorkspaceReady ─▶ RetrievalInProgress ─▶ Consolidating ─▶ CleanedUp
//!        │               │                    │                  │
//!        └───────────────┴────────────────────┴──────────────────┴────────▶ Retained
//! ```
//!
//! Any fatal error jumps straight to `Retained`: the workspace (downloads and
//! converted report) is left on disk and its path travels back in the
//! [`RunFailure`]. Only a run that reaches the end of `Consolidating` cleans up.

use crate::config::RunConfig;
use crate::consolidate::{self, Consolidated};
use crate::error::InvoiceMergeError;
use crate::invoice::pair_requests;
use crate::output::{RetrievalReport, RunReport};
use crate::pipeline::fetch::{Fetcher, HttpFetcher};
use crate::pipeline::links;
use crate::pipeline::merge::{LopdfMerger, Merger};
use crate::pipeline::report::{self, CalamineReader, ReportReader};
use crate::pipeline::sheet::{SheetConverter, SofficeConverter};
use crate::retrieve::{self, RetrievalTarget};
use crate::workspace::RunWorkspace;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStage {
    Initializing,
    WorkspaceReady,
    RetrievalInProgress,
    Consolidating,
    /// Terminal: everything succeeded and the workspace was removed.
    CleanedUp,
    /// Terminal: a fatal error occurred and the workspace was kept.
    Retained,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Initializing => "initializing",
            RunStage::WorkspaceReady => "workspace ready",
            RunStage::RetrievalInProgress => "retrieval",
            RunStage::Consolidating => "consolidation",
            RunStage::CleanedUp => "cleaned up",
            RunStage::Retained => "retained",
        };
        f.write_str(name)
    }
}

/// A fatal run error together with the diagnostic state it left behind.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct RunFailure {
    pub source: InvoiceMergeError,
    /// Stage that was active when the error occurred.
    pub failed_at: RunStage,
    /// The retained workspace, if one had been created.
    pub workspace: Option<PathBuf>,
    /// Download results, when the run got past retrieval.
    pub retrieval: Option<RetrievalReport>,
}

/// State threaded through one run.
pub(crate) struct RunContext<'a> {
    config: &'a RunConfig,
    stage: RunStage,
    workspace: Option<RunWorkspace>,
    retrieval: Option<RetrievalReport>,
    started: Instant,
}

impl<'a> RunContext<'a> {
    fn new(config: &'a RunConfig) -> Self {
        Self {
            config,
            stage: RunStage::Initializing,
            workspace: None,
            retrieval: None,
            started: Instant::now(),
        }
    }

    fn advance(&mut self, stage: RunStage) {
        debug!("Run stage: {} → {}", self.stage, stage);
        self.stage = stage;
    }

    /// Keep the workspace and turn `source` into a [`RunFailure`].
    fn retain(mut self, source: InvoiceMergeError) -> RunFailure {
        let failed_at = self.stage;
        self.advance(RunStage::Retained);
        let workspace = self.workspace.take().map(|w| w.path().to_path_buf());
        error!("Run failed during {}: {}", failed_at, source);
        if let Some(ref path) = workspace {
            info!("Workspace retained for inspection: {}", path.display());
        }
        RunFailure {
            source,
            failed_at,
            workspace,
            retrieval: self.retrieval.take(),
        }
    }

    /// Remove the workspace and build the final report.
    fn finish(mut self, merged: Consolidated) -> RunReport {
        let retrieval = self.retrieval.take().unwrap_or_default();
        let (workspace, cleaned_up) = match self.workspace.take() {
            Some(ws) => {
                let path = ws.path().to_path_buf();
                (path, ws.cleanup())
            }
            None => (PathBuf::new(), true),
        };
        self.advance(RunStage::CleanedUp);

        let total_duration_ms = self.started.elapsed().as_millis() as u64;
        info!(
            "Run complete in {}ms: {} → {}",
            total_duration_ms,
            retrieval.summary(),
            merged.output.display()
        );
        RunReport {
            output: merged.output,
            pages: merged.pages,
            retrieval,
            workspace,
            cleaned_up,
            total_duration_ms,
        }
    }
}

/// Retrieve every invoice listed in `report` and merge them into `destination`.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `report`: the spreadsheet exported by the reporting system
/// * `destination`: merged output path; the configured extension is
///   appended when it has none
///
/// # Returns
/// `Ok(RunReport)` when the merge succeeded, even if some invoices could not
/// be downloaded (see `report.retrieval.failures`).
///
/// # Errors
/// `Err(RunFailure)` for fatal errors only. The workspace is kept and its
/// path is in [`RunFailure::workspace`].
pub async fn run(
    report: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    config: &RunConfig,
) -> Result<RunReport, RunFailure> {
    let mut ctx = RunContext::new(config);
    match execute(&mut ctx, report.as_ref(), destination.as_ref()).await {
        Ok(merged) => Ok(ctx.finish(merged)),
        Err(e) => Err(ctx.retain(e)),
    }
}

/// Synchronous wrapper around [`run`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_sync(
    report: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    config: &RunConfig,
) -> Result<RunReport, RunFailure> {
    let runtime = tokio::runtime::Runtime::new().map_err(|e| RunFailure {
        source: InvoiceMergeError::Internal(format!("Failed to create tokio runtime: {}", e)),
        failed_at: RunStage::Initializing,
        workspace: None,
        retrieval: None,
    })?;
    runtime.block_on(run(report, destination, config))
}

async fn execute(
    ctx: &mut RunContext<'_>,
    report_path: &Path,
    destination: &Path,
) -> Result<Consolidated, InvoiceMergeError> {
    let config = ctx.config;

    // ── Step 1: Validate input and output paths ─────────────────────────
    let input = resolve_report(report_path)?;
    let destination = consolidate::resolve_destination(destination, &config.file_extension)?;
    info!("Report: {}", input.display());
    info!("Output: {}", destination.display());

    // ── Step 2: Workspace ────────────────────────────────────────────────
    let workspace = RunWorkspace::create(&config.workspace_parent(), &config.workspace_naming)?;
    let work_dir = workspace.path().to_path_buf();
    ctx.workspace = Some(workspace);
    ctx.advance(RunStage::WorkspaceReady);
    consolidate::ensure_outside(&destination, &work_dir)?;

    let parts = resolve_collaborators(config)?;

    // ── Step 3: Identifiers from the spreadsheet ─────────────────────────
    let reader = Arc::clone(&parts.reader);
    let layout = config.layout;
    let sheet = input.clone();
    let ids = tokio::task::spawn_blocking(move || {
        report::read_identifiers(reader.as_ref(), &sheet, &layout)
    })
    .await
    .map_err(|e| InvoiceMergeError::Internal(format!("Report reader panicked: {}", e)))??;

    // ── Step 4: URLs from the flat rendering ─────────────────────────────
    let flat = parts.converter.convert(&input, &work_dir).await?;
    let urls = links::read_urls(&flat, &config.url_marker)?;

    // ── Step 5: Pair and download ────────────────────────────────────────
    let requests = pair_requests(ids, urls)?;
    ctx.advance(RunStage::RetrievalInProgress);
    let target = RetrievalTarget {
        dir: &work_dir,
        extension: &config.file_extension,
        concurrency: config.concurrency,
    };
    let retrieval = retrieve::retrieve(
        &requests,
        &target,
        &parts.fetcher,
        config.progress_callback.as_ref(),
    )
    .await;

    let files = retrieval.files.clone();
    let nothing = (retrieval.succeeded() == 0).then(|| InvoiceMergeError::NothingRetrieved {
        total: retrieval.attempted,
        first_error: retrieval
            .failures
            .first()
            .map(|f| f.error.to_string())
            .unwrap_or_else(|| "the report lists no invoices".to_string()),
    });
    ctx.retrieval = Some(retrieval);
    if let Some(e) = nothing {
        return Err(e);
    }

    // ── Step 6: Merge ────────────────────────────────────────────────────
    ctx.advance(RunStage::Consolidating);
    consolidate::consolidate(&files, &destination, &parts.merger).await
}

/// Check the report exists and make its path absolute.
fn resolve_report(path: &Path) -> Result<PathBuf, InvoiceMergeError> {
    let not_found = || InvoiceMergeError::FileNotFound {
        path: path.to_path_buf(),
    };
    if !path.is_file() {
        return Err(not_found());
    }
    std::fs::canonicalize(path).map_err(|_| not_found())
}

struct Collaborators {
    fetcher: Arc<dyn Fetcher>,
    converter: Arc<dyn SheetConverter>,
    reader: Arc<dyn ReportReader>,
    merger: Arc<dyn Merger>,
}

/// Injected collaborators take priority; the rest fall back to the real
/// implementations.
fn resolve_collaborators(config: &RunConfig) -> Result<Collaborators, InvoiceMergeError> {
    let fetcher: Arc<dyn Fetcher> = match config.fetcher {
        Some(ref f) => Arc::clone(f),
        None => Arc::new(HttpFetcher::new(config.request_timeout_secs)?),
    };
    let converter: Arc<dyn SheetConverter> = match config.converter {
        Some(ref c) => Arc::clone(c),
        None => Arc::new(SofficeConverter::default()),
    };
    let reader: Arc<dyn ReportReader> = match config.report_reader {
        Some(ref r) => Arc::clone(r),
        None => Arc::new(CalamineReader),
    };
    let merger: Arc<dyn Merger> = match config.merger {
        Some(ref m) => Arc::clone(m),
        None => Arc::new(LopdfMerger),
    };
    Ok(Collaborators {
        fetcher,
        converter,
        reader,
        merger,
    })
}
