//! Configuration types for an invoice retrieval run.
//!
//! All run behaviour is controlled through [`RunConfig`], built via its
//! [`RunConfigBuilder`]. The external collaborators (HTTP fetcher,
//! spreadsheet converter, report reader, PDF merger) can be injected
//! pre-built; when absent the run driver falls back to the real
//! implementations.

use crate::error::InvoiceMergeError;
use crate::pipeline::fetch::Fetcher;
use crate::pipeline::merge::Merger;
use crate::pipeline::report::ReportReader;
use crate::pipeline::sheet::SheetConverter;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default substring identifying invoice-download links in the flat report.
///
/// The converter keeps the `&` of the query string entity-escaped.
pub const DEFAULT_URL_MARKER: &str = "/files/get?type=invoice&amp;id=";

/// Configuration for one run.
///
/// # Example
/// ```rust
/// use invoice_merge::RunConfig;
///
/// let config = RunConfig::builder()
///     .concurrency(10)
///     .request_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 10);
/// ```
#[derive(Clone)]
pub struct RunConfig {
    /// Maximum number of simultaneously in-flight downloads. Default: 30.
    ///
    /// Keeps the report server and the local file-descriptor table from being
    /// overwhelmed on reports with hundreds of rows.
    pub concurrency: usize,

    /// Per-request timeout in seconds. Default: 120.
    ///
    /// A hung peer only fails its own invoice; the rest of the batch is
    /// unaffected.
    pub request_timeout_secs: u64,

    /// Where the identifiers live in the spreadsheet.
    pub layout: ReportLayout,

    /// Substring a flat-report line must contain to be scanned for a URL.
    pub url_marker: String,

    /// Parent directory of the run workspace. Default: the OS temp dir.
    pub workspace_root: Option<PathBuf>,

    /// How the run workspace is named. Default: fixed name, wiped on start.
    pub workspace_naming: WorkspaceNaming,

    /// Extension of the downloaded and merged documents. Default: `pdf`.
    pub file_extension: String,

    /// Pre-constructed HTTP fetcher. Takes precedence over the reqwest default.
    pub fetcher: Option<Arc<dyn Fetcher>>,

    /// Pre-constructed spreadsheet converter. Default: LibreOffice.
    pub converter: Option<Arc<dyn SheetConverter>>,

    /// Pre-constructed spreadsheet reader. Default: calamine.
    pub report_reader: Option<Arc<dyn ReportReader>>,

    /// Pre-constructed document merger. Default: lopdf.
    pub merger: Option<Arc<dyn Merger>>,

    /// Receives per-download progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 30,
            request_timeout_secs: 120,
            layout: ReportLayout::default(),
            url_marker: DEFAULT_URL_MARKER.to_string(),
            workspace_root: None,
            workspace_naming: WorkspaceNaming::default(),
            file_extension: "pdf".to_string(),
            fetcher: None,
            converter: None,
            report_reader: None,
            merger: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("concurrency", &self.concurrency)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("layout", &self.layout)
            .field("url_marker", &self.url_marker)
            .field("workspace_root", &self.workspace_root)
            .field("workspace_naming", &self.workspace_naming)
            .field("file_extension", &self.file_extension)
            .field("fetcher", &self.fetcher.as_ref().map(|_| "<dyn Fetcher>"))
            .field("converter", &self.converter.as_ref().map(|_| "<dyn SheetConverter>"))
            .field("report_reader", &self.report_reader.as_ref().map(|_| "<dyn ReportReader>"))
            .field("merger", &self.merger.as_ref().map(|_| "<dyn Merger>"))
            .finish()
    }
}

impl RunConfig {
    /// Create a new builder for `RunConfig`.
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder {
            config: Self::default(),
        }
    }

    /// Directory the workspace is created in.
    pub fn workspace_parent(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Builder for [`RunConfig`].
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl fmt::Debug for RunConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl RunConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn layout(mut self, layout: ReportLayout) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn url_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.url_marker = marker.into();
        self
    }

    pub fn workspace_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.workspace_root = Some(dir.into());
        self
    }

    pub fn workspace_naming(mut self, naming: WorkspaceNaming) -> Self {
        self.config.workspace_naming = naming;
        self
    }

    pub fn file_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.file_extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.config.fetcher = Some(fetcher);
        self
    }

    pub fn converter(mut self, converter: Arc<dyn SheetConverter>) -> Self {
        self.config.converter = Some(converter);
        self
    }

    pub fn report_reader(mut self, reader: Arc<dyn ReportReader>) -> Self {
        self.config.report_reader = Some(reader);
        self
    }

    pub fn merger(mut self, merger: Arc<dyn Merger>) -> Self {
        self.config.merger = Some(merger);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RunConfig, InvoiceMergeError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(InvoiceMergeError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.request_timeout_secs == 0 {
            return Err(InvoiceMergeError::InvalidConfig(
                "Request timeout must be ≥ 1 second".into(),
            ));
        }
        if c.url_marker.is_empty() {
            return Err(InvoiceMergeError::InvalidConfig(
                "URL marker must not be empty".into(),
            ));
        }
        if c.file_extension.is_empty() {
            return Err(InvoiceMergeError::InvalidConfig(
                "File extension must not be empty".into(),
            ));
        }
        if let WorkspaceNaming::Fixed(name) | WorkspaceNaming::Timestamped(name) =
            &c.workspace_naming
        {
            if !crate::workspace::is_single_component(name) {
                return Err(InvoiceMergeError::InvalidConfig(format!(
                    "Workspace name must be a single path component, got {name:?}"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Report layout ────────────────────────────────────────────────────────

/// Position of the identifier data inside the spreadsheet's first sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportLayout {
    /// Leading metadata rows that never hold invoices. Default: 4.
    pub header_rows: usize,
    /// Zero-based column holding the invoice identifier. Default: 8 (column I).
    pub id_column: usize,
}

impl Default for ReportLayout {
    fn default() -> Self {
        Self {
            header_rows: 4,
            id_column: 8,
        }
    }
}

// ── Workspace naming ─────────────────────────────────────────────────────

/// How the per-run scratch directory is named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkspaceNaming {
    /// Always the same directory; residue from a crashed run is wiped first.
    Fixed(String),
    /// `<prefix>_<YYYYMMDD-HHMMSS>`; leftovers of earlier runs are left alone.
    Timestamped(String),
}

impl Default for WorkspaceNaming {
    fn default() -> Self {
        WorkspaceNaming::Fixed("fattureSanRossore".to_string())
    }
}
