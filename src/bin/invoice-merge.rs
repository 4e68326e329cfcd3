//! CLI binary for invoice-merge.
//!
//! A thin shim over the library crate that maps CLI flags to `RunConfig`,
//! sets up logging to the terminal and to a run log file, and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use invoice_merge::{
    run, ProgressCallback, RetrievalProgressCallback, RunConfig, RunFailure, RunReport,
    WorkspaceNaming, DEFAULT_URL_MARKER,
};
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Default run log name, created in the OS temp dir.
const LOG_FILE_NAME: &str = "log_invoice_merge.log";

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one line per invoice.
/// Downloads finish out of order, so per-invoice timings are keyed by row.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_retrieval_start` tells us the invoice count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading report…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} invoices  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Downloading");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl RetrievalProgressCallback for CliProgressCallback {
    fn on_retrieval_start(&self, total: usize) {
        self.activate_bar(total);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Downloading {total} invoices…"))
        ));
    }

    fn on_download_start(&self, index: usize, id: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(id.to_string());
    }

    fn on_download_complete(&self, index: usize, id: &str, bytes: u64) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:<24}  {:<12}  {}",
            green("✓"),
            id,
            dim(&format!("{:>7} KiB", bytes / 1024)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_download_error(&self, index: usize, id: &str, error: &str) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:<24}  {}  {}",
            red("✗"),
            id,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_retrieval_complete(&self, total: usize, succeeded: usize) {
        let failed = total.saturating_sub(succeeded);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} invoices downloaded",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} invoices downloaded  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Merge every invoice of a monthly report
  invoice-merge marzo.xls -o marzo-fatture.pdf

  # Gentler on the report server
  invoice-merge marzo.xls -o marzo.pdf --concurrency 8 --timeout 60

  # Keep earlier workspaces around, open the result when done
  invoice-merge marzo.xls -o marzo.pdf --timestamped --open

  # Machine-readable run report
  invoice-merge marzo.xls -o marzo.pdf --json > run.json

ENVIRONMENT VARIABLES:
  SOFFICE_PATH                 Path to the LibreOffice `soffice` executable
  INVOICE_MERGE_CONCURRENCY    Default for --concurrency
  INVOICE_MERGE_TIMEOUT        Default for --timeout
  INVOICE_MERGE_WORKSPACE_DIR  Default for --workspace-dir
  INVOICE_MERGE_LOG_FILE       Default for --log-file
  RUST_LOG                     Log filter, overrides --verbose/--quiet

FAILURES:
  When a run fails, the downloaded invoices and the converted report are
  kept in the workspace directory, and both the workspace and the log file
  paths are printed. Fix the problem and run again; a fixed-name workspace
  is wiped at the start of the next run.
"#;

/// Download the invoices listed in a report and merge them into one PDF.
#[derive(Parser, Debug)]
#[command(
    name = "invoice-merge",
    version,
    about = "Download the invoices listed in a spreadsheet report and merge them into one PDF",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Spreadsheet report (.xls, .xlsx, .ods).
    report: PathBuf,

    /// Merged output file; `.pdf` is appended when it has no extension.
    #[arg(short, long, env = "INVOICE_MERGE_OUTPUT")]
    output: PathBuf,

    /// Maximum simultaneous downloads.
    #[arg(short, long, env = "INVOICE_MERGE_CONCURRENCY", default_value_t = 30)]
    concurrency: usize,

    /// Per-download timeout in seconds.
    #[arg(long, env = "INVOICE_MERGE_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Substring identifying invoice links in the converted report.
    #[arg(long, env = "INVOICE_MERGE_MARKER", default_value = DEFAULT_URL_MARKER)]
    marker: String,

    /// Parent directory of the run workspace (default: OS temp dir).
    #[arg(long, env = "INVOICE_MERGE_WORKSPACE_DIR")]
    workspace_dir: Option<PathBuf>,

    /// Use a time-stamped workspace instead of wiping a fixed one.
    #[arg(long, env = "INVOICE_MERGE_TIMESTAMPED")]
    timestamped: bool,

    /// Run log file (default: <tmp>/log_invoice_merge.log).
    #[arg(long, env = "INVOICE_MERGE_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Open the merged PDF in the system viewer when done.
    #[arg(long)]
    open: bool,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "INVOICE_MERGE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "INVOICE_MERGE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "INVOICE_MERGE_QUIET", conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The terminal gets errors only while the progress bar is active; the
    // log file always gets the full INFO trail.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let terminal_level = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    let file_level = if cli.verbose { "debug" } else { "info" };

    let log_path = cli
        .log_file
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join(LOG_FILE_NAME));
    let log_file = File::create(&log_path)
        .with_context(|| format!("Failed to create log file {}", log_path.display()))?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_filter(env_filter(terminal_level)),
        )
        .with(
            fmt::layer()
                .with_writer(Mutex::new(log_file))
                .with_ansi(false)
                .with_filter(env_filter(file_level)),
        )
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let cli_progress = show_progress.then(CliProgressCallback::new_dynamic);
    let progress_cb: Option<ProgressCallback> = cli_progress
        .clone()
        .map(|cb| cb as Arc<dyn RetrievalProgressCallback>);
    let config = build_config(&cli, progress_cb)?;

    // ── Run ──────────────────────────────────────────────────────────────
    match run(&cli.report, &cli.output, &config).await {
        Ok(report) => {
            print_success(&cli, &report)?;
            if cli.open {
                if let Err(e) = open_in_viewer(&report.output) {
                    tracing::warn!("Cannot open {}: {}", report.output.display(), e);
                }
            }
            eprintln!("{}", dim(&format!("log: {}", log_path.display())));
            Ok(())
        }
        Err(failure) => {
            print_failure(cli_progress.as_deref(), &failure, &log_path);
            std::process::exit(1);
        }
    }
}

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Map CLI args to `RunConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<RunConfig> {
    let naming = if cli.timestamped {
        WorkspaceNaming::Timestamped("fattureSanRossore".to_string())
    } else {
        WorkspaceNaming::default()
    };

    let mut builder = RunConfig::builder()
        .concurrency(cli.concurrency)
        .request_timeout_secs(cli.timeout)
        .url_marker(cli.marker.clone())
        .workspace_naming(naming);

    if let Some(ref dir) = cli.workspace_dir {
        builder = builder.workspace_root(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_success(cli: &Cli, report: &RunReport) -> Result<()> {
    if cli.json {
        let json = serde_json::to_string_pretty(report).context("Failed to serialise run report")?;
        println!("{json}");
    }

    if !cli.quiet {
        for failed in &report.retrieval.failures {
            eprintln!("   {} {}  {}", red("✗"), failed.id, dim(&failed.error.to_string()));
        }
        eprintln!(
            "{}  {} pages  {}ms  →  {}",
            if report.retrieval.failures.is_empty() {
                green("✔")
            } else {
                cyan("⚠")
            },
            report.pages,
            report.total_duration_ms,
            bold(&report.output.display().to_string()),
        );
        if !report.cleaned_up {
            eprintln!(
                "   {}",
                dim(&format!("workspace not fully removed: {}", report.workspace.display()))
            );
        }
    }
    eprintln!("{}", report.retrieval.summary());
    Ok(())
}

fn print_failure(progress: Option<&CliProgressCallback>, failure: &RunFailure, log_path: &Path) {
    // Still spinning when the run stops before retrieval starts.
    if let Some(cb) = progress {
        cb.bar.finish_and_clear();
    }
    for line in failure_lines(failure, log_path) {
        eprintln!("{line}");
    }
}

fn failure_lines(failure: &RunFailure, log_path: &Path) -> Vec<String> {
    let mut lines = vec![format!("{} {}", red("✘"), failure)];
    if let Some(ref retrieval) = failure.retrieval {
        lines.push(format!("   {}", retrieval.summary()));
    }
    if let Some(ref ws) = failure.workspace {
        lines.push(format!("   workspace kept: {}", bold(&ws.display().to_string())));
    }
    lines.push(format!("   log: {}", bold(&log_path.display().to_string())));
    lines
}

/// Launch the platform's default viewer; does not wait for it.
fn open_in_viewer(path: &Path) -> io::Result<()> {
    #[cfg(target_os = "windows")]
    let mut cmd = {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", ""]);
        c
    };
    #[cfg(target_os = "macos")]
    let mut cmd = Command::new("open");
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let mut cmd = Command::new("xdg-open");

    cmd.arg(path).spawn().map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use invoice_merge::{InvoiceMergeError, RetrievalReport, RunStage};

    fn failure(retrieval: Option<RetrievalReport>) -> RunFailure {
        RunFailure {
            source: InvoiceMergeError::Internal("merge broke".into()),
            failed_at: RunStage::Consolidating,
            workspace: Some(PathBuf::from("/tmp/fattureSanRossore")),
            retrieval,
        }
    }

    #[test]
    fn failure_lines_include_retrieval_summary() {
        let lines = failure_lines(
            &failure(Some(RetrievalReport::from_outcomes(Vec::new(), 0))),
            Path::new("/tmp/log_invoice_merge.log"),
        );
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("merge broke"));
        assert!(lines[1].contains("retrieved 0/0 invoices (scaricate 0/0 fatture)"));
        assert!(lines[2].contains("/tmp/fattureSanRossore"));
        assert!(lines[3].contains("log_invoice_merge.log"));
    }

    #[test]
    fn failure_lines_without_retrieval() {
        let lines = failure_lines(&failure(None), Path::new("run.log"));
        assert_eq!(lines.len(), 3);
        assert!(!lines.iter().any(|l| l.contains("retrieved")));
    }

    #[test]
    fn failure_before_retrieval_stops_spinner() {
        let cb = CliProgressCallback::new_dynamic();
        assert!(!cb.bar.is_finished());

        print_failure(Some(cb.as_ref()), &failure(None), Path::new("run.log"));

        assert!(cb.bar.is_finished());
    }
}
