//! Result types produced by retrieval and by a full run.

use crate::error::DownloadError;
use crate::invoice::InvoiceId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Result of one download, keyed by its report row position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadOutcome {
    pub index: usize,
    pub id: InvoiceId,
    pub result: Result<PathBuf, DownloadError>,
}

/// A download that did not make it into the merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedDownload {
    pub index: usize,
    pub id: InvoiceId,
    pub error: DownloadError,
}

/// Aggregate of a whole retrieval pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalReport {
    /// Number of invoices requested.
    pub attempted: usize,
    /// Successfully downloaded files, compacted (failed rows omitted).
    pub files: Vec<PathBuf>,
    /// One entry per failed row.
    pub failures: Vec<FailedDownload>,
    pub duration_ms: u64,
}

impl RetrievalReport {
    /// Compact per-row outcomes into a dense list of successful files.
    ///
    /// Outcomes may arrive in any order; files are kept in report row order.
    pub fn from_outcomes(mut outcomes: Vec<DownloadOutcome>, duration_ms: u64) -> Self {
        outcomes.sort_by_key(|o| o.index);
        let attempted = outcomes.len();
        let mut files = Vec::with_capacity(attempted);
        let mut failures = Vec::new();

        for outcome in outcomes {
            match outcome.result {
                Ok(path) => files.push(path),
                Err(error) => failures.push(FailedDownload {
                    index: outcome.index,
                    id: outcome.id,
                    error,
                }),
            }
        }

        Self {
            attempted,
            files,
            failures,
            duration_ms,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.files.len()
    }

    /// `retrieved N/M invoices (scaricate N/M fatture)`.
    pub fn summary(&self) -> String {
        format!(
            "retrieved {ok}/{total} invoices (scaricate {ok}/{total} fatture)",
            ok = self.succeeded(),
            total = self.attempted
        )
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// The merged document.
    pub output: PathBuf,
    /// Page count of the merged document.
    pub pages: usize,
    pub retrieval: RetrievalReport,
    /// The scratch directory used by the run (removed on success).
    pub workspace: PathBuf,
    /// Whether every cleanup step succeeded.
    pub cleaned_up: bool,
    pub total_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(index: usize, id: &str) -> DownloadOutcome {
        DownloadOutcome {
            index,
            id: InvoiceId::new(id),
            result: Ok(PathBuf::from(format!("/w/{id}.pdf"))),
        }
    }

    fn failed(index: usize, id: &str) -> DownloadOutcome {
        DownloadOutcome {
            index,
            id: InvoiceId::new(id),
            result: Err(DownloadError::Status {
                url: "http://h/x".into(),
                status: 500,
            }),
        }
    }

    #[test]
    fn compaction_drops_failures_and_restores_row_order() {
        let report =
            RetrievalReport::from_outcomes(vec![ok(2, "C"), failed(1, "B"), ok(0, "A")], 5);
        assert_eq!(report.attempted, 3);
        assert_eq!(
            report.files,
            vec![PathBuf::from("/w/A.pdf"), PathBuf::from("/w/C.pdf")]
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
    }

    #[test]
    fn summary_is_bilingual() {
        let report = RetrievalReport::from_outcomes(vec![ok(0, "A"), failed(1, "B")], 0);
        assert_eq!(
            report.summary(),
            "retrieved 1/2 invoices (scaricate 1/2 fatture)"
        );
    }
}
