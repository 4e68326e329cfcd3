//! Retrieval coordinator: download every invoice under a concurrency bound.
//!
//! Downloads are best-effort. Each invoice either lands in the workspace as
//! `<id>.<ext>` or is recorded as a [`DownloadError`]; no single failure
//! cancels the others. The coordinator returns only after every transfer has
//! finished.

use crate::error::{DownloadError, InvoiceMergeError};
use crate::invoice::{pair_requests, InvoiceId, InvoiceRequest, InvoiceUrl};
use crate::output::{DownloadOutcome, RetrievalReport};
use crate::pipeline::fetch::Fetcher;
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where and how retrieved invoices are stored.
#[derive(Debug, Clone)]
pub struct RetrievalTarget<'a> {
    /// Directory every invoice is written into.
    pub dir: &'a Path,
    /// Extension appended to each identifier.
    pub extension: &'a str,
    /// Maximum simultaneously in-flight downloads.
    pub concurrency: usize,
}

/// Download every request, at most `target.concurrency` at a time.
///
/// Never fails as a whole: per-invoice errors end up in
/// [`RetrievalReport::failures`].
pub async fn retrieve(
    requests: &[InvoiceRequest],
    target: &RetrievalTarget<'_>,
    fetcher: &Arc<dyn Fetcher>,
    progress: Option<&ProgressCallback>,
) -> RetrievalReport {
    let start = Instant::now();
    let total = requests.len();
    info!(
        "Retrieving {} invoices into {} ({} at a time)",
        total,
        target.dir.display(),
        target.concurrency
    );
    if let Some(cb) = progress {
        cb.on_retrieval_start(total);
    }

    let outcomes: Vec<DownloadOutcome> = stream::iter(requests.iter().map(|request| {
        let fetcher = Arc::clone(fetcher);
        async move {
            if let Some(cb) = progress {
                cb.on_download_start(request.index, request.id.as_str());
            }
            let result = download_one(request, target, fetcher.as_ref()).await;
            match &result {
                Ok((path, bytes)) => {
                    debug!("[{}] {} → {} ({} bytes)", request.index, request.id, path.display(), bytes);
                    if let Some(cb) = progress {
                        cb.on_download_complete(request.index, request.id.as_str(), *bytes);
                    }
                }
                Err(e) => {
                    warn!("[{}] {} failed: {}", request.index, request.id, e);
                    if let Some(cb) = progress {
                        cb.on_download_error(request.index, request.id.as_str(), &e.to_string());
                    }
                }
            }
            DownloadOutcome {
                index: request.index,
                id: request.id.clone(),
                result: result.map(|(path, _)| path),
            }
        }
    }))
    .buffer_unordered(target.concurrency.max(1))
    .collect()
    .await;

    let report = RetrievalReport::from_outcomes(outcomes, start.elapsed().as_millis() as u64);
    info!("{}", report.summary());
    if let Some(cb) = progress {
        cb.on_retrieval_complete(total, report.succeeded());
    }
    report
}

/// Pair `ids` with `urls` by position, then [`retrieve`] them.
///
/// # Errors
/// [`InvoiceMergeError::CountMismatch`] when the lengths differ. Nothing is
/// fetched in that case.
pub async fn retrieve_pairs(
    ids: Vec<InvoiceId>,
    urls: Vec<InvoiceUrl>,
    target: &RetrievalTarget<'_>,
    fetcher: &Arc<dyn Fetcher>,
    progress: Option<&ProgressCallback>,
) -> Result<RetrievalReport, InvoiceMergeError> {
    let requests = pair_requests(ids, urls)?;
    Ok(retrieve(&requests, target, fetcher, progress).await)
}

async fn download_one(
    request: &InvoiceRequest,
    target: &RetrievalTarget<'_>,
    fetcher: &dyn Fetcher,
) -> Result<(PathBuf, u64), DownloadError> {
    let body = fetcher.fetch(&request.url).await?;
    let path = target.dir.join(request.id.file_name(target.extension));
    tokio::fs::write(&path, &body)
        .await
        .map_err(|e| DownloadError::Write {
            path: path.clone(),
            detail: e.to_string(),
        })?;
    Ok((path, body.len() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves `id=<n>` as the body `doc <n>`; the URL containing `fail` errors.
    #[derive(Default)]
    struct EchoFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for EchoFetcher {
        async fn fetch(&self, url: &InvoiceUrl) -> Result<Vec<u8>, DownloadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if url.as_str().contains("fail") {
                return Err(DownloadError::Status {
                    url: url.to_string(),
                    status: 500,
                });
            }
            Ok(format!("doc {}", url.as_str().rsplit('=').next().unwrap_or("")).into_bytes())
        }
    }

    fn requests(urls: &[&str]) -> Vec<InvoiceRequest> {
        let ids = (0..urls.len()).map(|i| InvoiceId::new(&format!("F/{i}"))).collect();
        let urls = urls.iter().map(|u| InvoiceUrl::parse(u).unwrap()).collect();
        pair_requests(ids, urls).unwrap()
    }

    #[tokio::test]
    async fn writes_each_body_to_its_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let echo = Arc::new(EchoFetcher::default());
        let fetcher: Arc<dyn Fetcher> = echo.clone();
        let target = RetrievalTarget {
            dir: dir.path(),
            extension: "pdf",
            concurrency: 2,
        };

        let reqs = requests(&["http://h/g?id=7", "http://h/g?id=8", "http://h/g?id=9"]);
        let report = retrieve(&reqs, &target, &fetcher, None).await;

        assert_eq!(report.succeeded(), 3);
        assert!(report.failures.is_empty());
        assert_eq!(echo.calls.load(Ordering::SeqCst), 3);
        let body = std::fs::read_to_string(dir.path().join("F-1.pdf")).unwrap();
        assert_eq!(body, "doc 8");
    }

    #[tokio::test]
    async fn write_failure_is_per_item() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher: Arc<dyn Fetcher> = Arc::new(EchoFetcher::default());
        let missing = dir.path().join("gone");
        let target = RetrievalTarget {
            dir: &missing,
            extension: "pdf",
            concurrency: 4,
        };

        let report = retrieve(&requests(&["http://h/g?id=1"]), &target, &fetcher, None).await;
        assert_eq!(report.succeeded(), 0);
        assert!(matches!(
            report.failures[0].error,
            DownloadError::Write { .. }
        ));
    }

    #[tokio::test]
    async fn mismatch_fetches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let echo = Arc::new(EchoFetcher::default());
        let fetcher: Arc<dyn Fetcher> = echo.clone();
        let target = RetrievalTarget {
            dir: dir.path(),
            extension: "pdf",
            concurrency: 4,
        };

        let err = retrieve_pairs(
            vec![InvoiceId::new("A"), InvoiceId::new("B")],
            vec![InvoiceUrl::parse("http://h/g?id=1").unwrap()],
            &target,
            &fetcher,
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, InvoiceMergeError::CountMismatch { ids: 2, urls: 1 }));
        assert_eq!(echo.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_row_is_omitted_and_order_kept() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher: Arc<dyn Fetcher> = Arc::new(EchoFetcher::default());
        let target = RetrievalTarget {
            dir: dir.path(),
            extension: "pdf",
            concurrency: 3,
        };

        let reqs = requests(&["http://h/g?id=1", "http://h/fail?id=2", "http://h/g?id=3"]);
        let report = retrieve(&reqs, &target, &fetcher, None).await;

        assert_eq!(report.attempted, 3);
        assert_eq!(
            report.files,
            vec![dir.path().join("F-0.pdf"), dir.path().join("F-2.pdf")]
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id.as_str(), "F-1");
    }
}
