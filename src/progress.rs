//! Progress-callback trait for per-invoice retrieval events.
//!
//! Inject an [`Arc<dyn RetrievalProgressCallback>`] via
//! [`crate::config::RunConfigBuilder::progress_callback`] to receive events as
//! the retrieval coordinator works through the report.
//!
//! # Example
//!
//! ```rust
//! use invoice_merge::{RetrievalProgressCallback, RunConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl RetrievalProgressCallback for CountingCallback {
//!     fn on_download_complete(&self, index: usize, id: &str, bytes: u64) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("row {index}: {id} ({bytes} bytes)");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = RunConfig::builder()
//!     .progress_callback(counter as Arc<dyn RetrievalProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the retrieval coordinator as it processes each invoice.
///
/// Downloads run concurrently, so `on_download_start`,
/// `on_download_complete` and `on_download_error` may arrive in any order.
/// Implementations must protect shared mutable state (`Mutex`, atomics).
/// All methods default to no-ops.
pub trait RetrievalProgressCallback: Send + Sync {
    /// Called once before the first download starts.
    fn on_retrieval_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when a download acquires its concurrency slot.
    ///
    /// # Arguments
    /// * `index`: zero-based report row position
    /// * `id`   : sanitised invoice identifier
    fn on_download_start(&self, index: usize, id: &str) {
        let _ = (index, id);
    }

    /// Called when an invoice has been written to the workspace.
    fn on_download_complete(&self, index: usize, id: &str, bytes: u64) {
        let _ = (index, id, bytes);
    }

    /// Called when an invoice could not be retrieved.
    fn on_download_error(&self, index: usize, id: &str, error: &str) {
        let _ = (index, id, error);
    }

    /// Called once after every download has finished.
    fn on_retrieval_complete(&self, total: usize, succeeded: usize) {
        let _ = (total, succeeded);
    }
}

/// A no-op implementation, the default when no callback is configured.
pub struct NoopProgressCallback;

impl RetrievalProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::RunConfig`].
pub type ProgressCallback = Arc<dyn RetrievalProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        succeeded: AtomicUsize,
    }

    impl RetrievalProgressCallback for TrackingCallback {
        fn on_download_start(&self, _index: usize, _id: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_download_complete(&self, _index: usize, _id: &str, _bytes: u64) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_download_error(&self, _index: usize, _id: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_retrieval_complete(&self, _total: usize, succeeded: usize) {
            self.succeeded.store(succeeded, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_retrieval_start(3);
        cb.on_download_start(0, "A");
        cb.on_download_complete(0, "A", 10);
        cb.on_download_error(1, "B", "HTTP 500");
        cb.on_retrieval_complete(3, 2);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_download_start(0, "A");
        tracker.on_download_complete(0, "A", 100);
        tracker.on_download_start(1, "B");
        tracker.on_download_error(1, "B", "timeout");
        tracker.on_retrieval_complete(2, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.succeeded.load(Ordering::SeqCst), 1);
    }
}
