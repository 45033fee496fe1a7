//! Progress-callback trait for per-page pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as a background worker processes each page.
//!
//! Callbacks are a push-side convenience (progress bars, logs). The durable
//! view of a job is always [`crate::executor::Pipeline::query_progress`],
//! which reads the persisted checkpoint and works across restarts.
//!
//! # Example
//!
//! ```rust
//! use pagewise::{PipelineProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, _job: &str, page_num: usize, total_pages: usize, _len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} done", page_num, total_pages);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline worker as it processes each page.
///
/// Implementations must be `Send + Sync`: workers run on the tokio runtime
/// and several jobs may report through the same callback concurrently. All
/// methods default to no-ops.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once when a worker starts (or resumes) a job.
    ///
    /// # Arguments
    /// * `job_id`      — the job's identity
    /// * `total_pages` — pages in the document
    /// * `resume_from` — first page this run will process (1-indexed)
    fn on_job_start(&self, job_id: &str, total_pages: usize, resume_from: usize) {
        let _ = (job_id, total_pages, resume_from);
    }

    /// Called before the first chunk of a page is transformed.
    fn on_page_start(&self, job_id: &str, page_num: usize, total_pages: usize) {
        let _ = (job_id, page_num, total_pages);
    }

    /// Called after a page is appended to the artifact and checkpointed.
    ///
    /// # Arguments
    /// * `output_len` — byte length of the page's translated text
    fn on_page_complete(&self, job_id: &str, page_num: usize, total_pages: usize, output_len: usize) {
        let _ = (job_id, page_num, total_pages, output_len);
    }

    /// Called when a page fails and the job is marked failed.
    fn on_page_error(&self, job_id: &str, page_num: usize, total_pages: usize, error: &str) {
        let _ = (job_id, page_num, total_pages, error);
    }

    /// Called once when the job reaches `completed`.
    fn on_job_complete(&self, job_id: &str, total_pages: usize) {
        let _ = (job_id, total_pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        resume_from: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl PipelineProgressCallback for TrackingCallback {
        fn on_job_start(&self, _job_id: &str, _total_pages: usize, resume_from: usize) {
            self.resume_from.store(resume_from, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _job_id: &str, _page: usize, _total: usize, _len: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _job_id: &str, _page: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_job_start("j", 5, 1);
        cb.on_page_start("j", 1, 5);
        cb.on_page_complete("j", 1, 5, 42);
        cb.on_page_error("j", 2, 5, "some error");
        cb.on_job_complete("j", 5);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_job_start("j", 3, 2);
        tracker.on_page_complete("j", 2, 3, 10);
        tracker.on_page_error("j", 3, 3, "timeout");

        assert_eq!(tracker.resume_from.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_job_start("j", 10, 1);
        cb.on_page_complete("j", 1, 10, 512);
    }
}
