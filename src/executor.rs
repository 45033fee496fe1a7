//! Job execution: submit a document, translate it page by page in the
//! background, resume where a previous run stopped.
//!
//! [`Pipeline::submit`] returns as soon as the job's checkpoint is resolved.
//! The pages themselves are processed by one tokio task per job:
//!
//! ```text
//! for page in next_page..=total:
//!     split ──▶ per chunk: cache.get ─miss─▶ retrying transform ──▶ cache.put
//!           ──▶ join ──▶ artifact.append_section ──▶ checkpoint.record_page_complete
//! record_terminal(completed)
//! ```
//!
//! A page is done only once its checkpoint write has succeeded. If a chunk
//! still fails after all retries, or progress cannot be persisted, the job is
//! recorded as `failed` with the page number and the checkpoint stays at the
//! last good page. Resubmitting the same document reopens the job and
//! continues from there; chunks translated during the failed run are served
//! from the result cache.
//!
//! At most one worker runs per job id. The claim is taken atomically at
//! submission and released when the worker task ends, so a second submission
//! for a running job only attaches to its progress.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::document::Document;
use crate::error::{PipelineError, TransformError};
use crate::pipeline::artifact::{read_artifact, ArtifactWriter};
use crate::pipeline::cache::{DiskResultCache, ResultCache};
use crate::pipeline::checkpoint::{Checkpoint, CheckpointStore, JobFailure, JobStatus, Progress};
use crate::pipeline::chunk::{self, Chunk};
use crate::pipeline::identity::{content_hash, identify, JobId};
use crate::pipeline::retry::{RetryPolicy, RetryingTransform};
use crate::transform::Transform;

/// Outcome of [`Pipeline::submit`].
#[derive(Debug)]
pub enum Submission {
    /// The job finished in an earlier run; nothing was reprocessed.
    AlreadyCompleted(Checkpoint),
    /// A worker was started.
    Started {
        handle: JobHandle,
        /// First page the worker processes (1-indexed); greater than 1 on resume.
        resume_from: usize,
    },
    /// A worker for this job is already running in this process.
    Attached(Progress),
}

impl Submission {
    pub fn job_id(&self) -> &JobId {
        match self {
            Submission::AlreadyCompleted(cp) => &cp.job_id,
            Submission::Started { handle, .. } => handle.job_id(),
            Submission::Attached(progress) => &progress.job_id,
        }
    }
}

/// Handle to a running job worker.
///
/// Dropping the handle does not stop the worker.
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    task: JoinHandle<Result<Checkpoint, PipelineError>>,
}

impl JobHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the worker and return the final checkpoint.
    pub async fn wait(self) -> Result<Checkpoint, PipelineError> {
        self.task
            .await
            .map_err(|e| PipelineError::Internal(format!("worker for job {} died: {e}", self.job_id)))?
    }
}

/// The page-translation executor.
///
/// Cheap to clone; clones share the cache, the checkpoint store and the set
/// of active jobs.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Shared>,
}

struct Shared {
    config: PipelineConfig,
    transform: RetryingTransform,
    cache: Arc<dyn ResultCache>,
    checkpoints: CheckpointStore,
    active: Arc<Mutex<HashSet<JobId>>>,
}

impl Pipeline {
    /// Executor with the durable disk cache under `config.state_dir`.
    pub fn new(config: PipelineConfig, transform: Arc<dyn Transform>) -> Self {
        let cache = Arc::new(DiskResultCache::new(config.cache_dir()));
        Self::with_cache(config, transform, cache)
    }

    pub fn with_cache(
        config: PipelineConfig,
        transform: Arc<dyn Transform>,
        cache: Arc<dyn ResultCache>,
    ) -> Self {
        let transform = RetryingTransform::new(transform, RetryPolicy::from_config(&config));
        let checkpoints = CheckpointStore::new(config.checkpoint_dir(), config.artifact_dir());
        Self {
            inner: Arc::new(Shared {
                config,
                transform,
                cache,
                checkpoints,
                active: Arc::new(Mutex::new(HashSet::new())),
            }),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Submit `document` under an id derived from `(logical_name, content)`.
    ///
    /// `content` is the raw upload the document was parsed from.
    pub async fn submit_named(
        &self,
        logical_name: &str,
        content: &[u8],
        document: Arc<dyn Document>,
    ) -> Result<Submission, PipelineError> {
        self.submit(document, identify(logical_name, content)).await
    }

    /// Start or resume the job `job_id`, or report that it needs no work.
    ///
    /// Returns without waiting for any page. A document with no pages, no
    /// text, or a page that cannot be read is rejected before a checkpoint
    /// is created.
    pub async fn submit(
        &self,
        document: Arc<dyn Document>,
        job_id: JobId,
    ) -> Result<Submission, PipelineError> {
        let total_pages = validate(document.as_ref())?;

        let Some(claim) = ActiveClaim::acquire(&self.inner.active, &job_id) else {
            info!("Job {}: already running, attaching to progress", job_id);
            let progress = match self.inner.checkpoints.query_progress(&job_id).await {
                // The running submission has not written its checkpoint yet.
                Err(PipelineError::JobNotFound { .. }) => Progress {
                    job_id,
                    total: total_pages,
                    completed: 0,
                    status: JobStatus::InProgress,
                    error: None,
                    failed_page: None,
                },
                other => other?,
            };
            return Ok(Submission::Attached(progress));
        };

        let mut checkpoint = self
            .inner
            .checkpoints
            .create_or_resume(&job_id, total_pages)
            .await?;

        match checkpoint.status {
            JobStatus::Completed => {
                info!("Job {}: already completed, nothing to do", job_id);
                return Ok(Submission::AlreadyCompleted(checkpoint));
            }
            JobStatus::Failed => {
                checkpoint = self.inner.checkpoints.reopen(&job_id).await?;
            }
            JobStatus::InProgress => {}
        }

        let resume_from = checkpoint.next_page();
        let shared = Arc::clone(&self.inner);
        let supervised_id = job_id.clone();
        let task = tokio::spawn(async move {
            let _claim = claim;
            let worker = tokio::spawn({
                let shared = Arc::clone(&shared);
                async move { shared.run(document, checkpoint).await }
            });
            match worker.await {
                Ok(result) => result,
                // A panicking worker must not leave the job in_progress forever.
                Err(e) => {
                    let err = PipelineError::Internal(format!("worker panicked: {e}"));
                    shared.fail(&supervised_id, total_pages, None, err).await
                }
            }
        });

        Ok(Submission::Started {
            handle: JobHandle { job_id, task },
            resume_from,
        })
    }

    /// Last durably recorded progress of `job_id`.
    pub async fn query_progress(&self, job_id: &JobId) -> Result<Progress, PipelineError> {
        self.inner.checkpoints.query_progress(job_id).await
    }

    pub async fn checkpoint(&self, job_id: &JobId) -> Result<Checkpoint, PipelineError> {
        self.inner.checkpoints.load(job_id).await
    }

    /// The finished artifact; [`PipelineError::ArtifactNotReady`] until the
    /// job is completed.
    pub async fn artifact(&self, job_id: &JobId) -> Result<String, PipelineError> {
        let cp = self.inner.checkpoints.load(job_id).await?;
        if cp.status != JobStatus::Completed {
            return Err(PipelineError::ArtifactNotReady {
                job_id: job_id.to_string(),
                status: cp.status,
            });
        }
        read_artifact(&cp.output_location, cp.artifact_bytes).await
    }

    /// `true` while a worker for `job_id` runs in this process.
    pub fn is_active(&self, job_id: &JobId) -> bool {
        self.inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(job_id)
    }

    /// Poll until the job is terminal or no worker is left to advance it.
    pub async fn wait_for_terminal(
        &self,
        job_id: &JobId,
        poll_interval: Duration,
    ) -> Result<Progress, PipelineError> {
        loop {
            let progress = self.query_progress(job_id).await?;
            if progress.status.is_terminal() || !self.is_active(job_id) {
                return Ok(progress);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Drop every cached transform result.
    pub async fn clear_cache(&self) -> Result<(), PipelineError> {
        self.inner.cache.clear().await?;
        info!("Result cache cleared");
        Ok(())
    }
}

impl Shared {
    /// Worker body: process the remaining pages, then record the terminal state.
    async fn run(
        &self,
        document: Arc<dyn Document>,
        checkpoint: Checkpoint,
    ) -> Result<Checkpoint, PipelineError> {
        let job_id = checkpoint.job_id.clone();
        let total = checkpoint.total_pages;
        let resume_from = checkpoint.next_page();

        if resume_from > 1 {
            info!("Job {}: resuming at page {}/{}", job_id, resume_from, total);
        } else {
            info!("Job {}: starting, {} pages", job_id, total);
        }
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_job_start(job_id.as_str(), total, resume_from);
        }

        let mut writer = match ArtifactWriter::open(&checkpoint).await {
            Ok(w) => w,
            Err(e) => return self.fail(&job_id, total, None, e).await,
        };

        for page_num in resume_from..=total {
            if let Err(e) = self
                .process_page(&job_id, document.as_ref(), &mut writer, page_num, total)
                .await
            {
                return self.fail(&job_id, total, Some(page_num), e).await;
            }
        }

        let done = match self
            .checkpoints
            .record_terminal(&job_id, JobStatus::Completed, None)
            .await
        {
            Ok(cp) => cp,
            Err(e) => return self.fail(&job_id, total, None, e).await,
        };

        info!("Job {}: completed, artifact at {}", job_id, done.output_location.display());
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_job_complete(job_id.as_str(), total);
        }
        Ok(done)
    }

    async fn process_page(
        &self,
        job_id: &JobId,
        document: &dyn Document,
        writer: &mut ArtifactWriter,
        page_num: usize,
        total: usize,
    ) -> Result<(), PipelineError> {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_page_start(job_id.as_str(), page_num, total);
        }

        let text = document.page_text(page_num)?;
        let translated = self.translate_page(page_num, &text).await?;

        let header = self.config.page_header.render(page_num);
        let artifact_bytes = writer.append_section(&header, &translated).await?;
        self.record_page(job_id, page_num, artifact_bytes).await?;

        debug!("Job {}: page {}/{} done", job_id, page_num, total);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_page_complete(job_id.as_str(), page_num, total, translated.len());
        }
        Ok(())
    }

    /// Split, translate every chunk, and join in ordinal order.
    async fn translate_page(&self, page_num: usize, text: &str) -> Result<String, PipelineError> {
        let chunks = chunk::split(text, self.config.max_chunk_bytes);
        debug!("Page {}: {} chunk(s)", page_num, chunks.len());

        let pending: Vec<_> = chunks.iter().map(|c| self.translate_chunk(c)).collect();
        let outputs: Vec<String> = stream::iter(pending)
            .buffered(self.config.chunk_concurrency.max(1))
            .try_collect()
            .await
            .map_err(|source| PipelineError::Transform {
                page: page_num,
                source,
            })?;

        Ok(chunk::join(&outputs))
    }

    async fn translate_chunk(&self, chunk: &Chunk) -> Result<String, TransformError> {
        if chunk.is_blank() {
            return Ok(chunk.text.clone());
        }

        let payload = chunk.payload();
        let key = content_hash(payload);
        if let Some(hit) = self.cache.get(&key).await {
            debug!("Chunk {}: cache hit", chunk.ordinal);
            return Ok(chunk.reframe(&hit));
        }

        let output = self.transform.apply(payload).await?;
        // A lost cache entry only costs a repeated call later.
        if let Err(e) = self.cache.put(&key, &output).await {
            warn!("Chunk {}: could not cache result: {}", chunk.ordinal, e);
        }
        Ok(chunk.reframe(&output))
    }

    /// Advance the checkpoint, retrying transient persistence failures.
    async fn record_page(
        &self,
        job_id: &JobId,
        page_num: usize,
        artifact_bytes: u64,
    ) -> Result<Checkpoint, PipelineError> {
        let attempts = self.config.checkpoint_write_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self
                .checkpoints
                .record_page_complete(job_id, page_num, artifact_bytes)
                .await
            {
                Ok(cp) => return Ok(cp),
                Err(e @ PipelineError::Persistence { .. }) => {
                    warn!(
                        "Job {}: checkpoint write for page {} failed (attempt {}/{}): {}",
                        job_id, page_num, attempt, attempts, e
                    );
                    if attempt >= attempts {
                        return Err(e);
                    }
                    tokio::time::sleep(self.transform.policy().delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Record the job as failed and hand `err` back to the caller.
    async fn fail(
        &self,
        job_id: &JobId,
        total: usize,
        page: Option<usize>,
        err: PipelineError,
    ) -> Result<Checkpoint, PipelineError> {
        let page = match &err {
            PipelineError::Transform { page, .. } => Some(*page),
            _ => page,
        };
        error!(
            "Job {}: failed{}: {}",
            job_id,
            page.map(|p| format!(" on page {p}")).unwrap_or_default(),
            err
        );

        if let (Some(cb), Some(p)) = (&self.config.progress_callback, page) {
            cb.on_page_error(job_id.as_str(), p, total, &err.summary());
        }

        let failure = JobFailure::from_error(page, &err);
        if let Err(e) = self
            .checkpoints
            .record_terminal(job_id, JobStatus::Failed, Some(failure))
            .await
        {
            error!("Job {}: could not record failure: {}", job_id, e);
        }
        Err(err)
    }
}

/// Read every page once, up front, so that unusable input never gets a
/// checkpoint. Returns the page count.
fn validate(document: &dyn Document) -> Result<usize, PipelineError> {
    let total_pages = document.page_count();
    if total_pages == 0 {
        return Err(PipelineError::InvalidInput {
            reason: "document has no pages".to_string(),
        });
    }

    let mut has_text = false;
    for page_num in 1..=total_pages {
        let text = document.page_text(page_num).map_err(|e| match e {
            PipelineError::InvalidInput { .. } => e,
            other => PipelineError::InvalidInput {
                reason: format!("page {page_num} could not be read: {other}"),
            },
        })?;
        has_text |= !text.trim().is_empty();
    }
    if !has_text {
        return Err(PipelineError::InvalidInput {
            reason: "document is empty".to_string(),
        });
    }
    Ok(total_pages)
}

/// Membership in the active-job set, released on drop.
struct ActiveClaim {
    active: Arc<Mutex<HashSet<JobId>>>,
    job_id: JobId,
}

impl ActiveClaim {
    /// `None` if another worker already holds `job_id`.
    fn acquire(active: &Arc<Mutex<HashSet<JobId>>>, job_id: &JobId) -> Option<Self> {
        let inserted = active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id.clone());
        inserted.then(|| ActiveClaim {
            active: Arc::clone(active),
            job_id: job_id.clone(),
        })
    }
}

impl Drop for ActiveClaim {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_is_exclusive_until_dropped() {
        let active = Arc::new(Mutex::new(HashSet::new()));
        let id = identify("a.txt", b"x");

        let first = ActiveClaim::acquire(&active, &id).expect("first claim");
        assert!(ActiveClaim::acquire(&active, &id).is_none());

        let other = identify("b.txt", b"x");
        assert!(ActiveClaim::acquire(&active, &other).is_some());

        drop(first);
        assert!(ActiveClaim::acquire(&active, &id).is_some());
    }

    struct Unreadable;

    impl Document for Unreadable {
        fn page_count(&self) -> usize {
            2
        }

        fn page_text(&self, page_num: usize) -> Result<String, PipelineError> {
            match page_num {
                1 => Ok("fine".into()),
                _ => Err(PipelineError::Internal("bad page stream".into())),
            }
        }
    }

    #[test]
    fn validate_rejects_unusable_documents() {
        use crate::document::TextDocument;

        let empty = TextDocument::from_pages(Vec::<String>::new());
        assert!(matches!(validate(&empty), Err(PipelineError::InvalidInput { .. })));

        let blank = TextDocument::from_pages(["", "  \n"]);
        let err = validate(&blank).unwrap_err();
        assert!(err.to_string().contains("empty"), "{err}");

        let err = validate(&Unreadable).unwrap_err();
        match err {
            PipelineError::InvalidInput { reason } => assert!(reason.contains("page 2"), "{reason}"),
            other => panic!("unexpected error: {other:?}"),
        }

        let ok = TextDocument::from_pages(["", "text"]);
        assert_eq!(validate(&ok).unwrap(), 2);
    }

    #[test]
    fn submission_reports_job_id() {
        let id = identify("a.txt", b"x");
        let progress = Progress {
            job_id: id.clone(),
            total: 2,
            completed: 1,
            status: JobStatus::InProgress,
            error: None,
            failed_page: None,
        };
        assert_eq!(Submission::Attached(progress).job_id(), &id);
    }
}
