//! Error types for the pagewise library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`] — **Fatal** to a call or to a job run: the document
//!   was rejected, a checkpoint could not be persisted, or a page could not
//!   be translated even after retries. Returned as `Err(PipelineError)` from
//!   [`crate::executor::Pipeline`] and the stores under [`crate::pipeline`].
//!
//! * [`TransformError`] — a single call to the external transform failed.
//!   [`crate::pipeline::retry::RetryingTransform`] absorbs these until its
//!   attempt budget runs out, then surfaces [`TransformError::Exhausted`]
//!   carrying the last underlying cause.
//!
//! A job that fails with a `TransformError` is recoverable: resubmitting the
//! same document resumes after the last checkpointed page.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::checkpoint::JobStatus;

/// All fatal errors returned by the pagewise library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Empty document, zero pages, or unreadable page content.
    ///
    /// Raised before any checkpoint is created.
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    // ── Job state errors ──────────────────────────────────────────────────
    /// No checkpoint exists for the given job id.
    #[error("Job '{job_id}' not found")]
    JobNotFound { job_id: String },

    /// The artifact was requested before the job completed.
    #[error("Artifact for job '{job_id}' is not ready (status: {status})")]
    ArtifactNotReady { job_id: String, status: JobStatus },

    /// A page completion was recorded out of order.
    #[error("Job '{job_id}': expected page {expected} to complete next, got page {got}")]
    OutOfOrderPage {
        job_id: String,
        expected: usize,
        got: usize,
    },

    /// The job already reached a final state that cannot be changed.
    #[error("Job '{job_id}' is already {status}")]
    TerminalState { job_id: String, status: JobStatus },

    // ── Persistence errors ────────────────────────────────────────────────
    /// A checkpoint, artifact, or cache write/read failed.
    #[error("Persistence failure at '{path}': {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted record exists but could not be decoded.
    #[error("Corrupt record at '{path}': {detail}")]
    Corrupt { path: PathBuf, detail: String },

    // ── Transform errors ──────────────────────────────────────────────────
    /// A page could not be transformed after all retries.
    #[error("Translation failed on page {page}: {source}")]
    Transform {
        page: usize,
        #[source]
        source: TransformError,
    },

    /// The configured LLM provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (worker panic, runtime failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Wrap an IO error with the path it happened on.
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Short, user-facing summary without internal detail.
    ///
    /// This is what the progress view shows for a failed job.
    pub fn summary(&self) -> String {
        match self {
            PipelineError::Transform { page, .. } => {
                format!("translation failed on page {page}")
            }
            PipelineError::Persistence { .. } | PipelineError::Corrupt { .. } => {
                "could not save progress".to_string()
            }
            PipelineError::InvalidInput { .. } => "document could not be read".to_string(),
            _ => "job failed".to_string(),
        }
    }
}

/// A failed call to the external transform.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformError {
    /// The transform returned an error.
    #[error("transform call failed: {detail}")]
    Failed { detail: String },

    /// The transform did not answer in time.
    #[error("transform call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The provider refused the call because of rate limiting.
    #[error("rate limited by provider: {detail}")]
    RateLimited { detail: String },

    /// Every attempt failed; `last` is the cause of the final attempt.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<TransformError>,
    },
}

impl TransformError {
    /// Convenience constructor for ad-hoc failures.
    pub fn failed(detail: impl Into<String>) -> Self {
        TransformError::Failed {
            detail: detail.into(),
        }
    }

    /// The innermost cause, looking through [`TransformError::Exhausted`].
    pub fn root_cause(&self) -> &TransformError {
        match self {
            TransformError::Exhausted { last, .. } => last.root_cause(),
            other => other,
        }
    }
}
