//! Checkpoint store: durable per-job progress, the basis for resume.
//!
//! One JSON record per job lives at `checkpoints/<job_id>.json`. Every
//! mutation goes through [`write_atomic`] (temp file, fsync, rename), so a
//! reader sees either the previous record or the new one, never a torn
//! write. Mutations of one job are serialised through [`KeyedLocks`];
//! different jobs never contend.
//!
//! Progress queries read the file, not an in-memory copy, so they reflect
//! exactly what a restarted process would resume from.
//!
//! ## Lifecycle
//!
//! ```text
//! create_or_resume ──▶ in_progress ──record_page_complete (×N)──▶ in_progress
//!                          │                                          │
//!                          │ record_terminal(failed)    record_terminal(completed)
//!                          ▼                                          ▼
//!                        failed ──reopen──▶ in_progress            completed (final)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::pipeline::identity::JobId;
use crate::pipeline::locks::KeyedLocks;

/// Lifecycle state of a job as recorded in its checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job failed, as stored in its checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    /// Page that could not be completed, if the failure was page-specific.
    pub page: Option<usize>,
    /// Generic, user-facing summary.
    pub summary: String,
    /// Full cause, for logs and operators.
    pub detail: String,
}

impl JobFailure {
    pub fn from_error(page: Option<usize>, err: &PipelineError) -> Self {
        Self {
            page,
            summary: err.summary(),
            detail: err.to_string(),
        }
    }
}

/// Durable record of how far a job has progressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub job_id: JobId,
    pub total_pages: usize,
    /// Highest page (1-indexed) whose output is in the artifact; 0 if none.
    pub last_completed_page: usize,
    /// Where the artifact for this job is written.
    pub output_location: PathBuf,
    pub status: JobStatus,
    /// Artifact length in bytes right after `last_completed_page` was appended.
    #[serde(default)]
    pub artifact_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
}

impl Checkpoint {
    /// First page still to be processed (1-indexed).
    pub fn next_page(&self) -> usize {
        self.last_completed_page + 1
    }

    pub fn progress(&self) -> Progress {
        Progress {
            job_id: self.job_id.clone(),
            total: self.total_pages,
            completed: self.last_completed_page,
            status: self.status,
            error: self.error.as_ref().map(|e| e.summary.clone()),
            failed_page: self.error.as_ref().and_then(|e| e.page),
        }
    }
}

/// Read-only progress view, safe to hand to pollers.
///
/// `error` is the generic summary; the full detail stays in the checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub job_id: JobId,
    pub total: usize,
    pub completed: usize,
    pub status: JobStatus,
    pub error: Option<String>,
    pub failed_page: Option<usize>,
}

/// Durable store of [`Checkpoint`]s, one per job.
#[derive(Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
    artifact_dir: PathBuf,
    locks: KeyedLocks,
}

impl CheckpointStore {
    /// `artifact_dir` only determines the `output_location` recorded in new
    /// checkpoints.
    pub fn new(dir: impl AsRef<Path>, artifact_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            artifact_dir: artifact_dir.as_ref().to_path_buf(),
            locks: KeyedLocks::new(),
        }
    }

    fn path(&self, job_id: &JobId) -> PathBuf {
        self.dir.join(format!("{}.json", job_id))
    }

    /// Load the checkpoint for `job_id`.
    pub async fn load(&self, job_id: &JobId) -> Result<Checkpoint, PipelineError> {
        let path = self.path(job_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PipelineError::JobNotFound {
                    job_id: job_id.to_string(),
                })
            }
            Err(e) => return Err(PipelineError::persistence(&path, e)),
        };
        serde_json::from_slice(&bytes).map_err(|e| PipelineError::Corrupt {
            path,
            detail: e.to_string(),
        })
    }

    /// Return the existing checkpoint unchanged, or create a fresh one.
    pub async fn create_or_resume(
        &self,
        job_id: &JobId,
        total_pages: usize,
    ) -> Result<Checkpoint, PipelineError> {
        let _guard = self.locks.lock(job_id.as_str()).await;

        match self.load(job_id).await {
            Ok(existing) => {
                if existing.total_pages != total_pages {
                    return Err(PipelineError::InvalidInput {
                        reason: format!(
                            "job {} was created with {} pages, document now has {}",
                            job_id, existing.total_pages, total_pages
                        ),
                    });
                }
                info!(
                    "Job {}: found checkpoint ({}/{} pages, {})",
                    job_id, existing.last_completed_page, total_pages, existing.status
                );
                Ok(existing)
            }
            Err(PipelineError::JobNotFound { .. }) => {
                let fresh = Checkpoint {
                    job_id: job_id.clone(),
                    total_pages,
                    last_completed_page: 0,
                    output_location: self.artifact_dir.join(format!("{}.txt", job_id)),
                    status: JobStatus::InProgress,
                    artifact_bytes: 0,
                    error: None,
                };
                self.persist(&fresh).await?;
                info!("Job {}: created checkpoint for {} pages", job_id, total_pages);
                Ok(fresh)
            }
            Err(e) => Err(e),
        }
    }

    /// Record that `page_num` is done and the artifact is `artifact_bytes` long.
    ///
    /// `page_num` must be exactly `last_completed_page + 1`.
    pub async fn record_page_complete(
        &self,
        job_id: &JobId,
        page_num: usize,
        artifact_bytes: u64,
    ) -> Result<Checkpoint, PipelineError> {
        let _guard = self.locks.lock(job_id.as_str()).await;
        let mut cp = self.load(job_id).await?;

        if cp.status != JobStatus::InProgress {
            return Err(PipelineError::TerminalState {
                job_id: job_id.to_string(),
                status: cp.status,
            });
        }
        if page_num != cp.next_page() || page_num > cp.total_pages {
            return Err(PipelineError::OutOfOrderPage {
                job_id: job_id.to_string(),
                expected: cp.next_page(),
                got: page_num,
            });
        }

        cp.last_completed_page = page_num;
        cp.artifact_bytes = artifact_bytes;
        self.persist(&cp).await?;
        debug!("Job {}: checkpoint at page {}/{}", job_id, page_num, cp.total_pages);
        Ok(cp)
    }

    /// Move the job to `completed` or `failed`.
    ///
    /// `completed` is final. Recording the status a job already has is a
    /// no-op for `completed` and refreshes the cause for `failed`.
    pub async fn record_terminal(
        &self,
        job_id: &JobId,
        status: JobStatus,
        failure: Option<JobFailure>,
    ) -> Result<Checkpoint, PipelineError> {
        if !status.is_terminal() {
            return Err(PipelineError::InvalidInput {
                reason: format!("'{status}' is not a terminal status"),
            });
        }

        let _guard = self.locks.lock(job_id.as_str()).await;
        let mut cp = self.load(job_id).await?;

        if cp.status == JobStatus::Completed {
            return if status == JobStatus::Completed {
                Ok(cp)
            } else {
                Err(PipelineError::TerminalState {
                    job_id: job_id.to_string(),
                    status: cp.status,
                })
            };
        }
        if status == JobStatus::Completed && cp.last_completed_page != cp.total_pages {
            return Err(PipelineError::InvalidInput {
                reason: format!(
                    "job {} cannot complete with {}/{} pages done",
                    job_id, cp.last_completed_page, cp.total_pages
                ),
            });
        }

        cp.status = status;
        cp.error = match status {
            JobStatus::Failed => Some(failure.unwrap_or_else(|| JobFailure {
                page: None,
                summary: "job failed".into(),
                detail: "job failed".into(),
            })),
            _ => None,
        };
        self.persist(&cp).await?;
        info!("Job {}: {}", job_id, cp.status);
        Ok(cp)
    }

    /// Put a failed job back in progress so a resubmission can continue it.
    ///
    /// `last_completed_page` is untouched; in-progress jobs are returned as is.
    pub async fn reopen(&self, job_id: &JobId) -> Result<Checkpoint, PipelineError> {
        let _guard = self.locks.lock(job_id.as_str()).await;
        let mut cp = self.load(job_id).await?;
        match cp.status {
            JobStatus::InProgress => Ok(cp),
            JobStatus::Completed => Err(PipelineError::TerminalState {
                job_id: job_id.to_string(),
                status: cp.status,
            }),
            JobStatus::Failed => {
                cp.status = JobStatus::InProgress;
                cp.error = None;
                self.persist(&cp).await?;
                info!(
                    "Job {}: reopened after failure, resuming at page {}",
                    job_id,
                    cp.next_page()
                );
                Ok(cp)
            }
        }
    }

    /// Last durably recorded progress; never waits on a running worker.
    pub async fn query_progress(&self, job_id: &JobId) -> Result<Progress, PipelineError> {
        Ok(self.load(job_id).await?.progress())
    }

    async fn persist(&self, cp: &Checkpoint) -> Result<(), PipelineError> {
        let json = serde_json::to_vec_pretty(cp)
            .map_err(|e| PipelineError::Internal(format!("checkpoint serialisation: {e}")))?;
        write_atomic(&self.path(&cp.job_id), json).await
    }
}

/// Replace `path` with `bytes` atomically (temp file in the same dir, fsync,
/// rename, fsync of the directory so the rename itself survives power loss).
pub(crate) async fn write_atomic(path: &Path, bytes: Vec<u8>) -> Result<(), PipelineError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| PipelineError::persistence(dir, e))?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| PipelineError::persistence(dir, e))?;
        tmp.write_all(&bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| PipelineError::persistence(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| PipelineError::persistence(&path, e.error))?;
        sync_dir(dir)
    })
    .await
    .map_err(|e| PipelineError::Internal(format!("write task panicked: {e}")))?
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), PipelineError> {
    std::fs::File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| PipelineError::persistence(dir, e))
}

// Directories cannot be opened for syncing on other platforms.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), PipelineError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::identity::identify;

    fn store(dir: &Path) -> CheckpointStore {
        CheckpointStore::new(dir.join("checkpoints"), dir.join("artifacts"))
    }

    #[tokio::test]
    async fn load_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let err = s.load(&identify("a", b"x")).await.unwrap_err();
        assert!(matches!(err, PipelineError::JobNotFound { .. }));
    }

    #[tokio::test]
    async fn create_then_resume_returns_same_record() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let id = identify("a.txt", b"abc");

        let fresh = s.create_or_resume(&id, 3).await.unwrap();
        assert_eq!(fresh.last_completed_page, 0);
        assert_eq!(fresh.status, JobStatus::InProgress);
        assert!(fresh.output_location.ends_with(format!("artifacts/{id}.txt")));

        s.record_page_complete(&id, 1, 10).await.unwrap();

        let reopened = store(dir.path()).create_or_resume(&id, 3).await.unwrap();
        assert_eq!(reopened.last_completed_page, 1);
        assert_eq!(reopened.artifact_bytes, 10);
        assert_eq!(reopened.next_page(), 2);
    }

    #[tokio::test]
    async fn page_count_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let id = identify("a", b"x");
        s.create_or_resume(&id, 3).await.unwrap();
        assert!(matches!(
            s.create_or_resume(&id, 4).await,
            Err(PipelineError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn pages_must_complete_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let id = identify("a", b"x");
        s.create_or_resume(&id, 3).await.unwrap();

        let err = s.record_page_complete(&id, 2, 0).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::OutOfOrderPage {
                expected: 1,
                got: 2,
                ..
            }
        ));

        s.record_page_complete(&id, 1, 5).await.unwrap();
        assert!(s.record_page_complete(&id, 1, 5).await.is_err());
        s.record_page_complete(&id, 2, 9).await.unwrap();
    }

    #[tokio::test]
    async fn cannot_run_past_last_page() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let id = identify("a", b"x");
        s.create_or_resume(&id, 1).await.unwrap();
        s.record_page_complete(&id, 1, 1).await.unwrap();
        assert!(s.record_page_complete(&id, 2, 2).await.is_err());
    }

    #[tokio::test]
    async fn completed_is_final() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let id = identify("a", b"x");
        s.create_or_resume(&id, 1).await.unwrap();
        s.record_page_complete(&id, 1, 4).await.unwrap();
        s.record_terminal(&id, JobStatus::Completed, None).await.unwrap();

        // Idempotent for the same status.
        s.record_terminal(&id, JobStatus::Completed, None).await.unwrap();

        let err = s.record_terminal(&id, JobStatus::Failed, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::TerminalState { .. }));
        assert!(matches!(
            s.reopen(&id).await,
            Err(PipelineError::TerminalState { .. })
        ));
    }

    #[tokio::test]
    async fn cannot_complete_early() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let id = identify("a", b"x");
        s.create_or_resume(&id, 2).await.unwrap();
        s.record_page_complete(&id, 1, 4).await.unwrap();
        assert!(s.record_terminal(&id, JobStatus::Completed, None).await.is_err());
    }

    #[tokio::test]
    async fn failed_job_can_be_reopened() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let id = identify("a", b"x");
        s.create_or_resume(&id, 3).await.unwrap();
        s.record_page_complete(&id, 1, 4).await.unwrap();

        let failure = JobFailure {
            page: Some(2),
            summary: "translation failed on page 2".into(),
            detail: "HTTP 503 from upstream".into(),
        };
        s.record_terminal(&id, JobStatus::Failed, Some(failure))
            .await
            .unwrap();

        let progress = s.query_progress(&id).await.unwrap();
        assert_eq!(progress.status, JobStatus::Failed);
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.failed_page, Some(2));
        assert_eq!(progress.error.as_deref(), Some("translation failed on page 2"));

        // Pages cannot be recorded while failed.
        assert!(s.record_page_complete(&id, 2, 8).await.is_err());

        let cp = s.reopen(&id).await.unwrap();
        assert_eq!(cp.status, JobStatus::InProgress);
        assert_eq!(cp.last_completed_page, 1);
        assert!(cp.error.is_none());
    }

    #[tokio::test]
    async fn in_progress_is_not_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let id = identify("a", b"x");
        s.create_or_resume(&id, 1).await.unwrap();
        assert!(s
            .record_terminal(&id, JobStatus::InProgress, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn corrupt_record_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let id = identify("a", b"x");
        std::fs::create_dir_all(dir.path().join("checkpoints")).unwrap();
        std::fs::write(dir.path().join(format!("checkpoints/{id}.json")), b"{ not json").unwrap();
        assert!(matches!(
            s.load(&id).await,
            Err(PipelineError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn atomic_write_creates_dir_and_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state/record.json");

        write_atomic(&path, b"first".to_vec()).await.unwrap();
        write_atomic(&path, b"second".to_vec()).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");

        // Only the target remains; temp files were renamed away.
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
        sync_dir(path.parent().unwrap()).unwrap();
    }

    #[tokio::test]
    async fn atomic_write_into_a_file_path_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("checkpoints");
        std::fs::write(&blocker, b"not a dir").unwrap();
        assert!(matches!(
            write_atomic(&blocker.join("x.json"), b"{}".to_vec()).await,
            Err(PipelineError::Persistence { .. })
        ));
    }

    #[test]
    fn status_serialises_snake_case() {
        let json = serde_json::to_string(&JobStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
    }
}
