//! # pagewise
//!
//! Resumable, page-by-page translation of long documents.
//!
//! ## Why this crate?
//!
//! Translating a 300-page book through an LLM or a web translation endpoint
//! takes hours and fails halfway more often than not: rate limits, dropped
//! connections, a restarted server. Starting over costs time and money.
//! pagewise checkpoints after every page, memoises every translated chunk by
//! content hash, and derives the job id from the document's bytes, so
//! uploading the same file again simply continues where the last run stopped.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Document
//!  │
//!  ├─ 1. Identity    sha256(name, sha256(bytes)) → job id
//!  ├─ 2. Checkpoint  load or create; completed jobs return immediately
//!  ├─ 3. Chunk       split each page on paragraph/sentence boundaries
//!  ├─ 4. Cache       skip chunks translated before, by any job
//!  ├─ 5. Transform   LLM or Google Translate, retried with backoff
//!  └─ 6. Artifact    append page section, fsync, advance checkpoint
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagewise::{GoogleTranslateTransform, Pipeline, PipelineConfig, Submission, TextDocument};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let raw = std::fs::read("book.txt")?;
//!     let document = Arc::new(TextDocument::from_form_feeds(&String::from_utf8(raw.clone())?));
//!
//!     let config = PipelineConfig::builder().state_dir("state").build()?;
//!     let pipeline = Pipeline::new(config, Arc::new(GoogleTranslateTransform::new("en", "hi")));
//!
//!     let submission = pipeline.submit_named("book.txt", &raw, document).await?;
//!     let job_id = submission.job_id().clone();
//!     if let Submission::Started { resume_from, .. } = &submission {
//!         eprintln!("processing from page {resume_from}");
//!     }
//!
//!     let progress = pipeline.wait_for_terminal(&job_id, Duration::from_secs(1)).await?;
//!     eprintln!("{}/{} pages, {}", progress.completed, progress.total, progress.status);
//!     println!("{}", pipeline.artifact(&job_id).await?);
//!     Ok(())
//! }
//! ```
//!
//! ## Persisted State
//!
//! Everything lives under [`PipelineConfig::state_dir`]:
//!
//! | Path | Contents |
//! |------|----------|
//! | `checkpoints/<job>.json` | progress record, rewritten atomically after every page |
//! | `artifacts/<job>.txt`    | translated output, append-only |
//! | `cache/<xx>/<hash>.txt`  | one translated chunk per file |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pagewise` binary (clap + indicatif + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod transform;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PageHeader, PipelineConfig, PipelineConfigBuilder};
pub use document::{Document, TextDocument};
pub use error::{PipelineError, TransformError};
pub use executor::{JobHandle, Pipeline, Submission};
pub use pipeline::cache::{DiskResultCache, MemoryResultCache, ResultCache};
pub use pipeline::checkpoint::{Checkpoint, CheckpointStore, JobStatus, Progress};
pub use pipeline::identity::{identify, JobId};
pub use pipeline::retry::{RetryPolicy, RetryingTransform};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use transform::{FnTransform, GoogleTranslateTransform, LlmTransform, Transform};
