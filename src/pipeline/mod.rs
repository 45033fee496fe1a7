//! Building blocks of the resumable translation pipeline.
//!
//! Each submodule owns one concern and is independently testable; the
//! orchestration lives in [`crate::executor`].
//!
//! ## Data Flow
//!
//! ```text
//! document ──▶ identity ──▶ checkpoint ──▶ chunk ──▶ cache? ──▶ retry ──▶ artifact ──▶ checkpoint
//! (bytes)      (job id)     (resume at)    (split)   (memo)     (transform) (append)    (advance)
//! ```
//!
//! 1. [`identity`]   — derive a stable job id from name + content
//! 2. [`checkpoint`] — durable per-job progress; tells a worker where to resume
//! 3. [`chunk`]      — split page text into transform-sized pieces on
//!    paragraph/sentence boundaries
//! 4. [`cache`]      — content-addressed memo of transform results, shared by all jobs
//! 5. [`retry`]      — bounded exponential-backoff retry around the transform
//! 6. [`postprocess`] — cleanup of LLM answers (fences, preambles)
//! 7. [`artifact`]   — append-only output file, truncated to the checkpointed
//!    length on resume
//! 8. [`romanize`]   — Devanagari to Roman script for Hinglish output
//!
//! [`locks`] provides the per-key mutual exclusion used by the checkpoint
//! store and the disk cache.

pub mod artifact;
pub mod cache;
pub mod checkpoint;
pub mod chunk;
pub mod identity;
pub mod locks;
pub mod postprocess;
pub mod retry;
pub mod romanize;
