//! Result cache: content-addressed memo of transform outputs.
//!
//! Keys are [`crate::pipeline::identity::content_hash`] digests of the exact
//! chunk payload sent to the transform, so an identical sentence seen on a
//! different page, or in a different document, is translated only once.
//!
//! [`DiskResultCache`] stores one file per entry under
//! `cache/<first two hex chars>/<hash>.txt`. Entries are written to a temp
//! file and renamed into place, so a reader sees either the whole value or
//! nothing and never waits on a writer. Concurrent `put`s for one key are
//! serialised; the values are expected to be identical, last writer wins.
//!
//! There is no eviction. The cache grows with the number of distinct chunks
//! ever translated until [`ResultCache::clear`] is called.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::pipeline::checkpoint::write_atomic;
use crate::pipeline::locks::KeyedLocks;

/// Process-wide, cross-job memo of transform results.
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Look up a prior result. Unreadable entries count as misses.
    async fn get(&self, content_hash: &str) -> Option<String>;

    /// Record a result. Idempotent for identical values.
    async fn put(&self, content_hash: &str, result: &str) -> Result<(), PipelineError>;

    /// Drop every entry.
    async fn clear(&self) -> Result<(), PipelineError>;
}

/// Durable cache backed by one file per entry.
#[derive(Debug)]
pub struct DiskResultCache {
    root: PathBuf,
    locks: KeyedLocks,
}

impl DiskResultCache {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            locks: KeyedLocks::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, content_hash: &str) -> Result<PathBuf, PipelineError> {
        let valid = content_hash.len() >= 2
            && content_hash
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !valid {
            return Err(PipelineError::InvalidInput {
                reason: format!("'{content_hash}' is not a content hash"),
            });
        }
        Ok(self
            .root
            .join(&content_hash[..2])
            .join(format!("{content_hash}.txt")))
    }
}

#[async_trait]
impl ResultCache for DiskResultCache {
    async fn get(&self, content_hash: &str) -> Option<String> {
        let path = self.entry_path(content_hash).ok()?;
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Some(value),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Cache entry {} unreadable, treating as miss: {}", path.display(), e);
                None
            }
        }
    }

    async fn put(&self, content_hash: &str, result: &str) -> Result<(), PipelineError> {
        let path = self.entry_path(content_hash)?;
        let _guard = self.locks.lock(content_hash).await;
        write_atomic(&path, result.as_bytes().to_vec()).await?;
        debug!("Cached result {}", &content_hash[..12.min(content_hash.len())]);
        Ok(())
    }

    async fn clear(&self) -> Result<(), PipelineError> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::persistence(&self.root, e)),
        }
    }
}

/// Non-durable cache for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryResultCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResultCache for MemoryResultCache {
    async fn get(&self, content_hash: &str) -> Option<String> {
        self.entries.lock().ok()?.get(content_hash).cloned()
    }

    async fn put(&self, content_hash: &str, result: &str) -> Result<(), PipelineError> {
        self.entries
            .lock()
            .map_err(|_| PipelineError::Internal("cache mutex poisoned".into()))?
            .insert(content_hash.to_string(), result.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), PipelineError> {
        self.entries
            .lock()
            .map_err(|_| PipelineError::Internal("cache mutex poisoned".into()))?
            .clear();
        Ok(())
    }
}
