//! Artifact sink: the append-only translated output of a job.
//!
//! Each completed page appends one section (heading, translated text, blank
//! line) and is fsynced before the checkpoint is advanced. The checkpoint
//! remembers the artifact length at that moment; when a job is reopened the
//! file is cut back to that length, which discards a section that was
//! written but never checkpointed (crash between the two writes). Sections
//! that were checkpointed are never touched again.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::warn;

use crate::error::PipelineError;
use crate::pipeline::checkpoint::Checkpoint;

/// Open handle for appending page sections to one job's artifact.
#[derive(Debug)]
pub struct ArtifactWriter {
    path: PathBuf,
    file: File,
    len: u64,
}

impl ArtifactWriter {
    /// Open the artifact recorded in `checkpoint`, positioned at its
    /// committed length.
    ///
    /// Bytes past `checkpoint.artifact_bytes` are discarded. A file shorter
    /// than the committed length means data was lost and is reported as
    /// [`PipelineError::Corrupt`].
    pub async fn open(checkpoint: &Checkpoint) -> Result<Self, PipelineError> {
        let path = checkpoint.output_location.clone();
        let committed = checkpoint.artifact_bytes;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::persistence(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .await
            .map_err(|e| PipelineError::persistence(&path, e))?;

        let on_disk = file
            .metadata()
            .await
            .map_err(|e| PipelineError::persistence(&path, e))?
            .len();

        if on_disk < committed {
            return Err(PipelineError::Corrupt {
                path,
                detail: format!(
                    "artifact is {on_disk} bytes but checkpoint recorded {committed}"
                ),
            });
        }
        if on_disk > committed {
            warn!(
                "Artifact {}: dropping {} uncheckpointed bytes",
                path.display(),
                on_disk - committed
            );
            file.set_len(committed)
                .await
                .map_err(|e| PipelineError::persistence(&path, e))?;
        }
        file.seek(SeekFrom::Start(committed))
            .await
            .map_err(|e| PipelineError::persistence(&path, e))?;

        Ok(Self {
            path,
            file,
            len: committed,
        })
    }

    /// Append one page section and make it durable.
    ///
    /// Returns the artifact length after the write.
    pub async fn append_section(&mut self, header: &str, body: &str) -> Result<u64, PipelineError> {
        let section = format!("{header}{body}\n\n");
        self.file
            .write_all(section.as_bytes())
            .await
            .map_err(|e| PipelineError::persistence(&self.path, e))?;
        self.file
            .sync_data()
            .await
            .map_err(|e| PipelineError::persistence(&self.path, e))?;
        self.len += section.len() as u64;
        Ok(self.len)
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read a finished artifact whose checkpoint recorded `committed` bytes.
///
/// The file is created before the first page is processed, so a missing or
/// short file means output was lost and is reported as
/// [`PipelineError::Corrupt`].
pub async fn read_artifact(path: &Path, committed: u64) -> Result<String, PipelineError> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(s) => s,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(PipelineError::Corrupt {
                path: path.to_path_buf(),
                detail: format!("artifact is missing but checkpoint recorded {committed} bytes"),
            })
        }
        Err(e) => return Err(PipelineError::persistence(path, e)),
    };
    if (text.len() as u64) < committed {
        return Err(PipelineError::Corrupt {
            path: path.to_path_buf(),
            detail: format!(
                "artifact is {} bytes but checkpoint recorded {committed}",
                text.len()
            ),
        });
    }
    Ok(text)
}
