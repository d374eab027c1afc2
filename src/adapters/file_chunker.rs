//! File-backed context chunker.
//!
//! Signals a checkpoint once context usage crosses a percentage threshold and
//! writes checkpoints as pretty JSON, one file per run (`<run_id>.json`),
//! overwritten by each newer checkpoint of the same run.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Checkpoint;
use crate::domain::ports::ContextChunker;

#[derive(Debug, Clone)]
pub struct FileContextChunker {
    dir: PathBuf,
    threshold_percent: f64,
}

impl FileContextChunker {
    pub fn new(dir: impl Into<PathBuf>, threshold_percent: f64) -> Self {
        Self {
            dir: dir.into(),
            threshold_percent,
        }
    }

    fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    /// Read a checkpoint from an explicit file.
    pub async fn read_file(path: impl AsRef<Path>) -> DomainResult<Checkpoint> {
        let json = fs::read_to_string(path.as_ref()).await.map_err(|err| {
            DomainError::Io(format!("failed to read {}: {err}", path.as_ref().display()))
        })?;
        Ok(Checkpoint::from_json(&json)?)
    }
}

#[async_trait]
impl ContextChunker for FileContextChunker {
    fn should_checkpoint(&self, usage_percent: f64) -> bool {
        usage_percent >= self.threshold_percent
    }

    async fn persist(&self, checkpoint: &Checkpoint) -> DomainResult<String> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&checkpoint.state.run_id.to_string());
        let json = checkpoint.to_json()?;

        // Write-then-rename so a crash never leaves a torn checkpoint.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;

        tracing::debug!(path = %path.display(), "checkpoint written");
        Ok(path.display().to_string())
    }

    async fn load(&self, run_id: &str) -> DomainResult<Option<Checkpoint>> {
        let path = self.path_for(run_id);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        Self::read_file(&path).await.map(Some)
    }
}
