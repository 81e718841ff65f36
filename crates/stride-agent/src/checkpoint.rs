//! Durable graph checkpoints keyed by thread id

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::graph::GraphState;

/// Snapshot of a graph after a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    /// Number of steps taken on this thread
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub state: GraphState,
}

impl Checkpoint {
    pub fn new(thread_id: impl Into<String>, version: u64, state: GraphState) -> Self {
        Self {
            thread_id: thread_id.into(),
            version,
            created_at: Utc::now(),
            state,
        }
    }
}

/// Persistence for checkpoints. One checkpoint per thread; saving replaces it.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>>;
    async fn delete(&self, thread_id: &str) -> Result<()>;
}

/// In-process checkpoint store
#[derive(Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.checkpoints
            .lock()
            .insert(checkpoint.thread_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self.checkpoints.lock().get(thread_id).cloned())
    }

    async fn delete(&self, thread_id: &str) -> Result<()> {
        self.checkpoints.lock().remove(thread_id);
        Ok(())
    }
}

/// One JSON file per thread under a directory
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, thread_id: &str) -> Result<PathBuf> {
        let name: String = thread_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if name.is_empty() || name != thread_id {
            return Err(Error::Checkpoint(format!("invalid thread id '{thread_id}'")));
        }
        Ok(self.dir.join(format!("{name}.json")))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let path = self.path_for(&checkpoint.thread_id)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let json = serde_json::to_vec_pretty(checkpoint)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(
            thread_id = %checkpoint.thread_id,
            version = checkpoint.version,
            "Saved checkpoint to {}",
            path.display()
        );
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let path = self.path_for(thread_id)?;
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let checkpoint = serde_json::from_slice(&data).map_err(|e| {
            Error::Checkpoint(format!("corrupt checkpoint {}: {}", path.display(), e))
        })?;
        Ok(Some(checkpoint))
    }

    async fn delete(&self, thread_id: &str) -> Result<()> {
        let path = self.path_for(thread_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
