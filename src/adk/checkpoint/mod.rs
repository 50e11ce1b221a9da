// SPDX-License-Identifier: MIT

//! Checkpointing for graph runs
//!
//! A checkpoint is the full graph state, serialized to JSON, taken after a
//! node finished. Checkpoints are grouped by thread id and ordered by step.

mod memory;

pub use memory::MemorySaver;

use crate::adk::error::CheckpointError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Snapshot of a thread's state after one graph step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub thread_id: String,
    /// Monotonic step counter within the thread
    pub step: u64,
    /// Node that produced this state
    pub node: String,
    pub state: Value,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(thread_id: &str, step: u64, node: &str, state: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.to_string(),
            step,
            node: node.to_string(),
            state,
            created_at: Utc::now(),
        }
    }
}

/// Saves and loads checkpoints by thread id
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Persist a checkpoint. Returns its id.
    async fn put(&self, checkpoint: Checkpoint) -> Result<String, CheckpointError>;

    /// Latest checkpoint of a thread, if any
    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Checkpoints of a thread, oldest first, capped at `limit` most recent
    async fn list(
        &self,
        thread_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Checkpoint>, CheckpointError>;

    /// Next free step number for a thread
    async fn next_step(&self, thread_id: &str) -> Result<u64, CheckpointError> {
        Ok(self
            .latest(thread_id)
            .await?
            .map(|c| c.step + 1)
            .unwrap_or(0))
    }
}
