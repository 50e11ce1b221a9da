// SPDX-License-Identifier: MIT

//! In-memory checkpointer

use super::{Checkpoint, Checkpointer};
use crate::adk::error::CheckpointError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps checkpoints in process memory. Lost on restart.
#[derive(Clone, Default)]
pub struct MemorySaver {
    threads: Arc<RwLock<HashMap<String, Vec<Checkpoint>>>>,
    /// Per-thread cap; oldest checkpoints are dropped first
    max_history: Option<usize>,
}

impl MemorySaver {
    /// Unbounded history
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max_history` checkpoints per thread (at least one)
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            threads: Arc::default(),
            max_history: Some(max_history.max(1)),
        }
    }

    /// Number of threads with at least one checkpoint
    pub async fn thread_count(&self) -> usize {
        self.threads.read().await.len()
    }
}

#[async_trait]
impl Checkpointer for MemorySaver {
    async fn put(&self, checkpoint: Checkpoint) -> Result<String, CheckpointError> {
        let mut threads = self.threads.write().await;
        let history = threads.entry(checkpoint.thread_id.clone()).or_default();

        if let Some(last) = history.last() {
            if checkpoint.step <= last.step {
                return Err(CheckpointError::Storage(format!(
                    "step {} is not after step {} in thread {}",
                    checkpoint.step, last.step, checkpoint.thread_id
                )));
            }
        }

        let id = checkpoint.id.clone();
        history.push(checkpoint);
        if let Some(max) = self.max_history {
            let excess = history.len().saturating_sub(max);
            history.drain(..excess);
        }
        Ok(id)
    }

    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let threads = self.threads.read().await;
        Ok(threads.get(thread_id).and_then(|h| h.last().cloned()))
    }

    async fn list(
        &self,
        thread_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Checkpoint>, CheckpointError> {
        let threads = self.threads.read().await;
        let history = threads.get(thread_id).map(Vec::as_slice).unwrap_or(&[]);
        let skip = limit.map(|l| history.len().saturating_sub(l)).unwrap_or(0);
        Ok(history[skip..].to_vec())
    }
}
