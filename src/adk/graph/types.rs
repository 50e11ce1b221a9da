// SPDX-License-Identifier: MIT

//! Graph type definitions

use crate::adk::error::CopilotError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Virtual node that marks where execution begins
pub const START: &str = "__start__";
/// Virtual node that marks the end of a run
pub const END: &str = "__end__";

/// Default number of node executions allowed per run
pub const DEFAULT_RECURSION_LIMIT: usize = 25;

/// State carried through a graph run.
///
/// Nodes read the state and return an `Update`; the executor applies it.
pub trait GraphState: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Update: Send;

    /// Merge a node's update into the state
    fn apply(&mut self, update: Self::Update);

    /// Record a node failure before control moves to the error handler
    fn record_error(&mut self, node: &str, message: &str);
}

/// One step of a graph
#[async_trait]
pub trait Node<S: GraphState>: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, state: &S) -> Result<S::Update, CopilotError>;
}

/// Picks a branch label from the current state
pub type RouteFn<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

/// Outgoing edge of a node
pub enum Edge<S> {
    /// Always continue with the named node
    Direct(String),
    /// Ask `route` for a label and follow the matching branch
    Conditional {
        route: RouteFn<S>,
        branches: HashMap<String, String>,
    },
}

impl<S> Edge<S> {
    /// Every node this edge can lead to
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Edge::Direct(to) => vec![to.as_str()],
            Edge::Conditional { branches, .. } => branches.values().map(|s| s.as_str()).collect(),
        }
    }
}

/// Per-run settings
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Conversation thread; checkpoints are only written when set
    pub thread_id: Option<String>,
    pub recursion_limit: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            thread_id: None,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

impl RunConfig {
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            ..Self::default()
        }
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }
}

/// Progress events emitted while a graph runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    NodeStarted {
        node: String,
        step: usize,
    },
    /// Full state after a node's update was applied
    StateUpdated {
        node: String,
        step: usize,
        state: serde_json::Value,
    },
    NodeFailed {
        node: String,
        error: String,
    },
    Finished {
        steps: usize,
    },
}
