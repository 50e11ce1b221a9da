// SPDX-License-Identifier: MIT

//! Graph executor

use super::types::{Edge, GraphEvent, GraphState, Node, RunConfig, END};
use crate::adk::checkpoint::{Checkpoint, Checkpointer};
use crate::adk::error::{CopilotError, GraphError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Validated, runnable graph
pub struct CompiledGraph<S: GraphState> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    edges: HashMap<String, Edge<S>>,
    entry: String,
    error_handler: Option<String>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
}

impl<S: GraphState> CompiledGraph<S> {
    pub(super) fn new(
        nodes: HashMap<String, Arc<dyn Node<S>>>,
        edges: HashMap<String, Edge<S>>,
        entry: String,
        error_handler: Option<String>,
        checkpointer: Option<Arc<dyn Checkpointer>>,
    ) -> Self {
        Self {
            nodes,
            edges,
            entry,
            error_handler,
            checkpointer,
        }
    }

    /// Node names, sorted
    pub fn node_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Run the graph to completion
    pub async fn invoke(&self, state: S, config: &RunConfig) -> Result<S, CopilotError> {
        self.execute(state, config, None).await
    }

    /// Run the graph, sending a [`GraphEvent`] for every step
    pub async fn invoke_stream(
        &self,
        state: S,
        config: &RunConfig,
        tx: mpsc::Sender<GraphEvent>,
    ) -> Result<S, CopilotError> {
        self.execute(state, config, Some(&tx)).await
    }

    /// Latest checkpointed state of a thread
    pub async fn get_state(&self, thread_id: &str) -> Result<Option<S>, CopilotError> {
        let Some(checkpointer) = &self.checkpointer else {
            return Ok(None);
        };
        match checkpointer.latest(thread_id).await? {
            Some(checkpoint) => Ok(Some(serde_json::from_value(checkpoint.state)?)),
            None => Ok(None),
        }
    }

    /// Follow the outgoing edge of `from`
    fn next_node(&self, from: &str, state: &S) -> Result<String, GraphError> {
        match self.edges.get(from) {
            Some(Edge::Direct(to)) => Ok(to.clone()),
            Some(Edge::Conditional { route, branches }) => {
                let label = route(state);
                log::debug!("Node {} routed to '{}'", from, label);
                branches
                    .get(&label)
                    .cloned()
                    .ok_or_else(|| GraphError::UnknownBranch {
                        node: from.to_string(),
                        label,
                    })
            }
            None => Err(GraphError::DeadEnd(from.to_string())),
        }
    }

    async fn save_checkpoint(
        &self,
        config: &RunConfig,
        step: u64,
        node: &str,
        state: &S,
    ) -> Result<(), CopilotError> {
        if let (Some(checkpointer), Some(thread_id)) = (&self.checkpointer, &config.thread_id) {
            let snapshot = serde_json::to_value(state)?;
            checkpointer
                .put(Checkpoint::new(thread_id, step, node, snapshot))
                .await?;
        }
        Ok(())
    }

    async fn execute(
        &self,
        mut state: S,
        config: &RunConfig,
        events: Option<&mpsc::Sender<GraphEvent>>,
    ) -> Result<S, CopilotError> {
        let mut checkpoint_step = match (&self.checkpointer, &config.thread_id) {
            (Some(checkpointer), Some(thread_id)) => checkpointer.next_step(thread_id).await?,
            _ => 0,
        };

        let mut current = self.entry.clone();
        let mut steps = 0usize;

        while current != END {
            if steps >= config.recursion_limit {
                log::error!(
                    "Graph run exceeded recursion limit ({})",
                    config.recursion_limit
                );
                return Err(GraphError::RecursionLimit(config.recursion_limit).into());
            }
            steps += 1;

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| GraphError::UnknownNode(current.clone()))?;

            log::info!("Step {}: executing node {}", steps, current);
            emit(
                events,
                GraphEvent::NodeStarted {
                    node: current.clone(),
                    step: steps,
                },
            )
            .await;

            let next = match node.run(&state).await {
                Ok(update) => {
                    state.apply(update);
                    self.next_node(&current, &state)?
                }
                Err(e) => {
                    let message = e.to_string();
                    log::error!("Node {} failed: {}", current, message);
                    emit(
                        events,
                        GraphEvent::NodeFailed {
                            node: current.clone(),
                            error: message.clone(),
                        },
                    )
                    .await;

                    match &self.error_handler {
                        Some(handler) if *handler != current => {
                            state.record_error(&current, &message);
                            handler.clone()
                        }
                        _ => {
                            return Err(GraphError::NodeFailed {
                                node: current,
                                message,
                            }
                            .into())
                        }
                    }
                }
            };

            self.save_checkpoint(config, checkpoint_step, &current, &state)
                .await?;
            checkpoint_step += 1;

            if events.is_some() {
                emit(
                    events,
                    GraphEvent::StateUpdated {
                        node: current.clone(),
                        step: steps,
                        state: serde_json::to_value(&state)?,
                    },
                )
                .await;
            }

            current = next;
        }

        log::info!("Graph run finished after {} steps", steps);
        emit(events, GraphEvent::Finished { steps }).await;
        Ok(state)
    }
}

async fn emit(events: Option<&mpsc::Sender<GraphEvent>>, event: GraphEvent) {
    if let Some(tx) = events {
        // A dropped receiver only means nobody is listening any more.
        let _ = tx.send(event).await;
    }
}
