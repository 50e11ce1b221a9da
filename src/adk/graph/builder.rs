// SPDX-License-Identifier: MIT

//! StateGraph builder and compile-time validation

use super::executor::CompiledGraph;
use super::types::{Edge, GraphState, Node, END, START};
use crate::adk::checkpoint::Checkpointer;
use crate::adk::error::GraphError;
use std::collections::HashMap;
use std::sync::Arc;

/// Mutable graph definition. Compile it to run it.
pub struct StateGraph<S: GraphState> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    edges: HashMap<String, Edge<S>>,
    entry: Option<String>,
    error_handler: Option<String>,
    duplicate: Option<String>,
}

impl<S: GraphState> Default for StateGraph<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: GraphState> StateGraph<S> {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry: None,
            error_handler: None,
            duplicate: None,
        }
    }

    /// Add a node under its own name. A second node with the same name fails compilation.
    pub fn add_node(&mut self, node: Arc<dyn Node<S>>) -> &mut Self {
        let name = node.name().to_string();
        if self.nodes.contains_key(&name) {
            self.duplicate.get_or_insert(name);
        } else {
            self.nodes.insert(name, node);
        }
        self
    }

    /// Unconditional edge. `add_edge(START, x)` makes `x` the entry node.
    pub fn add_edge(&mut self, from: &str, to: &str) -> &mut Self {
        if from == START {
            self.entry = Some(to.to_string());
        } else {
            self.set_edge(from, Edge::Direct(to.to_string()));
        }
        self
    }

    /// Same as `add_edge(START, name)`
    pub fn set_entry(&mut self, name: &str) -> &mut Self {
        self.entry = Some(name.to_string());
        self
    }

    /// Conditional edge: `route` returns a label, `branches` maps labels to nodes.
    pub fn add_conditional_edges<F, I, L, T>(&mut self, from: &str, route: F, branches: I) -> &mut Self
    where
        F: Fn(&S) -> String + Send + Sync + 'static,
        I: IntoIterator<Item = (L, T)>,
        L: Into<String>,
        T: Into<String>,
    {
        let branches = branches
            .into_iter()
            .map(|(label, target)| (label.into(), target.into()))
            .collect();
        self.set_edge(
            from,
            Edge::Conditional {
                route: Arc::new(route),
                branches,
            },
        );
        self
    }

    /// Node that takes over when any other node returns an error
    pub fn set_error_handler(&mut self, name: &str) -> &mut Self {
        self.error_handler = Some(name.to_string());
        self
    }

    fn set_edge(&mut self, from: &str, edge: Edge<S>) {
        if self.edges.insert(from.to_string(), edge).is_some() {
            log::warn!("Replacing existing outgoing edge of node '{}'", from);
        }
    }

    fn validate(&self) -> Result<String, GraphError> {
        if let Some(name) = &self.duplicate {
            return Err(GraphError::DuplicateNode(name.clone()));
        }

        let entry = self.entry.clone().ok_or(GraphError::MissingEntry)?;
        if !self.nodes.contains_key(&entry) {
            return Err(GraphError::UnknownNode(entry));
        }

        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(GraphError::UnknownNode(from.clone()));
            }
            for target in edge.targets() {
                if target != END && !self.nodes.contains_key(target) {
                    return Err(GraphError::UnknownNode(target.to_string()));
                }
            }
        }

        // Deterministic error for tests and logs
        let mut names: Vec<&String> = self.nodes.keys().collect();
        names.sort();
        if let Some(dead) = names.into_iter().find(|n| !self.edges.contains_key(*n)) {
            return Err(GraphError::DeadEnd(dead.clone()));
        }

        if let Some(handler) = &self.error_handler {
            if !self.nodes.contains_key(handler) {
                return Err(GraphError::UnknownNode(handler.clone()));
            }
        }

        Ok(entry)
    }

    /// Validate and freeze the graph
    pub fn compile(self) -> Result<CompiledGraph<S>, GraphError> {
        self.compile_inner(None)
    }

    /// Validate and freeze the graph; runs with a thread id are checkpointed
    pub fn compile_with_checkpointer(
        self,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Result<CompiledGraph<S>, GraphError> {
        self.compile_inner(Some(checkpointer))
    }

    fn compile_inner(
        self,
        checkpointer: Option<Arc<dyn Checkpointer>>,
    ) -> Result<CompiledGraph<S>, GraphError> {
        let entry = self.validate()?;
        log::debug!(
            "Compiled graph with {} nodes, entry '{}'",
            self.nodes.len(),
            entry
        );
        Ok(CompiledGraph::new(
            self.nodes,
            self.edges,
            entry,
            self.error_handler,
            checkpointer,
        ))
    }
}
