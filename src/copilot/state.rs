// SPDX-License-Identifier: MIT

//! Shared research state passed between graph nodes
//!
//! Nodes never mutate the state directly; they return a [`StateUpdate`].
//! List fields are appended in node execution order, scalar fields are
//! last-write-wins.

use crate::adk::graph::GraphState;
use crate::adk::model::{ChatMessage, Role};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a resource came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceSource {
    Arxiv,
    Web,
    Rag,
}

/// A paper, web page or retrieved document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub url: String,
    pub title: String,
    pub description: String,
    pub source: ResourceSource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Resource {
    pub fn new(
        source: ResourceSource,
        title: impl Into<String>,
        url: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            description: description.into(),
            source,
            authors: Vec::new(),
            published: None,
            score: None,
        }
    }
}

/// Progress entry shown to the user while the graph runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: String,
    pub done: bool,
}

impl LogEntry {
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            done: true,
        }
    }
}

/// Branch labels the oracle can pick. They double as node and tool names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    ArxivSearch,
    WebSearch,
    RagSearch,
    FinalAnswer,
}

impl Route {
    pub const TOOLS: [Route; 3] = [Route::ArxivSearch, Route::WebSearch, Route::RagSearch];

    pub fn as_str(&self) -> &'static str {
        match self {
            Route::ArxivSearch => "arxiv_search",
            Route::WebSearch => "web_search",
            Route::RagSearch => "rag_search",
            Route::FinalAnswer => "final_answer",
        }
    }

    /// Route for a tool name, `None` for anything that is not a search tool
    pub fn from_tool_name(name: &str) -> Option<Route> {
        Route::TOOLS.into_iter().find(|r| r.as_str() == name)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The oracle's latest choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub route: Route,
    /// Query the chosen tool should run
    pub query: String,
}

/// Record of one tool-node execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntermediateStep {
    pub tool: String,
    pub query: String,
    pub result_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IntermediateStep {
    /// Whether the step produced anything worth answering with
    pub fn found_results(&self) -> bool {
        self.error.is_none() && self.result_count > 0
    }
}

/// State of one research conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchState {
    pub messages: Vec<ChatMessage>,
    pub resources: Vec<Resource>,
    pub logs: Vec<LogEntry>,
    pub decision: Option<Decision>,
    pub intermediate_steps: Vec<IntermediateStep>,
    pub error: Option<String>,
}

impl ResearchState {
    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Content of the most recent non-empty user message
    pub fn latest_query(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.trim())
            .find(|c| !c.is_empty())
    }

    /// Content of the most recent assistant message
    pub fn last_answer(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    /// Start a new question on a resumed thread.
    ///
    /// Messages carry over; everything produced while answering the previous
    /// question is cleared.
    pub fn begin_turn(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.resources.clear();
        self.logs.clear();
        self.decision = None;
        self.intermediate_steps.clear();
        self.error = None;
    }

    /// Whether a tool already ran during this turn
    pub fn tried(&self, route: Route) -> bool {
        self.intermediate_steps
            .iter()
            .any(|s| s.tool == route.as_str())
    }

    pub fn last_step(&self) -> Option<&IntermediateStep> {
        self.intermediate_steps.last()
    }
}

/// Partial update returned by a node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub messages: Vec<ChatMessage>,
    pub resources: Vec<Resource>,
    pub logs: Vec<LogEntry>,
    pub intermediate_steps: Vec<IntermediateStep>,
    pub decision: Option<Decision>,
    pub error: Option<String>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn resources(mut self, resources: Vec<Resource>) -> Self {
        self.resources.extend(resources);
        self
    }

    pub fn log(mut self, entry: LogEntry) -> Self {
        self.logs.push(entry);
        self
    }

    pub fn step(mut self, step: IntermediateStep) -> Self {
        self.intermediate_steps.push(step);
        self
    }

    pub fn decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }
}

impl GraphState for ResearchState {
    type Update = StateUpdate;

    fn apply(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);
        self.resources.extend(update.resources);
        self.logs.extend(update.logs);
        self.intermediate_steps.extend(update.intermediate_steps);
        if update.decision.is_some() {
            self.decision = update.decision;
        }
        if update.error.is_some() {
            self.error = update.error;
        }
    }

    fn record_error(&mut self, node: &str, message: &str) {
        self.error = Some(message.to_string());
        self.logs
            .push(LogEntry::done(format!("Node '{}' failed: {}", node, message)));
    }
}
