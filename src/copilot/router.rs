// SPDX-License-Identifier: MIT

//! The oracle: picks the next node of a research turn
//!
//! The first decision of a turn comes from keyword rules, or from the chat
//! model when no rule matches. After each tool node the oracle either
//! finishes (results found) or falls back to the next untried tool.

use crate::adk::error::CopilotError;
use crate::adk::graph::Node;
use crate::adk::model::{ChatMessage, ChatModel};
use crate::adk::tool::Tool;
use crate::copilot::state::{Decision, LogEntry, ResearchState, Route, StateUpdate};
use async_trait::async_trait;
use std::sync::Arc;

pub const ORACLE: &str = "oracle";

const ORACLE_PROMPT: &str = "You are a research assistant. Pick exactly one tool to answer the \
user's latest question: arxiv_search for academic papers, web_search for general or recent web \
content, rag_search for the indexed document collection. Call the tool with a concise search query.";

/// Route chosen by a keyword rule, if any applies.
///
/// Both keywords are plain, case-sensitive substring matches.
pub fn keyword_route(query: &str, available: &[Route]) -> Option<Route> {
    if query.contains("RAG") && available.contains(&Route::RagSearch) {
        return Some(Route::RagSearch);
    }
    if query.contains("web") && available.contains(&Route::WebSearch) {
        return Some(Route::WebSearch);
    }
    None
}

/// First decision for a turn when no model is consulted
pub fn route_query(query: &str, available: &[Route]) -> Route {
    keyword_route(query, available).unwrap_or_else(|| {
        [Route::ArxivSearch, Route::WebSearch]
            .into_iter()
            .find(|r| available.contains(r))
            .unwrap_or(Route::FinalAnswer)
    })
}

/// Decision after a tool node ran
pub fn next_after_step(state: &ResearchState, available: &[Route]) -> Route {
    let Some(last) = state.last_step() else {
        return Route::FinalAnswer;
    };
    if last.found_results() {
        return Route::FinalAnswer;
    }

    let chain = if last.tool == Route::RagSearch.as_str() {
        [Route::WebSearch, Route::ArxivSearch]
    } else {
        [Route::ArxivSearch, Route::WebSearch]
    };
    chain
        .into_iter()
        .find(|r| available.contains(r) && !state.tried(*r))
        .unwrap_or(Route::FinalAnswer)
}

/// Conditional-edge function: branch label of the current decision
pub fn route_decision(state: &ResearchState) -> String {
    state
        .decision
        .as_ref()
        .map(|d| d.route)
        .unwrap_or(Route::FinalAnswer)
        .as_str()
        .to_string()
}

/// Routing node
pub struct Oracle {
    tools: Vec<Arc<dyn Tool>>,
    available: Vec<Route>,
    model: Option<Arc<dyn ChatModel>>,
}

impl Oracle {
    pub fn new(tools: Vec<Arc<dyn Tool>>, model: Option<Arc<dyn ChatModel>>) -> Self {
        let tools: Vec<Arc<dyn Tool>> = tools
            .into_iter()
            .filter(|t| Route::from_tool_name(t.name()).is_some())
            .collect();
        let available = tools
            .iter()
            .filter_map(|t| Route::from_tool_name(t.name()))
            .collect();
        Self {
            tools,
            available,
            model,
        }
    }

    pub fn available(&self) -> &[Route] {
        &self.available
    }

    /// Let the model pick a tool. `Ok(None)` when it did not call a usable one.
    async fn ask_model(
        &self,
        model: &dyn ChatModel,
        state: &ResearchState,
        query: &str,
    ) -> Result<Option<Decision>, CopilotError> {
        let mut messages = vec![ChatMessage::system(ORACLE_PROMPT)];
        messages.extend(state.messages.iter().cloned());

        let response = model.complete(&messages, Some(self.tools.as_slice())).await?;
        let Some(call) = response.tool_calls.first() else {
            log::debug!("Model answered without a tool call");
            return Ok(None);
        };

        let Some(route) = Route::from_tool_name(&call.name).filter(|r| self.available.contains(r))
        else {
            log::warn!("Model called unknown tool '{}'", call.name);
            return Ok(None);
        };

        let refined = call
            .args
            .get("query")
            .and_then(|q| q.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or(query);

        Ok(Some(Decision {
            route,
            query: refined.to_string(),
        }))
    }

    async fn first_decision(&self, state: &ResearchState, query: &str) -> Decision {
        if let Some(route) = keyword_route(query, &self.available) {
            return Decision {
                route,
                query: query.to_string(),
            };
        }

        if let Some(model) = &self.model {
            match self.ask_model(model.as_ref(), state, query).await {
                Ok(Some(decision)) => return decision,
                Ok(None) => {}
                Err(e) => log::warn!("Model routing failed, using rules: {}", e),
            }
        }

        Decision {
            route: route_query(query, &self.available),
            query: query.to_string(),
        }
    }
}

#[async_trait]
impl Node<ResearchState> for Oracle {
    fn name(&self) -> &str {
        ORACLE
    }

    async fn run(&self, state: &ResearchState) -> Result<StateUpdate, CopilotError> {
        let query = state
            .latest_query()
            .ok_or_else(|| CopilotError::invalid_input("No input found in the message content"))?;

        let decision = if state.last_step().is_some() {
            let query = state
                .decision
                .as_ref()
                .map(|d| d.query.clone())
                .unwrap_or_else(|| query.to_string());
            Decision {
                route: next_after_step(state, &self.available),
                query,
            }
        } else {
            log::info!("Received query: {}", query);
            self.first_decision(state, query).await
        };

        log::info!("Oracle decision: {} ('{}')", decision.route, decision.query);
        let message = match decision.route {
            Route::FinalAnswer => "Preparing the answer".to_string(),
            route => format!("Routing '{}' to {}", decision.query, route),
        };

        Ok(StateUpdate::new()
            .decision(decision)
            .log(LogEntry::done(message)))
    }
}
