// SPDX-License-Identifier: MIT

//! Search tools used by the tool nodes
//!
//! Every tool takes `{"query": ..., "max_results"?: ...}` and returns a
//! [`ToolOutput`] serialized as JSON.

pub mod arxiv;
pub mod rag;
pub mod web;

use crate::adk::error::CopilotError;
use crate::adk::tool::Tool;
use crate::copilot::config::CopilotConfig;
use crate::copilot::registry::ToolRegistry;
use crate::copilot::state::Resource;
use reqwest::Client;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Arguments shared by all search tools
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchArgs {
    /// The search query
    pub query: String,
    /// Maximum number of results to return
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
}

impl SearchArgs {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: None,
        }
    }
}

/// Result shape shared by all search tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub query: String,
    pub results: Vec<Resource>,
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<Client, CopilotError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Collapse runs of whitespace (feeds wrap titles and abstracts across lines)
pub(crate) fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate on a char boundary, appending an ellipsis when shortened
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// Build every tool the configuration allows.
///
/// arXiv needs nothing; web search needs a Tavily key; RAG needs an endpoint.
/// Missing prerequisites are logged and the tool is skipped.
pub fn create_tools(config: &CopilotConfig) -> Vec<Arc<dyn Tool>> {
    let mut tools: Vec<Arc<dyn Tool>> = Vec::new();

    match arxiv::ArxivSearchTool::new(&config.arxiv) {
        Ok(tool) => tools.push(Arc::new(tool)),
        Err(e) => log::warn!("Failed to load arXiv search tool: {}", e),
    }

    match web::TavilySearchTool::new(&config.web_search) {
        Ok(tool) => tools.push(Arc::new(tool)),
        Err(e) => log::warn!("Failed to load web search tool: {}", e),
    }

    match rag::RagLookupTool::new(&config.rag) {
        Ok(tool) => tools.push(Arc::new(tool)),
        Err(e) => log::warn!("Failed to load RAG lookup tool: {}", e),
    }

    tools
}

/// Register [`create_tools`] output into a registry
pub async fn register_tools(registry: &ToolRegistry, config: &CopilotConfig) {
    for tool in create_tools(config) {
        log::info!("Registered tool: {}", tool.name());
        registry.register(tool).await;
    }
}
