// SPDX-License-Identifier: MIT

use super::{http_client, SearchArgs, ToolOutput};
use crate::adk::error::CopilotError;
use crate::adk::tool::{args_schema, Tool};
use crate::copilot::config::WebSearchConfig;
use crate::copilot::state::{Resource, ResourceSource};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::error::Error;

static WEB_SEARCH_SCHEMA: Lazy<Value> = Lazy::new(args_schema::<SearchArgs>);

/// Most resources kept from one web search
pub const TOP_RESOURCES: usize = 5;

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: Option<f64>,
}

impl From<TavilyResult> for Resource {
    fn from(r: TavilyResult) -> Self {
        let mut resource = Resource::new(ResourceSource::Web, r.title, r.url, r.content);
        resource.score = r.score;
        resource
    }
}

/// Keep the most relevant resources of a search result, ordered by title
pub fn extract_top_resources(mut resources: Vec<Resource>, limit: usize) -> Vec<Resource> {
    log::info!("Extracting top resources from search results");
    resources.sort_by(|a, b| a.title.cmp(&b.title));
    resources.truncate(limit);
    resources
}

/// Web search through the Tavily API
pub struct TavilySearchTool {
    client: Client,
    api_key: String,
    base_url: String,
    max_results: u32,
    search_depth: String,
}

impl TavilySearchTool {
    pub fn new(config: &WebSearchConfig) -> Result<Self, CopilotError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| CopilotError::config("TAVILY_API_KEY must be set"))?;
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_results: config.max_results,
            search_depth: config.search_depth.clone(),
        })
    }
}

#[async_trait]
impl Tool for TavilySearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Searches the web using the Tavily API. Returns relevant pages with titles, URLs, and content snippets."
    }

    fn schema(&self) -> &Value {
        &WEB_SEARCH_SCHEMA
    }

    async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
        let args: SearchArgs = serde_json::from_value(input)?;
        let max_results = args.max_results.unwrap_or(self.max_results);

        log::info!("Performing search for input: {}", args.query);
        let resp = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&json!({
                "api_key": self.api_key,
                "query": args.query,
                "max_results": max_results,
                "search_depth": self.search_depth,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(Box::new(CopilotError::api("tavily", text)));
        }

        let body: TavilyResponse = resp.json().await?;
        let results: Vec<Resource> = body.results.into_iter().map(Resource::from).collect();
        log::info!(
            "Search results for input '{}' fetched successfully ({} results)",
            args.query,
            results.len()
        );

        Ok(serde_json::to_value(ToolOutput {
            query: args.query,
            results,
        })?)
    }
}
