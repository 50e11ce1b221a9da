// SPDX-License-Identifier: MIT

use super::{http_client, truncate_chars, SearchArgs, ToolOutput};
use crate::adk::error::CopilotError;
use crate::adk::tool::{args_schema, Tool};
use crate::copilot::config::RagConfig;
use crate::copilot::state::{Resource, ResourceSource};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::error::Error;

static RAG_SEARCH_SCHEMA: Lazy<Value> = Lazy::new(args_schema::<SearchArgs>);

const MAX_DESCRIPTION_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    documents: Vec<Document>,
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    title: Option<String>,
    content: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    score: Option<f64>,
}

impl Document {
    fn into_resource(self, index: usize) -> Resource {
        let title = self
            .title
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.source.clone())
            .unwrap_or_else(|| format!("Document {}", index + 1));
        let url = self.url.or(self.source).unwrap_or_default();

        let mut resource = Resource::new(
            ResourceSource::Rag,
            title,
            url,
            truncate_chars(self.content.trim(), MAX_DESCRIPTION_CHARS),
        );
        resource.score = self.score;
        resource
    }
}

/// Retrieval lookup against a document index service
pub struct RagLookupTool {
    client: Client,
    endpoint: String,
    top_k: u32,
}

impl RagLookupTool {
    pub fn new(config: &RagConfig) -> Result<Self, CopilotError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| CopilotError::config("RAG_ENDPOINT must be set"))?;
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            endpoint,
            top_k: config.top_k,
        })
    }
}

#[async_trait]
impl Tool for RagLookupTool {
    fn name(&self) -> &str {
        "rag_search"
    }

    fn description(&self) -> &str {
        "Looks up passages in the indexed document collection (retrieval augmented generation)."
    }

    fn schema(&self) -> &Value {
        &RAG_SEARCH_SCHEMA
    }

    async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
        let args: SearchArgs = serde_json::from_value(input)?;
        let top_k = args.max_results.unwrap_or(self.top_k);

        log::info!("RAG lookup for: {}", args.query);
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "query": args.query,
                "top_k": top_k,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(Box::new(CopilotError::api("rag", text)));
        }

        let body: LookupResponse = resp.json().await?;
        let results: Vec<Resource> = body
            .documents
            .into_iter()
            .enumerate()
            .map(|(i, doc)| doc.into_resource(i))
            .collect();

        Ok(serde_json::to_value(ToolOutput {
            query: args.query,
            results,
        })?)
    }
}
