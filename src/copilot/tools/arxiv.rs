// SPDX-License-Identifier: MIT

//! arXiv search over the public Atom API

use super::{http_client, normalize_whitespace, SearchArgs, ToolOutput};
use crate::adk::error::CopilotError;
use crate::adk::tool::{args_schema, Tool};
use crate::copilot::config::ArxivConfig;
use crate::copilot::state::{Resource, ResourceSource};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::error::Error;

static ARXIV_SEARCH_SCHEMA: Lazy<Value> = Lazy::new(args_schema::<SearchArgs>);

/// Hard cap the API is polite about in a single request
const MAX_RESULTS_CAP: u32 = 50;

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    published: Option<String>,
    #[serde(rename = "author", default)]
    authors: Vec<AtomAuthor>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
}

impl AtomEntry {
    /// arXiv reports query errors as a single entry under /api/errors
    fn is_error(&self) -> bool {
        self.id.contains("/api/errors")
    }

    fn abs_url(&self) -> String {
        self.links
            .iter()
            .find(|l| l.rel.as_deref() == Some("alternate"))
            .map(|l| l.href.clone())
            .unwrap_or_else(|| self.id.clone())
    }

    fn into_resource(self) -> Resource {
        let url = self.abs_url();
        Resource {
            url,
            title: normalize_whitespace(&self.title),
            description: normalize_whitespace(&self.summary),
            source: ResourceSource::Arxiv,
            authors: self
                .authors
                .into_iter()
                .map(|a| normalize_whitespace(&a.name))
                .collect(),
            published: self.published,
            score: None,
        }
    }
}

/// Parse an arXiv Atom response into resources
pub fn parse_feed(xml: &str) -> Result<Vec<Resource>, CopilotError> {
    let feed: AtomFeed = quick_xml::de::from_str(xml)?;

    if let Some(err) = feed.entries.iter().find(|e| e.is_error()) {
        return Err(CopilotError::api("arxiv", normalize_whitespace(&err.summary)));
    }

    Ok(feed
        .entries
        .into_iter()
        .map(AtomEntry::into_resource)
        .collect())
}

/// Searches arXiv papers by relevance
pub struct ArxivSearchTool {
    client: Client,
    base_url: String,
    max_results: u32,
}

impl ArxivSearchTool {
    pub fn new(config: &ArxivConfig) -> Result<Self, CopilotError> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config.base_url.clone(),
            max_results: config.max_results,
        })
    }

    fn request_url(&self, args: &SearchArgs) -> Result<url::Url, CopilotError> {
        let count = args
            .max_results
            .unwrap_or(self.max_results)
            .clamp(1, MAX_RESULTS_CAP);

        let mut url = url::Url::parse(&self.base_url)
            .map_err(|e| CopilotError::config(format!("arxiv base url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("search_query", &format!("all:{}", args.query))
            .append_pair("start", "0")
            .append_pair("max_results", &count.to_string())
            .append_pair("sortBy", "relevance");
        Ok(url)
    }
}

#[async_trait]
impl Tool for ArxivSearchTool {
    fn name(&self) -> &str {
        "arxiv_search"
    }

    fn description(&self) -> &str {
        "Searches arXiv for research papers. Returns titles, abstracts, authors and links."
    }

    fn schema(&self) -> &Value {
        &ARXIV_SEARCH_SCHEMA
    }

    async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
        let args: SearchArgs = serde_json::from_value(input)?;
        let url = self.request_url(&args)?;

        log::info!("Searching arXiv for papers related to: {}", args.query);
        let resp = self.client.get(url).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await?;
            return Err(Box::new(CopilotError::api(
                "arxiv",
                format!("{}: {}", status, text),
            )));
        }

        let body = resp.text().await?;
        let results = parse_feed(&body)?;
        log::info!("arXiv returned {} papers", results.len());

        Ok(serde_json::to_value(ToolOutput {
            query: args.query,
            results,
        })?)
    }
}
