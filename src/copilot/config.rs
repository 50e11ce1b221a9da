// SPDX-License-Identifier: MIT

//! Copilot configuration
//!
//! Values come from an optional YAML file, then environment variables
//! (typically loaded from `.env`) override them. API keys are never written
//! back out when a config is serialized.

use crate::adk::error::{CopilotError, ModelError};
use crate::adk::graph::RunConfig;
use crate::adk::model::openai::OpenAIChatModel;
use crate::adk::model::{ChatModel, GenerationConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CopilotConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub arxiv: ArxivConfig,
    pub web_search: WebSearchConfig,
    pub rag: RagConfig,
    pub graph: GraphConfig,
    pub checkpoint: CheckpointConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: String,
    pub name: String,
    pub base_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            name: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key: None,
            temperature: Some(0.0),
            max_output_tokens: None,
            timeout_secs: 60,
        }
    }
}

impl ModelConfig {
    /// Build the configured chat model.
    ///
    /// `Ok(None)` when no API key is set: routing then uses keyword rules only
    /// and answers are plain resource listings.
    pub fn build(&self) -> Result<Option<Arc<dyn ChatModel>>, CopilotError> {
        let Some(api_key) = self.api_key.clone() else {
            log::info!("No chat model API key configured; running without a model");
            return Ok(None);
        };

        match self.provider.to_lowercase().as_str() {
            "openai" => {
                let model = OpenAIChatModel::new(
                    self.name.clone(),
                    api_key,
                    self.base_url.clone(),
                    GenerationConfig {
                        temperature: self.temperature,
                        max_output_tokens: self.max_output_tokens,
                    },
                    self.timeout_secs,
                )?;
                log::info!("Using provider: openai with model: {}", self.name);
                Ok(Some(Arc::new(model)))
            }
            other => Err(ModelError::UnsupportedProvider(other.to_string()).into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArxivConfig {
    pub base_url: String,
    pub max_results: u32,
    pub timeout_secs: u64,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            base_url: "http://export.arxiv.org/api/query".to_string(),
            max_results: 5,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub max_results: u32,
    /// Tavily search depth: `basic` or `advanced`
    pub search_depth: String,
    pub timeout_secs: u64,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.tavily.com".to_string(),
            api_key: None,
            max_results: 5,
            search_depth: "basic".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Lookup endpoint; RAG routing is disabled when unset
    pub endpoint: Option<String>,
    pub top_k: u32,
    pub timeout_secs: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            top_k: 4,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub recursion_limit: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            recursion_limit: RunConfig::default().recursion_limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Checkpoints kept per thread
    pub max_history: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self { max_history: 20 }
    }
}

impl CopilotConfig {
    /// Read the YAML file (if given) and apply process environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, CopilotError> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    CopilotError::config(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_yaml(&content)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, CopilotError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply overrides from an environment lookup; blank values are ignored
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("TAVILY_API_KEY") {
            self.web_search.api_key = Some(v);
        }
        if let Some(v) = get("TAVILY_BASE_URL") {
            self.web_search.base_url = v;
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.model.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.model.base_url = Some(v);
        }
        if let Some(v) = get("COPILOT_MODEL") {
            self.model.name = v;
        }
        if let Some(v) = get("RAG_ENDPOINT") {
            self.rag.endpoint = Some(v);
        }
        if let Some(v) = get("ARXIV_BASE_URL") {
            self.arxiv.base_url = v;
        }
        if let Some(v) = get("PORT") {
            match v.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => log::warn!("Ignoring invalid PORT value: {}", v),
            }
        }
    }

    pub fn validate(&self) -> Result<(), CopilotError> {
        if self.graph.recursion_limit == 0 {
            return Err(CopilotError::config("graph.recursion_limit must be positive"));
        }
        if self.checkpoint.max_history == 0 {
            return Err(CopilotError::config("checkpoint.max_history must be positive"));
        }
        if self.arxiv.max_results == 0 || self.web_search.max_results == 0 {
            return Err(CopilotError::config("max_results must be positive"));
        }
        for (name, url) in [
            ("arxiv.base_url", Some(&self.arxiv.base_url)),
            ("web_search.base_url", Some(&self.web_search.base_url)),
            ("rag.endpoint", self.rag.endpoint.as_ref()),
        ] {
            if let Some(url) = url {
                url::Url::parse(url)
                    .map_err(|e| CopilotError::config(format!("{} '{}': {}", name, url, e)))?;
            }
        }
        Ok(())
    }
}
