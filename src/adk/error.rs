// SPDX-License-Identifier: MIT

//! Typed error handling for research-copilot
//!
//! Tool and model traits still hand back `Box<dyn Error + Send + Sync>`;
//! everything above them (graph, checkpoints, server) speaks `CopilotError`.

use thiserror::Error;

/// Top-level error type for research-copilot
#[derive(Debug, Error)]
pub enum CopilotError {
    /// API errors from external services (arXiv, Tavily, RAG backend, chat model)
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Tool not registered
    #[error("Tool '{name}' not found")]
    ToolNotFound { name: String },

    /// Configuration errors (missing env vars, invalid config file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or empty user input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Graph construction or execution errors
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Checkpoint storage errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Chat model errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Atom feed decoding errors
    #[error(transparent)]
    Xml(#[from] quick_xml::de::DeError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Generic error wrapper for compatibility
    #[error("{0}")]
    Other(String),
}

/// Errors raised while compiling or running a state graph
#[derive(Debug, Error)]
pub enum GraphError {
    /// No entry node configured
    #[error("Graph has no entry node")]
    MissingEntry,

    /// An edge or setting refers to a node that was never added
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// Two nodes registered under the same name
    #[error("Duplicate node: {0}")]
    DuplicateNode(String),

    /// A node has no outgoing edge
    #[error("Node '{0}' has no outgoing edge")]
    DeadEnd(String),

    /// A conditional router returned a label with no branch
    #[error("Node '{node}' routed to unknown branch '{label}'")]
    UnknownBranch { node: String, label: String },

    /// Step budget exhausted
    #[error("Recursion limit of {0} steps reached")]
    RecursionLimit(usize),

    /// A node failed and no error handler could take over
    #[error("Node '{node}' failed: {message}")]
    NodeFailed { node: String, message: String },
}

/// Checkpoint storage errors
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("storage: {0}")]
    Storage(String),
}

/// Model/LLM-specific errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Provider name not recognised
    #[error("Unsupported model provider: {0}")]
    UnsupportedProvider(String),

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),
}

impl CopilotError {
    /// Create an API error
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a tool not found error
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound { name: name.into() }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Whether the caller sent something unusable (as opposed to a server-side failure)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

impl From<&str> for CopilotError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for CopilotError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for CopilotError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Other(err.to_string())
    }
}
