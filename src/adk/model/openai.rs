// SPDX-License-Identifier: MIT

//! OpenAI Model - chat completions API (and compatible endpoints)

use super::{ChatMessage, ChatModel, GenerationConfig, ModelResponse, Role, ToolCall};
use crate::adk::error::{CopilotError, ModelError};
use crate::adk::tool::Tool;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI chat model with function-calling support
pub struct OpenAIChatModel {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
    generation: GenerationConfig,
}

impl OpenAIChatModel {
    pub fn new(
        model_name: String,
        api_key: String,
        base_url: Option<String>,
        generation: GenerationConfig,
        timeout_secs: u64,
    ) -> Result<Self, CopilotError> {
        if api_key.trim().is_empty() {
            return Err(ModelError::ApiKeyMissing("openai".to_string()).into());
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model_name,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            generation,
        })
    }

    fn to_openai_message(message: &ChatMessage) -> Value {
        match message.role {
            Role::System => json!({"role": "system", "content": message.content}),
            Role::User => json!({"role": "user", "content": message.content}),
            Role::Assistant => json!({"role": "assistant", "content": message.content}),
            // No tool_call ids across turns: replay tool output as user text
            Role::Tool => json!({
                "role": "user",
                "content": format!("Tool result:\n{}", message.content)
            }),
        }
    }

    fn tools_to_openai_format(tools: &[Arc<dyn Tool>]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name(),
                        "description": t.description(),
                        "parameters": t.schema()
                    }
                })
            })
            .collect()
    }

    fn build_request_body(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Arc<dyn Tool>]>,
    ) -> Value {
        let messages: Vec<Value> = messages.iter().map(Self::to_openai_message).collect();

        let mut body = json!({
            "model": self.model_name,
            "messages": messages
        });

        if let Some(temp) = self.generation.temperature {
            body["temperature"] = json!(temp);
        }
        if let Some(max_tokens) = self.generation.max_output_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        if let Some(tools) = tools {
            if !tools.is_empty() {
                body["tools"] = json!(Self::tools_to_openai_format(tools));
                body["tool_choice"] = json!("auto");
            }
        }

        body
    }

    fn parse_response(response: &Value) -> Result<ModelResponse, ModelError> {
        let message = response["choices"]
            .as_array()
            .and_then(|c| c.first())
            .map(|choice| &choice["message"])
            .ok_or_else(|| ModelError::InvalidResponse("no choices in response".to_string()))?;

        let text = message["content"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let tool_calls = message["tool_calls"]
            .as_array()
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|tc| {
                        let name = tc["function"]["name"].as_str()?;
                        let args_str = tc["function"]["arguments"].as_str().unwrap_or("{}");
                        Some(ToolCall {
                            id: tc["id"].as_str().unwrap_or(name).to_string(),
                            name: name.to_string(),
                            args: serde_json::from_str(args_str).unwrap_or_else(|_| json!({})),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ModelResponse { text, tool_calls })
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Arc<dyn Tool>]>,
    ) -> Result<ModelResponse, Box<dyn Error + Send + Sync>> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request_body(messages, tools);

        log::debug!(
            "OpenAI request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await?;
            return Err(Box::new(CopilotError::api(
                "openai",
                format!("{}: {}", status, text),
            )));
        }

        let resp_json: Value = resp.json().await?;
        log::debug!("OpenAI response: {}", resp_json);

        Ok(Self::parse_response(&resp_json)?)
    }
}
