// SPDX-License-Identifier: MIT

//! Graph nodes of a research turn: tool searches, the final answer and the
//! error handler

use crate::adk::error::CopilotError;
use crate::adk::graph::Node;
use crate::adk::model::{ChatMessage, ChatModel};
use crate::adk::tool::Tool;
use crate::copilot::state::{
    IntermediateStep, LogEntry, Resource, ResearchState, Route, StateUpdate,
};
use crate::copilot::tools::web::{extract_top_resources, TOP_RESOURCES};
use crate::copilot::tools::{SearchArgs, ToolOutput};
use async_trait::async_trait;
use std::sync::Arc;

pub const HANDLE_ERROR: &str = "handle_error";

const ANSWER_PROMPT: &str = "You are a research assistant. Answer the user's question using only \
the resources listed below. Cite resources by their URL.";

fn missing_input() -> CopilotError {
    CopilotError::invalid_input("No input found in the message content")
}

/// Runs one search tool with the current decision's query
pub struct ToolSearchNode {
    route: Route,
    tool: Arc<dyn Tool>,
}

impl ToolSearchNode {
    /// Fails for tools that are not one of the search routes
    pub fn new(tool: Arc<dyn Tool>) -> Result<Self, CopilotError> {
        let route =
            Route::from_tool_name(tool.name()).ok_or_else(|| CopilotError::tool_not_found(tool.name()))?;
        Ok(Self { route, tool })
    }

    fn query<'a>(&self, state: &'a ResearchState) -> Option<&'a str> {
        state
            .decision
            .as_ref()
            .filter(|d| d.route == self.route)
            .map(|d| d.query.trim())
            .filter(|q| !q.is_empty())
            .or_else(|| state.latest_query())
    }

    async fn search(&self, query: &str) -> Result<Vec<Resource>, CopilotError> {
        let input = serde_json::to_value(SearchArgs::new(query))?;
        let output = self.tool.execute(input).await?;
        let output: ToolOutput = serde_json::from_value(output)?;

        Ok(match self.route {
            Route::WebSearch => extract_top_resources(output.results, TOP_RESOURCES),
            _ => output.results,
        })
    }
}

#[async_trait]
impl Node<ResearchState> for ToolSearchNode {
    fn name(&self) -> &str {
        self.route.as_str()
    }

    async fn run(&self, state: &ResearchState) -> Result<StateUpdate, CopilotError> {
        let query = self.query(state).ok_or_else(missing_input)?;
        log::info!("Running {} for: {}", self.route, query);

        match self.search(query).await {
            Ok(resources) => {
                let count = resources.len();
                log::info!("{} returned {} resources", self.route, count);
                Ok(StateUpdate::new()
                    .step(IntermediateStep {
                        tool: self.route.as_str().to_string(),
                        query: query.to_string(),
                        result_count: count,
                        error: None,
                    })
                    .log(LogEntry::done(format!(
                        "Search results for '{}' fetched from {} ({} found)",
                        query, self.route, count
                    )))
                    .resources(resources))
            }
            Err(e) => {
                log::error!("Error performing search for input '{}': {}", query, e);
                Ok(StateUpdate::new()
                    .step(IntermediateStep {
                        tool: self.route.as_str().to_string(),
                        query: query.to_string(),
                        result_count: 0,
                        error: Some(e.to_string()),
                    })
                    .log(LogEntry::done(format!(
                        "Error performing search for '{}' with {}",
                        query, self.route
                    ))))
            }
        }
    }
}

/// Plain listing of the resources found during a turn
pub fn summarize_resources(query: &str, resources: &[Resource]) -> String {
    if resources.is_empty() {
        return format!(
            "Sorry, I couldn't find any resources for '{}'. Try rephrasing the question.",
            query
        );
    }

    let noun = if resources.len() == 1 { "resource" } else { "resources" };
    let mut out = format!("Found {} {} for '{}':", resources.len(), noun, query);
    for (i, r) in resources.iter().enumerate() {
        out.push_str(&format!("\n{}. {} — {}", i + 1, r.title, r.url));
    }
    out
}

/// Writes the assistant's answer for the turn
pub struct FinalAnswerNode {
    model: Option<Arc<dyn ChatModel>>,
}

impl FinalAnswerNode {
    pub fn new(model: Option<Arc<dyn ChatModel>>) -> Self {
        Self { model }
    }

    async fn compose(
        &self,
        model: &dyn ChatModel,
        query: &str,
        resources: &[Resource],
    ) -> Result<Option<String>, CopilotError> {
        let mut context = String::new();
        for r in resources {
            context.push_str(&format!("- {} ({})\n  {}\n", r.title, r.url, r.description));
        }
        let messages = vec![
            ChatMessage::system(format!("{}\n\nResources:\n{}", ANSWER_PROMPT, context)),
            ChatMessage::user(query),
        ];

        let response = model.complete(&messages, None).await?;
        Ok(response.text.filter(|t| !t.trim().is_empty()))
    }
}

#[async_trait]
impl Node<ResearchState> for FinalAnswerNode {
    fn name(&self) -> &str {
        Route::FinalAnswer.as_str()
    }

    async fn run(&self, state: &ResearchState) -> Result<StateUpdate, CopilotError> {
        let query = state.latest_query().ok_or_else(missing_input)?;
        let resources = &state.resources;

        let mut answer = None;
        if let (Some(model), false) = (&self.model, resources.is_empty()) {
            match self.compose(model.as_ref(), query, resources).await {
                Ok(text) => answer = text,
                Err(e) => log::warn!("{} failed to write the answer: {}", model.model_name(), e),
            }
        }
        let answer = answer.unwrap_or_else(|| summarize_resources(query, resources));

        log::info!("Final answer ready with {} resources", resources.len());
        Ok(StateUpdate::new()
            .message(ChatMessage::assistant(answer))
            .log(LogEntry::done("Answer ready")))
    }
}

/// Turns a recorded node failure into an apology message
pub struct ErrorNode;

#[async_trait]
impl Node<ResearchState> for ErrorNode {
    fn name(&self) -> &str {
        HANDLE_ERROR
    }

    async fn run(&self, state: &ResearchState) -> Result<StateUpdate, CopilotError> {
        let error = state.error.as_deref().unwrap_or("unknown error");
        log::error!("Handling error: {}", error);

        Ok(StateUpdate::new()
            .message(ChatMessage::assistant(format!(
                "Sorry, something went wrong: {}",
                error
            )))
            .log(LogEntry::done("Error handled")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::model::ModelResponse;
    use crate::copilot::state::{Decision, ResourceSource};
    use serde_json::Value;
    use std::error::Error;

    static NULL_SCHEMA: Value = Value::Null;

    /// Tool answering with a fixed result list, or failing when `results` is `None`
    struct FixedTool {
        name: &'static str,
        results: Option<Vec<Resource>>,
    }

    #[async_trait]
    impl Tool for FixedTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "fixed results"
        }

        fn schema(&self) -> &Value {
            &NULL_SCHEMA
        }

        async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
            let args: SearchArgs = serde_json::from_value(input)?;
            match &self.results {
                Some(results) => Ok(serde_json::to_value(ToolOutput {
                    query: args.query,
                    results: results.clone(),
                })?),
                None => Err("connection refused".into()),
            }
        }
    }

    struct EchoModel;

    #[async_trait]
    impl ChatModel for EchoModel {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn complete(
            &self,
            messages: &[ChatMessage],
            _tools: Option<&[Arc<dyn Tool>]>,
        ) -> Result<ModelResponse, Box<dyn Error + Send + Sync>> {
            Ok(ModelResponse {
                text: Some(format!("Summary of: {}", messages[1].content)),
                tool_calls: vec![],
            })
        }
    }

    struct BrokenModel;

    #[async_trait]
    impl ChatModel for BrokenModel {
        fn model_name(&self) -> &str {
            "broken"
        }

        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _tools: Option<&[Arc<dyn Tool>]>,
        ) -> Result<ModelResponse, Box<dyn Error + Send + Sync>> {
            Err("rate limited".into())
        }
    }

    fn web(title: &str) -> Resource {
        Resource::new(
            ResourceSource::Web,
            title,
            format!("https://example.com/{}", title),
            "",
        )
    }

    fn node(name: &'static str, results: Option<Vec<Resource>>) -> ToolSearchNode {
        ToolSearchNode::new(Arc::new(FixedTool { name, results })).unwrap()
    }

    #[test]
    fn test_tool_node_requires_search_tool() {
        let tool = Arc::new(FixedTool {
            name: "calculator",
            results: None,
        });
        assert!(ToolSearchNode::new(tool).is_err());
    }

    #[tokio::test]
    async fn test_tool_node_appends_resources_and_step() {
        let node = node(
            "arxiv_search",
            Some(vec![Resource::new(
                ResourceSource::Arxiv,
                "Attention Is All You Need",
                "http://arxiv.org/abs/1706.03762v7",
                "",
            )]),
        );
        let state = ResearchState::from_messages(vec![ChatMessage::user("transformers")]);

        let update = node.run(&state).await.unwrap();
        assert_eq!(update.resources.len(), 1);
        assert_eq!(update.intermediate_steps[0].tool, "arxiv_search");
        assert_eq!(update.intermediate_steps[0].query, "transformers");
        assert_eq!(update.intermediate_steps[0].result_count, 1);
        assert!(update.logs[0].done);
    }

    #[tokio::test]
    async fn test_tool_node_uses_decision_query() {
        let node = node("web_search", Some(vec![web("a")]));
        let mut state = ResearchState::from_messages(vec![ChatMessage::user("long question")]);
        state.decision = Some(Decision {
            route: Route::WebSearch,
            query: "short query".to_string(),
        });

        let update = node.run(&state).await.unwrap();
        assert_eq!(update.intermediate_steps[0].query, "short query");
    }

    #[tokio::test]
    async fn test_web_node_keeps_top_five_by_title() {
        let results = ["g", "c", "a", "f", "b", "e", "d"].map(web).to_vec();
        let node = node("web_search", Some(results));
        let state = ResearchState::from_messages(vec![ChatMessage::user("web stuff")]);

        let update = node.run(&state).await.unwrap();
        let titles: Vec<&str> = update.resources.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(update.intermediate_steps[0].result_count, 5);
    }

    #[tokio::test]
    async fn test_tool_failure_is_recorded_not_raised() {
        let node = node("web_search", None);
        let state = ResearchState::from_messages(vec![ChatMessage::user("web stuff")]);

        let update = node.run(&state).await.unwrap();
        let step = &update.intermediate_steps[0];
        assert_eq!(step.result_count, 0);
        assert!(step.error.as_deref().unwrap().contains("connection refused"));
        assert!(update.logs[0].message.contains("Error performing search"));
        assert!(update.resources.is_empty());
    }

    #[tokio::test]
    async fn test_tool_node_without_query_is_error() {
        let node = node("arxiv_search", Some(vec![]));
        let err = node.run(&ResearchState::default()).await.unwrap_err();
        assert!(err.to_string().contains("No input found"));
    }

    #[test]
    fn test_summarize_resources() {
        let text = summarize_resources("rust", &[web("axum"), web("tokio")]);
        assert_eq!(
            text,
            "Found 2 resources for 'rust':\n1. axum — https://example.com/axum\n2. tokio — https://example.com/tokio"
        );
        assert!(summarize_resources("rust", &[web("axum")])
            .starts_with("Found 1 resource for 'rust':"));
        assert!(summarize_resources("rust", &[]).starts_with("Sorry"));
    }

    #[tokio::test]
    async fn test_final_answer_without_model() {
        let mut state = ResearchState::from_messages(vec![ChatMessage::user("rust")]);
        state.resources.push(web("axum"));

        let update = FinalAnswerNode::new(None).run(&state).await.unwrap();
        assert_eq!(
            update.messages[0].content,
            "Found 1 resource for 'rust':\n1. axum — https://example.com/axum"
        );
        assert_eq!(update.logs[0].message, "Answer ready");
    }

    #[tokio::test]
    async fn test_final_answer_with_model() {
        let mut state = ResearchState::from_messages(vec![ChatMessage::user("rust")]);
        state.resources.push(web("axum"));

        let update = FinalAnswerNode::new(Some(Arc::new(EchoModel)))
            .run(&state)
            .await
            .unwrap();
        assert_eq!(update.messages[0].content, "Summary of: rust");
    }

    #[tokio::test]
    async fn test_final_answer_model_error_falls_back() {
        let mut state = ResearchState::from_messages(vec![ChatMessage::user("rust")]);
        state.resources.push(web("axum"));

        let update = FinalAnswerNode::new(Some(Arc::new(BrokenModel)))
            .run(&state)
            .await
            .unwrap();
        assert!(update.messages[0].content.starts_with("Found 1 resource"));
    }

    #[tokio::test]
    async fn test_error_node_message() {
        let mut state = ResearchState::default();
        state.error = Some("No input found in the message content".to_string());

        let update = ErrorNode.run(&state).await.unwrap();
        assert_eq!(
            update.messages[0].content,
            "Sorry, something went wrong: No input found in the message content"
        );
        assert!(update.logs[0].done);
        assert_eq!(update.messages[0].role, crate::adk::model::Role::Assistant);
    }

    #[test]
    fn test_node_names() {
        assert_eq!(node("rag_search", None).name(), "rag_search");
        assert_eq!(FinalAnswerNode::new(None).name(), "final_answer");
        assert_eq!(ErrorNode.name(), "handle_error");
    }
}
