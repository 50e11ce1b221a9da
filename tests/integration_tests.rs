//! Integration tests for the research graph and the HTTP surface
//!
//! Search tools and the chat model are replaced by in-process mocks.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use once_cell::sync::Lazy;
use research_copilot::adk::checkpoint::MemorySaver;
use research_copilot::adk::graph::GraphEvent;
use research_copilot::adk::model::{ChatMessage, ChatModel, ModelResponse, Role, ToolCall};
use research_copilot::adk::tool::Tool;
use research_copilot::copilot::agent::{AskRequest, ResearchAgent};
use research_copilot::copilot::config::GraphConfig;
use research_copilot::copilot::registry::ToolRegistry;
use research_copilot::copilot::server;
use research_copilot::copilot::state::{Resource, ResourceSource};
use research_copilot::copilot::tools::ToolOutput;
use serde_json::{json, Value};
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower::ServiceExt;

// ============================================================================
// Mock Components
// ============================================================================

static MOCK_TOOL_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "query": {"type": "string"}
        },
        "required": ["query"]
    })
});

/// Mock search tool returning fixed resources, or failing when `results` is `None`
struct MockSearch {
    name: &'static str,
    results: Option<Vec<Resource>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockSearch {
    fn new(name: &'static str, results: Vec<Resource>) -> Arc<Self> {
        Arc::new(Self {
            name,
            results: Some(results),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    fn slow(name: &'static str, results: Vec<Resource>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            results: Some(results),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            results: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for MockSearch {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Mock search tool"
    }

    fn schema(&self) -> &Value {
        &MOCK_TOOL_SCHEMA
    }

    async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let query = input["query"].as_str().unwrap_or_default().to_string();
        match &self.results {
            Some(results) => Ok(serde_json::to_value(ToolOutput {
                query,
                results: results.clone(),
            })?),
            None => Err("upstream returned 502".into()),
        }
    }
}

/// Routes every question to one tool, then writes a canned answer
struct MockModel {
    route_to: &'static str,
}

#[async_trait]
impl ChatModel for MockModel {
    fn model_name(&self) -> &str {
        "mock"
    }

    async fn complete(
        &self,
        _messages: &[ChatMessage],
        tools: Option<&[Arc<dyn Tool>]>,
    ) -> Result<ModelResponse, Box<dyn Error + Send + Sync>> {
        if tools.is_some() {
            Ok(ModelResponse {
                text: None,
                tool_calls: vec![ToolCall {
                    id: "call_0".to_string(),
                    name: self.route_to.to_string(),
                    args: json!({"query": "refined query"}),
                }],
            })
        } else {
            Ok(ModelResponse {
                text: Some("Here is what I found.".to_string()),
                tool_calls: vec![],
            })
        }
    }
}

fn paper(title: &str) -> Resource {
    Resource::new(
        ResourceSource::Arxiv,
        title,
        format!("http://arxiv.org/abs/{}", title.len()),
        "abstract",
    )
}

fn page(title: &str) -> Resource {
    Resource::new(
        ResourceSource::Web,
        title,
        format!("https://example.com/{}", title.to_lowercase()),
        "snippet",
    )
}

async fn agent_with(
    tools: Vec<Arc<MockSearch>>,
    model: Option<Arc<dyn ChatModel>>,
    config: GraphConfig,
) -> ResearchAgent {
    let registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool).await;
    }
    ResearchAgent::new(&registry, model, Arc::new(MemorySaver::new()), &config)
        .await
        .expect("agent should build")
}

// ============================================================================
// Graph Flow Tests
// ============================================================================

#[tokio::test]
async fn test_arxiv_results_end_the_turn() {
    let arxiv = MockSearch::new("arxiv_search", vec![paper("Attention Is All You Need")]);
    let web = MockSearch::new("web_search", vec![page("Unused")]);
    let agent = agent_with(vec![arxiv.clone(), web.clone()], None, GraphConfig::default()).await;

    let response = agent
        .ask(AskRequest::from_input("transformer architectures", None))
        .await
        .unwrap();

    assert_eq!(arxiv.calls(), 1);
    assert_eq!(web.calls(), 0);
    assert_eq!(response.resources.len(), 1);
    assert!(response
        .content
        .starts_with("Found 1 resource for 'transformer architectures':"));
    assert!(response.content.contains("Attention Is All You Need"));
    assert!(response.logs.iter().all(|l| l.done));
    assert!(response.error.is_none());
    assert!(!response.thread_id.is_empty());
}

#[tokio::test]
async fn test_empty_arxiv_falls_back_to_web() {
    let arxiv = MockSearch::new("arxiv_search", vec![]);
    let web = MockSearch::new(
        "web_search",
        vec![page("Zeta"), page("Alpha"), page("Mu"), page("Beta"), page("Pi"), page("Chi")],
    );
    let agent = agent_with(vec![arxiv.clone(), web.clone()], None, GraphConfig::default()).await;

    let response = agent
        .ask(AskRequest::from_input("diffusion models", Some("t-fallback".into())))
        .await
        .unwrap();

    assert_eq!(arxiv.calls(), 1);
    assert_eq!(web.calls(), 1);
    let titles: Vec<&str> = response.resources.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Alpha", "Beta", "Chi", "Mu", "Pi"]);

    let state = agent.thread_state("t-fallback").await.unwrap().unwrap();
    let tools: Vec<&str> = state
        .intermediate_steps
        .iter()
        .map(|s| s.tool.as_str())
        .collect();
    assert_eq!(tools, vec!["arxiv_search", "web_search"]);
}

#[tokio::test]
async fn test_failed_web_search_is_recorded_and_falls_back() {
    let arxiv = MockSearch::new("arxiv_search", vec![paper("Fallback Paper")]);
    let web = MockSearch::failing("web_search");
    let agent = agent_with(vec![arxiv.clone(), web.clone()], None, GraphConfig::default()).await;

    let response = agent
        .ask(AskRequest::from_input("search the web for rust", Some("t-web".into())))
        .await
        .unwrap();

    assert_eq!(web.calls(), 1);
    assert_eq!(arxiv.calls(), 1);
    assert!(response.error.is_none());
    assert!(response
        .logs
        .iter()
        .any(|l| l.message.contains("Error performing search")));

    let state = agent.thread_state("t-web").await.unwrap().unwrap();
    assert!(state.intermediate_steps[0]
        .error
        .as_deref()
        .unwrap()
        .contains("502"));
}

#[tokio::test]
async fn test_rag_keyword_routes_to_rag_then_web() {
    let rag = MockSearch::new("rag_search", vec![]);
    let web = MockSearch::new("web_search", vec![page("Chunking guide")]);
    let arxiv = MockSearch::new("arxiv_search", vec![paper("Unused")]);
    let agent = agent_with(
        vec![rag.clone(), web.clone(), arxiv.clone()],
        None,
        GraphConfig::default(),
    )
    .await;

    let response = agent
        .ask(AskRequest::from_input("RAG chunking strategies", None))
        .await
        .unwrap();

    assert_eq!(rag.calls(), 1);
    assert_eq!(web.calls(), 1);
    assert_eq!(arxiv.calls(), 0);
    assert_eq!(response.resources[0].title, "Chunking guide");
}

#[tokio::test]
async fn test_nothing_found_apologizes() {
    let arxiv = MockSearch::new("arxiv_search", vec![]);
    let web = MockSearch::new("web_search", vec![]);
    let agent = agent_with(vec![arxiv, web], None, GraphConfig::default()).await;

    let response = agent
        .ask(AskRequest::from_input("qwertyuiop", None))
        .await
        .unwrap();
    assert!(response.content.starts_with("Sorry, I couldn't find any resources"));
    assert!(response.resources.is_empty());
}

#[tokio::test]
async fn test_model_routing_and_answer() {
    let arxiv = MockSearch::new("arxiv_search", vec![paper("Unused")]);
    let web = MockSearch::new("web_search", vec![page("Release notes")]);
    let model: Arc<dyn ChatModel> = Arc::new(MockModel {
        route_to: "web_search",
    });
    let agent = agent_with(
        vec![arxiv.clone(), web.clone()],
        Some(model),
        GraphConfig::default(),
    )
    .await;

    let response = agent
        .ask(AskRequest::from_input("what changed in rust 1.80?", Some("t-model".into())))
        .await
        .unwrap();

    assert_eq!(web.calls(), 1);
    assert_eq!(arxiv.calls(), 0);
    assert_eq!(response.content, "Here is what I found.");

    let state = agent.thread_state("t-model").await.unwrap().unwrap();
    assert_eq!(state.intermediate_steps[0].query, "refined query");
}

#[tokio::test]
async fn test_thread_resume_keeps_history() {
    let arxiv = MockSearch::new("arxiv_search", vec![paper("Paper")]);
    let agent = agent_with(vec![arxiv.clone()], None, GraphConfig::default()).await;

    let first = agent
        .ask(AskRequest::from_input("first question", Some("t-resume".into())))
        .await
        .unwrap();
    assert_eq!(first.messages.len(), 2);

    let second = agent
        .ask(AskRequest::from_input("second question", Some("t-resume".into())))
        .await
        .unwrap();

    assert_eq!(second.messages.len(), 4);
    assert_eq!(second.messages[0].content, "first question");
    assert_eq!(second.messages[2].content, "second question");
    assert!(second.content.contains("'second question'"));
    // Per-turn fields start over
    assert_eq!(second.resources.len(), 1);
    assert_eq!(arxiv.calls(), 2);

    let state = agent.thread_state("t-resume").await.unwrap().unwrap();
    assert_eq!(state.intermediate_steps.len(), 1);
}

#[tokio::test]
async fn test_concurrent_turns_on_one_thread_are_serialized() {
    let arxiv = MockSearch::slow("arxiv_search", vec![paper("Paper")], Duration::from_millis(50));
    let agent = agent_with(vec![arxiv.clone()], None, GraphConfig::default()).await;

    agent
        .ask(AskRequest::from_input("first", Some("t-busy".into())))
        .await
        .unwrap();

    let (second, third) = tokio::join!(
        agent.ask(AskRequest::from_input("second", Some("t-busy".into()))),
        agent.ask(AskRequest::from_input("third", Some("t-busy".into()))),
    );
    let second = second.unwrap();
    let third = third.unwrap();
    assert_eq!(second.messages.len().max(third.messages.len()), 6);
    assert_eq!(arxiv.calls(), 3);

    // Every question is followed by its own answer
    let state = agent.thread_state("t-busy").await.unwrap().unwrap();
    assert_eq!(state.messages.len(), 6);
    for pair in state.messages.chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Assistant);
        assert!(pair[1].content.contains(&format!("'{}'", pair[0].content)));
    }
}

#[tokio::test]
async fn test_recursion_limit_aborts_run() {
    let arxiv = MockSearch::new("arxiv_search", vec![]);
    let web = MockSearch::new("web_search", vec![]);
    let agent = agent_with(
        vec![arxiv, web],
        None,
        GraphConfig { recursion_limit: 3 },
    )
    .await;

    let err = agent
        .ask(AskRequest::from_input("anything", None))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Recursion limit"));
    assert!(!err.is_client_error());
}

#[tokio::test]
async fn test_stream_reports_every_step() {
    let arxiv = MockSearch::new("arxiv_search", vec![paper("Paper")]);
    let agent = agent_with(vec![arxiv], None, GraphConfig::default()).await;

    let (tx, mut rx) = mpsc::channel(64);
    let response = agent
        .ask_stream(AskRequest::from_input("streams", None), tx)
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert_eq!(
        events.first(),
        Some(&GraphEvent::NodeStarted {
            node: "oracle".to_string(),
            step: 1
        })
    );
    assert_eq!(events.last(), Some(&GraphEvent::Finished { steps: 4 }));
    let updated: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            GraphEvent::StateUpdated { node, .. } => Some(node.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(updated, vec!["oracle", "arxiv_search", "oracle", "final_answer"]);
    assert_eq!(response.resources.len(), 1);
}

// ============================================================================
// HTTP Tests
// ============================================================================

async fn app() -> axum::Router {
    let arxiv = MockSearch::new("arxiv_search", vec![paper("Attention Is All You Need")]);
    server::router(Arc::new(
        agent_with(vec![arxiv], None, GraphConfig::default()).await,
    ))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let response = app()
        .await
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_copilotkit_remote() {
    let response = app()
        .await
        .oneshot(post_json(
            "/copilotkit_remote",
            json!({"messages": [{"content": "attention mechanisms"}], "thread_id": "t-http"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["thread_id"], "t-http");
    assert_eq!(body["resources"][0]["title"], "Attention Is All You Need");
    assert_eq!(body["messages"][1]["role"], "assistant");
    assert!(body["content"]
        .as_str()
        .unwrap()
        .starts_with("Found 1 resource"));
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn test_empty_query_is_bad_request() {
    let response = app()
        .await
        .oneshot(post_json(
            "/copilotkit_remote",
            json!({"messages": [{"content": ""}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({"error": "No query provided"}));

    let response = app()
        .await
        .oneshot(post_json("/input", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_reports_error() {
    let request = Request::builder()
        .method("POST")
        .uri("/input")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app().await.oneshot(request).await.unwrap();

    assert!(response.status().is_client_error());
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn test_input_then_thread_lookup() {
    let app = app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/input",
            json!({"input": "attention", "thread_id": "t-lookup"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/threads/t-lookup")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["thread_id"], "t-lookup");
    assert_eq!(body["state"]["messages"][0]["content"], "attention");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/threads/unknown")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stream_endpoint_sends_events_and_result() {
    let response = app()
        .await
        .oneshot(post_json(
            "/copilotkit_remote/stream",
            json!({"messages": [{"role": "user", "content": "attention"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("event: graph"));
    assert!(text.contains("\"type\":\"node_started\""));
    assert!(text.contains("event: result"));
}
