// SPDX-License-Identifier: MIT

//! Research agent: the compiled graph plus thread handling
//!
//! ```text
//! START -> oracle -+-> arxiv_search -+
//!                  +-> web_search  --+-> oracle
//!                  +-> rag_search  --+
//!                  +-> final_answer -> END
//! any node error -> handle_error -> END
//! ```

use crate::adk::checkpoint::{Checkpointer, MemorySaver};
use crate::adk::error::CopilotError;
use crate::adk::graph::{CompiledGraph, GraphEvent, RunConfig, StateGraph, END, START};
use crate::adk::model::{ChatMessage, ChatModel, Role};
use crate::adk::tool::Tool;
use crate::copilot::config::{CopilotConfig, GraphConfig};
use crate::copilot::nodes::{ErrorNode, FinalAnswerNode, ToolSearchNode, HANDLE_ERROR};
use crate::copilot::registry::ToolRegistry;
use crate::copilot::router::{route_decision, Oracle, ORACLE};
use crate::copilot::state::{LogEntry, Resource, ResearchState, Route};
use crate::copilot::tools::register_tools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// A question for the agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Resume this conversation; a new thread is started when absent
    #[serde(default)]
    pub thread_id: Option<String>,
}

impl AskRequest {
    pub fn from_input(input: impl Into<String>, thread_id: Option<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(input)],
            thread_id,
        }
    }

    /// The latest non-empty user message
    pub fn query(&self) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User && !m.content.trim().is_empty())
    }
}

/// Outcome of one turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub thread_id: String,
    pub messages: Vec<ChatMessage>,
    /// The assistant's latest answer
    pub content: String,
    pub resources: Vec<Resource>,
    pub logs: Vec<LogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AskResponse {
    pub fn from_state(thread_id: String, state: ResearchState) -> Self {
        let content = state.last_answer().unwrap_or_default().to_string();
        Self {
            thread_id,
            messages: state.messages,
            content,
            resources: state.resources,
            logs: state.logs,
            error: state.error,
        }
    }
}

pub struct ResearchAgent {
    graph: CompiledGraph<ResearchState>,
    tools: Vec<String>,
    recursion_limit: usize,
    /// Held for a whole turn, from loading the checkpoint to the last step
    turns: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ResearchAgent {
    /// Build the research graph over the search tools found in `registry`
    pub async fn new(
        registry: &ToolRegistry,
        model: Option<Arc<dyn ChatModel>>,
        checkpointer: Arc<dyn Checkpointer>,
        config: &GraphConfig,
    ) -> Result<Self, CopilotError> {
        let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
        for route in Route::TOOLS {
            match registry.get(route.as_str()).await {
                Some(tool) => tools.push(tool),
                None => log::info!("Tool {} not registered; route disabled", route),
            }
        }

        let mut graph = StateGraph::<ResearchState>::new();
        graph
            .add_node(Arc::new(Oracle::new(tools.clone(), model.clone())))
            .add_node(Arc::new(FinalAnswerNode::new(model)))
            .add_node(Arc::new(ErrorNode))
            .add_edge(START, ORACLE)
            .add_edge(Route::FinalAnswer.as_str(), END)
            .add_edge(HANDLE_ERROR, END)
            .set_error_handler(HANDLE_ERROR);

        let mut branches = vec![Route::FinalAnswer.as_str()];
        for tool in &tools {
            let node = ToolSearchNode::new(tool.clone())?;
            branches.push(tool.name());
            graph.add_node(Arc::new(node)).add_edge(tool.name(), ORACLE);
        }
        graph.add_conditional_edges(
            ORACLE,
            route_decision,
            branches.iter().map(|b| (*b, *b)),
        );

        let graph = graph.compile_with_checkpointer(checkpointer)?;
        let tools: Vec<String> = tools.iter().map(|t| t.name().to_string()).collect();
        log::info!("Research agent ready with tools: {:?}", tools);

        Ok(Self {
            graph,
            tools,
            recursion_limit: config.recursion_limit,
            turns: Mutex::new(HashMap::new()),
        })
    }

    /// Tools, chat model and an in-memory checkpointer from configuration
    pub async fn from_config(config: &CopilotConfig) -> Result<Self, CopilotError> {
        let registry = ToolRegistry::new();
        register_tools(&registry, config).await;
        let model = config.model.build()?;
        let checkpointer = Arc::new(MemorySaver::with_max_history(config.checkpoint.max_history));
        Self::new(&registry, model, checkpointer, &config.graph).await
    }

    /// Names of the enabled search tools
    pub fn tools(&self) -> &[String] {
        &self.tools
    }

    /// Run one turn. Turns on the same thread run one after another.
    pub async fn ask(&self, request: AskRequest) -> Result<AskResponse, CopilotError> {
        let thread_id = Self::thread_id(&request);
        let lock = self.turn_lock(&thread_id).await;
        let _turn = lock.lock().await;

        let (run, state) = self.prepare(request, thread_id).await?;
        let state = self.graph.invoke(state, &run).await?;
        Ok(Self::respond(run, state))
    }

    /// Like [`ask`](Self::ask), sending graph events while the turn runs
    pub async fn ask_stream(
        &self,
        request: AskRequest,
        tx: mpsc::Sender<GraphEvent>,
    ) -> Result<AskResponse, CopilotError> {
        let thread_id = Self::thread_id(&request);
        let lock = self.turn_lock(&thread_id).await;
        let _turn = lock.lock().await;

        let (run, state) = self.prepare(request, thread_id).await?;
        let state = self.graph.invoke_stream(state, &run, tx).await?;
        Ok(Self::respond(run, state))
    }

    /// Latest checkpointed state of a conversation
    pub async fn thread_state(&self, thread_id: &str) -> Result<Option<ResearchState>, CopilotError> {
        self.graph.get_state(thread_id).await
    }

    fn thread_id(request: &AskRequest) -> String {
        request
            .thread_id
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }

    /// Lock for one thread; idle locks are dropped on the way
    async fn turn_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        let mut turns = self.turns.lock().await;
        turns.retain(|_, lock| Arc::strong_count(lock) > 1);
        turns.entry(thread_id.to_string()).or_default().clone()
    }

    /// Seed a new thread, or append the new question to a checkpointed one
    async fn prepare(
        &self,
        request: AskRequest,
        thread_id: String,
    ) -> Result<(RunConfig, ResearchState), CopilotError> {
        let question = request
            .query()
            .cloned()
            .ok_or_else(|| CopilotError::invalid_input("No query provided"))?;

        let state = match self.graph.get_state(&thread_id).await? {
            Some(mut state) => {
                log::info!("Resuming thread {}", thread_id);
                state.begin_turn(question);
                state
            }
            None => {
                log::info!("Starting thread {}", thread_id);
                ResearchState::from_messages(request.messages)
            }
        };

        let run = RunConfig::for_thread(thread_id).with_recursion_limit(self.recursion_limit);
        Ok((run, state))
    }

    fn respond(run: RunConfig, state: ResearchState) -> AskResponse {
        AskResponse::from_state(run.thread_id.unwrap_or_default(), state)
    }
}
