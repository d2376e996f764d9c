//! Chat about the open file
//!
//! A per-user conversation relayed to a hosted language model through an
//! OpenAI-compatible chat-completion endpoint. The model call is the only
//! place where failure degrades instead of propagating: [`ChatService::reply`]
//! answers with a fixed template and sets `fallback` when the model cannot be
//! reached.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::gateway::NO_RESPONSE_STATUS;
use crate::transport::{ApiResponse, TransportError};

/// Turns kept per user
pub const MAX_HISTORY: usize = 20;
/// Turns replayed to the model
pub const CONTEXT_TURNS: usize = 4;
/// Characters kept from each replayed turn
pub const TURN_PREVIEW_CHARS: usize = 500;
/// Characters of the open file included in the prompt
pub const FILE_PREVIEW_CHARS: usize = 1500;

pub const DEFAULT_MAX_TOKENS: u32 = 2000;
pub const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 90;
pub const DEFAULT_COLD_START_DELAY_SECS: u64 = 10;
const TEMPERATURE: f64 = 0.7;
const TOP_P: f64 = 0.95;

/// Status the router returns while a model is still loading
const COLD_START_STATUS: u16 = 503;

const SYSTEM_PROMPT: &str = "You are a code assistant embedded in a browser code editor.\n\
\n\
Rules:\n\
1. When asked to add or change code, show the complete updated file.\n\
2. Answer with concrete code, not general advice.\n\
3. Put code in fenced markdown blocks tagged with the language.\n\
4. When creating files or folders, give exact paths and full content.\n\
5. Keep explanations short.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// Message sent to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContext {
    pub path: Option<String>,
    pub has_selection: bool,
}

/// One stored turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_context: Option<FileContext>,
}

/// Per-user conversation history, capped at [`MAX_HISTORY`] turns
#[derive(Debug, Default)]
pub struct ChatHistoryStore {
    turns: DashMap<String, Vec<ChatTurn>>,
}

impl ChatHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, subject: &str) -> Vec<ChatTurn> {
        self.turns
            .get(subject)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Append turns and trim to the cap; returns the updated history
    pub fn append(&self, subject: &str, new_turns: impl IntoIterator<Item = ChatTurn>) -> Vec<ChatTurn> {
        let mut entry = self.turns.entry(subject.to_string()).or_default();
        entry.extend(new_turns);
        let excess = entry.len().saturating_sub(MAX_HISTORY);
        entry.drain(..excess);
        entry.value().clone()
    }

    pub fn clear(&self, subject: &str) {
        self.turns.remove(subject);
    }
}

/// Hosted model behind a chat-completion API
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Raw POST of a completion request
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn post(&self, body: &Value) -> std::result::Result<ApiResponse, TransportError>;
}

/// Completion transport over reqwest with bearer auth
#[derive(Debug, Clone)]
pub struct ReqwestCompletionTransport {
    client: reqwest::Client,
    url: String,
    api_token: String,
}

impl ReqwestCompletionTransport {
    pub fn new(
        base_url: &str,
        api_token: impl Into<String>,
        timeout: Duration,
    ) -> std::result::Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("CodeAtEase")
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_token: api_token.into(),
        })
    }
}

#[async_trait]
impl CompletionTransport for ReqwestCompletionTransport {
    async fn post(&self, body: &Value) -> std::result::Result<ApiResponse, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_token)
            .json(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(ApiResponse { status, body })
    }
}

/// Extract `choices[0].message.content` from a completion response
pub fn parse_completion(body: &str) -> Result<String> {
    let json: Value = serde_json::from_str(body)?;
    json["choices"]
        .get(0)
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| SyncError::Internal("missing choices[0].message.content".to_string()))
}

/// Model served through an OpenAI-compatible inference router
pub struct RouterChatModel {
    transport: Arc<dyn CompletionTransport>,
    model: String,
    max_tokens: u32,
    cold_start_delay: Duration,
}

impl std::fmt::Debug for RouterChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterChatModel")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl RouterChatModel {
    pub fn new(transport: Arc<dyn CompletionTransport>, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            cold_start_delay: Duration::from_secs(DEFAULT_COLD_START_DELAY_SECS),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_cold_start_delay(mut self, delay: Duration) -> Self {
        self.cold_start_delay = delay;
        self
    }

    fn request_body(&self, messages: &[ChatMessage]) -> Value {
        json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": TEMPERATURE,
            "top_p": TOP_P,
            "stream": false,
        })
    }

    async fn send(&self, body: &Value) -> Result<ApiResponse> {
        self.transport.post(body).await.map_err(|err| match err {
            TransportError::Timeout(msg) => SyncError::UpstreamTimeout(msg),
            TransportError::Network(message) => SyncError::UpstreamUnavailable {
                status: NO_RESPONSE_STATUS,
                message,
            },
        })
    }
}

#[async_trait]
impl LanguageModel for RouterChatModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = self.request_body(messages);
        debug!(model = %self.model, messages = messages.len(), "Calling language model");

        let mut response = self.send(&body).await?;
        if response.status == COLD_START_STATUS {
            info!(
                model = %self.model,
                delay_secs = self.cold_start_delay.as_secs(),
                "Model is loading; retrying once"
            );
            tokio::time::sleep(self.cold_start_delay).await;
            response = self.send(&body).await?;
        }

        if response.status != 200 {
            return Err(SyncError::UpstreamUnavailable {
                status: response.status,
                message: response.body.chars().take(200).collect(),
            });
        }
        parse_completion(&response.body)
    }
}

/// File open in the editor when the question was asked
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OpenFile {
    pub path: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub prompt: String,
    #[serde(default)]
    pub current_file: Option<OpenFile>,
    #[serde(default)]
    pub selected_code: Option<String>,
}

impl ChatRequest {
    fn file_path(&self) -> Option<&str> {
        self.current_file
            .as_ref()
            .and_then(|f| f.path.as_deref())
            .filter(|p| !p.is_empty())
    }

    fn selection(&self) -> Option<&str> {
        self.selected_code.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub response: String,
    pub conversation_history: Vec<ChatTurn>,
    pub fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn preview(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// User prompt: open file, selection, then the question
pub fn build_user_prompt(request: &ChatRequest) -> String {
    let mut parts = Vec::new();

    if let Some(path) = request.file_path() {
        parts.push(format!("**Current File:** `{}`", path));
        if let Some(content) = request
            .current_file
            .as_ref()
            .and_then(|f| f.content.as_deref())
            .filter(|c| !c.is_empty())
        {
            parts.push(format!(
                "\n**File Content:**\n```\n{}\n```",
                preview(content, FILE_PREVIEW_CHARS)
            ));
        }
    }

    if let Some(selection) = request.selection() {
        parts.push(format!("\n**Selected Code:**\n```\n{}\n```", selection));
    }

    parts.push(format!("\n**User Request:** {}", request.prompt));
    parts.join("\n")
}

/// Full message list: system prompt, recent history, user prompt
pub fn build_messages(request: &ChatRequest, history: &[ChatTurn]) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(CONTEXT_TURNS);
    let mut messages = vec![ChatMessage::new(ChatRole::System, SYSTEM_PROMPT)];
    messages.extend(
        history[start..]
            .iter()
            .map(|turn| ChatMessage::new(turn.role, preview(&turn.content, TURN_PREVIEW_CHARS))),
    );
    messages.push(ChatMessage::new(ChatRole::User, build_user_prompt(request)));
    messages
}

/// Deterministic answer used when the model is unavailable
pub fn fallback_response(request: &ChatRequest) -> String {
    let mut response = format!("I understand you want help with: '{}'\n\n", request.prompt);
    if let Some(path) = request.file_path() {
        response.push_str(&format!("Looking at file: `{}`\n\n", path));
    }
    if request.selection().is_some() {
        response.push_str("Analyzing your selected code...\n\n");
    }
    response.push_str(
        "The assistant is not reachable right now, so here is a general checklist:\n\
\n\
**Recommendations:**\n\
1. Handle errors on edge cases\n\
2. Validate inputs\n\
3. Add unit tests for critical functions\n\
4. Document public functions\n\
\n\
Ask again in a moment for an answer about this code.",
    );
    response
}

/// Relays questions to the model and records the conversation
pub struct ChatService {
    model: Option<Arc<dyn LanguageModel>>,
    history: Arc<ChatHistoryStore>,
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("model_configured", &self.model.is_some())
            .finish_non_exhaustive()
    }
}

impl ChatService {
    pub fn new(model: Option<Arc<dyn LanguageModel>>, history: Arc<ChatHistoryStore>) -> Self {
        Self { model, history }
    }

    pub fn model_available(&self) -> bool {
        self.model.is_some()
    }

    pub fn history(&self) -> &ChatHistoryStore {
        &self.history
    }

    /// Answer one question. Only an empty prompt is an error.
    pub async fn reply(&self, subject: &str, request: &ChatRequest) -> Result<ChatReply> {
        if request.prompt.trim().is_empty() {
            return Err(SyncError::InvalidRequest("prompt is required".to_string()));
        }

        let Some(model) = &self.model else {
            debug!(subject, "No language model configured; using template");
            let response = fallback_response(request);
            let history = self.record(subject, request, &response);
            return Ok(ChatReply {
                response,
                conversation_history: history,
                fallback: true,
                error: None,
            });
        };

        let messages = build_messages(request, &self.history.get(subject));
        match model.complete(&messages).await {
            Ok(response) => {
                let history = self.record(subject, request, &response);
                Ok(ChatReply {
                    response,
                    conversation_history: history,
                    fallback: false,
                    error: None,
                })
            }
            Err(err) => {
                warn!(subject, error = %err, "Language model failed; using template");
                Ok(ChatReply {
                    response: fallback_response(request),
                    conversation_history: self.history.get(subject),
                    fallback: true,
                    error: Some(err.to_string()),
                })
            }
        }
    }

    fn record(&self, subject: &str, request: &ChatRequest, response: &str) -> Vec<ChatTurn> {
        let now = Utc::now();
        let question = ChatTurn {
            role: ChatRole::User,
            content: request.prompt.clone(),
            timestamp: now,
            file_context: Some(FileContext {
                path: request.file_path().map(str::to_string),
                has_selection: request.selection().is_some(),
            }),
        };
        let answer = ChatTurn {
            role: ChatRole::Assistant,
            content: response.to_string(),
            timestamp: now,
            file_context: None,
        };
        self.history.append(subject, [question, answer])
    }
}
