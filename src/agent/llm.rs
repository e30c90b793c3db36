//! OpenAI-style chat completion HTTP client (C12 LLM endpoint, §6).
//!
//! Grounded on the teacher's `agent/http_provider.rs` JSON-body-construction
//! technique (system message first, role mapping, flattened content), but
//! built on `reqwest` instead of `ureq`/the teacher's internal agent crates:
//! those crates are not part of this crate's declared dependency stack, and
//! the pipeline's async stack already needs `tokio` + an HTTP client for
//! this one external call.

use crate::config::LlmConfig;
use crate::error::{AssistantError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// A single chat message in OpenAI wire format. `content` is optional since
/// an assistant message carrying only `tool_calls` has none, and a `tool`
/// role message reports `tool_call_id` instead of a role/content pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_owned(),
            content: Some(content.to_owned()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_owned(),
            content: Some(content.to_owned()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn assistant(content: &str) -> Self {
        Self {
            role: "assistant".to_owned(),
            content: Some(content.to_owned()),
            ..Self::default()
        }
    }

    /// An assistant turn that only requests tool calls (no text content).
    #[must_use]
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".to_owned(),
            tool_calls: Some(tool_calls),
            ..Self::default()
        }
    }

    /// A `tool`-role message reporting the result of one tool invocation
    /// back to the model.
    #[must_use]
    pub fn tool_result(tool_call_id: &str, content: &str) -> Self {
        Self {
            role: "tool".to_owned(),
            content: Some(content.to_owned()),
            tool_call_id: Some(tool_call_id.to_owned()),
            ..Self::default()
        }
    }
}

/// JSON schema for a tool, passed through to the endpoint as-is (§6: request
/// carries tool schemas).
#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: serde_json::Value,
}

/// A tool call the model asked the caller to execute, OpenAI wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolSchema]>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatCompletionMessage,
}

/// The assistant's turn as returned by the endpoint: either text content, a
/// request to call one or more tools, or both (§4.12).
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionMessage {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// Thin HTTP client for an OpenAI-compatible `/v1/chat/completions`
/// endpoint (§4.12, §6). Stateless: holds no lock across the call.
pub struct LlmClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

impl LlmClient {
    #[must_use]
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Send a chat completion request with a hard wall-clock budget,
    /// optionally offering `tools` as callable functions (§4.12). Returns
    /// the raw assistant turn so the caller can distinguish a text reply
    /// from a tool-call request. Exceeding `budget` or any transport
    /// failure surfaces as [`AssistantError::Llm`] (§7: "LLM timeout or
    /// error").
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolSchema]>,
        budget: Duration,
    ) -> Result<ChatCompletionMessage> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools,
        };

        debug!(endpoint = %self.endpoint, tool_count = tools.map_or(0, <[ToolSchema]>::len), "sending chat completion request");

        let response = tokio::time::timeout(
            budget,
            self.http.post(&self.endpoint).json(&body).send(),
        )
        .await
        .map_err(|_| AssistantError::Llm(format!("request exceeded {budget:?} budget")))?
        .map_err(|e| AssistantError::Llm(format!("transport error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(%status, "LLM endpoint returned non-success status");
            return Err(AssistantError::Llm(format!("endpoint returned {status}")));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AssistantError::Llm(format!("malformed response body: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| AssistantError::Llm("response had no choices".into()))
    }
}
