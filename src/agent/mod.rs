//! Tool-augmented LLM agent invocation (C12).
//!
//! Assembles the system prompt + tool schemas + context window content,
//! calls the LLM endpoint under a per-complexity hard timeout (§5), caches
//! successful responses, and applies the resulting context/tool-usage side
//! effects. Grounded on the teacher's `agent/mod.rs` orchestration shape
//! (interrupt handling, sentence-boundary buffering) with the internal
//! `saorsa-agent`/`saorsa-ai` stack replaced by this crate's own
//! [`llm::LlmClient`] (see `llm.rs` for why).

pub mod llm;

use crate::cache::{md5_key, CacheTier, ResponseCache};
use crate::classifier::QueryComplexity;
use crate::config::LlmConfig;
use crate::context::ContextWindow;
use crate::error::Result;
use crate::rag::MemoryHit;
use crate::tools::registry::{ToolDescriptor, ToolRegistry};
use crate::tools::selector::ScoredTool;
use llm::{ChatMessage, LlmClient, ToolCall, ToolSchema};
use std::time::Duration;
use tracing::{info, warn};

/// Maximum number of tool-call round trips a single agent turn will make
/// before giving up and returning whatever text the model last produced
/// (§4.12 bounds the tool subset but the protocol itself needs a turn cap
/// to guarantee termination against a model that never stops calling tools).
const MAX_TOOL_TURNS: u8 = 4;

fn tool_schema_for(descriptor: &ToolDescriptor) -> ToolSchema {
    ToolSchema {
        kind: "function".to_owned(),
        function: serde_json::json!({
            "name": descriptor.id,
            "description": descriptor.description,
            "parameters": {
                "type": "object",
                "properties": {},
                "additionalProperties": true,
            },
        }),
    }
}

/// Detects a "remember ..." style store-intent in user text, bypassing the
/// LLM call entirely per seed scenario 4 (§8): "remember that I prefer dark
/// roast" stores the fact and speaks a confirmation without invoking the
/// agent.
#[must_use]
pub fn detect_memory_store_intent(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    for prefix in ["remember that ", "remember to ", "please remember that ", "remember "] {
        if let Some(rest) = lower.strip_prefix(prefix) {
            let original_rest = &text[text.len() - rest.len()..];
            return Some(original_rest.trim().to_owned());
        }
    }
    None
}

/// Result of an agent invocation.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub text: String,
    pub from_cache: bool,
}

/// Assembles prompts and invokes the LLM endpoint under budget (§4.12).
pub struct AgentInvoker {
    client: LlmClient,
    llm_config: LlmConfig,
}

impl AgentInvoker {
    #[must_use]
    pub fn new(llm_config: LlmConfig) -> Self {
        Self {
            client: LlmClient::new(&llm_config),
            llm_config,
        }
    }

    /// Run one agent turn: assemble prompt from complexity/tools/context/RAG
    /// hits, call the LLM under the complexity's hard timeout, cache the
    /// result on success, and return the response text.
    ///
    /// On timeout or transport error, returns [`AssistantError::Llm`]; the
    /// caller (the coordinator) maps this to the apology response path and
    /// skips caching (§7).
    pub async fn invoke(
        &self,
        query: &str,
        complexity: QueryComplexity,
        tools: &[ScoredTool],
        registry: &ToolRegistry,
        context: &ContextWindow,
        rag_hits: &[MemoryHit],
        cache: &ResponseCache,
    ) -> Result<AgentResponse> {
        let system_prompt = self.system_prompt_for(complexity);
        let context_text = context.get_optimized(query, self.llm_config.max_tokens / 4);
        let cache_fingerprint: String = context_text.chars().take(100).collect();
        let response_key = md5_key(&[query, &format!("{complexity:?}"), &cache_fingerprint]);

        if let Some(cached) = cache.get(CacheTier::Response, &response_key) {
            info!("agent response served from cache");
            return Ok(AgentResponse {
                text: cached,
                from_cache: true,
            });
        }

        let mut user_content = String::new();
        if !rag_hits.is_empty() {
            user_content.push_str("Relevant context:\n");
            for hit in rag_hits {
                user_content.push_str(&format!("- {}\n", hit.content));
            }
        }
        if !context_text.is_empty() {
            user_content.push_str(&format!("Conversation so far:\n{context_text}\n"));
        }
        user_content.push_str(query);

        let mut messages = vec![ChatMessage::system(&system_prompt), ChatMessage::user(&user_content)];

        let tool_schemas: Vec<ToolSchema> = tools.iter().map(|t| tool_schema_for(&t.descriptor)).collect();
        let tool_schema_ref = (!tool_schemas.is_empty()).then(|| tool_schemas.as_slice());

        let budget = Duration::from_secs_f32(complexity.budget_s(&self.llm_config.timeouts));

        let mut turns = 0u8;
        let text = loop {
            let turn = self.client.complete(&messages, tool_schema_ref, budget).await?;

            let calls = turn.tool_calls.filter(|c| !c.is_empty());
            let Some(calls) = calls else {
                break turn.content.unwrap_or_default();
            };

            turns += 1;
            if turns > MAX_TOOL_TURNS {
                warn!("agent exceeded max tool-call turns, returning last response as-is");
                break turn.content.unwrap_or_else(|| self.apology_response());
            }

            messages.push(ChatMessage::assistant_tool_calls(calls.clone()));
            for call in &calls {
                messages.push(ChatMessage::tool_result(&call.id, &run_tool_call(registry, call)));
            }
        };

        cache.put(CacheTier::Response, &response_key, text.clone());

        Ok(AgentResponse {
            text,
            from_cache: false,
        })
    }

    /// Fallback apology text used when the agent call fails or times out (§7).
    #[must_use]
    pub fn apology_response(&self) -> String {
        "I apologize, I'm having trouble with that right now. Please try again.".to_owned()
    }

    fn system_prompt_for(&self, complexity: QueryComplexity) -> String {
        match complexity {
            QueryComplexity::Instant => self.llm_config.instant_prompt.clone(),
            QueryComplexity::ExplicitFact | QueryComplexity::SimpleReasoning => {
                self.llm_config.simple_prompt.clone()
            }
            QueryComplexity::ComplexMultiStep => self.llm_config.complex_prompt.clone(),
        }
    }
}

/// Execute one tool call through the registry (the §6 plugin boundary) and
/// render its outcome as text for a `tool`-role reply. Usage stats update
/// only here, from the invocation's real outcome -- never speculatively for
/// tools that were merely offered to the model but never called.
fn run_tool_call(registry: &ToolRegistry, call: &ToolCall) -> String {
    let args: serde_json::Value =
        serde_json::from_str(&call.function.arguments).unwrap_or(serde_json::Value::Null);
    match registry.invoke(&call.function.name, args) {
        Ok(value) => value.to_string(),
        Err(e) => {
            warn!(tool = %call.function.name, error = %e, "tool invocation failed");
            format!("error: {e}")
        }
    }
}
