//! Tool registry (C10 plugin boundary, §6).
//!
//! Grounded on the teacher's `Tool` trait (`fae_llm/tools/types.rs`): a
//! narrow `name`/`execute` contract, here generalized to a JSON-in/JSON-out
//! invocation with metadata tracked separately in [`ToolDescriptor`] so
//! usage stats can update without touching the tool implementation.

use crate::error::{AssistantError, Result};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Instant, SystemTime};

/// A registered tool (§6 plugin boundary). Tools are assumed thread-safe and
/// side-effectful; their errors are returned to the LLM as structured tool
/// errors rather than aborting the pipeline.
pub trait Tool: Send + Sync {
    fn id(&self) -> &str;
    fn description(&self) -> &str;
    fn category(&self) -> &str;
    fn keywords(&self) -> &[String];

    /// Execute the tool with JSON arguments, returning a JSON result.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Tool`] on execution failure; the caller is
    /// expected to surface this to the LLM as a structured tool error.
    fn invoke(&self, args: Value) -> Result<Value>;
}

/// Metadata tracked per tool, updated atomically after each invocation (§3).
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub id: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub category: String,
    pub usage_count: u64,
    pub last_used: Option<SystemTime>,
    pub success_rate: f32,
}

impl ToolDescriptor {
    #[must_use]
    pub fn new(id: &str, description: &str, category: &str) -> Self {
        let keywords = description
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| w.len() > 2)
            .collect();
        Self {
            id: id.to_owned(),
            description: description.to_owned(),
            keywords,
            category: category.to_owned(),
            usage_count: 0,
            last_used: None,
            success_rate: 1.0,
        }
    }

    #[must_use]
    pub fn with_keywords(mut self, keywords: Vec<&str>) -> Self {
        self.keywords = keywords.into_iter().map(str::to_lowercase).collect();
        self
    }
}

struct Registered {
    tool: Box<dyn Tool>,
    descriptor: ToolDescriptor,
}

/// Registry of available tools with interior synchronization (§5: short
/// critical sections, no lock held across a suspension point).
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Registered>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tool descriptor with no executable backing (used by tests
    /// and the instant handler's tool-listing render, §4.7).
    pub fn register(&self, descriptor: ToolDescriptor) {
        self.tools.write().insert(
            descriptor.id.clone(),
            Registered {
                tool: Box::new(NullTool {
                    id: descriptor.id.clone(),
                }),
                descriptor,
            },
        );
    }

    /// Register a tool with a live implementation.
    pub fn register_tool(&self, tool: Box<dyn Tool>) {
        let descriptor = ToolDescriptor::new(tool.id(), tool.description(), tool.category())
            .with_keywords(tool.keywords().iter().map(String::as_str).collect());
        self.tools.write().insert(
            descriptor.id.clone(),
            Registered { tool, descriptor },
        );
    }

    /// Snapshot of all registered tool descriptors.
    #[must_use]
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools.read().values().map(|r| r.descriptor.clone()).collect()
    }

    /// Invoke a tool by id, updating its usage stats atomically.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Tool`] if the tool id is unknown or
    /// execution fails.
    pub fn invoke(&self, tool_id: &str, args: Value) -> Result<Value> {
        let started = Instant::now();
        let result = {
            let tools = self.tools.read();
            let registered = tools
                .get(tool_id)
                .ok_or_else(|| AssistantError::Tool(format!("unknown tool: {tool_id}")))?;
            registered.tool.invoke(args)
        };
        self.record_usage(tool_id, result.is_ok(), started.elapsed());
        result
    }

    /// Update a descriptor's usage stats with an exponential moving average
    /// over invocation outcomes (§4.10).
    pub fn record_usage(&self, tool_id: &str, success: bool, _elapsed: std::time::Duration) {
        let mut tools = self.tools.write();
        if let Some(registered) = tools.get_mut(tool_id) {
            registered.descriptor.usage_count += 1;
            registered.descriptor.last_used = Some(SystemTime::now());
            let outcome = if success { 1.0 } else { 0.0 };
            registered.descriptor.success_rate =
                registered.descriptor.success_rate * 0.9 + outcome * 0.1;
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

struct NullTool {
    id: String,
}

impl Tool for NullTool {
    fn id(&self) -> &str {
        &self.id
    }
    fn description(&self) -> &str {
        ""
    }
    fn category(&self) -> &str {
        "unknown"
    }
    fn keywords(&self) -> &[String] {
        &[]
    }
    fn invoke(&self, _args: Value) -> Result<Value> {
        Err(AssistantError::Tool(format!(
            "tool '{}' has no executable implementation",
            self.id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;
    impl Tool for EchoTool {
        fn id(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes back its input"
        }
        fn category(&self) -> &str {
            "utility"
        }
        fn keywords(&self) -> &[String] {
            &[]
        }
        fn invoke(&self, args: Value) -> Result<Value> {
            Ok(args)
        }
    }

    #[test]
    fn register_and_list() {
        let registry = ToolRegistry::new();
        registry.register(ToolDescriptor::new("time", "tells the time", "utility"));
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn invoke_updates_usage_stats() {
        let registry = ToolRegistry::new();
        registry.register_tool(Box::new(EchoTool));
        let result = registry.invoke("echo", Value::String("hi".into()));
        assert!(result.is_ok());
        let descriptor = registry.list().into_iter().find(|d| d.id == "echo").unwrap();
        assert_eq!(descriptor.usage_count, 1);
        assert!(descriptor.success_rate > 0.9);
    }

    #[test]
    fn invoke_unknown_tool_errors() {
        let registry = ToolRegistry::new();
        assert!(registry.invoke("nonexistent", Value::Null).is_err());
    }

    #[test]
    fn null_tool_invocation_fails_gracefully() {
        let registry = ToolRegistry::new();
        registry.register(ToolDescriptor::new("time", "tells the time", "utility"));
        let result = registry.invoke("time", Value::Null);
        assert!(result.is_err());
        let descriptor = registry.list().into_iter().find(|d| d.id == "time").unwrap();
        assert_eq!(descriptor.usage_count, 1);
        assert!(descriptor.success_rate < 1.0);
    }
}
