//! Deterministic pattern-to-response handler (C7).
//!
//! Keeps processing well under the 50ms target (§4.7) by avoiding any LLM or
//! network call: a static regex table picks a response type, then a
//! template is chosen (optionally with light personalization) without
//! touching the agent pipeline.

use crate::tools::registry::ToolRegistry;
use chrono::Timelike;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Category of instant response, used to pick a template list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    Greeting,
    Farewell,
    Thanks,
    ToolListing,
}

struct PatternEntry {
    regex: Regex,
    response_type: ResponseType,
}

static PATTERN_TABLE: Lazy<Vec<PatternEntry>> = Lazy::new(|| {
    vec![
        PatternEntry {
            regex: Regex::new(r"(?i)^(hi|hello|hey|good morning|good evening)\b").unwrap(),
            response_type: ResponseType::Greeting,
        },
        PatternEntry {
            regex: Regex::new(r"(?i)^(bye|goodbye|see you|talk later)\b").unwrap(),
            response_type: ResponseType::Farewell,
        },
        PatternEntry {
            regex: Regex::new(r"(?i)^(thanks|thank you)\b").unwrap(),
            response_type: ResponseType::Thanks,
        },
        PatternEntry {
            regex: Regex::new(r"(?i)\b(what (tools|can you do)|list (your )?tools)\b").unwrap(),
            response_type: ResponseType::ToolListing,
        },
    ]
});

const GREETING_TEMPLATES: &[&str] = &["Hi there!", "Hello!", "Hey, how can I help?"];
const FAREWELL_TEMPLATES: &[&str] = &["Goodbye!", "See you later!", "Talk soon!"];
const THANKS_TEMPLATES: &[&str] = &["You're welcome!", "Happy to help!", "Anytime!"];

/// Static pattern table → template instant responder (§4.7).
pub struct InstantHandler {
    user_name: Option<String>,
}

impl InstantHandler {
    #[must_use]
    pub fn new(user_name: Option<String>) -> Self {
        Self { user_name }
    }

    /// Attempt to match `text` against the pattern table, returning a
    /// rendered response if one of the instant categories matches.
    #[must_use]
    pub fn handle(&self, text: &str, registry: &ToolRegistry) -> Option<String> {
        let entry = PATTERN_TABLE.iter().find(|e| e.regex.is_match(text))?;
        let response = match entry.response_type {
            ResponseType::Greeting => self.render_time_aware(text, GREETING_TEMPLATES),
            ResponseType::Farewell => self.render_time_aware(text, FAREWELL_TEMPLATES),
            ResponseType::Thanks => pick_template(text, THANKS_TEMPLATES).to_owned(),
            ResponseType::ToolListing => render_tool_listing(registry),
        };
        Some(response)
    }

    /// Cache key for instant responses: independent of which template was
    /// rendered, keyed by normalized text (§4.7).
    #[must_use]
    pub fn cache_key(text: &str) -> String {
        text.trim().to_lowercase()
    }

    fn render_time_aware(&self, text: &str, templates: &[&str]) -> String {
        let mut response = pick_template(text, templates).to_owned();
        let hour = chrono::Local::now().hour();
        if templates.as_ptr() == GREETING_TEMPLATES.as_ptr() {
            let greeting = if hour < 12 {
                "Good morning!"
            } else if hour < 18 {
                "Good afternoon!"
            } else {
                "Good evening!"
            };
            response = greeting.to_owned();
        }
        if should_personalize(text) {
            if let Some(name) = &self.user_name {
                response = format!("{response} {name}.");
            }
        }
        response
    }
}

fn pick_template<'a>(text: &str, templates: &'a [&'a str]) -> &'a str {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    let idx = (hasher.finish() as usize) % templates.len();
    templates[idx]
}

/// 30% personalization probability, made deterministic from text hash so
/// results are reproducible in tests (§4.7).
fn should_personalize(text: &str) -> bool {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    (hasher.finish() % 10) < 3
}

fn render_tool_listing(registry: &ToolRegistry) -> String {
    let descriptors = registry.list();
    if descriptors.is_empty() {
        return "I don't have any tools available right now.".to_owned();
    }
    let names: Vec<&str> = descriptors.iter().map(|d| d.id.as_str()).collect();
    format!("I have access to these tools: {}.", names.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::registry::ToolDescriptor;

    fn empty_registry() -> ToolRegistry {
        ToolRegistry::new()
    }

    #[test]
    fn greeting_matches_and_renders() {
        let handler = InstantHandler::new(None);
        let response = handler.handle("hello there", &empty_registry());
        assert!(response.is_some());
    }

    #[test]
    fn unmatched_text_returns_none() {
        let handler = InstantHandler::new(None);
        assert!(handler.handle("what time is it", &empty_registry()).is_none());
    }

    #[test]
    fn tool_listing_reflects_registry_state() {
        let handler = InstantHandler::new(None);
        let registry = ToolRegistry::new();
        registry.register(ToolDescriptor::new("time", "tells the time", "utility"));
        let response = handler.handle("what tools can you use", &registry).unwrap();
        assert!(response.contains("time"));
    }

    #[test]
    fn cache_key_is_normalized() {
        assert_eq!(InstantHandler::cache_key("  Hello "), "hello");
    }

    #[test]
    fn empty_tool_registry_has_honest_message() {
        let handler = InstantHandler::new(None);
        let response = handler.handle("list your tools", &empty_registry()).unwrap();
        assert!(response.contains("don't have"));
    }
}
