//! Query complexity classification (C6).
//!
//! Pure, side-effect-free pattern matching over normalized text, memoized so
//! repeated identical queries (cache re-hits, retries) skip re-matching
//! (§4.6).

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;

/// Query complexity tier, each with a latency budget and tool cap (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryComplexity {
    Instant,
    ExplicitFact,
    SimpleReasoning,
    ComplexMultiStep,
}

impl QueryComplexity {
    /// Hard wall-clock budget in seconds (§5).
    #[must_use]
    pub fn budget_s(self, timeouts: &crate::config::ComplexityTimeouts) -> f32 {
        match self {
            Self::Instant => timeouts.instant_s,
            Self::ExplicitFact => timeouts.explicit_fact_s,
            Self::SimpleReasoning => timeouts.simple_reasoning_s,
            Self::ComplexMultiStep => timeouts.complex_multi_step_s,
        }
    }

    /// Maximum number of tools the router may pass to the agent (§3).
    #[must_use]
    pub fn max_tools(self) -> usize {
        match self {
            Self::Instant => 0,
            Self::ExplicitFact => 1,
            Self::SimpleReasoning => 2,
            Self::ComplexMultiStep => 3,
        }
    }
}

/// Pure classification result (§3).
#[derive(Debug, Clone)]
pub struct Classification {
    pub complexity: QueryComplexity,
    pub confidence: f32,
    pub suggested_tools: Vec<String>,
    pub reasoning: String,
}

struct Pattern {
    regex: Regex,
    complexity: QueryComplexity,
    confidence: f32,
    reasoning: &'static str,
}

static PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    vec![
        Pattern {
            regex: Regex::new(r"(?i)^(hi|hello|hey|thanks|thank you|goodbye|bye)\b").unwrap(),
            complexity: QueryComplexity::Instant,
            confidence: 0.95,
            reasoning: "matches greeting/farewell pattern",
        },
        Pattern {
            regex: Regex::new(r"(?i)\b(create|build|write) (a|an|the)? ?script\b").unwrap(),
            complexity: QueryComplexity::ComplexMultiStep,
            confidence: 0.9,
            reasoning: "multi-step script authoring request",
        },
        Pattern {
            regex: Regex::new(r"(?i)\b(and then|after that|step by step|multiple steps)\b").unwrap(),
            complexity: QueryComplexity::ComplexMultiStep,
            confidence: 0.75,
            reasoning: "sequenced multi-step phrasing",
        },
        Pattern {
            regex: Regex::new(r"(?i)^(what|who|when|where) (is|are|was|were)\b").unwrap(),
            complexity: QueryComplexity::ExplicitFact,
            confidence: 0.8,
            reasoning: "direct factual question",
        },
        Pattern {
            regex: Regex::new(r"(?i)\b(remember|set a reminder|what time|what's the date)\b").unwrap(),
            complexity: QueryComplexity::ExplicitFact,
            confidence: 0.7,
            reasoning: "explicit fact lookup or memory action",
        },
        Pattern {
            regex: Regex::new(r"(?i)^(why|how) (do|does|did|can|could|should)\b").unwrap(),
            complexity: QueryComplexity::SimpleReasoning,
            confidence: 0.65,
            reasoning: "reasoning question requiring explanation",
        },
        Pattern {
            regex: Regex::new(r"(?i)\b(compare|explain|recommend|suggest)\b").unwrap(),
            complexity: QueryComplexity::SimpleReasoning,
            confidence: 0.6,
            reasoning: "comparative or explanatory request",
        },
    ]
});

/// Keyword to suggested-tool map used for tool hints independent of the
/// matched complexity pattern (§4.6).
static KEYWORD_TOOLS: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    vec![
        ("time", "time"),
        ("date", "time"),
        ("weather", "weather"),
        ("remind", "reminders"),
        ("remember", "memory"),
        ("script", "code_exec"),
        ("disk", "system_info"),
        ("file", "filesystem"),
        ("calculate", "calculator"),
        ("search", "web_search"),
    ]
});

/// Regex-pattern classifier with normalized-text memoization (§4.6).
pub struct Classifier {
    cache: Mutex<HashMap<String, Classification>>,
}

impl Classifier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Classify `text`. Results are memoized by normalized text.
    #[must_use]
    pub fn classify(&self, text: &str) -> Classification {
        let normalized = normalize(text);
        if let Some(cached) = self.cache.lock().get(&normalized) {
            return cached.clone();
        }
        let result = classify_uncached(&normalized);
        self.cache.lock().insert(normalized, result.clone());
        result
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn classify_uncached(normalized: &str) -> Classification {
    if normalized.is_empty() {
        return Classification {
            complexity: QueryComplexity::Instant,
            confidence: 0.0,
            suggested_tools: Vec::new(),
            reasoning: "empty transcript".to_owned(),
        };
    }

    let suggested_tools = suggest_tools(normalized);

    // Tie-break order per §4.6: Instant > Complex(>=0.7) > best of
    // ExplicitFact/SimpleReasoning (if >=0.6) > Complex(>=0.5) > SimpleReasoning default.
    let matches: Vec<&Pattern> = PATTERNS.iter().filter(|p| p.regex.is_match(normalized)).collect();

    if let Some(p) = matches.iter().find(|p| p.complexity == QueryComplexity::Instant) {
        return Classification {
            complexity: p.complexity,
            confidence: p.confidence,
            suggested_tools,
            reasoning: p.reasoning.to_owned(),
        };
    }

    if let Some(p) = matches
        .iter()
        .find(|p| p.complexity == QueryComplexity::ComplexMultiStep && p.confidence >= 0.7)
    {
        return Classification {
            complexity: p.complexity,
            confidence: p.confidence,
            suggested_tools,
            reasoning: p.reasoning.to_owned(),
        };
    }

    let fact_or_reasoning: Vec<&&Pattern> = matches
        .iter()
        .filter(|p| {
            matches!(
                p.complexity,
                QueryComplexity::ExplicitFact | QueryComplexity::SimpleReasoning
            ) && p.confidence >= 0.6
        })
        .collect();
    if let Some(best) = fact_or_reasoning
        .iter()
        .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap())
    {
        return Classification {
            complexity: best.complexity,
            confidence: best.confidence,
            suggested_tools,
            reasoning: best.reasoning.to_owned(),
        };
    }

    if let Some(p) = matches
        .iter()
        .find(|p| p.complexity == QueryComplexity::ComplexMultiStep && p.confidence >= 0.5)
    {
        return Classification {
            complexity: p.complexity,
            confidence: p.confidence,
            suggested_tools,
            reasoning: p.reasoning.to_owned(),
        };
    }

    Classification {
        complexity: QueryComplexity::SimpleReasoning,
        confidence: 0.5,
        suggested_tools,
        reasoning: "no strong pattern match, default reasoning tier".to_owned(),
    }
}

fn suggest_tools(normalized: &str) -> Vec<String> {
    let mut tools: Vec<String> = KEYWORD_TOOLS
        .iter()
        .filter(|(kw, _)| normalized.contains(kw))
        .map(|(_, tool)| (*tool).to_owned())
        .collect();
    tools.dedup();
    tools
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_is_instant() {
        let c = Classifier::new();
        let result = c.classify("hello there");
        assert_eq!(result.complexity, QueryComplexity::Instant);
        assert!((0.0..=1.0).contains(&result.confidence));
    }

    #[test]
    fn time_question_is_explicit_fact() {
        let c = Classifier::new();
        let result = c.classify("what time is it");
        assert_eq!(result.complexity, QueryComplexity::ExplicitFact);
        assert!(result.suggested_tools.contains(&"time".to_owned()));
    }

    #[test]
    fn script_request_is_complex() {
        let c = Classifier::new();
        let result = c.classify("create a script that lists disk usage and saves it to a file");
        assert_eq!(result.complexity, QueryComplexity::ComplexMultiStep);
    }

    #[test]
    fn empty_text_is_safe() {
        let c = Classifier::new();
        let result = c.classify("");
        assert_eq!(result.confidence, 0.0);
        assert!(result.suggested_tools.is_empty());
    }

    #[test]
    fn result_is_memoized() {
        let c = Classifier::new();
        let first = c.classify("why does this happen");
        let second = c.classify("Why Does This Happen");
        assert_eq!(first.complexity, second.complexity);
        assert_eq!(first.confidence, second.confidence);
    }

    #[test]
    fn max_tools_per_complexity() {
        assert_eq!(QueryComplexity::Instant.max_tools(), 0);
        assert_eq!(QueryComplexity::ExplicitFact.max_tools(), 1);
        assert_eq!(QueryComplexity::SimpleReasoning.max_tools(), 2);
        assert_eq!(QueryComplexity::ComplexMultiStep.max_tools(), 3);
    }
}
