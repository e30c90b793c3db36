//! Built-in tools shipped with the binary (seed scenario 1, §8): "what time
//! is it" must reach a real implementation, not the registry's placeholder
//! [`super::registry::ToolRegistry::register`] path.

use super::registry::Tool;
use crate::error::Result;
use chrono::Local;
use once_cell::sync::Lazy;
use serde_json::Value;

static TIME_KEYWORDS: Lazy<Vec<String>> =
    Lazy::new(|| vec!["time".to_owned(), "clock".to_owned()]);
static DATE_KEYWORDS: Lazy<Vec<String>> =
    Lazy::new(|| vec!["date".to_owned(), "today".to_owned(), "day".to_owned()]);

/// Reports the current local time, e.g. "3:04 PM".
pub struct TimeTool;

impl Tool for TimeTool {
    fn id(&self) -> &str {
        "time"
    }

    fn description(&self) -> &str {
        "tells the current time"
    }

    fn category(&self) -> &str {
        "time"
    }

    fn keywords(&self) -> &[String] {
        &TIME_KEYWORDS
    }

    fn invoke(&self, _args: Value) -> Result<Value> {
        let now = Local::now().format("%-I:%M %p").to_string();
        Ok(Value::String(now))
    }
}

/// Reports today's local date, e.g. "Monday, July 27, 2026".
pub struct DateTool;

impl Tool for DateTool {
    fn id(&self) -> &str {
        "date"
    }

    fn description(&self) -> &str {
        "tells today's date"
    }

    fn category(&self) -> &str {
        "time"
    }

    fn keywords(&self) -> &[String] {
        &DATE_KEYWORDS
    }

    fn invoke(&self, _args: Value) -> Result<Value> {
        let today = Local::now().format("%A, %B %-d, %Y").to_string();
        Ok(Value::String(today))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_tool_reports_a_nonempty_string() {
        let result = TimeTool.invoke(Value::Null).unwrap();
        assert!(result.as_str().is_some_and(|s| !s.is_empty()));
    }

    #[test]
    fn date_tool_reports_a_nonempty_string() {
        let result = DateTool.invoke(Value::Null).unwrap();
        assert!(result.as_str().is_some_and(|s| !s.is_empty()));
    }

    #[test]
    fn ids_match_the_classifier_keyword_map() {
        assert_eq!(TimeTool.id(), "time");
        assert_eq!(DateTool.id(), "date");
    }
}
