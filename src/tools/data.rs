//! Data tools: string utilities, JSON validation and extractive summaries.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{required_str, Tool, ToolArgs, ToolCategory};

const DEFAULT_SUMMARY_SENTENCES: u64 = 3;

/// Simple text transformations and counts.
pub struct StringManipulator;

#[async_trait]
impl Tool for StringManipulator {
    fn name(&self) -> &str {
        "string_manipulator"
    }

    fn description(&self) -> &str {
        "Transform or measure text: uppercase, lowercase, reverse, count_words, count_chars."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "Input text"
                },
                "operation": {
                    "type": "string",
                    "enum": ["uppercase", "lowercase", "reverse", "count_words", "count_chars"]
                }
            },
            "required": ["text", "operation"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Data
    }

    async fn execute(&self, args: &ToolArgs) -> anyhow::Result<String> {
        let text = required_str(args, "text")?;
        let operation = required_str(args, "operation")?;

        let result = match operation {
            "uppercase" => text.to_uppercase(),
            "lowercase" => text.to_lowercase(),
            "reverse" => text.chars().rev().collect(),
            "count_words" => text.split_whitespace().count().to_string(),
            "count_chars" => text.chars().count().to_string(),
            other => anyhow::bail!("Unsupported operation: {}", other),
        };
        Ok(result)
    }
}

/// Validate a JSON document and re-serialize it.
pub struct JsonParser;

#[async_trait]
impl Tool for JsonParser {
    fn name(&self) -> &str {
        "json_parser"
    }

    fn description(&self) -> &str {
        "Validate a JSON string and return it normalized, pretty-printed by default."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "json_string": {
                    "type": "string",
                    "description": "JSON text to parse"
                },
                "pretty": {
                    "type": "boolean",
                    "description": "Indent the output (default: true)"
                }
            },
            "required": ["json_string"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Data
    }

    async fn execute(&self, args: &ToolArgs) -> anyhow::Result<String> {
        let raw = required_str(args, "json_string")?;
        let pretty = args.get("pretty").and_then(Value::as_bool).unwrap_or(true);

        let value: Value =
            serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("Invalid JSON: {}", e))?;
        let output = if pretty {
            serde_json::to_string_pretty(&value)?
        } else {
            serde_json::to_string(&value)?
        };
        Ok(output)
    }
}

/// Extractive summary: keeps the longest sentences.
pub struct TextSummarizer;

#[async_trait]
impl Tool for TextSummarizer {
    fn name(&self) -> &str {
        "text_summarizer"
    }

    fn description(&self) -> &str {
        "Shorten a text by keeping its longest sentences. A quick heuristic, not an abstractive summary."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "Text to summarize"
                },
                "max_sentences": {
                    "type": "integer",
                    "description": "Sentences to keep (default: 3)"
                }
            },
            "required": ["text"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Data
    }

    async fn execute(&self, args: &ToolArgs) -> anyhow::Result<String> {
        let text = required_str(args, "text")?;
        let max_sentences = match args.get("max_sentences") {
            None | Some(Value::Null) => DEFAULT_SUMMARY_SENTENCES,
            Some(value) => value
                .as_u64()
                .filter(|n| *n > 0)
                .ok_or_else(|| anyhow::anyhow!("'max_sentences' must be a positive integer"))?,
        };
        Ok(summarize(text, max_sentences as usize))
    }
}

/// Keep the `max_sentences` longest sentences, in their original order.
/// Texts that are already short enough come back unchanged.
fn summarize(text: &str, max_sentences: usize) -> String {
    let sentences: Vec<&str> = text
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if sentences.len() <= max_sentences {
        return text.to_string();
    }

    let mut ranked: Vec<usize> = (0..sentences.len()).collect();
    // Stable: equal lengths keep document order.
    ranked.sort_by(|&a, &b| sentences[b].chars().count().cmp(&sentences[a].chars().count()));
    ranked.truncate(max_sentences);
    ranked.sort_unstable();

    tracing::debug!("Summarized {} sentences down to {}", sentences.len(), ranked.len());

    let kept: Vec<&str> = ranked.into_iter().map(|i| sentences[i]).collect();
    format!("{}.", kept.join(". "))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(text: &str, operation: &str) -> anyhow::Result<String> {
        let mut args = ToolArgs::new();
        args.insert("text".into(), json!(text));
        args.insert("operation".into(), json!(operation));
        StringManipulator.execute(&args).await
    }

    #[tokio::test]
    async fn operations() {
        assert_eq!(run("Hello", "uppercase").await.unwrap(), "HELLO");
        assert_eq!(run("Hello", "lowercase").await.unwrap(), "hello");
        assert_eq!(run("héllo", "reverse").await.unwrap(), "olléh");
        assert_eq!(run(" a  b c ", "count_words").await.unwrap(), "3");
        assert_eq!(run("héllo", "count_chars").await.unwrap(), "5");
    }

    #[tokio::test]
    async fn unsupported_operation_fails() {
        assert!(run("x", "shout").await.is_err());
    }

    #[tokio::test]
    async fn json_parser_pretty_prints_by_default() {
        let mut args = ToolArgs::new();
        args.insert("json_string".into(), json!(r#"{"name":"에이전트","tags":[1,2]}"#));

        let out = JsonParser.execute(&args).await.unwrap();
        assert!(out.contains('\n'));
        assert!(out.contains("에이전트"));
        let reparsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(reparsed, json!({"name": "에이전트", "tags": [1, 2]}));

        args.insert("pretty".into(), json!(false));
        let compact = JsonParser.execute(&args).await.unwrap();
        assert!(!compact.contains('\n'));
    }

    #[tokio::test]
    async fn json_parser_rejects_invalid_input() {
        let mut args = ToolArgs::new();
        args.insert("json_string".into(), json!("{not json"));
        let err = JsonParser.execute(&args).await.unwrap_err();
        assert!(err.to_string().starts_with("Invalid JSON"));
    }

    #[test]
    fn summary_keeps_longest_sentences_in_order() {
        let text = "Short one. This sentence is clearly the longest of them all. Mid sized sentence here. Tiny.";
        assert_eq!(
            summarize(text, 2),
            "This sentence is clearly the longest of them all. Mid sized sentence here."
        );
    }

    #[test]
    fn short_text_is_returned_unchanged() {
        let text = "Only one sentence. And two.";
        assert_eq!(summarize(text, 3), text);
    }

    #[tokio::test]
    async fn summarizer_validates_sentence_count() {
        let mut args = ToolArgs::new();
        args.insert("text".into(), json!("A. B. C. D."));
        assert_eq!(TextSummarizer.execute(&args).await.unwrap(), "A. B. C.");

        args.insert("max_sentences".into(), json!(0));
        assert!(TextSummarizer.execute(&args).await.is_err());
    }
}
