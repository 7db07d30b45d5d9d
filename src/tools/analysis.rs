//! Analysis synthesis backed by the language model

use super::{names, Tool};
use crate::gemini::GeminiClient;
use crate::models::{ToolInput, ToolOutput};
use crate::Result;
use serde_json::Value;

const SYSTEM_PROMPT: &str = r#"You are a financial analyst. You receive financial metrics for one company and return a single JSON object:

{
  "company_name": "the real company name",
  "symbol": "the ticker you were given",
  "analysis": "a detailed analysis of the financial metrics",
  "score": <number from 0 to 10>,
  "justification": "why the score was given, citing specific figures"
}

Rules:
- Use only the metrics provided. Do not invent numbers.
- Do not use placeholder names such as "Example Corp" or "EXC".
- Do not change company or symbol.
- Only financial metrics belong in the analysis. Recent headlines, when given, are context and do not change the score on their own.
- Do not answer with a generic sentence about the data source; analyse this company.
- Answer with the JSON object only."#;

pub struct GeminiAnalysisTool {
    client: GeminiClient,
}

impl GeminiAnalysisTool {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

fn build_prompt(params: &Value) -> String {
    let text = |key: &str| params.get(key).and_then(Value::as_str).unwrap_or_default();
    let data = params
        .get("data")
        .map(|d| serde_json::to_string_pretty(d).unwrap_or_else(|_| d.to_string()))
        .unwrap_or_default();

    let mut prompt = format!(
        "TARGET COMPANY: {}\nSYMBOL: {}\nDATA SOURCE: {}\n\nFINANCIAL DATA:\n{}\n",
        text("company"),
        text("symbol"),
        text("provider"),
        data
    );

    let headlines: Vec<String> = params
        .pointer("/news/articles")
        .and_then(Value::as_array)
        .map(|articles| {
            articles
                .iter()
                .filter_map(|a| {
                    let title = a.get("title")?.as_str()?;
                    Some(match a.get("source").and_then(Value::as_str) {
                        Some(source) => format!("- {} ({})", title, source),
                        None => format!("- {}", title),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    if !headlines.is_empty() {
        prompt.push_str(&format!("\nRECENT HEADLINES:\n{}\n", headlines.join("\n")));
    }

    if let Some(issue) = params.get("previous_issue").and_then(Value::as_str) {
        prompt.push_str(&format!(
            "\nYour previous answer was rejected ({}). Return a complete JSON object.\n",
            issue
        ));
    }

    prompt
}

/// Pull a JSON object out of a model answer: a ```json fenced block first,
/// then the outermost `{ ... }` span.
pub fn extract_json_object(text: &str) -> Option<Value> {
    if let Some(start) = text.find("```json") {
        let after = &text[start + 7..];
        if let Some(end) = after.find("```") {
            if let Ok(parsed) = serde_json::from_str::<Value>(after[..end].trim()) {
                if parsed.is_object() {
                    return Some(parsed);
                }
            }
        }
    }

    let brace_start = text.find('{')?;
    let brace_end = text.rfind('}')?;
    if brace_end <= brace_start {
        return None;
    }

    serde_json::from_str::<Value>(&text[brace_start..=brace_end])
        .ok()
        .filter(Value::is_object)
}

#[async_trait::async_trait]
impl Tool for GeminiAnalysisTool {
    fn name(&self) -> &str {
        names::SYNTHESIZE_ANALYSIS
    }

    fn description(&self) -> &str {
        "Ask the language model for a structured analysis of the fetched metrics"
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let prompt = build_prompt(&input.parameters);
        let answer = self.client.generate(&prompt, SYSTEM_PROMPT).await?;

        Ok(match extract_json_object(&answer) {
            Some(analysis) => ToolOutput::new(analysis).with_message("analysis drafted"),
            None => ToolOutput::new(Value::Null)
                .with_message("model answer contained no JSON object"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_fenced_json() {
        let answer = "Here it is:\n```json\n{\"symbol\": \"ACM\", \"score\": 7}\n```\nDone.";
        assert_eq!(extract_json_object(answer), Some(json!({"symbol": "ACM", "score": 7})));
    }

    #[test]
    fn test_extract_bare_braces() {
        let answer = "Sure. {\"symbol\": \"ACM\", \"nested\": {\"a\": 1}} Hope this helps.";
        assert_eq!(
            extract_json_object(answer),
            Some(json!({"symbol": "ACM", "nested": {"a": 1}}))
        );
    }

    #[test]
    fn test_extract_rejects_garbage() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
        assert_eq!(extract_json_object("[1, 2, 3]"), None);
    }

    #[test]
    fn test_prompt_mentions_previous_issue() {
        let prompt = build_prompt(&json!({
            "company": "Acme Corp",
            "symbol": "ACM",
            "provider": "yahoo_quote",
            "data": {"pe_ratio": 14.2},
            "previous_issue": "missing or invalid fields: score"
        }));

        assert!(prompt.contains("TARGET COMPANY: Acme Corp"));
        assert!(prompt.contains("\"pe_ratio\": 14.2"));
        assert!(prompt.contains("missing or invalid fields: score"));
        assert!(!prompt.contains("RECENT HEADLINES"));
    }

    #[test]
    fn test_prompt_lists_headlines() {
        let prompt = build_prompt(&json!({
            "company": "Acme Corp",
            "symbol": "ACM",
            "provider": "finnhub_metrics",
            "data": {"metric": {"roeTTM": 18.1}},
            "news": {"articles": [
                {"title": "Acme opens new plant", "source": "Wire"},
                {"title": "Acme beats estimates", "source": null}
            ]},
            "previous_issue": null
        }));

        assert!(prompt.contains("RECENT HEADLINES:\n- Acme opens new plant (Wire)\n- Acme beats estimates\n"));
    }
}
