//! Core data models for the analysis pipeline

use crate::error::FailureKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

//
// ================= Enums =================
//

/// Executable nodes of the pipeline. Termination is a router verdict,
/// not a node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    LookupSymbol,
    FetchPrimary,
    FetchFallback,
    FetchNews,
    Synthesize,
    GenerateReport,
}

impl NodeId {
    pub fn capability(&self) -> Capability {
        match self {
            NodeId::LookupSymbol => Capability::SymbolLookup,
            NodeId::FetchPrimary | NodeId::FetchFallback => Capability::FinancialMetrics,
            NodeId::FetchNews => Capability::News,
            NodeId::Synthesize => Capability::Synthesis,
            NodeId::GenerateReport => Capability::Report,
        }
    }
}

/// What a tool is used for. Each capability has its own fallback plan.
/// `News` is optional: the run proceeds without it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    SymbolLookup,
    FinancialMetrics,
    News,
    Synthesis,
    Report,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Success,
    Empty,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

//
// ================= Tool I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    pub parameters: Value,
}

/// Raw value produced by a tool before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub data: Value,
    pub message: Option<String>,
}

impl ToolOutput {
    pub fn new(data: Value) -> Self {
        Self { data, message: None }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Normalized result of one gateway invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolOutcome {
    pub kind: OutcomeKind,
    pub payload: Option<Value>,
    pub message: Option<String>,
}

impl ToolOutcome {
    pub fn success(payload: Value, message: Option<String>) -> Self {
        Self {
            kind: OutcomeKind::Success,
            payload: Some(payload),
            message,
        }
    }

    pub fn empty(message: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Empty,
            payload: None,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Error,
            payload: None,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
}

//
// ================= Observations =================
//

/// One tool invocation as recorded in the task state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub sequence: u32,
    pub node: NodeId,
    pub capability: Capability,
    pub provider: String,
    pub kind: OutcomeKind,
    pub payload: Option<Value>,
    pub message: Option<String>,
    pub elapsed_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl Observation {
    pub fn from_outcome(node: NodeId, provider: &str, outcome: ToolOutcome, elapsed_ms: u64) -> Self {
        Self {
            sequence: 0,
            node,
            capability: node.capability(),
            provider: provider.to_string(),
            kind: outcome.kind,
            payload: outcome.payload,
            message: outcome.message,
            elapsed_ms,
            created_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }
}

//
// ================= Analysis =================
//

/// Structured analysis produced by the synthesis step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DraftAnalysis {
    pub company_name: String,
    pub symbol: String,
    pub analysis: String,
    pub score: f32,
    pub justification: String,
}

/// Placeholder narrative the model returns when it ignores the data.
const GENERIC_NARRATIVE: &str = "financial analysis based on data obtained from finnhub";

/// Accepted keys per draft field, in priority order. Model answers use
/// English or Spanish keys and sometimes repeat a field under both.
const COMPANY_KEYS: &[&str] = &["company_name", "nombre_empresa", "company"];
const SYMBOL_KEYS: &[&str] = &["symbol", "símbolo", "simbolo"];
const ANALYSIS_KEYS: &[&str] = &["analysis", "análisis", "analisis", "narrative"];
const SCORE_KEYS: &[&str] = &["score", "puntuación", "puntuacion", "rating"];
const JUSTIFICATION_KEYS: &[&str] = &["justification", "justificación", "justificacion"];

/// First key in `keys` whose value is a non-blank string.
fn text_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn score_field(map: &Map<String, Value>, keys: &[&str]) -> Option<f32> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find_map(parse_score)
}

/// Parse `7`, `7.5`, `"7"` or `"7/10"` into a score in `0..=10`.
pub fn parse_score(value: &Value) -> Option<f32> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let head = s.split('/').next()?.trim();
            head.parse::<f64>().ok()?
        }
        _ => return None,
    };

    if raw.is_finite() && (0.0..=10.0).contains(&raw) {
        Some(raw as f32)
    } else {
        None
    }
}

impl DraftAnalysis {
    /// Build a draft from a model payload, naming every missing or invalid
    /// field on failure.
    pub fn from_value(value: &Value) -> std::result::Result<Self, String> {
        let map = value
            .as_object()
            .ok_or_else(|| "analysis is not a JSON object".to_string())?;

        let company_name = text_field(map, COMPANY_KEYS);
        let symbol = text_field(map, SYMBOL_KEYS);
        let analysis = text_field(map, ANALYSIS_KEYS);
        let score = score_field(map, SCORE_KEYS);
        let justification = text_field(map, JUSTIFICATION_KEYS);

        let mut missing = Vec::new();
        if company_name.is_none() {
            missing.push("company_name");
        }
        if symbol.is_none() {
            missing.push("symbol");
        }
        if analysis.is_none() {
            missing.push("analysis");
        }
        if score.is_none() {
            missing.push("score");
        }
        if justification.is_none() {
            missing.push("justification");
        }

        match (company_name, symbol, analysis, score, justification) {
            (Some(company_name), Some(symbol), Some(analysis), Some(score), Some(justification)) => {
                Ok(Self {
                    company_name,
                    symbol,
                    analysis,
                    score,
                    justification,
                })
            }
            _ => Err(format!("missing or invalid fields: {}", missing.join(", "))),
        }
    }

    /// The analysis is the stock placeholder rather than company-specific text.
    pub fn is_generic(&self) -> bool {
        self.analysis.to_lowercase().contains(GENERIC_NARRATIVE)
    }

    /// All required fields present and the score within range.
    pub fn is_complete(&self) -> bool {
        !self.company_name.trim().is_empty()
            && !self.symbol.trim().is_empty()
            && !self.analysis.trim().is_empty()
            && !self.justification.trim().is_empty()
            && (0.0..=10.0).contains(&self.score)
    }
}

//
// ================= Final Result =================
//

/// What a caller gets back from a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub subject: String,
    pub status: RunStatus,
    pub symbol: Option<String>,
    pub analysis: Option<DraftAnalysis>,
    pub artifact: Option<String>,
    pub failure: Option<FailureKind>,
    pub error: Option<String>,
    pub steps: u32,
    pub observations: Vec<Observation>,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeId::LookupSymbol => "LookupSymbol",
            NodeId::FetchPrimary => "FetchPrimary",
            NodeId::FetchFallback => "FetchFallback",
            NodeId::FetchNews => "FetchNews",
            NodeId::Synthesize => "Synthesize",
            NodeId::GenerateReport => "GenerateReport",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "Running",
            RunStatus::Completed => "Completed",
            RunStatus::Failed => "Failed",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_draft_from_english_keys() {
        let draft = DraftAnalysis::from_value(&json!({
            "company_name": "Acme Corp",
            "symbol": "ACM",
            "analysis": "Margins expanded for three consecutive years.",
            "score": 7,
            "justification": "ROE of 18% against a sector median of 11%."
        }))
        .unwrap();

        assert_eq!(draft.symbol, "ACM");
        assert_eq!(draft.score, 7.0);
        assert!(draft.is_complete());
    }

    #[test]
    fn test_draft_from_spanish_keys_and_string_score() {
        let draft = DraftAnalysis::from_value(&json!({
            "nombre_empresa": "Acme Corp",
            "symbol": "ACM",
            "análisis": "Crecimiento sostenido de ingresos.",
            "puntuación": "8/10",
            "justificación": "Deuda contenida."
        }))
        .unwrap();

        assert_eq!(draft.company_name, "Acme Corp");
        assert_eq!(draft.score, 8.0);
    }

    #[test]
    fn test_draft_reports_missing_fields() {
        let err = DraftAnalysis::from_value(&json!({
            "company_name": "Acme Corp",
            "symbol": "  ",
            "analysis": "Fine.",
            "score": 14
        }))
        .unwrap_err();

        assert!(err.contains("symbol"));
        assert!(err.contains("score"));
        assert!(err.contains("justification"));
        assert!(!err.contains("company_name"));
    }

    #[test]
    fn test_draft_accepts_repeated_fields_under_both_key_sets() {
        let draft = DraftAnalysis::from_value(&json!({
            "company_name": "Acme Corp",
            "company": "Acme Corp",
            "nombre_empresa": "Acme Corp",
            "symbol": "ACM",
            "símbolo": "ACM",
            "analysis": "Net margin of 14% on stable revenue.",
            "análisis": "Margen neto del 14%.",
            "score": "not a number",
            "puntuación": 6,
            "justification": "",
            "justificación": "Deuda moderada."
        }))
        .unwrap();

        assert_eq!(draft.company_name, "Acme Corp");
        assert_eq!(draft.analysis, "Net margin of 14% on stable revenue.");
        assert_eq!(draft.score, 6.0);
        assert_eq!(draft.justification, "Deuda moderada.");
    }

    #[test]
    fn test_draft_rejects_non_object() {
        assert!(DraftAnalysis::from_value(&json!("just text")).is_err());
    }

    #[test]
    fn test_generic_narrative_detection() {
        let mut draft = DraftAnalysis::from_value(&json!({
            "company_name": "Acme Corp",
            "symbol": "ACM",
            "analysis": "Financial analysis based on data obtained from Finnhub.",
            "score": 5,
            "justification": "n/a"
        }))
        .unwrap();
        assert!(draft.is_generic());

        draft.analysis = "Operating margin widened to 19%.".into();
        assert!(!draft.is_generic());
    }

    #[test]
    fn test_parse_score_forms() {
        assert_eq!(parse_score(&json!(0)), Some(0.0));
        assert_eq!(parse_score(&json!("7.5")), Some(7.5));
        assert_eq!(parse_score(&json!(" 9 / 10")), Some(9.0));
        assert_eq!(parse_score(&json!(-1)), None);
        assert_eq!(parse_score(&json!("high")), None);
        assert_eq!(parse_score(&json!(null)), None);
    }
}
