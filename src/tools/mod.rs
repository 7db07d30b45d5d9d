//! Tool trait and gateway
//!
//! Every external capability (symbol lookup, metric providers, the analysis
//! model, the report writer) sits behind `Tool`. The gateway runs each call
//! under a timeout and normalizes the result into a `ToolOutcome`.

use crate::config::{OrchestratorConfig, ProviderConfig};
use crate::error::OrchestrationError;
use crate::gemini::GeminiClient;
use crate::metrics::UsageMetrics;
use crate::models::{ToolDescriptor, ToolInput, ToolOutcome, ToolOutput};
use crate::Result;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

pub mod analysis;
pub mod providers;
pub mod report;
pub mod scripted;

pub use analysis::GeminiAnalysisTool;
pub use providers::{
    FinnhubMetricsTool, NewsApiTool, ProviderClient, SymbolSearchTool, YahooQuoteTool,
};
pub use report::MarkdownReportTool;
pub use scripted::{ScriptedResponse, ScriptedTool};

/// Built-in tool names used by the default fallback plans.
pub mod names {
    pub const SEARCH_SYMBOL: &str = "search_symbol";
    pub const FINNHUB_METRICS: &str = "finnhub_metrics";
    pub const YAHOO_QUOTE: &str = "yahoo_quote";
    pub const NEWSAPI_HEADLINES: &str = "newsapi_headlines";
    pub const SYNTHESIZE_ANALYSIS: &str = "synthesize_analysis";
    pub const GENERATE_REPORT: &str = "generate_report";
}

/// Trait for a single external capability
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// Whether a structurally valid value carries usable content.
    fn has_content(&self, data: &Value) -> bool {
        value_has_content(data)
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;
}

/// True when the value holds at least one non-null, non-blank leaf.
pub fn value_has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(_) | Value::Number(_) => true,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => items.iter().any(value_has_content),
        Value::Object(map) => map.values().any(value_has_content),
    }
}

/// True when `data[field]` exists and has content.
pub fn field_has_content(data: &Value, field: &str) -> bool {
    data.get(field).is_some_and(value_has_content)
}

/// Named tools plus the timeout applied when the caller gives none.
pub struct ToolGateway {
    tools: HashMap<String, Arc<dyn Tool>>,
    default_timeout: Duration,
}

impl ToolGateway {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            default_timeout,
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tools, sorted by name.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<ToolDescriptor> = self
            .tools
            .values()
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
            })
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Invoke a tool. Never fails: timeouts, transport errors and unknown
    /// tools come back as `OutcomeKind::Error`.
    pub async fn invoke(&self, tool_name: &str, args: Value, timeout: Duration) -> ToolOutcome {
        let Some(tool) = self.get(tool_name) else {
            warn!(tool_name = %tool_name, "Tool not registered");
            return ToolOutcome::error(
                OrchestrationError::ToolNotFound(tool_name.to_string()).to_string(),
            );
        };

        let input = ToolInput {
            tool_name: tool_name.to_string(),
            parameters: args,
        };

        match tokio::time::timeout(timeout, tool.execute(&input)).await {
            Err(_) => {
                warn!(
                    tool_name = %tool_name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Tool call timed out"
                );
                ToolOutcome::error(format!(
                    "{} timed out after {} ms",
                    tool_name,
                    timeout.as_millis()
                ))
            }
            Ok(Err(e)) => {
                error!(tool_name = %tool_name, error = %e, "Tool execution failed");
                ToolOutcome::error(e.to_string())
            }
            Ok(Ok(output)) => {
                if tool.has_content(&output.data) {
                    ToolOutcome::success(output.data, output.message)
                } else {
                    debug!(tool_name = %tool_name, "Tool returned no usable content");
                    ToolOutcome::empty(
                        output
                            .message
                            .unwrap_or_else(|| format!("{} returned no usable content", tool_name)),
                    )
                }
            }
        }
    }

    pub async fn invoke_default(&self, tool_name: &str, args: Value) -> ToolOutcome {
        self.invoke(tool_name, args, self.default_timeout).await
    }
}

fn gemini_client(providers: &ProviderConfig, metrics: Arc<UsageMetrics>) -> Result<GeminiClient> {
    let client = GeminiClient::new(
        providers.gemini_api_key.clone().unwrap_or_default(),
        metrics,
    )?;

    Ok(match &providers.gemini_endpoint {
        Some(endpoint) => client.with_endpoint(endpoint.clone()),
        None => client,
    })
}

/// Gateway backed by the live HTTP providers and the Gemini model.
pub fn create_default_gateway(
    providers: &ProviderConfig,
    config: &OrchestratorConfig,
    metrics: Arc<UsageMetrics>,
) -> Result<ToolGateway> {
    let finnhub = ProviderClient::new(
        providers.finnhub_base_url.clone(),
        providers.finnhub_api_key.clone(),
    )?;
    let yahoo = ProviderClient::new(providers.yahoo_base_url.clone(), None)?;
    let gemini = gemini_client(providers, metrics)?;
    let news = NewsApiTool::new(providers.news_base_url.clone(), providers.news_api_key.clone())?;

    let gateway = ToolGateway::new(config.tool_timeout)
        .with_tool(Arc::new(SymbolSearchTool::new(finnhub.clone())))
        .with_tool(Arc::new(FinnhubMetricsTool::new(finnhub)))
        .with_tool(Arc::new(YahooQuoteTool::new(yahoo)))
        .with_tool(Arc::new(news))
        .with_tool(Arc::new(GeminiAnalysisTool::new(gemini)))
        .with_tool(Arc::new(
            MarkdownReportTool::new(providers.report_output_dir.clone())
                .with_completion_marker(&config.completion_marker),
        ));

    Ok(gateway)
}

/// Ticker-like symbol derived from a company name, used by the offline demo.
fn demo_symbol(company: &str) -> String {
    let initials: String = company
        .split_whitespace()
        .filter_map(|word| word.chars().find(|c| c.is_ascii_alphabetic()))
        .map(|c| c.to_ascii_uppercase())
        .take(4)
        .collect();

    if initials.is_empty() {
        "DEMO".to_string()
    } else {
        initials
    }
}

/// Gateway that keeps the pipeline runnable without provider credentials.
/// Data tools are scripted; the report writer is real.
pub fn create_offline_gateway(providers: &ProviderConfig, config: &OrchestratorConfig) -> ToolGateway {
    let lookup = ScriptedTool::new(names::SEARCH_SYMBOL, "Offline symbol lookup")
        .requiring("symbol")
        .with_responder(|input| {
            let company = input
                .parameters
                .get("company")
                .and_then(Value::as_str)
                .unwrap_or_default();
            ScriptedResponse::Value(json!({
                "symbol": demo_symbol(company),
                "description": company,
            }))
        });

    let primary = ScriptedTool::new(names::FINNHUB_METRICS, "Offline metrics (empty)")
        .requiring("metric")
        .then_value(json!({ "metric": {}, "series": {} }));

    let secondary = ScriptedTool::new(names::YAHOO_QUOTE, "Offline quote summary").then_value(json!({
        "current_price": 101.25,
        "market_cap": 48_200_000_000u64,
        "pe_ratio": 17.4,
        "beta": 1.08,
        "profit_margin": 0.142,
        "operating_margin": 0.191,
        "revenue_growth": 0.064,
        "debt_to_equity": 62.3,
    }));

    let news = ScriptedTool::new(names::NEWSAPI_HEADLINES, "Offline headlines")
        .requiring("articles")
        .with_responder(|input| {
            let company = input
                .parameters
                .get("company")
                .and_then(Value::as_str)
                .unwrap_or_default();
            ScriptedResponse::Value(json!({
                "articles": [{
                    "title": format!("{} reports steady quarterly results", company),
                    "description": "Scripted headline for offline runs.",
                    "url": null,
                    "source": "Offline Wire",
                    "published_at": null,
                }]
            }))
        });

    let synthesis = ScriptedTool::new(names::SYNTHESIZE_ANALYSIS, "Offline analysis")
        .with_responder(|input| {
            let company = input.parameters.get("company").cloned().unwrap_or(Value::Null);
            let symbol = input.parameters.get("symbol").cloned().unwrap_or(Value::Null);
            ScriptedResponse::Value(json!({
                "company_name": company,
                "symbol": symbol,
                "analysis": "Offline demo data: forward P/E of 17.4 with a 14.2% net margin and \
                             6.4% revenue growth. Leverage is moderate at a debt-to-equity of 62.3.",
                "score": 6,
                "justification": "Margins and growth are healthy; valuation and leverage are \
                                  close to sector averages. Generated from scripted data.",
            }))
        });

    ToolGateway::new(config.tool_timeout)
        .with_tool(Arc::new(lookup))
        .with_tool(Arc::new(primary))
        .with_tool(Arc::new(secondary))
        .with_tool(Arc::new(news))
        .with_tool(Arc::new(synthesis))
        .with_tool(Arc::new(
            MarkdownReportTool::new(providers.report_output_dir.clone())
                .with_completion_marker(&config.completion_marker),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutcomeKind;

    fn gateway_with(tool: ScriptedTool) -> ToolGateway {
        ToolGateway::new(Duration::from_secs(5)).with_tool(Arc::new(tool))
    }

    #[test]
    fn test_value_has_content() {
        assert!(!value_has_content(&json!(null)));
        assert!(!value_has_content(&json!({})));
        assert!(!value_has_content(&json!({"metric": {"pe": null, "roe": null}})));
        assert!(!value_has_content(&json!({"name": "  ", "items": []})));
        assert!(value_has_content(&json!({"metric": {"pe": null, "roe": 0.0}})));
        assert!(value_has_content(&json!(false)));
    }

    #[tokio::test]
    async fn test_success_passes_payload_through() {
        let gateway = gateway_with(
            ScriptedTool::new("lookup", "test").then_value(json!({"symbol": "ACM"})),
        );

        let outcome = gateway.invoke_default("lookup", json!({"company": "Acme"})).await;
        assert_eq!(outcome.kind, OutcomeKind::Success);
        assert_eq!(outcome.payload, Some(json!({"symbol": "ACM"})));
    }

    #[tokio::test]
    async fn test_content_free_value_is_empty() {
        let gateway = gateway_with(
            ScriptedTool::new("metrics", "test")
                .requiring("metric")
                .then_value(json!({"metric": {"pe": null}, "series": {"annual": {"eps": [1]}}})),
        );

        let outcome = gateway.invoke_default("metrics", json!({"symbol": "ACM"})).await;
        assert_eq!(outcome.kind, OutcomeKind::Empty);
        assert!(outcome.payload.is_none());
    }

    #[tokio::test]
    async fn test_tool_error_becomes_error_outcome() {
        let gateway = gateway_with(ScriptedTool::new("metrics", "test").then_error("HTTP 502"));

        let outcome = gateway.invoke_default("metrics", json!({})).await;
        assert_eq!(outcome.kind, OutcomeKind::Error);
        assert!(outcome.message.unwrap().contains("HTTP 502"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_error_outcome() {
        let gateway = gateway_with(
            ScriptedTool::new("slow", "test")
                .then_delayed(Duration::from_secs(60), json!({"symbol": "ACM"})),
        );

        let outcome = gateway
            .invoke("slow", json!({}), Duration::from_millis(250))
            .await;
        assert_eq!(outcome.kind, OutcomeKind::Error);
        assert!(outcome.message.unwrap().contains("timed out after 250 ms"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error() {
        let gateway = ToolGateway::new(Duration::from_secs(1));
        let outcome = gateway.invoke_default("missing", json!({})).await;
        assert_eq!(outcome.kind, OutcomeKind::Error);
        assert_eq!(outcome.message.as_deref(), Some("Tool not found: missing"));
    }

    #[test]
    fn test_list_is_sorted() {
        let gateway = ToolGateway::new(Duration::from_secs(1))
            .with_tool(Arc::new(ScriptedTool::new("b_tool", "second")))
            .with_tool(Arc::new(ScriptedTool::new("a_tool", "first")));

        let names: Vec<String> = gateway.list().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["a_tool", "b_tool"]);
    }

    #[test]
    fn test_offline_gateway_registers_every_default_tool() {
        let gateway = create_offline_gateway(&ProviderConfig::default(), &OrchestratorConfig::default());
        let listed: Vec<String> = gateway.list().into_iter().map(|d| d.name).collect();

        for name in [
            names::SEARCH_SYMBOL,
            names::FINNHUB_METRICS,
            names::YAHOO_QUOTE,
            names::NEWSAPI_HEADLINES,
            names::SYNTHESIZE_ANALYSIS,
            names::GENERATE_REPORT,
        ] {
            assert!(listed.iter().any(|n| n == name), "missing {}", name);
        }
    }

    #[test]
    fn test_gemini_endpoint_override_is_applied() {
        let metrics = Arc::new(UsageMetrics::new());
        let providers = ProviderConfig {
            gemini_endpoint: Some("http://localhost:9001/generate".into()),
            ..ProviderConfig::default()
        };
        let client = gemini_client(&providers, metrics.clone()).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9001/generate");

        let client = gemini_client(&ProviderConfig::default(), metrics).unwrap();
        assert_ne!(client.endpoint(), "http://localhost:9001/generate");
    }

    #[test]
    fn test_default_gateway_registers_news() {
        let gateway = create_default_gateway(
            &ProviderConfig::default(),
            &OrchestratorConfig::default(),
            Arc::new(UsageMetrics::new()),
        )
        .unwrap();
        assert!(gateway.list().iter().any(|d| d.name == names::NEWSAPI_HEADLINES));
    }

    #[test]
    fn test_demo_symbol() {
        assert_eq!(demo_symbol("Acme Corp"), "AC");
        assert_eq!(demo_symbol("international business machines corp"), "IBMC");
        assert_eq!(demo_symbol("  "), "DEMO");
    }
}
