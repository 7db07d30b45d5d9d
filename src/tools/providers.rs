//! HTTP-backed data providers
//!
//! Symbol search and the primary metrics table come from Finnhub; the
//! secondary provider is Yahoo Finance's quote summary. Headlines come from
//! NewsAPI when it is configured.

use super::{field_has_content, names, value_has_content, Tool};
use crate::error::OrchestrationError;
use crate::models::{ToolInput, ToolOutput};
use crate::Result;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

/// Years of metric history kept from Finnhub series.
const SERIES_HISTORY_YEARS: i64 = 5;

const YAHOO_MODULES: &str = "price,summaryDetail,financialData,defaultKeyStatistics,assetProfile";

/// Headlines handed to the model per run.
const MAX_NEWS_ARTICLES: usize = 10;

#[derive(Clone)]
pub struct ProviderClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    token_param: &'static str,
}

impl ProviderClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .user_agent(concat!("financial-analysis-orchestrator/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            token_param: "token",
        })
    }

    /// Query parameter carrying the credential. Finnhub uses `token`.
    pub fn with_token_param(mut self, name: &'static str) -> Self {
        self.token_param = name;
        self
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.client.get(url).query(query);
        if let Some(token) = &self.token {
            request = request.query(&[(self.token_param, token.as_str())]);
        }

        let response = request.send().await.map_err(|e| {
            OrchestrationError::ToolError(format!("Provider request failed for {}: {}", path, e))
        })?;

        let status = response.status();
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| OrchestrationError::ToolError(format!("Invalid JSON response: {}", e)))?;

        if !status.is_success() {
            return Err(OrchestrationError::ToolError(format!(
                "Provider returned {} for {}: {}",
                status, path, body
            )));
        }

        Ok(body)
    }
}

fn require_str<'a>(input: &'a ToolInput, key: &str) -> Result<&'a str> {
    input
        .parameters
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            OrchestrationError::InvalidToolInput(format!(
                "Expected '{}' in input for {}",
                key, input.tool_name
            ))
        })
}

//
// ================= Symbol search =================
//

pub struct SymbolSearchTool {
    api: ProviderClient,
}

impl SymbolSearchTool {
    pub fn new(api: ProviderClient) -> Self {
        Self { api }
    }

    async fn search(&self, company: &str) -> Result<Option<Value>> {
        let body = self.api.get_json("/search", &[("q", company)]).await?;
        Ok(first_search_match(&body))
    }
}

/// First `{symbol, description}` entry of a Finnhub search response.
fn first_search_match(body: &Value) -> Option<Value> {
    let first = body.get("result")?.as_array()?.first()?;
    let symbol = first.get("symbol")?.as_str()?.trim();
    if symbol.is_empty() {
        return None;
    }

    Some(json!({
        "symbol": symbol,
        "description": first.get("description").cloned().unwrap_or(Value::Null),
    }))
}

#[async_trait::async_trait]
impl Tool for SymbolSearchTool {
    fn name(&self) -> &str {
        names::SEARCH_SYMBOL
    }

    fn description(&self) -> &str {
        "Resolve a company name to its US ticker symbol via Finnhub search"
    }

    fn has_content(&self, data: &Value) -> bool {
        field_has_content(data, "symbol")
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let company = require_str(input, "company")?;

        let found = match self.search(company).await? {
            Some(found) => Some(found),
            None => {
                debug!(company = %company, "No match; retrying search in upper case");
                self.search(&company.to_uppercase()).await?
            }
        };

        Ok(match found {
            Some(found) => ToolOutput::new(found),
            None => ToolOutput::new(json!({}))
                .with_message(format!("no US listing found for '{}'", company)),
        })
    }
}

//
// ================= Finnhub metrics (primary) =================
//

pub struct FinnhubMetricsTool {
    api: ProviderClient,
}

impl FinnhubMetricsTool {
    pub fn new(api: ProviderClient) -> Self {
        Self { api }
    }
}

/// Keep the `metric` table and drop `series` points older than the
/// history window. Entries without a parseable `period` are kept as-is.
pub fn filter_recent_series(data: &Value, today: NaiveDate) -> Value {
    let since = today - ChronoDuration::days(365 * SERIES_HISTORY_YEARS);
    let in_window = |item: &Value| {
        match item.get("period").and_then(Value::as_str) {
            Some(period) => NaiveDate::parse_from_str(period, "%Y-%m-%d")
                .map(|date| since <= date && date <= today)
                .unwrap_or(false),
            None => true,
        }
    };

    let mut filtered = Map::new();
    if let Some(metric) = data.get("metric") {
        filtered.insert("metric".into(), metric.clone());
    }

    if let Some(series) = data.get("series").and_then(Value::as_object) {
        let mut out_series = Map::new();
        for (frequency, table) in series {
            let Some(table) = table.as_object() else {
                out_series.insert(frequency.clone(), table.clone());
                continue;
            };

            let mut out_table = Map::new();
            for (name, points) in table {
                let kept = match points.as_array() {
                    Some(points) => Value::Array(points.iter().filter(|p| in_window(p)).cloned().collect()),
                    None => points.clone(),
                };
                out_table.insert(name.clone(), kept);
            }
            out_series.insert(frequency.clone(), Value::Object(out_table));
        }
        filtered.insert("series".into(), Value::Object(out_series));
    }

    Value::Object(filtered)
}

#[async_trait::async_trait]
impl Tool for FinnhubMetricsTool {
    fn name(&self) -> &str {
        names::FINNHUB_METRICS
    }

    fn description(&self) -> &str {
        "Fetch the Finnhub basic-financials metric table for a symbol"
    }

    fn has_content(&self, data: &Value) -> bool {
        field_has_content(data, "metric")
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let symbol = require_str(input, "symbol")?;
        let body = self
            .api
            .get_json("/stock/metric", &[("symbol", symbol), ("metric", "all")])
            .await?;

        Ok(ToolOutput::new(filter_recent_series(&body, Utc::now().date_naive())))
    }
}

//
// ================= Yahoo quote summary (secondary) =================
//

pub struct YahooQuoteTool {
    api: ProviderClient,
}

impl YahooQuoteTool {
    pub fn new(api: ProviderClient) -> Self {
        Self { api }
    }
}

/// (output key, quoteSummary module, field)
const YAHOO_FIELDS: &[(&str, &str, &str)] = &[
    ("company_name", "price", "longName"),
    ("sector", "assetProfile", "sector"),
    ("industry", "assetProfile", "industry"),
    ("market_cap", "price", "marketCap"),
    ("current_price", "financialData", "currentPrice"),
    ("pe_ratio", "summaryDetail", "forwardPE"),
    ("dividend_yield", "summaryDetail", "dividendYield"),
    ("beta", "summaryDetail", "beta"),
    ("fifty_two_week_high", "summaryDetail", "fiftyTwoWeekHigh"),
    ("fifty_two_week_low", "summaryDetail", "fiftyTwoWeekLow"),
    ("volume", "summaryDetail", "volume"),
    ("avg_volume", "summaryDetail", "averageVolume"),
    ("price_to_book", "defaultKeyStatistics", "priceToBook"),
    ("debt_to_equity", "financialData", "debtToEquity"),
    ("return_on_equity", "financialData", "returnOnEquity"),
    ("return_on_assets", "financialData", "returnOnAssets"),
    ("profit_margin", "financialData", "profitMargins"),
    ("operating_margin", "financialData", "operatingMargins"),
    ("earnings_growth", "financialData", "earningsGrowth"),
    ("revenue_growth", "financialData", "revenueGrowth"),
];

/// Yahoo wraps numbers as `{"raw": 1.2, "fmt": "1.20"}`; unwrap to `raw`.
fn yahoo_value(value: &Value) -> Value {
    match value {
        Value::Object(map) if map.contains_key("raw") => map["raw"].clone(),
        Value::Object(map) if map.is_empty() => Value::Null,
        other => other.clone(),
    }
}

/// Flatten a quoteSummary response into a single object keyed by
/// `YAHOO_FIELDS`. Missing fields become `null`.
pub fn flatten_quote_summary(symbol: &str, body: &Value) -> Value {
    let result = body
        .pointer("/quoteSummary/result/0")
        .cloned()
        .unwrap_or(Value::Null);

    let mut flat = Map::new();
    flat.insert("symbol".into(), json!(symbol));
    for (key, module, field) in YAHOO_FIELDS {
        let value = result
            .get(*module)
            .and_then(|m| m.get(*field))
            .map(yahoo_value)
            .unwrap_or(Value::Null);
        flat.insert((*key).to_string(), value);
    }

    Value::Object(flat)
}

#[async_trait::async_trait]
impl Tool for YahooQuoteTool {
    fn name(&self) -> &str {
        names::YAHOO_QUOTE
    }

    fn description(&self) -> &str {
        "Fetch price, valuation and profitability fields from Yahoo Finance"
    }

    /// `symbol` is echoed back, so it does not count as content.
    fn has_content(&self, data: &Value) -> bool {
        data.as_object().is_some_and(|map| {
            map.iter()
                .any(|(key, value)| key != "symbol" && value_has_content(value))
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let symbol = require_str(input, "symbol")?;
        let path = format!("/v10/finance/quoteSummary/{}", symbol);
        let body = self.api.get_json(&path, &[("modules", YAHOO_MODULES)]).await?;

        Ok(ToolOutput::new(flatten_quote_summary(symbol, &body)))
    }
}

//
// ================= NewsAPI headlines (optional) =================
//

pub struct NewsApiTool {
    api: ProviderClient,
    configured: bool,
}

impl NewsApiTool {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let configured = api_key.is_some();
        let api = ProviderClient::new(base_url, api_key)?.with_token_param("apiKey");
        Ok(Self { api, configured })
    }
}

/// Reduce a NewsAPI `everything` response to the newest headlines.
/// Articles without a title are dropped.
pub fn filter_news_articles(body: &Value) -> Value {
    let articles: Vec<Value> = body
        .get("articles")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|a| {
                    a.get("title")
                        .and_then(Value::as_str)
                        .is_some_and(|t| !t.trim().is_empty())
                })
                .take(MAX_NEWS_ARTICLES)
                .map(|a| {
                    json!({
                        "title": a.get("title").cloned().unwrap_or(Value::Null),
                        "description": a.get("description").cloned().unwrap_or(Value::Null),
                        "url": a.get("url").cloned().unwrap_or(Value::Null),
                        "source": a.pointer("/source/name").cloned().unwrap_or(Value::Null),
                        "published_at": a.get("publishedAt").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    json!({ "articles": articles })
}

#[async_trait::async_trait]
impl Tool for NewsApiTool {
    fn name(&self) -> &str {
        names::NEWSAPI_HEADLINES
    }

    fn description(&self) -> &str {
        "Fetch recent news headlines mentioning a company from NewsAPI"
    }

    fn has_content(&self, data: &Value) -> bool {
        field_has_content(data, "articles")
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        if !self.configured {
            return Err(OrchestrationError::ToolError(
                "NEWSAPI_API_KEY is not configured".to_string(),
            ));
        }

        let company = require_str(input, "company")?;
        let body = self
            .api
            .get_json(
                "/everything",
                &[("q", company), ("sortBy", "publishedAt"), ("pageSize", "20")],
            )
            .await?;

        Ok(ToolOutput::new(filter_news_articles(&body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_search_match() {
        let body = json!({
            "count": 2,
            "result": [
                {"symbol": "ACM", "description": "ACME CORP"},
                {"symbol": "ACM.DE", "description": "ACME CORP (XETRA)"}
            ]
        });
        assert_eq!(
            first_search_match(&body),
            Some(json!({"symbol": "ACM", "description": "ACME CORP"}))
        );
        assert_eq!(first_search_match(&json!({"count": 0, "result": []})), None);
    }

    #[test]
    fn test_filter_recent_series_trims_old_points() {
        let today = NaiveDate::from_ymd_opt(2026, 6, 30).unwrap();
        let data = json!({
            "metric": {"roeTTM": 18.2},
            "symbol": "ACM",
            "series": {
                "annual": {
                    "eps": [
                        {"period": "2025-12-31", "v": 4.1},
                        {"period": "2018-12-31", "v": 2.0},
                        {"period": "not-a-date", "v": 0.0}
                    ]
                }
            }
        });

        let filtered = filter_recent_series(&data, today);
        assert_eq!(filtered["metric"], json!({"roeTTM": 18.2}));
        assert!(filtered.get("symbol").is_none());
        assert_eq!(
            filtered["series"]["annual"]["eps"],
            json!([{"period": "2025-12-31", "v": 4.1}])
        );
    }

    #[test]
    fn test_flatten_quote_summary() {
        let body = json!({
            "quoteSummary": {
                "result": [{
                    "price": {"longName": "Acme Corp", "marketCap": {"raw": 1.5e9, "fmt": "1.5B"}},
                    "summaryDetail": {"forwardPE": {"raw": 14.2}, "beta": {}},
                    "financialData": {"profitMargins": {"raw": 0.12}}
                }]
            }
        });

        let flat = flatten_quote_summary("ACM", &body);
        assert_eq!(flat["symbol"], json!("ACM"));
        assert_eq!(flat["company_name"], json!("Acme Corp"));
        assert_eq!(flat["pe_ratio"], json!(14.2));
        assert_eq!(flat["beta"], Value::Null);
        assert_eq!(flat["sector"], Value::Null);

        let tool = YahooQuoteTool::new(ProviderClient::new("http://localhost", None).unwrap());
        assert!(tool.has_content(&flat));
        assert!(!tool.has_content(&flatten_quote_summary("ACM", &json!({}))));
    }

    #[test]
    fn test_filter_news_articles() {
        let body = json!({
            "status": "ok",
            "totalResults": 3,
            "articles": [
                {
                    "source": {"id": null, "name": "Wire"},
                    "title": "Acme opens new plant",
                    "description": "Capacity doubles.",
                    "url": "https://example.com/acme",
                    "publishedAt": "2026-10-01T08:00:00Z",
                    "content": "long body"
                },
                {"source": {"name": "Blog"}, "title": "  "},
                {"title": "Acme beats estimates"}
            ]
        });

        let filtered = filter_news_articles(&body);
        let articles = filtered["articles"].as_array().unwrap();
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0]["source"], json!("Wire"));
        assert_eq!(articles[0]["published_at"], json!("2026-10-01T08:00:00Z"));
        assert!(articles[0].get("content").is_none());
        assert_eq!(articles[1]["source"], Value::Null);

        let tool = NewsApiTool::new("http://localhost", Some("key".into())).unwrap();
        assert!(tool.has_content(&filtered));
        assert!(!tool.has_content(&filter_news_articles(&json!({"status": "ok"}))));
    }

    #[tokio::test]
    async fn test_news_without_key_is_tool_error() {
        let tool = NewsApiTool::new("http://localhost", None).unwrap();
        let input = ToolInput {
            tool_name: names::NEWSAPI_HEADLINES.to_string(),
            parameters: json!({"company": "Acme Corp"}),
        };

        let err = tool.execute(&input).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::ToolError(_)));
    }
}
