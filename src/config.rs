//! Runtime configuration
//!
//! Values come from the environment (binaries load `.env` first). Lookups go
//! through a closure so tests never touch the process environment.

use crate::completion::DEFAULT_COMPLETION_MARKER;
use crate::error::OrchestrationError;
use crate::router::{DEFAULT_REPORT_ATTEMPTS, DEFAULT_SYNTHESIS_ATTEMPTS};
use crate::Result;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MAX_STEPS: u32 = 12;
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

const DEFAULT_FINNHUB_BASE_URL: &str = "https://finnhub.io/api/v1";
const DEFAULT_YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";
const DEFAULT_NEWSAPI_BASE_URL: &str = "https://newsapi.org/v2";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_steps: u32,
    pub tool_timeout: Duration,
    pub synthesis_attempts: u32,
    pub report_attempts: u32,
    pub completion_marker: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
            synthesis_attempts: DEFAULT_SYNTHESIS_ATTEMPTS,
            report_attempts: DEFAULT_REPORT_ATTEMPTS,
            completion_marker: DEFAULT_COMPLETION_MARKER.to_string(),
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse::<T>().map_err(|e| {
            OrchestrationError::ConfigError(format!("{}={:?}: {}", key, raw, e))
        }),
        _ => Ok(default),
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_steps = parse_var(&lookup, "ORCHESTRATOR_MAX_STEPS", defaults.max_steps)?;
        let timeout_secs = parse_var(&lookup, "TOOL_TIMEOUT_SECS", DEFAULT_TOOL_TIMEOUT_SECS)?;
        let synthesis_attempts =
            parse_var(&lookup, "SYNTHESIS_MAX_ATTEMPTS", defaults.synthesis_attempts)?;
        let report_attempts = parse_var(&lookup, "REPORT_MAX_ATTEMPTS", defaults.report_attempts)?;

        if timeout_secs == 0 {
            return Err(OrchestrationError::ConfigError(
                "TOOL_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            max_steps,
            tool_timeout: Duration::from_secs(timeout_secs),
            synthesis_attempts: synthesis_attempts.max(1),
            report_attempts: report_attempts.max(1),
            completion_marker: non_empty(&lookup, "COMPLETION_MARKER")
                .unwrap_or(defaults.completion_marker),
        })
    }
}

/// Endpoints and credentials for the external collaborators.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub finnhub_api_key: Option<String>,
    pub finnhub_base_url: String,
    pub yahoo_base_url: String,
    pub gemini_api_key: Option<String>,
    /// Overrides the default `generateContent` endpoint.
    pub gemini_endpoint: Option<String>,
    /// Enables the optional news capability when set.
    pub news_api_key: Option<String>,
    pub news_base_url: String,
    pub report_output_dir: PathBuf,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            finnhub_api_key: None,
            finnhub_base_url: DEFAULT_FINNHUB_BASE_URL.to_string(),
            yahoo_base_url: DEFAULT_YAHOO_BASE_URL.to_string(),
            gemini_api_key: None,
            gemini_endpoint: None,
            news_api_key: None,
            news_base_url: DEFAULT_NEWSAPI_BASE_URL.to_string(),
            report_output_dir: PathBuf::from("reports"),
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            finnhub_api_key: non_empty(&lookup, "FINNHUB_API_KEY"),
            finnhub_base_url: non_empty(&lookup, "FINNHUB_BASE_URL")
                .unwrap_or(defaults.finnhub_base_url),
            yahoo_base_url: non_empty(&lookup, "YAHOO_BASE_URL").unwrap_or(defaults.yahoo_base_url),
            gemini_api_key: non_empty(&lookup, "GEMINI_API_KEY"),
            gemini_endpoint: non_empty(&lookup, "GEMINI_ENDPOINT"),
            news_api_key: non_empty(&lookup, "NEWSAPI_API_KEY"),
            news_base_url: non_empty(&lookup, "NEWSAPI_BASE_URL").unwrap_or(defaults.news_base_url),
            report_output_dir: non_empty(&lookup, "REPORT_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.report_output_dir),
        }
    }

    /// Both the data provider and the model have credentials.
    pub fn is_online(&self) -> bool {
        self.finnhub_api_key.is_some() && self.gemini_api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = OrchestratorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.max_steps, DEFAULT_MAX_STEPS);
        assert_eq!(config.tool_timeout, Duration::from_secs(30));
        assert_eq!(config.completion_marker, DEFAULT_COMPLETION_MARKER);
    }

    #[test]
    fn test_overrides_and_clamping() {
        let config = OrchestratorConfig::from_lookup(lookup(&[
            ("ORCHESTRATOR_MAX_STEPS", "20"),
            ("TOOL_TIMEOUT_SECS", " 5 "),
            ("SYNTHESIS_MAX_ATTEMPTS", "0"),
            ("COMPLETION_MARKER", "análisis financiero completado"),
        ]))
        .unwrap();

        assert_eq!(config.max_steps, 20);
        assert_eq!(config.tool_timeout, Duration::from_secs(5));
        assert_eq!(config.synthesis_attempts, 1);
        assert_eq!(config.completion_marker, "análisis financiero completado");
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = OrchestratorConfig::from_lookup(lookup(&[("ORCHESTRATOR_MAX_STEPS", "many")]))
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::ConfigError(_)));

        let err = OrchestratorConfig::from_lookup(lookup(&[("TOOL_TIMEOUT_SECS", "0")])).unwrap_err();
        assert!(matches!(err, OrchestrationError::ConfigError(_)));
    }

    #[test]
    fn test_provider_config() {
        let config = ProviderConfig::from_lookup(lookup(&[
            ("FINNHUB_API_KEY", "abc"),
            ("GEMINI_API_KEY", " "),
            ("REPORT_OUTPUT_DIR", "/tmp/reports"),
        ]));

        assert_eq!(config.finnhub_api_key.as_deref(), Some("abc"));
        assert!(config.gemini_api_key.is_none());
        assert!(!config.is_online());
        assert_eq!(config.report_output_dir, PathBuf::from("/tmp/reports"));
        assert_eq!(config.finnhub_base_url, DEFAULT_FINNHUB_BASE_URL);
        assert!(config.news_api_key.is_none());
        assert_eq!(config.news_base_url, DEFAULT_NEWSAPI_BASE_URL);
    }

    #[test]
    fn test_news_and_model_endpoint_overrides() {
        let config = ProviderConfig::from_lookup(lookup(&[
            ("NEWSAPI_API_KEY", "news-key"),
            ("NEWSAPI_BASE_URL", "http://localhost:9000/v2"),
            ("GEMINI_ENDPOINT", "http://localhost:9001/generate"),
        ]));

        assert_eq!(config.news_api_key.as_deref(), Some("news-key"));
        assert_eq!(config.news_base_url, "http://localhost:9000/v2");
        assert_eq!(config.gemini_endpoint.as_deref(), Some("http://localhost:9001/generate"));
    }
}
