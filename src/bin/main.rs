use financial_analysis_orchestrator::{
    agent::Orchestrator,
    config::{OrchestratorConfig, ProviderConfig},
    fallback::{create_default_resolver, news_plan},
    metrics::UsageMetrics,
    models::RunStatus,
    tools::{create_default_gateway, create_offline_gateway},
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Flat Gemini price used for the cost estimate, USD per 1k tokens.
const PRICE_PER_1K_TOKENS: f64 = 0.0004;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let company = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if company.trim().is_empty() {
        eprintln!("usage: orchestrator <company name>");
        std::process::exit(2);
    }

    let config = OrchestratorConfig::from_env()?;
    let providers = ProviderConfig::from_env();
    let metrics = Arc::new(UsageMetrics::new());

    let gateway = if providers.is_online() {
        create_default_gateway(&providers, &config, metrics.clone())?
    } else {
        warn!("FINNHUB_API_KEY or GEMINI_API_KEY not set; using offline scripted providers");
        create_offline_gateway(&providers, &config)
    };

    info!(company = %company.trim(), "Financial Analysis Orchestrator starting");

    let mut resolver = create_default_resolver();
    if !providers.is_online() || providers.news_api_key.is_some() {
        resolver = resolver.with_plan(news_plan());
    }

    let orchestrator = Orchestrator::new(gateway, Arc::new(resolver), config);
    let report = orchestrator.run(company.trim()).await;

    println!("{}", serde_json::to_string_pretty(&report)?);

    let usage = metrics.snapshot();
    println!("\n=== TOKEN USAGE ===");
    println!("Calls: {}", usage.calls);
    println!(
        "Tokens: {} prompt + {} completion = {}",
        usage.prompt_tokens,
        usage.completion_tokens,
        usage.total_tokens()
    );
    println!(
        "Estimated cost: ${:.5}",
        usage.estimated_cost(PRICE_PER_1K_TOKENS)
    );

    if report.status != RunStatus::Completed {
        std::process::exit(1);
    }

    Ok(())
}
