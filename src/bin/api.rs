use financial_analysis_orchestrator::{
    agent::Orchestrator,
    api::start_server,
    config::{OrchestratorConfig, ProviderConfig},
    fallback::{create_default_resolver, news_plan},
    metrics::UsageMetrics,
    tools::{create_default_gateway, create_offline_gateway},
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("Financial Analysis Orchestrator - API Server");
    info!("Port: {}", api_port);

    let config = OrchestratorConfig::from_env()?;
    let providers = ProviderConfig::from_env();
    let metrics = Arc::new(UsageMetrics::new());

    let gateway = if providers.is_online() {
        create_default_gateway(&providers, &config, metrics)?
    } else {
        warn!("FINNHUB_API_KEY or GEMINI_API_KEY not set; serving offline scripted providers");
        create_offline_gateway(&providers, &config)
    };

    let mut resolver = create_default_resolver();
    if !providers.is_online() || providers.news_api_key.is_some() {
        resolver = resolver.with_plan(news_plan());
    }

    let orchestrator = Arc::new(Orchestrator::new(gateway, Arc::new(resolver), config));

    info!("Orchestrator initialized");

    start_server(orchestrator, api_port).await?;

    Ok(())
}
