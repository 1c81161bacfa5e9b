use std::sync::Arc;

use anyhow::{Context, Result};
use apply_agent::brain::{Brain, GeminiAgent, OllamaAgent, OpenAiAgent, ReasoningAgent};
use apply_agent::config::{AgentBackend, Config};
use apply_agent::face;
use apply_agent::hands::ChromeBrowser;
use apply_agent::jobs::JobTracker;
use apply_agent::orchestrator::Orchestrator;
use apply_agent::user_data::HttpUserData;
use clap::Parser;
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let config = Config::parse();
    config.validate()?;

    let agent = build_agent(&config)?;
    info!(backend = ?config.agent_backend, "reasoning agent ready");

    let user_data = HttpUserData::new(&config.user_data_url)?;
    let browser = ChromeBrowser::new(config.browser_settings());
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(browser),
        Brain::new(agent),
        Arc::new(user_data),
        Arc::new(JobTracker::new()),
        config.run_settings(),
    ));

    let (listener, port) = face::bind(&config.host, config.port).await?;
    info!("API server listening on http://{}:{}", config.host, port);

    axum::serve(listener, face::router(Arc::clone(&orchestrator)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("shutting down browser");
    orchestrator.shutdown().await;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

fn build_agent(config: &Config) -> Result<Arc<dyn ReasoningAgent>> {
    let timeout = config.agent_timeout();
    let agent: Arc<dyn ReasoningAgent> = match config.agent_backend {
        AgentBackend::Gemini => {
            let key = config
                .gemini_api_key
                .as_deref()
                .context("GEMINI_API_KEY not set")?;
            Arc::new(GeminiAgent::new(
                &config.gemini_base_url,
                &config.gemini_model,
                key,
                timeout,
            )?)
        }
        AgentBackend::Ollama => Arc::new(OllamaAgent::new(
            &config.ollama_url,
            &config.ollama_model,
            timeout,
        )?),
        AgentBackend::Openai => {
            let key = config
                .openai_api_key
                .as_deref()
                .context("OPENAI_API_KEY not set")?;
            Arc::new(OpenAiAgent::new(
                &config.openai_base_url,
                &config.openai_model,
                key,
                timeout,
            )?)
        }
    };
    Ok(agent)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
    info!("ctrl-c received");
}
