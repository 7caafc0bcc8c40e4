//! CortexLuma server
//!
//! Entry point for the chat application.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cortexluma::config::{AppConfig, load_llm_settings};
use cortexluma::server::start_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    // Initialize tracing (M-LOG-STRUCTURED)
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Arc::new(AppConfig::load().context("Failed to load configuration")?);

    let settings = load_llm_settings()
        .map_err(anyhow::Error::msg)
        .context("Invalid LLM configuration")?;

    if settings.api_key.is_none() {
        tracing::error!(
            name: "llm.credential.missing",
            "API key is not configured; set GEMINI_API_KEY. Every message will fail until it is provided."
        );
    }

    start_server(config, settings).await
}
