//! Zyvora server binary: load configuration, wire the Gemini provider into
//! the router, serve until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use zyvora::config::Config;
use zyvora::handlers::{AppState, build_router};
use zyvora::llm::{AiClient, GeminiProvider};
use zyvora::server::Server;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("zyvora=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = match Config::load() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return Err(e).context("failed to load configuration");
        }
    };

    let provider = GeminiProvider::from_config(&config).context("failed to create Gemini provider")?;
    let ai = AiClient::new(Arc::new(provider));
    info!(
        provider = ai.provider_name(),
        search = config.search.is_some(),
        text_path = %config.text_path,
        voice_path = %config.voice_path,
        "starting zyvora"
    );

    let state = Arc::new(AppState::new(Arc::clone(&config), ai));
    let router = Arc::new(build_router(state));

    let server = Server::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?
        .with_max_request_size(config.max_request_bytes);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    server
        .run_until(
            move |request| {
                let router = Arc::clone(&router);
                async move { router.route(request).await }
            },
            shutdown,
        )
        .await?;

    info!("zyvora stopped");
    Ok(())
}
