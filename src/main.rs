mod cache;
mod config;
mod deals;
mod dispatch;
mod fetch;
mod gemini;
mod server;
mod tools;

pub const USER_AGENT: &str = concat!("melon-deals/", env!("CARGO_PKG_VERSION"), " (MCP Server)");

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use reqwest::Client;
use rmcp::{ServiceExt, transport::stdio};
use tracing::{error, info};

use cache::ResponseCache;
use config::{Cli, Transport};
use deals::DealsService;
use dispatch::ActionRegistry;
use gemini::client::GeminiClient;
use tools::MelonDeals;

/// TCP connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default timeout for page and image downloads. Gemini calls override it.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Maximum redirect hops before aborting.
const MAX_REDIRECTS: usize = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("melon_deals=info".parse()?),
        )
        .init();

    info!("starting melon-deals");

    let http = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(HTTP_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()?;
    let gemini = GeminiClient::from_env(http.clone())
        .inspect_err(|e| error!("Gemini client not available: {e}"))
        .ok();
    let deals = Arc::new(DealsService::new(
        http,
        gemini,
        ResponseCache::new(cli.cache_file.clone()),
        cli.deals_config(),
    ));

    match cli.transport {
        Transport::Stdio => {
            let service = MelonDeals::new(deals)
                .serve(stdio())
                .await
                .inspect_err(|e| error!("failed to start server: {e}"))?;
            service.waiting().await?;
        }
        Transport::Http => {
            let app = server::build_app(deals, ActionRegistry::with_default_actions());
            let listener = tokio::net::TcpListener::bind(cli.bind).await?;
            info!(addr = %cli.bind, "listening (MCP at /mcp, actions at /action)");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal, starting graceful shutdown");
}
