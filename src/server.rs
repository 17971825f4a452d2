use std::sync::Arc;

use axum::{
    Json, Router,
    routing::{get, post},
};
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use crate::deals::DealsService;
use crate::dispatch::{ActionRegistry, handle_action};
use crate::tools::MelonDeals;

#[derive(Clone)]
pub struct AppState {
    pub deals: Arc<DealsService>,
    pub actions: Arc<ActionRegistry>,
}

/// Routes:
/// - `/mcp`: MCP over Streamable HTTP (POST requests, SSE responses)
/// - `POST /action`: action envelope dispatch
/// - `GET /health`
pub fn build_app(deals: Arc<DealsService>, actions: ActionRegistry) -> Router {
    let mcp_handler = MelonDeals::new(Arc::clone(&deals));
    let mcp = StreamableHttpService::new(
        move || Ok(mcp_handler.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    Router::new()
        .route("/health", get(health))
        .route("/action", post(handle_action))
        .nest_service("/mcp", mcp)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState {
            deals,
            actions: Arc::new(actions),
        })
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
