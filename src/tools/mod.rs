use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use tracing::info;

use crate::deals::DealsService;

/// MCP server handler exposing today's Big Watermelon specials as a tool.
///
/// Configuration via environment variables:
/// - `GEMINI_API_KEY`: required for extraction; without it the tool returns
///   an empty offer list
/// - `GEMINI_MODEL`: overrides the extraction model (optional)
#[derive(Clone)]
pub struct MelonDeals {
    deals: Arc<DealsService>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl MelonDeals {
    pub fn new(deals: Arc<DealsService>) -> Self {
        Self {
            deals,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "get-big-watermelon-deals",
        description = "Get today's deals from Big Watermelon. Returns JSON with the store location and a list of offers (productName, price, currency, size), refreshed once per day from the store's specials page."
    )]
    async fn get_deals(&self) -> Result<CallToolResult, McpError> {
        info!("tool:get-big-watermelon-deals");

        let data = self.deals.todays_deals().await;
        let output =
            serde_json::to_string(&data).map_err(|e| McpError::internal_error(e.to_string(), None))?;

        info!(offers = data.offers.len(), "get-big-watermelon-deals complete");
        Ok(CallToolResult::success(vec![Content::text(output)]))
    }
}

#[tool_handler]
impl ServerHandler for MelonDeals {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "melon-deals".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(
                "melon-deals reports today's Big Watermelon (Wantirna South, VIC) specials, extracted from the store's promotional images."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
