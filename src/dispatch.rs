//! Action-keyed JSON envelope endpoint: `{action, parameters, request_id}` in,
//! `{status, data | error, request_id}` out.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::deals::DealsService;
use crate::server::AppState;

pub const DEALS_ACTION: &str = "get-big-watermelon-deals";
const DEALS_ACTION_ALIAS: &str = "get_daily_deals";

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub request_id: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub request_id: String,
}

impl ActionResponse {
    pub fn success(request_id: String, data: Value) -> Self {
        Self {
            status: Status::Success,
            data: Some(data),
            error: None,
            request_id,
        }
    }

    pub fn error(request_id: String, message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            data: None,
            error: Some(message.into()),
            request_id,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("action failed: {0}")]
    Handler(String),
}

impl DispatchError {
    fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::UnknownAction(_) | DispatchError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            DispatchError::Handler(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

type ActionHandler =
    Box<dyn Fn(Arc<DealsService>, Value) -> BoxFuture<'static, Result<Value, DispatchError>> + Send + Sync>;

/// Maps action names to handlers. Lookup is the only routing.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, ActionHandler>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_actions() -> Self {
        let mut registry = Self::new();
        registry.register(DEALS_ACTION, get_deals);
        registry.register(DEALS_ACTION_ALIAS, get_deals);
        registry
    }

    pub fn register<F, Fut>(&mut self, action: &str, handler: F)
    where
        F: Fn(Arc<DealsService>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, DispatchError>> + Send + 'static,
    {
        self.handlers.insert(
            action.to_string(),
            Box::new(move |deals: Arc<DealsService>, params: Value| {
                handler(deals, params).boxed()
            }),
        );
    }

    pub async fn dispatch(
        &self,
        deals: Arc<DealsService>,
        request: ActionRequest,
    ) -> Result<Value, DispatchError> {
        let handler = self
            .handlers
            .get(&request.action)
            .ok_or_else(|| DispatchError::UnknownAction(request.action.clone()))?;
        handler(deals, request.parameters).await
    }
}

async fn get_deals(deals: Arc<DealsService>, _params: Value) -> Result<Value, DispatchError> {
    let data = deals.todays_deals().await;
    serde_json::to_value(data).map_err(|e| DispatchError::Handler(e.to_string()))
}

/// `POST /action`
pub async fn handle_action(State(state): State<AppState>, body: Bytes) -> Response {
    let request: ActionRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let err = DispatchError::InvalidRequest(e.to_string());
            warn!(error = %err, "rejected action request");
            return envelope(err.status_code(), ActionResponse::error(String::new(), err.to_string()));
        }
    };

    info!(action = %request.action, request_id = %request.request_id, "action:dispatch");
    let request_id = request.request_id.clone();

    match state.actions.dispatch(Arc::clone(&state.deals), request).await {
        Ok(data) => envelope(StatusCode::OK, ActionResponse::success(request_id, data)),
        Err(err) => {
            warn!(error = %err, request_id = %request_id, "action failed");
            envelope(err.status_code(), ActionResponse::error(request_id, err.to_string()))
        }
    }
}

fn envelope(status: StatusCode, body: ActionResponse) -> Response {
    (status, Json(body)).into_response()
}
