//! REST API for the action gateway
//!
//! Front-end A (chat, free text) and front-end B (structured tool calls)
//! share one response envelope.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::classifier::EXAMPLE_PROMPTS;
use crate::error::ErrorKind;
use crate::gateway::ActionGateway;
use crate::models::{GatewayRequest, GatewayResponse, Origin, Parameters};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ToolInvokeRequest {
    pub action_id: String,
    #[serde(default)]
    pub parameters: Parameters,
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub gateway: ActionGateway,
}

/// =============================
/// Helpers
/// =============================

fn status_for(response: &GatewayResponse) -> StatusCode {
    match response.error_kind {
        None if response.success => StatusCode::OK,
        None => StatusCode::INTERNAL_SERVER_ERROR,
        Some(ErrorKind::UnrecognizedInput) | Some(ErrorKind::AuditWriteFailure) => StatusCode::OK,
        Some(ErrorKind::UnknownAction) => StatusCode::NOT_FOUND,
        Some(ErrorKind::PermissionDenied) => StatusCode::FORBIDDEN,
        Some(ErrorKind::ValidationFailed) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(ErrorKind::DownstreamTimeout) => StatusCode::GATEWAY_TIMEOUT,
        Some(ErrorKind::DownstreamError) => StatusCode::BAD_GATEWAY,
    }
}

fn respond(response: GatewayResponse) -> (StatusCode, Json<GatewayResponse>) {
    (status_for(&response), Json(response))
}

/// A `metadata.action` override turns a chat message into a structured call.
fn chat_to_request(req: ChatRequest) -> GatewayRequest {
    let override_action = req
        .metadata
        .as_ref()
        .and_then(|m| m.get("action"))
        .and_then(Value::as_str)
        .map(str::to_string);

    match override_action {
        Some(action_id) => {
            let parameters = req
                .metadata
                .as_ref()
                .and_then(|m| m.get("params"))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            GatewayRequest::ToolCall {
                action_id,
                parameters,
                origin: Origin::Chat,
            }
        }
        None => GatewayRequest::free_text(req.message),
    }
}

/// =============================
/// Endpoints
/// =============================

async fn health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "writes_enabled": state.gateway.writes_enabled(),
        "audit_write_failures": state.gateway.audit_failures(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn examples() -> Json<Value> {
    let examples: Vec<Value> = EXAMPLE_PROMPTS
        .iter()
        .map(|(prompt, description)| json!({ "prompt": prompt, "description": description }))
        .collect();
    Json(json!({ "examples": examples }))
}

async fn list_tools(State(state): State<ApiState>) -> Json<Value> {
    let catalog = state.gateway.catalog();
    let tools: Vec<Value> = catalog
        .specs()
        .iter()
        .map(|spec| {
            json!({
                "action_id": spec.action,
                "permission": spec.permission,
                "description": spec.description,
                "fields": spec.fields,
                "enabled": spec.permission == crate::models::PermissionClass::Read
                    || catalog.writes_enabled(),
            })
        })
        .collect();
    Json(json!({ "tools": tools }))
}

async fn chat(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<GatewayResponse>) {
    info!(message_len = req.message.chars().count(), "Received chat request");
    respond(state.gateway.handle(chat_to_request(req)).await)
}

async fn invoke_tool(
    State(state): State<ApiState>,
    Json(req): Json<ToolInvokeRequest>,
) -> (StatusCode, Json<GatewayResponse>) {
    info!(action_id = %req.action_id, "Received tool call");
    respond(
        state
            .gateway
            .handle_tool_call(req.action_id, req.parameters)
            .await,
    )
}

/// =============================
/// Router
/// =============================

pub fn create_router(gateway: ActionGateway) -> Router {
    let state = ApiState { gateway };

    Router::new()
        .route("/health", get(health))
        .route("/assistant/examples", get(examples))
        .route("/assistant/chat", post(chat))
        .route("/tools", get(list_tools))
        .route("/tools/invoke", post(invoke_tool))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    gateway: ActionGateway,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(gateway);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("Gateway API listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
