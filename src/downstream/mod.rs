//! Downstream collaborator
//!
//! The reconciliation data service that actually performs each action.
//! The gateway only routes validated parameters to it and passes the payload
//! back untouched.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::error::GatewayError;
use crate::models::{Action, DownstreamErrorKind, FieldViolation, Parameters};
use crate::Result;

/// Executes a validated action.
#[async_trait]
pub trait Downstream: Send + Sync {
    async fn call(&self, action: Action, parameters: &Parameters) -> Result<Value>;
}

/// HTTP shape of one action against the reconciliation API.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl Route {
    fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::DELETE,
            path: path.into(),
            body: None,
        }
    }

    fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
        }
    }
}

fn session_id(parameters: &Parameters) -> Result<i64> {
    parameters
        .get("session_id")
        .and_then(Value::as_i64)
        .ok_or_else(|| {
            GatewayError::ValidationFailed(vec![FieldViolation::new("session_id", "is required")])
        })
}

/// Map an action and its validated parameters onto the API.
pub fn route(action: Action, parameters: &Parameters) -> Result<Route> {
    let route = match action {
        Action::Health => Route::get("/health"),
        Action::ListSessions => Route::get("/api/v1/sessions"),
        Action::GetSession => Route::get(format!("/api/v1/sessions/{}", session_id(parameters)?)),
        Action::ListTransactions => Route::get(format!(
            "/api/v1/transactions/session/{}",
            session_id(parameters)?
        )),
        Action::RunReconciliation => Route::get(format!(
            "/api/v1/reconciliation/analyse/{}",
            session_id(parameters)?
        )),
        Action::GetDiscrepancies => Route::get(format!(
            "/api/v1/reconciliation/discrepancies/{}",
            session_id(parameters)?
        )),
        Action::GetSummary => Route::get(format!(
            "/api/v1/reconciliation/summary/{}",
            session_id(parameters)?
        )),
        Action::CreateSession => Route::post("/api/v1/sessions", Value::Object(parameters.clone())),
        Action::BulkUploadTransactions => {
            Route::post("/api/v1/transactions/bulk", Value::Object(parameters.clone()))
        }
        Action::DeleteSession => {
            Route::delete(format!("/api/v1/sessions/{}", session_id(parameters)?))
        }
        Action::ClearTransactions => Route::delete(format!(
            "/api/v1/transactions/session/{}",
            session_id(parameters)?
        )),
    };
    Ok(route)
}

/// Error kind for a non-success HTTP status.
pub fn classify_status(status: StatusCode) -> DownstreamErrorKind {
    match status {
        StatusCode::NOT_FOUND => DownstreamErrorKind::NotFound,
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            DownstreamErrorKind::InvalidState
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => DownstreamErrorKind::Timeout,
        _ => DownstreamErrorKind::Unavailable,
    }
}

/// Prefer the API's `detail` field; fall back to the raw body.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").map(|d| match d {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }))
        .unwrap_or_else(|| body.trim().to_string())
}

fn transport_error(path: &str, e: reqwest::Error) -> GatewayError {
    let kind = if e.is_timeout() {
        DownstreamErrorKind::Timeout
    } else {
        DownstreamErrorKind::Unavailable
    };
    GatewayError::DownstreamError {
        kind,
        message: format!("request to {} failed: {}", path, e),
    }
}

/// reqwest-backed client for the reconciliation API.
#[derive(Clone)]
pub struct HttpDownstream {
    client: Client,
    base_url: String,
}

impl HttpDownstream {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Downstream for HttpDownstream {
    async fn call(&self, action: Action, parameters: &Parameters) -> Result<Value> {
        let route = route(action, parameters)?;
        let url = format!("{}{}", self.base_url, route.path);

        debug!(action = %action, method = %route.method, url = %url, "Calling reconciliation API");

        let mut request = self.client.request(route.method.clone(), &url);
        if let Some(body) = &route.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(&route.path, e))?;

        let status = response.status();
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(false);
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(&route.path, e))?;

        if !status.is_success() {
            return Err(GatewayError::DownstreamError {
                kind: classify_status(status),
                message: format!("API error ({}): {}", status.as_u16(), error_detail(&body)),
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        if is_json {
            return Ok(serde_json::from_str(&body)?);
        }
        Ok(json!({ "raw": body }))
    }
}
