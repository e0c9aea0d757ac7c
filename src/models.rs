//! Core data models for the action gateway

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{ErrorKind, GatewayError};

/// Named parameters of an invocation.
pub type Parameters = serde_json::Map<String, Value>;

//
// ================= Actions =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum PermissionClass {
    Read,
    Write,
}

/// Every operation the gateway is able to govern.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Health,
    ListSessions,
    GetSession,
    ListTransactions,
    RunReconciliation,
    GetDiscrepancies,
    GetSummary,
    CreateSession,
    BulkUploadTransactions,
    DeleteSession,
    ClearTransactions,
}

impl Action {
    pub const ALL: [Action; 11] = [
        Action::Health,
        Action::ListSessions,
        Action::GetSession,
        Action::ListTransactions,
        Action::RunReconciliation,
        Action::GetDiscrepancies,
        Action::GetSummary,
        Action::CreateSession,
        Action::BulkUploadTransactions,
        Action::DeleteSession,
        Action::ClearTransactions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Health => "health",
            Action::ListSessions => "list_sessions",
            Action::GetSession => "get_session",
            Action::ListTransactions => "list_transactions",
            Action::RunReconciliation => "run_reconciliation",
            Action::GetDiscrepancies => "get_discrepancies",
            Action::GetSummary => "get_summary",
            Action::CreateSession => "create_session",
            Action::BulkUploadTransactions => "bulk_upload_transactions",
            Action::DeleteSession => "delete_session",
            Action::ClearTransactions => "clear_transactions",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The tool server historically exposed reconciliation as `reconcile`.
        if s == "reconcile" {
            return Ok(Action::RunReconciliation);
        }
        Action::ALL
            .iter()
            .copied()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| GatewayError::UnknownAction(bounded(s)))
    }
}

/// Longest caller-supplied identifier echoed back verbatim.
pub const MAX_ECHO_CHARS: usize = 64;

/// Caller text that ends up in responses or audit records: kept when short,
/// otherwise replaced by its length.
pub fn bounded(text: &str) -> String {
    let len = text.chars().count();
    if len > MAX_ECHO_CHARS {
        format!("<{} chars>", len)
    } else {
        text.to_string()
    }
}

//
// ================= Invocation =================
//

/// Which front-end produced an invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Chat,
    Tool,
}

/// A request as it arrives at the gateway, before classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayRequest {
    FreeText {
        text: String,
    },
    ToolCall {
        action_id: String,
        #[serde(default)]
        parameters: Parameters,
        #[serde(default = "default_tool_origin")]
        origin: Origin,
    },
}

fn default_tool_origin() -> Origin {
    Origin::Tool
}

impl GatewayRequest {
    pub fn free_text(text: impl Into<String>) -> Self {
        GatewayRequest::FreeText { text: text.into() }
    }

    pub fn tool_call(action_id: impl Into<String>, parameters: Parameters) -> Self {
        GatewayRequest::ToolCall {
            action_id: action_id.into(),
            parameters,
            origin: Origin::Tool,
        }
    }

    pub fn origin(&self) -> Origin {
        match self {
            GatewayRequest::FreeText { .. } => Origin::Chat,
            GatewayRequest::ToolCall { origin, .. } => *origin,
        }
    }
}

/// One resolved request instance. Immutable once classification completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub invocation_id: u64,
    pub action: Action,
    pub parameters: Parameters,
    pub origin: Origin,
    pub created_at: DateTime<Utc>,
}

/// Per-invocation lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvocationState {
    Received,
    Classified,
    PolicyChecked,
    Dispatched,
    Rejected,
    Failed,
    Logged,
    Responded,
}

impl InvocationState {
    /// Legal edges of the lifecycle graph.
    pub fn can_advance_to(self, next: InvocationState) -> bool {
        use InvocationState::*;
        matches!(
            (self, next),
            (Received, Classified)
                | (Received, Rejected)
                | (Classified, PolicyChecked)
                | (Classified, Rejected)
                | (PolicyChecked, Dispatched)
                | (PolicyChecked, Failed)
                | (Dispatched, Logged)
                | (Rejected, Logged)
                | (Failed, Logged)
                | (Logged, Responded)
        )
    }
}

//
// ================= Policy =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    PermissionDenied,
    ValidationFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of evaluating an invocation against the policy catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial: Option<DenialKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<FieldViolation>,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            denial: None,
            violations: Vec::new(),
        }
    }

    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            denial: Some(DenialKind::PermissionDenied),
            violations: Vec::new(),
        }
    }

    pub fn validation_failed(violations: Vec<FieldViolation>) -> Self {
        let reason = violations
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            allowed: false,
            reason: Some(reason),
            denial: Some(DenialKind::ValidationFailed),
            violations,
        }
    }

    /// Converts a denial into the matching gateway error.
    pub fn into_result(self) -> crate::Result<()> {
        match self.denial {
            None if self.allowed => Ok(()),
            Some(DenialKind::ValidationFailed) => {
                Err(GatewayError::ValidationFailed(self.violations))
            }
            _ => Err(GatewayError::PermissionDenied(
                self.reason.unwrap_or_else(|| "denied".to_string()),
            )),
        }
    }
}

//
// ================= Dispatch =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DownstreamErrorKind {
    NotFound,
    InvalidState,
    Unavailable,
    Timeout,
}

impl fmt::Display for DownstreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DownstreamErrorKind::NotFound => "not_found",
            DownstreamErrorKind::InvalidState => "invalid_state",
            DownstreamErrorKind::Unavailable => "unavailable",
            DownstreamErrorKind::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

//
// ================= Audit Record =================
//

/// One durable line of the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub invocation_id: u64,
    pub origin: Origin,
    pub action: String,
    pub arguments: Value,
    pub success: bool,
    pub state: InvocationState,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

//
// ================= Response =================
//

/// Envelope returned to both front-ends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayResponse {
    pub invocation_id: u64,
    pub action: String,
    pub result: Option<Value>,
    pub explanation: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}
