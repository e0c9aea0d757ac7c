//! Action gateway - orchestrates one invocation end to end
//!
//! RECEIVED → CLASSIFIED → POLICY_CHECKED → DISPATCHED → LOGGED → RESPONDED
//!
//! Rejections (classification, lookup, permission, validation) skip dispatch;
//! downstream failures end in FAILED. Every path goes through LOGGED exactly
//! once before a response is built.

use chrono::Utc;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::audit::{summarize_arguments, AuditLogger, AuditSink};
use crate::classifier::{Classification, IntentClassifier, UnrecognizedReason, EXAMPLE_PROMPTS};
use crate::config::GatewayConfig;
use crate::downstream::Downstream;
use crate::error::GatewayError;
use crate::models::{
    bounded, Action, AuditRecord, DownstreamErrorKind, GatewayRequest, GatewayResponse,
    Invocation, InvocationState, Origin, Parameters,
};
use crate::policy::validator::resolve_defaults;
use crate::policy::PolicyCatalog;
use crate::Result;

/// Audit/response label for free text that matched no rule.
pub const UNRECOGNIZED_ACTION: &str = "unrecognized";

/// Cheap to clone; clones share the audit path and id sequence.
#[derive(Clone)]
pub struct ActionGateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    catalog: PolicyCatalog,
    downstream: Arc<dyn Downstream>,
    audit: AuditLogger,
    timeout: Duration,
    next_id: AtomicU64,
}

impl ActionGateway {
    pub fn new(
        config: &GatewayConfig,
        downstream: Arc<dyn Downstream>,
        audit_sink: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                catalog: PolicyCatalog::new(config.writes_enabled),
                downstream,
                audit: AuditLogger::new(audit_sink),
                timeout: config.downstream_timeout,
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Process one request. The work runs on its own task, so dropping the
    /// returned future does not stop the invocation from reaching LOGGED.
    pub async fn handle(&self, request: GatewayRequest) -> GatewayResponse {
        let invocation_id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let origin = request.origin();
        let label = fallback_label(&request);
        let recorded = Arc::new(AtomicBool::new(false));

        let inner = self.inner.clone();
        let flag = recorded.clone();
        match tokio::spawn(async move { inner.process(invocation_id, request, &flag).await }).await {
            Ok(response) => response,
            Err(join_error) => {
                error!(invocation_id, error = %join_error, "Invocation task aborted");
                let abandoned = Abandoned {
                    invocation_id,
                    origin,
                    label,
                    recorded: recorded.load(Ordering::SeqCst),
                };
                self.inner.abandoned(abandoned, &join_error.to_string()).await
            }
        }
    }

    /// Front-end A: free text.
    pub async fn handle_text(&self, text: impl Into<String>) -> GatewayResponse {
        self.handle(GatewayRequest::free_text(text)).await
    }

    /// Front-end B: structured tool call.
    pub async fn handle_tool_call(
        &self,
        action_id: impl Into<String>,
        parameters: Parameters,
    ) -> GatewayResponse {
        self.handle(GatewayRequest::tool_call(action_id, parameters)).await
    }

    pub fn catalog(&self) -> &PolicyCatalog {
        &self.inner.catalog
    }

    pub fn writes_enabled(&self) -> bool {
        self.inner.catalog.writes_enabled()
    }

    /// Audit records lost after retry (operational metric).
    pub fn audit_failures(&self) -> u64 {
        self.inner.audit.failures()
    }
}

//
// ================= Lifecycle =================
//

struct Lifecycle {
    invocation_id: u64,
    state: InvocationState,
}

impl Lifecycle {
    fn new(invocation_id: u64) -> Self {
        Self {
            invocation_id,
            state: InvocationState::Received,
        }
    }

    fn advance(&mut self, next: InvocationState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(
            invocation_id = self.invocation_id,
            from = ?self.state,
            to = ?next,
            "Invocation state transition"
        );
        self.state = next;
    }
}

/// What the audit record and response describe.
struct Subject {
    label: String,
    action: Option<Action>,
    parameters: Parameters,
    arguments: Value,
    unrecognized: Option<UnrecognizedReason>,
}

impl Subject {
    fn unrecognized(text: &str, reason: UnrecognizedReason) -> Self {
        Self {
            label: UNRECOGNIZED_ACTION.to_string(),
            action: None,
            parameters: Parameters::new(),
            arguments: json!({ "message_len": text.chars().count() }),
            unrecognized: Some(reason),
        }
    }

    fn unresolved(action_id: &str, parameters: &Parameters) -> Self {
        Self {
            label: bounded(action_id),
            action: None,
            parameters: Parameters::new(),
            arguments: summarize_arguments(parameters),
            unrecognized: None,
        }
    }

    fn resolved(invocation: &Invocation, message_len: Option<usize>) -> Self {
        let mut arguments = summarize_arguments(&invocation.parameters);
        if let (Some(len), Value::Object(map)) = (message_len, &mut arguments) {
            map.insert("message_len".to_string(), json!(len));
        }
        Self {
            label: invocation.action.as_str().to_string(),
            action: Some(invocation.action),
            parameters: invocation.parameters.clone(),
            arguments,
            unrecognized: None,
        }
    }
}

//
// ================= Pipeline =================
//

impl GatewayInner {
    async fn process(
        &self,
        invocation_id: u64,
        request: GatewayRequest,
        recorded: &AtomicBool,
    ) -> GatewayResponse {
        let origin = request.origin();
        let mut lifecycle = Lifecycle::new(invocation_id);

        let (subject, outcome) = self.execute(&mut lifecycle, origin, request).await;

        // === LOG ===
        let record = AuditRecord {
            timestamp: Utc::now(),
            invocation_id,
            origin,
            action: subject.label.clone(),
            arguments: subject.arguments.clone(),
            success: outcome.is_ok(),
            state: lifecycle.state,
            error: outcome.as_ref().err().map(|e| e.to_string()),
            digest: None,
        };
        if let Err(e) = self.audit.record(record).await {
            // Counted by the logger; the caller-visible result stays as computed.
            debug!(invocation_id, error = %e, "Responding without a durable audit record");
        }
        recorded.store(true, Ordering::SeqCst);
        lifecycle.advance(InvocationState::Logged);

        // === RESPOND ===
        let response = build_response(invocation_id, &subject, outcome);
        lifecycle.advance(InvocationState::Responded);

        info!(
            invocation_id,
            action = %response.action,
            origin = ?origin,
            success = response.success,
            "Invocation completed"
        );

        response
    }

    async fn execute(
        &self,
        lifecycle: &mut Lifecycle,
        origin: Origin,
        request: GatewayRequest,
    ) -> (Subject, Result<Value>) {
        let invocation_id = lifecycle.invocation_id;

        // === CLASSIFY ===
        let (action, parameters, message_len) = match request {
            GatewayRequest::FreeText { text } => match IntentClassifier::classify(&text) {
                Classification::Matched { action, parameters } => {
                    (action, parameters, Some(text.chars().count()))
                }
                Classification::Unrecognized { text, reason } => {
                    lifecycle.advance(InvocationState::Rejected);
                    debug!(invocation_id, reason = ?reason, "Free text not recognized");
                    return (
                        Subject::unrecognized(&text, reason),
                        Err(GatewayError::UnrecognizedInput(reason.hint().to_string())),
                    );
                }
            },
            GatewayRequest::ToolCall {
                action_id,
                parameters,
                ..
            } => match self.catalog.lookup(&action_id) {
                Ok(spec) => (spec.action, parameters, None),
                Err(e) => {
                    lifecycle.advance(InvocationState::Rejected);
                    warn!(invocation_id, action_id = %bounded(&action_id), "Unknown action");
                    return (Subject::unresolved(&action_id, &parameters), Err(e));
                }
            },
        };
        lifecycle.advance(InvocationState::Classified);

        let invocation = Invocation {
            invocation_id,
            action,
            parameters,
            origin,
            created_at: Utc::now(),
        };
        let subject = Subject::resolved(&invocation, message_len);

        // === POLICY ===
        if let Err(e) = self.catalog.evaluate(&invocation).into_result() {
            lifecycle.advance(InvocationState::Rejected);
            warn!(invocation_id, action = %action, error = %e, "Invocation rejected by policy");
            return (subject, Err(e));
        }
        lifecycle.advance(InvocationState::PolicyChecked);

        // === DISPATCH ===
        let spec = PolicyCatalog::spec(action);
        let parameters = resolve_defaults(spec, &invocation.parameters);

        let outcome = match tokio::time::timeout(
            self.timeout,
            self.downstream.call(action, &parameters),
        )
        .await
        {
            Ok(Ok(payload)) => {
                lifecycle.advance(InvocationState::Dispatched);
                Ok(payload)
            }
            Ok(Err(e)) => {
                lifecycle.advance(InvocationState::Failed);
                Err(normalize_downstream_error(e))
            }
            Err(_) => {
                lifecycle.advance(InvocationState::Failed);
                Err(GatewayError::DownstreamTimeout(self.timeout.as_millis() as u64))
            }
        };

        if let Err(e) = &outcome {
            warn!(invocation_id, action = %action, error = %e, "Downstream call failed");
        }

        (subject, outcome)
    }

    /// Fallback when the invocation task itself died. Writes the record only
    /// if the task had not reached the audit step.
    async fn abandoned(&self, abandoned: Abandoned, reason: &str) -> GatewayResponse {
        let message = format!("invocation aborted: {}", reason);

        if !abandoned.recorded {
            let record = AuditRecord {
                timestamp: Utc::now(),
                invocation_id: abandoned.invocation_id,
                origin: abandoned.origin,
                action: abandoned.label.clone(),
                arguments: json!({}),
                success: false,
                state: InvocationState::Failed,
                error: Some(message.clone()),
                digest: None,
            };
            if let Err(e) = self.audit.record(record).await {
                debug!(
                    invocation_id = abandoned.invocation_id,
                    error = %e,
                    "Aborted invocation has no durable audit record"
                );
            }
        }

        GatewayResponse {
            invocation_id: abandoned.invocation_id,
            action: abandoned.label,
            result: None,
            explanation: message,
            success: false,
            error_kind: None,
        }
    }
}

/// What is known about an invocation whose task died.
struct Abandoned {
    invocation_id: u64,
    origin: Origin,
    label: String,
    recorded: bool,
}

/// Label the audit trail would have used, worked out before the task runs.
fn fallback_label(request: &GatewayRequest) -> String {
    match request {
        GatewayRequest::FreeText { text } => match IntentClassifier::classify(text) {
            Classification::Matched { action, .. } => action.as_str().to_string(),
            Classification::Unrecognized { .. } => UNRECOGNIZED_ACTION.to_string(),
        },
        GatewayRequest::ToolCall { action_id, .. } => match action_id.parse::<Action>() {
            Ok(action) => action.as_str().to_string(),
            Err(_) => bounded(action_id),
        },
    }
}

/// Everything the downstream hands back that is not already a dispatch error
/// is treated as the service being unavailable.
fn normalize_downstream_error(error: GatewayError) -> GatewayError {
    match error {
        GatewayError::DownstreamError { .. } | GatewayError::DownstreamTimeout(_) => error,
        other => GatewayError::DownstreamError {
            kind: DownstreamErrorKind::Unavailable,
            message: other.to_string(),
        },
    }
}

//
// ================= Response =================
//

fn build_response(invocation_id: u64, subject: &Subject, outcome: Result<Value>) -> GatewayResponse {
    match outcome {
        Ok(payload) => GatewayResponse {
            invocation_id,
            action: subject.label.clone(),
            result: Some(payload),
            explanation: subject
                .action
                .map(|action| success_explanation(action, &subject.parameters))
                .unwrap_or_else(|| "Completed.".to_string()),
            success: true,
            error_kind: None,
        },
        Err(e) => {
            let explanation = match (&e, subject.action) {
                (
                    GatewayError::DownstreamTimeout(_) | GatewayError::DownstreamError { .. },
                    Some(action),
                ) => format!("{} failed: {}", action, e),
                _ => e.to_string(),
            };
            let result = subject.unrecognized.map(|reason| {
                json!({
                    "examples": EXAMPLE_PROMPTS.iter().map(|(prompt, _)| *prompt).collect::<Vec<_>>(),
                    "hint": reason.hint(),
                    "reason": reason,
                })
            });
            GatewayResponse {
                invocation_id,
                action: subject.label.clone(),
                result,
                explanation,
                success: false,
                error_kind: e.kind(),
            }
        }
    }
}

/// Fixed wording per action; only validated parameters are interpolated.
fn success_explanation(action: Action, parameters: &Parameters) -> String {
    let session = parameters
        .get("session_id")
        .and_then(Value::as_i64)
        .map(|id| format!("#{}", id))
        .unwrap_or_default();

    match action {
        Action::Health => "Health check completed successfully.".to_string(),
        Action::ListSessions => "Listed reconciliation sessions.".to_string(),
        Action::GetSession => format!("Fetched details for session {}.", session),
        Action::ListTransactions => format!("Listed transactions for session {}.", session),
        Action::RunReconciliation => {
            format!("Reconciliation analysis completed for session {}.", session)
        }
        Action::GetDiscrepancies => {
            format!("Discrepancy analysis completed for session {}.", session)
        }
        Action::GetSummary => format!("Reconciliation summary retrieved for session {}.", session),
        Action::CreateSession => format!(
            "Created session '{}'.",
            parameters
                .get("session_name")
                .and_then(Value::as_str)
                .unwrap_or_default()
        ),
        Action::BulkUploadTransactions => format!(
            "Uploaded {} transaction(s) to session {}.",
            parameters
                .get("transactions")
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0),
            session
        ),
        Action::DeleteSession => format!("Deleted session {}.", session),
        Action::ClearTransactions => format!("Cleared transactions for session {}.", session),
    }
}
