#![allow(dead_code)]

use async_trait::async_trait;
use reconciliation_gateway::audit::{AuditSink, MemoryAuditSink};
use reconciliation_gateway::downstream::Downstream;
use reconciliation_gateway::{
    Action, ActionGateway, AuditRecord, DownstreamErrorKind, GatewayConfig, GatewayError,
    Parameters,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub enum Behavior {
    Succeed,
    Fail(DownstreamErrorKind, &'static str),
    Hang(Duration),
    Panic,
}

/// Downstream double that counts calls and behaves as scripted.
pub struct ScriptedDownstream {
    behavior: Behavior,
    calls: AtomicUsize,
}

impl ScriptedDownstream {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downstream for ScriptedDownstream {
    async fn call(&self, action: Action, parameters: &Parameters) -> reconciliation_gateway::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Succeed => Ok(json!({ "action": action, "parameters": parameters })),
            Behavior::Fail(kind, message) => Err(GatewayError::DownstreamError {
                kind: *kind,
                message: message.to_string(),
            }),
            Behavior::Hang(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(json!({ "late": true }))
            }
            Behavior::Panic => panic!("downstream client crashed on {}", action),
        }
    }
}

/// Audit sink that refuses every append.
pub struct BrokenAuditSink {
    pub attempts: AtomicUsize,
}

impl BrokenAuditSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            attempts: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl AuditSink for BrokenAuditSink {
    async fn append(&self, _record: &AuditRecord) -> reconciliation_gateway::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(GatewayError::IoError(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only filesystem",
        )))
    }
}

pub struct Harness {
    pub gateway: ActionGateway,
    pub downstream: Arc<ScriptedDownstream>,
    pub audit: Arc<MemoryAuditSink>,
}

pub fn harness(writes_enabled: bool, behavior: Behavior) -> Harness {
    harness_with_timeout(writes_enabled, behavior, Duration::from_secs(5))
}

pub fn harness_with_timeout(writes_enabled: bool, behavior: Behavior, timeout: Duration) -> Harness {
    let downstream = ScriptedDownstream::new(behavior);
    let audit = Arc::new(MemoryAuditSink::new());
    let config = GatewayConfig::default()
        .with_writes_enabled(writes_enabled)
        .with_downstream_timeout(timeout);
    let gateway = ActionGateway::new(&config, downstream.clone(), audit.clone());
    Harness {
        gateway,
        downstream,
        audit,
    }
}

pub fn params(value: Value) -> Parameters {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {}", other),
    }
}
