//! Reconciliation Action Gateway
//!
//! A governed layer in front of the reconciliation data service:
//! - Accepts free text (chat) or structured tool calls
//! - Classifies free text with an ordered, deterministic rule table
//! - Enforces the action catalog: write kill-switch + input validation
//! - Dispatches approved actions with a bounded timeout
//! - Writes exactly one audit record per invocation before responding
//!
//! PIPELINE:
//! RECEIVED → CLASSIFIED → POLICY_CHECKED → DISPATCHED → LOGGED → RESPONDED

pub mod api;
pub mod audit;
pub mod classifier;
pub mod config;
pub mod downstream;
pub mod error;
pub mod gateway;
pub mod models;
pub mod policy;

pub use error::{ErrorKind, GatewayError, Result};

// Re-export common types
pub use models::*;
pub use classifier::{Classification, IntentClassifier};
pub use config::GatewayConfig;
pub use gateway::ActionGateway;
