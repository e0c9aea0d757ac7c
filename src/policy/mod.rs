//! Policy catalog
//!
//! Static table of governed actions. Each entry carries its permission class
//! and the declared parameter schema. The table is compiled in and cannot be
//! edited at runtime; the only runtime input is the write kill-switch.

pub mod validator;

use serde::Serialize;
use tracing::debug;

use crate::models::{Action, Invocation, PermissionClass, PolicyDecision};
use crate::Result;

pub use validator::validate;

pub const MAX_SESSION_NAME_LENGTH: usize = 255;
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;
pub const MAX_TRANSACTIONS_PER_UPLOAD: usize = 10_000;

/// Declared type and bounds of one parameter.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Integer { min: i64, max: i64 },
    Text { min_len: usize, max_len: usize },
    /// List of JSON objects.
    ObjectList { max_items: usize },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Required,
    /// Absent (or explicit null) resolves to null.
    Optional,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    #[serde(flatten)]
    pub kind: FieldKind,
    pub presence: Presence,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ActionSpec {
    pub action: Action,
    pub permission: PermissionClass,
    pub fields: &'static [FieldSpec],
    pub description: &'static str,
}

const SESSION_ID: FieldSpec = FieldSpec {
    name: "session_id",
    kind: FieldKind::Integer { min: 1, max: i64::MAX },
    presence: Presence::Required,
};

const SESSION_ONLY: &[FieldSpec] = &[SESSION_ID];

const fn name_field(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Text {
            min_len: 1,
            max_len: MAX_SESSION_NAME_LENGTH,
        },
        presence: Presence::Required,
    }
}

const CREATE_SESSION_FIELDS: &[FieldSpec] = &[
    name_field("session_name"),
    name_field("system_a_name"),
    name_field("system_b_name"),
    FieldSpec {
        name: "description",
        kind: FieldKind::Text {
            min_len: 0,
            max_len: MAX_DESCRIPTION_LENGTH,
        },
        presence: Presence::Optional,
    },
];

const BULK_UPLOAD_FIELDS: &[FieldSpec] = &[
    SESSION_ID,
    FieldSpec {
        name: "transactions",
        kind: FieldKind::ObjectList {
            max_items: MAX_TRANSACTIONS_PER_UPLOAD,
        },
        presence: Presence::Required,
    },
];

/// Ordered exactly like `Action::ALL`.
static ACTION_SPECS: [ActionSpec; 11] = [
    ActionSpec {
        action: Action::Health,
        permission: PermissionClass::Read,
        fields: &[],
        description: "Check the reconciliation API health",
    },
    ActionSpec {
        action: Action::ListSessions,
        permission: PermissionClass::Read,
        fields: &[],
        description: "List all reconciliation sessions",
    },
    ActionSpec {
        action: Action::GetSession,
        permission: PermissionClass::Read,
        fields: SESSION_ONLY,
        description: "Get a specific reconciliation session",
    },
    ActionSpec {
        action: Action::ListTransactions,
        permission: PermissionClass::Read,
        fields: SESSION_ONLY,
        description: "List all transactions for a session",
    },
    ActionSpec {
        action: Action::RunReconciliation,
        permission: PermissionClass::Read,
        fields: SESSION_ONLY,
        description: "Run reconciliation analysis for a session",
    },
    ActionSpec {
        action: Action::GetDiscrepancies,
        permission: PermissionClass::Read,
        fields: SESSION_ONLY,
        description: "Find amount discrepancies between the two systems",
    },
    ActionSpec {
        action: Action::GetSummary,
        permission: PermissionClass::Read,
        fields: SESSION_ONLY,
        description: "Get the reconciliation summary with match rate",
    },
    ActionSpec {
        action: Action::CreateSession,
        permission: PermissionClass::Write,
        fields: CREATE_SESSION_FIELDS,
        description: "Create a new reconciliation session",
    },
    ActionSpec {
        action: Action::BulkUploadTransactions,
        permission: PermissionClass::Write,
        fields: BULK_UPLOAD_FIELDS,
        description: "Upload a batch of transactions into a session",
    },
    ActionSpec {
        action: Action::DeleteSession,
        permission: PermissionClass::Write,
        fields: SESSION_ONLY,
        description: "Delete a session and all its transactions",
    },
    ActionSpec {
        action: Action::ClearTransactions,
        permission: PermissionClass::Write,
        fields: SESSION_ONLY,
        description: "Delete all transactions for a session",
    },
];

/// Read-only view of the action table plus the write kill-switch.
#[derive(Debug, Clone, Copy)]
pub struct PolicyCatalog {
    writes_enabled: bool,
}

impl PolicyCatalog {
    pub fn new(writes_enabled: bool) -> Self {
        Self { writes_enabled }
    }

    pub fn writes_enabled(&self) -> bool {
        self.writes_enabled
    }

    /// Look up an action by its identifier.
    pub fn lookup(&self, action_id: &str) -> Result<&'static ActionSpec> {
        let action: Action = action_id.parse()?;
        Ok(Self::spec(action))
    }

    /// Every `Action` has exactly one entry.
    pub fn spec(action: Action) -> &'static ActionSpec {
        let index = Action::ALL
            .iter()
            .position(|a| *a == action)
            .unwrap_or_default();
        &ACTION_SPECS[index]
    }

    pub fn specs(&self) -> &'static [ActionSpec] {
        &ACTION_SPECS
    }

    /// Permission check followed by input validation.
    pub fn evaluate(&self, invocation: &Invocation) -> PolicyDecision {
        let spec = Self::spec(invocation.action);

        if spec.permission == PermissionClass::Write && !self.writes_enabled {
            debug!(
                invocation_id = invocation.invocation_id,
                action = %spec.action,
                "Write action denied by kill-switch"
            );
            return PolicyDecision::permission_denied(format!(
                "write operations are disabled: '{}' was not executed",
                spec.action
            ));
        }

        validate(spec, &invocation.parameters)
    }
}
