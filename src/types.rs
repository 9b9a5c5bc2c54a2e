//! Access-binding data model and provider result types.
//!
//! [`Subject`], [`AccessBinding`], [`Policy`] and [`PolicyDelta`] are the
//! ergonomic counterparts of the protobuf messages in [`crate::generated`].
//! [`Policy`] also defines the JSON document stored in `policy_data`:
//!
//! ```json
//! { "bindings": [ { "role_id": "viewer", "subject": { "type": "userAccount", "id": "aje1" } } ] }
//! ```

use serde::{Deserialize, Serialize};

use crate::generated;

/// Maximum number of deltas sent in one `UpdateAccessBindings` request.
pub const MAX_DELTAS_PER_REQUEST: usize = 1000;

/// An account that can hold a role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Subject {
    /// Account kind, e.g. `userAccount`, `serviceAccount`, `system`.
    #[serde(rename = "type")]
    pub subject_type: String,
    /// Identifier, opaque within the account kind.
    pub id: String,
}

impl Subject {
    /// Create a new subject.
    pub fn new(subject_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            subject_type: subject_type.into(),
            id: id.into(),
        }
    }
}

/// A single grant: `subject` holds `role_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessBinding {
    /// Role identifier.
    pub role_id: String,
    /// The account holding the role.
    pub subject: Subject,
}

impl AccessBinding {
    /// Create a new binding.
    pub fn new(role_id: impl Into<String>, subject: Subject) -> Self {
        Self {
            role_id: role_id.into(),
            subject,
        }
    }

    /// Key used to order bindings deterministically: `role\0type\0id`.
    pub fn sort_key(&self) -> String {
        format!(
            "{}\0{}\0{}",
            self.role_id, self.subject.subject_type, self.subject.id
        )
    }
}

/// The complete set of bindings on one resource at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Policy {
    /// Bindings in backend order.
    #[serde(default)]
    pub bindings: Vec<AccessBinding>,
}

impl Policy {
    /// Create a policy from a list of bindings.
    pub fn new(bindings: Vec<AccessBinding>) -> Self {
        Self { bindings }
    }

    /// A policy without bindings.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a `policy_data` document.
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    /// Serialize into a `policy_data` document.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Whether a delta grants or revokes its binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessBindingAction {
    /// Grant the binding.
    Add,
    /// Revoke the binding.
    Remove,
}

/// One incremental change to a resource's bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessBindingDelta {
    /// Grant or revoke.
    pub action: AccessBindingAction,
    /// The binding affected.
    pub access_binding: AccessBinding,
}

impl AccessBindingDelta {
    /// A delta granting `binding`.
    pub fn add(binding: AccessBinding) -> Self {
        Self {
            action: AccessBindingAction::Add,
            access_binding: binding,
        }
    }

    /// A delta revoking `binding`.
    pub fn remove(binding: AccessBinding) -> Self {
        Self {
            action: AccessBindingAction::Remove,
            access_binding: binding,
        }
    }
}

/// Incremental changes for backends that support partial updates.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyDelta {
    /// Deltas in the order they should be applied.
    pub deltas: Vec<AccessBindingDelta>,
}

impl PolicyDelta {
    /// Create a delta set.
    pub fn new(deltas: Vec<AccessBindingDelta>) -> Self {
        Self { deltas }
    }

    /// Whether there is nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Split into request-sized batches of at most [`MAX_DELTAS_PER_REQUEST`].
    pub fn batches(&self) -> impl Iterator<Item = &[AccessBindingDelta]> {
        self.deltas.chunks(MAX_DELTAS_PER_REQUEST)
    }
}

impl From<generated::Subject> for Subject {
    fn from(proto: generated::Subject) -> Self {
        Self {
            subject_type: proto.r#type,
            id: proto.id,
        }
    }
}

impl From<Subject> for generated::Subject {
    fn from(subject: Subject) -> Self {
        Self {
            id: subject.id,
            r#type: subject.subject_type,
        }
    }
}

impl From<generated::AccessBinding> for AccessBinding {
    fn from(proto: generated::AccessBinding) -> Self {
        Self {
            role_id: proto.role_id,
            subject: proto.subject.map(Subject::from).unwrap_or_else(|| Subject::new("", "")),
        }
    }
}

impl From<AccessBinding> for generated::AccessBinding {
    fn from(binding: AccessBinding) -> Self {
        Self {
            role_id: binding.role_id,
            subject: Some(binding.subject.into()),
        }
    }
}

impl From<AccessBindingDelta> for generated::AccessBindingDelta {
    fn from(delta: AccessBindingDelta) -> Self {
        let action = match delta.action {
            AccessBindingAction::Add => generated::AccessBindingAction::Add,
            AccessBindingAction::Remove => generated::AccessBindingAction::Remove,
        };
        Self {
            action: action as i32,
            access_binding: Some(delta.access_binding.into()),
        }
    }
}

/// A change to a single attribute during a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// The attribute that changed.
    pub path: String,
    /// The value before the change (None if creating).
    pub before: Option<serde_json::Value>,
    /// The value after the change (None if deleting).
    pub after: Option<serde_json::Value>,
}

impl AttributeChange {
    /// Create a new attribute change.
    pub fn new(
        path: impl Into<String>,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }
}

/// The result of a plan operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The planned state after the operation.
    pub planned_state: serde_json::Value,
    /// The list of attribute changes.
    pub changes: Vec<AttributeChange>,
    /// Whether the resource requires replacement.
    pub requires_replace: bool,
}

impl PlanResult {
    /// Create a plan result with no changes.
    pub fn no_change(state: serde_json::Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    /// Create a plan result with changes.
    pub fn with_changes(
        planned_state: serde_json::Value,
        changes: Vec<AttributeChange>,
        requires_replace: bool,
    ) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
        }
    }
}

/// A resource recovered by import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// The resource type.
    pub resource_type: String,
    /// The imported state.
    pub state: serde_json::Value,
}

impl ImportedResource {
    /// Create a new imported resource.
    pub fn new(resource_type: impl Into<String>, state: serde_json::Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}
