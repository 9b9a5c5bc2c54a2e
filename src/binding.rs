//! The single-role binding resource (`*_iam_binding`).
//!
//! One resource owns the member list of one role and leaves every other
//! role alone. Create unions the declared members into the role; update
//! replaces the role's members with the declared set.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{IamError, Result};
use crate::iam::{bind_error, read_modify_write, sleep_after};
use crate::merge::{
    merge_bindings, parse_canonical_member, remove_role_from_bindings, role_bindings,
    role_to_members_list,
};
use crate::mutex::MutexKv;
use crate::types::Subject;
use crate::updater::ResourceIamUpdater;

/// State of a single-role binding resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingState {
    /// Resource the role is bound on.
    pub resource_id: String,
    /// The role whose members this resource owns.
    pub role: String,
    /// Members in `TYPE:ID` form.
    #[serde(default)]
    pub members: Vec<String>,
    /// Seconds to wait after each write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_after: Option<u64>,
    /// `{resource_id}/{role}` once created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl BindingState {
    /// Identifier recorded in state.
    pub fn binding_id(&self) -> String {
        format!("{}/{}", self.resource_id, self.role)
    }

    fn subjects(&self) -> Result<BTreeSet<Subject>> {
        self.members
            .iter()
            .map(|m| parse_canonical_member(m))
            .collect()
    }

    fn with_id(&self) -> Self {
        Self {
            id: Some(self.binding_id()),
            ..self.clone()
        }
    }
}

fn role_label(role: &str) -> String {
    format!("role {:?}", role)
}

/// Add the declared members to the role.
///
/// Members of the role that are not declared are kept.
#[instrument(skip_all, fields(resource = %updater.describe_resource(), role = %declared.role))]
pub async fn create(
    locks: &MutexKv,
    updater: &dyn ResourceIamUpdater,
    declared: &BindingState,
) -> Result<BindingState> {
    let subjects = declared.subjects()?;

    read_modify_write(locks, updater, |policy| {
        let mut bindings = std::mem::take(&mut policy.bindings);
        bindings.extend(role_bindings(&declared.role, &subjects));
        policy.bindings = merge_bindings(&bindings);
        Ok(())
    })
    .await
    .map_err(|e| bind_error(e, &role_label(&declared.role), updater))?;
    info!(members = subjects.len(), "Bound role");

    sleep_after(declared.sleep_after).await;
    Ok(declared.with_id())
}

/// Refresh the role's members.
///
/// When members are declared, members added out of band are ignored.
/// Returns `None` when the resource is gone and
/// [`IamError::BindingNotFound`] when the role has no members at all.
#[instrument(skip_all, fields(resource = %updater.describe_resource(), role = %state.role))]
pub async fn read(
    updater: &dyn ResourceIamUpdater,
    state: &BindingState,
) -> Result<Option<BindingState>> {
    let policy = match updater.get_resource_iam_policy().await {
        Ok(policy) => policy,
        Err(e) if e.is_not_found() => {
            warn!("Resource is gone, removing binding from state");
            return Ok(None);
        },
        Err(e) => return Err(e),
    };

    let mut members = role_to_members_list(&state.role, &policy.bindings);
    if members.is_empty() {
        return Err(IamError::BindingNotFound {
            role: state.role.clone(),
            resource: updater.describe_resource(),
        });
    }

    if !state.members.is_empty() {
        let declared: HashSet<&str> = state.members.iter().map(String::as_str).collect();
        members.retain(|m| declared.contains(m.as_str()));
    }
    members.sort();
    members.dedup();

    Ok(Some(BindingState {
        members,
        ..state.with_id()
    }))
}

/// Replace the role's members with the declared set.
#[instrument(skip_all, fields(resource = %updater.describe_resource(), role = %planned.role))]
pub async fn update(
    locks: &MutexKv,
    updater: &dyn ResourceIamUpdater,
    planned: &BindingState,
) -> Result<BindingState> {
    let subjects = planned.subjects()?;

    read_modify_write(locks, updater, |policy| {
        let mut bindings = remove_role_from_bindings(&planned.role, &policy.bindings);
        bindings.extend(role_bindings(&planned.role, &subjects));
        policy.bindings = bindings;
        Ok(())
    })
    .await
    .map_err(|e| bind_error(e, &role_label(&planned.role), updater))?;
    info!(members = subjects.len(), "Replaced role members");

    sleep_after(planned.sleep_after).await;
    Ok(planned.with_id())
}

/// Remove every member of the role.
#[instrument(skip_all, fields(resource = %updater.describe_resource(), role = %state.role))]
pub async fn delete(
    locks: &MutexKv,
    updater: &dyn ResourceIamUpdater,
    state: &BindingState,
) -> Result<()> {
    let result = read_modify_write(locks, updater, |policy| {
        policy.bindings = remove_role_from_bindings(&state.role, &policy.bindings);
        Ok(())
    })
    .await;

    match result {
        Ok(()) => {
            info!("Unbound role");
            sleep_after(state.sleep_after).await;
            Ok(())
        },
        Err(e) if e.is_not_found() => {
            debug!("Resource already gone");
            Ok(())
        },
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ResourceKind;
    use crate::merge::canonical_member;
    use crate::testing::{service_account, user, InMemoryIamBackend};
    use crate::types::AccessBinding;
    use crate::updater::UpdaterFactory;
    use tokio_test::{assert_err, assert_ok};

    fn state(members: &[&str]) -> BindingState {
        BindingState {
            resource_id: "b1g".to_string(),
            role: "viewer".to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
            sleep_after: None,
            id: None,
        }
    }

    fn role_members(backend: &InMemoryIamBackend, role: &str) -> Vec<String> {
        let mut members =
            role_to_members_list(role, &backend.bindings(ResourceKind::Folder, "b1g"));
        members.sort();
        members
    }

    fn setup(existing: Vec<AccessBinding>) -> (InMemoryIamBackend, MutexKv) {
        let backend = InMemoryIamBackend::new();
        backend.insert_resource(ResourceKind::Folder, "b1g", existing);
        (backend, MutexKv::new())
    }

    #[tokio::test]
    async fn test_create_unions_into_role() {
        let (backend, locks) = setup(vec![
            AccessBinding::new("viewer", user("x")),
            AccessBinding::new("editor", user("z")),
        ]);
        let updater = backend.updater(ResourceKind::Folder, "b1g");

        let created = assert_ok!(
            create(&locks, updater.as_ref(), &state(&["userAccount:y"])).await
        );
        assert_eq!(created.id.as_deref(), Some("b1g/viewer"));

        assert_eq!(
            role_members(&backend, "viewer"),
            vec!["userAccount:x", "userAccount:y"]
        );
        assert_eq!(role_members(&backend, "editor"), vec!["userAccount:z"]);
    }

    #[tokio::test]
    async fn test_update_replaces_role() {
        let (backend, locks) = setup(vec![
            AccessBinding::new("viewer", user("x")),
            AccessBinding::new("viewer", user("y")),
            AccessBinding::new("editor", user("z")),
        ]);
        let updater = backend.updater(ResourceKind::Folder, "b1g");

        assert_ok!(update(&locks, updater.as_ref(), &state(&["userAccount:y"])).await);

        assert_eq!(role_members(&backend, "viewer"), vec!["userAccount:y"]);
        assert_eq!(role_members(&backend, "editor"), vec!["userAccount:z"]);
    }

    #[tokio::test]
    async fn test_create_and_update_differ_on_same_input() {
        let existing = vec![AccessBinding::new("viewer", user("x"))];
        let declared = state(&["userAccount:y"]);

        let (created, locks) = setup(existing.clone());
        let updater = created.updater(ResourceKind::Folder, "b1g");
        assert_ok!(create(&locks, updater.as_ref(), &declared).await);

        let (updated, locks) = setup(existing);
        let updater = updated.updater(ResourceKind::Folder, "b1g");
        assert_ok!(update(&locks, updater.as_ref(), &declared).await);

        assert!(role_members(&created, "viewer").contains(&"userAccount:x".to_string()));
        assert!(!role_members(&updated, "viewer").contains(&"userAccount:x".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_member_rejected_before_fetch() {
        let (backend, locks) = setup(vec![]);
        let updater = backend.updater(ResourceKind::Folder, "b1g");

        let err = assert_err!(create(&locks, updater.as_ref(), &state(&["bob"])).await);
        assert!(matches!(err, IamError::Validation(_)));
        assert_eq!(backend.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_read_filters_to_declared_members() {
        let (backend, _) = setup(vec![
            AccessBinding::new("viewer", user("y")),
            AccessBinding::new("viewer", user("x")),
            AccessBinding::new("viewer", service_account("outsider")),
            AccessBinding::new("editor", user("z")),
        ]);
        let updater = backend.updater(ResourceKind::Folder, "b1g");

        let declared = state(&["userAccount:x", "userAccount:y"]);
        let read_back = read(updater.as_ref(), &declared).await.unwrap().unwrap();
        assert_eq!(read_back.members, vec!["userAccount:x", "userAccount:y"]);
        assert_eq!(read_back.id.as_deref(), Some("b1g/viewer"));

        let everything = read(updater.as_ref(), &state(&[])).await.unwrap().unwrap();
        assert_eq!(everything.members.len(), 3);
        assert!(everything
            .members
            .contains(&canonical_member(&AccessBinding::new(
                "viewer",
                service_account("outsider")
            ))));
    }

    #[tokio::test]
    async fn test_read_role_without_members_is_error() {
        let (backend, _) = setup(vec![AccessBinding::new("editor", user("z"))]);
        let updater = backend.updater(ResourceKind::Folder, "b1g");

        let err = assert_err!(read(updater.as_ref(), &state(&["userAccount:x"])).await);
        assert!(matches!(err, IamError::BindingNotFound { ref role, .. } if role == "viewer"));
        assert!(err.to_string().contains("folder \"b1g\""));
    }

    #[tokio::test]
    async fn test_read_missing_resource_clears_state() {
        let backend = InMemoryIamBackend::new();
        let updater = backend.updater(ResourceKind::Folder, "gone");
        assert!(read(updater.as_ref(), &state(&[])).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_only_the_role() {
        let (backend, locks) = setup(vec![
            AccessBinding::new("viewer", user("x")),
            AccessBinding::new("viewer", user("y")),
            AccessBinding::new("editor", user("z")),
        ]);
        let updater = backend.updater(ResourceKind::Folder, "b1g");

        assert_ok!(delete(&locks, updater.as_ref(), &state(&["userAccount:x"])).await);
        assert!(role_members(&backend, "viewer").is_empty());
        assert_eq!(role_members(&backend, "editor"), vec!["userAccount:z"]);
    }

    #[tokio::test]
    async fn test_delete_missing_resource_succeeds() {
        let backend = InMemoryIamBackend::new();
        let updater = backend.updater(ResourceKind::Folder, "gone");
        assert_ok!(delete(&MutexKv::new(), updater.as_ref(), &state(&[])).await);
        assert_eq!(backend.set_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_on_missing_resource_is_descriptive() {
        let backend = InMemoryIamBackend::new();
        let updater = backend.updater(ResourceKind::Folder, "gone");
        let err = assert_err!(
            create(&MutexKv::new(), updater.as_ref(), &state(&["userAccount:x"])).await
        );
        assert_eq!(
            err.message(),
            "cannot bind role \"viewer\" to non-existent folder \"gone\""
        );
    }
}
