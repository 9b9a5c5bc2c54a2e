//! The single-member resource (`*_iam_member`).
//!
//! Owns exactly one `(role, member)` pair. When the backend accepts
//! incremental updates, writes go out as a single delta instead of a full
//! policy replacement.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::iam::{apply_policy_deltas, bind_error, read_modify_write, sleep_after};
use crate::merge::{merge_bindings, parse_canonical_member, role_to_members_list};
use crate::mutex::MutexKv;
use crate::types::{AccessBinding, AccessBindingDelta, PolicyDelta};
use crate::updater::ResourceIamUpdater;

/// State of a single-member resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberState {
    /// Resource the member is bound on.
    pub resource_id: String,
    /// Role granted to the member.
    pub role: String,
    /// Member in `TYPE:ID` form.
    pub member: String,
    /// Seconds to wait after each write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_after: Option<u64>,
    /// `{resource_id}/{role}/{member}` once created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl MemberState {
    /// Identifier recorded in state.
    pub fn member_id(&self) -> String {
        format!("{}/{}/{}", self.resource_id, self.role, self.member)
    }

    fn binding(&self) -> Result<AccessBinding> {
        Ok(AccessBinding::new(
            self.role.as_str(),
            parse_canonical_member(&self.member)?,
        ))
    }
}

/// Grant the role to the member.
#[instrument(skip_all, fields(resource = %updater.describe_resource(), role = %declared.role, member = %declared.member))]
pub async fn create(
    locks: &MutexKv,
    updater: &dyn ResourceIamUpdater,
    declared: &MemberState,
) -> Result<MemberState> {
    let binding = declared.binding()?;

    let result = if updater.supports_delta_updates() {
        apply_policy_deltas(locks, updater, |policy| {
            if policy.bindings.contains(&binding) {
                Ok(PolicyDelta::default())
            } else {
                Ok(PolicyDelta::new(vec![AccessBindingDelta::add(binding.clone())]))
            }
        })
        .await
    } else {
        read_modify_write(locks, updater, |policy| {
            let mut bindings = std::mem::take(&mut policy.bindings);
            bindings.push(binding.clone());
            policy.bindings = merge_bindings(&bindings);
            Ok(())
        })
        .await
    };
    result.map_err(|e| {
        bind_error(
            e,
            &format!("{} with role {:?}", declared.member, declared.role),
            updater,
        )
    })?;
    info!("Granted role");

    sleep_after(declared.sleep_after).await;
    Ok(MemberState {
        id: Some(declared.member_id()),
        ..declared.clone()
    })
}

/// Check that the member still holds the role.
///
/// Returns `None` when the resource is gone or the grant was removed out
/// of band.
#[instrument(skip_all, fields(resource = %updater.describe_resource(), role = %state.role, member = %state.member))]
pub async fn read(
    updater: &dyn ResourceIamUpdater,
    state: &MemberState,
) -> Result<Option<MemberState>> {
    let policy = match updater.get_resource_iam_policy().await {
        Ok(policy) => policy,
        Err(e) if e.is_not_found() => {
            warn!("Resource is gone, removing member from state");
            return Ok(None);
        },
        Err(e) => return Err(e),
    };

    let members = role_to_members_list(&state.role, &policy.bindings);
    if !members.iter().any(|m| *m == state.member) {
        warn!("Member no longer holds the role, removing from state");
        return Ok(None);
    }

    Ok(Some(MemberState {
        id: Some(state.member_id()),
        ..state.clone()
    }))
}

/// Revoke the role from the member, leaving every other binding alone.
#[instrument(skip_all, fields(resource = %updater.describe_resource(), role = %state.role, member = %state.member))]
pub async fn delete(
    locks: &MutexKv,
    updater: &dyn ResourceIamUpdater,
    state: &MemberState,
) -> Result<()> {
    let binding = state.binding()?;

    let result = if updater.supports_delta_updates() {
        apply_policy_deltas(locks, updater, |policy| {
            if policy.bindings.contains(&binding) {
                Ok(PolicyDelta::new(vec![AccessBindingDelta::remove(binding.clone())]))
            } else {
                Ok(PolicyDelta::default())
            }
        })
        .await
    } else {
        read_modify_write(locks, updater, |policy| {
            if let Some(i) = policy.bindings.iter().position(|b| *b == binding) {
                policy.bindings.remove(i);
            }
            Ok(())
        })
        .await
    };

    match result {
        Ok(()) => {
            info!("Revoked role");
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
