//! The authoritative whole-policy resource (`*_iam_policy`).
//!
//! The declared `policy_data` document replaces every binding on the
//! resource. Nothing is merged with what is already there.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::diff::policy_data_equivalent;
use crate::error::{IamError, Result};
use crate::iam::{bind_error, replace_policy};
use crate::mutex::MutexKv;
use crate::types::Policy;
use crate::updater::ResourceIamUpdater;

/// State of a whole-policy resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyState {
    /// Resource the policy applies to.
    pub resource_id: String,
    /// Serialized [`Policy`].
    pub policy_data: String,
    /// Set once the policy has been applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl PolicyState {
    fn policy(&self) -> Result<Policy> {
        Policy::from_json(&self.policy_data)
            .map_err(|e| IamError::Validation(format!("invalid policy_data: {}", e)))
    }
}

/// Apply the declared policy.
#[instrument(skip_all, fields(resource = %updater.describe_resource()))]
pub async fn create(
    locks: &MutexKv,
    updater: &dyn ResourceIamUpdater,
    declared: &PolicyState,
) -> Result<PolicyState> {
    let policy = declared.policy()?;
    replace_policy(locks, updater, &policy)
        .await
        .map_err(|e| bind_error(e, "IAM policy", updater))?;
    info!(bindings = policy.bindings.len(), "Applied IAM policy");

    Ok(PolicyState {
        id: Some(updater.resource_id()),
        ..declared.clone()
    })
}

/// Refresh `policy_data` from the backend.
///
/// Returns `None` when the resource is gone.
#[instrument(skip_all, fields(resource = %updater.describe_resource()))]
pub async fn read(
    updater: &dyn ResourceIamUpdater,
    state: &PolicyState,
) -> Result<Option<PolicyState>> {
    let policy = match updater.get_resource_iam_policy().await {
        Ok(policy) => policy,
        Err(e) if e.is_not_found() => {
            warn!("Resource is gone, removing IAM policy from state");
            return Ok(None);
        },
        Err(e) => return Err(e),
    };

    let fetched = policy.to_json()?;
    // Keep the stored document when only ordering differs.
    let policy_data = if policy_data_equivalent(&state.policy_data, &fetched) {
        state.policy_data.clone()
    } else {
        fetched
    };

    Ok(Some(PolicyState {
        resource_id: state.resource_id.clone(),
        policy_data,
        id: Some(updater.resource_id()),
    }))
}

/// Re-apply the policy if the declared document changed.
#[instrument(skip_all, fields(resource = %updater.describe_resource()))]
pub async fn update(
    locks: &MutexKv,
    updater: &dyn ResourceIamUpdater,
    prior: &PolicyState,
    planned: &PolicyState,
) -> Result<PolicyState> {
    if policy_data_equivalent(&prior.policy_data, &planned.policy_data) {
        debug!("Declared policy unchanged");
        return Ok(PolicyState {
            id: Some(updater.resource_id()),
            ..planned.clone()
        });
    }
    create(locks, updater, planned).await
}

/// Clear every binding on the resource.
#[instrument(skip_all, fields(resource = %updater.describe_resource()))]
pub async fn delete(locks: &MutexKv, updater: &dyn ResourceIamUpdater) -> Result<()> {
    match replace_policy(locks, updater, &Policy::empty()).await {
        Ok(()) => {
            info!("Cleared IAM policy");
            Ok(())
        },
        Err(e) if e.is_not_found() => {
            debug!("Resource already gone");
            Ok(())
        },
        Err(e) => Err(e),
    }
}
