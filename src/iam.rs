//! The read-modify-write orchestrator.
//!
//! Every mutation of access bindings passes through [`read_modify_write`]
//! (or [`apply_policy_deltas`] for delta-capable backends): lock the
//! resource's mutex key, fetch the live policy, transform it, write it back.
//! Two operations on the same resource within this process therefore never
//! interleave their fetch and write.

use std::time::Duration;

use tracing::{debug, instrument};

use crate::error::{IamError, Result};
use crate::mutex::MutexKv;
use crate::types::{Policy, PolicyDelta};
use crate::updater::ResourceIamUpdater;

/// Fetch the policy under the resource's lock, apply `modify`, write it back.
///
/// Fetch errors (including [`crate::IamError::NotFound`]) and errors from
/// `modify` propagate unchanged and nothing is written. Write errors are
/// annotated with the resource description. The lock is released on every
/// path.
#[instrument(skip_all, fields(resource = %updater.describe_resource()))]
pub async fn read_modify_write<F>(
    locks: &MutexKv,
    updater: &dyn ResourceIamUpdater,
    modify: F,
) -> Result<()>
where
    F: FnOnce(&mut Policy) -> Result<()> + Send,
{
    let _guard = locks.lock(&updater.mutex_key()).await;

    let mut policy = updater.get_resource_iam_policy().await?;
    debug!(bindings = policy.bindings.len(), "Fetched access bindings");

    modify(&mut policy)?;

    updater
        .set_resource_iam_policy(&policy)
        .await
        .map_err(|e| e.context(updater.describe_resource()))?;
    debug!(bindings = policy.bindings.len(), "Wrote access bindings");

    Ok(())
}

/// Like [`read_modify_write`], but writes incremental deltas.
///
/// `compute` derives the deltas from the live policy; an empty delta skips
/// the write.
#[instrument(skip_all, fields(resource = %updater.describe_resource()))]
pub async fn apply_policy_deltas<F>(
    locks: &MutexKv,
    updater: &dyn ResourceIamUpdater,
    compute: F,
) -> Result<()>
where
    F: FnOnce(&Policy) -> Result<PolicyDelta> + Send,
{
    let _guard = locks.lock(&updater.mutex_key()).await;

    let policy = updater.get_resource_iam_policy().await?;
    let delta = compute(&policy)?;
    if delta.is_empty() {
        debug!("No access binding changes to apply");
        return Ok(());
    }

    updater
        .update_resource_iam_policy(&delta)
        .await
        .map_err(|e| e.context(updater.describe_resource()))?;
    debug!(deltas = delta.deltas.len(), "Applied access binding deltas");

    Ok(())
}

/// Replace the policy under the resource's lock without fetching it first.
#[instrument(skip_all, fields(resource = %updater.describe_resource()))]
pub async fn replace_policy(
    locks: &MutexKv,
    updater: &dyn ResourceIamUpdater,
    policy: &Policy,
) -> Result<()> {
    let _guard = locks.lock(&updater.mutex_key()).await;
    updater
        .set_resource_iam_policy(policy)
        .await
        .map_err(|e| e.context(updater.describe_resource()))
}

/// Pause after a successful write when the resource asks for it.
pub async fn sleep_after(seconds: Option<u64>) {
    if let Some(seconds) = seconds.filter(|s| *s > 0) {
        debug!(seconds, "Sleeping after write");
        tokio::time::sleep(Duration::from_secs(seconds)).await;
    }
}

/// Rewrite a `NotFound` raised while creating or updating `what`.
pub(crate) fn bind_error(err: IamError, what: &str, updater: &dyn ResourceIamUpdater) -> IamError {
    if err.is_not_found() {
        IamError::NotFound(format!(
            "cannot bind {} to non-existent {}",
            what,
            updater.describe_resource()
        ))
    } else {
        err
    }
}
