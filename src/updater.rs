//! The per-resource capability interface.
//!
//! Every resource kind that carries access bindings provides one
//! [`ResourceIamUpdater`]. The orchestrator in [`crate::iam`] and the three
//! strategies are written against this trait only; they never know which
//! kind of resource they are reconciling.

use std::sync::Arc;

use crate::client::ResourceKind;
use crate::error::{IamError, Result};
use crate::types::{Policy, PolicyDelta};

/// Fetch and write access bindings of one concrete resource.
///
/// `get`, `set` and `update` perform network calls and may block for the
/// duration of the call's timeout. `set` and `update` return only after the
/// backend operation they start has finished.
#[async_trait::async_trait]
pub trait ResourceIamUpdater: Send + Sync {
    /// Fetch every binding on the resource.
    ///
    /// Returns [`IamError::NotFound`] if the resource no longer exists.
    async fn get_resource_iam_policy(&self) -> Result<Policy>;

    /// Replace every binding on the resource with `policy`.
    async fn set_resource_iam_policy(&self, policy: &Policy) -> Result<()>;

    /// Apply incremental deltas, batched by the implementation.
    ///
    /// Only resource kinds whose backend offers `UpdateAccessBindings`
    /// implement this; check [`supports_delta_updates`] first.
    ///
    /// [`supports_delta_updates`]: ResourceIamUpdater::supports_delta_updates
    async fn update_resource_iam_policy(&self, delta: &PolicyDelta) -> Result<()> {
        let _ = delta;
        Err(IamError::Unimplemented(format!(
            "incremental access binding updates are not supported for {}",
            self.describe_resource()
        )))
    }

    /// Whether [`update_resource_iam_policy`] is available.
    ///
    /// [`update_resource_iam_policy`]: ResourceIamUpdater::update_resource_iam_policy
    fn supports_delta_updates(&self) -> bool {
        false
    }

    /// Lock name scoping read-modify-write cycles on this resource.
    fn mutex_key(&self) -> String;

    /// Identifier of the resource the bindings belong to.
    fn resource_id(&self) -> String;

    /// Human-readable description used in errors and logs.
    fn describe_resource(&self) -> String;
}

/// Builds updaters for a resource kind and id.
///
/// The provider holds one factory and asks it for an updater per call.
pub trait UpdaterFactory: Send + Sync {
    /// An updater for `resource_id` of kind `kind`.
    fn updater(&self, kind: ResourceKind, resource_id: &str) -> Arc<dyn ResourceIamUpdater>;
}

/// Lock name for a resource: `iam-{kind}-{id}`.
pub fn mutex_key(kind: &str, resource_id: &str) -> String {
    format!("iam-{}-{}", kind, resource_id)
}
