//! Testing utilities for the IAM engine.
//!
//! [`InMemoryIamBackend`] stands in for the control plane: it implements
//! [`UpdaterFactory`] and keeps every resource's bindings in memory, with
//! call counters and one-shot failure injection. [`ProviderTester`] drives
//! an [`IamProvider`] through whole resource lifecycles.
//!
//! # Example
//!
//! ```
//! use hemmer_iam::client::ResourceKind;
//! use hemmer_iam::testing::{user, InMemoryIamBackend, ProviderTester};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let backend = InMemoryIamBackend::new();
//! backend.insert_resource(ResourceKind::Folder, "b1g", vec![]);
//!
//! let tester = ProviderTester::new(backend.clone());
//! let state = tester
//!     .lifecycle_create(
//!         "yandex_resourcemanager_folder_iam_member",
//!         json!({"folder_id": "b1g", "role": "viewer", "member": "userAccount:alice"}),
//!     )
//!     .await
//!     .unwrap();
//!
//! assert_eq!(state["id"], "b1g/viewer/userAccount:alice");
//! assert_eq!(backend.bindings(ResourceKind::Folder, "b1g").len(), 1);
//! # });
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::client::{fetch_all_pages, ResourceKind};
use crate::error::{IamError, Result};
use crate::generated;
use crate::provider::IamProvider;
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::types::{
    AccessBinding, AccessBindingAction, ImportedResource, PlanResult, Policy, PolicyDelta, Subject,
};
use crate::updater::{mutex_key, ResourceIamUpdater, UpdaterFactory};

/// A `userAccount` subject.
pub fn user(id: &str) -> Subject {
    Subject::new("userAccount", id)
}

/// A `serviceAccount` subject.
pub fn service_account(id: &str) -> Subject {
    Subject::new("serviceAccount", id)
}

#[derive(Default)]
struct BackendState {
    resources: HashMap<(ResourceKind, String), Vec<AccessBinding>>,
    fail_next_read: Option<IamError>,
    fail_next_write: Option<IamError>,
}

#[derive(Default)]
struct Counters {
    get: AtomicUsize,
    set: AtomicUsize,
    update: AtomicUsize,
    pages: AtomicUsize,
}

/// In-memory control plane.
///
/// Clones share the same resources and counters.
#[derive(Clone)]
pub struct InMemoryIamBackend {
    state: Arc<Mutex<BackendState>>,
    counters: Arc<Counters>,
    delta_updates: bool,
    yield_between_calls: bool,
    page_size: usize,
}

impl Default for InMemoryIamBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryIamBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryIamBackend")
            .field("delta_updates", &self.delta_updates)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl InMemoryIamBackend {
    /// An empty backend. Resources must be inserted before use.
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            counters: Arc::default(),
            delta_updates: false,
            yield_between_calls: false,
            page_size: 100,
        }
    }

    /// Offer `UpdateAccessBindings` on every resource.
    pub fn with_delta_updates(mut self) -> Self {
        self.delta_updates = true;
        self
    }

    /// Yield to the scheduler inside every call so concurrent callers interleave.
    pub fn with_yield_between_calls(mut self) -> Self {
        self.yield_between_calls = true;
        self
    }

    /// Number of bindings returned per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn state(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create (or overwrite) a resource with the given bindings.
    pub fn insert_resource(&self, kind: ResourceKind, id: &str, bindings: Vec<AccessBinding>) {
        self.state().resources.insert((kind, id.to_string()), bindings);
    }

    /// Delete a resource; later calls against it report `NotFound`.
    pub fn remove_resource(&self, kind: ResourceKind, id: &str) {
        self.state().resources.remove(&(kind, id.to_string()));
    }

    /// Current bindings of a resource, empty if it does not exist.
    pub fn bindings(&self, kind: ResourceKind, id: &str) -> Vec<AccessBinding> {
        self.state()
            .resources
            .get(&(kind, id.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Make the next fetch fail with `err`.
    pub fn fail_next_read(&self, err: IamError) {
        self.state().fail_next_read = Some(err);
    }

    /// Make the next set or update fail with `err`.
    pub fn fail_next_write(&self, err: IamError) {
        self.state().fail_next_write = Some(err);
    }

    /// Number of policy fetches so far.
    pub fn get_calls(&self) -> usize {
        self.counters.get.load(Ordering::SeqCst)
    }

    /// Number of full policy writes so far.
    pub fn set_calls(&self) -> usize {
        self.counters.set.load(Ordering::SeqCst)
    }

    /// Number of delta writes so far.
    pub fn update_calls(&self) -> usize {
        self.counters.update.load(Ordering::SeqCst)
    }

    /// Number of listing pages served so far.
    pub fn list_pages(&self) -> usize {
        self.counters.pages.load(Ordering::SeqCst)
    }

    fn list_page(
        &self,
        kind: ResourceKind,
        id: &str,
        page_token: &str,
    ) -> Result<generated::ListAccessBindingsResponse> {
        self.counters.pages.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        let bindings = state
            .resources
            .get(&(kind, id.to_string()))
            .ok_or_else(|| IamError::NotFound(format!("{} not found", kind.describe(id))))?;

        let offset = if page_token.is_empty() {
            0
        } else {
            page_token
                .parse::<usize>()
                .map_err(|_| IamError::InvalidArgument(format!("bad page token {:?}", page_token)))?
        };
        let end = (offset + self.page_size).min(bindings.len());
        let next_page_token = if end < bindings.len() {
            end.to_string()
        } else {
            String::new()
        };
        Ok(generated::ListAccessBindingsResponse {
            access_bindings: bindings[offset.min(end)..end]
                .iter()
                .cloned()
                .map(Into::into)
                .collect(),
            next_page_token,
        })
    }
}

impl UpdaterFactory for InMemoryIamBackend {
    fn updater(&self, kind: ResourceKind, resource_id: &str) -> Arc<dyn ResourceIamUpdater> {
        Arc::new(InMemoryUpdater {
            backend: self.clone(),
            kind,
            resource_id: resource_id.to_string(),
        })
    }
}

struct InMemoryUpdater {
    backend: InMemoryIamBackend,
    kind: ResourceKind,
    resource_id: String,
}

impl InMemoryUpdater {
    async fn pause(&self) {
        if self.backend.yield_between_calls {
            tokio::task::yield_now().await;
        }
    }

    fn take_write_failure(&self) -> Result<()> {
        match self.backend.state().fail_next_write.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn with_bindings<T>(&self, f: impl FnOnce(&mut Vec<AccessBinding>) -> T) -> Result<T> {
        let mut state = self.backend.state();
        let bindings = state
            .resources
            .get_mut(&(self.kind, self.resource_id.clone()))
            .ok_or_else(|| IamError::NotFound(format!("{} not found", self.describe_resource())))?;
        Ok(f(bindings))
    }
}

#[async_trait::async_trait]
impl ResourceIamUpdater for InMemoryUpdater {
    async fn get_resource_iam_policy(&self) -> Result<Policy> {
        self.backend.counters.get.fetch_add(1, Ordering::SeqCst);
        let injected = self.backend.state().fail_next_read.take();
        if let Some(err) = injected {
            return Err(err);
        }

        let bindings = fetch_all_pages(|token| {
            let page = self.backend.list_page(self.kind, &self.resource_id, &token);
            async move { page }
        })
        .await?;
        self.pause().await;
        Ok(Policy::new(bindings))
    }

    async fn set_resource_iam_policy(&self, policy: &Policy) -> Result<()> {
        self.backend.counters.set.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.take_write_failure()?;
        self.with_bindings(|bindings| *bindings = policy.bindings.clone())
    }

    async fn update_resource_iam_policy(&self, delta: &PolicyDelta) -> Result<()> {
        if !self.backend.delta_updates {
            return Err(IamError::Unimplemented(format!(
                "incremental access binding updates are not supported for {}",
                self.describe_resource()
            )));
        }
        self.backend.counters.update.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.take_write_failure()?;
        self.with_bindings(|bindings| {
            for d in &delta.deltas {
                let existing = bindings.iter().position(|b| *b == d.access_binding);
                match (d.action, existing) {
                    (AccessBindingAction::Add, None) => bindings.push(d.access_binding.clone()),
                    (AccessBindingAction::Remove, Some(i)) => {
                        bindings.remove(i);
                    },
                    _ => {},
                }
            }
        })
    }

    fn supports_delta_updates(&self) -> bool {
        self.backend.delta_updates
    }

    fn mutex_key(&self) -> String {
        mutex_key(self.kind.slug(), &self.resource_id)
    }

    fn resource_id(&self) -> String {
        self.resource_id.clone()
    }

    fn describe_resource(&self) -> String {
        self.kind.describe(&self.resource_id)
    }
}

/// A test harness around [`IamProvider`].
///
/// # Example
///
/// ```
/// use hemmer_iam::testing::{InMemoryIamBackend, ProviderTester};
///
/// let tester = ProviderTester::new(InMemoryIamBackend::new());
/// assert!(tester
///     .resource_types()
///     .contains(&"yandex_resourcemanager_folder_iam_binding".to_string()));
/// ```
pub struct ProviderTester<F: UpdaterFactory> {
    provider: IamProvider<F>,
}

impl<F: UpdaterFactory> ProviderTester<F> {
    /// Create a tester over a provider built from `factory`.
    pub fn new(factory: F) -> Self {
        Self {
            provider: IamProvider::new(factory),
        }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &IamProvider<F> {
        &self.provider
    }

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.resource_types()
    }

    /// Validate a resource configuration.
    pub fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_resource_config(resource_type, &config)?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub fn plan_create(&self, resource_type: &str, proposed_state: Value) -> Result<PlanResult> {
        self.provider.plan(resource_type, None, proposed_state)
    }

    /// Plan a resource update.
    pub fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult> {
        self.provider
            .plan(resource_type, Some(prior_state), proposed_state)
    }

    /// Plan a resource deletion.
    pub fn plan_delete(&self, resource_type: &str, prior_state: Value) -> Result<PlanResult> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null)
    }

    /// Create a new resource.
    pub async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read the current state of a resource.
    pub async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(&self, resource_type: &str, current_state: Value) -> Result<()> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Run a full create lifecycle: plan → create → read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_create(&self, resource_type: &str, config: Value) -> Result<Value> {
        let plan = self.plan_create(resource_type, config)?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read(resource_type, created).await
    }

    /// Run a full update lifecycle: plan → update → read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value> {
        let plan = self.plan_update(resource_type, prior_state.clone(), proposed_state)?;
        let updated = self
            .update(resource_type, prior_state, plan.planned_state)
            .await?;
        self.read(resource_type, updated).await
    }

    /// Run a full CRUD lifecycle: create → read → update → read → delete.
    ///
    /// Returns the state after the update (before delete).
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value> {
        let created = self.lifecycle_create(resource_type, initial_config).await?;
        let updated = self
            .lifecycle_update(resource_type, created, updated_config)
            .await?;
        self.plan_delete(resource_type, updated.clone())?;
        self.delete(resource_type, updated.clone()).await?;
        Ok(updated)
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with an engine error.
    Iam(IamError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Iam(e) => write!(f, "IAM error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<IamError> for TestError {
    fn from(e: IamError) -> Self {
        TestError::Iam(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

/// Assert that a plan result indicates no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan result indicates changes are needed.
///
/// # Panics
///
/// Panics if the plan has no changes.
pub fn assert_plan_has_changes(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes, but got no changes"
    );
}

/// Assert that a plan requires resource replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan does not require resource replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it requires replacement"
    );
}

/// Assert that a plan has a change for a specific attribute path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "Expected plan to change attribute '{}', but it was not changed. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();
    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain an error with the given summary substring.
///
/// # Panics
///
/// Panics if no error diagnostic contains the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error) && d.summary.contains(substring));

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}
