//! The provider surface.
//!
//! [`IamProvider`] maps every `<prefix>_iam_policy`, `<prefix>_iam_binding`
//! and `<prefix>_iam_member` resource type onto the matching strategy.
//! State crosses this boundary as JSON keyed by the resource kind's parent
//! field (`folder_id`, `cloud_id`, ...) and is decoded into the typed
//! state structs of [`crate::policy`], [`crate::binding`] and
//! [`crate::member`].

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::binding::{self, BindingState};
use crate::client::{GrpcUpdaterFactory, ResourceKind};
use crate::config::IamConfig;
use crate::diff::policy_data_equivalent;
use crate::error::{IamError, Result};
use crate::member::{self, MemberState};
use crate::merge::parse_canonical_member;
use crate::mutex::MutexKv;
use crate::policy::{self, PolicyState};
use crate::schema::{
    iam_binding_schema, iam_member_schema, iam_policy_schema, Attribute, AttributeType,
    Diagnostic, ProviderSchema, Schema,
};
use crate::types::{AttributeChange, ImportedResource, PlanResult, Policy};
use crate::updater::{ResourceIamUpdater, UpdaterFactory};
use crate::validation::validate;

/// How much of a resource's access bindings a resource type owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    /// Every binding (`*_iam_policy`).
    Policy,
    /// Every member of one role (`*_iam_binding`).
    Binding,
    /// One member of one role (`*_iam_member`).
    Member,
}

impl Granularity {
    /// All granularities.
    pub const ALL: [Granularity; 3] = [Self::Policy, Self::Binding, Self::Member];

    /// Resource type suffix.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Policy => "_iam_policy",
            Self::Binding => "_iam_binding",
            Self::Member => "_iam_member",
        }
    }

    fn import_format(self) -> &'static str {
        match self {
            Self::Policy => "\"<resource-id>\"",
            Self::Binding => "\"<resource-id> <role>\"",
            Self::Member => "\"<resource-id> <role> <member>\"",
        }
    }
}

/// A resource type name resolved to its kind and granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IamResourceType {
    /// Kind of the resource carrying the bindings.
    pub kind: ResourceKind,
    /// Which part of the bindings the type owns.
    pub granularity: Granularity,
}

impl IamResourceType {
    /// Resolve a resource type name such as `yandex_resourcemanager_folder_iam_member`.
    pub fn parse(name: &str) -> Result<Self> {
        Granularity::ALL
            .iter()
            .find_map(|&granularity| {
                let prefix = name.strip_suffix(granularity.suffix())?;
                let kind = ResourceKind::ALL
                    .iter()
                    .copied()
                    .find(|k| k.type_prefix() == prefix)?;
                Some(Self { kind, granularity })
            })
            .ok_or_else(|| IamError::UnknownResource(name.to_string()))
    }

    /// The resource type name.
    pub fn name(&self) -> String {
        format!("{}{}", self.kind.type_prefix(), self.granularity.suffix())
    }

    /// Schema of this resource type.
    pub fn schema(&self) -> Schema {
        let parent = self.kind.parent_field();
        match self.granularity {
            Granularity::Policy => iam_policy_schema(parent),
            Granularity::Binding => iam_binding_schema(parent),
            Granularity::Member => iam_member_schema(parent),
        }
    }

    fn decode<T: DeserializeOwned>(&self, value: Value) -> Result<T> {
        if !value.is_object() {
            return Err(IamError::Validation(format!(
                "state of {} must be an object",
                self.name()
            )));
        }
        let value = rename_key(value, self.kind.parent_field(), "resource_id");
        Ok(serde_json::from_value(value)?)
    }

    fn encode<T: Serialize>(&self, state: &T) -> Result<Value> {
        let value = serde_json::to_value(state)?;
        Ok(rename_key(value, "resource_id", self.kind.parent_field()))
    }
}

fn rename_key(mut value: Value, from: &str, to: &str) -> Value {
    if let Value::Object(map) = &mut value {
        if let Some(v) = map.remove(from) {
            map.insert(to.to_string(), v);
        }
    }
    value
}

/// Routes resource operations to the reconciliation strategies.
///
/// Owns the lock table shared by every operation it runs.
pub struct IamProvider<F: UpdaterFactory> {
    factory: F,
    locks: MutexKv,
}

impl IamProvider<GrpcUpdaterFactory> {
    /// Build a provider talking to the control plane described by `config`.
    pub fn connect(config: &IamConfig) -> Result<Self> {
        Ok(Self::new(GrpcUpdaterFactory::connect(config)?))
    }

    /// Parse the provider block and connect.
    pub fn from_config(config: Value) -> Result<Self> {
        Self::connect(&IamConfig::from_value(config)?)
    }
}

impl<F: UpdaterFactory> IamProvider<F> {
    /// Create a provider over `factory`.
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            locks: MutexKv::new(),
        }
    }

    /// The updater factory.
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// The lock table.
    pub fn locks(&self) -> &MutexKv {
        &self.locks
    }

    /// Every resource type served, sorted.
    pub fn resource_types(&self) -> Vec<String> {
        let mut names: Vec<String> = all_resource_types().map(|t| t.name()).collect();
        names.sort();
        names
    }

    /// Schemas of the provider block and every resource type.
    pub fn schema(&self) -> ProviderSchema {
        all_resource_types().fold(
            ProviderSchema::new().with_provider_config(IamConfig::schema()),
            |schema, ty| schema.with_resource(ty.name(), ty.schema()),
        )
    }

    /// Validate a resource configuration without touching the backend.
    pub fn validate_resource_config(
        &self,
        resource_type: &str,
        config: &Value,
    ) -> Result<Vec<Diagnostic>> {
        let ty = IamResourceType::parse(resource_type)?;
        Ok(validate(&ty.schema(), config))
    }

    /// Compute the changes between `prior` and `proposed`.
    ///
    /// `None` prior plans a create, a `null` proposal plans a delete.
    pub fn plan(
        &self,
        resource_type: &str,
        prior: Option<Value>,
        proposed: Value,
    ) -> Result<PlanResult> {
        let ty = IamResourceType::parse(resource_type)?;
        let schema = ty.schema();
        let mut names: Vec<&String> = schema.attributes.keys().collect();
        names.sort();

        let prior = match prior {
            None => {
                let changes = names
                    .iter()
                    .filter_map(|name| {
                        present(proposed.get(name.as_str()))
                            .map(|v| AttributeChange::new(name.as_str(), None, Some(v.clone())))
                    })
                    .collect();
                return Ok(PlanResult::with_changes(proposed, changes, false));
            },
            Some(prior) if proposed.is_null() => {
                let changes = names
                    .iter()
                    .filter_map(|name| {
                        present(prior.get(name.as_str()))
                            .map(|v| AttributeChange::new(name.as_str(), Some(v.clone()), None))
                    })
                    .collect();
                return Ok(PlanResult::with_changes(Value::Null, changes, false));
            },
            Some(prior) => prior,
        };

        let mut planned = proposed.clone();
        let Value::Object(planned_map) = &mut planned else {
            return Err(IamError::Validation(format!(
                "state of {} must be an object",
                ty.name()
            )));
        };

        let mut changes = Vec::new();
        let mut requires_replace = false;
        for name in names {
            let attr = &schema.attributes[name];
            let before = present(prior.get(name.as_str()));
            let after = present(proposed.get(name.as_str()));

            if attr.flags.is_computed_only() || attribute_unchanged(name, attr, before, after) {
                // Carry the prior value so suppressed differences stay out of state.
                if let Some(v) = before {
                    planned_map.insert(name.clone(), v.clone());
                }
                continue;
            }

            requires_replace |= attr.force_new;
            changes.push(AttributeChange::new(
                name.as_str(),
                before.cloned(),
                after.cloned(),
            ));
        }

        if changes.is_empty() {
            Ok(PlanResult::no_change(planned))
        } else {
            debug!(resource_type, changes = changes.len(), requires_replace, "Planned changes");
            Ok(PlanResult::with_changes(planned, changes, requires_replace))
        }
    }

    fn updater(&self, kind: ResourceKind, resource_id: &str) -> Arc<dyn ResourceIamUpdater> {
        self.factory.updater(kind, resource_id)
    }

    fn check(&self, ty: &IamResourceType, value: &Value) -> Result<()> {
        let errors: Vec<String> = validate(&ty.schema(), value)
            .into_iter()
            .filter(Diagnostic::is_error)
            .map(|d| match d.attribute {
                Some(attr) => format!("{}: {}", attr, d.summary),
                None => d.summary,
            })
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(IamError::Validation(errors.join("; ")))
        }
    }

    /// Create the resource and return its state.
    #[instrument(skip_all, fields(resource_type = %resource_type))]
    pub async fn create(&self, resource_type: &str, planned: Value) -> Result<Value> {
        let ty = IamResourceType::parse(resource_type)?;
        self.check(&ty, &planned)?;

        match ty.granularity {
            Granularity::Policy => {
                let declared: PolicyState = ty.decode(planned)?;
                let updater = self.updater(ty.kind, &declared.resource_id);
                ty.encode(&policy::create(&self.locks, updater.as_ref(), &declared).await?)
            },
            Granularity::Binding => {
                let declared: BindingState = ty.decode(planned)?;
                let updater = self.updater(ty.kind, &declared.resource_id);
                ty.encode(&binding::create(&self.locks, updater.as_ref(), &declared).await?)
            },
            Granularity::Member => {
                let declared: MemberState = ty.decode(planned)?;
                let updater = self.updater(ty.kind, &declared.resource_id);
                ty.encode(&member::create(&self.locks, updater.as_ref(), &declared).await?)
            },
        }
    }

    /// Refresh the resource's state.
    ///
    /// Returns `Value::Null` when the resource should be dropped from state.
    #[instrument(skip_all, fields(resource_type = %resource_type))]
    pub async fn read(&self, resource_type: &str, current: Value) -> Result<Value> {
        let ty = IamResourceType::parse(resource_type)?;

        let refreshed = match ty.granularity {
            Granularity::Policy => {
                let state: PolicyState = ty.decode(current)?;
                let updater = self.updater(ty.kind, &state.resource_id);
                policy::read(updater.as_ref(), &state)
                    .await?
                    .map(|s| ty.encode(&s))
            },
            Granularity::Binding => {
                let state: BindingState = ty.decode(current)?;
                let updater = self.updater(ty.kind, &state.resource_id);
                binding::read(updater.as_ref(), &state)
                    .await?
                    .map(|s| ty.encode(&s))
            },
            Granularity::Member => {
                let state: MemberState = ty.decode(current)?;
                let updater = self.updater(ty.kind, &state.resource_id);
                member::read(updater.as_ref(), &state)
                    .await?
                    .map(|s| ty.encode(&s))
            },
        };
        Ok(refreshed.transpose()?.unwrap_or(Value::Null))
    }

    /// Apply an in-place update.
    ///
    /// Changes to force-new attributes must be planned as a replacement and
    /// are rejected here.
    #[instrument(skip_all, fields(resource_type = %resource_type))]
    pub async fn update(&self, resource_type: &str, prior: Value, planned: Value) -> Result<Value> {
        let ty = IamResourceType::parse(resource_type)?;
        self.check(&ty, &planned)?;

        match ty.granularity {
            Granularity::Policy => {
                let prior: PolicyState = ty.decode(prior)?;
                let planned: PolicyState = ty.decode(planned)?;
                require_same(&ty, &prior.resource_id, &planned.resource_id)?;
                let updater = self.updater(ty.kind, &planned.resource_id);
                ty.encode(&policy::update(&self.locks, updater.as_ref(), &prior, &planned).await?)
            },
            Granularity::Binding => {
                let prior: BindingState = ty.decode(prior)?;
                let planned: BindingState = ty.decode(planned)?;
                require_same(&ty, &prior.binding_id(), &planned.binding_id())?;
                let updater = self.updater(ty.kind, &planned.resource_id);
                ty.encode(&binding::update(&self.locks, updater.as_ref(), &planned).await?)
            },
            Granularity::Member => {
                // Only `sleep_after` can change in place; nothing to write.
                let prior: MemberState = ty.decode(prior)?;
                let planned: MemberState = ty.decode(planned)?;
                require_same(&ty, &prior.member_id(), &planned.member_id())?;
                ty.encode(&MemberState {
                    id: Some(planned.member_id()),
                    ..planned
                })
            },
        }
    }

    /// Remove what the resource owns.
    #[instrument(skip_all, fields(resource_type = %resource_type))]
    pub async fn delete(&self, resource_type: &str, current: Value) -> Result<()> {
        let ty = IamResourceType::parse(resource_type)?;

        match ty.granularity {
            Granularity::Policy => {
                let state: PolicyState = ty.decode(current)?;
                let updater = self.updater(ty.kind, &state.resource_id);
                policy::delete(&self.locks, updater.as_ref()).await
            },
            Granularity::Binding => {
                let state: BindingState = ty.decode(current)?;
                let updater = self.updater(ty.kind, &state.resource_id);
                binding::delete(&self.locks, updater.as_ref(), &state).await
            },
            Granularity::Member => {
                let state: MemberState = ty.decode(current)?;
                let updater = self.updater(ty.kind, &state.resource_id);
                member::delete(&self.locks, updater.as_ref(), &state).await
            },
        }
    }

    /// Import existing bindings.
    ///
    /// `id` is `<resource-id>`, `<resource-id> <role>` or
    /// `<resource-id> <role> <member>` depending on the resource type. The
    /// resource id may also be given as `<collection>/<id>`.
    #[instrument(skip_all, fields(resource_type = %resource_type, id = %id))]
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>> {
        let ty = IamResourceType::parse(resource_type)?;
        let parts: Vec<&str> = id.split_whitespace().collect();
        let expected = match ty.granularity {
            Granularity::Policy => 1,
            Granularity::Binding => 2,
            Granularity::Member => 3,
        };
        if parts.len() != expected {
            return Err(IamError::Validation(format!(
                "unexpected import id {:?} for {}; expected {}",
                id,
                ty.name(),
                ty.granularity.import_format()
            )));
        }

        let resource_id = ty.kind.parse_resource_id(parts[0])?;
        let updater = self.updater(ty.kind, &resource_id);
        let state = match ty.granularity {
            Granularity::Policy => {
                let seed = PolicyState {
                    resource_id,
                    policy_data: Policy::empty().to_json()?,
                    id: None,
                };
                policy::read(updater.as_ref(), &seed)
                    .await?
                    .map(|s| ty.encode(&s))
            },
            Granularity::Binding => {
                let seed = BindingState {
                    resource_id,
                    role: parts[1].to_string(),
                    members: Vec::new(),
                    sleep_after: None,
                    id: None,
                };
                binding::read(updater.as_ref(), &seed)
                    .await?
                    .map(|s| ty.encode(&s))
            },
            Granularity::Member => {
                parse_canonical_member(parts[2])?;
                let seed = MemberState {
                    resource_id,
                    role: parts[1].to_string(),
                    member: parts[2].to_string(),
                    sleep_after: None,
                    id: None,
                };
                member::read(updater.as_ref(), &seed)
                    .await?
                    .map(|s| ty.encode(&s))
            },
        };

        match state.transpose()? {
            Some(state) => Ok(vec![ImportedResource::new(ty.name(), state)]),
            None => Err(IamError::NotFound(format!(
                "cannot import {:?}: nothing found on {}",
                id,
                updater.describe_resource()
            ))),
        }
    }
}

fn all_resource_types() -> impl Iterator<Item = IamResourceType> {
    ResourceKind::ALL.into_iter().flat_map(|kind| {
        Granularity::ALL
            .into_iter()
            .map(move |granularity| IamResourceType { kind, granularity })
    })
}

fn require_same(ty: &IamResourceType, prior: &str, planned: &str) -> Result<()> {
    if prior == planned {
        Ok(())
    } else {
        Err(IamError::FailedPrecondition(format!(
            "{} {:?} cannot become {:?} in place; it must be replaced",
            ty.name(),
            prior,
            planned
        )))
    }
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn attribute_unchanged(
    name: &str,
    attr: &Attribute,
    before: Option<&Value>,
    after: Option<&Value>,
) -> bool {
    let (before, after) = match (before, after) {
        (None, None) => return true,
        (Some(before), Some(after)) => (before, after),
        _ => return false,
    };

    if name == "policy_data" {
        if let (Some(before), Some(after)) = (before.as_str(), after.as_str()) {
            return policy_data_equivalent(before, after);
        }
    }
    match (&attr.attr_type, before, after) {
        (AttributeType::Set(_), Value::Array(before), Value::Array(after)) => {
            let before: BTreeSet<String> = before.iter().map(Value::to_string).collect();
            let after: BTreeSet<String> = after.iter().map(Value::to_string).collect();
            before == after
        },
        _ => before == after,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        assert_error_contains, assert_no_errors, assert_plan_changes_attribute,
        assert_plan_has_changes, assert_plan_no_changes, assert_plan_replaces,
        assert_plan_updates_in_place, service_account, user, InMemoryIamBackend, ProviderTester,
    };
    use crate::types::AccessBinding;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    const FOLDER_POLICY: &str = "yandex_resourcemanager_folder_iam_policy";
    const FOLDER_BINDING: &str = "yandex_resourcemanager_folder_iam_binding";
    const FOLDER_MEMBER: &str = "yandex_resourcemanager_folder_iam_member";

    fn tester() -> (InMemoryIamBackend, ProviderTester<InMemoryIamBackend>) {
        let backend = InMemoryIamBackend::new();
        backend.insert_resource(
            ResourceKind::Folder,
            "b1g",
            vec![AccessBinding::new("admin", user("root"))],
        );
        (backend.clone(), ProviderTester::new(backend))
    }

    fn policy_doc(bindings: Vec<AccessBinding>) -> String {
        Policy::new(bindings).to_json().unwrap()
    }

    #[test]
    fn test_resource_type_parsing() {
        let ty = IamResourceType::parse("yandex_kms_symmetric_key_iam_binding").unwrap();
        assert_eq!(ty.kind, ResourceKind::KmsSymmetricKey);
        assert_eq!(ty.granularity, Granularity::Binding);
        assert_eq!(ty.name(), "yandex_kms_symmetric_key_iam_binding");

        let err = IamResourceType::parse("yandex_compute_instance_iam_member").unwrap_err();
        assert!(matches!(err, IamError::UnknownResource(_)));
    }

    #[test]
    fn test_schema_covers_every_type() {
        let (_, tester) = tester();
        let schema = tester.schema();
        assert_eq!(schema.resources.len(), ResourceKind::ALL.len() * 3);
        assert!(schema.resources[FOLDER_MEMBER]
            .attributes
            .contains_key("folder_id"));
        assert!(schema.resources["yandex_iam_service_account_iam_binding"]
            .attributes
            .contains_key("service_account_id"));
        assert!(schema.provider.attributes.contains_key("endpoint"));
    }

    #[test]
    fn test_validate_resource_config() {
        let (_, tester) = tester();
        let diagnostics = tester
            .provider()
            .validate_resource_config(
                FOLDER_MEMBER,
                &json!({"folder_id": "b1g", "role": "viewer", "member": "bob"}),
            )
            .unwrap();
        assert_error_contains(&diagnostics, "Invalid member");

        let diagnostics = tester
            .provider()
            .validate_resource_config(
                FOLDER_BINDING,
                &json!({"folder_id": "b1g", "role": "viewer", "members": ["userAccount:a"]}),
            )
            .unwrap();
        assert_no_errors(&diagnostics);

        assert!(tester
            .validate_resource_config(FOLDER_POLICY, json!({"folder_id": "b1g"}))
            .is_err());
    }

    #[test]
    fn test_plan_create_and_delete() {
        let (_, tester) = tester();
        let config = json!({"folder_id": "b1g", "role": "viewer", "member": "userAccount:a"});

        let plan = tester.plan_create(FOLDER_MEMBER, config.clone()).unwrap();
        assert_plan_has_changes(&plan);
        assert_plan_updates_in_place(&plan);
        assert_plan_changes_attribute(&plan, "member");

        let plan = tester.plan_delete(FOLDER_MEMBER, config).unwrap();
        assert_plan_changes_attribute(&plan, "role");
        assert!(plan.planned_state.is_null());
    }

    #[test]
    fn test_plan_suppresses_equivalent_policy_data() {
        let (_, tester) = tester();
        let a = AccessBinding::new("viewer", user("a"));
        let b = AccessBinding::new("editor", user("b"));
        let prior = json!({
            "folder_id": "b1g",
            "policy_data": policy_doc(vec![a.clone(), b.clone()]),
            "id": "b1g",
        });
        let proposed = json!({
            "folder_id": "b1g",
            "policy_data": policy_doc(vec![b, a.clone(), a.clone()]),
        });

        let plan = tester
            .plan_update(FOLDER_POLICY, prior.clone(), proposed)
            .unwrap();
        assert_plan_no_changes(&plan);
        assert_eq!(plan.planned_state["policy_data"], prior["policy_data"]);
        assert_eq!(plan.planned_state["id"], "b1g");

        let changed = json!({"folder_id": "b1g", "policy_data": policy_doc(vec![a])});
        let plan = tester.plan_update(FOLDER_POLICY, prior, changed).unwrap();
        assert_plan_changes_attribute(&plan, "policy_data");
        assert_plan_updates_in_place(&plan);
    }

    #[test]
    fn test_plan_members_is_a_set() {
        let (_, tester) = tester();
        let prior = json!({
            "folder_id": "b1g",
            "role": "viewer",
            "members": ["userAccount:a", "userAccount:b"],
            "id": "b1g/viewer",
        });
        let proposed = json!({
            "folder_id": "b1g",
            "role": "viewer",
            "members": ["userAccount:b", "userAccount:a"],
        });
        assert_plan_no_changes(&tester.plan_update(FOLDER_BINDING, prior.clone(), proposed).unwrap());

        let new_role = json!({
            "folder_id": "b1g",
            "role": "editor",
            "members": ["userAccount:a", "userAccount:b"],
        });
        let plan = tester.plan_update(FOLDER_BINDING, prior, new_role).unwrap();
        assert_plan_replaces(&plan);
    }

    #[tokio::test]
    async fn test_policy_lifecycle() {
        let (backend, tester) = tester();
        let wanted = vec![AccessBinding::new("viewer", service_account("robot"))];

        let state = assert_ok!(
            tester
                .lifecycle_create(
                    FOLDER_POLICY,
                    json!({"folder_id": "b1g", "policy_data": policy_doc(wanted.clone())}),
                )
                .await
        );
        assert_eq!(state["id"], "b1g");
        assert_eq!(state["folder_id"], "b1g");
        assert_eq!(backend.bindings(ResourceKind::Folder, "b1g"), wanted);

        assert_ok!(tester.delete(FOLDER_POLICY, state).await);
        assert!(backend.bindings(ResourceKind::Folder, "b1g").is_empty());
    }

    #[tokio::test]
    async fn test_binding_lifecycle() {
        let (backend, tester) = tester();

        let state = assert_ok!(
            tester
                .lifecycle_crud(
                    FOLDER_BINDING,
                    json!({"folder_id": "b1g", "role": "viewer", "members": ["userAccount:a", "userAccount:b"]}),
                    json!({"folder_id": "b1g", "role": "viewer", "members": ["userAccount:b"]}),
                )
                .await
        );
        assert_eq!(state["members"], json!(["userAccount:b"]));
        assert_eq!(state["id"], "b1g/viewer");

        assert_eq!(
            backend.bindings(ResourceKind::Folder, "b1g"),
            vec![AccessBinding::new("admin", user("root"))]
        );
    }

    #[tokio::test]
    async fn test_member_lifecycle_on_service_account() {
        let backend = InMemoryIamBackend::new();
        backend.insert_resource(ResourceKind::ServiceAccount, "aje9", vec![]);
        let tester = ProviderTester::new(backend.clone());
        let resource_type = "yandex_iam_service_account_iam_member";

        let state = assert_ok!(
            tester
                .lifecycle_create(
                    resource_type,
                    json!({"service_account_id": "aje9", "role": "editor", "member": "userAccount:a"}),
                )
                .await
        );
        assert_eq!(state["id"], "aje9/editor/userAccount:a");
        assert_eq!(state["service_account_id"], "aje9");

        let mut slower = state.clone();
        slower["sleep_after"] = json!(0);
        let updated = assert_ok!(tester.update(resource_type, state.clone(), slower).await);
        assert_eq!(updated["id"], state["id"]);
        assert_eq!(backend.set_calls(), 1);

        assert_ok!(tester.delete(resource_type, updated).await);
        assert!(backend
            .bindings(ResourceKind::ServiceAccount, "aje9")
            .is_empty());
    }

    #[tokio::test]
    async fn test_member_update_cannot_change_identity() {
        let (_, tester) = tester();
        let prior = json!({"folder_id": "b1g", "role": "viewer", "member": "userAccount:a", "id": "b1g/viewer/userAccount:a"});
        let planned = json!({"folder_id": "b1g", "role": "viewer", "member": "userAccount:b"});
        let err = assert_err!(tester.update(FOLDER_MEMBER, prior, planned).await);
        assert!(matches!(err, IamError::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn test_read_returns_null_when_state_cleared() {
        let (backend, tester) = tester();
        let state = json!({"folder_id": "b1g", "role": "viewer", "member": "userAccount:a", "id": "b1g/viewer/userAccount:a"});
        assert_eq!(tester.read(FOLDER_MEMBER, state.clone()).await.unwrap(), Value::Null);

        backend.remove_resource(ResourceKind::Folder, "b1g");
        let policy_state = json!({"folder_id": "b1g", "policy_data": "{}", "id": "b1g"});
        assert_eq!(tester.read(FOLDER_POLICY, policy_state).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_create_validates_before_backend() {
        let (backend, tester) = tester();
        let err = assert_err!(
            tester
                .create(
                    FOLDER_BINDING,
                    json!({"folder_id": "b1g", "role": "viewer", "members": ["nobody"]}),
                )
                .await
        );
        assert!(matches!(err, IamError::Validation(ref m) if m.contains("members.0")));
        assert_eq!(backend.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_import() {
        let (backend, tester) = tester();
        backend.insert_resource(
            ResourceKind::Folder,
            "b1g",
            vec![
                AccessBinding::new("viewer", user("a")),
                AccessBinding::new("viewer", user("b")),
            ],
        );

        let imported = assert_ok!(tester.import_resource(FOLDER_BINDING, "folders/b1g viewer").await);
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].resource_type, FOLDER_BINDING);
        assert_eq!(
            imported[0].state["members"],
            json!(["userAccount:a", "userAccount:b"])
        );

        let imported = assert_ok!(
            tester
                .import_resource(FOLDER_MEMBER, "b1g viewer userAccount:a")
                .await
        );
        assert_eq!(imported[0].state["id"], "b1g/viewer/userAccount:a");

        let imported = assert_ok!(tester.import_resource(FOLDER_POLICY, "b1g").await);
        let policy = Policy::from_json(imported[0].state["policy_data"].as_str().unwrap()).unwrap();
        assert_eq!(policy.bindings.len(), 2);

        let err = assert_err!(
            tester
                .import_resource(FOLDER_MEMBER, "b1g viewer userAccount:zzz")
                .await
        );
        assert!(err.is_not_found());

        let err = assert_err!(tester.import_resource(FOLDER_MEMBER, "b1g viewer").await);
        assert!(matches!(err, IamError::Validation(_)));

        let err = assert_err!(tester.import_resource(FOLDER_BINDING, "clouds/b1g viewer").await);
        assert!(matches!(err, IamError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let (_, tester) = tester();
        let err = assert_err!(tester.read("yandex_unknown_iam_member", json!({})).await);
        assert!(matches!(err, IamError::UnknownResource(_)));
    }
}
