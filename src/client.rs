//! gRPC access to the access-binding APIs.
//!
//! Every resource kind exposes the same three RPCs on its own service, so
//! a single [`AccessBindingsClient`] dispatches by method path instead of
//! carrying thirty generated stubs. [`ResourceKind`] is the catalog of
//! kinds, and [`GrpcIamUpdater`] is the production [`ResourceIamUpdater`].

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::AsciiMetadataValue;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, instrument};

use crate::config::IamConfig;
use crate::error::{IamError, Result};
use crate::generated;
use crate::operation::{OperationPoller, OperationWaiter};
use crate::types::{AccessBinding, Policy, PolicyDelta};
use crate::updater::{mutex_key, ResourceIamUpdater, UpdaterFactory};

const OPERATION_SERVICE: &str = "yandex.cloud.operation.OperationService";

/// A kind of resource that carries access bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// Cloud (resource manager).
    Cloud,
    /// Folder (resource manager).
    Folder,
    /// Organization.
    Organization,
    /// IAM service account.
    ServiceAccount,
    /// KMS symmetric key.
    KmsSymmetricKey,
    /// Container registry.
    ContainerRegistry,
    /// Container repository.
    ContainerRepository,
    /// Managed Kubernetes cluster.
    KubernetesCluster,
    /// Serverless function.
    Function,
    /// Lockbox secret.
    LockboxSecret,
}

impl ResourceKind {
    /// Every supported kind.
    pub const ALL: [ResourceKind; 10] = [
        ResourceKind::Cloud,
        ResourceKind::Folder,
        ResourceKind::Organization,
        ResourceKind::ServiceAccount,
        ResourceKind::KmsSymmetricKey,
        ResourceKind::ContainerRegistry,
        ResourceKind::ContainerRepository,
        ResourceKind::KubernetesCluster,
        ResourceKind::Function,
        ResourceKind::LockboxSecret,
    ];

    /// Fully qualified gRPC service exposing the access-binding RPCs.
    pub fn service(self) -> &'static str {
        match self {
            Self::Cloud => "yandex.cloud.resourcemanager.v1.CloudService",
            Self::Folder => "yandex.cloud.resourcemanager.v1.FolderService",
            Self::Organization => "yandex.cloud.organizationmanager.v1.OrganizationService",
            Self::ServiceAccount => "yandex.cloud.iam.v1.ServiceAccountService",
            Self::KmsSymmetricKey => "yandex.cloud.kms.v1.SymmetricKeyService",
            Self::ContainerRegistry => "yandex.cloud.containerregistry.v1.RegistryService",
            Self::ContainerRepository => "yandex.cloud.containerregistry.v1.RepositoryService",
            Self::KubernetesCluster => "yandex.cloud.k8s.v1.ClusterService",
            Self::Function => "yandex.cloud.serverless.functions.v1.FunctionService",
            Self::LockboxSecret => "yandex.cloud.lockbox.v1.SecretService",
        }
    }

    /// Short name used in mutex keys and descriptions.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Cloud => "cloud",
            Self::Folder => "folder",
            Self::Organization => "organization",
            Self::ServiceAccount => "service-account",
            Self::KmsSymmetricKey => "kms-symmetric-key",
            Self::ContainerRegistry => "container-registry",
            Self::ContainerRepository => "container-repository",
            Self::KubernetesCluster => "kubernetes-cluster",
            Self::Function => "function",
            Self::LockboxSecret => "lockbox-secret",
        }
    }

    /// Name of the attribute holding the parent resource id.
    pub fn parent_field(self) -> &'static str {
        match self {
            Self::Cloud => "cloud_id",
            Self::Folder => "folder_id",
            Self::Organization => "organization_id",
            Self::ServiceAccount => "service_account_id",
            Self::KmsSymmetricKey => "symmetric_key_id",
            Self::ContainerRegistry => "registry_id",
            Self::ContainerRepository => "repository_id",
            Self::KubernetesCluster => "cluster_id",
            Self::Function => "function_id",
            Self::LockboxSecret => "secret_id",
        }
    }

    /// Prefix of the `*_iam_policy`, `*_iam_binding` and `*_iam_member` types.
    pub fn type_prefix(self) -> &'static str {
        match self {
            Self::Cloud => "yandex_resourcemanager_cloud",
            Self::Folder => "yandex_resourcemanager_folder",
            Self::Organization => "yandex_organizationmanager_organization",
            Self::ServiceAccount => "yandex_iam_service_account",
            Self::KmsSymmetricKey => "yandex_kms_symmetric_key",
            Self::ContainerRegistry => "yandex_container_registry",
            Self::ContainerRepository => "yandex_container_repository",
            Self::KubernetesCluster => "yandex_kubernetes_cluster",
            Self::Function => "yandex_function",
            Self::LockboxSecret => "yandex_lockbox_secret",
        }
    }

    /// Collection segment accepted in import ids, e.g. `folders/<id>`.
    pub fn collection(self) -> &'static str {
        match self {
            Self::Cloud => "clouds",
            Self::Folder => "folders",
            Self::Organization => "organizations",
            Self::ServiceAccount => "serviceAccounts",
            Self::KmsSymmetricKey => "symmetricKeys",
            Self::ContainerRegistry => "registries",
            Self::ContainerRepository => "repositories",
            Self::KubernetesCluster => "clusters",
            Self::Function => "functions",
            Self::LockboxSecret => "secrets",
        }
    }

    /// Whether the service implements `UpdateAccessBindings`.
    pub fn supports_delta_updates(self) -> bool {
        !matches!(self, Self::KubernetesCluster | Self::Function)
    }

    /// `folder "b1g..."` style description.
    pub fn describe(self, resource_id: &str) -> String {
        format!("{} {:?}", self.slug().replace('-', " "), resource_id)
    }

    /// Full method path for `method` on this kind's service.
    pub fn method_path(self, method: &str) -> String {
        format!("/{}/{}", self.service(), method)
    }

    /// Re-derive a resource id from an import id segment.
    ///
    /// Accepts the bare id or `<collection>/<id>`.
    pub fn parse_resource_id(self, raw: &str) -> Result<String> {
        let raw = raw.trim();
        let id = match raw.split_once('/') {
            Some((collection, id)) if collection == self.collection() => id,
            Some(_) => {
                return Err(IamError::Validation(format!(
                    "unexpected {} id {:?}; expected <id> or {}/<id>",
                    self.slug(),
                    raw,
                    self.collection()
                )))
            },
            None => raw,
        };
        if id.is_empty() || id.contains(char::is_whitespace) || id.contains('/') {
            return Err(IamError::Validation(format!(
                "invalid {} id {:?}",
                self.slug(),
                raw
            )));
        }
        Ok(id.to_string())
    }
}

/// Thin client issuing access-binding RPCs by method path.
#[derive(Clone)]
pub struct AccessBindingsClient {
    channel: Channel,
    authorization: Option<AsciiMetadataValue>,
    request_timeout: Duration,
}

impl std::fmt::Debug for AccessBindingsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessBindingsClient")
            .field("authorization", &self.authorization.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl AccessBindingsClient {
    /// Build a client for `config.endpoint`.
    ///
    /// The channel connects lazily on first use.
    pub fn connect(config: &IamConfig) -> Result<Self> {
        let mut endpoint = Endpoint::from_shared(config.endpoint.clone())?
            .connect_timeout(config.request_timeout())
            .timeout(config.request_timeout());
        if !config.insecure && config.endpoint.starts_with("https://") {
            endpoint = endpoint.tls_config(ClientTlsConfig::new().with_native_roots())?;
        }
        Self::with_channel(endpoint.connect_lazy(), config)
    }

    /// Build a client over an existing channel.
    pub fn with_channel(channel: Channel, config: &IamConfig) -> Result<Self> {
        let authorization = config
            .token
            .as_ref()
            .map(|token| {
                AsciiMetadataValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                    IamError::Configuration("token contains invalid characters".to_string())
                })
            })
            .transpose()?;
        Ok(Self {
            channel,
            authorization,
            request_timeout: config.request_timeout(),
        })
    }

    async fn unary<Req, Resp>(&self, path: String, message: Req) -> Result<Resp>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| IamError::Unavailable(format!("service was not ready: {}", e)))?;

        let path = PathAndQuery::try_from(path)
            .map_err(|e| IamError::Internal(format!("invalid method path: {}", e)))?;
        let mut request = tonic::Request::new(message);
        request.set_timeout(self.request_timeout);
        if let Some(value) = &self.authorization {
            request.metadata_mut().insert("authorization", value.clone());
        }

        let codec = tonic_prost::ProstCodec::<Req, Resp>::default();
        let response = grpc.unary(request, path, codec).await?;
        Ok(response.into_inner())
    }

    /// One page of `ListAccessBindings`.
    pub async fn list_access_bindings(
        &self,
        kind: ResourceKind,
        request: generated::ListAccessBindingsRequest,
    ) -> Result<generated::ListAccessBindingsResponse> {
        self.unary(kind.method_path("ListAccessBindings"), request)
            .await
    }

    /// Start `SetAccessBindings`.
    pub async fn set_access_bindings(
        &self,
        kind: ResourceKind,
        request: generated::SetAccessBindingsRequest,
    ) -> Result<generated::Operation> {
        self.unary(kind.method_path("SetAccessBindings"), request)
            .await
    }

    /// Start `UpdateAccessBindings`.
    pub async fn update_access_bindings(
        &self,
        kind: ResourceKind,
        request: generated::UpdateAccessBindingsRequest,
    ) -> Result<generated::Operation> {
        self.unary(kind.method_path("UpdateAccessBindings"), request)
            .await
    }
}

#[async_trait::async_trait]
impl OperationPoller for AccessBindingsClient {
    async fn get_operation(&self, id: &str) -> Result<generated::Operation> {
        self.unary(
            format!("/{}/Get", OPERATION_SERVICE),
            generated::GetOperationRequest {
                operation_id: id.to_string(),
            },
        )
        .await
    }
}

/// Drain a paginated listing, calling `fetch` with each continuation token.
pub async fn fetch_all_pages<F, Fut>(mut fetch: F) -> Result<Vec<AccessBinding>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<generated::ListAccessBindingsResponse>>,
{
    let mut bindings = Vec::new();
    let mut page_token = String::new();
    loop {
        let page = fetch(page_token).await?;
        bindings.extend(page.access_bindings.into_iter().map(AccessBinding::from));
        if page.next_page_token.is_empty() {
            return Ok(bindings);
        }
        page_token = page.next_page_token;
    }
}

/// Send `delta` in batches of at most [`crate::types::MAX_DELTAS_PER_REQUEST`].
///
/// Each batch's operation must finish before the next batch is sent; the
/// first failure stops the rest.
pub async fn send_in_batches<F, Fut>(
    delta: &PolicyDelta,
    waiter: &OperationWaiter,
    poller: &dyn OperationPoller,
    mut send: F,
) -> Result<()>
where
    F: FnMut(Vec<generated::AccessBindingDelta>) -> Fut,
    Fut: Future<Output = Result<generated::Operation>>,
{
    for batch in delta.batches() {
        let op = send(batch.iter().cloned().map(Into::into).collect()).await?;
        waiter.wait(poller, op).await?;
        debug!(deltas = batch.len(), "Applied access binding batch");
    }
    Ok(())
}

/// [`ResourceIamUpdater`] backed by the control-plane APIs.
#[derive(Debug, Clone)]
pub struct GrpcIamUpdater {
    client: AccessBindingsClient,
    waiter: OperationWaiter,
    kind: ResourceKind,
    resource_id: String,
    page_size: i64,
}

impl GrpcIamUpdater {
    /// Create an updater for one resource.
    pub fn new(
        client: AccessBindingsClient,
        waiter: OperationWaiter,
        kind: ResourceKind,
        resource_id: impl Into<String>,
        page_size: i64,
    ) -> Self {
        Self {
            client,
            waiter,
            kind,
            resource_id: resource_id.into(),
            page_size,
        }
    }
}

#[async_trait::async_trait]
impl ResourceIamUpdater for GrpcIamUpdater {
    #[instrument(skip(self), fields(resource = %self.describe_resource()))]
    async fn get_resource_iam_policy(&self) -> Result<Policy> {
        let bindings = fetch_all_pages(|page_token| {
            self.client.list_access_bindings(
                self.kind,
                generated::ListAccessBindingsRequest {
                    resource_id: self.resource_id.clone(),
                    page_size: self.page_size,
                    page_token,
                },
            )
        })
        .await?;
        debug!(bindings = bindings.len(), "Listed access bindings");
        Ok(Policy::new(bindings))
    }

    #[instrument(skip(self, policy), fields(resource = %self.describe_resource()))]
    async fn set_resource_iam_policy(&self, policy: &Policy) -> Result<()> {
        let op = self
            .client
            .set_access_bindings(
                self.kind,
                generated::SetAccessBindingsRequest {
                    resource_id: self.resource_id.clone(),
                    access_bindings: policy.bindings.iter().cloned().map(Into::into).collect(),
                },
            )
            .await?;
        self.waiter.wait(&self.client, op).await
    }

    #[instrument(skip(self, delta), fields(resource = %self.describe_resource()))]
    async fn update_resource_iam_policy(&self, delta: &PolicyDelta) -> Result<()> {
        if !self.supports_delta_updates() {
            return Err(IamError::Unimplemented(format!(
                "incremental access binding updates are not supported for {}",
                self.describe_resource()
            )));
        }
        send_in_batches(delta, &self.waiter, &self.client, |access_binding_deltas| {
            self.client.update_access_bindings(
                self.kind,
                generated::UpdateAccessBindingsRequest {
                    resource_id: self.resource_id.clone(),
                    access_binding_deltas,
                },
            )
        })
        .await
    }

    fn supports_delta_updates(&self) -> bool {
        self.kind.supports_delta_updates()
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

/// Hands out [`GrpcIamUpdater`]s sharing one client.
#[derive(Debug, Clone)]
pub struct GrpcUpdaterFactory {
    client: AccessBindingsClient,
    waiter: OperationWaiter,
    page_size: i64,
}

impl GrpcUpdaterFactory {
    /// Connect according to `config`.
    pub fn connect(config: &IamConfig) -> Result<Self> {
        Ok(Self::new(AccessBindingsClient::connect(config)?, config))
    }

    /// Wrap an existing client.
    pub fn new(client: AccessBindingsClient, config: &IamConfig) -> Self {
        Self {
            client,
            waiter: OperationWaiter::new(config.poll_interval(), config.operation_timeout()),
            page_size: config.page_size,
        }
    }
}

impl UpdaterFactory for GrpcUpdaterFactory {
    fn updater(&self, kind: ResourceKind, resource_id: &str) -> Arc<dyn ResourceIamUpdater> {
        Arc::new(GrpcIamUpdater::new(
            self.client.clone(),
            self.waiter,
            kind,
            resource_id,
            self.page_size,
        ))
    }
}
