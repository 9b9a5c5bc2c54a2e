//! Hemmer IAM
//!
//! Access-binding reconciliation for infrastructure providers. Resource
//! kinds that carry access bindings (folders, clouds, KMS keys, service
//! accounts, ...) get three resource granularities on top of a single
//! locked read-modify-write protocol:
//!
//! - **`*_iam_policy`**: the whole binding list, authoritative
//! - **`*_iam_binding`**: every member of one role
//! - **`*_iam_member`**: one member of one role
//!
//! # Overview
//!
//! - [`updater::ResourceIamUpdater`] fetches and writes one resource's
//!   bindings; [`client::GrpcIamUpdater`] does it over gRPC and
//!   [`testing::InMemoryIamBackend`] in memory.
//! - [`iam::read_modify_write`] serializes every mutation of a resource
//!   through the process-local lock table in [`mutex`].
//! - [`merge`] holds the set algebra over bindings and [`diff`] the
//!   order-insensitive comparison used to suppress spurious plans.
//! - [`provider::IamProvider`] exposes schema, validation, plan, CRUD and
//!   import for every resource type.
//!
//! # Quick Start
//!
//! ```no_run
//! use hemmer_iam::{init_logging, IamConfig, IamProvider};
//! use serde_json::json;
//!
//! # async fn run() -> hemmer_iam::Result<()> {
//! init_logging();
//!
//! let config = IamConfig {
//!     token: Some("t1.example".to_string()),
//!     ..Default::default()
//! };
//! let provider = IamProvider::connect(&config)?;
//!
//! let state = provider
//!     .create(
//!         "yandex_resourcemanager_folder_iam_member",
//!         json!({"folder_id": "b1g", "role": "viewer", "member": "userAccount:aje1"}),
//!     )
//!     .await?;
//! assert_eq!(state["id"], "b1g/viewer/userAccount:aje1");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binding;
pub mod client;
pub mod config;
pub mod diff;
pub mod error;
pub mod iam;
pub mod logging;
pub mod member;
pub mod merge;
pub mod mutex;
pub mod operation;
pub mod policy;
pub mod provider;
pub mod schema;
pub mod testing;
pub mod types;
pub mod updater;
pub mod validation;

#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated;

pub use client::{AccessBindingsClient, GrpcIamUpdater, GrpcUpdaterFactory, ResourceKind};
pub use config::IamConfig;
pub use diff::policy_data_equivalent;
pub use error::{IamError, Result};
pub use iam::{apply_policy_deltas, read_modify_write};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use mutex::MutexKv;
pub use provider::{Granularity, IamProvider, IamResourceType};
pub use schema::ProviderSchema;
pub use types::{
    AccessBinding, AccessBindingAction, AccessBindingDelta, AttributeChange, ImportedResource,
    PlanResult, Policy, PolicyDelta, Subject,
};
pub use updater::{ResourceIamUpdater, UpdaterFactory};
pub use validation::{validate, validate_result};

pub use async_trait::async_trait;
pub use serde_json;
pub use tonic;
pub use tracing;
