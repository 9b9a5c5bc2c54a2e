//! Provider configuration.
//!
//! The configuration arrives as the JSON body of the provider block and is
//! deserialized into [`IamConfig`]. Every field has a default, so an empty
//! object (or `null`) yields a usable configuration pointed at the public
//! API endpoint.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IamError, Result};
use crate::schema::{Attribute, Diagnostic, Schema};

/// Default control-plane endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.cloud.yandex.net:443";

/// Largest page the list API accepts.
pub const MAX_PAGE_SIZE: i64 = 1000;

/// Settings for talking to the access-binding APIs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IamConfig {
    /// gRPC endpoint of the control plane.
    pub endpoint: String,
    /// IAM token sent as a bearer credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Page size for `ListAccessBindings`.
    pub page_size: i64,
    /// Deadline for a single RPC.
    pub request_timeout_secs: u64,
    /// Deadline for waiting on a long-running operation.
    pub operation_timeout_secs: u64,
    /// Delay between operation status polls.
    pub operation_poll_interval_ms: u64,
    /// Use plaintext HTTP/2 instead of TLS.
    pub insecure: bool,
}

impl Default for IamConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token: None,
            page_size: MAX_PAGE_SIZE,
            request_timeout_secs: 30,
            operation_timeout_secs: 600,
            operation_poll_interval_ms: 1000,
            insecure: false,
        }
    }
}

impl fmt::Debug for IamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IamConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("page_size", &self.page_size)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("operation_timeout_secs", &self.operation_timeout_secs)
            .field("operation_poll_interval_ms", &self.operation_poll_interval_ms)
            .field("insecure", &self.insecure)
            .finish()
    }
}

impl IamConfig {
    /// Parse the provider block. `null` yields the defaults.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let config: Self = serde_json::from_value(value)?;
        let errors: Vec<String> = config
            .validate()
            .into_iter()
            .filter(Diagnostic::is_error)
            .map(|d| d.summary)
            .collect();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(IamError::Configuration(errors.join("; ")))
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        if self.endpoint.trim().is_empty() {
            diagnostics.push(Diagnostic::error("endpoint must not be empty").with_attribute("endpoint"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            diagnostics.push(
                Diagnostic::error(format!("page_size must be between 1 and {}", MAX_PAGE_SIZE))
                    .with_attribute("page_size"),
            );
        }
        if self.request_timeout_secs == 0 {
            diagnostics.push(
                Diagnostic::error("request_timeout_secs must be positive")
                    .with_attribute("request_timeout_secs"),
            );
        }
        if self.operation_timeout_secs == 0 {
            diagnostics.push(
                Diagnostic::error("operation_timeout_secs must be positive")
                    .with_attribute("operation_timeout_secs"),
            );
        }
        if self.token.is_none() {
            diagnostics.push(
                Diagnostic::warning("no token configured; requests will be unauthenticated")
                    .with_attribute("token"),
            );
        }
        diagnostics
    }

    /// Schema of the provider block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_attribute(
                "endpoint",
                Attribute::optional_string().with_default(DEFAULT_ENDPOINT.into()),
            )
            .with_attribute("token", Attribute::optional_string().sensitive())
            .with_attribute(
                "page_size",
                Attribute::optional_int64().with_default(MAX_PAGE_SIZE.into()),
            )
            .with_attribute(
                "request_timeout_secs",
                Attribute::optional_int64().with_default(30.into()),
            )
            .with_attribute(
                "operation_timeout_secs",
                Attribute::optional_int64().with_default(600.into()),
            )
            .with_attribute(
                "operation_poll_interval_ms",
                Attribute::optional_int64().with_default(1000.into()),
            )
            .with_attribute("insecure", Attribute::optional_bool().with_default(false.into()))
    }

    /// Deadline for a single RPC.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Deadline for an operation wait.
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Delay between operation polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.operation_poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = IamConfig::from_value(serde_json::Value::Null).unwrap();
        assert_eq!(config, IamConfig::default());
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.operation_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn test_partial_config() {
        let config = IamConfig::from_value(json!({
            "endpoint": "http://127.0.0.1:50051",
            "token": "t1.secret",
            "insecure": true,
            "page_size": 50,
        }))
        .unwrap();
        assert_eq!(config.page_size, 50);
        assert!(config.insecure);
        assert_eq!(config.operation_poll_interval_ms, 1000);
    }

    #[test]
    fn test_invalid_page_size() {
        let err = IamConfig::from_value(json!({"page_size": 5000})).unwrap_err();
        assert!(matches!(err, IamError::Configuration(ref m) if m.contains("page_size")));
    }

    #[test]
    fn test_wrong_type_is_serialization_error() {
        let err = IamConfig::from_value(json!({"page_size": "many"})).unwrap_err();
        assert!(matches!(err, IamError::Serialization(_)));
    }

    #[test]
    fn test_missing_token_is_warning() {
        let diagnostics = IamConfig::default().validate();
        assert_eq!(diagnostics.len(), 1);
        assert!(!diagnostics[0].is_error());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = IamConfig {
            token: Some("t1.secret".to_string()),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("t1.secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_schema_marks_token_sensitive() {
        let schema = IamConfig::schema();
        assert!(schema.attributes["token"].flags.sensitive);
    }
}
