//! Error types for the IAM engine.

use std::borrow::Cow;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = IamError> = std::result::Result<T, E>;

/// Errors produced while reconciling access bindings.
///
/// Backend failures arrive as [`tonic::Status`] and are mapped onto the
/// variants below so callers can match on [`IamError::NotFound`] instead of
/// inspecting status codes.
#[derive(Debug, Error)]
pub enum IamError {
    /// The resource the bindings belong to does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The resource exists but holds no bindings for the declared role.
    #[error("Binding for role {role:?} not found on {resource}")]
    BindingNotFound {
        /// The declared role.
        role: String,
        /// Human-readable description of the resource.
        resource: String,
    },

    /// Declared state failed validation before any backend call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The backend rejected the request as malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Authentication or authorization failure.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Service temporarily unavailable.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The call or the operation wait ran past its deadline.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Operation failed due to current state.
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// The binding already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Quota or rate limit exceeded.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The capability is not offered by this resource kind.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// A long-running operation finished with an error status.
    #[error("Operation {id} failed with code {code}: {message}")]
    Operation {
        /// Operation id.
        id: String,
        /// gRPC status code reported by the operation.
        code: i32,
        /// Error message reported by the operation.
        message: String,
    },

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A gRPC transport error occurred.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// Anything else the backend reported.
    #[error("Internal error: {0}")]
    Internal(String),

    /// An error annotated with the resource it happened on.
    #[error("Error setting IAM policy for {description}: {source}")]
    Resource {
        /// Human-readable description of the resource.
        description: String,
        /// The underlying failure.
        #[source]
        source: Box<IamError>,
    },
}

impl IamError {
    /// Attach a resource description to this error.
    pub fn context(self, description: impl Into<String>) -> Self {
        Self::Resource {
            description: description.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error (or the error it wraps) means the resource is gone.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Resource { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Get the error message as a string.
    ///
    /// The message excludes the variant prefix of the `Display` output;
    /// variants without a message of their own render in full.
    pub fn message(&self) -> Cow<'_, str> {
        let msg: &str = match self {
            Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::InvalidArgument(msg)
            | Self::PermissionDenied(msg)
            | Self::Unavailable(msg)
            | Self::DeadlineExceeded(msg)
            | Self::FailedPrecondition(msg)
            | Self::AlreadyExists(msg)
            | Self::ResourceExhausted(msg)
            | Self::Unimplemented(msg)
            | Self::Configuration(msg)
            | Self::UnknownResource(msg)
            | Self::Internal(msg) => msg,
            Self::Operation { message, .. } => message,
            Self::Serialization(_err) => "serialization error (see Debug output)",
            Self::Transport(_err) => "transport error (see Debug output)",
            Self::BindingNotFound { .. } => return Cow::Owned(self.to_string()),
            Self::Resource { source, .. } => return source.message(),
        };
        Cow::Borrowed(msg)
    }

    /// Map a status code and message, as carried by a finished operation.
    pub fn from_code(code: tonic::Code, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            tonic::Code::NotFound => Self::NotFound(message),
            tonic::Code::InvalidArgument | tonic::Code::OutOfRange => {
                Self::InvalidArgument(message)
            },
            tonic::Code::PermissionDenied | tonic::Code::Unauthenticated => {
                Self::PermissionDenied(message)
            },
            tonic::Code::Unavailable | tonic::Code::Aborted => Self::Unavailable(message),
            tonic::Code::DeadlineExceeded | tonic::Code::Cancelled => {
                Self::DeadlineExceeded(message)
            },
            tonic::Code::FailedPrecondition => Self::FailedPrecondition(message),
            tonic::Code::AlreadyExists => Self::AlreadyExists(message),
            tonic::Code::ResourceExhausted => Self::ResourceExhausted(message),
            tonic::Code::Unimplemented => Self::Unimplemented(message),
            _ => Self::Internal(message),
        }
    }
}

impl From<tonic::Status> for IamError {
    fn from(status: tonic::Status) -> Self {
        Self::from_code(status.code(), status.message())
    }
}

impl From<IamError> for tonic::Status {
    fn from(err: IamError) -> Self {
        match err {
            IamError::NotFound(msg) => tonic::Status::not_found(msg),
            err @ IamError::BindingNotFound { .. } => tonic::Status::not_found(err.to_string()),
            IamError::Validation(msg) | IamError::InvalidArgument(msg) => {
                tonic::Status::invalid_argument(msg)
            },
            IamError::PermissionDenied(msg) => tonic::Status::permission_denied(msg),
            IamError::Unavailable(msg) => tonic::Status::unavailable(msg),
            IamError::DeadlineExceeded(msg) => tonic::Status::deadline_exceeded(msg),
            IamError::FailedPrecondition(msg) | IamError::Configuration(msg) => {
                tonic::Status::failed_precondition(msg)
            },
            IamError::AlreadyExists(msg) => tonic::Status::already_exists(msg),
            IamError::ResourceExhausted(msg) => tonic::Status::resource_exhausted(msg),
            IamError::Unimplemented(msg) => tonic::Status::unimplemented(msg),
            IamError::UnknownResource(msg) => tonic::Status::not_found(msg),
            IamError::Operation { code, message, .. } => {
                tonic::Status::new(tonic::Code::from(code), message)
            },
            IamError::Serialization(err) => {
                tonic::Status::invalid_argument(format!("Serialization error: {}", err))
            },
            IamError::Transport(err) => {
                tonic::Status::unavailable(format!("Transport error: {}", err))
            },
            IamError::Internal(msg) => tonic::Status::internal(msg),
            IamError::Resource {
                description,
                source,
            } => {
                let status: tonic::Status = (*source).into();
                tonic::Status::new(
                    status.code(),
                    format!("{}: {}", description, status.message()),
                )
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IamError::NotFound("folder b1g".to_string());
        assert_eq!(format!("{}", err), "Resource not found: folder b1g");

        let err = IamError::BindingNotFound {
            role: "viewer".to_string(),
            resource: "folder \"b1g\"".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Binding for role \"viewer\" not found on folder \"b1g\""
        );
        assert_eq!(err.message(), err.to_string());
    }

    #[test]
    fn test_status_to_error() {
        let err: IamError = tonic::Status::not_found("gone").into();
        assert!(matches!(err, IamError::NotFound(ref m) if m == "gone"));

        let err: IamError = tonic::Status::unauthenticated("no token").into();
        assert!(matches!(err, IamError::PermissionDenied(_)));

        let err: IamError = tonic::Status::deadline_exceeded("slow").into();
        assert!(matches!(err, IamError::DeadlineExceeded(_)));

        let err: IamError = tonic::Status::data_loss("boom").into();
        assert!(matches!(err, IamError::Internal(_)));
    }

    #[test]
    fn test_error_to_status() {
        let status: tonic::Status = IamError::NotFound("x".to_string()).into();
        assert_eq!(status.code(), tonic::Code::NotFound);

        let status: tonic::Status = IamError::Validation("x".to_string()).into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let status: tonic::Status = IamError::Operation {
            id: "op1".to_string(),
            code: tonic::Code::PermissionDenied as i32,
            message: "denied".to_string(),
        }
        .into();
        assert_eq!(status.code(), tonic::Code::PermissionDenied);
    }

    #[test]
    fn test_context_keeps_not_found() {
        let err = IamError::NotFound("gone".to_string()).context("folder \"b1g\"");
        assert!(err.is_not_found());
        assert_eq!(err.message(), "gone");
        assert_eq!(
            err.to_string(),
            "Error setting IAM policy for folder \"b1g\": Resource not found: gone"
        );

        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::NotFound);
        assert_eq!(status.message(), "folder \"b1g\": gone");
    }

    #[test]
    fn test_is_not_found_only_for_not_found() {
        assert!(!IamError::Unavailable("x".to_string()).is_not_found());
        assert!(!IamError::BindingNotFound {
            role: "r".to_string(),
            resource: "x".to_string(),
        }
        .is_not_found());
    }
}
