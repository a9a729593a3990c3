//! Domain error types
//!
//! Three error layers live here:
//! - [`DomainError`] - validation failures inside pure domain code
//! - [`UpstreamError`] - the classified failure modes of the upstream RPC
//!   transport (port-level, produced by the upstream adapter)
//! - [`GatewayError`] - the externally visible taxonomy every request ends
//!   in, with its HTTP status mapping

use serde_json::Value;
use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// A search-domain expression that could not be parsed
    #[error("Invalid search domain: {0}")]
    InvalidDomain(String),

    /// Operation name outside the closed set
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),
}

// ============================================================================
// UpstreamError
// ============================================================================

/// Classified failures of the upstream JSON-RPC transport
///
/// The adapter classifies every upstream error response into one of these
/// variants; callers never have to match on message strings.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Bad credentials at authenticate time
    #[error("Authentication failed for login '{login}'")]
    AuthFailed { login: String },

    /// The upstream reported the session-expired sentinel code
    #[error("Upstream session expired")]
    SessionExpired,

    /// The upstream denied access to the operation
    #[error("Permission denied for {method} on {model}")]
    PermissionDenied { model: String, method: String },

    /// The requested method does not exist on the model
    #[error("Method '{method}' does not exist on model '{model}'")]
    MethodNotFound { model: String, method: String },

    /// The requested model does not exist
    #[error("Model '{0}' does not exist")]
    ModelNotFound(String),

    /// The requested record does not exist
    #[error("Record {record_id} of model '{model}' does not exist")]
    RecordNotFound { model: String, record_id: i64 },

    /// The HTTP request timed out
    #[error("Upstream timeout after {seconds}s during {operation}")]
    Timeout { seconds: u64, operation: String },

    /// Transport-level failure (connect error, non-2xx status, bad body)
    #[error("Upstream connection error: {0}")]
    Connection(String),

    /// Any other upstream-reported error, with its raw code and data
    #[error("Upstream error {code}: {message}")]
    Execution {
        code: i64,
        message: String,
        data: Value,
    },
}

impl UpstreamError {
    /// Whether the upstream's error payload describes a validation failure
    ///
    /// Validation failures map to 400 at the HTTP boundary instead of 502.
    pub fn is_validation(&self) -> bool {
        match self {
            UpstreamError::Execution { data, .. } => data
                .get("name")
                .or_else(|| data.get("exception_type"))
                .and_then(Value::as_str)
                .map(|name| name.to_ascii_lowercase().contains("validation"))
                .unwrap_or(false),
            _ => false,
        }
    }
}

// ============================================================================
// GatewayError
// ============================================================================

/// The externally visible error taxonomy
///
/// Every request that does not succeed terminates in exactly one of these
/// kinds. The HTTP layer renders them as a stable JSON shape; the status
/// mapping lives in [`GatewayError::status_code`].
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed request: invalid operation, missing required field, cycle
    /// in push dependencies, and similar client mistakes
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// No credentials were presented
    #[error("Authentication required")]
    AuthMissing,

    /// Credentials were presented but could not be validated
    #[error("Invalid credentials: {0}")]
    AuthInvalid(String),

    /// The upstream (or the tenant allowlist) denied the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The tenant exists but is suspended
    #[error("Tenant account is suspended")]
    TenantSuspended,

    /// Model, record, event, or sync state not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The tenant has been deleted; terminal
    #[error("Tenant account has been deleted")]
    TenantDeleted,

    /// The tenant exhausted its request budget for the current window
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Upstream failure that is not one of the mapped kinds
    #[error("Upstream error: {message}")]
    Upstream {
        message: String,
        data: Value,
        validation: bool,
    },

    /// Upstream did not answer in time
    #[error("Upstream timeout: {0}")]
    Timeout(String),

    /// Upstream unreachable or transport failure
    #[error("Upstream unreachable: {0}")]
    Connection(String),

    /// Anything that indicates a defect in this service
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Stable machine-readable kind, used in the error response body
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) => "BadRequest",
            GatewayError::AuthMissing => "AuthMissing",
            GatewayError::AuthInvalid(_) => "AuthInvalid",
            GatewayError::PermissionDenied(_) => "PermissionDenied",
            GatewayError::TenantSuspended => "TenantSuspended",
            GatewayError::NotFound(_) => "NotFound",
            GatewayError::TenantDeleted => "TenantDeleted",
            GatewayError::RateLimited { .. } => "RateLimited",
            GatewayError::Upstream { .. } => "UpstreamError",
            GatewayError::Timeout(_) => "Timeout",
            GatewayError::Connection(_) => "ConnectionError",
            GatewayError::Internal(_) => "Internal",
        }
    }

    /// HTTP status this kind maps to
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::BadRequest(_) => 400,
            GatewayError::AuthMissing | GatewayError::AuthInvalid(_) => 401,
            GatewayError::PermissionDenied(_) | GatewayError::TenantSuspended => 403,
            GatewayError::NotFound(_) => 404,
            GatewayError::TenantDeleted => 410,
            GatewayError::RateLimited { .. } => 429,
            GatewayError::Upstream { validation, .. } => {
                if *validation {
                    400
                } else {
                    500
                }
            }
            GatewayError::Timeout(_) => 504,
            GatewayError::Connection(_) => 502,
            GatewayError::Internal(_) => 500,
        }
    }
}

impl GatewayError {
    /// Recover classification from an `anyhow` chain at a port boundary
    ///
    /// Port traits that return `anyhow::Result` still carry the original
    /// [`UpstreamError`] in the chain when the failure came from the
    /// upstream transport; downcasting keeps timeouts mapping to 504 and
    /// connection failures to 502 instead of collapsing into 500.
    pub fn from_port_error(err: anyhow::Error) -> Self {
        match err.downcast::<UpstreamError>() {
            Ok(upstream) => upstream.into(),
            Err(other) => GatewayError::Internal(format!("{other:#}")),
        }
    }
}

impl From<UpstreamError> for GatewayError {
    /// Map classified upstream failures onto the external taxonomy
    ///
    /// `SessionExpired` deliberately maps to `Internal`: the adapter retries
    /// it transparently, so it reaching this conversion means the retry
    /// already failed once.
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::AuthFailed { login } => {
                GatewayError::AuthInvalid(format!("upstream rejected credentials for '{login}'"))
            }
            UpstreamError::SessionExpired => {
                GatewayError::Internal("session expired after transparent retry".into())
            }
            UpstreamError::PermissionDenied { model, method } => {
                GatewayError::PermissionDenied(format!("{method} on {model}"))
            }
            UpstreamError::MethodNotFound { model, method } => {
                GatewayError::BadRequest(format!("method '{method}' does not exist on '{model}'"))
            }
            UpstreamError::ModelNotFound(model) => {
                GatewayError::NotFound(format!("model '{model}'"))
            }
            UpstreamError::RecordNotFound { model, record_id } => {
                GatewayError::NotFound(format!("record {record_id} of '{model}'"))
            }
            UpstreamError::Timeout { seconds, operation } => {
                GatewayError::Timeout(format!("{operation} after {seconds}s"))
            }
            UpstreamError::Connection(msg) => GatewayError::Connection(msg),
            UpstreamError::Execution {
                code,
                message,
                data,
            } => {
                let validation = matches!(
                    data.get("name").or_else(|| data.get("exception_type")),
                    Some(Value::String(name)) if name.to_ascii_lowercase().contains("validation")
                );
                GatewayError::Upstream {
                    message: format!("{message} (code {code})"),
                    data,
                    validation,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(GatewayError::AuthMissing.status_code(), 401);
        assert_eq!(GatewayError::TenantSuspended.status_code(), 403);
        assert_eq!(GatewayError::TenantDeleted.status_code(), 410);
        assert_eq!(
            GatewayError::RateLimited {
                retry_after_secs: 30
            }
            .status_code(),
            429
        );
        assert_eq!(GatewayError::Timeout("x".into()).status_code(), 504);
        assert_eq!(GatewayError::Connection("x".into()).status_code(), 502);
    }

    #[test]
    fn test_upstream_validation_maps_to_400() {
        let err = GatewayError::from(UpstreamError::Execution {
            code: 200,
            message: "Invalid phone".into(),
            data: json!({"name": "base.exceptions.ValidationError"}),
        });
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.kind(), "UpstreamError");
    }

    #[test]
    fn test_upstream_other_maps_to_500() {
        let err = GatewayError::from(UpstreamError::Execution {
            code: 200,
            message: "boom".into(),
            data: json!({"name": "builtins.KeyError"}),
        });
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_not_found_conversions() {
        let err = GatewayError::from(UpstreamError::ModelNotFound("x.y".into()));
        assert_eq!(err.status_code(), 404);
        let err = GatewayError::from(UpstreamError::RecordNotFound {
            model: "res.partner".into(),
            record_id: 7,
        });
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_method_not_found_is_bad_request() {
        let err = GatewayError::from(UpstreamError::MethodNotFound {
            model: "res.partner".into(),
            method: "frobnicate".into(),
        });
        assert_eq!(err.status_code(), 400);
    }
}
