//! Error types for the Huifu gateway.
//!
//! All errors implement [`std::error::Error`] via [`thiserror::Error`].
//!
//! # Error Categories
//!
//! - **Credential errors** ([`GatewayError::Key`]): key material could not be parsed
//! - **Cryptographic errors** ([`GatewayError::Signing`]): signing itself failed
//! - **Remote errors** ([`GatewayError::Transport`]): the provider call failed or timed out
//! - **Caller errors** ([`GatewayError::NotFound`], [`GatewayError::Validation`],
//!   [`GatewayError::UnsupportedOperation`]): the request cannot be served as given
//! - **Lifecycle errors** ([`GatewayError::Cleanup`]): backend resources were not fully released
//!
//! No error kind is retried inside the gateway. Remote payment operations are not
//! guaranteed to be idempotent, so retrying is left to the caller.
//!
//! # Examples
//!
//! ```
//! use huifu_gateway::error::{GatewayError, Result};
//!
//! fn require_huifu_id(value: Option<&str>) -> Result<String> {
//!     value
//!         .map(str::to_owned)
//!         .ok_or_else(|| GatewayError::Validation("huifu_id is required".to_owned()))
//! }
//!
//! assert!(require_huifu_id(None).is_err());
//! ```

use thiserror::Error;

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors that can occur in the gateway.
///
/// Error messages are user-facing and never contain key material.
#[must_use = "errors should be handled, propagated, or explicitly panicked"]
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Key material is missing, malformed, or not an RSA private key.
    ///
    /// Fatal to registration: no client of any kind can be built from the bundle.
    ///
    /// # Recovery
    ///
    /// Supply a PEM (or bare base64) RSA private key in PKCS#1 or PKCS#8 form.
    #[error("invalid key material: {0}")]
    Key(String),

    /// Signature computation failed.
    ///
    /// Fatal to the call in progress.
    #[error("signature generation failed: {0}")]
    Signing(String),

    /// The remote provider call failed, timed out, or returned an unusable response.
    ///
    /// # Recovery
    ///
    /// The call is not retried automatically. Check provider reachability and
    /// retry at the caller's discretion.
    #[error("provider transport failed: {0}")]
    Transport(String),

    /// The endpoint is not recognized by the active backend.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// No active registration exists for the tenant.
    #[error("no active registration for tenant: {0}")]
    NotFound(String),

    /// A required operation field is missing or a request value is invalid.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Backend-held resources could not be fully released.
    ///
    /// The registry reports this as a warning; it never blocks revocation.
    #[error("resource cleanup failed: {0}")]
    Cleanup(String),

    /// Gateway configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Coarse classification of [`GatewayError`] for outer layers.
///
/// Lets the HTTP layer map errors to status codes without matching on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`GatewayError::Key`].
    Key,
    /// See [`GatewayError::Signing`].
    Signing,
    /// See [`GatewayError::Transport`].
    Transport,
    /// See [`GatewayError::UnsupportedOperation`].
    UnsupportedOperation,
    /// See [`GatewayError::NotFound`].
    NotFound,
    /// See [`GatewayError::Validation`].
    Validation,
    /// See [`GatewayError::Cleanup`].
    Cleanup,
    /// See [`GatewayError::Config`].
    Config,
}

impl GatewayError {
    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Key(_) => ErrorKind::Key,
            Self::Signing(_) => ErrorKind::Signing,
            Self::Transport(_) => ErrorKind::Transport,
            Self::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Cleanup(_) => ErrorKind::Cleanup,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("request timed out: {err}"))
        } else if err.is_connect() {
            Self::Transport(format!("connection failed: {err}"))
        } else {
            Self::Transport(err.to_string())
        }
    }
}
