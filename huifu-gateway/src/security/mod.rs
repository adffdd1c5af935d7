//! Security controls for credential handling.
//!
//! The audit module records registration, revocation, fallback and call events
//! on a dedicated tracing target, with key material scrubbed:
//!
//! ```rust
//! use huifu_gateway::{audit, model::BackendKind, security::audit::AuditEventType};
//! use uuid::Uuid;
//!
//! audit!(
//!     AuditEventType::TenantRegistered,
//!     "6666000000000001",
//!     Uuid::new_v4(),
//!     with_backend(BackendKind::Provider)
//! );
//! ```
//!
//! # Security Considerations
//!
//! - Private keys are never logged; only SHA-256 public key fingerprints are
//! - Tenant identifiers are masked to their last 4 characters in audit events
//! - Error text passes through [`redact_sensitive`] before it reaches an audit record

pub mod audit;

pub use audit::{
    AuditDetails, AuditEvent, AuditEventType, audit_log, redact_sensitive, redact_tenant_id,
};
