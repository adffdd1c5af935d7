//! Signing clients: one per registered tenant.
//!
//! [`SigningClient`] is a closed sum over the two backends:
//!
//! - [`SimulatedClient`]: signs every request and answers with canned success
//!   payloads; never touches the network
//! - [`ProviderClient`]: signs and forwards a fixed set of operations to the remote
//!   provider API
//!
//! Both variants share the call contract: the tenant's `sys_id`, `product_id` and a
//! `timestamp` are injected into the parameters, the result is signed, and the
//! signature is added under [`SIGN_FIELD`](crate::signing::SIGN_FIELD).
//!
//! Clients are built by [`ClientFactory`], which encodes the fallback policy.

mod factory;
mod provider;
mod simulated;
mod staging;

use chrono::Local;
pub use factory::ClientFactory;
pub use provider::{ProviderClient, SUPPORTED_ENDPOINTS};
use serde_json::Value;
pub use simulated::SimulatedClient;
use tracing::instrument;

use crate::{
    error::Result,
    model::{BackendKind, CallResult, CredentialBundle, Environment, Params},
    security::audit::redact_tenant_id,
    signing::{RequestSigner, SIGN_FIELD},
};

/// Parameter carrying the tenant (system) identifier.
pub const SYS_ID_FIELD: &str = "sys_id";
/// Parameter carrying the product identifier.
pub const PRODUCT_ID_FIELD: &str = "product_id";
/// Parameter carrying the call timestamp.
pub const TIMESTAMP_FIELD: &str = "timestamp";

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Identity a client signs on behalf of. Copied from the credential bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantIdentity {
    /// Tenant (system) identifier.
    pub tenant_id: String,
    /// Provider product identifier.
    pub product_id: String,
    /// Provider environment.
    pub environment: Environment,
}

impl From<&CredentialBundle> for TenantIdentity {
    fn from(bundle: &CredentialBundle) -> Self {
        Self {
            tenant_id: bundle.tenant_id().to_owned(),
            product_id: bundle.product_id().to_owned(),
            environment: bundle.environment(),
        }
    }
}

/// A tenant's signing client.
#[derive(Debug)]
pub enum SigningClient {
    /// Local simulation.
    Simulated(SimulatedClient),
    /// Remote provider session.
    Provider(ProviderClient),
}

impl SigningClient {
    /// Signs `params` and executes the call against `endpoint`.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::Signing`] if the signature cannot be computed
    /// - [`GatewayError::UnsupportedOperation`] if the provider backend does not serve `endpoint`
    /// - [`GatewayError::Transport`] if the remote call fails, times out, or the session was
    ///   released
    ///
    /// [`GatewayError::Signing`]: crate::error::GatewayError::Signing
    /// [`GatewayError::UnsupportedOperation`]: crate::error::GatewayError::UnsupportedOperation
    /// [`GatewayError::Transport`]: crate::error::GatewayError::Transport
    #[instrument(
        skip(self, params),
        fields(
            tenant = %redact_tenant_id(self.identity().tenant_id.as_str()),
            backend = %self.backend()
        )
    )]
    pub async fn call(&self, endpoint: &str, params: Params) -> Result<CallResult> {
        match self {
            Self::Simulated(client) => client.call(endpoint, params),
            Self::Provider(client) => client.call(endpoint, params).await,
        }
    }

    /// Releases backend-held resources.
    ///
    /// Runs at most once: returns `Ok(true)` when this call performed the release
    /// and `Ok(false)` if the client was already released.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Cleanup`] if resources could not be fully released. The
    /// client counts as released either way.
    ///
    /// [`GatewayError::Cleanup`]: crate::error::GatewayError::Cleanup
    pub fn release(&self) -> Result<bool> {
        match self {
            Self::Simulated(client) => Ok(client.release()),
            Self::Provider(client) => client.release(),
        }
    }

    /// Returns true once [`release`](Self::release) has run.
    #[must_use]
    pub fn is_released(&self) -> bool {
        match self {
            Self::Simulated(client) => client.is_released(),
            Self::Provider(client) => client.is_released(),
        }
    }

    /// Which backend serves this client.
    #[must_use]
    pub const fn backend(&self) -> BackendKind {
        match self {
            Self::Simulated(_) => BackendKind::Simulated,
            Self::Provider(_) => BackendKind::Provider,
        }
    }

    /// Identity the client signs for.
    #[must_use]
    pub const fn identity(&self) -> &TenantIdentity {
        match self {
            Self::Simulated(client) => client.identity(),
            Self::Provider(client) => client.identity(),
        }
    }

    /// Public fingerprint of the signing key.
    #[must_use]
    pub fn key_fingerprint(&self) -> &str {
        match self {
            Self::Simulated(client) => client.signer().key_fingerprint(),
            Self::Provider(client) => client.signer().key_fingerprint(),
        }
    }
}

/// Injects identity and timestamp into `params`, then signs them.
///
/// Identity fields supplied by the caller are overwritten so a client can only
/// ever sign for its own tenant.
pub(crate) fn sign_call_params(
    identity: &TenantIdentity,
    signer: &RequestSigner,
    mut params: Params,
) -> Result<Params> {
    params.insert(SYS_ID_FIELD.to_owned(), Value::from(identity.tenant_id.as_str()));
    params.insert(PRODUCT_ID_FIELD.to_owned(), Value::from(identity.product_id.as_str()));
    params.insert(
        TIMESTAMP_FIELD.to_owned(),
        Value::from(Local::now().format(TIMESTAMP_FORMAT).to_string()),
    );

    let sign = signer.sign(&params)?;
    params.insert(SIGN_FIELD.to_owned(), Value::from(sign));
    Ok(params)
}
