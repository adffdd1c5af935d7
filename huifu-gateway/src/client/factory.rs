//! Client construction with provider-first fallback.

use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    audit,
    client::{ProviderClient, SigningClient, SimulatedClient, TenantIdentity},
    config::{GatewayConfig, HttpConfig, ProviderConfig},
    error::{GatewayError, Result},
    model::{BackendKind, CredentialBundle},
    security::audit::{AuditEventType, redact_tenant_id},
    signing::{RequestSigner, SignatureVerifier},
};

/// Builds signing clients for credential bundles.
///
/// The provider backend is attempted first. Any failure to establish it (an
/// unreachable API, a staging error, an invalid base URL) is logged and the
/// tenant is served by a [`SimulatedClient`] instead. Only unusable key material
/// fails a build, since no variant can sign without it.
#[derive(Debug, Clone)]
pub struct ClientFactory {
    provider: ProviderConfig,
    http: Client,
    verifier: Option<SignatureVerifier>,
}

impl ClientFactory {
    /// Creates a factory from gateway configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if the configuration is invalid or the HTTP
    /// client cannot be built, or [`GatewayError::Key`] if response verification is
    /// enabled with an unparsable provider public key.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        config.validate()?;
        let http = build_http_client(&config.http)?;

        let verifier = match (&config.provider.huifu_public_key, config.provider.verify_responses) {
            (Some(key), true) => Some(SignatureVerifier::from_public_key(key)?),
            _ => None,
        };

        Ok(Self { provider: config.provider.clone(), http, verifier })
    }

    /// A factory that never attempts the provider backend.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if the HTTP client cannot be built.
    pub fn simulated_only() -> Result<Self> {
        let mut config = GatewayConfig::default();
        config.provider.enabled = false;
        Self::new(&config)
    }

    /// Builds a client for `bundle`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Key`] if the key material cannot be parsed. Provider
    /// failures are never returned; they trigger the simulated fallback.
    #[instrument(
        skip_all,
        fields(
            tenant = %redact_tenant_id(bundle.tenant_id()),
            environment = %bundle.environment()
        )
    )]
    pub async fn build(&self, bundle: &CredentialBundle) -> Result<SigningClient> {
        let signer = RequestSigner::from_key_material(bundle.private_key())?;
        debug!(
            key = signer.key_fingerprint(),
            container = signer.container().name(),
            "private key parsed"
        );

        if !self.provider.enabled {
            debug!("provider backend disabled");
            return Ok(self.simulated(bundle, signer));
        }

        match ProviderClient::connect(
            bundle,
            signer.clone(),
            &self.provider,
            self.http.clone(),
            self.verifier.clone(),
        )
        .await
        {
            Ok(client) => {
                info!("provider session established");
                Ok(SigningClient::Provider(client))
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "provider client construction failed, falling back to simulated backend"
                );
                audit!(
                    AuditEventType::ProviderFallback,
                    bundle.tenant_id(),
                    Uuid::new_v4(),
                    with_backend(BackendKind::Simulated),
                    with_environment(bundle.environment()),
                    with_error(e.to_string())
                );
                Ok(self.simulated(bundle, signer))
            }
        }
    }

    #[allow(clippy::unused_self, reason = "keeps both construction paths on the factory")]
    fn simulated(&self, bundle: &CredentialBundle, signer: RequestSigner) -> SigningClient {
        SigningClient::Simulated(SimulatedClient::new(TenantIdentity::from(bundle), signer))
    }
}

/// Builds the shared outbound HTTP client.
///
/// Redirects are not followed; a signed request must reach the configured host.
pub(crate) fn build_http_client(config: &HttpConfig) -> Result<Client> {
    Client::builder()
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| GatewayError::Config(format!("cannot build HTTP client: {e}")))
}
