//! Tenant registry: the tenant-id to signing-client mapping.
//!
//! One `tokio::sync::RwLock` guards the map. The lock is only held around map
//! reads and swaps: client construction happens before the write lock is taken,
//! resource release happens after it is dropped, and calls run on an
//! `Arc<SigningClient>` cloned out of the map. A slow provider call or a slow
//! registration for one tenant never blocks lookups for another.
//!
//! # Examples
//!
//! ```
//! use huifu_gateway::{
//!     client::ClientFactory,
//!     model::{CredentialBundle, Environment, PrivateKeyMaterial},
//!     registry::TenantRegistry,
//!     signing::generate_test_key_pair,
//! };
//! # async fn example() -> huifu_gateway::error::Result<()> {
//! let registry = TenantRegistry::new(ClientFactory::simulated_only()?);
//! let pair = generate_test_key_pair(2048)?;
//!
//! let bundle = CredentialBundle::new(
//!     "6666000000000001",
//!     "PAYUN",
//!     PrivateKeyMaterial::new(pair.private_key_pem),
//!     Environment::Test,
//! )?;
//! registry.register(bundle).await?;
//!
//! let client = registry.lookup("6666000000000001").await?;
//! assert!(!client.is_released());
//! # Ok(())
//! # }
//! ```

use std::{collections::HashMap, sync::Arc};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    audit,
    client::{ClientFactory, SigningClient},
    error::{GatewayError, Result},
    model::{BackendKind, CredentialBundle, Environment, normalize_tenant_id},
    security::audit::{AuditEventType, redact_tenant_id},
};

/// An active registration. Replaced whole, never mutated in place.
#[derive(Debug)]
struct RegistryEntry {
    bundle: CredentialBundle,
    client: Arc<SigningClient>,
}

/// Outcome of [`TenantRegistry::register`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    /// Registered tenant.
    pub tenant_id: String,
    /// Backend chosen by the factory.
    pub backend: BackendKind,
    /// True if an earlier registration was replaced.
    pub replaced: bool,
    /// Non-fatal problems releasing the replaced client.
    pub warnings: Vec<String>,
}

/// Outcome of [`TenantRegistry::revoke`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Revocation {
    /// Revoked tenant.
    pub tenant_id: String,
    /// Non-fatal problems releasing the client.
    pub warnings: Vec<String>,
}

/// Listing entry. Carries no key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantSummary {
    /// Tenant identifier.
    #[serde(rename = "sys_id")]
    pub tenant_id: String,
    /// Provider product identifier.
    pub product_id: String,
    /// Provider environment.
    pub environment: Environment,
    /// Backend serving the tenant.
    pub backend: BackendKind,
}

/// Concurrency-safe store of tenant signing clients.
///
/// Constructed once at startup and shared by reference (usually in an `Arc`).
/// Dropping the registry drops every client, which removes any staged
/// credential files.
#[derive(Debug)]
pub struct TenantRegistry {
    factory: ClientFactory,
    entries: RwLock<HashMap<String, RegistryEntry>>,
}

impl TenantRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(factory: ClientFactory) -> Self {
        Self { factory, entries: RwLock::new(HashMap::new()) }
    }

    /// Registers (or replaces) a tenant.
    ///
    /// The client is fully built before the entry becomes visible. If the tenant
    /// was already registered, the previous client is released before this
    /// returns; release problems are reported in [`Registration::warnings`].
    /// Under concurrent registrations for one tenant the last writer wins, and
    /// every displaced client is released exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Key`] if the key material is unusable. The registry
    /// is unchanged in that case.
    #[instrument(skip_all, fields(tenant = %redact_tenant_id(bundle.tenant_id())))]
    pub async fn register(&self, bundle: CredentialBundle) -> Result<Registration> {
        let client = Arc::new(self.factory.build(&bundle).await?);
        let backend = client.backend();
        let tenant_id = bundle.tenant_id().to_owned();
        let environment = bundle.environment();
        let fingerprint = client.key_fingerprint().to_owned();

        let previous = {
            let mut entries = self.entries.write().await;
            entries.insert(tenant_id.clone(), RegistryEntry { bundle, client })
        };

        let replaced = previous.is_some();
        let warnings = match previous {
            Some(entry) => release_client(&tenant_id, &entry.client),
            None => Vec::new(),
        };

        let event_type = if replaced {
            AuditEventType::TenantReplaced
        } else {
            AuditEventType::TenantRegistered
        };
        audit!(
            event_type,
            tenant_id.as_str(),
            Uuid::new_v4(),
            with_backend(backend),
            with_environment(environment),
            with_key_fingerprint(fingerprint)
        );
        info!(%backend, replaced, "tenant registered");

        Ok(Registration { tenant_id, backend, replaced, warnings })
    }

    /// Returns the active client for `tenant_id`.
    ///
    /// The identifier is normalized the same way as at registration.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotFound`] if the tenant is not registered.
    pub async fn lookup(&self, tenant_id: &str) -> Result<Arc<SigningClient>> {
        let tenant_id = normalize_tenant_id(tenant_id);
        self.entries
            .read()
            .await
            .get(tenant_id)
            .map(|entry| Arc::clone(&entry.client))
            .ok_or_else(|| GatewayError::NotFound(tenant_id.to_owned()))
    }

    /// Removes a tenant and releases its client.
    ///
    /// Cleanup failures never block removal; they are returned as warnings.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotFound`] if the tenant is not registered. Nothing
    /// changes in that case.
    #[instrument(skip(self), fields(tenant = %redact_tenant_id(tenant_id)))]
    pub async fn revoke(&self, tenant_id: &str) -> Result<Revocation> {
        let tenant_id = normalize_tenant_id(tenant_id);
        let entry = self
            .entries
            .write()
            .await
            .remove(tenant_id)
            .ok_or_else(|| GatewayError::NotFound(tenant_id.to_owned()))?;

        let warnings = release_client(tenant_id, &entry.client);
        audit!(
            AuditEventType::TenantRevoked,
            tenant_id,
            Uuid::new_v4(),
            with_backend(entry.client.backend()),
            with_environment(entry.bundle.environment())
        );
        info!(warnings = warnings.len(), "tenant revoked");

        Ok(Revocation { tenant_id: tenant_id.to_owned(), warnings })
    }

    /// Snapshot of all registrations, in no particular order.
    pub async fn list(&self) -> Vec<TenantSummary> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(tenant_id, entry)| TenantSummary {
                tenant_id: tenant_id.clone(),
                product_id: entry.bundle.product_id().to_owned(),
                environment: entry.bundle.environment(),
                backend: entry.client.backend(),
            })
            .collect()
    }

    /// Number of registered tenants.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if no tenant is registered.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Releases a displaced client, converting failures into warnings.
fn release_client(tenant_id: &str, client: &SigningClient) -> Vec<String> {
    match client.release() {
        Ok(_) => Vec::new(),
        Err(e) => {
            warn!(error = %e, "client cleanup failed");
            audit!(
                AuditEventType::CleanupFailed,
                tenant_id,
                Uuid::new_v4(),
                with_backend(client.backend()),
                with_error(e.to_string())
            );
            vec![e.to_string()]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::PrivateKeyMaterial, signing::generate_test_key_pair};

    fn bundle(tenant: &str, key: &str) -> CredentialBundle {
        let key = PrivateKeyMaterial::new(key);
        CredentialBundle::new(tenant, "PAYUN", key, Environment::Test).unwrap()
    }

    #[tokio::test]
    async fn test_register_lookup_revoke() {
        let pair = generate_test_key_pair(2048).unwrap();
        let registry = TenantRegistry::new(ClientFactory::simulated_only().unwrap());

        let registration = registry.register(bundle("T1", &pair.private_key_pem)).await.unwrap();
        assert_eq!(registration.backend, BackendKind::Simulated);
        assert!(!registration.replaced);
        assert_eq!(registry.len().await, 1);

        let client = registry.lookup("T1").await.unwrap();
        assert_eq!(client.identity().tenant_id, "T1");

        let revocation = registry.revoke("T1").await.unwrap();
        assert!(revocation.warnings.is_empty());
        assert!(client.is_released());
        assert!(matches!(registry.lookup("T1").await, Err(GatewayError::NotFound(_))));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_bad_key_leaves_registry_unchanged() {
        let pair = generate_test_key_pair(2048).unwrap();
        let registry = TenantRegistry::new(ClientFactory::simulated_only().unwrap());
        registry.register(bundle("T1", &pair.private_key_pem)).await.unwrap();
        let original = registry.lookup("T1").await.unwrap();

        let err = registry.register(bundle("T1", "not a key")).await.unwrap_err();
        assert!(matches!(err, GatewayError::Key(_)));

        let current = registry.lookup("T1").await.unwrap();
        assert!(Arc::ptr_eq(&original, &current));
        assert!(!original.is_released());
    }

    #[tokio::test]
    async fn test_tenant_id_whitespace_is_not_significant() {
        let pair = generate_test_key_pair(2048).unwrap();
        let registry = TenantRegistry::new(ClientFactory::simulated_only().unwrap());

        let registration = registry.register(bundle(" T1 ", &pair.private_key_pem)).await.unwrap();
        assert_eq!(registration.tenant_id, "T1");

        let client = registry.lookup(" T1 ").await.unwrap();
        assert!(Arc::ptr_eq(&client, &registry.lookup("T1").await.unwrap()));

        let revocation = registry.revoke(" T1 ").await.unwrap();
        assert_eq!(revocation.tenant_id, "T1");
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_revoke_unknown_is_not_found() {
        let registry = TenantRegistry::new(ClientFactory::simulated_only().unwrap());
        let err = registry.revoke("T2").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(ref t) if t == "T2"));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_has_no_key_material() {
        let pair = generate_test_key_pair(2048).unwrap();
        let registry = TenantRegistry::new(ClientFactory::simulated_only().unwrap());
        registry.register(bundle("T1", &pair.private_key_pem)).await.unwrap();

        let listing = registry.list().await;
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].tenant_id, "T1");
        assert_eq!(listing[0].product_id, "PAYUN");

        let json = serde_json::to_string(&listing).unwrap();
        assert!(json.contains("\"sys_id\":\"T1\""));
        assert!(!json.contains("PRIVATE KEY"));
    }
}
