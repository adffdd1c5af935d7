//! Core data model: credential bundles, call requests and call results.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use zeroize::Zeroize;

use crate::error::{GatewayError, Result};

/// Parameter mapping carried by a signed call.
pub type Params = Map<String, Value>;

/// Canonical form of a tenant identifier. Surrounding whitespace is not significant.
#[must_use]
pub fn normalize_tenant_id(tenant_id: &str) -> &str {
    tenant_id.trim()
}

/// Response code reported for successful calls.
pub const SUCCESS_CODE: &str = "00000";

/// Provider environment a tenant's credentials belong to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Provider sandbox.
    #[default]
    Test,
    /// Live provider environment.
    Production,
}

impl Environment {
    /// Returns the wire name of this environment.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "test" => Ok(Self::Test),
            "production" => Ok(Self::Production),
            other => Err(GatewayError::Validation(format!(
                "unknown environment '{other}', expected 'test' or 'production'"
            ))),
        }
    }
}

/// Private key material as supplied by the operator.
///
/// The content is wiped from memory on drop and never printed by `Debug`.
pub struct PrivateKeyMaterial(String);

impl PrivateKeyMaterial {
    /// Wraps raw key material (PEM, or bare base64 without armor).
    #[must_use]
    pub fn new(material: impl Into<String>) -> Self {
        Self(material.into())
    }

    /// Returns true if no key material was supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PrivateKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKeyMaterial([REDACTED])")
    }
}

impl Drop for PrivateKeyMaterial {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// A tenant's provider credentials.
///
/// Immutable once constructed. Replacing a tenant's credentials means
/// registering a new bundle, which replaces the whole registry entry.
#[derive(Debug)]
pub struct CredentialBundle {
    tenant_id: String,
    product_id: String,
    private_key: PrivateKeyMaterial,
    environment: Environment,
}

impl CredentialBundle {
    /// Creates a bundle, validating the identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] if the tenant or product identifier is
    /// blank, or [`GatewayError::Key`] if no key material was supplied.
    ///
    /// # Examples
    ///
    /// ```
    /// use huifu_gateway::model::{CredentialBundle, Environment, PrivateKeyMaterial};
    ///
    /// let bundle = CredentialBundle::new(
    ///     "6666000000000001",
    ///     "PAYUN",
    ///     PrivateKeyMaterial::new("MIIEow..."),
    ///     Environment::Test,
    /// )
    /// .unwrap();
    /// assert_eq!(bundle.tenant_id(), "6666000000000001");
    /// ```
    pub fn new(
        tenant_id: impl Into<String>,
        product_id: impl Into<String>,
        private_key: PrivateKeyMaterial,
        environment: Environment,
    ) -> Result<Self> {
        let tenant_id: String = tenant_id.into();
        let tenant_id = normalize_tenant_id(&tenant_id).to_owned();
        let product_id = product_id.into().trim().to_owned();
        if tenant_id.is_empty() {
            return Err(GatewayError::Validation("sys_id is required".to_owned()));
        }
        if product_id.is_empty() {
            return Err(GatewayError::Validation("product_id is required".to_owned()));
        }
        if private_key.is_empty() {
            return Err(GatewayError::Key("rsa_private_key is empty".to_owned()));
        }
        Ok(Self { tenant_id, product_id, private_key, environment })
    }

    /// Tenant identifier (the provider system id).
    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Provider product identifier.
    #[must_use]
    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    /// Environment the credentials target.
    #[must_use]
    pub const fn environment(&self) -> Environment {
        self.environment
    }

    pub(crate) const fn private_key(&self) -> &PrivateKeyMaterial {
        &self.private_key
    }
}

/// A single signed call: an endpoint plus its parameter mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    /// Provider endpoint path, e.g. `/v2/merchant/busi/config`.
    pub endpoint: String,
    /// Call parameters.
    pub params: Params,
}

/// Result of a signed call, returned verbatim to outer layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    /// Provider response code.
    #[serde(rename = "resp_code")]
    pub response_code: String,
    /// Human-readable response description.
    #[serde(rename = "resp_desc")]
    pub response_description: String,
    /// Response payload.
    #[serde(rename = "data")]
    pub payload: Params,
}

impl CallResult {
    /// Builds a successful result around `payload`.
    #[must_use]
    pub fn success(payload: Params) -> Self {
        Self {
            response_code: SUCCESS_CODE.to_owned(),
            response_description: "success".to_owned(),
            payload,
        }
    }

    /// Returns true if the provider reported success.
    ///
    /// The provider uses both the short and the eight-digit form of the zero code.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.response_code.is_empty() && self.response_code.bytes().all(|b| b == b'0')
    }
}

/// Which backend implementation serves a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local simulation; never touches the network.
    Simulated,
    /// Real remote provider session.
    Provider,
}

impl BackendKind {
    /// Returns the wire name of this backend.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Simulated => "simulated",
            Self::Provider => "provider",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_from_str() {
        assert_eq!("test".parse::<Environment>().unwrap(), Environment::Test);
        assert_eq!("".parse::<Environment>().unwrap(), Environment::Test);
        assert_eq!(" Production ".parse::<Environment>().unwrap(), Environment::Production);
        assert!(matches!("staging".parse::<Environment>(), Err(GatewayError::Validation(_))));
    }

    #[test]
    fn test_environment_serde() {
        let json = serde_json::to_string(&Environment::Production).unwrap();
        assert_eq!(json, "\"production\"");
        let env: Environment = serde_json::from_str("\"test\"").unwrap();
        assert_eq!(env, Environment::Test);
    }

    #[test]
    fn test_private_key_debug_is_redacted() {
        let key = PrivateKeyMaterial::new("super-secret-key");
        let debug = format!("{key:?}");
        assert!(!debug.contains("super-secret-key"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_bundle_debug_hides_key() {
        let bundle = CredentialBundle::new(
            "sys-1",
            "PAYUN",
            PrivateKeyMaterial::new("MIIE-secret"),
            Environment::Test,
        )
        .unwrap();
        assert!(!format!("{bundle:?}").contains("MIIE-secret"));
    }

    #[test]
    fn test_bundle_rejects_blank_fields() {
        let key = || PrivateKeyMaterial::new("k");
        let err = CredentialBundle::new(" ", "PAYUN", key(), Environment::Test).unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));

        let err = CredentialBundle::new("sys-1", "", key(), Environment::Test).unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));

        let blank = PrivateKeyMaterial::new("\n");
        let err = CredentialBundle::new("sys-1", "PAYUN", blank, Environment::Test).unwrap_err();
        assert!(matches!(err, GatewayError::Key(_)));
    }

    #[test]
    fn test_call_result_wire_names() {
        let mut payload = Params::new();
        payload.insert("huifu_id".to_owned(), Value::from("X"));
        let result = CallResult::success(payload);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["resp_code"], "00000");
        assert_eq!(json["data"]["huifu_id"], "X");
        assert!(result.is_success());
    }

    #[test]
    fn test_call_result_success_codes() {
        let mut result = CallResult::success(Params::new());
        result.response_code = "00000000".to_owned();
        assert!(result.is_success());
        result.response_code = "10000".to_owned();
        assert!(!result.is_success());
        result.response_code = String::new();
        assert!(!result.is_success());
    }
}
