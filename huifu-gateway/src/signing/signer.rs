//! RSA-SHA256 request signing.

use std::{fmt, sync::Arc};

use base64::Engine;
use josekit::jws::{JwsSigner, alg::rsassa::RsassaJwsSigner};
use tracing::instrument;

use crate::{
    error::{GatewayError, Result},
    model::{Params, PrivateKeyMaterial},
    signing::{
        canonical::canonicalize,
        key::{KeyContainer, parse_private_key},
    },
};

/// Signs parameter mappings with a tenant's RSA private key.
///
/// The signature is RSASSA-PKCS1-v1_5 over SHA-256 of the canonical encoding,
/// returned as standard base64. The scheme is deterministic: the same key and
/// parameters always produce the same signature.
///
/// Cloning is cheap; the parsed key is shared.
#[derive(Clone)]
pub struct RequestSigner {
    signer: Arc<RsassaJwsSigner>,
    container: KeyContainer,
    key_fingerprint: Arc<str>,
}

impl RequestSigner {
    /// Parses key material and builds a signer.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Key`] if the material is not a usable RSA private key.
    ///
    /// # Examples
    ///
    /// ```
    /// use huifu_gateway::{
    ///     model::PrivateKeyMaterial,
    ///     signing::{RequestSigner, generate_test_key_pair},
    /// };
    /// # fn example() -> huifu_gateway::error::Result<()> {
    /// let pair = generate_test_key_pair(2048)?;
    /// let key = PrivateKeyMaterial::new(pair.private_key_pem);
    /// let signer = RequestSigner::from_key_material(&key)?;
    ///
    /// let params = serde_json::json!({"huifu_id": "6666000000000001"});
    /// let sign = signer.sign(params.as_object().unwrap())?;
    /// assert!(!sign.is_empty());
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_key_material(material: &PrivateKeyMaterial) -> Result<Self> {
        let parsed = parse_private_key(material)?;
        Ok(Self {
            signer: Arc::new(parsed.signer),
            container: parsed.container,
            key_fingerprint: Arc::from(parsed.fingerprint),
        })
    }

    /// Signs the canonical encoding of `params`.
    ///
    /// A `sign` entry already present in `params` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Signing`] if encoding or the RSA operation fails.
    #[instrument(skip(self, params), fields(key = %self.key_fingerprint, fields = params.len()))]
    pub fn sign(&self, params: &Params) -> Result<String> {
        let message = canonicalize(params)?;
        let signature = self
            .signer
            .sign(&message)
            .map_err(|e| GatewayError::Signing(format!("RSA-SHA256 signing failed: {e}")))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(signature))
    }

    /// Container format the key was parsed from.
    #[must_use]
    pub const fn container(&self) -> KeyContainer {
        self.container
    }

    /// SHA-256 fingerprint of the public half of the key.
    ///
    /// Safe to log; used to correlate calls without exposing key material.
    #[must_use]
    pub fn key_fingerprint(&self) -> &str {
        &self.key_fingerprint
    }
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("container", &self.container)
            .field("key_fingerprint", &self.key_fingerprint)
            .finish_non_exhaustive()
    }
}
