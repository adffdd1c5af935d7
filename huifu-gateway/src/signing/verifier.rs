//! RSA-SHA256 signature verification.
//!
//! Used to check signatures the provider attaches to its responses, and by tests
//! to confirm outgoing signatures.

use std::{fmt, sync::Arc};

use base64::Engine;
use josekit::jws::{JwsVerifier, RS256, alg::rsassa::RsassaJwsVerifier};
use tracing::instrument;

use crate::{
    error::{GatewayError, Result},
    model::Params,
    signing::{
        canonical::canonicalize,
        key::{armor, normalize_line_endings, split_armor},
    },
};

const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";

/// Verifies RSA-SHA256 signatures against a public key.
#[derive(Clone)]
pub struct SignatureVerifier {
    verifier: Arc<RsassaJwsVerifier>,
}

impl SignatureVerifier {
    /// Builds a verifier from a PEM (or bare base64) SPKI public key.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Key`] if the key cannot be parsed.
    pub fn from_public_key(material: &str) -> Result<Self> {
        let normalized = normalize_line_endings(material);
        let (label, body) = split_armor(&normalized)?;
        let label = label.unwrap_or_else(|| PUBLIC_KEY_LABEL.to_owned());
        let pem = armor(&label, &body);

        let verifier = RS256
            .verifier_from_pem(pem.as_bytes())
            .map_err(|e| GatewayError::Key(format!("unable to parse RSA public key: {e}")))?;
        Ok(Self { verifier: Arc::new(verifier) })
    }

    /// Verifies `signature` (standard base64) over the canonical encoding of `params`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Signing`] if the signature is not base64 or does not
    /// match.
    #[instrument(skip_all, fields(fields = params.len()))]
    pub fn verify(&self, params: &Params, signature: &str) -> Result<()> {
        let signature = base64::engine::general_purpose::STANDARD
            .decode(signature.trim())
            .map_err(|e| GatewayError::Signing(format!("signature is not base64: {e}")))?;
        let message = canonicalize(params)?;

        self.verifier
            .verify(&message, &signature)
            .map_err(|_| GatewayError::Signing("signature does not match".to_owned()))
    }
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}
