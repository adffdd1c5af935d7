//! Request signing for the provider's RSA-SHA256 scheme.
//!
//! Every provider call carries a `sign` field: the RSASSA-PKCS1-v1_5 / SHA-256
//! signature over the canonical encoding of the call's other parameters,
//! encoded as standard base64.
//!
//! # Components
//!
//! - [`canonicalize`]: deterministic byte encoding of a parameter mapping
//! - [`RequestSigner`]: parses a tenant key and signs parameter mappings
//! - [`SignatureVerifier`]: checks signatures with a public key
//! - [`generate_test_key_pair`]: throwaway key pairs for sandbox onboarding
//!
//! # Examples
//!
//! ```
//! use huifu_gateway::{
//!     model::PrivateKeyMaterial,
//!     signing::{RequestSigner, SignatureVerifier, generate_test_key_pair},
//! };
//! # fn example() -> huifu_gateway::error::Result<()> {
//! let pair = generate_test_key_pair(2048)?;
//! let signer = RequestSigner::from_key_material(&PrivateKeyMaterial::new(pair.private_key_pem))?;
//! let verifier = SignatureVerifier::from_public_key(&pair.public_key_pem)?;
//!
//! let params = serde_json::json!({"huifu_id": "6666000000000001"});
//! let params = params.as_object().unwrap();
//! let sign = signer.sign(params)?;
//! verifier.verify(params, &sign)?;
//! # Ok(())
//! # }
//! ```

mod canonical;
mod key;
mod signer;
mod verifier;

#[cfg(test)]
mod tests;

pub use canonical::canonicalize;
use josekit::jws::RS256;
pub(crate) use key::armor_body;
pub use key::KeyContainer;
pub use signer::RequestSigner;
use tracing::instrument;
pub use verifier::SignatureVerifier;

use crate::error::{GatewayError, Result};

/// Name of the parameter that carries the signature.
pub const SIGN_FIELD: &str = "sign";

/// Smallest modulus accepted for generated keys.
pub const MIN_KEY_BITS: u32 = 2048;

/// A freshly generated RSA key pair in PEM form.
///
/// Intended for sandbox onboarding only. The private key is returned in the
/// clear so an operator can upload the public half to the provider console.
#[derive(Clone)]
pub struct TestKeyPair {
    /// PKCS#1 (`RSA PRIVATE KEY`) private key.
    pub private_key_pem: String,
    /// PKCS#8 (`PRIVATE KEY`) encoding of the same private key.
    pub private_key_pkcs8_pem: String,
    /// SPKI (`PUBLIC KEY`) public key.
    pub public_key_pem: String,
}

impl std::fmt::Debug for TestKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestKeyPair")
            .field("public_key_pem", &self.public_key_pem)
            .finish_non_exhaustive()
    }
}

/// Generates an RSA key pair for sandbox use.
///
/// # Errors
///
/// Returns [`GatewayError::Validation`] if `bits` is below [`MIN_KEY_BITS`], or
/// [`GatewayError::Key`] if generation fails.
#[instrument]
pub fn generate_test_key_pair(bits: u32) -> Result<TestKeyPair> {
    if bits < MIN_KEY_BITS {
        return Err(GatewayError::Validation(format!(
            "key size {bits} is below the minimum of {MIN_KEY_BITS} bits"
        )));
    }

    let key_pair = RS256
        .generate_key_pair(bits)
        .map_err(|e| GatewayError::Key(format!("key generation failed: {e}")))?;

    Ok(TestKeyPair {
        private_key_pem: pem_string(key_pair.to_traditional_pem_private_key())?,
        private_key_pkcs8_pem: pem_string(key_pair.to_pem_private_key())?,
        public_key_pem: pem_string(key_pair.to_pem_public_key())?,
    })
}

fn pem_string(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| GatewayError::Key(format!("PEM output is not UTF-8: {e}")))
}
