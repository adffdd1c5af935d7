//! Provider backend: signed calls to the remote API.

use std::{
    path::PathBuf,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;
use zeroize::Zeroizing;

use crate::{
    client::{
        TenantIdentity, sign_call_params,
        staging::{CredentialDocument, StagedCredentials},
    },
    config::ProviderConfig,
    error::{GatewayError, Result},
    model::{CallResult, CredentialBundle, Params},
    signing::{RequestSigner, SignatureVerifier, armor_body},
};

/// Endpoints the provider backend serves. Anything else is rejected before signing.
pub const SUPPORTED_ENDPOINTS: [&str; 2] =
    ["/v2/merchant/busi/config", "/v2/merchant/busi/config/query"];

/// A live provider session for one tenant.
#[derive(Debug)]
pub struct ProviderClient {
    identity: TenantIdentity,
    signer: RequestSigner,
    api_root: String,
    http: Client,
    verifier: Option<SignatureVerifier>,
    staged: Mutex<Option<StagedCredentials>>,
    released: AtomicBool,
}

impl ProviderClient {
    /// Establishes a provider session.
    ///
    /// Stages credentials when a staging directory is configured, then probes the
    /// API root when `probe_on_connect` is set. Staged credentials are removed if
    /// a later step fails.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::Config`] if the environment's base URL is invalid
    /// - [`GatewayError::Transport`] if staging fails or the provider is unreachable
    #[instrument(skip_all, fields(environment = %bundle.environment()))]
    pub(crate) async fn connect(
        bundle: &CredentialBundle,
        signer: RequestSigner,
        config: &ProviderConfig,
        http: Client,
        verifier: Option<SignatureVerifier>,
    ) -> Result<Self> {
        let identity = TenantIdentity::from(bundle);
        let base_url = config.base_url(identity.environment)?;

        let staged = match &config.credential_staging_dir {
            Some(dir) => {
                let key_body = Zeroizing::new(armor_body(bundle.private_key().expose())?);
                let public_key = match &config.huifu_public_key {
                    Some(key) => armor_body(key)?,
                    None => String::new(),
                };
                let document = CredentialDocument {
                    sys_id: &identity.tenant_id,
                    product_id: &identity.product_id,
                    rsa_merch_private_key: &key_body,
                    rsa_huifu_public_key: &public_key,
                };
                Some(StagedCredentials::stage(dir, &document)?)
            }
            None => None,
        };

        if config.probe_on_connect {
            // on failure `staged` drops here and removes the file
            probe(&http, &base_url, config.probe_timeout()).await?;
        }

        Ok(Self {
            identity,
            signer,
            api_root: base_url.as_str().trim_end_matches('/').to_owned(),
            http,
            verifier,
            staged: Mutex::new(staged),
            released: AtomicBool::new(false),
        })
    }

    /// Signs and forwards a call to the remote provider.
    ///
    /// The request is not retried. Remote payment operations are not guaranteed to
    /// be idempotent.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::UnsupportedOperation`] if `endpoint` is not in [`SUPPORTED_ENDPOINTS`]
    /// - [`GatewayError::Transport`] if the session was released, the request fails or times
    ///   out, or the response is malformed or fails signature verification
    pub async fn call(&self, endpoint: &str, params: Params) -> Result<CallResult> {
        if self.is_released() {
            return Err(GatewayError::Transport("provider session has been released".to_owned()));
        }
        if !SUPPORTED_ENDPOINTS.contains(&endpoint) {
            return Err(GatewayError::UnsupportedOperation(format!(
                "{endpoint} is not served by the provider backend"
            )));
        }

        let signed = sign_call_params(&self.identity, &self.signer, params)?;
        let url = format!("{}{endpoint}", self.api_root);
        let started = Instant::now();

        let response = self.http.post(&url).json(&signed).send().await?;
        let status = response.status();
        let body: Value = response.json().await.map_err(|e| {
            GatewayError::Transport(format!("unreadable provider response (HTTP {status}): {e}"))
        })?;

        debug!(
            endpoint,
            status = status.as_u16(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "provider responded"
        );
        parse_response(body, self.verifier.as_ref())
    }

    /// Ends the session and removes staged credentials.
    ///
    /// Returns `Ok(true)` the first time and `Ok(false)` afterwards. Calls made
    /// after release fail with [`GatewayError::Transport`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Cleanup`] if the staged file could not be removed.
    pub fn release(&self) -> Result<bool> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        let staged = self
            .staged
            .lock()
            .map_err(|_| GatewayError::Cleanup("staging lock poisoned".to_owned()))?
            .take();
        if let Some(staged) = staged {
            staged.release()?;
        }
        Ok(true)
    }

    /// Returns true once released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Path of the staged credential document, if any.
    #[must_use]
    pub fn staged_credentials_path(&self) -> Option<PathBuf> {
        self.staged.lock().ok()?.as_ref().map(|s| s.path().to_path_buf())
    }

    pub(crate) const fn identity(&self) -> &TenantIdentity {
        &self.identity
    }

    pub(crate) const fn signer(&self) -> &RequestSigner {
        &self.signer
    }
}

async fn probe(http: &Client, base_url: &Url, timeout: Duration) -> Result<()> {
    http.get(base_url.clone())
        .timeout(timeout)
        .send()
        .await
        .map(|_| ())
        .map_err(|e| GatewayError::Transport(format!("provider unreachable at {base_url}: {e}")))
}

/// Converts a provider response body into a [`CallResult`].
///
/// Response codes are read from `data` first, falling back to the top level.
fn parse_response(body: Value, verifier: Option<&SignatureVerifier>) -> Result<CallResult> {
    let Value::Object(mut top) = body else {
        return Err(GatewayError::Transport("provider response is not a JSON object".to_owned()));
    };

    let data = match top.remove("data") {
        Some(Value::Object(data)) => data,
        None | Some(Value::Null) => Params::new(),
        Some(_) => {
            return Err(GatewayError::Transport(
                "provider response data is not an object".to_owned(),
            ));
        }
    };

    if let Some(verifier) = verifier {
        let sign = top
            .get("sign")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Transport("provider response is unsigned".to_owned()))?;
        verifier.verify(&data, sign).map_err(|e| {
            GatewayError::Transport(format!("provider response signature rejected: {e}"))
        })?;
    }

    let response_code = text_field(&data, &top, "resp_code")
        .ok_or_else(|| GatewayError::Transport("provider response has no resp_code".to_owned()))?;
    let response_description = text_field(&data, &top, "resp_desc").unwrap_or_default();

    Ok(CallResult { response_code, response_description, payload: data })
}

fn text_field(data: &Params, top: &Params, name: &str) -> Option<String> {
    data.get(name).or_else(|| top.get(name)).and_then(Value::as_str).map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use serde_json::json;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;
    use crate::{
        client::factory::build_http_client,
        config::HttpConfig,
        model::{Environment, PrivateKeyMaterial},
        signing::{TestKeyPair, generate_test_key_pair},
    };

    static KEYS: LazyLock<TestKeyPair> =
        LazyLock::new(|| generate_test_key_pair(2048).expect("key generation"));

    fn bundle() -> CredentialBundle {
        CredentialBundle::new(
            "6666000000000001",
            "PAYUN",
            PrivateKeyMaterial::new(KEYS.private_key_pem.clone()),
            Environment::Test,
        )
        .unwrap()
    }

    fn signer() -> RequestSigner {
        let key = PrivateKeyMaterial::new(KEYS.private_key_pem.clone());
        RequestSigner::from_key_material(&key).unwrap()
    }

    fn offline_config() -> ProviderConfig {
        ProviderConfig { probe_on_connect: false, ..ProviderConfig::default() }
    }

    /// Serves one HTTP request, replying with `reply` and returning the request body.
    async fn serve_once(reply: Value) -> (String, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let (header_end, content_length) = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client closed before sending headers");
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    let headers = String::from_utf8_lossy(&buf[..pos]).to_ascii_lowercase();
                    let length = headers
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    break (pos + 4, length);
                }
            };
            while buf.len() < header_end + content_length {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client closed before sending body");
                buf.extend_from_slice(&chunk[..n]);
            }

            let body = reply.to_string();
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            buf[header_end..header_end + content_length].to_vec()
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn test_parse_response_nested_codes() {
        let body = json!({"data": {"resp_code": "00000000", "resp_desc": "ok", "huifu_id": "X"}});
        let result = parse_response(body, None).unwrap();
        assert_eq!(result.response_code, "00000000");
        assert_eq!(result.response_description, "ok");
        assert_eq!(result.payload["huifu_id"], "X");
        assert!(result.is_success());
    }

    #[test]
    fn test_parse_response_top_level_codes() {
        let body = json!({"resp_code": "10000", "resp_desc": "bad request"});
        let result = parse_response(body, None).unwrap();
        assert_eq!(result.response_code, "10000");
        assert!(result.payload.is_empty());
        assert!(!result.is_success());
    }

    #[test]
    fn test_parse_response_malformed() {
        for malformed in [json!([1, 2]), json!({"data": "x"}), json!({"data": {}})] {
            assert!(matches!(parse_response(malformed, None), Err(GatewayError::Transport(_))));
        }
    }

    #[test]
    fn test_parse_response_verifies_signature() {
        let signer = signer();
        let verifier = SignatureVerifier::from_public_key(&KEYS.public_key_pem).unwrap();

        let data = json!({"resp_code": "00000000", "huifu_id": "X"});
        let sign = signer.sign(data.as_object().unwrap()).unwrap();

        let good = json!({"data": data, "sign": sign});
        assert!(parse_response(good, Some(&verifier)).is_ok());

        let tampered = json!({"data": {"resp_code": "00000000", "huifu_id": "Y"}, "sign": sign});
        let err = parse_response(tampered, Some(&verifier)).unwrap_err();
        assert!(matches!(err, GatewayError::Transport(ref m) if m.contains("signature rejected")));

        let unsigned = json!({"data": {"resp_code": "00000000"}});
        let err = parse_response(unsigned, Some(&verifier)).unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }

    #[tokio::test]
    async fn test_unsupported_endpoint() {
        let client =
            ProviderClient::connect(&bundle(), signer(), &offline_config(), Client::new(), None)
                .await
                .unwrap();

        let err = client.call("/v2/merchant/basicdata/query", Params::new()).await.unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedOperation(_)));
    }

    #[tokio::test]
    async fn test_unreachable_root_fails_connect_and_removes_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProviderConfig {
            test_base_url: "https://127.0.0.1:1".to_owned(),
            probe_timeout_secs: 2,
            credential_staging_dir: Some(dir.path().to_path_buf()),
            ..ProviderConfig::default()
        };

        let err = ProviderClient::connect(&bundle(), signer(), &config, Client::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transport(ref m) if m.contains("unreachable")));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_staged_document_has_bare_key() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProviderConfig {
            credential_staging_dir: Some(dir.path().to_path_buf()),
            ..offline_config()
        };
        let client = ProviderClient::connect(&bundle(), signer(), &config, Client::new(), None)
            .await
            .unwrap();

        let path = client.staged_credentials_path().unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let document: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(document["sys_id"], "6666000000000001");
        assert_eq!(document["product_id"], "PAYUN");
        let key = document["rsa_merch_private_key"].as_str().unwrap();
        assert!(!key.contains("BEGIN"));
        assert!(!key.contains('\n'));

        assert!(client.release().unwrap());
        assert!(!path.exists());
        assert!(!client.release().unwrap());
    }

    #[tokio::test]
    async fn test_call_after_release_is_transport_error() {
        let client =
            ProviderClient::connect(&bundle(), signer(), &offline_config(), Client::new(), None)
                .await
                .unwrap();
        assert!(client.release().unwrap());

        let err = client.call("/v2/merchant/busi/config/query", Params::new()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(ref m) if m.contains("released")));
    }

    #[tokio::test]
    async fn test_call_times_out_as_transport_error() {
        // accepts the connection and never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let silent = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let http =
            build_http_client(&HttpConfig { timeout_secs: 1, ..HttpConfig::default() }).unwrap();
        let config = ProviderConfig { test_base_url: format!("http://{addr}"), ..offline_config() };
        let client =
            ProviderClient::connect(&bundle(), signer(), &config, http, None).await.unwrap();

        let started = Instant::now();
        let err = client.call("/v2/merchant/busi/config/query", Params::new()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(ref m) if m.contains("timed out")), "{err}");
        assert!(started.elapsed() < Duration::from_secs(5));
        silent.abort();
    }

    #[tokio::test]
    async fn test_call_posts_signed_params() {
        let reply = json!({"data": {"resp_code": "00000000", "resp_desc": "ok", "huifu_id": "X"}});
        let (base_url, server) = serve_once(reply).await;
        let config = ProviderConfig { test_base_url: base_url, ..offline_config() };
        let client = ProviderClient::connect(&bundle(), signer(), &config, Client::new(), None)
            .await
            .unwrap();

        let params = json!({"huifu_id": "X"}).as_object().cloned().unwrap();
        let result = client.call("/v2/merchant/busi/config/query", params).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.payload["huifu_id"], "X");

        let sent: Params = serde_json::from_slice(&server.await.unwrap()).unwrap();
        assert_eq!(sent["sys_id"], "6666000000000001");
        assert_eq!(sent["product_id"], "PAYUN");
        let verifier = SignatureVerifier::from_public_key(&KEYS.public_key_pem).unwrap();
        assert!(verifier.verify(&sent, sent["sign"].as_str().unwrap()).is_ok());
    }
}
