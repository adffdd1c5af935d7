//! Simulated backend.
//!
//! Signs exactly as the provider backend does, then answers locally with a
//! canned success payload that echoes the correlated request fields. It never
//! performs network I/O and never synthesizes failures.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Local;
use serde_json::Value;
use tracing::debug;

use crate::{
    client::{TenantIdentity, sign_call_params},
    error::Result,
    model::{CallResult, Params},
    signing::RequestSigner,
};

const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Fields echoed back by a simulated merchant configuration.
const CONFIGURE_ECHO_FIELDS: [&str; 4] = ["huifu_id", "wx_woa_app_id", "wx_woa_path", "fee_type"];

/// Local stand-in for a provider session.
#[derive(Debug)]
pub struct SimulatedClient {
    identity: TenantIdentity,
    signer: RequestSigner,
    released: AtomicBool,
}

impl SimulatedClient {
    /// Creates a simulated client around an already-parsed signer.
    #[must_use]
    pub const fn new(identity: TenantIdentity, signer: RequestSigner) -> Self {
        Self { identity, signer, released: AtomicBool::new(false) }
    }

    /// Signs the request and produces the canned response for `endpoint`.
    ///
    /// # Errors
    ///
    /// Fails only if signing fails.
    pub fn call(&self, endpoint: &str, params: Params) -> Result<CallResult> {
        let signed = sign_call_params(&self.identity, &self.signer, params)?;
        debug!(endpoint, fields = signed.len(), "simulated call signed");
        Ok(CallResult::success(self.respond(endpoint, &signed)))
    }

    fn respond(&self, endpoint: &str, params: &Params) -> Params {
        let now = Local::now().format(DISPLAY_TIME_FORMAT).to_string();
        let mut payload = Params::new();

        match endpoint {
            "/v2/merchant/busi/config" | "/v2/merchant/wechat/config" => {
                echo(&mut payload, params, &CONFIGURE_ECHO_FIELDS);
                payload.insert("config_status".to_owned(), Value::from("SUCCESS"));
                payload.insert("config_time".to_owned(), Value::from(now));
            }
            "/v2/merchant/busi/config/query" => {
                echo(&mut payload, params, &["huifu_id"]);
                payload.insert("config_status".to_owned(), Value::from("ACTIVE"));
                payload.insert("update_time".to_owned(), Value::from(now));
            }
            "/v2/merchant/basicdata/query" => {
                payload.insert("sys_id".to_owned(), Value::from(self.identity.tenant_id.as_str()));
                let product_id = self.identity.product_id.as_str();
                payload.insert("product_id".to_owned(), Value::from(product_id));
                echo(&mut payload, params, &["huifu_id"]);
                payload.insert("status".to_owned(), Value::from("ACTIVE"));
            }
            other => {
                payload.insert(
                    "message".to_owned(),
                    Value::from(format!("simulated response for endpoint: {other}")),
                );
            }
        }
        payload
    }

    /// Marks the client released. Returns true the first time.
    ///
    /// A simulated client holds no external resources and keeps serving calls.
    pub fn release(&self) -> bool {
        !self.released.swap(true, Ordering::AcqRel)
    }

    /// Returns true once released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub(crate) const fn identity(&self) -> &TenantIdentity {
        &self.identity
    }

    pub(crate) const fn signer(&self) -> &RequestSigner {
        &self.signer
    }
}

fn echo(payload: &mut Params, params: &Params, fields: &[&str]) {
    for field in fields {
        if let Some(value) = params.get(*field) {
            payload.insert((*field).to_owned(), value.clone());
        }
    }
}
