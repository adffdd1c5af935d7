//! Named operations on top of the generic signed call.
//!
//! Each [`Operation`] fixes an endpoint and a set of required fields. The façade
//! validates those fields, generates `req_seq_id` and `req_date`, merges
//! caller-supplied extension fields without letting them overwrite anything the
//! operation defines, and dispatches through the tenant's client.

use std::{
    fmt,
    sync::Arc,
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use chrono::Local;
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    audit,
    error::{GatewayError, Result},
    model::{CallRequest, CallResult, Params},
    registry::TenantRegistry,
    security::audit::{AuditEventType, redact_tenant_id},
};

/// Generated request sequence identifier field.
pub const REQ_SEQ_ID_FIELD: &str = "req_seq_id";
/// Generated request date field.
pub const REQ_DATE_FIELD: &str = "req_date";

/// The closed set of named operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Configure a merchant's WeChat official-account binding.
    ConfigureMerchant,
    /// Query a merchant's business configuration.
    QueryMerchantConfig,
    /// Query a merchant's basic data.
    QueryMerchantInfo,
}

impl Operation {
    /// Provider endpoint of this operation.
    #[must_use]
    pub const fn endpoint(&self) -> &'static str {
        match self {
            Self::ConfigureMerchant => "/v2/merchant/busi/config",
            Self::QueryMerchantConfig => "/v2/merchant/busi/config/query",
            Self::QueryMerchantInfo => "/v2/merchant/basicdata/query",
        }
    }

    /// Fields that must be present and non-empty.
    #[must_use]
    pub const fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::ConfigureMerchant => &["huifu_id", "wx_woa_app_id", "wx_woa_path", "fee_type"],
            Self::QueryMerchantConfig | Self::QueryMerchantInfo => &["huifu_id"],
        }
    }

    /// Short name used in logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ConfigureMerchant => "configure_merchant",
            Self::QueryMerchantConfig => "query_merchant_config",
            Self::QueryMerchantInfo => "query_merchant_info",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named operation with its fields and optional extensions.
///
/// # Examples
///
/// ```
/// use huifu_gateway::facade::{Operation, OperationRequest};
///
/// let request = OperationRequest::new(Operation::QueryMerchantConfig)
///     .field("huifu_id", "6666000000000002")
///     .into_call_request()
///     .unwrap();
///
/// assert_eq!(request.endpoint, "/v2/merchant/busi/config/query");
/// assert!(request.params.contains_key("req_seq_id"));
/// assert!(request.params.contains_key("req_date"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRequest {
    operation: Operation,
    fields: Params,
    extensions: Params,
}

impl OperationRequest {
    /// Starts a request for `operation`.
    #[must_use]
    pub fn new(operation: Operation) -> Self {
        Self { operation, fields: Params::new(), extensions: Params::new() }
    }

    /// Sets an operation field. Operation fields always win over extensions.
    #[must_use]
    #[allow(
        clippy::impl_trait_in_params,
        reason = "impl Into is idiomatic for builder methods"
    )]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Adds caller-supplied extension fields.
    #[must_use]
    pub fn extensions(mut self, extensions: Params) -> Self {
        self.extensions.extend(extensions);
        self
    }

    /// The operation being requested.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }

    /// Validates required fields and shapes the generic call.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] naming the first missing or empty
    /// required field.
    pub fn into_call_request(self) -> Result<CallRequest> {
        for field in self.operation.required_fields() {
            if !is_present(self.fields.get(*field)) {
                return Err(GatewayError::Validation(format!(
                    "{field} is required for {}",
                    self.operation
                )));
            }
        }

        let mut params = self.fields;
        params.insert(REQ_SEQ_ID_FIELD.to_owned(), Value::from(generate_req_seq_id()));
        let req_date = Local::now().format("%Y%m%d").to_string();
        params.insert(REQ_DATE_FIELD.to_owned(), Value::from(req_date));
        for (key, value) in self.extensions {
            params.entry(key).or_insert(value);
        }

        Ok(CallRequest { endpoint: self.operation.endpoint().to_owned(), params })
    }
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

/// Request sequence id: unix seconds, six-digit microseconds, then 8 random hex digits.
fn generate_req_seq_id() -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}{:06}{}", now.as_secs(), now.subsec_micros(), &suffix[..8])
}

/// Executes named operations for registered tenants.
#[derive(Debug, Clone)]
pub struct CallFacade {
    registry: Arc<TenantRegistry>,
}

impl CallFacade {
    /// Creates a façade over `registry`.
    #[must_use]
    pub const fn new(registry: Arc<TenantRegistry>) -> Self {
        Self { registry }
    }

    /// Validates, shapes and executes `request` with `tenant_id`'s client.
    ///
    /// Validation runs before the tenant is resolved, so an invalid request never
    /// reaches a backend.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::Validation`] for a missing required field
    /// - [`GatewayError::NotFound`] if the tenant is not registered
    /// - any error of [`SigningClient::call`](crate::client::SigningClient::call)
    #[instrument(
        skip(self, request),
        fields(tenant = %redact_tenant_id(tenant_id), operation = %request.operation())
    )]
    pub async fn execute(&self, tenant_id: &str, request: OperationRequest) -> Result<CallResult> {
        let call = request.into_call_request()?;
        let client = self.registry.lookup(tenant_id).await?;

        let started = Instant::now();
        let outcome = client.call(&call.endpoint, call.params).await;
        let request_id = Uuid::new_v4();

        match &outcome {
            Ok(_) => audit!(
                AuditEventType::CallSucceeded,
                tenant_id,
                request_id,
                with_endpoint(call.endpoint.as_str()),
                with_backend(client.backend()),
                with_duration(started.elapsed())
            ),
            Err(e) => audit!(
                AuditEventType::CallFailed,
                tenant_id,
                request_id,
                with_endpoint(call.endpoint.as_str()),
                with_backend(client.backend()),
                with_duration(started.elapsed()),
                with_error(e.to_string())
            ),
        }
        outcome
    }

    /// Configures a merchant's WeChat official-account binding.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn configure_merchant(
        &self,
        tenant_id: &str,
        merchant: MerchantBinding,
        extensions: Params,
    ) -> Result<CallResult> {
        let request = OperationRequest::new(Operation::ConfigureMerchant)
            .field("huifu_id", merchant.huifu_id)
            .field("wx_woa_app_id", merchant.wx_woa_app_id)
            .field("wx_woa_path", merchant.wx_woa_path)
            .field("fee_type", merchant.fee_type)
            .extensions(extensions);
        self.execute(tenant_id, request).await
    }

    /// Queries a merchant's business configuration.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn query_merchant_config(
        &self,
        tenant_id: &str,
        huifu_id: &str,
    ) -> Result<CallResult> {
        let request =
            OperationRequest::new(Operation::QueryMerchantConfig).field("huifu_id", huifu_id);
        self.execute(tenant_id, request).await
    }

    /// Queries a merchant's basic data.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn query_merchant_info(
        &self,
        tenant_id: &str,
        huifu_id: &str,
        extensions: Params,
    ) -> Result<CallResult> {
        let request = OperationRequest::new(Operation::QueryMerchantInfo)
            .field("huifu_id", huifu_id)
            .extensions(extensions);
        self.execute(tenant_id, request).await
    }
}

/// Fields of a WeChat official-account binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerchantBinding {
    /// Provider merchant identifier.
    pub huifu_id: String,
    /// WeChat official-account app id.
    pub wx_woa_app_id: String,
    /// WeChat official-account page path.
    pub wx_woa_path: String,
    /// Fee type code.
    pub fee_type: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_missing_required_field() {
        let err = OperationRequest::new(Operation::ConfigureMerchant)
            .field("huifu_id", "X")
            .field("wx_woa_app_id", "wx1")
            .field("fee_type", "02")
            .into_call_request()
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(ref m) if m.contains("wx_woa_path")));
    }

    #[test]
    fn test_blank_and_null_fields_are_missing() {
        let err = OperationRequest::new(Operation::QueryMerchantConfig)
            .field("huifu_id", "  ")
            .into_call_request()
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));

        let err = OperationRequest::new(Operation::QueryMerchantConfig)
            .field("huifu_id", Value::Null)
            .into_call_request()
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[test]
    fn test_extensions_never_overwrite() {
        let extensions = json!({
            "huifu_id": "attacker",
            "req_date": "19700101",
            "wx_woa_path": "evil",
            "remark": "kept",
        });
        let request = OperationRequest::new(Operation::ConfigureMerchant)
            .field("huifu_id", "X")
            .field("wx_woa_app_id", "wx1")
            .field("wx_woa_path", "pages/index")
            .field("fee_type", "02")
            .extensions(extensions.as_object().cloned().unwrap())
            .into_call_request()
            .unwrap();

        assert_eq!(request.endpoint, "/v2/merchant/busi/config");
        assert_eq!(request.params["huifu_id"], "X");
        assert_eq!(request.params["wx_woa_path"], "pages/index");
        assert_ne!(request.params["req_date"], "19700101");
        assert_eq!(request.params["remark"], "kept");
    }

    #[test]
    fn test_generated_identifiers() {
        let request = OperationRequest::new(Operation::QueryMerchantInfo)
            .field("huifu_id", "X")
            .into_call_request()
            .unwrap();

        let date = request.params["req_date"].as_str().unwrap();
        assert_eq!(date.len(), 8);
        assert!(date.bytes().all(|b| b.is_ascii_digit()));

        let seq = request.params["req_seq_id"].as_str().unwrap();
        assert!(seq.len() >= 24, "{seq}");
    }

    #[test]
    fn test_req_seq_ids_are_unique() {
        let a = generate_req_seq_id();
        let b = generate_req_seq_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_operation_endpoints() {
        assert_eq!(Operation::ConfigureMerchant.endpoint(), "/v2/merchant/busi/config");
        assert_eq!(Operation::QueryMerchantConfig.endpoint(), "/v2/merchant/busi/config/query");
        assert_eq!(Operation::QueryMerchantInfo.endpoint(), "/v2/merchant/basicdata/query");
        assert_eq!(Operation::QueryMerchantInfo.to_string(), "query_merchant_info");
    }
}
