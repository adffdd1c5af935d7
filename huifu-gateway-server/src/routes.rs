//! HTTP routes.
//!
//! A thin JSON layer over the tenant registry and the call façade. Handlers
//! shape requests and responses; every decision lives in `huifu_gateway`.

use std::{sync::Arc, time::Instant};

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use huifu_gateway::{
    CallFacade, GatewayError, TenantRegistry,
    error::ErrorKind,
    facade::MerchantBinding,
    model::{CallResult, CredentialBundle, Environment, Params, PrivateKeyMaterial},
    signing::generate_test_key_pair,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, warn};

use crate::observability::{HealthCheck, HealthReport};

/// Key size used by the test key generator.
const TEST_KEY_BITS: u32 = 2048;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    registry: Arc<TenantRegistry>,
    facade: CallFacade,
    provider_enabled: bool,
    started: Instant,
}

impl AppState {
    /// Creates handler state over `registry`.
    #[must_use]
    pub fn new(registry: Arc<TenantRegistry>, provider_enabled: bool) -> Self {
        Self {
            facade: CallFacade::new(Arc::clone(&registry)),
            registry,
            provider_enabled,
            started: Instant::now(),
        }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
        ]);

    Router::new()
        .route("/health", get(health))
        .route("/api/config", post(register_tenant))
        .route("/api/config/{sys_id}", delete(revoke_tenant))
        .route("/api/configs", get(list_tenants))
        .route("/api/test-config", post(test_config))
        .route("/api/wechat-config", post(configure_wechat_merchant))
        .route("/api/wechat-config-query", post(query_wechat_config))
        .route("/api/generate-test-key", get(generate_test_key))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// JSON error body: `{error, details}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    details: String,
}

impl ApiError {
    fn invalid_request(details: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, error: "Invalid request", details: details.into() }
    }

    fn internal(details: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: "Internal error",
            details: details.into(),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let (status, error) = match err.kind() {
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "Configuration not found"),
            ErrorKind::Validation => (StatusCode::BAD_REQUEST, "Invalid request"),
            ErrorKind::Key => (StatusCode::BAD_REQUEST, "Invalid key material"),
            ErrorKind::UnsupportedOperation => {
                (StatusCode::UNPROCESSABLE_ENTITY, "Unsupported operation")
            }
            ErrorKind::Transport => (StatusCode::BAD_GATEWAY, "Provider call failed"),
            ErrorKind::Signing | ErrorKind::Cleanup | ErrorKind::Config => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        };
        Self { status, error, details: err.to_string() }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), details = %self.details, "request failed");
        } else {
            warn!(status = self.status.as_u16(), details = %self.details, "request rejected");
        }
        (self.status, Json(json!({"error": self.error, "details": self.details}))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::invalid_request(format!("{field} is required")));
    }
    Ok(())
}

fn call_body(result: CallResult, extra: Value) -> Value {
    let mut body = json!({
        "message": result.payload,
        "resp_code": result.response_code,
        "resp_desc": result.response_description,
    });
    if let (Some(body), Value::Object(extra)) = (body.as_object_mut(), extra) {
        body.extend(extra);
    }
    body
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    sys_id: String,
    product_id: String,
    rsa_private_key: String,
    #[serde(default)]
    environment: Option<String>,
}

async fn register_tenant(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    let environment: Environment = request.environment.as_deref().unwrap_or_default().parse()?;
    let bundle = CredentialBundle::new(
        request.sys_id,
        request.product_id,
        PrivateKeyMaterial::new(request.rsa_private_key),
        environment,
    )?;

    let registration = state.registry.register(bundle).await?;
    Ok(Json(json!({
        "message": "Configuration saved successfully",
        "sys_id": registration.tenant_id,
        "backend": registration.backend,
        "replaced": registration.replaced,
        "warnings": registration.warnings,
    })))
}

async fn revoke_tenant(State(state): State<AppState>, Path(sys_id): Path<String>) -> ApiResult {
    require("sys_id", &sys_id)?;
    let revocation = state.registry.revoke(&sys_id).await?;
    Ok(Json(json!({
        "message": "Configuration deleted successfully",
        "sys_id": revocation.tenant_id,
        "warnings": revocation.warnings,
    })))
}

async fn list_tenants(State(state): State<AppState>) -> Json<Value> {
    let mut configs = state.registry.list().await;
    configs.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
    Json(json!({"count": configs.len(), "configs": configs}))
}

#[derive(Debug, Deserialize)]
struct TestConfigRequest {
    #[serde(default)]
    sys_id: String,
}

/// Exercises a tenant's client with a basic-data query on its own system id.
async fn test_config(
    State(state): State<AppState>,
    payload: Result<Json<TestConfigRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    require("sys_id", &request.sys_id)?;

    let mut extensions = Params::new();
    extensions.insert("test".to_owned(), Value::Bool(true));
    let result =
        state.facade.query_merchant_info(&request.sys_id, &request.sys_id, extensions).await?;

    Ok(Json(call_body(
        result,
        json!({"status": "success", "sys_id": request.sys_id, "summary": "Configuration is valid"}),
    )))
}

#[derive(Debug, Deserialize)]
struct WechatConfigRequest {
    #[serde(default)]
    sys_id: String,
    #[serde(default)]
    huifu_id: String,
    #[serde(default)]
    wx_woa_app_id: String,
    #[serde(default)]
    wx_woa_path: String,
    #[serde(default)]
    fee_type: String,
    #[serde(default)]
    extend_infos: Params,
}

async fn configure_wechat_merchant(
    State(state): State<AppState>,
    payload: Result<Json<WechatConfigRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    require("sys_id", &request.sys_id)?;

    let binding = MerchantBinding {
        huifu_id: request.huifu_id.clone(),
        wx_woa_app_id: request.wx_woa_app_id.clone(),
        wx_woa_path: request.wx_woa_path,
        fee_type: request.fee_type,
    };
    let result =
        state.facade.configure_merchant(&request.sys_id, binding, request.extend_infos).await?;

    Ok(Json(call_body(
        result,
        json!({"huifu_id": request.huifu_id, "wx_app_id": request.wx_woa_app_id}),
    )))
}

#[derive(Debug, Deserialize)]
struct WechatConfigQuery {
    #[serde(default)]
    sys_id: String,
    #[serde(default)]
    huifu_id: String,
}

async fn query_wechat_config(
    State(state): State<AppState>,
    payload: Result<Json<WechatConfigQuery>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    require("sys_id", &request.sys_id)?;

    let result = state.facade.query_merchant_config(&request.sys_id, &request.huifu_id).await?;
    Ok(Json(call_body(result, json!({"huifu_id": request.huifu_id}))))
}

async fn generate_test_key() -> ApiResult {
    let pair = tokio::task::spawn_blocking(|| generate_test_key_pair(TEST_KEY_BITS))
        .await
        .map_err(|e| ApiError::internal(format!("key generation task failed: {e}")))??;

    Ok(Json(json!({
        "private_key": pair.private_key_pem,
        "public_key": pair.public_key_pem,
        "message": "Test RSA key pair generated successfully",
    })))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let tenants = state.registry.len().await;
    let provider = if state.provider_enabled {
        HealthCheck::pass("provider_backend", "enabled")
    } else {
        HealthCheck::warn(
            "provider_backend",
            "disabled, tenants are served by the simulated backend",
        )
    };
    let registry = HealthCheck::pass("registry", format!("{tenants} tenants registered"));
    let checks = vec![registry, provider];

    Json(HealthReport::new(state.started.elapsed().as_secs(), tenants, checks).to_json())
}
