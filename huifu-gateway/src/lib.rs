//! Huifu Gateway: Credential-Scoped Signing Clients for the Huifu Payment API
//!
//! Operators register per-merchant credentials (a system id, a product id and an
//! RSA private key). The gateway then issues signed API calls for those
//! merchants, so callers never handle signing or provider request shaping.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  HTTP layer      │  huifu-gateway-server (axum)
//! └────────┬─────────┘
//!          │ named operations
//! ┌────────▼─────────────────────────────────────────┐
//! │            huifu-gateway (this crate)            │
//! │  ┌────────────┐   ┌────────────────┐             │
//! │  │ CallFacade │──▶│ TenantRegistry │             │
//! │  └────────────┘   └───────┬────────┘             │
//! │                           │ register             │
//! │                   ┌───────▼────────┐             │
//! │                   │ ClientFactory  │ provider    │
//! │                   └───────┬────────┘ first,      │
//! │          ┌────────────────┴──────┐   simulated   │
//! │  ┌───────▼────────┐   ┌──────────▼───┐ fallback  │
//! │  │ ProviderClient │   │ Simulated    │           │
//! │  └───────┬────────┘   └──────────────┘           │
//! └──────────┼───────────────────────────────────────┘
//!            │ HTTPS, RSA-SHA256 signed
//! ┌──────────▼───────┐
//! │  Huifu API       │
//! └──────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use huifu_gateway::{
//!     client::ClientFactory,
//!     facade::{CallFacade, MerchantBinding},
//!     model::{CredentialBundle, Environment, Params, PrivateKeyMaterial},
//!     registry::TenantRegistry,
//!     signing::generate_test_key_pair,
//! };
//!
//! # async fn example() -> huifu_gateway::error::Result<()> {
//! let registry = Arc::new(TenantRegistry::new(ClientFactory::simulated_only()?));
//! let facade = CallFacade::new(Arc::clone(&registry));
//!
//! let pair = generate_test_key_pair(2048)?;
//! let bundle = CredentialBundle::new(
//!     "6666000000000001",
//!     "PAYUN",
//!     PrivateKeyMaterial::new(pair.private_key_pem),
//!     Environment::Test,
//! )?;
//! registry.register(bundle).await?;
//!
//! let merchant = MerchantBinding {
//!     huifu_id: "6666000000000002".to_owned(),
//!     wx_woa_app_id: "wx1234567890abcdef".to_owned(),
//!     wx_woa_path: "pages/index/index".to_owned(),
//!     fee_type: "02".to_owned(),
//! };
//! let result = facade.configure_merchant("6666000000000001", merchant, Params::new()).await?;
//! assert!(result.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`signing`]: canonical encoding, RSA-SHA256 signing and verification, key parsing
//! - [`client`]: the [`SigningClient`](client::SigningClient) sum type and its factory
//! - [`registry`]: concurrency-safe tenant registry
//! - [`facade`]: named operations (configure merchant, query config, query basic data)
//! - [`config`]: TOML configuration
//! - [`security`]: audit logging with redaction
//! - [`error`]: error taxonomy
//!
//! # Security Considerations
//!
//! - Private key material is zeroized on drop and never logged or listed
//! - Staged credential files are owner-only and removed on revoke, replacement or drop
//! - Provider base URLs must be HTTPS (plain HTTP is accepted for loopback only)
//! - Calls time out after 30 seconds by default and are never retried automatically

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![allow(
    clippy::multiple_crate_versions,
    reason = "transitive dependencies from josekit and reqwest"
)]

pub mod client;
pub mod config;
pub mod error;
pub mod facade;
pub mod model;
pub mod registry;
pub mod security;
pub mod signing;

pub use client::{ClientFactory, SigningClient};
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use facade::{CallFacade, Operation, OperationRequest};
pub use registry::TenantRegistry;
