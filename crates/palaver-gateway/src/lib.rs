//! Palaver Gateway
//!
//! HTTP front door for the conversation hub:
//! - `POST /chat`, `GET /history`, `POST /clear` routed by conversation id
//! - CORS and optional static asset serving
//! - Prometheus metrics and configuration

pub mod config;
pub mod error;
pub mod metrics;
pub mod router;

pub use config::{GatewayConfig, LogFormat};
pub use error::GatewayError;
pub use router::{build_app, build_routes, AppState};

/// Gateway version
pub const GATEWAY_VERSION: &str = env!("CARGO_PKG_VERSION");
