//! HTTP API: health, manual scans, CRM event echo, debug views and the
//! scheduler controls.

pub mod debug_routes;
pub mod error;
#[cfg(feature = "metrics")]
pub mod metrics_middleware;
#[cfg(feature = "prometheus")]
pub mod metrics_routes;
pub mod scheduler_routes;
pub mod server;
pub mod state;

pub use {
    error::{ApiError, ApiResult},
    server::{AppState, build_gateway_app, start_gateway},
    state::GatewayState,
};
