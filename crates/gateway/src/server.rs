use std::{future::Future, net::SocketAddr, sync::Arc};

use {
    axum::{
        Json, Router,
        body::Bytes,
        extract::State,
        response::IntoResponse,
        routing::{get, post},
    },
    chrono::Utc,
    serde_json::{Value, json},
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{info, warn},
};

use crate::{
    debug_routes,
    error::ApiResult,
    scheduler_routes,
    state::GatewayState,
};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayState>,
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let app_state = AppState { gateway: state };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/run-scan", post(run_scan_handler))
        .route("/bitrix/events", post(bitrix_events_handler))
        .route("/debug/last-incomings", get(debug_routes::last_incomings))
        .route(
            "/debug/providers-summary",
            get(debug_routes::providers_summary),
        )
        .route(
            "/debug/activities-by-entity",
            get(debug_routes::activities_by_entity),
        )
        .route("/api/scheduler/status", get(scheduler_routes::status))
        .route("/api/scheduler/runs", get(scheduler_routes::runs))
        .route("/api/scheduler/run", post(scheduler_routes::run_now));

    #[cfg(feature = "prometheus")]
    let router = router.route(
        "/metrics",
        get(crate::metrics_routes::prometheus_metrics_handler),
    );

    #[cfg(feature = "metrics")]
    let router = router.route_layer(axum::middleware::from_fn(
        crate::metrics_middleware::http_metrics_middleware,
    ));

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Serve the API until `shutdown` resolves.
pub async fn start_gateway(
    bind: &str,
    port: u16,
    state: Arc<GatewayState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    let app = build_gateway_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "replywatch gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let tz = state.gateway.timezone;
    Json(json!({
        "ok": true,
        "time": Utc::now().with_timezone(&tz).to_rfc3339(),
        "timezone": tz.name(),
        "version": state.gateway.version,
    }))
}

/// Detect, format and deliver the digest right now.
///
/// On failure the sink also receives a short error notice.
async fn run_scan_handler(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let report = state.gateway.scan.run_and_report().await?;
    Ok(Json(json!({
        "alerts": report.alerts,
        "sent": report.sent,
    })))
}

/// Acknowledge a CRM outbound event by echoing it back.
///
/// Bodies that are not JSON are echoed as a string.
async fn bitrix_events_handler(body: Bytes) -> impl IntoResponse {
    let echo = match serde_json::from_slice::<Value>(&body) {
        Ok(value) => value,
        Err(_) => {
            let text = String::from_utf8_lossy(&body).into_owned();
            warn!(bytes = body.len(), "non-JSON bitrix event body");
            Value::String(text)
        },
    };
    Json(json!({ "result": "ok", "echo": echo }))
}
