use std::sync::Arc;

use {
    axum::{
        Json,
        extract::{Query, State, rejection::QueryRejection},
    },
    replywatch_cron::{ScanRunRecord, ScanScheduler, SchedulerStatus},
    serde::Deserialize,
};

use crate::{
    error::{ApiError, ApiResult},
    server::AppState,
};

#[derive(Debug, Deserialize)]
pub struct RunsQuery {
    #[serde(default = "default_runs_limit")]
    pub limit: usize,
}

fn default_runs_limit() -> usize {
    20
}

fn scheduler(state: &AppState) -> ApiResult<&Arc<ScanScheduler>> {
    state
        .gateway
        .scheduler
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("scheduler is disabled".into()))
}

pub async fn status(State(state): State<AppState>) -> ApiResult<Json<SchedulerStatus>> {
    Ok(Json(scheduler(&state)?.status().await))
}

/// Newest first.
pub async fn runs(
    State(state): State<AppState>,
    query: Result<Query<RunsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<ScanRunRecord>>> {
    let Query(q) = query?;
    Ok(Json(scheduler(&state)?.runs(q.limit).await))
}

/// Run the scheduled job now; `409` while another run is in progress.
pub async fn run_now(State(state): State<AppState>) -> ApiResult<Json<ScanRunRecord>> {
    let record = scheduler(&state)?.run_now().await?;
    Ok(Json(record))
}
