//! Read-only CRM views for checking channel tags and individual cases.

use std::ops::RangeInclusive;

use {
    axum::{
        Json,
        extract::{Query, State, rejection::QueryRejection},
    },
    replywatch_alerts::ProvidersSummary,
    replywatch_bitrix::Activity,
    serde::Deserialize,
};

use crate::{
    error::{ApiError, ApiResult},
    server::AppState,
};

const DAYS: RangeInclusive<i64> = 1..=365;

#[derive(Debug, Deserialize)]
pub struct LastIncomingsQuery {
    #[serde(default = "default_days_30")]
    pub days: i64,
    #[serde(default = "default_last_incomings_limit")]
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct ProvidersSummaryQuery {
    #[serde(default = "default_days_30")]
    pub days: i64,
    #[serde(default = "default_summary_limit")]
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct ActivitiesByEntityQuery {
    pub owner_type_id: Option<i64>,
    pub owner_id: Option<i64>,
    #[serde(default = "default_days_60")]
    pub days: i64,
    #[serde(default = "default_by_entity_limit")]
    pub limit: i64,
}

fn default_days_30() -> i64 {
    30
}

fn default_days_60() -> i64 {
    60
}

fn default_last_incomings_limit() -> i64 {
    100
}

fn default_summary_limit() -> i64 {
    2000
}

fn default_by_entity_limit() -> i64 {
    200
}

fn in_range(name: &str, value: i64, range: RangeInclusive<i64>) -> ApiResult<()> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ApiError::Validation(format!(
            "{name} must be between {} and {}, got {value}",
            range.start(),
            range.end()
        )))
    }
}

fn required(name: &str, value: Option<i64>) -> ApiResult<i64> {
    value.ok_or_else(|| ApiError::Validation(format!("{name} is required")))
}

/// Bounds are checked before the cast, so these fit.
fn days_limit(days: i64, limit: i64) -> (u32, usize) {
    (days as u32, limit as usize)
}

/// `GET /debug/last-incomings`: newest inbound activities.
pub async fn last_incomings(
    State(state): State<AppState>,
    query: Result<Query<LastIncomingsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Activity>>> {
    let Query(q) = query?;
    in_range("days", q.days, DAYS)?;
    in_range("limit", q.limit, 1..=500)?;

    let (days, limit) = days_limit(q.days, q.limit);
    let rows = state.gateway.inspector.last_incomings(days, limit).await?;
    Ok(Json(rows))
}

/// `GET /debug/providers-summary`: inbound counts per channel tag.
pub async fn providers_summary(
    State(state): State<AppState>,
    query: Result<Query<ProvidersSummaryQuery>, QueryRejection>,
) -> ApiResult<Json<ProvidersSummary>> {
    let Query(q) = query?;
    in_range("days", q.days, DAYS)?;
    in_range("limit", q.limit, 100..=10_000)?;

    let (days, limit) = days_limit(q.days, q.limit);
    let summary = state.gateway.inspector.providers_summary(days, limit).await?;
    Ok(Json(summary))
}

/// `GET /debug/activities-by-entity`: everything logged against one record.
pub async fn activities_by_entity(
    State(state): State<AppState>,
    query: Result<Query<ActivitiesByEntityQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Activity>>> {
    let Query(q) = query?;
    let owner_type_id = required("owner_type_id", q.owner_type_id)?;
    let owner_id = required("owner_id", q.owner_id)?;
    in_range("days", q.days, DAYS)?;
    in_range("limit", q.limit, 1..=1000)?;

    let (days, limit) = days_limit(q.days, q.limit);
    let rows = state
        .gateway
        .inspector
        .activities_by_entity(owner_type_id, owner_id, days, limit)
        .await?;
    Ok(Json(rows))
}
