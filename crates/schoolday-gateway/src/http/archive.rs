//! Operator archival triggers: POST /archive, POST /archive/backfill
//!
//! Auth: same `Authorization: Bearer <token>` as `/sync/push`.
//!
//! Query: `?date=YYYY-MM-DD&force=true` (date defaults to today)
//! Response: `{"success": true, "message": "...", "logs": [...], "stats": {"schoolsUpdated": 0, "recordsCount": 0}}`

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{Duration, Utc};
use schoolday_core::types::parse_date;
use schoolday_history::{ArchiveMode, ArchiveOutcome};
use serde::Deserialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::check_auth;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct ArchiveQuery {
    pub date: Option<String>,
    #[serde(default)]
    pub force: bool,
}

pub async fn archive_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ArchiveQuery>,
) -> Result<Json<ArchiveOutcome>, ApiError> {
    check_auth(&state, &headers)?;
    let date = match query.date.as_deref() {
        Some(d) => parse_date(d)?,
        None => Utc::now().date_naive(),
    };
    let mode = if query.force {
        ArchiveMode::Force
    } else {
        ArchiveMode::Nightly
    };
    Ok(Json(state.archive.archive_date(date, mode).await))
}

/// Backfills through yesterday.
pub async fn backfill_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ArchiveOutcome>, ApiError> {
    check_auth(&state, &headers)?;
    let until = (Utc::now() - Duration::days(1)).date_naive();
    Ok(Json(state.archive.backfill(until, None).await))
}
