//! Live schedule routes under `/schedule/{school}/{date}`.
//!
//! Writes go through the schedule store, which publishes the matching
//! change notification after commit. Cell bodies are tagged payloads:
//! `{"type": "missingTeacher", "issueTeacher": "t1", "subTeacher": "t2"}`.

use axum::{
    extract::{Path, State},
    Json,
};
use schoolday_core::types::parse_date;
use schoolday_schedule::{CellPayload, DaySchedule, ScheduleCell, ScheduleStore};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;
use crate::error::{blocking, ApiError};

type DayPath = Path<(String, String)>;
type ColumnPath = Path<(String, String, String)>;
type CellPath = Path<(String, String, String, u32)>;

pub async fn get_day(
    State(state): State<Arc<AppState>>,
    Path((school, date)): DayPath,
) -> Result<Json<DaySchedule>, ApiError> {
    let date = parse_date(&date)?;
    let store = state.store.clone();
    let day = blocking(move || store.get_day(&school, date)).await?;
    Ok(Json(day))
}

pub async fn upsert_cell(
    State(state): State<Arc<AppState>>,
    Path((school, date, column, hour)): CellPath,
    Json(payload): Json<CellPayload>,
) -> Result<Json<ScheduleCell>, ApiError> {
    let date = parse_date(&date)?;
    let store = state.store.clone();
    let cell = blocking(move || store.upsert_cell(&school, date, &column, hour, payload)).await?;
    Ok(Json(cell))
}

#[derive(Deserialize)]
pub struct CellWrite {
    pub hour: u32,
    pub payload: CellPayload,
}

#[derive(Deserialize)]
pub struct CellBatch {
    pub cells: Vec<CellWrite>,
}

/// PUT on a column: several hours in one write and one notification.
pub async fn upsert_cells(
    State(state): State<Arc<AppState>>,
    Path((school, date, column)): ColumnPath,
    Json(batch): Json<CellBatch>,
) -> Result<Json<Vec<ScheduleCell>>, ApiError> {
    let date = parse_date(&date)?;
    let writes = batch
        .cells
        .into_iter()
        .map(|w| (w.hour, w.payload))
        .collect();
    let store = state.store.clone();
    let cells = blocking(move || store.upsert_cells(&school, date, &column, writes)).await?;
    Ok(Json(cells))
}

/// POST on the day's columns: create a column under a server-minted id.
pub async fn create_column(
    State(state): State<Arc<AppState>>,
    Path((school, date)): DayPath,
    Json(batch): Json<CellBatch>,
) -> Result<Json<Value>, ApiError> {
    let date = parse_date(&date)?;
    let writes = batch
        .cells
        .into_iter()
        .map(|w| (w.hour, w.payload))
        .collect();
    let column = ScheduleStore::new_column_id();
    let store = state.store.clone();
    let id = column.clone();
    let cells = blocking(move || store.upsert_cells(&school, date, &id, writes)).await?;
    Ok(Json(json!({ "columnId": column, "cells": cells })))
}

pub async fn delete_cell(
    State(state): State<Arc<AppState>>,
    Path((school, date, column, hour)): CellPath,
) -> Result<Json<Value>, ApiError> {
    let date = parse_date(&date)?;
    let store = state.store.clone();
    let deleted = blocking(move || store.delete_cell(&school, date, &column, hour)).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

pub async fn delete_column(
    State(state): State<Arc<AppState>>,
    Path((school, date, column)): ColumnPath,
) -> Result<Json<Value>, ApiError> {
    let date = parse_date(&date)?;
    let store = state.store.clone();
    let removed = blocking(move || store.delete_column(&school, date, &column)).await?;
    Ok(Json(json!({ "removed": removed })))
}

/// Either `after` (a neighbour column id, or null for the front) or an
/// explicit client-computed `position`.
#[derive(Deserialize)]
pub struct MoveRequest {
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
}

pub async fn move_column(
    State(state): State<Arc<AppState>>,
    Path((school, date, column)): ColumnPath,
    Json(req): Json<MoveRequest>,
) -> Result<Json<Value>, ApiError> {
    let date = parse_date(&date)?;
    if req.after.is_some() && req.position.is_some() {
        return Err(ApiError::BadRequest(
            "give either 'after' or 'position', not both".to_string(),
        ));
    }
    let store = state.store.clone();
    let position = blocking(move || match req.position {
        Some(position) => store.place_column(&school, date, &column, position),
        None => store.move_column(&school, date, &column, req.after.as_deref()),
    })
    .await?;
    Ok(Json(json!({ "position": position })))
}

#[derive(Deserialize)]
pub struct PublishRequest {
    pub published: bool,
}

pub async fn set_published(
    State(state): State<Arc<AppState>>,
    Path((school, date)): DayPath,
    Json(req): Json<PublishRequest>,
) -> Result<Json<Value>, ApiError> {
    let date = parse_date(&date)?;
    let store = state.store.clone();
    let changed = blocking(move || store.set_published(&school, date, req.published)).await?;
    Ok(Json(json!({ "changed": changed })))
}
