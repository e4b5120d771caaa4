//! Change polling: GET /sync/poll, POST /sync/push
//!
//! Clients poll on a fixed interval with the `latestTs` of their previous
//! response. Nothing is held open. When `resync` comes back true the client
//! must refetch its data before continuing from the new `latestTs`.
//!
//! Poll:  `?since=<ts>&channels=teacher,event`
//! Reply: `{"latestTs": 0, "count": 0, "items": [], "resync": false, "pollIntervalSecs": 30}`
//!
//! Push (server-to-server, bearer auth): `?type=<channel>&schoolId=<id>&date=<YYYY-MM-DD>`
//! Reply: `{"ts": 0}`

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use schoolday_core::types::parse_date;
use schoolday_core::Channel;
use schoolday_sync::PollResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::check_auth;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct PollQuery {
    #[serde(default)]
    pub since: u64,
    /// Comma-separated channel names; all channels when absent or empty.
    #[serde(default)]
    pub channels: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    #[serde(flatten)]
    pub result: PollResult,
    pub poll_interval_secs: u64,
}

pub async fn poll_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PollQuery>,
) -> Result<Json<PollResponse>, ApiError> {
    let channels = Channel::parse_list(&query.channels)?;
    Ok(Json(PollResponse {
        result: state.bus.poll(query.since, &channels),
        poll_interval_secs: state.config.sync.poll_interval_secs,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushQuery {
    #[serde(rename = "type")]
    pub channel: String,
    pub school_id: String,
    pub date: Option<String>,
}

pub async fn push_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<PushQuery>,
) -> Result<Json<Value>, ApiError> {
    check_auth(&state, &headers)?;
    let channel: Channel = query.channel.parse()?;
    let date = query.date.as_deref().map(parse_date).transpose()?;
    let ts = state.bus.publish(channel, &query.school_id, date);
    Ok(Json(json!({ "ts": ts })))
}
