use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;
use crate::error::{blocking, ApiError};

/// GET /recommend/{school}/{day}: `day` is 1 (Sunday) through 7.
///
/// Response: `{"success": true, "data": {"3": {"Dana": ["Eli", "Noa"]}}}`
pub async fn recommend_handler(
    State(state): State<Arc<AppState>>,
    Path((school, day)): Path<(String, u8)>,
) -> Result<Json<Value>, ApiError> {
    let recommender = state.recommender.clone();
    let data = blocking(move || recommender.recommend(&school, day)).await?;
    Ok(Json(json!({ "success": true, "data": data })))
}
