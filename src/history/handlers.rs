use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::dto::{HistoryItem, Pagination};
use super::repo::HistoryRecord;
use crate::auth::services::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/history", get(list_history))
        .route("/history/:id", get(get_history))
}

#[instrument(skip(state))]
pub async fn list_history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(p): Query<Pagination>,
) -> Result<Json<Vec<HistoryItem>>, ApiError> {
    let records = HistoryRecord::list_by_user(&state.db, user_id, p.limit, p.offset).await?;
    Ok(Json(records.into_iter().map(HistoryItem::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<HistoryItem>, ApiError> {
    let record = HistoryRecord::get(&state.db, user_id, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("History record not found".into()))?;
    Ok(Json(record.into()))
}
