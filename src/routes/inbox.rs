use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::dto::inbox_dto::PreferencesUpdate;
use crate::error::{Error, Result};
use crate::routes::recipient_id;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let recipient = recipient_id(&headers)?;
    let notifications = state
        .inbox
        .list(recipient, query.limit.unwrap_or(50))
        .await?;
    Ok(Json(notifications))
}

pub async fn unread_count(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let recipient = recipient_id(&headers)?;
    let count = state.inbox.unread_count(recipient).await?;
    Ok(Json(json!({ "unread": count })))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let recipient = recipient_id(&headers)?;
    let updated = state
        .inbox
        .mark_read(recipient, id)
        .await?
        .ok_or_else(|| Error::NotFound("Notification not found".to_string()))?;
    Ok(Json(updated))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let recipient = recipient_id(&headers)?;
    let updated = state.inbox.mark_all_read(recipient).await?;
    Ok(Json(json!({ "updated": updated })))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let recipient = recipient_id(&headers)?;
    state
        .inbox
        .delete(recipient, id)
        .await?
        .ok_or_else(|| Error::NotFound("Notification not found".to_string()))?;
    Ok(Json(json!({ "deleted": true })))
}

pub async fn get_preferences(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let recipient = recipient_id(&headers)?;
    let prefs = state.inbox.preferences(recipient).await?;
    Ok(Json(prefs))
}

pub async fn update_preferences(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PreferencesUpdate>,
) -> Result<impl IntoResponse> {
    let recipient = recipient_id(&headers)?;
    let prefs = state.inbox.update_preferences(recipient, payload).await?;
    Ok(Json(prefs))
}
