use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::dto::broadcast_dto::{
    AudiencePreviewPayload, CreateBroadcastPayload, CreateTemplatePayload, SchedulePayload,
    UpdateBroadcastPayload,
};
use crate::error::Result;
use crate::models::broadcast::{BroadcastStatus, ChannelKind};
use crate::models::message::MessageStatus;
use crate::routes::actor_id;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub status: Option<String>,
    pub channel: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub communication_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TemplatesQuery {
    pub channel: Option<String>,
}

pub async fn create_broadcast(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateBroadcastPayload>,
) -> Result<impl IntoResponse> {
    let actor = actor_id(&headers)?;
    payload.validate()?;
    let broadcast = state.broadcasts.create(actor, payload).await?;
    Ok((StatusCode::CREATED, Json(broadcast)))
}

pub async fn list_broadcasts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let status = query.status.as_deref().and_then(BroadcastStatus::parse);
    let broadcasts = state
        .broadcasts
        .list(status, query.limit.unwrap_or(50))
        .await?;
    Ok(Json(broadcasts))
}

pub async fn get_broadcast(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let broadcast = state.broadcasts.get(id).await?;
    Ok(Json(broadcast))
}

pub async fn update_broadcast(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<UpdateBroadcastPayload>,
) -> Result<impl IntoResponse> {
    let actor = actor_id(&headers)?;
    payload.validate()?;
    let broadcast = state.broadcasts.update(actor, id, payload).await?;
    Ok(Json(broadcast))
}

pub async fn schedule_broadcast(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<SchedulePayload>,
) -> Result<impl IntoResponse> {
    let actor = actor_id(&headers)?;
    let broadcast = state
        .broadcasts
        .schedule(actor, id, payload.scheduled_at)
        .await?;
    Ok(Json(broadcast))
}

/// Moves the broadcast to `sending` and kicks the fan-out off in the
/// background; the operator follows progress through the live counters.
pub async fn send_broadcast(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let actor = actor_id(&headers)?;
    let broadcast = state.broadcasts.begin_sending(actor, id).await?;

    let dispatch = state.dispatch.clone();
    tokio::spawn(async move {
        if let Err(e) = dispatch.run(id, actor).await {
            tracing::error!(broadcast_id = %id, error = %e, "broadcast dispatch failed");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(broadcast)))
}

pub async fn cancel_broadcast(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let actor = actor_id(&headers)?;
    let broadcast = state.broadcasts.cancel(actor, id).await?;
    Ok(Json(broadcast))
}

pub async fn list_broadcast_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> Result<impl IntoResponse> {
    let status = query.status.as_deref().and_then(MessageStatus::parse);
    let channel = query.channel.as_deref().and_then(ChannelKind::parse);
    let messages = state
        .stores
        .messages
        .list_for_broadcast(id, status, channel)
        .await?;
    Ok(Json(messages))
}

pub async fn broadcast_stats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let broadcast = state.broadcasts.get(id).await?;
    let stats = state.broadcasts.stats(id).await?;
    Ok(Json(json!({
        "status": broadcast.status,
        "total_recipients": broadcast.total_recipients,
        "total_sent": broadcast.total_sent,
        "total_failed": broadcast.total_failed,
        "total_excluded": broadcast.total_excluded,
        "messages": stats,
    })))
}

pub async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<impl IntoResponse> {
    let logs = state
        .broadcasts
        .logs(query.communication_id, query.limit.unwrap_or(100))
        .await?;
    Ok(Json(logs))
}

/// Live audience estimate while the operator edits a filter.
pub async fn preview_audience(
    State(state): State<AppState>,
    Json(payload): Json<AudiencePreviewPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let count = state.audience.count(&payload.filter).await?;
    let sample = state
        .audience
        .preview(&payload.filter, payload.limit.unwrap_or(10))
        .await?;
    Ok(Json(json!({ "count": count, "sample": sample })))
}

pub async fn create_template(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateTemplatePayload>,
) -> Result<impl IntoResponse> {
    actor_id(&headers)?;
    payload.validate()?;
    let template = state.broadcasts.create_template(payload).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn list_templates(
    State(state): State<AppState>,
    Query(query): Query<TemplatesQuery>,
) -> Result<impl IntoResponse> {
    let channel = query.channel.as_deref().and_then(ChannelKind::parse);
    let templates = state.stores.templates.list_active(channel).await?;
    Ok(Json(templates))
}

pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let template = state.stores.templates.fetch(id).await?;
    Ok(Json(template))
}
