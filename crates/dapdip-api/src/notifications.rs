use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use dapdip_types::api::{
    Claims, NotificationResponse, NotificationsResponse, UnreadCountResponse,
};
use dapdip_types::time::parse_db_timestamp;

use crate::error::ApiError;
use crate::parse_uuid;
use crate::state::{AppState, blocking};

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub before: Option<Uuid>,
}

fn default_limit() -> u32 {
    20
}

/// Best-effort insert — a failed notification is logged, never surfaced to
/// the request that triggered it.
pub(crate) fn notify(
    state: &AppState,
    user_id: &str,
    actor_id: &str,
    kind: &str,
    subject_id: Option<&str>,
) {
    let id = Uuid::new_v4().to_string();
    if let Err(e) = state
        .db
        .insert_notification(&id, user_id, actor_id, kind, subject_id)
    {
        warn!("failed to insert {} notification: {}", kind, e);
    }
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.clamp(1, 100);
    let db = state.db.clone();
    let uid = claims.sub.to_string();
    let unread = query.unread;
    let before = query.before.map(|id| id.to_string());
    let rows =
        blocking(move || db.notifications(&uid, unread, limit, before.as_deref())).await?;

    let next_cursor = if rows.len() == limit as usize {
        rows.last().map(|row| parse_uuid(&row.id, "notification id"))
    } else {
        None
    };

    Ok(Json(NotificationsResponse {
        notifications: rows
            .into_iter()
            .map(|row| NotificationResponse {
                id: parse_uuid(&row.id, "notification id"),
                actor_id: parse_uuid(&row.actor_id, "actor id"),
                actor_username: row.actor_username,
                kind: row.kind,
                subject_id: row.subject_id.as_deref().and_then(|s| s.parse().ok()),
                read: row.read,
                created_at: parse_db_timestamp(&row.created_at),
            })
            .collect(),
        next_cursor,
    }))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let count = state.db.unread_count(&claims.sub.to_string())?;
    Ok(Json(UnreadCountResponse { count }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let marked = state
        .db
        .mark_read(&notification_id.to_string(), &claims.sub.to_string())?;

    if !marked {
        // Someone else's notification looks identical to a missing one.
        return Err(ApiError::NotFound("notification not found".into()));
    }

    Ok(Json(serde_json::json!({ "read": true })))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state.db.mark_all_read(&claims.sub.to_string())?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}
