use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use dapdip_db::models::StreamRow;
use dapdip_types::api::{
    Claims, CreateStreamRequest, StreamChatResponse, StreamMessageResponse, StreamResponse,
};
use dapdip_types::events::StreamEvent;
use dapdip_types::time::parse_db_timestamp;

use crate::error::ApiError;
use crate::parse_uuid;
use crate::posts::FeedQuery;
use crate::state::{AppState, blocking};

const MAX_TITLE_LEN: usize = 100;

async fn to_stream_response(state: &AppState, row: StreamRow) -> StreamResponse {
    let stream_id = parse_uuid(&row.id, "stream id");
    StreamResponse {
        id: stream_id,
        host_id: parse_uuid(&row.host_id, "host id"),
        host_username: row.host_username,
        title: row.title,
        live: row.live,
        viewer_count: state.dispatcher.viewer_count(stream_id).await,
        started_at: parse_db_timestamp(&row.started_at),
        ended_at: row.ended_at.as_deref().map(parse_db_timestamp),
    }
}

pub async fn create_stream(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateStreamRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.trim().to_string();
    if title.is_empty() || title.len() > MAX_TITLE_LEN {
        return Err(ApiError::BadRequest(format!(
            "title must be 1-{} characters",
            MAX_TITLE_LEN
        )));
    }

    if state.db.host_live_stream(&claims.sub.to_string())?.is_some() {
        return Err(ApiError::BadRequest(
            "you already have a live stream, end it first".into(),
        ));
    }

    let stream_id = Uuid::new_v4();
    state
        .db
        .insert_stream(&stream_id.to_string(), &claims.sub.to_string(), &title)?;

    let row = state
        .db
        .get_stream(&stream_id.to_string())?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("stream vanished after insert")))?;

    Ok((
        StatusCode::CREATED,
        Json(to_stream_response(&state, row).await),
    ))
}

pub async fn list_streams(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let rows = blocking(move || db.live_streams()).await?;

    let mut streams = Vec::with_capacity(rows.len());
    for row in rows {
        streams.push(to_stream_response(&state, row).await);
    }

    Ok(Json(streams))
}

pub async fn get_stream(
    State(state): State<AppState>,
    Path(stream_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .db
        .get_stream(&stream_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("stream not found".into()))?;

    Ok(Json(to_stream_response(&state, row).await))
}

pub async fn end_stream(
    State(state): State<AppState>,
    Path(stream_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .db
        .get_stream(&stream_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("stream not found".into()))?;

    if row.host_id != claims.sub.to_string() {
        return Err(ApiError::Forbidden("only the host can end a stream".into()));
    }
    if !row.live {
        return Err(ApiError::BadRequest("stream already ended".into()));
    }

    state.db.end_stream(&stream_id.to_string())?;

    // Tell viewers before dropping their state.
    state
        .dispatcher
        .broadcast(StreamEvent::StreamEnded { stream_id });
    state.dispatcher.clear_stream(stream_id).await;

    Ok(Json(serde_json::json!({ "ended": true })))
}

pub async fn chat_history(
    State(state): State<AppState>,
    Path(stream_id): Path<Uuid>,
    Query(query): Query<FeedQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    if state.db.get_stream(&stream_id.to_string())?.is_none() {
        return Err(ApiError::NotFound("stream not found".into()));
    }

    let limit = query.limit.clamp(1, 100);
    let db = state.db.clone();
    let sid = stream_id.to_string();
    let before = query.before.map(|id| id.to_string());
    let rows = blocking(move || db.stream_messages(&sid, limit, before.as_deref())).await?;

    let next_cursor = if rows.len() == limit as usize {
        rows.last().map(|row| parse_uuid(&row.id, "message id"))
    } else {
        None
    };

    Ok(Json(StreamChatResponse {
        messages: rows
            .into_iter()
            .map(|row| StreamMessageResponse {
                id: parse_uuid(&row.id, "message id"),
                stream_id: parse_uuid(&row.stream_id, "stream id"),
                author_id: parse_uuid(&row.author_id, "author id"),
                author_username: row.author_username,
                content: row.content,
                created_at: parse_db_timestamp(&row.created_at),
            })
            .collect(),
        next_cursor,
    }))
}
