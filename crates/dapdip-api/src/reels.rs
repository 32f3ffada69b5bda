use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use dapdip_db::models::{ReelCommentRow, ReelRow};
use dapdip_types::api::{
    Claims, CommentResponse, CommentsResponse, CreateCommentRequest, CreateReelRequest,
    LikeResponse, ReelFeedResponse, ReelResponse, ViewResponse,
};
use dapdip_types::time::parse_db_timestamp;

use crate::error::ApiError;
use crate::notifications::notify;
use crate::parse_uuid;
use crate::posts::{FeedQuery, parse_sort};
use crate::state::{AppState, blocking};

const MAX_CAPTION_LEN: usize = 500;
const MAX_COMMENT_LEN: usize = 500;
const MAX_PAGE: u32 = 100;

fn to_reel_response(row: ReelRow) -> ReelResponse {
    ReelResponse {
        id: parse_uuid(&row.id, "reel id"),
        author_id: parse_uuid(&row.author_id, "author id"),
        author_username: row.author_username,
        video_url: row.video_url,
        caption: row.caption,
        views: row.views,
        like_count: row.like_count,
        comment_count: row.comment_count,
        liked: row.liked,
        created_at: parse_db_timestamp(&row.created_at),
    }
}

fn to_comment_response(row: ReelCommentRow) -> CommentResponse {
    CommentResponse {
        id: parse_uuid(&row.id, "comment id"),
        reel_id: parse_uuid(&row.reel_id, "reel id"),
        author_id: parse_uuid(&row.author_id, "author id"),
        author_username: row.author_username,
        content: row.content,
        created_at: parse_db_timestamp(&row.created_at),
    }
}

pub async fn create_reel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateReelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let video_url = req.video_url.trim().to_string();
    if !video_url.starts_with("http://") && !video_url.starts_with("https://") {
        return Err(ApiError::BadRequest(
            "video_url must be an absolute http(s) URL".into(),
        ));
    }

    let caption = req.caption.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
    if caption.as_ref().is_some_and(|c| c.len() > MAX_CAPTION_LEN) {
        return Err(ApiError::BadRequest(format!(
            "caption must be at most {} characters",
            MAX_CAPTION_LEN
        )));
    }
    if let Some(caption) = &caption {
        crate::ai::ensure_allowed(&state, caption).await?;
    }

    let reel_id = Uuid::new_v4();
    state.db.insert_reel(
        &reel_id.to_string(),
        &claims.sub.to_string(),
        &video_url,
        caption.as_deref(),
    )?;

    let row = state
        .db
        .get_reel(&reel_id.to_string(), &claims.sub.to_string())?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("reel vanished after insert")))?;

    Ok((StatusCode::CREATED, Json(to_reel_response(row))))
}

pub async fn get_reel(
    State(state): State<AppState>,
    Path(reel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .db
        .get_reel(&reel_id.to_string(), &claims.sub.to_string())?
        .ok_or_else(|| ApiError::NotFound("reel not found".into()))?;

    Ok(Json(to_reel_response(row)))
}

pub async fn feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let sort = parse_sort(query.sort.as_deref())?;
    let limit = query.limit.clamp(1, MAX_PAGE);

    let db = state.db.clone();
    let viewer = claims.sub.to_string();
    let before = query.before.map(|id| id.to_string());
    let rows = blocking(move || db.reels_feed(&viewer, sort, limit, before.as_deref())).await?;

    let next_cursor = if rows.len() == limit as usize {
        rows.last().map(|row| parse_uuid(&row.id, "reel id"))
    } else {
        None
    };

    Ok(Json(ReelFeedResponse {
        reels: rows.into_iter().map(to_reel_response).collect(),
        next_cursor,
    }))
}

pub async fn delete_reel(
    State(state): State<AppState>,
    Path(reel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let author = state
        .db
        .reel_author(&reel_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("reel not found".into()))?;

    if author != claims.sub.to_string() {
        return Err(ApiError::Forbidden("only the author can delete a reel".into()));
    }

    state.db.delete_reel(&reel_id.to_string())?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Toggle: the first call likes, the second unlikes.
pub async fn toggle_like(
    State(state): State<AppState>,
    Path(reel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let author = state
        .db
        .reel_author(&reel_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("reel not found".into()))?;

    let liked = state.db.toggle_reel_like(
        &Uuid::new_v4().to_string(),
        &reel_id.to_string(),
        &claims.sub.to_string(),
    )?;

    if liked && author != claims.sub.to_string() {
        notify(
            &state,
            &author,
            &claims.sub.to_string(),
            "reel_like",
            Some(&reel_id.to_string()),
        );
    }

    Ok(Json(LikeResponse { liked }))
}

pub async fn record_view(
    State(state): State<AppState>,
    Path(reel_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let views = state
        .db
        .increment_reel_views(&reel_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("reel not found".into()))?;

    Ok(Json(ViewResponse { views }))
}

// -- Comments --

pub async fn create_comment(
    State(state): State<AppState>,
    Path(reel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let author = state
        .db
        .reel_author(&reel_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("reel not found".into()))?;

    let content = req.content.trim().to_string();
    if content.is_empty() || content.len() > MAX_COMMENT_LEN {
        return Err(ApiError::BadRequest(format!(
            "comment must be 1-{} characters",
            MAX_COMMENT_LEN
        )));
    }

    crate::ai::ensure_allowed(&state, &content).await?;

    let comment_id = Uuid::new_v4();
    state.db.insert_reel_comment(
        &comment_id.to_string(),
        &reel_id.to_string(),
        &claims.sub.to_string(),
        &content,
    )?;

    if author != claims.sub.to_string() {
        notify(
            &state,
            &author,
            &claims.sub.to_string(),
            "reel_comment",
            Some(&reel_id.to_string()),
        );
    }

    Ok((
        StatusCode::CREATED,
        Json(CommentResponse {
            id: comment_id,
            reel_id,
            author_id: claims.sub,
            author_username: claims.username.clone(),
            content,
            created_at: chrono::Utc::now(),
        }),
    ))
}

pub async fn comments(
    State(state): State<AppState>,
    Path(reel_id): Path<Uuid>,
    Query(query): Query<FeedQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    if state.db.reel_author(&reel_id.to_string())?.is_none() {
        return Err(ApiError::NotFound("reel not found".into()));
    }

    let limit = query.limit.clamp(1, MAX_PAGE);
    let db = state.db.clone();
    let rid = reel_id.to_string();
    let before = query.before.map(|id| id.to_string());
    let rows = blocking(move || db.reel_comments(&rid, limit, before.as_deref())).await?;

    let next_cursor = if rows.len() == limit as usize {
        rows.last().map(|row| parse_uuid(&row.id, "comment id"))
    } else {
        None
    };

    Ok(Json(CommentsResponse {
        comments: rows.into_iter().map(to_comment_response).collect(),
        next_cursor,
    }))
}

/// The comment author or the reel author may delete a comment.
pub async fn delete_comment(
    State(state): State<AppState>,
    Path((reel_id, comment_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = state
        .db
        .get_reel_comment(&comment_id.to_string())?
        .filter(|c| c.reel_id == reel_id.to_string())
        .ok_or_else(|| ApiError::NotFound("comment not found".into()))?;

    let reel_author = state
        .db
        .reel_author(&reel_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("reel not found".into()))?;

    let caller = claims.sub.to_string();
    if comment.author_id != caller && reel_author != caller {
        return Err(ApiError::Forbidden(
            "only the comment author or the reel author can delete it".into(),
        ));
    }

    state.db.delete_reel_comment(&comment_id.to_string())?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
