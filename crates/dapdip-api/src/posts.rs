use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use dapdip_db::models::{FeedSort, PostRow};
use dapdip_types::api::{Claims, CreatePostRequest, FeedResponse, LikeResponse, PostResponse};
use dapdip_types::time::parse_db_timestamp;

use crate::error::ApiError;
use crate::notifications::notify;
use crate::parse_uuid;
use crate::state::{AppState, blocking};

pub(crate) const MAX_POST_LEN: usize = 2000;
const MAX_PAGE: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Keyset cursor — the id of the oldest row from the previous page.
    pub before: Option<Uuid>,
    /// "recent" (default) or "popular".
    pub sort: Option<String>,
}

fn default_limit() -> u32 {
    20
}

pub(crate) fn parse_sort(sort: Option<&str>) -> Result<FeedSort, ApiError> {
    match sort {
        None | Some("recent") => Ok(FeedSort::Recent),
        Some("popular") => Ok(FeedSort::Popular),
        Some(other) => Err(ApiError::BadRequest(format!(
            "unknown sort '{}', expected recent or popular",
            other
        ))),
    }
}

pub(crate) fn to_post_response(row: PostRow) -> PostResponse {
    PostResponse {
        id: parse_uuid(&row.id, "post id"),
        author_id: parse_uuid(&row.author_id, "author id"),
        author_username: row.author_username,
        content: row.content,
        like_count: row.like_count,
        liked: row.liked,
        created_at: parse_db_timestamp(&row.created_at),
    }
}

/// Pull `#tags` out of post content: lowercase, deduplicated, in order of
/// first appearance. A tag runs until the first character that is neither
/// alphanumeric nor '_'.
pub(crate) fn extract_hashtags(content: &str) -> Vec<String> {
    let mut tags = Vec::new();
    for word in content.split_whitespace() {
        let Some(raw) = word.strip_prefix('#') else {
            continue;
        };
        let tag: String = raw
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if tag.is_empty() {
            continue;
        }
        let tag = tag.to_lowercase();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = req.content.trim().to_string();
    if content.is_empty() || content.len() > MAX_POST_LEN {
        return Err(ApiError::BadRequest(format!(
            "content must be 1-{} characters",
            MAX_POST_LEN
        )));
    }

    crate::ai::ensure_allowed(&state, &content).await?;

    let post_id = Uuid::new_v4();
    let tags: Vec<(String, String)> = extract_hashtags(&content)
        .into_iter()
        .map(|name| (Uuid::new_v4().to_string(), name))
        .collect();

    let db = state.db.clone();
    let (pid, author, body) = (post_id.to_string(), claims.sub.to_string(), content.clone());
    blocking(move || {
        db.insert_post(&pid, &author, &body)?;
        if !tags.is_empty() {
            db.link_hashtags(&pid, &tags)?;
        }
        Ok(())
    })
    .await?;

    // Embeddings power semantic search but are never worth failing the post.
    if let Some(ai) = &state.ai {
        match ai.embed(&content).await {
            Ok(vector) => {
                let json = serde_json::to_string(&vector)
                    .map_err(|e| ApiError::Internal(anyhow::anyhow!("vector encode: {}", e)))?;
                if let Err(e) = state.db.store_embedding(&post_id.to_string(), &json, ai.model()) {
                    warn!("failed to store embedding for post {}: {}", post_id, e);
                }
            }
            Err(e) => warn!("embedding request failed for post {}: {}", post_id, e),
        }
    }

    let row = state
        .db
        .get_post(&post_id.to_string(), &claims.sub.to_string())?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("post vanished after insert")))?;

    Ok((StatusCode::CREATED, Json(to_post_response(row))))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .db
        .get_post(&post_id.to_string(), &claims.sub.to_string())?
        .ok_or_else(|| ApiError::NotFound("post not found".into()))?;

    Ok(Json(to_post_response(row)))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let author = state
        .db
        .post_author(&post_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("post not found".into()))?;

    if author != claims.sub.to_string() {
        return Err(ApiError::Forbidden("only the author can delete a post".into()));
    }

    state.db.delete_post(&post_id.to_string())?;
    Ok(Json(serde_json::json!({ "deleted": true })))
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
    let rows =
        blocking(move || db.get_feed(&viewer, sort, limit, before.as_deref())).await?;

    Ok(Json(page_response(rows, limit)))
}

pub async fn user_posts(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<FeedQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    if state.db.get_user_by_id(&user_id.to_string())?.is_none() {
        return Err(ApiError::NotFound("user not found".into()));
    }

    let limit = query.limit.clamp(1, MAX_PAGE);
    let db = state.db.clone();
    let (author, viewer) = (user_id.to_string(), claims.sub.to_string());
    let before = query.before.map(|id| id.to_string());
    let rows = blocking(move || db.posts_by_author(&author, &viewer, limit, before.as_deref()))
        .await?;

    Ok(Json(page_response(rows, limit)))
}

pub async fn toggle_like(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let author = state
        .db
        .post_author(&post_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("post not found".into()))?;

    let liked = state.db.toggle_post_like(
        &Uuid::new_v4().to_string(),
        &post_id.to_string(),
        &claims.sub.to_string(),
    )?;

    if liked && author != claims.sub.to_string() {
        notify(
            &state,
            &author,
            &claims.sub.to_string(),
            "post_like",
            Some(&post_id.to_string()),
        );
    }

    Ok(Json(LikeResponse { liked }))
}

pub(crate) fn page_response(rows: Vec<PostRow>, limit: u32) -> FeedResponse {
    let next_cursor = if rows.len() == limit as usize {
        rows.last().map(|row| parse_uuid(&row.id, "post id"))
    } else {
        None
    };

    FeedResponse {
        posts: rows.into_iter().map(to_post_response).collect(),
        next_cursor,
    }
}

#[cfg(test)]
mod tests {
    use super::extract_hashtags;

    #[test]
    fn extracts_lowercased_unique_tags() {
        let tags = extract_hashtags("Shipping #Rust today! #rust #WebDev");
        assert_eq!(tags, vec!["rust", "webdev"]);
    }

    #[test]
    fn tag_stops_at_punctuation() {
        assert_eq!(extract_hashtags("done #rust."), vec!["rust"]);
        assert_eq!(extract_hashtags("#rust,#go"), vec!["rust"]);
    }

    #[test]
    fn bare_hash_is_not_a_tag() {
        assert!(extract_hashtags("# nothing #!").is_empty());
    }

    #[test]
    fn underscores_and_digits_are_allowed() {
        assert_eq!(extract_hashtags("#rust_2026"), vec!["rust_2026"]);
    }
}
