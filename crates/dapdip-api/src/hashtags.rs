use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use dapdip_types::api::{Claims, TrendingTag};

use crate::error::ApiError;
use crate::posts::{FeedQuery, page_response};
use crate::state::{AppState, blocking};

const MAX_TRENDING: u32 = 50;

#[derive(Debug, Deserialize)]
pub struct TrendingQuery {
    #[serde(default = "default_trending_limit")]
    pub limit: u32,
}

fn default_trending_limit() -> u32 {
    10
}

pub async fn trending(
    State(state): State<AppState>,
    Query(query): Query<TrendingQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.clamp(1, MAX_TRENDING);

    let db = state.db.clone();
    let rows = blocking(move || db.trending_hashtags(limit)).await?;

    let tags: Vec<TrendingTag> = rows
        .into_iter()
        .map(|row| TrendingTag {
            name: row.name,
            count: row.count,
        })
        .collect();

    Ok(Json(tags))
}

pub async fn posts_for_tag(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<FeedQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    // Tags are stored lowercase without the leading '#'.
    let name = name.trim_start_matches('#').to_lowercase();
    if name.is_empty() {
        return Err(ApiError::BadRequest("hashtag name is required".into()));
    }

    let limit = query.limit.clamp(1, 100);
    let db = state.db.clone();
    let viewer = claims.sub.to_string();
    let before = query.before.map(|id| id.to_string());
    let rows =
        blocking(move || db.posts_for_hashtag(&name, &viewer, limit, before.as_deref())).await?;

    Ok(Json(page_response(rows, limit)))
}
