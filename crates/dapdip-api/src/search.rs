use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::warn;

use dapdip_ai::cosine_similarity;
use dapdip_types::api::{Claims, SearchResponse};

use crate::error::ApiError;
use crate::posts::to_post_response;
use crate::state::{AppState, blocking};

const MAX_RESULTS: u32 = 50;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    20
}

/// Semantic search over post embeddings when AI is configured, plain
/// substring matching otherwise.
pub async fn search_posts(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let q = query.q.trim().to_string();
    if q.is_empty() {
        return Err(ApiError::BadRequest("q is required".into()));
    }
    let limit = query.limit.clamp(1, MAX_RESULTS);

    let Some(ai) = &state.ai else {
        let db = state.db.clone();
        let viewer = claims.sub.to_string();
        let rows = blocking(move || db.search_posts(&q, &viewer, limit)).await?;
        return Ok(Json(SearchResponse {
            posts: rows.into_iter().map(to_post_response).collect(),
        }));
    };

    let query_vector = ai
        .embed(&q)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    let db = state.db.clone();
    let stored = blocking(move || db.all_embeddings()).await?;

    let mut scored: Vec<(String, f32)> = stored
        .into_iter()
        .filter_map(|row| {
            match serde_json::from_str::<Vec<f32>>(&row.vector) {
                Ok(vector) => Some((row.post_id, cosine_similarity(&query_vector, &vector))),
                Err(e) => {
                    warn!("Corrupt embedding for post '{}': {}", row.post_id, e);
                    None
                }
            }
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit as usize);

    let viewer = claims.sub.to_string();
    let mut posts = Vec::with_capacity(scored.len());
    for (post_id, _) in scored {
        // Embeddings cascade with their post, but a row deleted mid-search
        // just drops out of the results.
        if let Some(row) = state.db.get_post(&post_id, &viewer)? {
            posts.push(to_post_response(row));
        }
    }

    Ok(Json(SearchResponse { posts }))
}
