use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use dapdip_types::api::{Claims, ProfileResponse, UpdateProfileRequest};
use dapdip_types::time::parse_db_timestamp;

use crate::error::ApiError;
use crate::state::{AppState, blocking};

const MAX_DISPLAY_NAME_LEN: usize = 64;
const MAX_BIO_LEN: usize = 500;
const MAX_URL_LEN: usize = 500;

pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    load_profile(&state, user_id).await.map(Json)
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.display_name.is_none() && req.bio.is_none() && req.avatar_url.is_none() {
        return Err(ApiError::BadRequest("nothing to update".into()));
    }
    if req.display_name.as_ref().is_some_and(|v| v.len() > MAX_DISPLAY_NAME_LEN) {
        return Err(ApiError::BadRequest(format!(
            "display_name must be at most {} characters",
            MAX_DISPLAY_NAME_LEN
        )));
    }
    if req.bio.as_ref().is_some_and(|v| v.len() > MAX_BIO_LEN) {
        return Err(ApiError::BadRequest(format!(
            "bio must be at most {} characters",
            MAX_BIO_LEN
        )));
    }
    if req.avatar_url.as_ref().is_some_and(|v| v.len() > MAX_URL_LEN) {
        return Err(ApiError::BadRequest(format!(
            "avatar_url must be at most {} characters",
            MAX_URL_LEN
        )));
    }

    state.db.update_profile(
        &claims.sub.to_string(),
        req.display_name.as_deref(),
        req.bio.as_deref(),
        req.avatar_url.as_deref(),
    )?;

    load_profile(&state, claims.sub).await.map(Json)
}

async fn load_profile(state: &AppState, user_id: Uuid) -> Result<ProfileResponse, ApiError> {
    let db = state.db.clone();
    let uid = user_id.to_string();

    let (user, counts) = blocking(move || {
        let user = db.get_user_by_id(&uid)?;
        let counts = db.profile_counts(&uid)?;
        Ok((user, counts))
    })
    .await?;

    let user = user.ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    Ok(ProfileResponse {
        user_id,
        username: user.username,
        display_name: user.display_name,
        bio: user.bio,
        avatar_url: user.avatar_url,
        post_count: counts.posts,
        reel_count: counts.reels,
        group_count: counts.groups,
        created_at: parse_db_timestamp(&user.created_at),
    })
}
