use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use dapdip_db::models::{GroupPostRow, GroupRow};
use dapdip_types::api::{
    AddMemberRequest, Claims, CreateGroupPostRequest, CreateGroupRequest, GroupMemberResponse,
    GroupPostResponse, GroupPostsResponse, GroupResponse, UpdateGroupRequest,
};
use dapdip_types::time::parse_db_timestamp;

use crate::error::ApiError;
use crate::notifications::notify;
use crate::parse_uuid;
use crate::posts::MAX_POST_LEN;
use crate::state::{AppState, blocking};

const MAX_NAME_LEN: usize = 64;
const MAX_DESCRIPTION_LEN: usize = 500;

fn to_group_response(row: GroupRow) -> GroupResponse {
    GroupResponse {
        id: parse_uuid(&row.id, "group id"),
        name: row.name,
        description: row.description,
        owner_id: parse_uuid(&row.owner_id, "owner id"),
        private: row.private,
        member_count: row.member_count,
        created_at: parse_db_timestamp(&row.created_at),
    }
}

fn to_group_post_response(row: GroupPostRow) -> GroupPostResponse {
    GroupPostResponse {
        id: parse_uuid(&row.id, "group post id"),
        group_id: parse_uuid(&row.group_id, "group id"),
        author_id: parse_uuid(&row.author_id, "author id"),
        author_username: row.author_username,
        content: row.content,
        created_at: parse_db_timestamp(&row.created_at),
    }
}

fn load_group(state: &AppState, group_id: Uuid) -> Result<GroupRow, ApiError> {
    state
        .db
        .get_group(&group_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("group not found".into()))
}

/// The caller's role in the group, or None for non-members.
fn role_of(state: &AppState, group_id: Uuid, user_id: Uuid) -> Result<Option<String>, ApiError> {
    Ok(state
        .db
        .membership_role(&group_id.to_string(), &user_id.to_string())?)
}

fn require_admin(state: &AppState, group_id: Uuid, user_id: Uuid) -> Result<String, ApiError> {
    match role_of(state, group_id, user_id)? {
        Some(role) if role == "owner" || role == "admin" => Ok(role),
        _ => Err(ApiError::Forbidden(
            "requires group owner or admin".into(),
        )),
    }
}

// -- Group CRUD --

pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim().to_string();
    if name.len() < 3 || name.len() > MAX_NAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "group name must be 3-{} characters",
            MAX_NAME_LEN
        )));
    }
    if req.description.as_ref().is_some_and(|d| d.len() > MAX_DESCRIPTION_LEN) {
        return Err(ApiError::BadRequest(format!(
            "description must be at most {} characters",
            MAX_DESCRIPTION_LEN
        )));
    }

    let group_id = Uuid::new_v4();
    state.db.create_group(
        &group_id.to_string(),
        &name,
        req.description.as_deref(),
        &claims.sub.to_string(),
        req.private,
        &Uuid::new_v4().to_string(),
    )?;

    let row = load_group(&state, group_id)?;
    Ok((StatusCode::CREATED, Json(to_group_response(row))))
}

pub async fn get_group(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let row = load_group(&state, group_id)?;
    Ok(Json(to_group_response(row)))
}

pub async fn update_group(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    load_group(&state, group_id)?;
    require_admin(&state, group_id, claims.sub)?;

    if let Some(name) = &req.name {
        let name = name.trim();
        if name.len() < 3 || name.len() > MAX_NAME_LEN {
            return Err(ApiError::BadRequest(format!(
                "group name must be 3-{} characters",
                MAX_NAME_LEN
            )));
        }
    }
    if req.description.as_ref().is_some_and(|d| d.len() > MAX_DESCRIPTION_LEN) {
        return Err(ApiError::BadRequest(format!(
            "description must be at most {} characters",
            MAX_DESCRIPTION_LEN
        )));
    }

    state.db.update_group(
        &group_id.to_string(),
        req.name.as_deref().map(str::trim),
        req.description.as_deref(),
    )?;

    let row = load_group(&state, group_id)?;
    Ok(Json(to_group_response(row)))
}

pub async fn delete_group(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let group = load_group(&state, group_id)?;
    if group.owner_id != claims.sub.to_string() {
        return Err(ApiError::Forbidden("only the owner can delete a group".into()));
    }

    state.db.delete_group(&group_id.to_string())?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

// -- Membership --

pub async fn join_group(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let group = load_group(&state, group_id)?;

    if role_of(&state, group_id, claims.sub)?.is_some() {
        return Err(ApiError::BadRequest("already a member".into()));
    }
    if group.private {
        return Err(ApiError::Forbidden(
            "private group, members are added by an admin".into(),
        ));
    }

    state.db.add_member(
        &Uuid::new_v4().to_string(),
        &group_id.to_string(),
        &claims.sub.to_string(),
        "member",
    )?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "joined": true }))))
}

pub async fn add_member(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    load_group(&state, group_id)?;
    require_admin(&state, group_id, claims.sub)?;

    if state.db.get_user_by_id(&req.user_id.to_string())?.is_none() {
        return Err(ApiError::NotFound("user not found".into()));
    }
    if role_of(&state, group_id, req.user_id)?.is_some() {
        return Err(ApiError::BadRequest("already a member".into()));
    }

    state.db.add_member(
        &Uuid::new_v4().to_string(),
        &group_id.to_string(),
        &req.user_id.to_string(),
        "member",
    )?;

    notify(
        &state,
        &req.user_id.to_string(),
        &claims.sub.to_string(),
        "group_member_added",
        Some(&group_id.to_string()),
    );

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "added": true }))))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    load_group(&state, group_id)?;

    let target_role = role_of(&state, group_id, user_id)?
        .ok_or_else(|| ApiError::NotFound("not a member".into()))?;

    if target_role == "owner" {
        return Err(ApiError::BadRequest(
            "the owner cannot be removed, delete the group instead".into(),
        ));
    }

    // Self-leave is always allowed; removing others takes owner/admin.
    if user_id != claims.sub {
        require_admin(&state, group_id, claims.sub)?;
    }

    state
        .db
        .remove_member(&group_id.to_string(), &user_id.to_string())?;
    Ok(Json(serde_json::json!({ "removed": true })))
}

pub async fn list_members(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let group = load_group(&state, group_id)?;

    if group.private && role_of(&state, group_id, claims.sub)?.is_none() {
        return Err(ApiError::Forbidden("not a member of this group".into()));
    }

    let db = state.db.clone();
    let gid = group_id.to_string();
    let rows = blocking(move || db.list_members(&gid)).await?;

    let members: Vec<GroupMemberResponse> = rows
        .into_iter()
        .map(|row| GroupMemberResponse {
            user_id: parse_uuid(&row.user_id, "member id"),
            username: row.username,
            role: row.role,
            joined_at: parse_db_timestamp(&row.joined_at),
        })
        .collect();

    Ok(Json(members))
}

// -- Group posts --

pub async fn group_posts(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Query(query): Query<crate::posts::FeedQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let group = load_group(&state, group_id)?;

    // Private groups show posts to members only.
    if group.private && role_of(&state, group_id, claims.sub)?.is_none() {
        return Err(ApiError::Forbidden("not a member of this group".into()));
    }

    let limit = query.limit.clamp(1, 100);
    let db = state.db.clone();
    let gid = group_id.to_string();
    let before = query.before.map(|id| id.to_string());
    let rows = blocking(move || db.group_posts(&gid, limit, before.as_deref())).await?;

    let next_cursor = if rows.len() == limit as usize {
        rows.last().map(|row| parse_uuid(&row.id, "group post id"))
    } else {
        None
    };

    Ok(Json(GroupPostsResponse {
        posts: rows.into_iter().map(to_group_post_response).collect(),
        next_cursor,
    }))
}

pub async fn create_group_post(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupPostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    load_group(&state, group_id)?;

    if role_of(&state, group_id, claims.sub)?.is_none() {
        return Err(ApiError::Forbidden("only members can post".into()));
    }

    let content = req.content.trim().to_string();
    if content.is_empty() || content.len() > MAX_POST_LEN {
        return Err(ApiError::BadRequest(format!(
            "content must be 1-{} characters",
            MAX_POST_LEN
        )));
    }

    crate::ai::ensure_allowed(&state, &content).await?;

    let post_id = Uuid::new_v4();
    state.db.insert_group_post(
        &post_id.to_string(),
        &group_id.to_string(),
        &claims.sub.to_string(),
        &content,
    )?;

    Ok((
        StatusCode::CREATED,
        Json(GroupPostResponse {
            id: post_id,
            group_id,
            author_id: claims.sub,
            author_username: claims.username.clone(),
            content,
            created_at: chrono::Utc::now(),
        }),
    ))
}
