pub mod ai;
pub mod auth;
pub mod error;
pub mod groups;
pub mod hashtags;
pub mod middleware;
pub mod notifications;
pub mod polls;
pub mod posts;
pub mod profiles;
pub mod reels;
pub mod search;
pub mod state;
pub mod streams;

use axum::{
    Router,
    middleware as axum_middleware,
    routing::{delete, get, patch, post},
};
use tracing::warn;
use uuid::Uuid;

use crate::state::AppState;

/// Assemble the REST API: public auth routes plus the JWT-protected surface.
/// The WebSocket gateway route is wired by the server binary.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected = Router::new()
        // Profiles
        .route("/profile", patch(profiles::update_profile))
        .route("/users/{user_id}/profile", get(profiles::get_profile))
        .route("/users/{user_id}/posts", get(posts::user_posts))
        // Posts
        .route("/feed", get(posts::feed))
        .route("/posts", post(posts::create_post))
        .route("/posts/{post_id}", get(posts::get_post).delete(posts::delete_post))
        .route("/posts/{post_id}/like", post(posts::toggle_like))
        // Hashtags
        .route("/hashtags/trending", get(hashtags::trending))
        .route("/hashtags/{name}/posts", get(hashtags::posts_for_tag))
        // Groups
        .route("/groups", post(groups::create_group))
        .route(
            "/groups/{group_id}",
            get(groups::get_group)
                .patch(groups::update_group)
                .delete(groups::delete_group),
        )
        .route("/groups/{group_id}/join", post(groups::join_group))
        .route(
            "/groups/{group_id}/members",
            get(groups::list_members).post(groups::add_member),
        )
        .route(
            "/groups/{group_id}/members/{user_id}",
            delete(groups::remove_member),
        )
        .route(
            "/groups/{group_id}/posts",
            get(groups::group_posts).post(groups::create_group_post),
        )
        // Reels
        .route("/reels", get(reels::feed).post(reels::create_reel))
        .route("/reels/{reel_id}", get(reels::get_reel).delete(reels::delete_reel))
        .route("/reels/{reel_id}/like", post(reels::toggle_like))
        .route("/reels/{reel_id}/view", post(reels::record_view))
        .route(
            "/reels/{reel_id}/comments",
            get(reels::comments).post(reels::create_comment),
        )
        .route(
            "/reels/{reel_id}/comments/{comment_id}",
            delete(reels::delete_comment),
        )
        // Polls
        .route("/polls", post(polls::create_poll))
        .route("/polls/{poll_id}", get(polls::get_poll))
        .route("/polls/{poll_id}/votes", post(polls::vote))
        .route("/polls/{poll_id}/analysis", post(polls::analysis))
        // Livestreams
        .route("/streams", get(streams::list_streams).post(streams::create_stream))
        .route("/streams/{stream_id}", get(streams::get_stream))
        .route("/streams/{stream_id}/end", post(streams::end_stream))
        .route("/streams/{stream_id}/chat", get(streams::chat_history))
        // Notifications
        .route("/notifications", get(notifications::list))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route(
            "/notifications/{notification_id}/read",
            post(notifications::mark_read),
        )
        // Search / AI
        .route("/search/posts", get(search::search_posts))
        .route("/ai/summarize", post(ai::summarize))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state);

    Router::new().merge(public).merge(protected)
}

/// Ids are written by us as UUID strings; a row that fails to parse is
/// corrupt, not a request error.
pub(crate) fn parse_uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}
