//! API contract tests: drive the real router over in-memory state and check
//! status codes and response shapes, including the `{ "error": ... }` body
//! on failure.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use dapdip_api::state::{AppState, AppStateInner};
use dapdip_db::Database;
use dapdip_gateway::dispatcher::Dispatcher;

fn test_app() -> (Router, Arc<Database>) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        jwt_secret: "test-secret".into(),
        dispatcher: Dispatcher::new(),
        ai: None,
    });
    (dapdip_api::router(state), db)
}

async fn send(
    app: &Router,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, value)
}

/// Register a user and return (user_id, token).
async fn register(app: &Router, username: &str) -> (String, String) {
    let (status, body) = send(
        app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "username": username, "password": "hunter2hunter2" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
    (
        body["user_id"].as_str().unwrap().to_string(),
        body["token"].as_str().unwrap().to_string(),
    )
}

// -- Auth --

#[tokio::test]
async fn register_login_roundtrip() {
    let (app, _db) = test_app();
    let (user_id, _token) = register(&app, "ava").await;

    let (status, body) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": "ava", "password": "hunter2hunter2" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], user_id.as_str());
    assert_eq!(body["username"], "ava");

    // The issued token is accepted by the middleware
    let token = body["token"].as_str().unwrap();
    let (status, _) = send(&app, "GET", "/feed", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn wrong_password_is_401() {
    let (app, _db) = test_app();
    register(&app, "ava").await;

    let (status, body) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": "ava", "password": "not-the-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn taken_username_is_409() {
    let (app, _db) = test_app();
    register(&app, "ava").await;

    let (status, body) = send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "username": "ava", "password": "hunter2hunter2" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "username is taken");
}

#[tokio::test]
async fn short_username_is_400() {
    let (app, _db) = test_app();
    let (status, body) = send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "username": "ab", "password": "hunter2hunter2" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("username"));
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let (app, _db) = test_app();

    let (status, body) = send(&app, "GET", "/feed", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "authentication required");

    let (status, _) = send(&app, "GET", "/feed", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// -- Profiles --

#[tokio::test]
async fn profile_updates_are_partial_and_counted() {
    let (app, _db) = test_app();
    let (user_id, token) = register(&app, "ava").await;

    let (status, _) = send(
        &app,
        "PATCH",
        "/profile",
        Some(&token),
        Some(json!({ "display_name": "Ava", "bio": "hi there" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // A later update of one field keeps the others
    send(
        &app,
        "PATCH",
        "/profile",
        Some(&token),
        Some(json!({ "avatar_url": "https://cdn.example/ava.png" })),
    )
    .await;

    send(
        &app,
        "POST",
        "/posts",
        Some(&token),
        Some(json!({ "content": "first post" })),
    )
    .await;

    let (status, body) = send(
        &app,
        "GET",
        &format!("/users/{}/profile", user_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "ava");
    assert_eq!(body["display_name"], "Ava");
    assert_eq!(body["bio"], "hi there");
    assert_eq!(body["avatar_url"], "https://cdn.example/ava.png");
    assert_eq!(body["post_count"], 1);

    let (status, _) = send(&app, "PATCH", "/profile", Some(&token), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// -- Posts & pagination --

#[tokio::test]
async fn feed_pagination_covers_all_posts_exactly_once() {
    let (app, _db) = test_app();
    let (_uid, token) = register(&app, "ava").await;

    for i in 0..5 {
        let (status, _) = send(
            &app,
            "POST",
            "/posts",
            Some(&token),
            Some(json!({ "content": format!("post number {}", i) })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let mut seen: Vec<String> = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let path = match &cursor {
            Some(c) => format!("/feed?limit=2&before={}", c),
            None => "/feed?limit=2".to_string(),
        };
        let (status, body) = send(&app, "GET", &path, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let posts = body["posts"].as_array().unwrap();
        if posts.is_empty() {
            break;
        }
        for post in posts {
            seen.push(post["id"].as_str().unwrap().to_string());
        }
        match body["next_cursor"].as_str() {
            Some(next) => cursor = Some(next.to_string()),
            None => break,
        }
    }

    let mut unique = seen.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(seen.len(), 5, "pages must cover every post: {:?}", seen);
    assert_eq!(unique.len(), 5, "pages must be disjoint: {:?}", seen);
}

#[tokio::test]
async fn only_the_author_deletes_a_post() {
    let (app, _db) = test_app();
    let (_ava, ava_token) = register(&app, "ava").await;
    let (_ben, ben_token) = register(&app, "ben").await;

    let (_, post) = send(
        &app,
        "POST",
        "/posts",
        Some(&ava_token),
        Some(json!({ "content": "mine" })),
    )
    .await;
    let post_id = post["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        "DELETE",
        &format!("/posts/{}", post_id),
        Some(&ben_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].is_string());

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/posts/{}", post_id),
        Some(&ava_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "GET", &format!("/posts/{}", post_id), Some(&ava_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// -- Hashtags --

#[tokio::test]
async fn trending_ranks_by_use_count() {
    let (app, _db) = test_app();
    let (_uid, token) = register(&app, "ava").await;

    for i in 0..3 {
        send(
            &app,
            "POST",
            "/posts",
            Some(&token),
            Some(json!({ "content": format!("day {} of #rust", i) })),
        )
        .await;
    }
    send(
        &app,
        "POST",
        "/posts",
        Some(&token),
        Some(json!({ "content": "trying #sqlite" })),
    )
    .await;

    let (status, body) = send(&app, "GET", "/hashtags/trending", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let tags = body.as_array().unwrap();
    assert_eq!(tags[0]["name"], "rust");
    assert_eq!(tags[0]["count"], 3);
    assert_eq!(tags[1]["name"], "sqlite");

    let (status, body) = send(&app, "GET", "/hashtags/rust/posts", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["posts"].as_array().unwrap().len(), 3);
}

// -- Groups --

#[tokio::test]
async fn private_group_posts_require_membership() {
    let (app, _db) = test_app();
    let (_ava, ava_token) = register(&app, "ava").await;
    let (_ben, ben_token) = register(&app, "ben").await;

    let (status, group) = send(
        &app,
        "POST",
        "/groups",
        Some(&ava_token),
        Some(json!({ "name": "secret club", "private": true })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let group_id = group["id"].as_str().unwrap();

    // Owner can read
    let (status, _) = send(
        &app,
        "GET",
        &format!("/groups/{}/posts", group_id),
        Some(&ava_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Non-member gets 403 with an error body
    let (status, body) = send(
        &app,
        "GET",
        &format!("/groups/{}/posts", group_id),
        Some(&ben_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].is_string());

    // Private groups cannot be joined directly
    let (status, _) = send(
        &app,
        "POST",
        &format!("/groups/{}/join", group_id),
        Some(&ben_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // An admin adds ben, who can then read
    let (_, login) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": "ben", "password": "hunter2hunter2" })),
    )
    .await;
    let ben_id = login["user_id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "POST",
        &format!("/groups/{}/members", group_id),
        Some(&ava_token),
        Some(json!({ "user_id": ben_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &app,
        "GET",
        &format!("/groups/{}/posts", group_id),
        Some(&ben_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn only_admins_add_members() {
    let (app, _db) = test_app();
    let (_ava, ava_token) = register(&app, "ava").await;
    let (_ben_id, ben_token) = register(&app, "ben").await;
    let (cara_id, _cara_token) = register(&app, "cara").await;

    let (_, group) = send(
        &app,
        "POST",
        "/groups",
        Some(&ava_token),
        Some(json!({ "name": "public square" })),
    )
    .await;
    let group_id = group["id"].as_str().unwrap();

    // ben joins the public group himself, but stays a plain member
    let (status, _) = send(
        &app,
        "POST",
        &format!("/groups/{}/join", group_id),
        Some(&ben_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/groups/{}/members", group_id),
        Some(&ben_token),
        Some(json!({ "user_id": cara_id })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("admin"));
}

// -- Reels --

#[tokio::test]
async fn liking_a_reel_twice_toggles_it_off() {
    let (app, _db) = test_app();
    let (_ava, ava_token) = register(&app, "ava").await;
    let (_ben, ben_token) = register(&app, "ben").await;

    let (status, reel) = send(
        &app,
        "POST",
        "/reels",
        Some(&ava_token),
        Some(json!({ "video_url": "https://cdn.example/clip.mp4", "caption": "first!" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let reel_id = reel["id"].as_str().unwrap();

    let like_path = format!("/reels/{}/like", reel_id);
    let (status, body) = send(&app, "POST", &like_path, Some(&ben_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["liked"], true);

    let (status, body) = send(&app, "POST", &like_path, Some(&ben_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["liked"], false);

    let (_, reel) = send(
        &app,
        "GET",
        &format!("/reels/{}", reel_id),
        Some(&ben_token),
        None,
    )
    .await;
    assert_eq!(reel["like_count"], 0);
}

#[tokio::test]
async fn view_counter_increments_per_request() {
    let (app, _db) = test_app();
    let (_uid, token) = register(&app, "ava").await;

    let (_, reel) = send(
        &app,
        "POST",
        "/reels",
        Some(&token),
        Some(json!({ "video_url": "https://cdn.example/clip.mp4" })),
    )
    .await;
    let view_path = format!("/reels/{}/view", reel["id"].as_str().unwrap());

    let (_, body) = send(&app, "POST", &view_path, Some(&token), None).await;
    assert_eq!(body["views"], 1);
    let (_, body) = send(&app, "POST", &view_path, Some(&token), None).await;
    assert_eq!(body["views"], 2);
}

// -- Polls --

#[tokio::test]
async fn voting_twice_on_a_poll_is_400_and_tally_unchanged() {
    let (app, _db) = test_app();
    let (_uid, token) = register(&app, "ava").await;

    let (status, poll) = send(
        &app,
        "POST",
        "/polls",
        Some(&token),
        Some(json!({ "question": "tabs or spaces?", "options": ["tabs", "spaces"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let poll_id = poll["id"].as_str().unwrap();
    let option_id = poll["options"][0]["id"].as_str().unwrap();

    let vote_path = format!("/polls/{}/votes", poll_id);
    let (status, body) = send(
        &app,
        "POST",
        &vote_path,
        Some(&token),
        Some(json!({ "option_ids": [option_id] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["options"][0]["votes"], 1);
    assert_eq!(body["voted"], true);

    let (status, body) = send(
        &app,
        "POST",
        &vote_path,
        Some(&token),
        Some(json!({ "option_ids": [option_id] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "you have already voted");

    let (_, poll) = send(&app, "GET", &format!("/polls/{}", poll_id), Some(&token), None).await;
    assert_eq!(poll["options"][0]["votes"], 1);
    assert_eq!(poll["total_voters"], 1);
}

#[tokio::test]
async fn voting_on_an_ended_poll_is_400() {
    let (app, db) = test_app();
    let (_uid, token) = register(&app, "ava").await;

    let (_, poll) = send(
        &app,
        "POST",
        "/polls",
        Some(&token),
        Some(json!({
            "question": "still open?",
            "options": ["yes", "no"],
            "ends_at": "2030-01-01T00:00:00Z"
        })),
    )
    .await;
    let poll_id = poll["id"].as_str().unwrap().to_string();
    let option_id = poll["options"][0]["id"].as_str().unwrap().to_string();

    // Age the poll past its deadline behind the API's back.
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE polls SET ends_at = datetime('now', '-1 hour') WHERE id = ?1",
            [poll_id.as_str()],
        )?;
        Ok(())
    })
    .unwrap();

    let (status, body) = send(
        &app,
        "POST",
        &format!("/polls/{}/votes", poll_id),
        Some(&token),
        Some(json!({ "option_ids": [option_id] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "poll has ended");
}

#[tokio::test]
async fn single_choice_polls_reject_multi_option_ballots() {
    let (app, _db) = test_app();
    let (_uid, token) = register(&app, "ava").await;

    let (_, poll) = send(
        &app,
        "POST",
        "/polls",
        Some(&token),
        Some(json!({ "question": "pick one", "options": ["a", "b"] })),
    )
    .await;
    let poll_id = poll["id"].as_str().unwrap();
    let opt_a = poll["options"][0]["id"].as_str().unwrap();
    let opt_b = poll["options"][1]["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        "POST",
        &format!("/polls/{}/votes", poll_id),
        Some(&token),
        Some(json!({ "option_ids": [opt_a, opt_b] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("single choice"));
}

#[tokio::test]
async fn poll_analysis_without_ai_is_400() {
    let (app, _db) = test_app();
    let (_uid, token) = register(&app, "ava").await;

    let (_, poll) = send(
        &app,
        "POST",
        "/polls",
        Some(&token),
        Some(json!({ "question": "q", "options": ["a", "b"] })),
    )
    .await;
    let (status, body) = send(
        &app,
        "POST",
        &format!("/polls/{}/analysis", poll["id"].as_str().unwrap()),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "AI is not configured");
}

// -- Livestreams --

#[tokio::test]
async fn one_live_stream_per_host_and_host_only_end() {
    let (app, _db) = test_app();
    let (_ava, ava_token) = register(&app, "ava").await;
    let (_ben, ben_token) = register(&app, "ben").await;

    let (status, stream) = send(
        &app,
        "POST",
        "/streams",
        Some(&ava_token),
        Some(json!({ "title": "late night coding" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let stream_id = stream["id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        "POST",
        "/streams",
        Some(&ava_token),
        Some(json!({ "title": "second stream" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let end_path = format!("/streams/{}/end", stream_id);
    let (status, _) = send(&app, "POST", &end_path, Some(&ben_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, "POST", &end_path, Some(&ava_token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "POST", &end_path, Some(&ava_token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, live) = send(&app, "GET", "/streams", Some(&ava_token), None).await;
    assert!(live.as_array().unwrap().is_empty());
}

// -- Notifications --

#[tokio::test]
async fn reel_likes_notify_the_author() {
    let (app, _db) = test_app();
    let (_ava, ava_token) = register(&app, "ava").await;
    let (_ben, ben_token) = register(&app, "ben").await;

    let (_, reel) = send(
        &app,
        "POST",
        "/reels",
        Some(&ava_token),
        Some(json!({ "video_url": "https://cdn.example/clip.mp4" })),
    )
    .await;
    let reel_id = reel["id"].as_str().unwrap();

    send(
        &app,
        "POST",
        &format!("/reels/{}/like", reel_id),
        Some(&ben_token),
        None,
    )
    .await;

    let (_, count) = send(&app, "GET", "/notifications/unread-count", Some(&ava_token), None).await;
    assert_eq!(count["count"], 1);

    let (_, list) = send(&app, "GET", "/notifications", Some(&ava_token), None).await;
    let notification = &list["notifications"][0];
    assert_eq!(notification["kind"], "reel_like");
    assert_eq!(notification["actor_username"], "ben");
    assert_eq!(notification["subject_id"], reel_id);

    let nid = notification["id"].as_str().unwrap();
    let (status, _) = send(
        &app,
        "POST",
        &format!("/notifications/{}/read", nid),
        Some(&ava_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, count) = send(&app, "GET", "/notifications/unread-count", Some(&ava_token), None).await;
    assert_eq!(count["count"], 0);

    // ben cannot mark ava's notifications
    let (status, _) = send(
        &app,
        "POST",
        &format!("/notifications/{}/read", nid),
        Some(&ben_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// -- Search --

#[tokio::test]
async fn search_falls_back_to_substring_matching_without_ai() {
    let (app, _db) = test_app();
    let (_uid, token) = register(&app, "ava").await;

    send(
        &app,
        "POST",
        "/posts",
        Some(&token),
        Some(json!({ "content": "learning rust generics" })),
    )
    .await;
    send(
        &app,
        "POST",
        "/posts",
        Some(&token),
        Some(json!({ "content": "gardening tips" })),
    )
    .await;

    let (status, body) = send(&app, "GET", "/search/posts?q=rust", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let posts = body["posts"].as_array().unwrap();
    assert_eq!(posts.len(), 1);
    assert!(posts[0]["content"].as_str().unwrap().contains("rust"));

    let (status, _) = send(&app, "GET", "/search/posts?q=", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
