use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// JWT claims shared between dapdip-api (REST middleware) and dapdip-gateway
/// (WebSocket `Identify` handshake). Canonical definition lives here in
/// dapdip-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Profiles --

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub post_count: i64,
    pub reel_count: i64,
    pub group_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

// -- Posts --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePostRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostResponse {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub content: String,
    pub like_count: i64,
    pub liked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedResponse {
    pub posts: Vec<PostResponse>,
    /// Pass back as `before` to fetch the next (older) page.
    pub next_cursor: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LikeResponse {
    pub liked: bool,
}

// -- Hashtags --

#[derive(Debug, Serialize, Deserialize)]
pub struct TrendingTag {
    pub name: String,
    pub count: i64,
}

// -- Groups --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub private: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub private: bool,
    pub member_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateGroupRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupMemberResponse {
    pub user_id: Uuid,
    pub username: String,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupPostRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupPostResponse {
    pub id: Uuid,
    pub group_id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupPostsResponse {
    pub posts: Vec<GroupPostResponse>,
    pub next_cursor: Option<Uuid>,
}

// -- Reels --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateReelRequest {
    pub video_url: String,
    pub caption: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReelResponse {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub video_url: String,
    pub caption: Option<String>,
    pub views: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub liked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReelFeedResponse {
    pub reels: Vec<ReelResponse>,
    pub next_cursor: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ViewResponse {
    pub views: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCommentRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentResponse {
    pub id: Uuid,
    pub reel_id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentsResponse {
    pub comments: Vec<CommentResponse>,
    pub next_cursor: Option<Uuid>,
}

// -- Polls --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePollRequest {
    pub question: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub multi_choice: bool,
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PollOptionResponse {
    pub id: Uuid,
    pub label: String,
    pub votes: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PollResponse {
    pub id: Uuid,
    pub author_id: Uuid,
    pub question: String,
    pub multi_choice: bool,
    pub ends_at: Option<DateTime<Utc>>,
    pub options: Vec<PollOptionResponse>,
    pub total_voters: i64,
    /// Whether the requesting user has already cast a ballot.
    pub voted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoteRequest {
    pub option_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PollAnalysisResponse {
    pub analysis: String,
}

// -- Livestreams --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateStreamRequest {
    pub title: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StreamResponse {
    pub id: Uuid,
    pub host_id: Uuid,
    pub host_username: String,
    pub title: String,
    pub live: bool,
    pub viewer_count: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StreamMessageResponse {
    pub id: Uuid,
    pub stream_id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StreamChatResponse {
    pub messages: Vec<StreamMessageResponse>,
    pub next_cursor: Option<Uuid>,
}

// -- Notifications --

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub actor_username: String,
    /// One of: post_like, reel_like, reel_comment, group_member_added.
    pub kind: String,
    /// Id of the post/reel/group the notification refers to.
    pub subject_id: Option<Uuid>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationsResponse {
    pub notifications: Vec<NotificationResponse>,
    pub next_cursor: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

// -- Search / AI --

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub posts: Vec<PostResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SummarizeRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummarizeResponse {
    pub summary: String,
}
