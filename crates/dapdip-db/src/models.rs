/// Plain row structs, one field per selected column. The API layer converts
/// these into dapdip-types responses; the DB layer never sees those DTOs.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: String,
}

pub struct ProfileCounts {
    pub posts: i64,
    pub reels: i64,
    pub groups: i64,
}

pub struct PostRow {
    pub id: String,
    pub author_id: String,
    pub author_username: String,
    pub content: String,
    pub like_count: i64,
    pub liked: bool,
    pub created_at: String,
}

/// Feed ordering. `Popular` sorts by like count and ignores the cursor;
/// `Recent` is keyset-paginated on `(created_at, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSort {
    Recent,
    Popular,
}

pub struct TrendingTagRow {
    pub name: String,
    pub count: i64,
}

pub struct GroupRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub private: bool,
    pub member_count: i64,
    pub created_at: String,
}

pub struct GroupMemberRow {
    pub user_id: String,
    pub username: String,
    pub role: String,
    pub joined_at: String,
}

pub struct GroupPostRow {
    pub id: String,
    pub group_id: String,
    pub author_id: String,
    pub author_username: String,
    pub content: String,
    pub created_at: String,
}

pub struct ReelRow {
    pub id: String,
    pub author_id: String,
    pub author_username: String,
    pub video_url: String,
    pub caption: Option<String>,
    pub views: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub liked: bool,
    pub created_at: String,
}

pub struct ReelCommentRow {
    pub id: String,
    pub reel_id: String,
    pub author_id: String,
    pub author_username: String,
    pub content: String,
    pub created_at: String,
}

pub struct PollRow {
    pub id: String,
    pub author_id: String,
    pub question: String,
    pub multi_choice: bool,
    pub ends_at: Option<String>,
    pub created_at: String,
}

pub struct PollOptionRow {
    pub id: String,
    pub label: String,
    pub position: i64,
    pub votes: i64,
}

pub struct StreamRow {
    pub id: String,
    pub host_id: String,
    pub host_username: String,
    pub title: String,
    pub live: bool,
    pub started_at: String,
    pub ended_at: Option<String>,
}

pub struct StreamMessageRow {
    pub id: String,
    pub stream_id: String,
    pub author_id: String,
    pub author_username: String,
    pub content: String,
    pub created_at: String,
}

pub struct NotificationRow {
    pub id: String,
    pub actor_id: String,
    pub actor_username: String,
    pub kind: String,
    pub subject_id: Option<String>,
    pub read: bool,
    pub created_at: String,
}

pub struct EmbeddingRow {
    pub post_id: String,
    pub vector: String,
}
