use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id           TEXT PRIMARY KEY,
            username     TEXT NOT NULL UNIQUE,
            password     TEXT NOT NULL,
            display_name TEXT,
            bio          TEXT,
            avatar_url   TEXT,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS posts (
            id          TEXT PRIMARY KEY,
            author_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_posts_cursor
            ON posts(created_at, id);

        CREATE TABLE IF NOT EXISTS post_likes (
            id          TEXT PRIMARY KEY,
            post_id     TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(post_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS post_embeddings (
            post_id     TEXT PRIMARY KEY REFERENCES posts(id) ON DELETE CASCADE,
            vector      TEXT NOT NULL,
            model       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS hashtags (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS post_hashtags (
            post_id     TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            hashtag_id  TEXT NOT NULL REFERENCES hashtags(id) ON DELETE CASCADE,
            UNIQUE(post_id, hashtag_id)
        );

        CREATE INDEX IF NOT EXISTS idx_post_hashtags_tag
            ON post_hashtags(hashtag_id);

        CREATE TABLE IF NOT EXISTS "groups" (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            description TEXT,
            owner_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            private     INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS group_members (
            id          TEXT PRIMARY KEY,
            group_id    TEXT NOT NULL REFERENCES "groups"(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            role        TEXT NOT NULL DEFAULT 'member',
            joined_at   TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(group_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS group_posts (
            id          TEXT PRIMARY KEY,
            group_id    TEXT NOT NULL REFERENCES "groups"(id) ON DELETE CASCADE,
            author_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_group_posts_cursor
            ON group_posts(group_id, created_at, id);

        CREATE TABLE IF NOT EXISTS reels (
            id          TEXT PRIMARY KEY,
            author_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            video_url   TEXT NOT NULL,
            caption     TEXT,
            views       INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS reel_likes (
            id          TEXT PRIMARY KEY,
            reel_id     TEXT NOT NULL REFERENCES reels(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(reel_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS reel_comments (
            id          TEXT PRIMARY KEY,
            reel_id     TEXT NOT NULL REFERENCES reels(id) ON DELETE CASCADE,
            author_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_reel_comments_cursor
            ON reel_comments(reel_id, created_at, id);

        CREATE TABLE IF NOT EXISTS polls (
            id           TEXT PRIMARY KEY,
            author_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            question     TEXT NOT NULL,
            multi_choice INTEGER NOT NULL DEFAULT 0,
            ends_at      TEXT,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS poll_options (
            id          TEXT PRIMARY KEY,
            poll_id     TEXT NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
            label       TEXT NOT NULL,
            position    INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS poll_votes (
            id          TEXT PRIMARY KEY,
            poll_id     TEXT NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
            option_id   TEXT NOT NULL REFERENCES poll_options(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(option_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_poll_votes_poll
            ON poll_votes(poll_id, user_id);

        CREATE TABLE IF NOT EXISTS livestreams (
            id          TEXT PRIMARY KEY,
            host_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title       TEXT NOT NULL,
            live        INTEGER NOT NULL DEFAULT 1,
            started_at  TEXT NOT NULL DEFAULT (datetime('now')),
            ended_at    TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_livestreams_live
            ON livestreams(live, host_id);

        CREATE TABLE IF NOT EXISTS stream_messages (
            id          TEXT PRIMARY KEY,
            stream_id   TEXT NOT NULL REFERENCES livestreams(id) ON DELETE CASCADE,
            author_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_stream_messages_cursor
            ON stream_messages(stream_id, created_at, id);

        CREATE TABLE IF NOT EXISTS stream_participants (
            id          TEXT PRIMARY KEY,
            stream_id   TEXT NOT NULL REFERENCES livestreams(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            joined_at   TEXT NOT NULL DEFAULT (datetime('now')),
            left_at     TEXT
        );

        CREATE TABLE IF NOT EXISTS notifications (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            actor_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            kind        TEXT NOT NULL,
            subject_id  TEXT,
            read        INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, read, created_at);
        "#,
    )?;

    info!("Database migrations complete");
    Ok(())
}
