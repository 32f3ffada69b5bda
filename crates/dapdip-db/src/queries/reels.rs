use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

use crate::Database;
use crate::models::{FeedSort, ReelCommentRow, ReelRow};
use crate::queries::cursor_position;

const REEL_SELECT: &str = "
    SELECT r.id, r.author_id, u.username, r.video_url, r.caption, r.views, r.created_at,
           (SELECT COUNT(*) FROM reel_likes rl WHERE rl.reel_id = r.id) AS like_count,
           (SELECT COUNT(*) FROM reel_comments rc WHERE rc.reel_id = r.id) AS comment_count,
           EXISTS(SELECT 1 FROM reel_likes rl
                  WHERE rl.reel_id = r.id AND rl.user_id = ?1) AS liked
    FROM reels r
    JOIN users u ON r.author_id = u.id";

fn map_reel(row: &rusqlite::Row) -> rusqlite::Result<ReelRow> {
    Ok(ReelRow {
        id: row.get(0)?,
        author_id: row.get(1)?,
        author_username: row.get(2)?,
        video_url: row.get(3)?,
        caption: row.get(4)?,
        views: row.get(5)?,
        created_at: row.get(6)?,
        like_count: row.get(7)?,
        comment_count: row.get(8)?,
        liked: row.get(9)?,
    })
}

impl Database {
    // -- Reels --

    pub fn insert_reel(
        &self,
        id: &str,
        author_id: &str,
        video_url: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reels (id, author_id, video_url, caption) VALUES (?1, ?2, ?3, ?4)",
                params![id, author_id, video_url, caption],
            )?;
            Ok(())
        })
    }

    pub fn get_reel(&self, id: &str, viewer_id: &str) -> Result<Option<ReelRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE r.id = ?2", REEL_SELECT);
            let row = conn
                .query_row(&sql, params![viewer_id, id], map_reel)
                .optional()?;
            Ok(row)
        })
    }

    pub fn reels_feed(
        &self,
        viewer_id: &str,
        sort: FeedSort,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<ReelRow>> {
        self.with_conn(|conn| query_reels(conn, viewer_id, sort, limit, before))
    }

    pub fn delete_reel(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM reels WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    pub fn reel_author(&self, id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let author = conn
                .query_row("SELECT author_id FROM reels WHERE id = ?1", [id], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(author)
        })
    }

    /// Toggle a like. Returns true when added, false when removed.
    pub fn toggle_reel_like(&self, id: &str, reel_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM reel_likes WHERE reel_id = ?1 AND user_id = ?2",
                    params![reel_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing_id) = existing {
                conn.execute("DELETE FROM reel_likes WHERE id = ?1", [&existing_id])?;
                Ok(false)
            } else {
                conn.execute(
                    "INSERT INTO reel_likes (id, reel_id, user_id) VALUES (?1, ?2, ?3)",
                    params![id, reel_id, user_id],
                )?;
                Ok(true)
            }
        })
    }

    /// Bump the view counter, returning the new total. None for unknown reels.
    /// Atomic under the connection mutex.
    pub fn increment_reel_views(&self, id: &str) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("UPDATE reels SET views = views + 1 WHERE id = ?1", [id])?;
            if changed == 0 {
                return Ok(None);
            }
            let views = conn.query_row("SELECT views FROM reels WHERE id = ?1", [id], |row| {
                row.get(0)
            })?;
            Ok(Some(views))
        })
    }

    // -- Comments --

    pub fn insert_reel_comment(
        &self,
        id: &str,
        reel_id: &str,
        author_id: &str,
        content: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reel_comments (id, reel_id, author_id, content) VALUES (?1, ?2, ?3, ?4)",
                params![id, reel_id, author_id, content],
            )?;
            Ok(())
        })
    }

    pub fn get_reel_comment(&self, id: &str) -> Result<Option<ReelCommentRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT rc.id, rc.reel_id, rc.author_id, u.username, rc.content, rc.created_at
                     FROM reel_comments rc
                     JOIN users u ON rc.author_id = u.id
                     WHERE rc.id = ?1",
                    [id],
                    map_comment,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn reel_comments(
        &self,
        reel_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<ReelCommentRow>> {
        self.with_conn(|conn| {
            let (cursor_ts, cursor_id) = cursor_position(conn, "reel_comments", before)?;

            let mut stmt = conn.prepare(
                "SELECT rc.id, rc.reel_id, rc.author_id, u.username, rc.content, rc.created_at
                 FROM reel_comments rc
                 JOIN users u ON rc.author_id = u.id
                 WHERE rc.reel_id = ?1
                   AND (?3 IS NULL OR rc.created_at < ?3
                        OR (rc.created_at = ?3 AND rc.id < ?4))
                 ORDER BY rc.created_at DESC, rc.id DESC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(params![reel_id, limit, cursor_ts, cursor_id], map_comment)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn delete_reel_comment(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM reel_comments WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }
}

fn map_comment(row: &rusqlite::Row) -> rusqlite::Result<ReelCommentRow> {
    Ok(ReelCommentRow {
        id: row.get(0)?,
        reel_id: row.get(1)?,
        author_id: row.get(2)?,
        author_username: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn query_reels(
    conn: &Connection,
    viewer_id: &str,
    sort: FeedSort,
    limit: u32,
    before: Option<&str>,
) -> Result<Vec<ReelRow>> {
    let (cursor_ts, cursor_id) = cursor_position(conn, "reels", before)?;

    let (cursor_filter, order) = match sort {
        FeedSort::Recent => (
            "AND (?3 IS NULL OR r.created_at < ?3
                  OR (r.created_at = ?3 AND r.id < ?4))",
            "ORDER BY r.created_at DESC, r.id DESC",
        ),
        // References ?3/?4 so the bound parameter list stays the same shape
        // as the Recent branch; the predicate is always true.
        FeedSort::Popular => (
            "AND (?3 IS NULL OR ?4 IS NULL OR 1)",
            "ORDER BY like_count DESC, r.views DESC, r.created_at DESC, r.id DESC",
        ),
    };

    let sql = format!(
        "{} WHERE 1 {} {} LIMIT ?2",
        REEL_SELECT, cursor_filter, order
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![viewer_id, limit, cursor_ts, cursor_id], map_reel)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
