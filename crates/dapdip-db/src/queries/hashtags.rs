use anyhow::Result;
use rusqlite::params;

use crate::Database;
use crate::models::{PostRow, TrendingTagRow};
use crate::queries::cursor_position;

/// Posts older than this no longer count toward trending.
const TRENDING_WINDOW: &str = "-7 days";

impl Database {
    // -- Hashtags --

    /// Upsert each tag by name and link it to the post, all in one
    /// transaction. `tags` pairs a candidate id (used only when the tag is
    /// new) with the normalized tag name.
    pub fn link_hashtags(&self, post_id: &str, tags: &[(String, String)]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            for (candidate_id, name) in tags {
                tx.execute(
                    "INSERT OR IGNORE INTO hashtags (id, name) VALUES (?1, ?2)",
                    (candidate_id, name),
                )?;
                let tag_id: String = tx.query_row(
                    "SELECT id FROM hashtags WHERE name = ?1",
                    [name],
                    |row| row.get(0),
                )?;
                tx.execute(
                    "INSERT OR IGNORE INTO post_hashtags (post_id, hashtag_id) VALUES (?1, ?2)",
                    (post_id, &tag_id),
                )?;
            }

            tx.commit()?;
            Ok(())
        })
    }

    /// Tags ranked by how many recent posts used them.
    pub fn trending_hashtags(&self, limit: u32) -> Result<Vec<TrendingTagRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT h.name, COUNT(*) AS uses
                 FROM post_hashtags ph
                 JOIN hashtags h ON ph.hashtag_id = h.id
                 JOIN posts p ON ph.post_id = p.id
                 WHERE p.created_at >= datetime('now', ?1)
                 GROUP BY h.id
                 ORDER BY uses DESC, h.name ASC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(params![TRENDING_WINDOW, limit], |row| {
                    Ok(TrendingTagRow {
                        name: row.get(0)?,
                        count: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn posts_for_hashtag(
        &self,
        name: &str,
        viewer_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let (cursor_ts, cursor_id) = cursor_position(conn, "posts", before)?;

            let mut stmt = conn.prepare(
                "SELECT p.id, p.author_id, u.username, p.content, p.created_at,
                        (SELECT COUNT(*) FROM post_likes pl WHERE pl.post_id = p.id) AS like_count,
                        EXISTS(SELECT 1 FROM post_likes pl
                               WHERE pl.post_id = p.id AND pl.user_id = ?1) AS liked
                 FROM post_hashtags ph
                 JOIN hashtags h ON ph.hashtag_id = h.id
                 JOIN posts p ON ph.post_id = p.id
                 JOIN users u ON p.author_id = u.id
                 WHERE h.name = ?2
                   AND (?4 IS NULL OR p.created_at < ?4
                        OR (p.created_at = ?4 AND p.id < ?5))
                 ORDER BY p.created_at DESC, p.id DESC
                 LIMIT ?3",
            )?;

            let rows = stmt
                .query_map(
                    params![viewer_id, name, limit, cursor_ts, cursor_id],
                    |row| {
                        Ok(PostRow {
                            id: row.get(0)?,
                            author_id: row.get(1)?,
                            author_username: row.get(2)?,
                            content: row.get(3)?,
                            created_at: row.get(4)?,
                            like_count: row.get(5)?,
                            liked: row.get(6)?,
                        })
                    },
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::queries::testutil::{db, user};

    #[test]
    fn trending_orders_by_use_count() {
        let db = db();
        user(&db, "u1", "ava");
        for i in 0..3 {
            let pid = format!("p{}", i);
            db.insert_post(&pid, "u1", "tagged").unwrap();
            db.link_hashtags(&pid, &[("t-rust".into(), "rust".into())])
                .unwrap();
        }
        db.insert_post("p9", "u1", "tagged").unwrap();
        db.link_hashtags("p9", &[("t-sql".into(), "sqlite".into())])
            .unwrap();

        let trending = db.trending_hashtags(10).unwrap();
        assert_eq!(trending[0].name, "rust");
        assert_eq!(trending[0].count, 3);
        assert_eq!(trending[1].name, "sqlite");
        assert_eq!(trending[1].count, 1);
    }

    #[test]
    fn relinking_the_same_tag_is_idempotent() {
        let db = db();
        user(&db, "u1", "ava");
        db.insert_post("p1", "u1", "tagged").unwrap();

        db.link_hashtags("p1", &[("t1".into(), "rust".into())]).unwrap();
        db.link_hashtags("p1", &[("t2".into(), "rust".into())]).unwrap();

        let trending = db.trending_hashtags(10).unwrap();
        assert_eq!(trending.len(), 1);
        assert_eq!(trending[0].count, 1);
    }

    #[test]
    fn posts_for_hashtag_only_returns_tagged_posts() {
        let db = db();
        user(&db, "u1", "ava");
        db.insert_post("p1", "u1", "tagged #rust").unwrap();
        db.insert_post("p2", "u1", "plain").unwrap();
        db.link_hashtags("p1", &[("t1".into(), "rust".into())]).unwrap();

        let posts = db.posts_for_hashtag("rust", "u1", 10, None).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "p1");
    }
}
