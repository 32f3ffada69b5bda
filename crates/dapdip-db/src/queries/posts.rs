use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

use crate::Database;
use crate::models::{EmbeddingRow, FeedSort, PostRow};
use crate::queries::cursor_position;

const POST_SELECT: &str = "
    SELECT p.id, p.author_id, u.username, p.content, p.created_at,
           (SELECT COUNT(*) FROM post_likes pl WHERE pl.post_id = p.id) AS like_count,
           EXISTS(SELECT 1 FROM post_likes pl
                  WHERE pl.post_id = p.id AND pl.user_id = ?1) AS liked
    FROM posts p
    JOIN users u ON p.author_id = u.id";

fn map_post(row: &rusqlite::Row) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        author_id: row.get(1)?,
        author_username: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        like_count: row.get(5)?,
        liked: row.get(6)?,
    })
}

impl Database {
    // -- Posts --

    pub fn insert_post(&self, id: &str, author_id: &str, content: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, author_id, content) VALUES (?1, ?2, ?3)",
                (id, author_id, content),
            )?;
            Ok(())
        })
    }

    pub fn get_post(&self, id: &str, viewer_id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE p.id = ?2", POST_SELECT);
            let row = conn
                .query_row(&sql, params![viewer_id, id], map_post)
                .optional()?;
            Ok(row)
        })
    }

    /// The home feed. `Recent` pages by `(created_at, id)` descending with an
    /// id cursor — pages are disjoint and together cover every row exactly
    /// once, ties included. `Popular` returns the top rows by like count.
    pub fn get_feed(
        &self,
        viewer_id: &str,
        sort: FeedSort,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| query_feed(conn, viewer_id, sort, limit, before, None))
    }

    pub fn posts_by_author(
        &self,
        author_id: &str,
        viewer_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            query_feed(conn, viewer_id, FeedSort::Recent, limit, before, Some(author_id))
        })
    }

    pub fn delete_post(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM posts WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    pub fn post_author(&self, id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let author = conn
                .query_row("SELECT author_id FROM posts WHERE id = ?1", [id], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(author)
        })
    }

    /// Toggle a like: removes if present, inserts if not.
    /// Returns true when the like was added, false when removed.
    pub fn toggle_post_like(&self, id: &str, post_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM post_likes WHERE post_id = ?1 AND user_id = ?2",
                    params![post_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing_id) = existing {
                conn.execute("DELETE FROM post_likes WHERE id = ?1", [&existing_id])?;
                Ok(false)
            } else {
                conn.execute(
                    "INSERT INTO post_likes (id, post_id, user_id) VALUES (?1, ?2, ?3)",
                    params![id, post_id, user_id],
                )?;
                Ok(true)
            }
        })
    }

    /// Substring search fallback, used when the AI embedding path is disabled.
    pub fn search_posts(&self, query: &str, viewer_id: &str, limit: u32) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE p.content LIKE '%' || ?2 || '%'
                 ORDER BY p.created_at DESC, p.id DESC
                 LIMIT ?3",
                POST_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![viewer_id, query, limit], map_post)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Embeddings --

    pub fn store_embedding(&self, post_id: &str, vector_json: &str, model: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO post_embeddings (post_id, vector, model) VALUES (?1, ?2, ?3)
                 ON CONFLICT(post_id) DO UPDATE SET vector = ?2, model = ?3",
                (post_id, vector_json, model),
            )?;
            Ok(())
        })
    }

    pub fn all_embeddings(&self) -> Result<Vec<EmbeddingRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT post_id, vector FROM post_embeddings")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(EmbeddingRow {
                        post_id: row.get(0)?,
                        vector: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_feed(
    conn: &Connection,
    viewer_id: &str,
    sort: FeedSort,
    limit: u32,
    before: Option<&str>,
    author_id: Option<&str>,
) -> Result<Vec<PostRow>> {
    let (cursor_ts, cursor_id) = cursor_position(conn, "posts", before)?;

    let author_filter = match author_id {
        Some(_) => "AND p.author_id = ?5",
        None => "AND (?5 IS NULL OR 1)",
    };

    let order = match sort {
        FeedSort::Recent => "ORDER BY p.created_at DESC, p.id DESC",
        FeedSort::Popular => "ORDER BY like_count DESC, p.created_at DESC, p.id DESC",
    };

    let cursor_filter = match sort {
        // Popularity shifts as likes land, so a keyset cursor over it would
        // skip rows; popular feeds are top-N only. The predicate still names
        // ?3/?4 so the bound parameter list keeps the same shape.
        FeedSort::Popular => "AND (?3 IS NULL OR ?4 IS NULL OR 1)",
        FeedSort::Recent => {
            "AND (?3 IS NULL OR p.created_at < ?3
                  OR (p.created_at = ?3 AND p.id < ?4))"
        }
    };

    let sql = format!(
        "{} WHERE 1 {} {} {} LIMIT ?2",
        POST_SELECT, author_filter, cursor_filter, order
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![viewer_id, limit, cursor_ts, cursor_id, author_id],
            map_post,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::testutil::{db, user};

    #[test]
    fn like_toggles_on_and_off() {
        let db = db();
        user(&db, "u1", "ava");
        db.insert_post("p1", "u1", "hello").unwrap();

        assert!(db.toggle_post_like("l1", "p1", "u1").unwrap());
        assert_eq!(db.get_post("p1", "u1").unwrap().unwrap().like_count, 1);
        assert!(db.get_post("p1", "u1").unwrap().unwrap().liked);

        assert!(!db.toggle_post_like("l2", "p1", "u1").unwrap());
        let row = db.get_post("p1", "u1").unwrap().unwrap();
        assert_eq!(row.like_count, 0);
        assert!(!row.liked);
    }

    #[test]
    fn feed_pages_are_disjoint_and_cover_all_rows() {
        let db = db();
        user(&db, "u1", "ava");
        // All five land in the same datetime('now') second, so paging must
        // fall back to the id tiebreak.
        for i in 0..5 {
            db.insert_post(&format!("p{}", i), "u1", "post").unwrap();
        }

        let mut seen = Vec::new();
        let mut before: Option<String> = None;
        loop {
            let page = db
                .get_feed("u1", FeedSort::Recent, 2, before.as_deref())
                .unwrap();
            if page.is_empty() {
                break;
            }
            before = Some(page.last().unwrap().id.clone());
            seen.extend(page.into_iter().map(|p| p.id));
        }

        let mut unique = seen.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), seen.len(), "pages overlap");
        assert_eq!(unique, vec!["p0", "p1", "p2", "p3", "p4"]);
    }

    #[test]
    fn unknown_cursor_degrades_to_first_page() {
        let db = db();
        user(&db, "u1", "ava");
        db.insert_post("p1", "u1", "hello").unwrap();

        let page = db
            .get_feed("u1", FeedSort::Recent, 10, Some("deleted-post"))
            .unwrap();
        assert_eq!(page.len(), 1);
    }

    #[test]
    fn popular_sort_orders_by_like_count() {
        let db = db();
        user(&db, "u1", "ava");
        user(&db, "u2", "ben");
        db.insert_post("p1", "u1", "quiet").unwrap();
        db.insert_post("p2", "u1", "loud").unwrap();
        db.toggle_post_like("l1", "p2", "u1").unwrap();
        db.toggle_post_like("l2", "p2", "u2").unwrap();
        db.toggle_post_like("l3", "p1", "u2").unwrap();

        let feed = db.get_feed("u1", FeedSort::Popular, 10, None).unwrap();
        assert_eq!(feed[0].id, "p2");
        assert_eq!(feed[0].like_count, 2);
        assert_eq!(feed[1].id, "p1");
    }

    #[test]
    fn posts_by_author_filters() {
        let db = db();
        user(&db, "u1", "ava");
        user(&db, "u2", "ben");
        db.insert_post("p1", "u1", "mine").unwrap();
        db.insert_post("p2", "u2", "theirs").unwrap();

        let posts = db.posts_by_author("u1", "u1", 10, None).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "p1");
    }

    #[test]
    fn substring_search_matches_content() {
        let db = db();
        user(&db, "u1", "ava");
        db.insert_post("p1", "u1", "rust is great").unwrap();
        db.insert_post("p2", "u1", "unrelated").unwrap();

        let hits = db.search_posts("rust", "u1", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "p1");
    }

    #[test]
    fn embeddings_upsert() {
        let db = db();
        user(&db, "u1", "ava");
        db.insert_post("p1", "u1", "hello").unwrap();

        db.store_embedding("p1", "[0.1,0.2]", "test-model").unwrap();
        db.store_embedding("p1", "[0.3,0.4]", "test-model").unwrap();

        let rows = db.all_embeddings().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].vector, "[0.3,0.4]");
    }
}
