use anyhow::Result;
use rusqlite::{OptionalExtension, params};

use crate::Database;
use crate::models::{StreamMessageRow, StreamRow};
use crate::queries::cursor_position;

const STREAM_SELECT: &str = "
    SELECT s.id, s.host_id, u.username, s.title, s.live, s.started_at, s.ended_at
    FROM livestreams s
    JOIN users u ON s.host_id = u.id";

fn map_stream(row: &rusqlite::Row) -> rusqlite::Result<StreamRow> {
    Ok(StreamRow {
        id: row.get(0)?,
        host_id: row.get(1)?,
        host_username: row.get(2)?,
        title: row.get(3)?,
        live: row.get(4)?,
        started_at: row.get(5)?,
        ended_at: row.get(6)?,
    })
}

impl Database {
    // -- Livestreams --

    /// The stream a host currently has live, if any. One live stream per host.
    pub fn host_live_stream(&self, host_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let id = conn
                .query_row(
                    "SELECT id FROM livestreams WHERE host_id = ?1 AND live = 1",
                    [host_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(id)
        })
    }

    pub fn insert_stream(&self, id: &str, host_id: &str, title: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO livestreams (id, host_id, title) VALUES (?1, ?2, ?3)",
                params![id, host_id, title],
            )?;
            Ok(())
        })
    }

    pub fn get_stream(&self, id: &str) -> Result<Option<StreamRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE s.id = ?1", STREAM_SELECT);
            let row = conn.query_row(&sql, [id], map_stream).optional()?;
            Ok(row)
        })
    }

    pub fn live_streams(&self) -> Result<Vec<StreamRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE s.live = 1 ORDER BY s.started_at DESC, s.id DESC",
                STREAM_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], map_stream)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false when the stream was unknown or already ended.
    pub fn end_stream(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE livestreams
                 SET live = 0, ended_at = datetime('now')
                 WHERE id = ?1 AND live = 1",
                [id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Streams live for longer than the given modifier allows, e.g. "-12 hours".
    /// The janitor ends these.
    pub fn stale_live_streams(&self, age_modifier: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM livestreams
                 WHERE live = 1 AND started_at < datetime('now', ?1)",
            )?;
            let ids = stmt
                .query_map([age_modifier], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    // -- Chat --

    pub fn insert_stream_message(
        &self,
        id: &str,
        stream_id: &str,
        author_id: &str,
        content: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO stream_messages (id, stream_id, author_id, content)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, stream_id, author_id, content],
            )?;
            Ok(())
        })
    }

    pub fn stream_messages(
        &self,
        stream_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<StreamMessageRow>> {
        self.with_conn(|conn| {
            let (cursor_ts, cursor_id) = cursor_position(conn, "stream_messages", before)?;

            let mut stmt = conn.prepare(
                "SELECT m.id, m.stream_id, m.author_id, u.username, m.content, m.created_at
                 FROM stream_messages m
                 JOIN users u ON m.author_id = u.id
                 WHERE m.stream_id = ?1
                   AND (?3 IS NULL OR m.created_at < ?3
                        OR (m.created_at = ?3 AND m.id < ?4))
                 ORDER BY m.created_at DESC, m.id DESC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(params![stream_id, limit, cursor_ts, cursor_id], |row| {
                    Ok(StreamMessageRow {
                        id: row.get(0)?,
                        stream_id: row.get(1)?,
                        author_id: row.get(2)?,
                        author_username: row.get(3)?,
                        content: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Participants --

    pub fn participant_join(&self, id: &str, stream_id: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO stream_participants (id, stream_id, user_id) VALUES (?1, ?2, ?3)",
                params![id, stream_id, user_id],
            )?;
            Ok(())
        })
    }

    /// Close the participant's open attendance row, if one exists.
    pub fn participant_leave(&self, stream_id: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE stream_participants
                 SET left_at = datetime('now')
                 WHERE stream_id = ?1 AND user_id = ?2 AND left_at IS NULL",
                params![stream_id, user_id],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::queries::testutil::{db, user};

    #[test]
    fn one_live_stream_per_host() {
        let db = db();
        user(&db, "u1", "ava");
        db.insert_stream("s1", "u1", "coding").unwrap();

        assert_eq!(db.host_live_stream("u1").unwrap().as_deref(), Some("s1"));

        assert!(db.end_stream("s1").unwrap());
        assert!(db.host_live_stream("u1").unwrap().is_none());
        // Ending twice is a no-op
        assert!(!db.end_stream("s1").unwrap());

        let row = db.get_stream("s1").unwrap().unwrap();
        assert!(!row.live);
        assert!(row.ended_at.is_some());
    }

    #[test]
    fn live_listing_excludes_ended_streams() {
        let db = db();
        user(&db, "u1", "ava");
        user(&db, "u2", "ben");
        db.insert_stream("s1", "u1", "one").unwrap();
        db.insert_stream("s2", "u2", "two").unwrap();
        db.end_stream("s1").unwrap();

        let live = db.live_streams().unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, "s2");
    }

    #[test]
    fn stale_sweep_finds_old_streams() {
        let db = db();
        user(&db, "u1", "ava");
        db.insert_stream("s1", "u1", "forgotten").unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE livestreams SET started_at = datetime('now', '-1 day') WHERE id = 's1'",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        assert_eq!(db.stale_live_streams("-12 hours").unwrap(), vec!["s1"]);
        assert!(db.stale_live_streams("-48 hours").unwrap().is_empty());
    }

    #[test]
    fn chat_history_paginates() {
        let db = db();
        user(&db, "u1", "ava");
        db.insert_stream("s1", "u1", "chatty").unwrap();
        for i in 0..3 {
            db.insert_stream_message(&format!("m{}", i), "s1", "u1", "hi")
                .unwrap();
        }

        let page1 = db.stream_messages("s1", 2, None).unwrap();
        assert_eq!(page1.len(), 2);
        let page2 = db.stream_messages("s1", 2, Some(&page1[1].id)).unwrap();
        assert_eq!(page2.len(), 1);
    }

    #[test]
    fn participant_rows_open_and_close() {
        let db = db();
        user(&db, "u1", "ava");
        user(&db, "u2", "ben");
        db.insert_stream("s1", "u1", "live").unwrap();

        db.participant_join("pa1", "s1", "u2").unwrap();
        db.participant_leave("s1", "u2").unwrap();

        let open: i64 = db
            .with_conn(|conn| {
                let n = conn.query_row(
                    "SELECT COUNT(*) FROM stream_participants WHERE left_at IS NULL",
                    [],
                    |row| row.get(0),
                )?;
                Ok(n)
            })
            .unwrap();
        assert_eq!(open, 0);
    }
}
