use anyhow::Result;
use rusqlite::params;

use crate::Database;
use crate::models::NotificationRow;
use crate::queries::cursor_position;

impl Database {
    // -- Notifications --

    pub fn insert_notification(
        &self,
        id: &str,
        user_id: &str,
        actor_id: &str,
        kind: &str,
        subject_id: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, actor_id, kind, subject_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, user_id, actor_id, kind, subject_id],
            )?;
            Ok(())
        })
    }

    pub fn notifications(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let (cursor_ts, cursor_id) = cursor_position(conn, "notifications", before)?;

            let mut stmt = conn.prepare(
                "SELECT n.id, n.actor_id, u.username, n.kind, n.subject_id, n.read, n.created_at
                 FROM notifications n
                 JOIN users u ON n.actor_id = u.id
                 WHERE n.user_id = ?1
                   AND (?3 = 0 OR n.read = 0)
                   AND (?4 IS NULL OR n.created_at < ?4
                        OR (n.created_at = ?4 AND n.id < ?5))
                 ORDER BY n.created_at DESC, n.id DESC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(
                    params![user_id, limit, unread_only, cursor_ts, cursor_id],
                    |row| {
                        Ok(NotificationRow {
                            id: row.get(0)?,
                            actor_id: row.get(1)?,
                            actor_username: row.get(2)?,
                            kind: row.get(3)?,
                            subject_id: row.get(4)?,
                            read: row.get(5)?,
                            created_at: row.get(6)?,
                        })
                    },
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn unread_count(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read = 0",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Owner-scoped: marking someone else's notification is a no-op.
    pub fn mark_read(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn mark_all_read(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET read = 1 WHERE user_id = ?1 AND read = 0",
                [user_id],
            )?;
            Ok(changed)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::queries::testutil::{db, user};

    #[test]
    fn unread_count_tracks_mark_read() {
        let db = db();
        user(&db, "u1", "ava");
        user(&db, "u2", "ben");
        db.insert_notification("n1", "u1", "u2", "reel_like", Some("r1"))
            .unwrap();
        db.insert_notification("n2", "u1", "u2", "reel_comment", Some("r1"))
            .unwrap();

        assert_eq!(db.unread_count("u1").unwrap(), 2);
        assert!(db.mark_read("n1", "u1").unwrap());
        assert_eq!(db.unread_count("u1").unwrap(), 1);
        assert_eq!(db.mark_all_read("u1").unwrap(), 1);
        assert_eq!(db.unread_count("u1").unwrap(), 0);
    }

    #[test]
    fn mark_read_is_owner_scoped() {
        let db = db();
        user(&db, "u1", "ava");
        user(&db, "u2", "ben");
        db.insert_notification("n1", "u1", "u2", "post_like", None)
            .unwrap();

        assert!(!db.mark_read("n1", "u2").unwrap());
        assert_eq!(db.unread_count("u1").unwrap(), 1);
    }

    #[test]
    fn unread_filter_hides_read_rows() {
        let db = db();
        user(&db, "u1", "ava");
        user(&db, "u2", "ben");
        db.insert_notification("n1", "u1", "u2", "post_like", None)
            .unwrap();
        db.insert_notification("n2", "u1", "u2", "reel_like", None)
            .unwrap();
        db.mark_read("n1", "u1").unwrap();

        let unread = db.notifications("u1", true, 10, None).unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, "n2");

        let all = db.notifications("u1", false, 10, None).unwrap();
        assert_eq!(all.len(), 2);
    }
}
