use anyhow::Result;
use rusqlite::{OptionalExtension, params};

use crate::Database;
use crate::models::{GroupMemberRow, GroupPostRow, GroupRow};
use crate::queries::cursor_position;

impl Database {
    // -- Groups --

    /// Create a group and its owner membership row atomically.
    pub fn create_group(
        &self,
        id: &str,
        name: &str,
        description: Option<&str>,
        owner_id: &str,
        private: bool,
        owner_member_id: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                r#"INSERT INTO "groups" (id, name, description, owner_id, private)
                   VALUES (?1, ?2, ?3, ?4, ?5)"#,
                params![id, name, description, owner_id, private],
            )?;
            tx.execute(
                "INSERT INTO group_members (id, group_id, user_id, role)
                 VALUES (?1, ?2, ?3, 'owner')",
                params![owner_member_id, id, owner_id],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_group(&self, id: &str) -> Result<Option<GroupRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    r#"SELECT g.id, g.name, g.description, g.owner_id, g.private, g.created_at,
                              (SELECT COUNT(*) FROM group_members gm WHERE gm.group_id = g.id)
                       FROM "groups" g WHERE g.id = ?1"#,
                    [id],
                    |row| {
                        Ok(GroupRow {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            description: row.get(2)?,
                            owner_id: row.get(3)?,
                            private: row.get(4)?,
                            created_at: row.get(5)?,
                            member_count: row.get(6)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn update_group(
        &self,
        id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                r#"UPDATE "groups"
                   SET name        = COALESCE(?2, name),
                       description = COALESCE(?3, description)
                   WHERE id = ?1"#,
                params![id, name, description],
            )?;
            Ok(changed > 0)
        })
    }

    /// Dependent members and posts go with the group via cascade.
    pub fn delete_group(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(r#"DELETE FROM "groups" WHERE id = ?1"#, [id])?;
            Ok(changed > 0)
        })
    }

    // -- Membership --

    pub fn membership_role(&self, group_id: &str, user_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let role = conn
                .query_row(
                    "SELECT role FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                    params![group_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(role)
        })
    }

    pub fn add_member(&self, id: &str, group_id: &str, user_id: &str, role: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO group_members (id, group_id, user_id, role) VALUES (?1, ?2, ?3, ?4)",
                params![id, group_id, user_id, role],
            )?;
            Ok(())
        })
    }

    pub fn remove_member(&self, group_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                params![group_id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn list_members(&self, group_id: &str) -> Result<Vec<GroupMemberRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT gm.user_id, u.username, gm.role, gm.joined_at
                 FROM group_members gm
                 JOIN users u ON gm.user_id = u.id
                 WHERE gm.group_id = ?1
                 ORDER BY gm.joined_at ASC, u.username ASC",
            )?;

            let rows = stmt
                .query_map([group_id], |row| {
                    Ok(GroupMemberRow {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        role: row.get(2)?,
                        joined_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Group posts --

    pub fn insert_group_post(
        &self,
        id: &str,
        group_id: &str,
        author_id: &str,
        content: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO group_posts (id, group_id, author_id, content) VALUES (?1, ?2, ?3, ?4)",
                params![id, group_id, author_id, content],
            )?;
            Ok(())
        })
    }

    pub fn group_posts(
        &self,
        group_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<GroupPostRow>> {
        self.with_conn(|conn| {
            let (cursor_ts, cursor_id) = cursor_position(conn, "group_posts", before)?;

            let mut stmt = conn.prepare(
                "SELECT gp.id, gp.group_id, gp.author_id, u.username, gp.content, gp.created_at
                 FROM group_posts gp
                 JOIN users u ON gp.author_id = u.id
                 WHERE gp.group_id = ?1
                   AND (?3 IS NULL OR gp.created_at < ?3
                        OR (gp.created_at = ?3 AND gp.id < ?4))
                 ORDER BY gp.created_at DESC, gp.id DESC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(params![group_id, limit, cursor_ts, cursor_id], |row| {
                    Ok(GroupPostRow {
                        id: row.get(0)?,
                        group_id: row.get(1)?,
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
}

#[cfg(test)]
mod tests {
    use crate::queries::testutil::{db, user};

    #[test]
    fn creator_becomes_owner() {
        let db = db();
        user(&db, "u1", "ava");
        db.create_group("g1", "rustaceans", Some("a group"), "u1", false, "m1")
            .unwrap();

        assert_eq!(
            db.membership_role("g1", "u1").unwrap().as_deref(),
            Some("owner")
        );
        let group = db.get_group("g1").unwrap().unwrap();
        assert_eq!(group.member_count, 1);
        assert!(!group.private);
    }

    #[test]
    fn duplicate_membership_is_rejected() {
        let db = db();
        user(&db, "u1", "ava");
        user(&db, "u2", "ben");
        db.create_group("g1", "rustaceans", None, "u1", false, "m1")
            .unwrap();

        db.add_member("m2", "g1", "u2", "member").unwrap();
        assert!(db.add_member("m3", "g1", "u2", "member").is_err());
    }

    #[test]
    fn deleting_a_group_cascades() {
        let db = db();
        user(&db, "u1", "ava");
        db.create_group("g1", "rustaceans", None, "u1", true, "m1")
            .unwrap();
        db.insert_group_post("gp1", "g1", "u1", "hello").unwrap();

        assert!(db.delete_group("g1").unwrap());
        assert!(db.membership_role("g1", "u1").unwrap().is_none());
        assert!(db.group_posts("g1", 10, None).unwrap().is_empty());
    }

    #[test]
    fn group_posts_are_scoped_to_the_group() {
        let db = db();
        user(&db, "u1", "ava");
        db.create_group("g1", "one", None, "u1", false, "m1").unwrap();
        db.create_group("g2", "two", None, "u1", false, "m2").unwrap();
        db.insert_group_post("gp1", "g1", "u1", "in g1").unwrap();
        db.insert_group_post("gp2", "g2", "u1", "in g2").unwrap();

        let posts = db.group_posts("g1", 10, None).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "gp1");
    }
}
