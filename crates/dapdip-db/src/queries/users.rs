use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

use crate::Database;
use crate::models::{ProfileCounts, UserRow};

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Partial profile update — absent fields keep their current value.
    pub fn update_profile(
        &self,
        id: &str,
        display_name: Option<&str>,
        bio: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users
                 SET display_name = COALESCE(?2, display_name),
                     bio          = COALESCE(?3, bio),
                     avatar_url   = COALESCE(?4, avatar_url)
                 WHERE id = ?1",
                (id, display_name, bio, avatar_url),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn profile_counts(&self, user_id: &str) -> Result<ProfileCounts> {
        self.with_conn(|conn| {
            let counts = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM posts WHERE author_id = ?1),
                    (SELECT COUNT(*) FROM reels WHERE author_id = ?1),
                    (SELECT COUNT(*) FROM group_members WHERE user_id = ?1)",
                [user_id],
                |row| {
                    Ok(ProfileCounts {
                        posts: row.get(0)?,
                        reels: row.get(1)?,
                        groups: row.get(2)?,
                    })
                },
            )?;
            Ok(counts)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, password, display_name, bio, avatar_url, created_at
         FROM users WHERE {} = ?1",
        column
    );

    let row = conn
        .query_row(&sql, [value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                display_name: row.get(3)?,
                bio: row.get(4)?,
                avatar_url: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}
