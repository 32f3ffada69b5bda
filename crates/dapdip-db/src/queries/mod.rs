pub mod groups;
pub mod hashtags;
pub mod notifications;
pub mod polls;
pub mod posts;
pub mod reels;
pub mod streams;
pub mod users;

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

/// Resolve a keyset cursor to the `(created_at, id)` position of the row the
/// client saw last. An unknown id degrades to an unfiltered first page rather
/// than an error, so deleted cursor rows don't break clients mid-scroll.
pub(crate) fn cursor_position(
    conn: &Connection,
    table: &'static str,
    before: Option<&str>,
) -> Result<(Option<String>, Option<String>)> {
    let Some(id) = before else {
        return Ok((None, None));
    };

    let sql = format!("SELECT created_at, id FROM {} WHERE id = ?1", table);
    let pos: Option<(String, String)> = conn
        .query_row(&sql, [id], |row| Ok((row.get(0)?, row.get(1)?)))
        .optional()?;

    Ok(match pos {
        Some((ts, id)) => (Some(ts), Some(id)),
        None => (None, None),
    })
}

#[cfg(test)]
pub(crate) mod testutil {
    use crate::Database;

    pub fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    pub fn user(db: &Database, id: &str, name: &str) {
        db.create_user(id, name, "argon2-hash").unwrap();
    }
}
