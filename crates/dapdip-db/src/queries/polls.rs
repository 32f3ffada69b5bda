use anyhow::Result;
use rusqlite::{OptionalExtension, params};

use crate::Database;
use crate::models::{PollOptionRow, PollRow};

impl Database {
    // -- Polls --

    /// Insert the poll and all of its options in one transaction.
    pub fn create_poll(
        &self,
        id: &str,
        author_id: &str,
        question: &str,
        multi_choice: bool,
        ends_at: Option<&str>,
        options: &[(String, String)],
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO polls (id, author_id, question, multi_choice, ends_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, author_id, question, multi_choice, ends_at],
            )?;
            for (position, (option_id, label)) in options.iter().enumerate() {
                tx.execute(
                    "INSERT INTO poll_options (id, poll_id, label, position)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![option_id, id, label, position as i64],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_poll(&self, id: &str) -> Result<Option<PollRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, author_id, question, multi_choice, ends_at, created_at
                     FROM polls WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(PollRow {
                            id: row.get(0)?,
                            author_id: row.get(1)?,
                            question: row.get(2)?,
                            multi_choice: row.get(3)?,
                            ends_at: row.get(4)?,
                            created_at: row.get(5)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Options in presentation order, each with its current vote count.
    pub fn poll_options(&self, poll_id: &str) -> Result<Vec<PollOptionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT o.id, o.label, o.position,
                        (SELECT COUNT(*) FROM poll_votes v WHERE v.option_id = o.id) AS votes
                 FROM poll_options o
                 WHERE o.poll_id = ?1
                 ORDER BY o.position ASC",
            )?;

            let rows = stmt
                .query_map([poll_id], |row| {
                    Ok(PollOptionRow {
                        id: row.get(0)?,
                        label: row.get(1)?,
                        position: row.get(2)?,
                        votes: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn has_voted(&self, poll_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let voted = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM poll_votes WHERE poll_id = ?1 AND user_id = ?2)",
                params![poll_id, user_id],
                |row| row.get(0),
            )?;
            Ok(voted)
        })
    }

    /// Record a full ballot — one row per selected option — atomically.
    /// Returns false without writing anything when the user already voted;
    /// the duplicate check runs inside the same transaction as the inserts.
    /// Any constraint violation rolls back the whole ballot.
    pub fn record_votes(
        &self,
        poll_id: &str,
        user_id: &str,
        votes: &[(String, String)],
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let already: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM poll_votes WHERE poll_id = ?1 AND user_id = ?2)",
                params![poll_id, user_id],
                |row| row.get(0),
            )?;
            if already {
                return Ok(false);
            }

            for (vote_id, option_id) in votes {
                tx.execute(
                    "INSERT INTO poll_votes (id, poll_id, option_id, user_id)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![vote_id, poll_id, option_id, user_id],
                )?;
            }
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn total_voters(&self, poll_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let total = conn.query_row(
                "SELECT COUNT(DISTINCT user_id) FROM poll_votes WHERE poll_id = ?1",
                [poll_id],
                |row| row.get(0),
            )?;
            Ok(total)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::queries::testutil::{db, user};

    fn poll_with_options(db: &crate::Database) {
        user(db, "u1", "ava");
        user(db, "u2", "ben");
        db.create_poll(
            "poll1",
            "u1",
            "tabs or spaces?",
            false,
            None,
            &[
                ("opt-tabs".into(), "tabs".into()),
                ("opt-spaces".into(), "spaces".into()),
            ],
        )
        .unwrap();
    }

    #[test]
    fn options_keep_presentation_order() {
        let db = db();
        poll_with_options(&db);

        let options = db.poll_options("poll1").unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].label, "tabs");
        assert_eq!(options[1].label, "spaces");
    }

    #[test]
    fn ballot_is_tallied_per_option() {
        let db = db();
        poll_with_options(&db);

        db.record_votes("poll1", "u1", &[("v1".into(), "opt-tabs".into())])
            .unwrap();
        db.record_votes("poll1", "u2", &[("v2".into(), "opt-tabs".into())])
            .unwrap();

        let options = db.poll_options("poll1").unwrap();
        assert_eq!(options[0].votes, 2);
        assert_eq!(options[1].votes, 0);
        assert_eq!(db.total_voters("poll1").unwrap(), 2);
        assert!(db.has_voted("poll1", "u1").unwrap());
        assert!(!db.has_voted("poll1", "missing").unwrap());
    }

    #[test]
    fn second_ballot_is_rejected_and_tally_unchanged() {
        let db = db();
        poll_with_options(&db);

        assert!(
            db.record_votes("poll1", "u1", &[("v1".into(), "opt-tabs".into())])
                .unwrap()
        );
        // A second ballot — even for a different option — writes nothing.
        assert!(
            !db.record_votes("poll1", "u1", &[("v2".into(), "opt-spaces".into())])
                .unwrap()
        );

        let options = db.poll_options("poll1").unwrap();
        assert_eq!(options[0].votes, 1);
        assert_eq!(options[1].votes, 0);
    }

    #[test]
    fn failed_multi_option_ballot_rolls_back_entirely() {
        let db = db();
        poll_with_options(&db);

        // Second row repeats the option and violates UNIQUE(option_id, user_id);
        // the first row must not survive.
        let err = db.record_votes(
            "poll1",
            "u1",
            &[
                ("v1".into(), "opt-tabs".into()),
                ("v2".into(), "opt-tabs".into()),
            ],
        );
        assert!(err.is_err());
        assert!(!db.has_voted("poll1", "u1").unwrap());
        assert_eq!(db.total_voters("poll1").unwrap(), 0);
    }

    #[test]
    fn multi_choice_ballot_counts_one_voter() {
        let db = db();
        user(&db, "u1", "ava");
        db.create_poll(
            "poll1",
            "u1",
            "which editors do you use?",
            true,
            None,
            &[
                ("o1".into(), "helix".into()),
                ("o2".into(), "vim".into()),
            ],
        )
        .unwrap();

        db.record_votes(
            "poll1",
            "u1",
            &[("v1".into(), "o1".into()), ("v2".into(), "o2".into())],
        )
        .unwrap();

        assert_eq!(db.total_voters("poll1").unwrap(), 1);
        let options = db.poll_options("poll1").unwrap();
        assert_eq!(options[0].votes, 1);
        assert_eq!(options[1].votes, 1);
    }
}
