//! The duplicate check record and its database functions.
//!
//! A check records that two transactions looked like the same real-world
//! purchase at detection time, and tracks the outcome of its review. Checks
//! are never deleted and each unordered pair of transactions has at most one
//! check, so a pair that was reviewed once is never surfaced again.

use std::{
    collections::HashSet,
    fmt::{self, Display, Formatter},
};

use rusqlite::{Connection, Row, types::Type};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error,
    database_id::{CheckID, TransactionID},
    detection::CandidatePair,
};

// ============================================================================
// MODELS
// ============================================================================

/// The review state of a duplicate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckState {
    /// Awaiting review.
    Pending,
    /// Reviewed and confirmed as a duplicate.
    Duplicate,
    /// Reviewed and cleared as distinct transactions.
    NotDuplicate,
    /// Reviewed and set aside without a verdict.
    Skip,
}

impl CheckState {
    /// The state as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckState::Pending => "pending",
            CheckState::Duplicate => "duplicate",
            CheckState::NotDuplicate => "not_duplicate",
            CheckState::Skip => "skip",
        }
    }

    pub(crate) fn from_db(value: &str) -> Option<CheckState> {
        match value {
            "pending" => Some(CheckState::Pending),
            "duplicate" => Some(CheckState::Duplicate),
            "not_duplicate" => Some(CheckState::NotDuplicate),
            "skip" => Some(CheckState::Skip),
            _ => None,
        }
    }
}

impl Display for CheckState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record that two transactions look like the same real-world purchase,
/// together with the outcome of its review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCheck {
    /// The check's database ID.
    pub id: CheckID,
    /// The smaller transaction ID of the pair.
    pub transaction_id_1: TransactionID,
    /// The larger transaction ID of the pair.
    pub transaction_id_2: TransactionID,
    /// The similarity score the pair was detected with.
    pub similarity_score: f64,
    /// Where the check is in the review workflow.
    pub state: CheckState,
    /// When the check was created.
    pub created_at: OffsetDateTime,
    /// When the check was decided. `None` while the check is pending.
    pub decided_at: Option<OffsetDateTime>,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create the table for storing duplicate checks if it does not already
/// exist.
pub fn create_duplicate_check_table(connection: &Connection) -> Result<(), Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS duplicate_check (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            transaction_id_1 INTEGER NOT NULL,
            transaction_id_2 INTEGER NOT NULL,
            similarity_score REAL NOT NULL,
            state TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            decided_at TEXT,
            CHECK (transaction_id_1 < transaction_id_2),
            UNIQUE (transaction_id_1, transaction_id_2)
        )",
        (),
    )?;

    // Ensure the sequence starts at 1.
    connection.execute(
        "INSERT OR IGNORE INTO sqlite_sequence (name, seq) VALUES ('duplicate_check', 0)",
        (),
    )?;

    // Pending checks are listed by score.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_duplicate_check_state_score
            ON duplicate_check (state, similarity_score DESC)",
        (),
    )?;

    Ok(())
}

/// Persist `candidates` as pending checks, skipping any pair that already
/// has a check.
///
/// Returns the checks that were created. The whole batch is written in one
/// transaction, so a failure part way through leaves the database unchanged.
pub(crate) fn create_checks(
    candidates: &[CandidatePair],
    connection: &Connection,
) -> Result<Vec<DuplicateCheck>, Error> {
    let transaction = connection.unchecked_transaction()?;

    let created_at = OffsetDateTime::now_utc();
    let mut created = Vec::new();

    let mut statement = transaction.prepare(
        "INSERT INTO duplicate_check (
            transaction_id_1, transaction_id_2, similarity_score, state, created_at
        )
        VALUES (?1, ?2, ?3, 'pending', ?4)
        ON CONFLICT (transaction_id_1, transaction_id_2) DO NOTHING
        RETURNING id, transaction_id_1, transaction_id_2, similarity_score, state,
            created_at, decided_at",
    )?;

    for candidate in candidates {
        let result = statement.query_row(
            (
                candidate.transaction_id_1,
                candidate.transaction_id_2,
                candidate.score,
                created_at,
            ),
            map_check_row,
        );

        match result {
            Ok(check) => created.push(check),
            // The conflict clause suppressed the insert, so there is no row
            // to return.
            Err(rusqlite::Error::QueryReturnedNoRows) => {}
            Err(error) => return Err(error.into()),
        }
    }

    drop(statement);
    transaction.commit()?;

    Ok(created)
}

/// Retrieve the check with `id` from the database.
///
/// Returns [Error::NotFound] if there is no such check.
pub fn get_check(id: CheckID, connection: &Connection) -> Result<DuplicateCheck, Error> {
    connection
        .prepare(
            "SELECT id, transaction_id_1, transaction_id_2, similarity_score, state,
                created_at, decided_at
            FROM duplicate_check
            WHERE id = :id",
        )?
        .query_row(&[(":id", &id)], map_check_row)
        .map_err(|error| error.into())
}

/// Retrieve up to `limit` pending checks, the most similar pairs first.
pub fn list_pending_checks(
    limit: u64,
    connection: &Connection,
) -> Result<Vec<DuplicateCheck>, Error> {
    connection
        .prepare(&format!(
            "SELECT id, transaction_id_1, transaction_id_2, similarity_score, state,
                created_at, decided_at
            FROM duplicate_check
            WHERE state = 'pending'
            ORDER BY similarity_score DESC, transaction_id_1 ASC, transaction_id_2 ASC
            LIMIT {limit}"
        ))?
        .query_map((), map_check_row)?
        .collect::<Result<Vec<DuplicateCheck>, _>>()
        .map_err(|error| error.into())
}

/// Retrieve every check in the database, the most recent first.
pub fn list_all_checks(connection: &Connection) -> Result<Vec<DuplicateCheck>, Error> {
    connection
        .prepare(
            "SELECT id, transaction_id_1, transaction_id_2, similarity_score, state,
                created_at, decided_at
            FROM duplicate_check
            ORDER BY id DESC",
        )?
        .query_map((), map_check_row)?
        .collect::<Result<Vec<DuplicateCheck>, _>>()
        .map_err(|error| error.into())
}

/// The set of transaction pairs that already have a check, regardless of
/// state.
pub(crate) fn existing_pair_set(
    connection: &Connection,
) -> Result<HashSet<(TransactionID, TransactionID)>, Error> {
    connection
        .prepare("SELECT transaction_id_1, transaction_id_2 FROM duplicate_check")?
        .query_map((), |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<HashSet<_>, _>>()
        .map_err(|error| error.into())
}

/// Convert a database row into a [DuplicateCheck].
fn map_check_row(row: &Row) -> Result<DuplicateCheck, rusqlite::Error> {
    let state_text: String = row.get(4)?;
    let state = CheckState::from_db(&state_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("unknown check state: {state_text}").into(),
        )
    })?;

    Ok(DuplicateCheck {
        id: row.get(0)?,
        transaction_id_1: row.get(1)?,
        transaction_id_2: row.get(2)?,
        similarity_score: row.get(3)?,
        state,
        created_at: row.get(5)?,
        decided_at: row.get(6)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod check_state_tests {
    use super::CheckState;

    #[test]
    fn state_strings_round_trip() {
        for state in [
            CheckState::Pending,
            CheckState::Duplicate,
            CheckState::NotDuplicate,
            CheckState::Skip,
        ] {
            assert_eq!(CheckState::from_db(state.as_str()), Some(state));
        }
    }

    #[test]
    fn unknown_state_string_is_rejected() {
        assert_eq!(CheckState::from_db("maybe"), None);
    }
}
