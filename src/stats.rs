//! Aggregate counts of checks by review state.

use rusqlite::Connection;
use serde::Serialize;

use crate::{Error, check::CheckState};

// ============================================================================
// MODELS
// ============================================================================

/// Counts of duplicate checks in each review state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckStats {
    /// Checks awaiting review.
    pub pending: u64,
    /// Checks confirmed as duplicates.
    pub duplicate: u64,
    /// Checks cleared as distinct transactions.
    pub not_duplicate: u64,
    /// Checks set aside without a verdict.
    pub skipped: u64,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Count the checks in each review state.
///
/// The counts are read fresh from the database on every call, so they always
/// reflect the decisions made so far.
pub fn summarize_checks(connection: &Connection) -> Result<CheckStats, Error> {
    let mut statement =
        connection.prepare("SELECT state, COUNT(*) FROM duplicate_check GROUP BY state")?;
    let rows = statement.query_map((), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
    })?;

    let mut stats = CheckStats::default();
    for row in rows {
        let (state_text, count) = row?;
        match CheckState::from_db(&state_text) {
            Some(CheckState::Pending) => stats.pending = count,
            Some(CheckState::Duplicate) => stats.duplicate = count,
            Some(CheckState::NotDuplicate) => stats.not_duplicate = count,
            Some(CheckState::Skip) => stats.skipped = count,
            None => tracing::warn!("ignoring checks with unknown state: {state_text}"),
        }
    }

    Ok(stats)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod stats_tests {
    use rusqlite::Connection;

    use crate::{
        check::{create_checks, create_duplicate_check_table},
        confirm::{Decision, confirm_check},
        detection::CandidatePair,
    };

    use super::{CheckStats, summarize_checks};

    fn get_test_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        create_duplicate_check_table(&connection).unwrap();
        connection
    }

    fn candidate(transaction_id_1: i64, transaction_id_2: i64) -> CandidatePair {
        CandidatePair {
            transaction_id_1,
            transaction_id_2,
            score: 0.9,
        }
    }

    #[test]
    fn empty_database_counts_nothing() {
        let connection = get_test_connection();

        let stats = summarize_checks(&connection).unwrap();

        assert_eq!(stats, CheckStats::default());
    }

    #[test]
    fn each_state_is_counted_separately() {
        let connection = get_test_connection();
        let checks = create_checks(
            &[
                candidate(1, 2),
                candidate(3, 4),
                candidate(5, 6),
                candidate(7, 8),
            ],
            &connection,
        )
        .unwrap();
        confirm_check(checks[0].id, Decision::Duplicate, &connection).unwrap();
        confirm_check(checks[1].id, Decision::NotDuplicate, &connection).unwrap();
        confirm_check(checks[2].id, Decision::Skip, &connection).unwrap();

        let stats = summarize_checks(&connection).unwrap();

        assert_eq!(
            stats,
            CheckStats {
                pending: 1,
                duplicate: 1,
                not_duplicate: 1,
                skipped: 1,
            }
        );
    }

    #[test]
    fn counts_reflect_each_new_decision() {
        let connection = get_test_connection();
        let checks =
            create_checks(&[candidate(1, 2), candidate(3, 4)], &connection).unwrap();

        let before = summarize_checks(&connection).unwrap();
        confirm_check(checks[0].id, Decision::Duplicate, &connection).unwrap();
        let after = summarize_checks(&connection).unwrap();

        assert_eq!(before.pending, 2);
        assert_eq!(before.duplicate, 0);
        assert_eq!(after.pending, 1);
        assert_eq!(after.duplicate, 1);
    }
}
