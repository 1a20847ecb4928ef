//! The review workflow for deciding duplicate checks.
//!
//! A pending check is decided exactly once. The update is a compare-and-set
//! on the pending state, so two reviewers racing to decide the same check
//! cannot both win: the loser sees the winner's decision and either matches
//! it (a harmless repeat) or gets a conflict.

use std::str::FromStr;

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error,
    check::{CheckState, DuplicateCheck, get_check},
    database_id::CheckID,
};

// ============================================================================
// MODELS
// ============================================================================

/// A reviewer's verdict on a pending duplicate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// The pair is the same purchase recorded twice.
    Duplicate,
    /// The pair is two distinct purchases.
    NotDuplicate,
    /// Set the check aside without a verdict.
    Skip,
}

impl Decision {
    /// The state a check moves to under this decision.
    pub fn target_state(&self) -> CheckState {
        match self {
            Decision::Duplicate => CheckState::Duplicate,
            Decision::NotDuplicate => CheckState::NotDuplicate,
            Decision::Skip => CheckState::Skip,
        }
    }
}

impl FromStr for Decision {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "duplicate" => Ok(Decision::Duplicate),
            "not_duplicate" => Ok(Decision::NotDuplicate),
            "skip" => Ok(Decision::Skip),
            _ => Err(Error::InvalidDecision(value.to_owned())),
        }
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Decide the pending check with `id` and return the decided record.
///
/// Repeating a decision that was already applied returns the existing record
/// without changing when it was decided. A decision that disagrees with the
/// recorded one is rejected, including for skipped checks: skip is terminal.
///
/// Returns [Error::NotFound] if there is no such check.
pub fn confirm_check(
    id: CheckID,
    decision: Decision,
    connection: &Connection,
) -> Result<DuplicateCheck, Error> {
    let decided_at = OffsetDateTime::now_utc();
    let rows_affected = connection.execute(
        "UPDATE duplicate_check
        SET state = ?1, decided_at = ?2
        WHERE id = ?3 AND state = 'pending'",
        params![decision.target_state().as_str(), decided_at, id],
    )?;

    if rows_affected == 1 {
        return get_check(id, connection);
    }

    // Nothing was updated: the check either does not exist or was already
    // decided. Decided states are terminal, so this read is stable.
    let check = get_check(id, connection)?;

    if check.state == decision.target_state() {
        return Ok(check);
    }

    Err(Error::DecisionConflict {
        existing: check.state,
    })
}

// ============================================================================
// TESTS
// ============================================================================
