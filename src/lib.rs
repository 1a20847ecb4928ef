//! Duplicheck finds likely duplicate transactions in a personal finance
//! database and manages the workflow for resolving them.
//!
//! A detection run scans the transactions owned by the surrounding
//! application, scores pairs that fall within configurable date and amount
//! tolerances, and records likely duplicates as pending [DuplicateCheck]s.
//! Each check is then decided by the user exactly once: confirmed as a
//! duplicate, confirmed as distinct, or skipped. The engine never modifies
//! the transactions themselves.

#![warn(missing_docs)]

mod check;
mod confirm;
mod database_id;
mod db;
mod detection;
mod engine;
mod response;
mod scoring;
mod stats;
mod tolerance;
mod transaction;

pub use check::{CheckState, DuplicateCheck, get_check, list_all_checks, list_pending_checks};
pub use confirm::{Decision, confirm_check};
pub use database_id::{CheckID, TransactionID};
pub use db::initialize as initialize_db;
pub use detection::{CandidatePair, DEFAULT_MIN_SCORE, generate_candidates};
pub use engine::{CandidateView, DetectionOutcome, DuplicateEngine, EngineConfig};
pub use response::{CandidatesResponse, ConfirmResponse, DetectResponse, ErrorBody, StatsResponse};
pub use scoring::{ScoreWeights, SimilarityScorer, WeightedScorer};
pub use stats::{CheckStats, summarize_checks};
pub use tolerance::ToleranceConfig;
pub use transaction::{
    NewTransaction, SqliteTransactionSource, Transaction, TransactionSource, create_transaction,
};

/// The errors that may occur in the duplicate detection engine.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// A tolerance value passed to a detection run was not usable.
    ///
    /// Amount tolerances must be finite and non-negative. Validation happens
    /// before the run touches the decision store.
    #[error("invalid value {value} for {field}: must be finite and non-negative")]
    InvalidTolerance {
        /// The tolerance field that failed validation.
        field: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// The requested resource was not found.
    ///
    /// The client should check that the check ID is correct and that the
    /// check has been created by a detection run.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// The check was already decided, and the new decision disagrees with the
    /// recorded one.
    ///
    /// Decisions are never silently overwritten. Repeating the recorded
    /// decision succeeds without changing anything.
    #[error("the check was already decided as \"{existing}\"")]
    DecisionConflict {
        /// The decision already recorded on the check.
        existing: check::CheckState,
    },

    /// A detection run was requested while another run was still in flight.
    ///
    /// Only one detection run may execute at a time. The caller should retry
    /// once the current run finishes.
    #[error("a detection run is already in progress")]
    DetectionInProgress,

    /// The decision value was not one of "duplicate", "not_duplicate", or
    /// "skip".
    #[error("\"{0}\" is not a valid decision")]
    InvalidDecision(String),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl Error {
    /// The stable, machine-readable code reported for this error at the wire
    /// boundary.
    ///
    /// Clients branch on these strings, so the mapping must not change
    /// between releases.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidTolerance { .. } => "validation_error",
            Error::NotFound => "not_found",
            Error::DecisionConflict { .. } | Error::DetectionInProgress => "conflict",
            Error::InvalidDecision(_) => "invalid_decision",
            Error::DatabaseLockError | Error::SqlError(_) => "internal_error",
        }
    }
}
