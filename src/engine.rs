//! The duplicate engine: detection runs, candidate listings, review, and
//! stats over one shared database.

use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use rusqlite::Connection;
use serde::Serialize;

use crate::{
    Error, ToleranceConfig,
    check::{DuplicateCheck, create_checks, existing_pair_set, get_check, list_all_checks,
        list_pending_checks},
    confirm::{Decision, confirm_check},
    database_id::CheckID,
    db,
    detection::{DEFAULT_MIN_SCORE, generate_candidates},
    scoring::{SimilarityScorer, WeightedScorer},
    stats::{CheckStats, summarize_checks},
    transaction::{Transaction, TransactionSource},
};

// ============================================================================
// MODELS
// ============================================================================

/// Tunables for the duplicate engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// The minimum similarity score a pair must reach to be recorded as a
    /// candidate.
    pub min_score: f64,
    /// How many candidates a listing returns when no limit is given.
    pub default_candidate_limit: u64,
    /// The largest number of candidates a listing may return.
    pub max_candidate_limit: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_score: DEFAULT_MIN_SCORE,
            default_candidate_limit: 50,
            max_candidate_limit: 500,
        }
    }
}

/// Result of a detection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetectionOutcome {
    /// Number of new pending checks the run created.
    pub detected_count: usize,
    /// Number of transactions the run scanned.
    pub scanned_count: usize,
}

/// A pending check joined with snapshots of its two transactions, ready for
/// review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateView {
    /// The check under review.
    #[serde(flatten)]
    pub check: DuplicateCheck,
    /// Snapshot of the transaction with the smaller ID.
    pub transaction_1: Transaction,
    /// Snapshot of the transaction with the larger ID.
    pub transaction_2: Transaction,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Detects potential duplicate transactions and tracks their review.
///
/// The engine shares a SQLite database with the surrounding application: it
/// reads transactions through a [TransactionSource] and owns the
/// `duplicate_check` table. Clones share the same database and the same
/// detection guard, so at most one detection run is in flight at a time no
/// matter which clone started it.
///
/// # Examples
/// ```
/// use std::sync::{Arc, Mutex};
///
/// use rusqlite::Connection;
///
/// use duplicheck::{DuplicateEngine, EngineConfig, SqliteTransactionSource, ToleranceConfig};
///
/// # fn main() -> Result<(), duplicheck::Error> {
/// let db_connection = Arc::new(Mutex::new(Connection::open_in_memory()?));
/// let source = SqliteTransactionSource {
///     db_connection: db_connection.clone(),
/// };
/// let engine = DuplicateEngine::new(source, db_connection, EngineConfig::default())?;
///
/// let outcome = engine.detect(&ToleranceConfig::default())?;
/// assert_eq!(outcome.detected_count, 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DuplicateEngine<T, S = WeightedScorer> {
    source: T,
    db_connection: Arc<Mutex<Connection>>,
    scorer: S,
    config: EngineConfig,
    detection_guard: Arc<Mutex<()>>,
}

impl<T: TransactionSource> DuplicateEngine<T> {
    /// Create an engine with the default scorer, creating the tables it
    /// needs if they do not already exist.
    ///
    /// # Errors
    /// Returns an error if the database could not be initialized.
    pub fn new(
        source: T,
        db_connection: Arc<Mutex<Connection>>,
        config: EngineConfig,
    ) -> Result<Self, Error> {
        Self::with_scorer(source, db_connection, WeightedScorer::default(), config)
    }
}

impl<T: TransactionSource, S: SimilarityScorer> DuplicateEngine<T, S> {
    /// Create an engine that scores pairs with `scorer`, creating the tables
    /// it needs if they do not already exist.
    ///
    /// # Errors
    /// Returns an error if the database could not be initialized.
    pub fn with_scorer(
        source: T,
        db_connection: Arc<Mutex<Connection>>,
        scorer: S,
        config: EngineConfig,
    ) -> Result<Self, Error> {
        {
            let connection = match db_connection.lock() {
                Ok(connection) => connection,
                Err(error) => {
                    tracing::error!("could not acquire database lock: {error}");
                    return Err(Error::DatabaseLockError);
                }
            };
            db::initialize(&connection)?;
        }

        Ok(Self {
            source,
            db_connection,
            scorer,
            config,
            detection_guard: Arc::new(Mutex::new(())),
        })
    }

    /// Scan every transaction and record a pending check for each pair that
    /// looks like a duplicate under `tolerances`.
    ///
    /// Pairs that already have a check are left alone, so running detection
    /// repeatedly only surfaces new pairs. At most one run is in flight at a
    /// time; a second caller gets [Error::DetectionInProgress] instead of
    /// waiting. When a run fails nothing is written.
    ///
    /// # Errors
    /// Returns [Error::InvalidTolerance] if `tolerances` fails validation,
    /// [Error::DetectionInProgress] if another run holds the guard, or an
    /// error if the database could not be read or written.
    pub fn detect(&self, tolerances: &ToleranceConfig) -> Result<DetectionOutcome, Error> {
        tolerances.validate()?;

        let _run_guard = match self.detection_guard.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(Error::DetectionInProgress),
            // The guard protects no data, only entry into a run.
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let start_time = std::time::Instant::now();

        // Fetch before locking the connection: the source may share it.
        let transactions = self.source.transactions()?;

        let connection = self.lock_connection()?;
        let existing_pairs = existing_pair_set(&connection)?;
        let candidates = generate_candidates(
            &transactions,
            tolerances,
            &existing_pairs,
            self.config.min_score,
            &self.scorer,
        );
        let created = create_checks(&candidates, &connection)?;
        drop(connection);

        let outcome = DetectionOutcome {
            detected_count: created.len(),
            scanned_count: transactions.len(),
        };

        tracing::info!(
            "Detection run completed in {}ms: {} transactions scanned, {} new checks",
            start_time.elapsed().as_millis(),
            outcome.scanned_count,
            outcome.detected_count
        );

        Ok(outcome)
    }

    /// List pending checks joined with snapshots of their transactions, the
    /// most similar pairs first.
    ///
    /// `limit` falls back to the configured default when absent and is
    /// capped at the configured maximum. Checks whose transactions no longer
    /// exist are left out of the listing.
    ///
    /// # Errors
    /// Returns an error if the database could not be read.
    pub fn list_candidates(&self, limit: Option<u64>) -> Result<Vec<CandidateView>, Error> {
        let limit = limit
            .unwrap_or(self.config.default_candidate_limit)
            .min(self.config.max_candidate_limit);

        let pending = {
            let connection = self.lock_connection()?;
            list_pending_checks(limit, &connection)?
        };

        let mut candidates = Vec::with_capacity(pending.len());
        for check in pending {
            let first = self.source.transaction(check.transaction_id_1)?;
            let second = self.source.transaction(check.transaction_id_2)?;

            match (first, second) {
                (Some(transaction_1), Some(transaction_2)) => candidates.push(CandidateView {
                    check,
                    transaction_1,
                    transaction_2,
                }),
                _ => tracing::warn!(
                    "skipping check {}: transaction {} or {} no longer exists",
                    check.id,
                    check.transaction_id_1,
                    check.transaction_id_2
                ),
            }
        }

        Ok(candidates)
    }

    /// Decide the pending check with `id`.
    ///
    /// Transactions are never modified, whatever the decision: resolving a
    /// confirmed duplicate is left to the surrounding application.
    ///
    /// # Errors
    /// Returns [Error::NotFound] if there is no such check, or
    /// [Error::DecisionConflict] if it was already decided differently.
    pub fn confirm(&self, id: CheckID, decision: Decision) -> Result<DuplicateCheck, Error> {
        let connection = self.lock_connection()?;
        confirm_check(id, decision, &connection)
    }

    /// Retrieve a single check by its `id`.
    ///
    /// # Errors
    /// Returns [Error::NotFound] if there is no such check.
    pub fn check(&self, id: CheckID) -> Result<DuplicateCheck, Error> {
        let connection = self.lock_connection()?;
        get_check(id, &connection)
    }

    /// Retrieve every check, including decided ones, the most recent first.
    ///
    /// # Errors
    /// Returns an error if the database could not be read.
    pub fn all_checks(&self) -> Result<Vec<DuplicateCheck>, Error> {
        let connection = self.lock_connection()?;
        list_all_checks(&connection)
    }

    /// Count the checks in each review state.
    ///
    /// # Errors
    /// Returns an error if the database could not be read.
    pub fn stats(&self) -> Result<CheckStats, Error> {
        let connection = self.lock_connection()?;
        summarize_checks(&connection)
    }

    fn lock_connection(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        match self.db_connection.lock() {
            Ok(connection) => Ok(connection),
            Err(error) => {
                tracing::error!("could not acquire database lock: {error}");
                Err(Error::DatabaseLockError)
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod engine_tests {
    use std::sync::{Arc, Mutex};

    use rusqlite::Connection;
    use time::{Date, macros::date};

    use crate::{
        Error, ToleranceConfig,
        check::CheckState,
        confirm::Decision,
        stats::CheckStats,
        transaction::{
            NewTransaction, SqliteTransactionSource, Transaction, create_transaction,
            get_all_transactions,
        },
    };

    use super::{DuplicateEngine, EngineConfig};

    fn get_test_engine() -> DuplicateEngine<SqliteTransactionSource> {
        get_test_engine_with_config(EngineConfig::default())
    }

    fn get_test_engine_with_config(
        config: EngineConfig,
    ) -> DuplicateEngine<SqliteTransactionSource> {
        let db_connection = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        let source = SqliteTransactionSource {
            db_connection: db_connection.clone(),
        };

        DuplicateEngine::new(source, db_connection, config).unwrap()
    }

    fn seed_transaction<S>(
        engine: &DuplicateEngine<SqliteTransactionSource, S>,
        date: Date,
        amount: f64,
        description: &str,
    ) -> Transaction {
        let connection = engine.db_connection.lock().unwrap();
        create_transaction(NewTransaction::new(date, amount, description), &connection).unwrap()
    }

    fn tolerances(days: u16, abs: f64, pct: f64) -> ToleranceConfig {
        ToleranceConfig {
            date_tolerance_days: days,
            amount_tolerance_abs: abs,
            amount_tolerance_pct: pct,
        }
    }

    #[test]
    fn detect_on_empty_database_finds_nothing() {
        let engine = get_test_engine();

        let outcome = engine.detect(&ToleranceConfig::default()).unwrap();

        assert_eq!(outcome.detected_count, 0);
        assert_eq!(outcome.scanned_count, 0);
    }

    #[test]
    fn detect_records_identical_pair() {
        let engine = get_test_engine();
        let first = seed_transaction(&engine, date!(2025 - 01 - 01), -50.00, "Coffee");
        let second = seed_transaction(&engine, date!(2025 - 01 - 01), -50.00, "Coffee");

        let outcome = engine.detect(&ToleranceConfig::default()).unwrap();

        assert_eq!(outcome.detected_count, 1);
        assert_eq!(outcome.scanned_count, 2);

        let candidates = engine.list_candidates(None).unwrap();
        assert_eq!(candidates.len(), 1, "want one candidate, got {candidates:?}");

        let candidate = &candidates[0];
        assert_eq!(candidate.check.state, CheckState::Pending);
        assert_eq!(candidate.check.similarity_score, 1.0);
        assert_eq!(
            (candidate.check.transaction_id_1, candidate.check.transaction_id_2),
            (first.id, second.id)
        );
        assert_eq!(candidate.transaction_1, first);
        assert_eq!(candidate.transaction_2, second);
    }

    #[test]
    fn repeat_detection_creates_nothing_new() {
        let engine = get_test_engine();
        seed_transaction(&engine, date!(2025 - 01 - 01), -50.00, "Coffee");
        seed_transaction(&engine, date!(2025 - 01 - 01), -50.00, "Coffee");

        let first_run = engine.detect(&ToleranceConfig::default()).unwrap();
        let second_run = engine.detect(&ToleranceConfig::default()).unwrap();

        assert_eq!(first_run.detected_count, 1);
        assert_eq!(second_run.detected_count, 0);
        assert_eq!(engine.list_candidates(None).unwrap().len(), 1);
    }

    #[test]
    fn similar_transactions_detect_one_candidate() {
        let engine = get_test_engine();
        seed_transaction(&engine, date!(2025 - 01 - 01), -5000.0, "Coffee");
        seed_transaction(&engine, date!(2025 - 01 - 02), -5000.0, "Coffee Shop");

        let outcome = engine.detect(&tolerances(3, 0.0, 0.0)).unwrap();

        assert_eq!(outcome.detected_count, 1);

        let candidates = engine.list_candidates(None).unwrap();
        assert!(
            candidates[0].check.similarity_score > 0.5,
            "want score above 0.5, got {}",
            candidates[0].check.similarity_score
        );
    }

    #[test]
    fn different_amounts_detect_nothing() {
        let engine = get_test_engine();
        seed_transaction(&engine, date!(2025 - 01 - 01), -1000.0, "Rent");
        seed_transaction(&engine, date!(2025 - 01 - 01), -1200.0, "Rent");

        let outcome = engine.detect(&tolerances(0, 100.0, 0.0)).unwrap();

        assert_eq!(outcome.detected_count, 0);
        assert_eq!(engine.stats().unwrap(), CheckStats::default());
    }

    #[test]
    fn invalid_tolerances_are_rejected_before_any_writes() {
        let engine = get_test_engine();
        seed_transaction(&engine, date!(2025 - 01 - 01), -50.00, "Coffee");
        seed_transaction(&engine, date!(2025 - 01 - 01), -50.00, "Coffee");

        let invalid = ToleranceConfig {
            date_tolerance_days: 1,
            amount_tolerance_abs: -1.0,
            amount_tolerance_pct: 0.0,
        };
        let result = engine.detect(&invalid);

        assert_eq!(
            result,
            Err(Error::InvalidTolerance {
                field: "amount_tolerance_abs",
                value: -1.0,
            })
        );
        assert_eq!(
            engine.stats().unwrap(),
            CheckStats::default(),
            "a failed run should not write any checks"
        );
    }

    #[test]
    fn candidates_list_most_similar_first() {
        let engine = get_test_engine();
        seed_transaction(&engine, date!(2025 - 01 - 01), -5000.0, "Coffee");
        seed_transaction(&engine, date!(2025 - 01 - 02), -5000.0, "Coffee Shop");
        let third = seed_transaction(&engine, date!(2025 - 06 - 01), -800.0, "Rent");
        let fourth = seed_transaction(&engine, date!(2025 - 06 - 01), -800.0, "Rent");

        engine.detect(&tolerances(3, 0.0, 0.0)).unwrap();
        let candidates = engine.list_candidates(None).unwrap();

        assert_eq!(candidates.len(), 2, "want two candidates, got {candidates:?}");
        assert_eq!(
            (
                candidates[0].check.transaction_id_1,
                candidates[0].check.transaction_id_2
            ),
            (third.id, fourth.id),
            "the identical pair should be listed first"
        );
        assert!(candidates[0].check.similarity_score > candidates[1].check.similarity_score);
    }

    #[test]
    fn confirmation_moves_stats() {
        let engine = get_test_engine();
        seed_transaction(&engine, date!(2025 - 01 - 01), -50.00, "Coffee");
        seed_transaction(&engine, date!(2025 - 01 - 01), -50.00, "Coffee");
        seed_transaction(&engine, date!(2025 - 06 - 01), -800.0, "Rent");
        seed_transaction(&engine, date!(2025 - 06 - 01), -800.0, "Rent");
        engine.detect(&ToleranceConfig::default()).unwrap();

        let candidates = engine.list_candidates(None).unwrap();
        assert_eq!(engine.stats().unwrap().pending, 2);

        engine
            .confirm(candidates[0].check.id, Decision::Duplicate)
            .unwrap();
        engine
            .confirm(candidates[1].check.id, Decision::Skip)
            .unwrap();

        assert_eq!(
            engine.stats().unwrap(),
            CheckStats {
                pending: 0,
                duplicate: 1,
                not_duplicate: 0,
                skipped: 1,
            }
        );
        assert_eq!(
            engine.all_checks().unwrap().len(),
            2,
            "decided checks stay in the history"
        );
    }

    #[test]
    fn confirm_unknown_check_fails_without_side_effects() {
        let engine = get_test_engine();

        let result = engine.confirm(42, Decision::Duplicate);

        assert_eq!(result, Err(Error::NotFound));
        assert_eq!(engine.stats().unwrap(), CheckStats::default());
    }

    #[test]
    fn skipped_pairs_do_not_resurface() {
        let engine = get_test_engine();
        seed_transaction(&engine, date!(2025 - 01 - 01), -50.00, "Coffee");
        seed_transaction(&engine, date!(2025 - 01 - 01), -50.00, "Coffee");
        engine.detect(&ToleranceConfig::default()).unwrap();

        let candidates = engine.list_candidates(None).unwrap();
        engine
            .confirm(candidates[0].check.id, Decision::Skip)
            .unwrap();

        let rerun = engine.detect(&ToleranceConfig::default()).unwrap();

        assert_eq!(rerun.detected_count, 0, "a skipped pair stays resolved");
        assert_eq!(engine.list_candidates(None).unwrap(), Vec::new());
        assert_eq!(engine.stats().unwrap().skipped, 1);
    }

    #[test]
    fn confirm_does_not_modify_transactions() {
        let engine = get_test_engine();
        seed_transaction(&engine, date!(2025 - 01 - 01), -50.00, "Coffee");
        seed_transaction(&engine, date!(2025 - 01 - 01), -50.00, "Coffee");
        engine.detect(&ToleranceConfig::default()).unwrap();
        let before = {
            let connection = engine.db_connection.lock().unwrap();
            get_all_transactions(&connection).unwrap()
        };

        let candidates = engine.list_candidates(None).unwrap();
        engine
            .confirm(candidates[0].check.id, Decision::Duplicate)
            .unwrap();

        let after = {
            let connection = engine.db_connection.lock().unwrap();
            get_all_transactions(&connection).unwrap()
        };
        assert_eq!(after, before);
    }

    #[test]
    fn checks_with_missing_transactions_are_left_out_of_listings() {
        let engine = get_test_engine();
        seed_transaction(&engine, date!(2025 - 01 - 01), -50.00, "Coffee");
        let second = seed_transaction(&engine, date!(2025 - 01 - 01), -50.00, "Coffee");
        engine.detect(&ToleranceConfig::default()).unwrap();
        let check_id = engine.list_candidates(None).unwrap()[0].check.id;

        {
            let connection = engine.db_connection.lock().unwrap();
            connection
                .execute("DELETE FROM \"transaction\" WHERE id = ?1", [second.id])
                .unwrap();
        }

        assert_eq!(
            engine.list_candidates(None).unwrap(),
            Vec::new(),
            "a candidate without both transactions cannot be reviewed"
        );
        assert_eq!(
            engine.check(check_id).unwrap().state,
            CheckState::Pending,
            "the check itself is kept"
        );
    }

    #[test]
    fn candidate_limits_fall_back_and_cap() {
        let engine = get_test_engine_with_config(EngineConfig {
            default_candidate_limit: 2,
            max_candidate_limit: 3,
            ..EngineConfig::default()
        });
        for _ in 0..5 {
            seed_transaction(&engine, date!(2025 - 01 - 01), -50.00, "Coffee");
        }
        engine.detect(&ToleranceConfig::default()).unwrap();
        assert_eq!(engine.stats().unwrap().pending, 10);

        assert_eq!(engine.list_candidates(None).unwrap().len(), 2);
        assert_eq!(engine.list_candidates(Some(10)).unwrap().len(), 3);
        assert_eq!(engine.list_candidates(Some(1)).unwrap().len(), 1);
    }
}
