//! Candidate generation for duplicate detection.
//!
//! Comparing every transaction against every other does not scale, so
//! transactions are first blocked into date buckets sized by the date
//! tolerance. Only pairs within a bucket or in adjacent buckets can fall
//! inside the tolerance, so those are the only pairs scored.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashSet},
};

use crate::{
    ToleranceConfig,
    database_id::TransactionID,
    scoring::SimilarityScorer,
    transaction::Transaction,
};

/// The minimum composite score a pair must reach to be recorded as a
/// duplicate candidate.
pub const DEFAULT_MIN_SCORE: f64 = 0.5;

// ============================================================================
// MODELS
// ============================================================================

/// A scored pair of transactions produced by a detection run, before it is
/// persisted as a check.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePair {
    /// The smaller transaction ID of the pair.
    pub transaction_id_1: TransactionID,
    /// The larger transaction ID of the pair.
    pub transaction_id_2: TransactionID,
    /// The composite similarity score in `[0.0, 1.0]`.
    pub score: f64,
}

// ============================================================================
// CANDIDATE GENERATION
// ============================================================================

/// Score every eligible pair of `transactions` and return the pairs worth
/// reviewing.
///
/// Pairs already present in `existing_pairs` are skipped, so repeating a
/// detection run over the same data produces nothing new. The result is
/// sorted by score descending, with ties broken by the transaction IDs
/// ascending.
pub fn generate_candidates<S: SimilarityScorer>(
    transactions: &[Transaction],
    tolerances: &ToleranceConfig,
    existing_pairs: &HashSet<(TransactionID, TransactionID)>,
    min_score: f64,
    scorer: &S,
) -> Vec<CandidatePair> {
    if transactions.len() < 2 {
        return Vec::new();
    }

    let buckets = bucket_by_date(transactions, tolerances.date_tolerance_days);

    let mut candidates = Vec::new();
    for (&key, bucket) in &buckets {
        for (index, &first) in bucket.iter().enumerate() {
            // Remaining transactions in the same bucket.
            for &second in &bucket[index + 1..] {
                score_pair(
                    first,
                    second,
                    tolerances,
                    existing_pairs,
                    min_score,
                    scorer,
                    &mut candidates,
                );
            }

            // Transactions in the next bucket over. Taking only the higher
            // neighbour visits each cross-bucket pair once.
            if let Some(next_bucket) = buckets.get(&(key + 1)) {
                for &second in next_bucket {
                    score_pair(
                        first,
                        second,
                        tolerances,
                        existing_pairs,
                        min_score,
                        scorer,
                        &mut candidates,
                    );
                }
            }
        }
    }

    candidates.sort_by(|first, second| {
        second
            .score
            .total_cmp(&first.score)
            .then_with(|| first.transaction_id_1.cmp(&second.transaction_id_1))
            .then_with(|| first.transaction_id_2.cmp(&second.transaction_id_2))
    });

    candidates
}

/// Group transactions by date bucket. Bucket width equals the date
/// tolerance (at least one day), so any pair within the tolerance is either
/// in the same bucket or in adjacent buckets.
fn bucket_by_date(
    transactions: &[Transaction],
    date_tolerance_days: u16,
) -> BTreeMap<i64, Vec<&Transaction>> {
    let bucket_width = i64::from(date_tolerance_days).max(1);

    let mut buckets: BTreeMap<i64, Vec<&Transaction>> = BTreeMap::new();
    for transaction in transactions {
        let key = i64::from(transaction.date.to_julian_day()).div_euclid(bucket_width);
        buckets.entry(key).or_default().push(transaction);
    }

    buckets
}

/// Score a single pair and push it onto `candidates` if it clears every
/// filter.
fn score_pair<S: SimilarityScorer>(
    first: &Transaction,
    second: &Transaction,
    tolerances: &ToleranceConfig,
    existing_pairs: &HashSet<(TransactionID, TransactionID)>,
    min_score: f64,
    scorer: &S,
    candidates: &mut Vec<CandidatePair>,
) {
    let Some((transaction_id_1, transaction_id_2)) = normalized_pair(first.id, second.id) else {
        return;
    };

    if existing_pairs.contains(&(transaction_id_1, transaction_id_2)) {
        return;
    }

    let Some(score) = scorer.score(first, second, tolerances) else {
        return;
    };

    if score < min_score {
        return;
    }

    candidates.push(CandidatePair {
        transaction_id_1,
        transaction_id_2,
        score,
    });
}

/// Order a pair of IDs so the smaller comes first, or `None` when both IDs
/// are the same transaction.
fn normalized_pair(
    first: TransactionID,
    second: TransactionID,
) -> Option<(TransactionID, TransactionID)> {
    match first.cmp(&second) {
        Ordering::Less => Some((first, second)),
        Ordering::Greater => Some((second, first)),
        Ordering::Equal => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================
