//! Pairwise similarity scoring for potential duplicate transactions.
//!
//! Scoring is a two-step process: the tolerance gates decide whether a pair
//! is eligible at all, and only then is a weighted composite score computed
//! from how closely the amounts, dates, and descriptions agree. A pair that
//! fails a gate is never scored, regardless of how well the other fields
//! match.

use std::collections::HashSet;

use unicode_segmentation::UnicodeSegmentation;

use crate::{ToleranceConfig, transaction::Transaction};

/// Floor for the denominator of the relative amount comparison, so that
/// zero-amount transactions never cause a division by zero.
const AMOUNT_EPSILON: f64 = 1e-9;

/// Scores how similar two transactions are.
///
/// Implementations must apply the tolerance gates before scoring: a pair
/// outside the tolerances is ineligible and returns `None`, no matter how
/// well the remaining fields agree. Eligible pairs return a score in
/// `[0.0, 1.0]`, where 1.0 means the transactions are indistinguishable.
pub trait SimilarityScorer {
    /// Score the pair `(first, second)` under `tolerances`.
    ///
    /// Returns `None` when the pair fails a tolerance gate.
    fn score(
        &self,
        first: &Transaction,
        second: &Transaction,
        tolerances: &ToleranceConfig,
    ) -> Option<f64>;
}

/// The relative importance of each field when scoring an eligible pair.
///
/// The scorer normalizes by the sum of the weights, so only their ratio
/// matters. At least one weight must be positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    /// Weight of amount closeness.
    pub amount: f64,
    /// Weight of date closeness.
    pub date: f64,
    /// Weight of description similarity.
    pub description: f64,
}

impl Default for ScoreWeights {
    /// Amount agreement dominates because two transactions for different
    /// amounts are rarely the same purchase, while dates drift with bank
    /// settlement and descriptions vary between import formats.
    fn default() -> Self {
        Self {
            amount: 0.5,
            date: 0.3,
            description: 0.2,
        }
    }
}

/// The default [SimilarityScorer]: a weighted composite of amount, date, and
/// description agreement.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightedScorer {
    /// The field weights used for the composite score.
    pub weights: ScoreWeights,
}

impl SimilarityScorer for WeightedScorer {
    fn score(
        &self,
        first: &Transaction,
        second: &Transaction,
        tolerances: &ToleranceConfig,
    ) -> Option<f64> {
        let date_difference = date_difference_days(first, second);
        if date_difference > i64::from(tolerances.date_tolerance_days) {
            return None;
        }

        if !within_amount_tolerance(first.amount, second.amount, tolerances) {
            return None;
        }

        let total_weight = self.weights.amount + self.weights.date + self.weights.description;
        if total_weight <= 0.0 {
            return Some(0.0);
        }

        let amount_component = amount_closeness(first.amount, second.amount, tolerances);
        let date_component = date_closeness(date_difference, tolerances.date_tolerance_days);
        let description_component =
            description_similarity(&first.description, &second.description);

        let score = (self.weights.amount * amount_component
            + self.weights.date * date_component
            + self.weights.description * description_component)
            / total_weight;

        Some(score.clamp(0.0, 1.0))
    }
}

/// Number of days between the two transaction dates, ignoring order.
fn date_difference_days(first: &Transaction, second: &Transaction) -> i64 {
    (i64::from(first.date.to_julian_day()) - i64::from(second.date.to_julian_day())).abs()
}

/// Whether two amounts agree within either the absolute or the relative
/// tolerance.
fn within_amount_tolerance(first: f64, second: f64, tolerances: &ToleranceConfig) -> bool {
    let difference = (first - second).abs();
    if difference <= tolerances.amount_tolerance_abs {
        return true;
    }

    let magnitude = first.abs().max(second.abs()).max(AMOUNT_EPSILON);

    difference / magnitude <= tolerances.amount_tolerance_pct
}

/// How closely two amounts agree, scaled against the widest tolerance in
/// force: 1.0 for equal amounts, approaching 0.0 at the edge of the gate.
fn amount_closeness(first: f64, second: f64, tolerances: &ToleranceConfig) -> f64 {
    let difference = (first - second).abs();
    if difference == 0.0 {
        return 1.0;
    }

    let magnitude = first.abs().max(second.abs()).max(AMOUNT_EPSILON);
    let allowed = tolerances
        .amount_tolerance_abs
        .max(tolerances.amount_tolerance_pct * magnitude);

    // Unequal amounts with zero tolerance never pass the gate.
    if allowed == 0.0 {
        return 0.0;
    }

    1.0 - (difference / allowed).min(1.0)
}

/// How closely two dates agree: 1.0 for the same day, falling linearly to
/// 0.0 at the edge of the date tolerance.
fn date_closeness(date_difference: i64, date_tolerance_days: u16) -> f64 {
    if date_difference == 0 {
        return 1.0;
    }

    if date_tolerance_days == 0 {
        return 0.0;
    }

    1.0 - (date_difference as f64 / f64::from(date_tolerance_days)).min(1.0)
}

/// Token-overlap similarity between two descriptions.
///
/// Descriptions are split into lowercase words and compared as sets, so word
/// order and repetition do not matter. Two empty descriptions count as
/// identical.
fn description_similarity(first: &str, second: &str) -> f64 {
    let first_words: HashSet<String> = first.unicode_words().map(str::to_lowercase).collect();
    let second_words: HashSet<String> = second.unicode_words().map(str::to_lowercase).collect();

    if first_words.is_empty() && second_words.is_empty() {
        return 1.0;
    }

    if first_words.is_empty() || second_words.is_empty() {
        return 0.0;
    }

    let shared = first_words.intersection(&second_words).count();

    2.0 * shared as f64 / (first_words.len() + second_words.len()) as f64
}


#[cfg(test)]
mod description_similarity_tests {
    use super::description_similarity;

    #[test]
    fn identical_descriptions_score_one() {
        assert_eq!(description_similarity("Coffee Shop", "Coffee Shop"), 1.0);
    }

    #[test]
    fn case_and_word_order_do_not_matter() {
        assert_eq!(
            description_similarity("COFFEE shop", "Shop Coffee"),
            1.0,
            "token sets are compared case-insensitively"
        );
    }

    #[test]
    fn partial_overlap_scores_between_zero_and_one() {
        let similarity = description_similarity("Coffee", "Coffee Shop");

        assert!(
            similarity > 0.6 && similarity < 0.7,
            "want 2/3, got {similarity}"
        );
    }

    #[test]
    fn disjoint_descriptions_score_zero() {
        assert_eq!(description_similarity("Rent", "Groceries"), 0.0);
    }

    #[test]
    fn two_empty_descriptions_count_as_identical() {
        assert_eq!(description_similarity("", ""), 1.0);
    }

    #[test]
    fn one_empty_description_scores_zero() {
        assert_eq!(description_similarity("Coffee", ""), 0.0);
    }

    #[test]
    fn punctuation_is_not_a_word() {
        assert_eq!(description_similarity("Coffee - Shop!", "Coffee Shop"), 1.0);
    }
}
