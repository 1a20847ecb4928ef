//! Tolerance configuration for detection runs.

use serde::{Deserialize, Serialize};

use crate::Error;

/// How far apart two transactions may be while still counting as potential
/// duplicates.
///
/// Tolerances are supplied per detection run and never persisted, so two
/// runs with different settings can propose different candidate sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToleranceConfig {
    /// The maximum number of days between the two transaction dates.
    pub date_tolerance_days: u16,

    /// The maximum absolute difference between the two amounts, in the same
    /// unit as the amounts themselves.
    pub amount_tolerance_abs: f64,

    /// The maximum relative difference between the two amounts, as a
    /// fraction of the larger magnitude (0.01 means 1%).
    pub amount_tolerance_pct: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            date_tolerance_days: 1,
            amount_tolerance_abs: 0.0,
            amount_tolerance_pct: 0.0,
        }
    }
}

impl ToleranceConfig {
    /// Check that the tolerance values are usable for a detection run.
    ///
    /// # Errors
    /// Returns an [Error::InvalidTolerance] if either amount tolerance is
    /// negative, NaN, or infinite.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.amount_tolerance_abs.is_finite() || self.amount_tolerance_abs < 0.0 {
            return Err(Error::InvalidTolerance {
                field: "amount_tolerance_abs",
                value: self.amount_tolerance_abs,
            });
        }

        if !self.amount_tolerance_pct.is_finite() || self.amount_tolerance_pct < 0.0 {
            return Err(Error::InvalidTolerance {
                field: "amount_tolerance_pct",
                value: self.amount_tolerance_pct,
            });
        }

        Ok(())
    }
}
