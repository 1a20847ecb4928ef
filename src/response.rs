//! Response envelopes for the wire surface.
//!
//! The HTTP layer lives in the surrounding application; these types define
//! the JSON bodies it sends back, so every host reports detection results
//! the same way. Every envelope carries a `success` flag, and failures add
//! a human-readable `error` plus a stable `error_code`.

use serde::Serialize;

use crate::{
    Error,
    check::DuplicateCheck,
    engine::{CandidateView, DetectionOutcome},
    stats::CheckStats,
};

// ============================================================================
// MODELS
// ============================================================================

/// The failure half of a response envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    /// Human-readable description of what went wrong.
    pub error: String,
    /// Stable, machine-readable code for the error class.
    pub error_code: &'static str,
}

impl ErrorBody {
    /// Describe `error` for the wire.
    ///
    /// Internal failures are logged in full and surfaced with a generic
    /// message, so database details never reach callers.
    pub fn from_error(error: &Error) -> Self {
        let message = match error {
            Error::SqlError(_) | Error::DatabaseLockError => {
                tracing::error!("internal error surfaced to caller: {error}");
                "An internal error occurred. Check the server logs for details.".to_owned()
            }
            _ => error.to_string(),
        };

        Self {
            error: message,
            error_code: error.code(),
        }
    }
}

/// The body returned by a detection run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectResponse {
    /// Whether the run completed.
    pub success: bool,
    /// Number of new pending checks the run created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_count: Option<usize>,
    /// Human-readable summary of the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Present only on failure.
    #[serde(flatten)]
    pub error: Option<ErrorBody>,
}

impl DetectResponse {
    /// The body for a completed run.
    pub fn from_outcome(outcome: DetectionOutcome) -> Self {
        let message = if outcome.detected_count > 0 {
            format!("Found {} potential duplicate pairs", outcome.detected_count)
        } else {
            "No new duplicate candidates found".to_owned()
        };

        Self {
            success: true,
            detected_count: Some(outcome.detected_count),
            message: Some(message),
            error: None,
        }
    }

    /// The body for a failed run.
    pub fn from_error(error: &Error) -> Self {
        Self {
            success: false,
            detected_count: None,
            message: None,
            error: Some(ErrorBody::from_error(error)),
        }
    }

    /// The body for either outcome of a run.
    pub fn from_result(result: Result<DetectionOutcome, Error>) -> Self {
        match result {
            Ok(outcome) => Self::from_outcome(outcome),
            Err(error) => Self::from_error(&error),
        }
    }
}

/// The body returned by a candidate listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidatesResponse {
    /// Whether the listing completed.
    pub success: bool,
    /// The pending candidates, the most similar pairs first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<CandidateView>>,
    /// Present only on failure.
    #[serde(flatten)]
    pub error: Option<ErrorBody>,
}

impl CandidatesResponse {
    /// The body for a completed listing.
    pub fn from_candidates(candidates: Vec<CandidateView>) -> Self {
        Self {
            success: true,
            candidates: Some(candidates),
            error: None,
        }
    }

    /// The body for a failed listing.
    pub fn from_error(error: &Error) -> Self {
        Self {
            success: false,
            candidates: None,
            error: Some(ErrorBody::from_error(error)),
        }
    }

    /// The body for either outcome of a listing.
    pub fn from_result(result: Result<Vec<CandidateView>, Error>) -> Self {
        match result {
            Ok(candidates) => Self::from_candidates(candidates),
            Err(error) => Self::from_error(&error),
        }
    }
}

/// The body returned by a decision on a check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmResponse {
    /// Whether the decision was applied (or harmlessly repeated).
    pub success: bool,
    /// Present only on failure.
    #[serde(flatten)]
    pub error: Option<ErrorBody>,
}

impl ConfirmResponse {
    /// The body for an applied decision.
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// The body for a rejected decision.
    pub fn from_error(error: &Error) -> Self {
        Self {
            success: false,
            error: Some(ErrorBody::from_error(error)),
        }
    }

    /// The body for either outcome of a decision.
    pub fn from_result(result: Result<DuplicateCheck, Error>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(error) => Self::from_error(&error),
        }
    }
}

/// The body returned by a stats query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsResponse {
    /// Whether the query completed.
    pub success: bool,
    /// Counts of checks by review state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<CheckStats>,
    /// Present only on failure.
    #[serde(flatten)]
    pub error: Option<ErrorBody>,
}

impl StatsResponse {
    /// The body for a completed query.
    pub fn from_stats(stats: CheckStats) -> Self {
        Self {
            success: true,
            stats: Some(stats),
            error: None,
        }
    }

    /// The body for a failed query.
    pub fn from_error(error: &Error) -> Self {
        Self {
            success: false,
            stats: None,
            error: Some(ErrorBody::from_error(error)),
        }
    }

    /// The body for either outcome of a query.
    pub fn from_result(result: Result<CheckStats, Error>) -> Self {
        match result {
            Ok(stats) => Self::from_stats(stats),
            Err(error) => Self::from_error(&error),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
