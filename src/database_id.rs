//! Database ID type definitions.

/// Alias for the integer type used for transaction IDs in the shared
/// application database.
pub type TransactionID = i64;

/// Alias for the integer type used for duplicate check IDs.
pub type CheckID = i64;
