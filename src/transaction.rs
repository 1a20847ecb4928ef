//! Read-only access to the transactions shared with the surrounding
//! application.
//!
//! The engine never creates, updates, or deletes transactions. It only reads
//! them to propose duplicate candidates and to attach snapshots to candidate
//! listings. The [TransactionSource] trait is the seam between the engine
//! and whatever owns transaction storage; [SqliteTransactionSource] is the
//! implementation for the shared SQLite database.

use std::sync::{Arc, Mutex};

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{Error, database_id::TransactionID};

// ============================================================================
// MODELS
// ============================================================================

/// An expense or income recorded in the application database.
///
/// Negative amounts are expenses, positive amounts are income.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionID,
    /// When the transaction happened.
    pub date: Date,
    /// The amount of money spent or earned in this transaction.
    pub amount: f64,
    /// A text description of what the transaction was for.
    pub description: String,
    /// The category assigned to the transaction.
    pub category: String,
    /// An optional, more specific category.
    pub subcategory: Option<String>,
}

/// A transaction waiting to be written to the shared table.
///
/// The engine itself never writes transactions; this type exists so tests
/// and host applications can seed the table through one code path.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// When the transaction happened.
    pub date: Date,
    /// The amount of money spent or earned.
    pub amount: f64,
    /// A text description of what the transaction was for.
    pub description: String,
    /// The category assigned to the transaction.
    pub category: String,
    /// An optional, more specific category.
    pub subcategory: Option<String>,
}

impl NewTransaction {
    /// Create a new transaction with an empty category.
    pub fn new(date: Date, amount: f64, description: &str) -> Self {
        Self {
            date,
            amount,
            description: description.to_owned(),
            category: String::new(),
            subcategory: None,
        }
    }

    /// Set the category for the transaction.
    pub fn category(mut self, category: &str) -> Self {
        self.category = category.to_owned();
        self
    }

    /// Set the subcategory for the transaction.
    pub fn subcategory(mut self, subcategory: &str) -> Self {
        self.subcategory = Some(subcategory.to_owned());
        self
    }
}

// ============================================================================
// TRANSACTION SOURCE
// ============================================================================

/// Read-only access to the transactions owned by the surrounding
/// application.
pub trait TransactionSource {
    /// Retrieve every transaction in the store.
    ///
    /// # Errors
    /// Returns an error if the transactions could not be read.
    fn transactions(&self) -> Result<Vec<Transaction>, Error>;

    /// Retrieve a single transaction by its `id`, or `None` if no such
    /// transaction exists.
    ///
    /// # Errors
    /// Returns an error if the store could not be read. A missing
    /// transaction is not an error.
    fn transaction(&self, id: TransactionID) -> Result<Option<Transaction>, Error>;
}

/// A [TransactionSource] backed by the SQLite database shared with the
/// surrounding application.
#[derive(Debug, Clone)]
pub struct SqliteTransactionSource {
    /// The shared database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl TransactionSource for SqliteTransactionSource {
    fn transactions(&self) -> Result<Vec<Transaction>, Error> {
        let connection = self
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        get_all_transactions(&connection)
    }

    fn transaction(&self, id: TransactionID) -> Result<Option<Transaction>, Error> {
        let connection = self
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        match get_transaction(id, &connection) {
            Ok(transaction) => Ok(Some(transaction)),
            Err(Error::NotFound) => Ok(None),
            Err(error) => Err(error),
        }
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create a new transaction in the database.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn create_transaction(
    new_transaction: NewTransaction,
    connection: &Connection,
) -> Result<Transaction, Error> {
    connection
        .prepare(
            "INSERT INTO \"transaction\" (date, amount, description, category, subcategory)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id, date, amount, description, category, subcategory",
        )?
        .query_row(
            (
                new_transaction.date,
                new_transaction.amount,
                new_transaction.description,
                new_transaction.category,
                new_transaction.subcategory,
            ),
            map_transaction_row,
        )
        .map_err(|error| error.into())
}

/// Retrieve a transaction from the database by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a valid transaction,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn get_transaction(id: TransactionID, connection: &Connection) -> Result<Transaction, Error> {
    connection
        .prepare(
            "SELECT id, date, amount, description, category, subcategory
             FROM \"transaction\"
             WHERE id = :id",
        )?
        .query_row(&[(":id", &id)], map_transaction_row)
        .map_err(|error| error.into())
}

/// Retrieve every transaction in the database.
///
/// # Errors
/// This function will return an [Error::SqlError] if there is an SQL error.
pub fn get_all_transactions(connection: &Connection) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare("SELECT id, date, amount, description, category, subcategory FROM \"transaction\"")?
        .query_map([], map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(|error| error.into()))
        .collect()
}

/// Create the transaction table in the database.
///
/// The table belongs to the surrounding application; this only creates it
/// when missing, e.g. for in-memory test databases.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                amount REAL NOT NULL,
                description TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT '',
                subcategory TEXT
                )",
        (),
    )?;

    // Ensure the sequence starts at 1
    connection.execute(
        "INSERT OR IGNORE INTO sqlite_sequence (name, seq) VALUES ('transaction', 0)",
        (),
    )?;

    Ok(())
}

/// Map a database row to a Transaction.
fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let id = row.get(0)?;
    let date = row.get(1)?;
    let amount = row.get(2)?;
    let description = row.get(3)?;
    let category = row.get(4)?;
    let subcategory = row.get(5)?;

    Ok(Transaction {
        id,
        date,
        amount,
        description,
        category,
        subcategory,
    })
}

// ============================================================================
// TESTS
// ============================================================================
