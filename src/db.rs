//! Database initialization.

use rusqlite::{Connection, Transaction as SqlTransaction};

use crate::{Error, check::create_duplicate_check_table, transaction::create_transaction_table};

/// Create the tables the engine needs if they do not already exist.
///
/// The transaction table belongs to the surrounding application and is only
/// created when missing, e.g. for in-memory test databases. Safe to call
/// more than once.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    let transaction =
        SqlTransaction::new_unchecked(connection, rusqlite::TransactionBehavior::Exclusive)?;

    create_transaction_table(&transaction)?;
    create_duplicate_check_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}
