//! Creates the application's tables.

use std::str::FromStr;

use rusqlite::{Connection, Row, Transaction as SqlTransaction, TransactionBehavior, types::Type};

use crate::{
    Error, auth::create_user_table, fcm_token::create_fcm_token_table,
    message::create_message_table, notification_log::create_notification_log_table,
    profile::create_profile_table, todo::create_todo_table,
    transaction::create_transaction_table,
};

/// Create all the application tables in one SQL transaction.
///
/// Tables that already exist are left untouched, so this is safe to call every
/// time the server starts.
///
/// # Errors
/// Returns an [Error::SqlError] if a table could not be created.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_user_table(&transaction)?;
    create_profile_table(&transaction)?;
    create_transaction_table(&transaction)?;
    create_message_table(&transaction)?;
    create_todo_table(&transaction)?;
    create_fcm_token_table(&transaction)?;
    create_notification_log_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}

/// Read the text column `index` of `row` and parse it with [FromStr].
///
/// # Errors
/// Returns a [rusqlite::Error::FromSqlConversionFailure] if the text does not parse.
pub fn parse_text_column<T>(row: &Row, index: usize) -> Result<T, rusqlite::Error>
where
    T: FromStr<Err = Error>,
{
    let text: String = row.get(index)?;

    text.parse().map_err(|error: Error| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, error.into())
    })
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::initialize;

    #[test]
    fn initialize_is_idempotent() {
        let connection = Connection::open_in_memory().unwrap();

        initialize(&connection).unwrap();
        initialize(&connection).unwrap();
    }

    #[test]
    fn creates_every_table() {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();

        let mut tables: Vec<String> = connection
            .prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            )
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|name| name.unwrap())
            .collect();
        tables.sort();

        assert_eq!(
            tables,
            [
                "fcm_token",
                "message",
                "notification_log",
                "profile",
                "todo",
                "transaction",
                "user"
            ]
        );
    }
}
