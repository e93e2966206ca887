//! The store that persists the application's rows.
//!
//! The server chooses the variant at start-up: a SQLite database when a database
//! path is configured, otherwise the null store. Handlers do not special-case the
//! null store; asking it for a connection reports [Error::StoreNotConfigured],
//! which responds with 503 and empty data.

use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::{Error, db::initialize};

/// Access to the relational store backing the API.
#[derive(Debug, Clone)]
pub enum Store {
    /// A SQLite database shared by all request handlers.
    Sqlite(Arc<Mutex<Connection>>),
    /// No database is configured.
    Unconfigured,
}

impl Store {
    /// Create a SQLite store, adding the application tables if they do not exist.
    ///
    /// # Errors
    /// Returns an error if the tables could not be created.
    pub fn sqlite(connection: Connection) -> Result<Self, Error> {
        initialize(&connection)?;

        Ok(Self::Sqlite(Arc::new(Mutex::new(connection))))
    }

    /// Whether the store is backed by a database.
    pub fn is_configured(&self) -> bool {
        matches!(self, Self::Sqlite(_))
    }

    /// Lock the database connection.
    ///
    /// The guard must not be held across an `.await`.
    ///
    /// # Errors
    /// Returns:
    /// - [Error::StoreNotConfigured] for the null store,
    /// - [Error::DatabaseLockError] if the lock is poisoned.
    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        match self {
            Self::Sqlite(connection) => connection.lock().map_err(|error| {
                tracing::error!("could not acquire database lock: {error}");
                Error::DatabaseLockError
            }),
            Self::Unconfigured => Err(Error::StoreNotConfigured),
        }
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use crate::{Error, Store};

    #[test]
    fn null_store_reports_not_configured() {
        let store = Store::Unconfigured;

        assert!(!store.is_configured());
        assert!(matches!(store.connection(), Err(Error::StoreNotConfigured)));
    }

    #[test]
    fn sqlite_store_hands_out_connection() {
        let store = Store::sqlite(Connection::open_in_memory().unwrap()).unwrap();

        assert!(store.is_configured());
        let connection = store.connection().unwrap();
        let count: i64 = connection
            .query_row("SELECT COUNT(*) FROM \"transaction\"", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
