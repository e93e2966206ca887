//! Kasir Saku is a personal finance tracker: an income and expense ledger,
//! reports, peer messaging and push notification registration.
//!
//! This library provides a JSON REST API backed by SQLite, a live change feed
//! streamed as server-sent events, and a [client] library containing the
//! data-fetch hooks, the offline cache worker and the notification pipeline
//! that consume the API.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod app_state;
mod auth;
mod db;
mod endpoints;
mod envelope;
mod extract;
mod fcm_token;
mod health;
mod logging;
mod message;
mod notification_log;
mod profile;
mod realtime;
mod report;
mod routing;
mod store;
mod timezone;
mod todo;
mod transaction;

pub mod client;

#[cfg(test)]
mod test_utils;

pub use app_state::AppState;
pub use auth::{
    PasswordHash, User, UserId, ValidatedPassword, get_user_by_email, get_user_by_id,
    update_password,
};
pub use db::initialize as initialize_db;
pub use endpoints::TRANSACTIONS_API;
pub use fcm_token::FcmToken;
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use message::{Message, MessageType, NewMessage};
pub use notification_log::NotificationLog;
pub use profile::{Profile, ProfileStatus};
pub use realtime::{ChangeFeed, ChangeKind, RowChange, Table};
pub use report::{CategoryTotal, MonthlyTotal, Report, Stats};
pub use routing::build_router;
pub use store::Store;
pub use todo::Todo;
pub use transaction::{
    FundSource, NewTransaction, PaymentMethod, Period, Transaction, TransactionType,
    get_transaction,
};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("Could not listen for the ctrl+c signal: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!("Could not install the terminate signal handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
///
/// Every variant maps onto an HTTP status and a JSON body of the form
/// `{ "error": "..." }`, see the [IntoResponse] implementation.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// No database was configured for the server.
    ///
    /// Handlers degrade to a 503 response with empty data instead of failing.
    #[error("Store not configured")]
    StoreNotConfigured,

    /// The client sent input that is missing required fields or is malformed.
    ///
    /// The message names the offending field(s) and is shown to the client.
    #[error("{0}")]
    Validation(String),

    /// The request needs a valid session and did not have one.
    #[error("Unauthorized")]
    Unauthorized,

    /// The user provided an unknown email or the wrong password.
    #[error("Incorrect email or password")]
    InvalidCredentials,

    /// The user provided a password that is too easy to guess.
    #[error("password is too weak: {0}")]
    TooWeak(String),

    /// An unexpected error occurred with the underlying hashing library.
    ///
    /// The error string should only be logged for debugging on the server.
    #[error("hashing failed: {0}")]
    HashingError(String),

    /// The email used to register a user already belongs to another user.
    #[error("the email address is already registered")]
    DuplicateEmail,

    /// The requested resource was not found, or it belongs to another user.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// An unhandled/unexpected SQL error.
    #[error("{0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),

    /// An error occurred while serializing or deserializing JSON.
    #[error("could not serialize as JSON: {0}")]
    JSONSerializationError(String),

    /// The session cookie could not be created or read.
    #[error("could not create the session cookie: {0}")]
    CookieError(String),
}

impl Error {
    /// The HTTP status code the error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::StoreNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            Error::Validation(_) | Error::TooWeak(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized | Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Error::DuplicateEmail => StatusCode::CONFLICT,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::HashingError(_)
            | Error::SqlError(_)
            | Error::DatabaseLockError
            | Error::InvalidTimezoneError(_)
            | Error::JSONSerializationError(_)
            | Error::CookieError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Code 2067 occurs when a UNIQUE constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.ends_with("user.email") =>
            {
                Error::DuplicateEmail
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::JSONSerializationError(value.to_string())
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Error::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Error::Validation(rejection.body_text())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match self {
            Error::StoreNotConfigured => json!({ "error": self.to_string(), "data": [] }),
            Error::HashingError(_) | Error::CookieError(_) => {
                tracing::error!("An unexpected error occurred: {}", self);
                json!({ "error": "Internal server error" })
            }
            Error::SqlError(_)
            | Error::DatabaseLockError
            | Error::InvalidTimezoneError(_)
            | Error::JSONSerializationError(_) => {
                tracing::error!("An unexpected error occurred: {}", self);
                json!({ "error": self.to_string() })
            }
            error => json!({ "error": error.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
