//! An append-only log of push notification events, e.g. token registrations.

use axum::{extract::State, response::Response};
use rusqlite::{Connection, Row, types::Type};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    Error, UserId,
    envelope::{created, non_empty, ok},
    extract::{JsonBody, QueryParams},
    store::Store,
};

/// How many log entries are returned when the client does not ask for a limit.
pub const DEFAULT_LIMIT: u32 = 50;

/// A single notification event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationLog {
    /// The ID of the entry.
    pub id: String,
    /// The user the event concerns, if any.
    pub user_id: Option<UserId>,
    /// What happened, e.g. `token_registered`.
    pub status: String,
    /// Free-form data describing the event.
    pub details: Option<Value>,
    /// When the event was logged.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

const NOTIFICATION_LOG_COLUMNS: &str = "id, user_id, status, details, created_at";

/// Create the notification log table.
///
/// # Errors
/// Returns an error if the SQL query failed.
pub fn create_notification_log_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS notification_log (
                id TEXT PRIMARY KEY,
                user_id TEXT,
                status TEXT NOT NULL,
                details TEXT,
                created_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

fn map_notification_log_row(row: &Row) -> Result<NotificationLog, rusqlite::Error> {
    let user_id: Option<String> = row.get(1)?;
    let details: Option<String> = row.get(3)?;
    let details = details
        .map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, error.into()))?;

    Ok(NotificationLog {
        id: row.get(0)?,
        user_id: user_id.map(UserId::new),
        status: row.get(2)?,
        details,
        created_at: row.get(4)?,
    })
}

/// Append an entry to the log.
///
/// # Errors
/// Returns an [Error::SqlError] if the insert failed.
pub fn create_notification_log(
    user_id: Option<&UserId>,
    status: &str,
    details: Option<&Value>,
    connection: &Connection,
) -> Result<NotificationLog, Error> {
    let details = details.map(serde_json::to_string).transpose()?;

    let entry = connection
        .prepare(&format!(
            "INSERT INTO notification_log (id, user_id, status, details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING {NOTIFICATION_LOG_COLUMNS}"
        ))?
        .query_row(
            (
                Uuid::new_v4().to_string(),
                user_id.map(UserId::as_str),
                status,
                details,
                OffsetDateTime::now_utc(),
            ),
            map_notification_log_row,
        )?;

    Ok(entry)
}

/// Get the latest `limit` entries, optionally filtered by user and status.
///
/// # Errors
/// Returns an [Error::SqlError] if the query failed.
pub fn query_notification_logs(
    user_id: Option<&UserId>,
    status: Option<&str>,
    limit: u32,
    connection: &Connection,
) -> Result<Vec<NotificationLog>, Error> {
    connection
        .prepare(&format!(
            "SELECT {NOTIFICATION_LOG_COLUMNS} FROM notification_log
             WHERE (?1 IS NULL OR user_id = ?1)
               AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3"
        ))?
        .query_map(
            (user_id.map(UserId::as_str), status, limit),
            map_notification_log_row,
        )?
        .map(|maybe_entry| maybe_entry.map_err(Error::from))
        .collect()
}

/// The query string for [get_notification_logs].
#[derive(Debug, Deserialize)]
pub struct NotificationLogQuery {
    /// Only include entries for this user.
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    /// Only include entries with this status.
    pub status: Option<String>,
    /// The maximum number of entries to return.
    pub limit: Option<u32>,
}

/// A route handler for listing notification log entries, newest first.
pub async fn get_notification_logs(
    State(store): State<Store>,
    QueryParams(query): QueryParams<NotificationLogQuery>,
) -> Result<Response, Error> {
    let connection = store.connection()?;
    let user_id = non_empty(query.user_id).map(UserId::new);
    let status = non_empty(query.status);

    query_notification_logs(
        user_id.as_ref(),
        status.as_deref(),
        query.limit.unwrap_or(DEFAULT_LIMIT),
        &connection,
    )
    .map(ok)
}

/// The JSON body for appending to the notification log.
#[derive(Debug, Deserialize)]
pub struct NotificationLogForm {
    /// The user the event concerns.
    pub user_id: Option<String>,
    /// What happened.
    pub status: Option<String>,
    /// Free-form data describing the event.
    pub details: Option<Value>,
}

/// A route handler for appending to the notification log.
pub async fn post_notification_log(
    State(store): State<Store>,
    JsonBody(form): JsonBody<NotificationLogForm>,
) -> Result<Response, Error> {
    let connection = store.connection()?;

    let status = non_empty(form.status)
        .ok_or_else(|| Error::Validation("Missing required field: status".to_owned()))?;
    let user_id = non_empty(form.user_id).map(UserId::new);
    let details = form.details.filter(|details| !details.is_null());

    create_notification_log(user_id.as_ref(), &status, details.as_ref(), &connection).map(created)
}

#[cfg(test)]
mod database_tests {
    use rusqlite::Connection;
    use serde_json::json;

    use crate::{UserId, db::initialize};

    use super::{create_notification_log, query_notification_logs};

    fn get_test_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        connection
    }

    #[test]
    fn create_keeps_details() {
        let connection = get_test_connection();
        let details = json!({ "token": "abc" });

        let entry = create_notification_log(
            Some(&UserId::new("u1")),
            "token_registered",
            Some(&details),
            &connection,
        )
        .unwrap();

        assert_eq!(entry.details, Some(details));
        assert_eq!(entry.user_id, Some(UserId::new("u1")));
    }

    #[test]
    fn query_filters_and_limits() {
        let connection = get_test_connection();
        for status in ["token_registered", "delivered", "delivered"] {
            create_notification_log(Some(&UserId::new("u1")), status, None, &connection)
                .unwrap();
        }
        create_notification_log(None, "delivered", None, &connection).unwrap();

        let delivered =
            query_notification_logs(Some(&UserId::new("u1")), Some("delivered"), 50, &connection)
                .unwrap();
        assert_eq!(delivered.len(), 2);

        let latest = query_notification_logs(None, None, 1, &connection).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].user_id, None);
    }
}
