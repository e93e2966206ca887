//! Push notification tokens registered by users' devices.
//!
//! A token identifies one browser or device to the push service. The same token
//! may be registered again, e.g. after another user signs in on the device, in
//! which case the existing row is moved to the new user.

use axum::{extract::State, response::Response};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    Error, UserId,
    envelope::{created, non_empty, ok, success},
    extract::{JsonBody, QueryParams},
    store::Store,
};

/// A push token registered for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FcmToken {
    /// The ID of the registration.
    pub id: String,
    /// The user who registered the token.
    pub user_id: Option<UserId>,
    /// The opaque token issued by the push service.
    pub token: String,
    /// When the token was first registered.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

const FCM_TOKEN_COLUMNS: &str = "id, user_id, token, created_at";

/// Create the push token table.
///
/// # Errors
/// Returns an error if the SQL query failed.
pub fn create_fcm_token_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS fcm_token (
                id TEXT PRIMARY KEY,
                user_id TEXT,
                token TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

fn map_fcm_token_row(row: &Row) -> Result<FcmToken, rusqlite::Error> {
    let user_id: Option<String> = row.get(1)?;

    Ok(FcmToken {
        id: row.get(0)?,
        user_id: user_id.map(UserId::new),
        token: row.get(2)?,
        created_at: row.get(3)?,
    })
}

/// Register `token` for `user_id`, replacing the owner of an already known token.
///
/// # Errors
/// Returns an [Error::SqlError] if the query failed.
pub fn upsert_fcm_token(
    user_id: &UserId,
    token: &str,
    connection: &Connection,
) -> Result<FcmToken, Error> {
    let token = connection
        .prepare(&format!(
            "INSERT INTO fcm_token (id, user_id, token, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(token) DO UPDATE SET user_id = excluded.user_id
             RETURNING {FCM_TOKEN_COLUMNS}"
        ))?
        .query_row(
            (
                Uuid::new_v4().to_string(),
                user_id.as_str(),
                token,
                OffsetDateTime::now_utc(),
            ),
            map_fcm_token_row,
        )?;

    Ok(token)
}

/// Get the registered tokens, newest first, optionally only those of `user_id`.
///
/// # Errors
/// Returns an [Error::SqlError] if the query failed.
pub fn list_fcm_tokens(
    user_id: Option<&UserId>,
    connection: &Connection,
) -> Result<Vec<FcmToken>, Error> {
    connection
        .prepare(&format!(
            "SELECT {FCM_TOKEN_COLUMNS} FROM fcm_token
             WHERE ?1 IS NULL OR user_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        ))?
        .query_map([user_id.map(UserId::as_str)], map_fcm_token_row)?
        .map(|maybe_token| maybe_token.map_err(Error::from))
        .collect()
}

/// Forget `token`. Deleting an unknown token is not an error.
///
/// # Errors
/// Returns an [Error::SqlError] if the query failed.
pub fn delete_fcm_token(token: &str, connection: &Connection) -> Result<(), Error> {
    connection.execute("DELETE FROM fcm_token WHERE token = ?1", [token])?;

    Ok(())
}

/// The query string for [get_fcm_tokens].
#[derive(Debug, Deserialize)]
pub struct FcmTokenQuery {
    /// Only include this user's tokens.
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// A route handler for listing registered push tokens.
pub async fn get_fcm_tokens(
    State(store): State<Store>,
    QueryParams(query): QueryParams<FcmTokenQuery>,
) -> Result<Response, Error> {
    let connection = store.connection()?;
    let user_id = non_empty(query.user_id).map(UserId::new);

    list_fcm_tokens(user_id.as_ref(), &connection).map(ok)
}

/// The JSON body for registering a push token.
#[derive(Debug, Deserialize)]
pub struct FcmTokenForm {
    /// The user registering the token.
    pub user_id: Option<String>,
    /// The token issued by the push service.
    pub token: Option<String>,
}

/// A route handler for registering a push token.
pub async fn post_fcm_token(
    State(store): State<Store>,
    JsonBody(form): JsonBody<FcmTokenForm>,
) -> Result<Response, Error> {
    let connection = store.connection()?;

    let (Some(user_id), Some(token)) = (non_empty(form.user_id), non_empty(form.token)) else {
        return Err(Error::Validation(
            "Missing required fields: user_id, token".to_owned(),
        ));
    };

    upsert_fcm_token(&UserId::new(user_id), &token, &connection).map(created)
}

/// The query string for [delete_fcm_token_endpoint].
#[derive(Debug, Deserialize)]
pub struct DeleteFcmTokenQuery {
    /// The token to forget.
    pub token: Option<String>,
}

/// A route handler for forgetting a push token.
pub async fn delete_fcm_token_endpoint(
    State(store): State<Store>,
    QueryParams(query): QueryParams<DeleteFcmTokenQuery>,
) -> Result<Response, Error> {
    let connection = store.connection()?;

    let token = non_empty(query.token)
        .ok_or_else(|| Error::Validation("Token is required".to_owned()))?;

    delete_fcm_token(&token, &connection)?;

    Ok(success())
}
