//! Registration of new users.

use axum::{extract::State, response::Response};
use serde::{Deserialize, Serialize};

use crate::{
    Error, PasswordHash,
    auth::{create_user, log_in::LoginState},
    envelope::created,
    extract::JsonBody,
    profile::{ProfileStatus, ProfileUpsert, set_presence, upsert_profile},
    realtime::{ChangeKind, Table},
};

/// The data sent to register a new user.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    /// The address the user will log in with.
    pub email: String,
    /// The user's chosen password.
    pub password: String,
    /// The given name shown to contacts.
    pub first_name: Option<String>,
    /// The family name shown to contacts.
    pub last_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct RegisteredUser {
    id: String,
    email: String,
}

/// Create a user and their profile.
///
/// The new profile starts offline, the user has to log in to start a session.
///
/// # Errors
///
/// Responds with:
/// - 400 if the email is malformed or the password is too weak,
/// - 409 if the email is already registered,
/// - 503 if no store is configured.
pub async fn register_user(
    State(state): State<LoginState>,
    JsonBody(form): JsonBody<RegisterForm>,
) -> Result<Response, Error> {
    let email = form.email.trim();

    if email.is_empty() || !email.contains('@') {
        return Err(Error::Validation("A valid email is required".to_owned()));
    }

    let password_hash =
        PasswordHash::for_account(&form.password, email, PasswordHash::DEFAULT_COST)?;

    let connection = state.store.connection()?;
    let user = create_user(email, password_hash, &connection)?;

    if form.first_name.is_some() || form.last_name.is_some() {
        upsert_profile(
            &user.id,
            ProfileUpsert {
                id: Some(user.id.to_string()),
                first_name: form.first_name,
                last_name: form.last_name,
                avatar_url: None,
            },
            &connection,
        )?;
    }
    let profile = set_presence(&user.id, ProfileStatus::Offline, &connection)?;
    drop(connection);

    tracing::info!("Registered user {}", user.id);
    state
        .changes
        .publish_row(Table::Profiles, ChangeKind::Insert, &profile.id, &profile);

    Ok(created(RegisteredUser {
        id: user.id.to_string(),
        email: user.email,
    }))
}
