//! Handles log-in requests.
//! The auth module handles the lower level authentication and cookie auth logic.

use axum::{
    extract::{FromRef, State},
    response::{IntoResponse, Response},
};
use axum_extra::extract::{PrivateCookieJar, cookie::Key};
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::{
    AppState, Error,
    auth::{get_user_by_email, set_auth_cookie},
    envelope::ok,
    extract::JsonBody,
    profile::{ProfileStatus, set_presence},
    realtime::{ChangeFeed, ChangeKind, Table},
    store::Store,
};

/// How long the auth cookie should last if the user selects "remember me" at log-in.
pub(crate) const REMEMBER_ME_COOKIE_DURATION: Duration = Duration::days(7);

/// The state needed to perform a login.
#[derive(Debug, Clone)]
pub struct LoginState {
    /// The key to be used for signing and encrypting private cookies.
    pub cookie_key: Key,
    /// The duration for which cookies used for authentication are valid.
    pub cookie_duration: Duration,
    /// The store holding users and profiles.
    pub store: Store,
    /// Where the presence change is published.
    pub changes: ChangeFeed,
}

impl FromRef<AppState> for LoginState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            cookie_key: state.cookie_key.clone(),
            cookie_duration: state.cookie_duration,
            store: state.store.clone(),
            changes: state.changes.clone(),
        }
    }
}

// this impl tells `PrivateCookieJar` how to access the key from our state
impl FromRef<LoginState> for Key {
    fn from_ref(state: &LoginState) -> Self {
        state.cookie_key.clone()
    }
}

/// The credentials sent by the log-in form.
///
/// The password is stored as a plain string. There is no need for validation here since
/// it will be compared against the password in the database, which has been verified.
#[derive(Clone, Serialize, Deserialize)]
pub struct LogInData {
    /// Email entered during log-in.
    pub email: String,
    /// Password entered during log-in.
    pub password: String,
    /// Whether to extend the initial auth cookie duration.
    #[serde(default)]
    pub remember_me: bool,
}

/// The signed-in user, as returned to the client.
#[derive(Debug, Serialize)]
struct Session {
    id: String,
    email: String,
}

/// Handler for log-in requests.
///
/// On success the auth cookie is set, the user's profile is marked online and
/// the user's ID and email are returned.
///
/// # Errors
///
/// Responds with:
/// - 401 if the email is unknown or the password is wrong,
/// - 503 if no store is configured,
/// - 500 if the password could not be verified or the cookie could not be set.
pub async fn post_log_in(
    State(state): State<LoginState>,
    jar: PrivateCookieJar,
    JsonBody(credentials): JsonBody<LogInData>,
) -> Result<Response, Error> {
    let connection = state.store.connection()?;

    let user = match get_user_by_email(credentials.email.trim(), &connection) {
        Ok(user) => user,
        Err(Error::NotFound) => return Err(Error::InvalidCredentials),
        Err(error) => return Err(error),
    };

    let is_password_valid = user.password_hash.verify(&credentials.password)?;

    if !is_password_valid {
        tracing::info!("Failed log-in attempt for {}", user.id);
        return Err(Error::InvalidCredentials);
    }

    let profile = set_presence(&user.id, ProfileStatus::Online, &connection)?;
    drop(connection);

    state
        .changes
        .publish_row(Table::Profiles, ChangeKind::Update, &profile.id, &profile);

    let cookie_duration = if credentials.remember_me {
        REMEMBER_ME_COOKIE_DURATION
    } else {
        state.cookie_duration
    };

    let jar = set_auth_cookie(jar, user.id.clone(), cookie_duration)?;

    Ok((
        jar,
        ok(Session {
            id: user.id.to_string(),
            email: user.email,
        }),
    )
        .into_response())
}
