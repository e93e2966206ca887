//! Log-out route handler that invalidates the session cookie and marks the user offline.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use axum_extra::extract::PrivateCookieJar;

use crate::{
    auth::{get_token_from_cookies, invalidate_auth_cookie, log_in::LoginState},
    envelope::success,
    profile::{ProfileStatus, set_presence},
    realtime::{ChangeKind, Table},
};

/// Invalidate the auth cookie and mark the signed-in user's profile offline.
///
/// Logging out always succeeds: a missing session or a store failure while
/// updating presence is logged and the cookie is still cleared.
pub async fn post_log_out(State(state): State<LoginState>, jar: PrivateCookieJar) -> Response {
    if let Ok(token) = get_token_from_cookies(&jar) {
        let presence = state.store.connection().and_then(|connection| {
            set_presence(&token.user_id, ProfileStatus::Offline, &connection)
        });

        match presence {
            Ok(profile) => {
                state
                    .changes
                    .publish_row(Table::Profiles, ChangeKind::Update, &profile.id, &profile)
            }
            Err(error) => tracing::warn!("Could not mark {} offline: {error}", token.user_id),
        }
    }

    let jar = invalidate_auth_cookie(jar);

    (jar, success()).into_response()
}
