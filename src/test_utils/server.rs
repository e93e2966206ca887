use axum_extra::extract::cookie::Cookie;
use axum_test::TestServer;
use rusqlite::Connection;
use serde_json::{Value, json};

use crate::{AppState, Store, UserId, auth::COOKIE_TOKEN, build_router, endpoints};

/// The password used by [signed_in_user].
pub(crate) const TEST_PASSWORD: &str = "averysafeandsecurepassword";

pub(crate) fn get_test_server_with_state() -> (TestServer, AppState) {
    let connection = Connection::open_in_memory().expect("Could not open in-memory database");
    let store = Store::sqlite(connection).expect("Could not initialize database");
    let state = AppState::new(store, "a test secret", "Etc/UTC").expect("Invalid test state");

    let server = TestServer::new(build_router(state.clone(), "public"))
        .expect("Could not create test server");

    (server, state)
}

pub(crate) fn get_test_server() -> TestServer {
    get_test_server_with_state().0
}

pub(crate) fn get_unconfigured_test_server() -> TestServer {
    let state = AppState::new(Store::Unconfigured, "a test secret", "Etc/UTC")
        .expect("Invalid test state");

    TestServer::new(build_router(state, "public")).expect("Could not create test server")
}

pub(crate) async fn register_test_user(server: &TestServer, email: &str, password: &str) -> UserId {
    let response = server
        .post(endpoints::USERS)
        .json(&json!({ "email": email, "password": password }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);

    let body: Value = response.json();
    let id = body["data"]["id"]
        .as_str()
        .expect("registration response has no id");

    UserId::new(id)
}

pub(crate) async fn log_in_test_user(
    server: &TestServer,
    email: &str,
    password: &str,
) -> Cookie<'static> {
    let response = server
        .post(endpoints::LOG_IN_API)
        .json(&json!({ "email": email, "password": password }))
        .await;
    response.assert_status_ok();

    response.cookie(COOKIE_TOKEN)
}

/// Register and log in `email`, returning the user's ID and session cookie.
pub(crate) async fn signed_in_user(server: &TestServer, email: &str) -> (UserId, Cookie<'static>) {
    let user_id = register_test_user(server, email, TEST_PASSWORD).await;
    let cookie = log_in_test_user(server, email, TEST_PASSWORD).await;

    (user_id, cookie)
}
