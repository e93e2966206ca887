use axum::http::StatusCode;
use axum_test::TestResponse;
use serde_json::{Value, json};

/// The `data` field of a JSON envelope.
#[track_caller]
pub(crate) fn response_data(response: &TestResponse) -> Value {
    let body: Value = response.json();

    body.get("data")
        .cloned()
        .unwrap_or_else(|| panic!("response has no data field: {body}"))
}

#[track_caller]
pub(crate) fn assert_error(response: &TestResponse, status: StatusCode, message: &str) {
    response.assert_status(status);
    response.assert_json(&json!({ "error": message }));
}
