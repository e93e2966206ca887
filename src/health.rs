//! The store health check.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{Error, store::Store};

fn check_store(store: &Store) -> Result<i64, Error> {
    let connection = store.connection()?;
    let profiles = connection.query_row("SELECT COUNT(*) FROM profile", [], |row| row.get(0))?;

    Ok(profiles)
}

/// A route handler that reports whether the store can be queried.
pub async fn get_store_health(State(store): State<Store>) -> Response {
    match check_store(&store) {
        Ok(_) => {
            let timestamp = OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default();

            Json(json!({
                "status": "success",
                "message": "Store connection successful",
                "timestamp": timestamp,
            }))
            .into_response()
        }
        Err(Error::StoreNotConfigured) => Error::StoreNotConfigured.into_response(),
        Err(error) => {
            tracing::error!("Store health check failed: {error}");

            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "message": "Store connection failed",
                    "error": error.to_string(),
                })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::Value;

    use crate::{
        endpoints,
        test_utils::{get_test_server, get_unconfigured_test_server},
    };

    #[tokio::test]
    async fn configured_store_is_healthy() {
        let server = get_test_server();

        let response = server.get(endpoints::STORE_HEALTH).await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "success");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn unconfigured_store_is_unavailable() {
        let server = get_unconfigured_test_server();

        let response = server.get(endpoints::STORE_HEALTH).await;

        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }
}
