//! Defines the endpoints for deleting a transaction.

use axum::{Extension, extract::State, response::Response};
use serde::Deserialize;

use crate::{
    Error, UserId,
    envelope::{non_empty, success},
    extract::{PathParam, QueryParams},
    realtime::Table,
    transaction::{TransactionState, core::delete_transaction},
};

/// The query string for [delete_transaction_by_query].
#[derive(Debug, Deserialize)]
pub struct DeleteTransactionQuery {
    /// The transaction to delete.
    pub id: Option<String>,
}

fn delete(state: &TransactionState, id: &str, owner: &UserId) -> Result<Response, Error> {
    let connection = state.store.connection()?;
    let rows_affected = delete_transaction(id, owner, &connection)?;
    drop(connection);

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    state.changes.publish_delete(Table::Transactions, id);

    Ok(success())
}

/// A route handler for deleting the transaction named by the `id` query parameter.
pub async fn delete_transaction_by_query(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserId>,
    QueryParams(query): QueryParams<DeleteTransactionQuery>,
) -> Result<Response, Error> {
    if !state.store.is_configured() {
        return Err(Error::StoreNotConfigured);
    }

    let id = non_empty(query.id)
        .ok_or_else(|| Error::Validation("Missing required query: id".to_owned()))?;

    delete(&state, &id, &user_id)
}

/// A route handler for deleting the transaction named in the path.
pub async fn delete_transaction_by_id(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserId>,
    PathParam(transaction_id): PathParam<String>,
) -> Result<Response, Error> {
    delete(&state, &transaction_id, &user_id)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::{
        endpoints::{self, format_endpoint},
        realtime::{ChangeKind, Table},
        test_utils::{
            assert_error, get_test_server_with_state, get_unconfigured_test_server,
            response_data, signed_in_user,
        },
    };

    async fn create(server: &axum_test::TestServer, user_id: &str) -> String {
        let response = server
            .post(endpoints::TRANSACTIONS_API)
            .json(&json!({ "user_id": user_id, "type": "income", "amount": 10 }))
            .await;

        response_data(&response)["id"]
            .as_str()
            .unwrap()
            .to_owned()
    }

    async fn count(server: &axum_test::TestServer, user_id: &str) -> usize {
        let response = server
            .get(endpoints::TRANSACTIONS_API)
            .add_query_param("userId", user_id)
            .await;

        response_data(&response).as_array().unwrap().len()
    }

    #[tokio::test]
    async fn delete_requires_session() {
        let (server, _) = get_test_server_with_state();

        let response = server
            .delete(endpoints::TRANSACTIONS_API)
            .add_query_param("id", "t1")
            .await;

        response.assert_status_unauthorized();
    }

    #[tokio::test]
    async fn delete_by_query_requires_id() {
        let (server, _) = get_test_server_with_state();
        let (_, cookie) = signed_in_user(&server, "budi@example.com").await;

        let response = server
            .delete(endpoints::TRANSACTIONS_API)
            .add_cookie(cookie)
            .await;

        assert_error(&response, StatusCode::BAD_REQUEST, "Missing required query: id");
    }

    #[tokio::test]
    async fn delete_without_store_is_unavailable_before_validation() {
        let (configured, _) = get_test_server_with_state();
        let (_, cookie) = signed_in_user(&configured, "budi@example.com").await;
        let server = get_unconfigured_test_server();

        let response = server
            .delete(endpoints::TRANSACTIONS_API)
            .add_cookie(cookie)
            .await;

        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        response.assert_json(&json!({ "error": "Store not configured", "data": [] }));
    }

    #[tokio::test]
    async fn owner_can_delete_by_query() {
        let (server, state) = get_test_server_with_state();
        let (user_id, cookie) = signed_in_user(&server, "budi@example.com").await;
        let id = create(&server, user_id.as_str()).await;
        let mut changes = state.changes.subscribe();

        let response = server
            .delete(endpoints::TRANSACTIONS_API)
            .add_query_param("id", &id)
            .add_cookie(cookie)
            .await;

        response.assert_status_ok();
        response.assert_json(&json!({ "success": true }));
        assert_eq!(count(&server, user_id.as_str()).await, 0);

        let change = changes.recv().await.unwrap();
        assert_eq!(change.table, Table::Transactions);
        assert_eq!(change.kind, ChangeKind::Delete);
        assert_eq!(change.id, id);
    }

    #[tokio::test]
    async fn owner_can_delete_by_path() {
        let (server, _) = get_test_server_with_state();
        let (user_id, cookie) = signed_in_user(&server, "budi@example.com").await;
        let id = create(&server, user_id.as_str()).await;

        let response = server
            .delete(&format_endpoint(endpoints::TRANSACTION, &id))
            .add_cookie(cookie)
            .await;

        response.assert_status_ok();
        assert_eq!(count(&server, user_id.as_str()).await, 0);
    }

    #[tokio::test]
    async fn non_owner_delete_is_not_found() {
        let (server, _) = get_test_server_with_state();
        let (owner, _) = signed_in_user(&server, "budi@example.com").await;
        let (_, intruder_cookie) = signed_in_user(&server, "sari@example.com").await;
        let id = create(&server, owner.as_str()).await;

        let response = server
            .delete(&format_endpoint(endpoints::TRANSACTION, &id))
            .add_cookie(intruder_cookie)
            .await;

        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(count(&server, owner.as_str()).await, 1);
    }
}
