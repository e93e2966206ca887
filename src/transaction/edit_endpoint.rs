//! Defines the endpoints for editing a transaction.
//!
//! Both endpoints require a session and only change transactions owned by the
//! signed-in user.

use axum::{Extension, extract::State, response::Response};
use serde::Deserialize;

use crate::{
    Error, UserId,
    envelope::{non_empty, ok},
    extract::{JsonBody, PathParam},
    realtime::{ChangeKind, Table},
    transaction::{
        TransactionState, TransactionUpdate,
        core::{update_transaction, validate_amount},
        create_endpoint::parse_transaction_date,
    },
};

/// The JSON body for editing a transaction.
#[derive(Debug, Default, Deserialize)]
pub struct EditTransactionForm {
    /// The transaction to edit, only read by [put_transaction].
    pub id: Option<String>,
    /// `income` or `expense`.
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    /// The new amount, must be greater than zero.
    pub amount: Option<f64>,
    /// The new description.
    pub description: Option<String>,
    /// The new category.
    pub category: Option<String>,
    /// The new payment method.
    pub payment_method: Option<String>,
    /// The new source of funds.
    pub fund_source: Option<String>,
    /// The new date as `YYYY-MM-DD`.
    pub transaction_date: Option<String>,
}

impl EditTransactionForm {
    fn into_update(self) -> Result<TransactionUpdate, Error> {
        Ok(TransactionUpdate {
            transaction_type: non_empty(self.transaction_type)
                .map(|value| value.parse())
                .transpose()?,
            amount: self.amount.map(validate_amount).transpose()?,
            description: self.description,
            category: self.category,
            payment_method: non_empty(self.payment_method)
                .map(|value| value.parse())
                .transpose()?,
            fund_source: non_empty(self.fund_source)
                .map(|value| value.parse())
                .transpose()?,
            transaction_date: non_empty(self.transaction_date)
                .map(|value| parse_transaction_date(&value))
                .transpose()?,
        })
    }
}

fn edit(
    state: &TransactionState,
    id: &str,
    owner: &UserId,
    update: TransactionUpdate,
) -> Result<Response, Error> {
    let connection = state.store.connection()?;
    let transaction = update_transaction(id, owner, update, &connection)?;
    drop(connection);

    state.changes.publish_row(
        Table::Transactions,
        ChangeKind::Update,
        &transaction.id,
        &transaction,
    );

    Ok(ok(transaction))
}

/// A route handler for editing the transaction named by the `id` field of the body.
pub async fn put_transaction(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserId>,
    JsonBody(form): JsonBody<EditTransactionForm>,
) -> Result<Response, Error> {
    if !state.store.is_configured() {
        return Err(Error::StoreNotConfigured);
    }

    let id = non_empty(form.id.clone())
        .ok_or_else(|| Error::Validation("Missing required field: id".to_owned()))?;
    let update = form.into_update()?;

    edit(&state, &id, &user_id, update)
}

/// A route handler for editing the transaction named in the path.
pub async fn put_transaction_by_id(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserId>,
    PathParam(transaction_id): PathParam<String>,
    JsonBody(form): JsonBody<EditTransactionForm>,
) -> Result<Response, Error> {
    let update = form.into_update()?;

    edit(&state, &transaction_id, &user_id, update)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    use crate::{
        endpoints::{self, format_endpoint},
        test_utils::{
            assert_error, get_test_server, get_unconfigured_test_server, response_data,
            signed_in_user,
        },
    };

    async fn create(server: &axum_test::TestServer, user_id: &str) -> String {
        let response = server
            .post(endpoints::TRANSACTIONS_API)
            .json(&json!({ "user_id": user_id, "type": "expense", "amount": 10 }))
            .await;

        response_data(&response)["id"]
            .as_str()
            .unwrap()
            .to_owned()
    }

    #[tokio::test]
    async fn put_requires_session() {
        let server = get_test_server();

        let response = server
            .put(endpoints::TRANSACTIONS_API)
            .json(&json!({ "id": "t1", "amount": 5 }))
            .await;

        response.assert_status_unauthorized();
    }

    #[tokio::test]
    async fn put_requires_id() {
        let server = get_test_server();
        let (_, cookie) = signed_in_user(&server, "budi@example.com").await;

        let response = server
            .put(endpoints::TRANSACTIONS_API)
            .add_cookie(cookie)
            .json(&json!({ "amount": 5 }))
            .await;

        assert_error(&response, StatusCode::BAD_REQUEST, "Missing required field: id");
    }

    #[tokio::test]
    async fn put_without_store_is_unavailable_before_validation() {
        // Both servers share the cookie secret, so the session is accepted.
        let (_, cookie) = signed_in_user(&get_test_server(), "budi@example.com").await;
        let server = get_unconfigured_test_server();

        let response = server
            .put(endpoints::TRANSACTIONS_API)
            .add_cookie(cookie)
            .json(&json!({ "amount": 5 }))
            .await;

        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        response.assert_json(&json!({ "error": "Store not configured", "data": [] }));
    }

    #[tokio::test]
    async fn owner_can_edit() {
        let server = get_test_server();
        let (user_id, cookie) = signed_in_user(&server, "budi@example.com").await;
        let id = create(&server, user_id.as_str()).await;

        let response = server
            .put(endpoints::TRANSACTIONS_API)
            .add_cookie(cookie)
            .json(&json!({ "id": id, "amount": 25, "type": "income" }))
            .await;

        response.assert_status_ok();
        let data = response_data(&response);
        assert_eq!(data["amount"], 25.0);
        assert_eq!(data["type"], "income");
        assert!(data["updated_at"].is_string());
    }

    #[tokio::test]
    async fn non_owner_edit_is_not_found() {
        let server = get_test_server();
        let (owner, _) = signed_in_user(&server, "budi@example.com").await;
        let (_, intruder_cookie) = signed_in_user(&server, "sari@example.com").await;
        let id = create(&server, owner.as_str()).await;

        let response = server
            .put(&format_endpoint(endpoints::TRANSACTION, &id))
            .add_cookie(intruder_cookie)
            .json(&json!({ "amount": 99 }))
            .await;

        response.assert_status(StatusCode::NOT_FOUND);
        let list: Value = server
            .get(endpoints::TRANSACTIONS_API)
            .add_query_param("userId", owner.as_str())
            .await
            .json();
        assert_eq!(list["data"][0]["amount"], 10.0);
    }

    #[tokio::test]
    async fn edit_rejects_invalid_amount() {
        let server = get_test_server();
        let (user_id, cookie) = signed_in_user(&server, "budi@example.com").await;
        let id = create(&server, user_id.as_str()).await;

        let response = server
            .put(&format_endpoint(endpoints::TRANSACTION, &id))
            .add_cookie(cookie)
            .json(&json!({ "amount": 0 }))
            .await;

        assert_error(
            &response,
            StatusCode::BAD_REQUEST,
            "Amount must be greater than 0",
        );
    }
}
