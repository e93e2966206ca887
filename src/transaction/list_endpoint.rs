//! Defines the endpoint for listing a user's transactions.

use axum::{extract::State, response::Response};
use serde::Deserialize;

use crate::{
    Error, UserId,
    envelope::{non_empty, ok},
    extract::QueryParams,
    timezone::local_today,
    transaction::{
        Period, TransactionQuery, TransactionState, TransactionType, core::query_transactions,
    },
};

/// How many transactions are returned when the client does not ask for a limit.
pub const DEFAULT_LIMIT: u32 = 50;

/// The query string for [get_transactions].
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// The owner of the transactions.
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    /// `income`, `expense` or `all`.
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    /// `today`, `week`, `month` or `all`.
    pub period: Option<String>,
    /// The maximum number of transactions to return.
    pub limit: Option<u32>,
}

/// Parse the `type` filter, where `all` or nothing means every type.
pub(crate) fn parse_type_filter(value: Option<String>) -> Result<Option<TransactionType>, Error> {
    match non_empty(value).as_deref() {
        None | Some("all") => Ok(None),
        Some(other) => other.parse().map(Some),
    }
}

/// A route handler for listing a user's transactions, newest first.
pub async fn get_transactions(
    State(state): State<TransactionState>,
    QueryParams(query): QueryParams<ListTransactionsQuery>,
) -> Result<Response, Error> {
    let connection = state.store.connection()?;

    let user_id = non_empty(query.user_id)
        .map(UserId::new)
        .ok_or_else(|| Error::Validation("User ID is required".to_owned()))?;
    let transaction_type = parse_type_filter(query.transaction_type)?;
    let today = local_today(&state.local_timezone)?;
    let since = Period::from_query(query.period.as_deref()).start_date(today);

    let transactions = query_transactions(
        &TransactionQuery {
            user_id,
            transaction_type,
            since,
            limit: query.limit.unwrap_or(DEFAULT_LIMIT),
        },
        &connection,
    )?;

    Ok(ok(transactions))
}
