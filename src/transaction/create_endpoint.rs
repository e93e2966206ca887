//! Defines the endpoint for creating a new transaction.

use axum::{extract::State, response::Response};
use serde::Deserialize;
use time::Date;

use crate::{
    Error, UserId,
    envelope::{created, non_empty},
    extract::JsonBody,
    realtime::{ChangeKind, Table},
    timezone::local_today,
    transaction::{
        NewTransaction, TransactionState,
        core::{create_transaction, validate_amount},
    },
};

/// The JSON body for creating a transaction.
///
/// Every field is optional here so that missing fields can be reported with a
/// message naming them.
#[derive(Debug, Default, Deserialize)]
pub struct TransactionForm {
    /// The owner of the transaction.
    pub user_id: Option<String>,
    /// `income` or `expense`.
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    /// The amount, must be greater than zero.
    pub amount: Option<f64>,
    /// Text detailing the transaction.
    pub description: Option<String>,
    /// A free-form category.
    pub category: Option<String>,
    /// Defaults to `cash`.
    pub payment_method: Option<String>,
    /// Defaults to `other`.
    pub fund_source: Option<String>,
    /// Defaults to today in the local timezone.
    pub transaction_date: Option<String>,
}

/// Parse a `YYYY-MM-DD` date.
pub(crate) fn parse_transaction_date(value: &str) -> Result<Date, Error> {
    let format = time::macros::format_description!("[year]-[month]-[day]");

    Date::parse(value.trim(), format).map_err(|_| {
        Error::Validation("Transaction date must be formatted as YYYY-MM-DD".to_owned())
    })
}

impl TransactionForm {
    /// Validate the form and fill in defaults.
    ///
    /// # Errors
    /// Returns an [Error::Validation] naming the first problem found.
    pub fn validate(self, today: Date) -> Result<NewTransaction, Error> {
        let (Some(user_id), Some(transaction_type), Some(amount)) = (
            non_empty(self.user_id),
            non_empty(self.transaction_type),
            self.amount,
        ) else {
            return Err(Error::Validation(
                "Missing required fields: user_id, type, amount".to_owned(),
            ));
        };

        let transaction_type = transaction_type.parse()?;
        let amount = validate_amount(amount)?;
        let payment_method = non_empty(self.payment_method)
            .map(|method| method.parse())
            .transpose()?
            .unwrap_or_default();
        let fund_source = non_empty(self.fund_source)
            .map(|source| source.parse())
            .transpose()?
            .unwrap_or_default();
        let transaction_date = match non_empty(self.transaction_date) {
            Some(date) => parse_transaction_date(&date)?,
            None => today,
        };

        Ok(NewTransaction {
            user_id: UserId::new(user_id),
            transaction_type,
            amount,
            description: non_empty(self.description),
            category: non_empty(self.category),
            payment_method,
            fund_source,
            transaction_date,
        })
    }
}

/// A route handler for creating a new transaction, responds with the stored row.
pub async fn post_transaction(
    State(state): State<TransactionState>,
    JsonBody(form): JsonBody<TransactionForm>,
) -> Result<Response, Error> {
    let connection = state.store.connection()?;

    let new_transaction = form.validate(local_today(&state.local_timezone)?)?;
    let transaction = create_transaction(new_transaction, &connection)?;
    drop(connection);

    state.changes.publish_row(
        Table::Transactions,
        ChangeKind::Insert,
        &transaction.id,
        &transaction,
    );

    Ok(created(transaction))
}
