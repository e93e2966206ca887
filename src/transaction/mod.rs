//! Income and expense transactions.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model and the database functions for storing and querying transactions
//! - The period filter used by lists and reports
//! - The JSON endpoints for listing, creating, editing and deleting transactions

mod core;
mod create_endpoint;
mod delete_endpoint;
mod edit_endpoint;
mod list_endpoint;
mod period;
mod state;

pub use core::{
    FundSource, NewTransaction, PaymentMethod, Transaction, TransactionQuery, TransactionType,
    TransactionUpdate, create_transaction_table, get_transaction, query_transactions,
};
pub use create_endpoint::post_transaction;
pub use delete_endpoint::{delete_transaction_by_id, delete_transaction_by_query};
pub use edit_endpoint::{put_transaction, put_transaction_by_id};
pub use list_endpoint::get_transactions;
pub(crate) use list_endpoint::parse_type_filter;
pub use period::Period;
pub use state::TransactionState;

#[cfg(test)]
pub(crate) use core::{create_transaction, test_utils::new_transaction};
