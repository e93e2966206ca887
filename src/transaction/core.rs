//! Defines the core data models and database queries for transactions.

use std::{fmt::Display, str::FromStr};

use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::{Error, UserId, db::parse_text_column};

// ============================================================================
// MODELS
// ============================================================================

/// Whether money came in or went out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money earned.
    Income,
    /// Money spent.
    Expense,
}

impl TransactionType {
    /// The name stored in the database and sent over the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
        }
    }
}

impl FromStr for TransactionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(TransactionType::Income),
            "expense" => Ok(TransactionType::Expense),
            _ => Err(Error::Validation(
                "Type must be either income or expense".to_owned(),
            )),
        }
    }
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a transaction was paid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Notes and coins.
    #[default]
    Cash,
    /// A QRIS code payment.
    Qris,
    /// A transfer between bank accounts.
    BankTransfer,
    /// Anything else.
    Other,
}

impl PaymentMethod {
    /// The name stored in the database and sent over the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Qris => "qris",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Other => "other",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "qris" => Ok(PaymentMethod::Qris),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "other" => Ok(PaymentMethod::Other),
            _ => Err(Error::Validation(
                "Payment method must be one of cash, qris, bank_transfer or other".to_owned(),
            )),
        }
    }
}

/// Where the money for a transaction came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundSource {
    /// The shop's cash drawer.
    FromCashDrawer,
    /// The owner's own money.
    PersonalFund,
    /// A bank account.
    Bank,
    /// Anything else.
    #[default]
    Other,
}

impl FundSource {
    /// The name stored in the database and sent over the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            FundSource::FromCashDrawer => "from_cash_drawer",
            FundSource::PersonalFund => "personal_fund",
            FundSource::Bank => "bank",
            FundSource::Other => "other",
        }
    }
}

impl FromStr for FundSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "from_cash_drawer" => Ok(FundSource::FromCashDrawer),
            "personal_fund" => Ok(FundSource::PersonalFund),
            "bank" => Ok(FundSource::Bank),
            "other" => Ok(FundSource::Other),
            _ => Err(Error::Validation(
                "Fund source must be one of from_cash_drawer, personal_fund, bank or other"
                    .to_owned(),
            )),
        }
    }
}

/// An expense or income recorded by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: String,
    /// The user who owns the transaction.
    pub user_id: UserId,
    /// Whether money came in or went out.
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// The amount of money, always greater than zero.
    pub amount: f64,
    /// A text description of what the transaction was for.
    pub description: Option<String>,
    /// A free-form category, e.g. "Food".
    pub category: Option<String>,
    /// How the transaction was paid.
    pub payment_method: PaymentMethod,
    /// Where the money came from.
    pub fund_source: FundSource,
    /// The day the transaction happened.
    pub transaction_date: Date,
    /// When the transaction was recorded.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the transaction was last edited.
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

/// A validated transaction that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// The user who owns the transaction.
    pub user_id: UserId,
    /// Whether money came in or went out.
    pub transaction_type: TransactionType,
    /// The amount of money, must be greater than zero.
    pub amount: f64,
    /// A text description of what the transaction was for.
    pub description: Option<String>,
    /// A free-form category.
    pub category: Option<String>,
    /// How the transaction was paid.
    pub payment_method: PaymentMethod,
    /// Where the money came from.
    pub fund_source: FundSource,
    /// The day the transaction happened.
    pub transaction_date: Date,
}

/// The fields to change on an existing transaction. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionUpdate {
    /// The new type.
    pub transaction_type: Option<TransactionType>,
    /// The new amount, must be greater than zero.
    pub amount: Option<f64>,
    /// The new description.
    pub description: Option<String>,
    /// The new category.
    pub category: Option<String>,
    /// The new payment method.
    pub payment_method: Option<PaymentMethod>,
    /// The new source of funds.
    pub fund_source: Option<FundSource>,
    /// The new date.
    pub transaction_date: Option<Date>,
}

/// Check that `amount` is a positive, finite number.
///
/// # Errors
/// Returns an [Error::Validation] naming the amount otherwise.
pub fn validate_amount(amount: f64) -> Result<f64, Error> {
    if amount.is_finite() && amount > 0.0 {
        Ok(amount)
    } else {
        Err(Error::Validation("Amount must be greater than 0".to_owned()))
    }
}

/// The filters for listing a user's transactions.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionQuery {
    /// Only transactions owned by this user.
    pub user_id: UserId,
    /// Only transactions of this type, all types if `None`.
    pub transaction_type: Option<TransactionType>,
    /// Only transactions dated on or after this day.
    pub since: Option<Date>,
    /// The maximum number of transactions.
    pub limit: u32,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

const TRANSACTION_COLUMNS: &str = "id, user_id, type, amount, description, category, \
    payment_method, fund_source, transaction_date, created_at, updated_at";

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                type TEXT NOT NULL CHECK (type IN ('income', 'expense')),
                amount REAL NOT NULL CHECK (amount > 0),
                description TEXT,
                category TEXT,
                payment_method TEXT NOT NULL DEFAULT 'cash',
                fund_source TEXT NOT NULL DEFAULT 'other',
                transaction_date TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT
                )",
        (),
    )?;

    // Lists and reports always filter by owner and date.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_user_date
            ON \"transaction\"(user_id, transaction_date);",
        (),
    )?;

    Ok(())
}

/// Map a database row to a Transaction.
pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let user_id: String = row.get(1)?;

    Ok(Transaction {
        id: row.get(0)?,
        user_id: UserId::new(user_id),
        transaction_type: parse_text_column(row, 2)?,
        amount: row.get(3)?,
        description: row.get(4)?,
        category: row.get(5)?,
        payment_method: parse_text_column(row, 6)?,
        fund_source: parse_text_column(row, 7)?,
        transaction_date: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Store a new transaction with a fresh ID.
///
/// # Errors
/// Returns an [Error::SqlError] if the insert failed.
pub fn create_transaction(
    new_transaction: NewTransaction,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(&format!(
            "INSERT INTO \"transaction\" (id, user_id, type, amount, description, category,
                payment_method, fund_source, transaction_date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             RETURNING {TRANSACTION_COLUMNS}"
        ))?
        .query_row(
            (
                Uuid::new_v4().to_string(),
                new_transaction.user_id.as_str(),
                new_transaction.transaction_type.as_str(),
                new_transaction.amount,
                new_transaction.description,
                new_transaction.category,
                new_transaction.payment_method.as_str(),
                new_transaction.fund_source.as_str(),
                new_transaction.transaction_date,
                OffsetDateTime::now_utc(),
            ),
            map_transaction_row,
        )?;

    Ok(transaction)
}

/// Retrieve a transaction from the database by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a valid transaction,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_transaction(id: &str, connection: &Connection) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\" WHERE id = ?1"
        ))?
        .query_row([id], map_transaction_row)?;

    Ok(transaction)
}

/// Get a user's transactions, newest first.
///
/// # Errors
/// Returns an [Error::SqlError] if the query failed.
pub fn query_transactions(
    query: &TransactionQuery,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\"
             WHERE user_id = ?1
               AND (?2 IS NULL OR type = ?2)
               AND (?3 IS NULL OR transaction_date >= ?3)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?4"
        ))?
        .query_map(
            (
                query.user_id.as_str(),
                query.transaction_type.map(TransactionType::as_str),
                query.since,
                query.limit,
            ),
            map_transaction_row,
        )?
        .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
        .collect()
}

/// Apply `update` to the transaction `id` if it belongs to `owner`.
///
/// # Errors
/// Returns [Error::NotFound] if there is no such transaction or it belongs to
/// another user, otherwise an [Error::SqlError] if the update failed.
pub fn update_transaction(
    id: &str,
    owner: &UserId,
    update: TransactionUpdate,
    connection: &Connection,
) -> Result<Transaction, Error> {
    connection
        .prepare(&format!(
            "UPDATE \"transaction\" SET
                type = COALESCE(?1, type),
                amount = COALESCE(?2, amount),
                description = COALESCE(?3, description),
                category = COALESCE(?4, category),
                payment_method = COALESCE(?5, payment_method),
                fund_source = COALESCE(?6, fund_source),
                transaction_date = COALESCE(?7, transaction_date),
                updated_at = ?8
             WHERE id = ?9 AND user_id = ?10
             RETURNING {TRANSACTION_COLUMNS}"
        ))?
        .query_row(
            (
                update.transaction_type.map(TransactionType::as_str),
                update.amount,
                update.description,
                update.category,
                update.payment_method.map(PaymentMethod::as_str),
                update.fund_source.map(FundSource::as_str),
                update.transaction_date,
                OffsetDateTime::now_utc(),
                id,
                owner.as_str(),
            ),
            map_transaction_row,
        )
        .optional()?
        .ok_or(Error::NotFound)
}

pub(crate) type RowsAffected = usize;

/// Delete the transaction `id` if it belongs to `owner`.
///
/// # Errors
/// Returns an [Error::SqlError] if the delete failed.
pub fn delete_transaction(
    id: &str,
    owner: &UserId,
    connection: &Connection,
) -> Result<RowsAffected, Error> {
    connection
        .execute(
            "DELETE FROM \"transaction\" WHERE id = ?1 AND user_id = ?2",
            (id, owner.as_str()),
        )
        .map_err(|err| err.into())
}

// ============================================================================
// TESTS
// ============================================================================
