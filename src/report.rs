//! Income and expense summaries for the dashboard and the reports page.
//!
//! Totals are aggregated in memory from a user's transactions, grouped by
//! category and by calendar month.

use std::collections::HashMap;

use axum::{extract::State, response::Response};
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    Error, UserId,
    envelope::{non_empty, ok},
    extract::QueryParams,
    timezone::local_today,
    transaction::{
        Period, Transaction, TransactionQuery, TransactionState, TransactionType,
        parse_type_filter, query_transactions,
    },
};

/// The category label used for transactions without a category.
pub const UNCATEGORIZED_LABEL: &str = "Other";

/// The dashboard summary of a user's ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Income dated today.
    pub today_income: f64,
    /// Expenses dated today.
    pub today_expense: f64,
    /// Income dated this month.
    pub month_income: f64,
    /// Expenses dated this month.
    pub month_expense: f64,
    /// All income minus all expenses.
    pub total_balance: f64,
}

/// The total amount of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotal {
    /// The category, or [UNCATEGORIZED_LABEL].
    pub category: String,
    /// The sum of the category's transactions.
    pub amount: f64,
}

/// Income and expenses of one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTotal {
    /// The month formatted as `YYYY-MM`.
    pub month: String,
    /// Income dated in the month.
    pub income: f64,
    /// Expenses dated in the month.
    pub expense: f64,
}

/// A report over the transactions in a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// The period the report covers.
    pub period: Period,
    /// Income in the period.
    pub total_income: f64,
    /// Expenses in the period.
    pub total_expense: f64,
    /// Income minus expenses, negative for a loss.
    pub net_income: f64,
    /// Category totals, largest first.
    pub categories: Vec<CategoryTotal>,
    /// Monthly totals, oldest first.
    pub months: Vec<MonthlyTotal>,
}

fn total_of(transactions: &[Transaction], transaction_type: TransactionType) -> f64 {
    transactions
        .iter()
        .filter(|transaction| transaction.transaction_type == transaction_type)
        .map(|transaction| transaction.amount)
        .sum()
}

/// Summarise `transactions` relative to `today`.
pub fn summarize(transactions: &[Transaction], today: Date) -> Stats {
    let month_start = Period::Month.start_date(today).unwrap_or(today);
    let mut stats = Stats::default();

    for transaction in transactions {
        let date = transaction.transaction_date;
        let (today_total, month_total) = match transaction.transaction_type {
            TransactionType::Income => (&mut stats.today_income, &mut stats.month_income),
            TransactionType::Expense => (&mut stats.today_expense, &mut stats.month_expense),
        };

        if date == today {
            *today_total += transaction.amount;
        }

        if date >= month_start && date <= today {
            *month_total += transaction.amount;
        }
    }

    stats.total_balance = total_of(transactions, TransactionType::Income)
        - total_of(transactions, TransactionType::Expense);

    stats
}

/// Sum transaction amounts by category, largest total first.
///
/// Ties are ordered by category name.
pub fn aggregate_by_category(transactions: &[Transaction]) -> Vec<CategoryTotal> {
    let mut totals: HashMap<&str, f64> = HashMap::new();

    for transaction in transactions {
        let category = transaction
            .category
            .as_deref()
            .filter(|category| !category.trim().is_empty())
            .unwrap_or(UNCATEGORIZED_LABEL);
        *totals.entry(category).or_insert(0.0) += transaction.amount;
    }

    let mut totals: Vec<CategoryTotal> = totals
        .into_iter()
        .map(|(category, amount)| CategoryTotal {
            category: category.to_owned(),
            amount,
        })
        .collect();
    totals.sort_by(|a, b| {
        b.amount
            .total_cmp(&a.amount)
            .then_with(|| a.category.cmp(&b.category))
    });

    totals
}

/// Sum income and expenses by calendar month, oldest month first.
pub fn aggregate_by_month(transactions: &[Transaction]) -> Vec<MonthlyTotal> {
    let mut totals: HashMap<(i32, u8), (f64, f64)> = HashMap::new();

    for transaction in transactions {
        let date = transaction.transaction_date;
        let (income, expense) = totals
            .entry((date.year(), date.month() as u8))
            .or_insert((0.0, 0.0));

        match transaction.transaction_type {
            TransactionType::Income => *income += transaction.amount,
            TransactionType::Expense => *expense += transaction.amount,
        }
    }

    let mut months: Vec<_> = totals.into_iter().collect();
    months.sort_by_key(|(month, _)| *month);

    months
        .into_iter()
        .map(|((year, month), (income, expense))| MonthlyTotal {
            month: format!("{year:04}-{month:02}"),
            income,
            expense,
        })
        .collect()
}

/// Build the report for `transactions`, which should already be limited to `period`.
pub fn build_report(transactions: &[Transaction], period: Period) -> Report {
    let total_income = total_of(transactions, TransactionType::Income);
    let total_expense = total_of(transactions, TransactionType::Expense);

    Report {
        period,
        total_income,
        total_expense,
        net_income: total_income - total_expense,
        categories: aggregate_by_category(transactions),
        months: aggregate_by_month(transactions),
    }
}

/// The query string for [get_stats].
#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// The user to summarise.
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

fn require_user_id(user_id: Option<String>) -> Result<UserId, Error> {
    non_empty(user_id)
        .map(UserId::new)
        .ok_or_else(|| Error::Validation("User ID is required".to_owned()))
}

/// A route handler for the dashboard summary of a user's ledger.
pub async fn get_stats(
    State(state): State<TransactionState>,
    QueryParams(query): QueryParams<StatsQuery>,
) -> Result<Response, Error> {
    let connection = state.store.connection()?;
    let user_id = require_user_id(query.user_id)?;
    let today = local_today(&state.local_timezone)?;

    let transactions = query_transactions(
        &TransactionQuery {
            user_id,
            transaction_type: None,
            since: None,
            limit: u32::MAX,
        },
        &connection,
    )?;

    Ok(ok(summarize(&transactions, today)))
}

/// The query string for [get_report].
#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    /// The user to report on.
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    /// `today`, `week`, `month` or `all`.
    pub period: Option<String>,
    /// `income`, `expense` or `all`.
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
}

/// A route handler for a user's report over a period.
pub async fn get_report(
    State(state): State<TransactionState>,
    QueryParams(query): QueryParams<ReportQuery>,
) -> Result<Response, Error> {
    let connection = state.store.connection()?;
    let user_id = require_user_id(query.user_id)?;
    let transaction_type = parse_type_filter(query.transaction_type)?;
    let period = Period::from_query(query.period.as_deref());
    let today = local_today(&state.local_timezone)?;

    let transactions = query_transactions(
        &TransactionQuery {
            user_id,
            transaction_type,
            since: period.start_date(today),
            limit: u32::MAX,
        },
        &connection,
    )?;

    Ok(ok(build_report(&transactions, period)))
}
