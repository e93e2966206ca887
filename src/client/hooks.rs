//! Client-side state containers for one resource each.
//!
//! A hook fetches its rows through the [ApiClient], refetches when the
//! signed-in user changes and applies live [RowChange]s by row id. Failed
//! fetches are logged and leave the previous rows in place.

use serde::de::DeserializeOwned;
use time::{Date, OffsetDateTime, UtcOffset};

use crate::{
    ChangeKind, Message, Profile, RowChange, Stats, Table, Todo, Transaction, UserId,
    client::{
        ClientError,
        api::{ApiClient, MessageDraft, TransactionDraft, TransactionFilter, TransactionPatch},
    },
};

/// A row with a primary key, as carried in [RowChange::id].
pub trait Keyed {
    /// The row's primary key as text.
    fn key(&self) -> String;
}

impl Keyed for Transaction {
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Keyed for Message {
    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Keyed for Profile {
    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Keyed for Todo {
    fn key(&self) -> String {
        self.id.to_string()
    }
}

/// The local copy of a list of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState<T> {
    /// The rows in display order.
    pub items: Vec<T>,
    /// Whether a fetch is in progress.
    pub loading: bool,
    /// The error from the last failed call, cleared by the next success.
    pub error: Option<String>,
    newest_first: bool,
}

impl<T> ResourceState<T> {
    /// An empty list where inserted rows go to the front if `newest_first`,
    /// otherwise to the back.
    pub fn new(newest_first: bool) -> Self {
        Self {
            items: Vec::new(),
            loading: false,
            error: None,
            newest_first,
        }
    }
}

impl<T: Keyed + DeserializeOwned> ResourceState<T> {
    fn position(&self, key: &str) -> Option<usize> {
        self.items.iter().position(|item| item.key() == key)
    }

    /// Add `item`, or replace the row with the same key.
    pub fn upsert(&mut self, item: T) {
        match self.position(&item.key()) {
            Some(index) => self.items[index] = item,
            None if self.newest_first => self.items.insert(0, item),
            None => self.items.push(item),
        }
    }

    /// Remove the row with `key`, returning whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.key() != key);

        self.items.len() != before
    }

    /// Apply a live change if `accept` allows the changed row.
    ///
    /// Inserts add the row, updates replace a row already in the list and
    /// deletes remove the row by id. Returns whether the list changed.
    pub fn apply_change(&mut self, change: &RowChange, accept: impl Fn(&T) -> bool) -> bool {
        if change.kind == ChangeKind::Delete {
            return self.remove(&change.id);
        }

        let Some(record) = &change.record else {
            tracing::warn!(
                "{:?} change for {} row {} has no record",
                change.kind,
                change.table,
                change.id
            );
            return false;
        };

        let item: T = match serde_json::from_value(record.clone()) {
            Ok(item) => item,
            Err(error) => {
                tracing::warn!("Could not decode {} row {}: {error}", change.table, change.id);
                return false;
            }
        };

        if !accept(&item) {
            return false;
        }

        match change.kind {
            ChangeKind::Insert => {
                self.upsert(item);
                true
            }
            ChangeKind::Update => match self.position(&change.id) {
                Some(index) => {
                    self.items[index] = item;
                    true
                }
                None => false,
            },
            ChangeKind::Delete => false,
        }
    }

    /// Record the outcome of a fetch, keeping the old rows on failure.
    fn finish_fetch(&mut self, what: &str, result: Result<Vec<T>, ClientError>) {
        self.loading = false;

        match result {
            Ok(items) => {
                self.items = items;
                self.error = None;
            }
            Err(error) => {
                tracing::warn!("Could not fetch {what}, keeping the previous data: {error}");
                self.error = Some(error.to_string());
            }
        }
    }

    fn clear(&mut self) {
        self.items.clear();
        self.loading = false;
        self.error = None;
    }
}

/// The signed-in user's transactions, newest first.
#[derive(Debug)]
pub struct TransactionsHook {
    api: ApiClient,
    user_id: Option<UserId>,
    filter: TransactionFilter,
    local_offset: UtcOffset,
    state: ResourceState<Transaction>,
}

impl TransactionsHook {
    /// Create a hook with no user, listing transactions that match `filter`.
    ///
    /// Periods are counted in UTC until [TransactionsHook::with_local_offset]
    /// sets the offset the server uses.
    pub fn new(api: ApiClient, filter: TransactionFilter) -> Self {
        Self {
            api,
            user_id: None,
            filter,
            local_offset: UtcOffset::UTC,
            state: ResourceState::new(true),
        }
    }

    /// Count the filter's period from today in `offset`.
    pub fn with_local_offset(mut self, offset: UtcOffset) -> Self {
        self.local_offset = offset;
        self
    }

    fn today(&self) -> Date {
        OffsetDateTime::now_utc().to_offset(self.local_offset).date()
    }

    /// Whether `transaction` belongs in the list on `today`.
    fn accepts(&self, transaction: &Transaction, today: Date) -> bool {
        matches_filter(self.user_id.as_ref(), self.filter, today, transaction)
    }

    /// The current rows, loading flag and error.
    pub fn state(&self) -> &ResourceState<Transaction> {
        &self.state
    }

    /// The user whose transactions are shown.
    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    /// Switch to another user and refetch if the user changed.
    pub async fn set_user(&mut self, user_id: Option<UserId>) {
        if self.user_id == user_id {
            return;
        }

        self.user_id = user_id;
        self.refresh().await;
    }

    /// Fetch the transactions again. Without a user the list is emptied.
    pub async fn refresh(&mut self) {
        let Some(user_id) = &self.user_id else {
            self.state.clear();
            return;
        };

        self.state.loading = true;
        let result = self.api.list_transactions(user_id, self.filter).await;
        self.state.finish_fetch("transactions", result);
    }

    /// Record a transaction and add it to the list.
    ///
    /// # Errors
    /// Returns the [ClientError] from the API, which is also kept in the state.
    pub async fn add(&mut self, draft: &TransactionDraft) -> Result<Transaction, ClientError> {
        let result = self.api.create_transaction(draft).await;
        let transaction = self.track(result)?;

        if self.accepts(&transaction, self.today()) {
            self.state.upsert(transaction.clone());
        }

        Ok(transaction)
    }

    /// Change a transaction and replace it in the list, or drop it from the
    /// list if it no longer matches the filter.
    ///
    /// # Errors
    /// Returns the [ClientError] from the API, which is also kept in the state.
    pub async fn update(
        &mut self,
        id: &str,
        patch: &TransactionPatch,
    ) -> Result<Transaction, ClientError> {
        let result = self.api.update_transaction(id, patch).await;
        let transaction = self.track(result)?;

        if self.accepts(&transaction, self.today()) {
            self.state.upsert(transaction.clone());
        } else {
            self.state.remove(&transaction.id);
        }

        Ok(transaction)
    }

    /// Delete a transaction and remove it from the list.
    ///
    /// # Errors
    /// Returns the [ClientError] from the API, which is also kept in the state.
    pub async fn remove(&mut self, id: &str) -> Result<(), ClientError> {
        let result = self.api.delete_transaction(id).await;
        self.track(result)?;
        self.state.remove(id);

        Ok(())
    }

    fn track<T>(&mut self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(error) = &result {
            tracing::warn!("Transaction request failed: {error}");
            self.state.error = Some(error.to_string());
        }

        result
    }

    /// Apply a live change to one of the user's transactions.
    ///
    /// Rows outside the filter's type or period are ignored.
    pub fn apply_change(&mut self, change: &RowChange) -> bool {
        let today = self.today();
        self.apply_change_on(change, today)
    }

    fn apply_change_on(&mut self, change: &RowChange, today: Date) -> bool {
        if change.table != Table::Transactions {
            return false;
        }

        let user_id = self.user_id.clone();
        let filter = self.filter;
        self.state.apply_change(change, |transaction| {
            matches_filter(user_id.as_ref(), filter, today, transaction)
        })
    }
}

fn matches_filter(
    user_id: Option<&UserId>,
    filter: TransactionFilter,
    today: Date,
    transaction: &Transaction,
) -> bool {
    user_id == Some(&transaction.user_id)
        && filter
            .transaction_type
            .is_none_or(|transaction_type| transaction_type == transaction.transaction_type)
        && filter
            .period
            .start_date(today)
            .is_none_or(|start| transaction.transaction_date >= start)
}

/// The conversation between the signed-in user and one contact, oldest first.
#[derive(Debug)]
pub struct MessagesHook {
    api: ApiClient,
    user_id: Option<UserId>,
    contact_id: UserId,
    limit: Option<u32>,
    state: ResourceState<Message>,
}

impl MessagesHook {
    /// Create a hook for the conversation with `contact_id`.
    pub fn new(api: ApiClient, contact_id: UserId, limit: Option<u32>) -> Self {
        Self {
            api,
            user_id: None,
            contact_id,
            limit,
            state: ResourceState::new(false),
        }
    }

    /// The current messages, loading flag and error.
    pub fn state(&self) -> &ResourceState<Message> {
        &self.state
    }

    /// Switch to another user and refetch if the user changed.
    pub async fn set_user(&mut self, user_id: Option<UserId>) {
        if self.user_id == user_id {
            return;
        }

        self.user_id = user_id;
        self.refresh().await;
    }

    /// Fetch the conversation again. Without a user the list is emptied.
    pub async fn refresh(&mut self) {
        let Some(user_id) = &self.user_id else {
            self.state.clear();
            return;
        };

        self.state.loading = true;
        let result = self
            .api
            .list_messages(user_id, &self.contact_id, self.limit)
            .await;
        self.state.finish_fetch("messages", result);
    }

    /// Send a text message to the contact and append it.
    ///
    /// # Errors
    /// Returns [ClientError::Api] with status 401 when no user is signed in,
    /// otherwise the error from the API.
    pub async fn send_text(&mut self, content: &str) -> Result<Message, ClientError> {
        let Some(user_id) = self.user_id.clone() else {
            return Err(ClientError::Api {
                status: 401,
                message: "Unauthorized".to_owned(),
            });
        };

        let draft = MessageDraft::text(user_id, self.contact_id.clone(), content);
        match self.api.send_message(&draft).await {
            Ok(message) => {
                self.state.upsert(message.clone());
                Ok(message)
            }
            Err(error) => {
                tracing::warn!("Could not send the message: {error}");
                self.state.error = Some(error.to_string());
                Err(error)
            }
        }
    }

    /// Apply a live change to a message in this conversation.
    pub fn apply_change(&mut self, change: &RowChange) -> bool {
        if change.table != Table::Messages {
            return false;
        }

        let Some(user_id) = self.user_id.clone() else {
            return false;
        };
        let contact_id = self.contact_id.clone();

        self.state.apply_change(change, |message| {
            (message.sender_id == user_id && message.recipient_id == contact_id)
                || (message.sender_id == contact_id && message.recipient_id == user_id)
        })
    }
}

/// The dashboard summary for the signed-in user.
#[derive(Debug)]
pub struct StatsHook {
    api: ApiClient,
    user_id: Option<UserId>,
    stats: Option<Stats>,
    loading: bool,
    error: Option<String>,
}

impl StatsHook {
    /// Create a hook with no user.
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            user_id: None,
            stats: None,
            loading: false,
            error: None,
        }
    }

    /// The last fetched summary.
    pub fn stats(&self) -> Option<&Stats> {
        self.stats.as_ref()
    }

    /// Whether a fetch is in progress.
    pub fn loading(&self) -> bool {
        self.loading
    }

    /// The error from the last failed fetch.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Switch to another user and refetch if the user changed.
    pub async fn set_user(&mut self, user_id: Option<UserId>) {
        if self.user_id == user_id {
            return;
        }

        self.user_id = user_id;
        self.refresh().await;
    }

    /// Fetch the summary again. Without a user the summary is cleared.
    pub async fn refresh(&mut self) {
        let Some(user_id) = &self.user_id else {
            self.stats = None;
            self.error = None;
            return;
        };

        self.loading = true;
        match self.api.stats(user_id).await {
            Ok(stats) => {
                self.stats = Some(stats);
                self.error = None;
            }
            Err(error) => {
                tracing::warn!("Could not fetch stats, keeping the previous data: {error}");
                self.error = Some(error.to_string());
            }
        }
        self.loading = false;
    }

    /// Refetch the summary after any change to the transactions.
    ///
    /// Returns whether a refetch happened.
    pub async fn on_change(&mut self, change: &RowChange) -> bool {
        if change.table != Table::Transactions || self.user_id.is_none() {
            return false;
        }

        self.refresh().await;
        true
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;
    use serde_json::json;
    use time::{OffsetDateTime, macros::date};

    use crate::{
        ChangeKind, Period, RowChange, Table, TransactionType, UserId,
        client::{
            HttpResponse, TransactionFilter,
            api::{
                TransactionDraft,
                test_utils::{fake_api, transaction_json, url},
            },
        },
    };

    use super::{MessagesHook, StatsHook, TransactionsHook};

    fn change(kind: ChangeKind, id: &str, record: Option<serde_json::Value>) -> RowChange {
        RowChange {
            table: Table::Transactions,
            kind,
            id: id.to_owned(),
            record,
        }
    }

    #[tokio::test]
    async fn set_user_fetches_once_per_user() {
        let (api, network) = fake_api();
        network.reply(
            Method::GET,
            &url("/api/transactions?userId=u1"),
            HttpResponse::json(200, &json!({ "data": [transaction_json("t1", 3.0)] })),
        );
        let mut hook = TransactionsHook::new(api, TransactionFilter::default());

        hook.set_user(Some(UserId::new("u1"))).await;
        hook.set_user(Some(UserId::new("u1"))).await;

        assert_eq!(network.request_count(), 1);
        assert_eq!(hook.state().items.len(), 1);
        assert!(!hook.state().loading);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_stale_rows() {
        let (api, network) = fake_api();
        network.reply(
            Method::GET,
            &url("/api/transactions?userId=u1"),
            HttpResponse::json(200, &json!({ "data": [transaction_json("t1", 3.0)] })),
        );
        let mut hook = TransactionsHook::new(api, TransactionFilter::default());
        hook.set_user(Some(UserId::new("u1"))).await;

        network.reply(
            Method::GET,
            &url("/api/transactions?userId=u1"),
            HttpResponse::json(503, &json!({ "error": "Store not configured", "data": [] })),
        );
        hook.refresh().await;

        assert_eq!(hook.state().items.len(), 1);
        assert_eq!(
            hook.state().error.as_deref(),
            Some("the API responded with 503: Store not configured")
        );
    }

    #[tokio::test]
    async fn signing_out_clears_rows() {
        let (api, network) = fake_api();
        network.reply(
            Method::GET,
            &url("/api/transactions?userId=u1"),
            HttpResponse::json(200, &json!({ "data": [transaction_json("t1", 3.0)] })),
        );
        let mut hook = TransactionsHook::new(api, TransactionFilter::default());
        hook.set_user(Some(UserId::new("u1"))).await;

        hook.set_user(None).await;

        assert!(hook.state().items.is_empty());
    }

    #[tokio::test]
    async fn applies_changes_by_id() {
        let (api, network) = fake_api();
        network.reply(
            Method::GET,
            &url("/api/transactions?userId=u1"),
            HttpResponse::json(200, &json!({ "data": [transaction_json("t1", 3.0)] })),
        );
        let mut hook = TransactionsHook::new(api, TransactionFilter::default());
        hook.set_user(Some(UserId::new("u1"))).await;

        let insert = change(ChangeKind::Insert, "t2", Some(transaction_json("t2", 9.0)));
        let update = change(ChangeKind::Update, "t1", Some(transaction_json("t1", 4.0)));
        assert!(hook.apply_change(&insert));
        assert!(hook.apply_change(&update));
        let ids: Vec<&str> = hook.state().items.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["t2", "t1"]);
        assert_eq!(hook.state().items[1].amount, 4.0);

        assert!(hook.apply_change(&change(ChangeKind::Delete, "t2", None)));
        assert_eq!(hook.state().items.len(), 1);
    }

    #[tokio::test]
    async fn ignores_other_users_rows() {
        let (api, _network) = fake_api();
        let mut hook = TransactionsHook::new(api, TransactionFilter::default());
        hook.set_user(Some(UserId::new("u2"))).await;

        let insert = change(ChangeKind::Insert, "t1", Some(transaction_json("t1", 3.0)));
        let applied = hook.apply_change(&insert);

        assert!(!applied);
        assert!(hook.state().items.is_empty());
    }

    #[tokio::test]
    async fn type_filter_applies_to_live_inserts() {
        let (api, _network) = fake_api();
        let mut hook = TransactionsHook::new(
            api,
            TransactionFilter {
                transaction_type: Some(TransactionType::Income),
                ..Default::default()
            },
        );
        hook.set_user(Some(UserId::new("u1"))).await;

        let insert = change(ChangeKind::Insert, "t1", Some(transaction_json("t1", 3.0)));
        let applied = hook.apply_change(&insert);

        assert!(!applied);
    }

    fn today_hook(api: crate::client::ApiClient) -> TransactionsHook {
        TransactionsHook::new(
            api,
            TransactionFilter {
                period: Period::Today,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn period_filter_rejects_older_live_rows() {
        let (api, network) = fake_api();
        network.reply(
            Method::GET,
            &url("/api/transactions?userId=u1&period=today"),
            HttpResponse::json(200, &json!({ "data": [] })),
        );
        let mut hook = today_hook(api);
        hook.set_user(Some(UserId::new("u1"))).await;

        // Dated 2025-03-05.
        let insert = change(ChangeKind::Insert, "t1", Some(transaction_json("t1", 3.0)));
        let applied = hook.apply_change(&insert);

        assert!(!applied);
        assert!(hook.state().items.is_empty());
    }

    #[tokio::test]
    async fn period_filter_keeps_rows_from_its_start_date() {
        let (api, _network) = fake_api();
        let mut hook = TransactionsHook::new(
            api,
            TransactionFilter {
                period: Period::Week,
                ..Default::default()
            },
        );
        hook.user_id = Some(UserId::new("u1"));

        let on_start = hook.apply_change_on(
            &change(ChangeKind::Insert, "t1", Some(transaction_json("t1", 3.0))),
            date!(2025 - 03 - 12),
        );
        let before_start = hook.apply_change_on(
            &change(ChangeKind::Insert, "t1", Some(transaction_json("t1", 3.0))),
            date!(2025 - 03 - 13),
        );

        assert!(on_start);
        assert!(!before_start);
    }

    #[tokio::test]
    async fn today_hook_accepts_rows_dated_today() {
        let (api, _network) = fake_api();
        let mut hook = today_hook(api);
        hook.user_id = Some(UserId::new("u1"));
        let mut record = transaction_json("t1", 3.0);
        record["transaction_date"] = json!(OffsetDateTime::now_utc().date().to_string());

        let applied = hook.apply_change(&change(ChangeKind::Insert, "t1", Some(record)));

        assert!(applied);
        assert_eq!(hook.state().items.len(), 1);
    }

    #[tokio::test]
    async fn created_row_outside_period_is_not_listed() {
        let (api, network) = fake_api();
        network.reply(
            Method::POST,
            &url("/api/transactions"),
            HttpResponse::json(201, &json!({ "data": transaction_json("t1", 3.0) })),
        );
        let mut hook = today_hook(api);
        hook.user_id = Some(UserId::new("u1"));

        let created = hook
            .add(&TransactionDraft::new(UserId::new("u1"), TransactionType::Expense, 3.0))
            .await
            .unwrap();

        assert_eq!(created.id, "t1");
        assert!(hook.state().items.is_empty());
    }

    #[tokio::test]
    async fn duplicate_insert_replaces_row() {
        let (api, network) = fake_api();
        network.reply(
            Method::POST,
            &url("/api/transactions"),
            HttpResponse::json(201, &json!({ "data": transaction_json("t1", 3.0) })),
        );
        let mut hook = TransactionsHook::new(api, TransactionFilter::default());
        hook.set_user(Some(UserId::new("u1"))).await;

        hook.add(&TransactionDraft::new(UserId::new("u1"), TransactionType::Expense, 3.0))
            .await
            .unwrap();
        hook.apply_change(&change(ChangeKind::Insert, "t1", Some(transaction_json("t1", 3.0))));

        assert_eq!(hook.state().items.len(), 1);
    }

    #[tokio::test]
    async fn messages_append_in_conversation_order() {
        let (api, network) = fake_api();
        network.reply(
            Method::GET,
            &url("/api/messages?userId=u1&contactId=u2"),
            HttpResponse::json(200, &json!({ "data": [] })),
        );
        let mut hook = MessagesHook::new(api, UserId::new("u2"), None);
        hook.set_user(Some(UserId::new("u1"))).await;
        let message = |id: i64, sender: &str, recipient: &str| {
            json!({
                "id": id,
                "sender_id": sender,
                "recipient_id": recipient,
                "message_type": "text",
                "content": "hi",
                "file_url": null,
                "replied_to_message_id": null,
                "metadata": null,
                "created_at": "2025-03-05T08:00:00Z",
                "delivered_at": null,
                "read_at": null
            })
        };
        let insert = |id: i64, record| RowChange {
            table: Table::Messages,
            kind: ChangeKind::Insert,
            id: id.to_string(),
            record: Some(record),
        };

        hook.apply_change(&insert(1, message(1, "u1", "u2")));
        hook.apply_change(&insert(2, message(2, "u2", "u1")));
        let other_conversation = hook.apply_change(&insert(3, message(3, "u3", "u1")));

        assert!(!other_conversation);
        let ids: Vec<i64> = hook.state().items.iter().map(|m| m.id).collect();
        assert_eq!(ids, [1, 2]);
    }

    #[tokio::test]
    async fn stats_refetch_after_transaction_change() {
        let (api, network) = fake_api();
        network.reply(
            Method::GET,
            &url("/api/stats?userId=u1"),
            HttpResponse::json(
                200,
                &json!({ "data": {
                    "today_income": 0.0,
                    "today_expense": 5.0,
                    "month_income": 0.0,
                    "month_expense": 5.0,
                    "total_balance": -5.0
                } }),
            ),
        );
        let mut hook = StatsHook::new(api);
        hook.set_user(Some(UserId::new("u1"))).await;

        let refetched = hook.on_change(&change(ChangeKind::Delete, "t1", None)).await;

        assert!(refetched);
        assert_eq!(network.request_count(), 2);
        assert_eq!(hook.stats().map(|stats| stats.total_balance), Some(-5.0));
    }
}
