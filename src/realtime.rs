//! The live change feed.
//!
//! Handlers publish a [RowChange] after every successful insert, update or
//! delete. Subscribers receive the changes as server-sent events from
//! [get_realtime], optionally filtered to one table.

use std::{convert::Infallible, fmt::Display, time::Duration};

use axum::{
    extract::State,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::{Stream, StreamExt, stream};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::extract::QueryParams;

/// The tables whose changes are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    /// Income and expense rows.
    Transactions,
    /// Chat messages.
    Messages,
    /// User profiles.
    Profiles,
    /// Todo items.
    Todos,
}

impl Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Table::Transactions => "transactions",
            Table::Messages => "messages",
            Table::Profiles => "profiles",
            Table::Todos => "todos",
        };

        f.write_str(name)
    }
}

/// What happened to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    /// The row was created.
    Insert,
    /// The row was modified.
    Update,
    /// The row was removed.
    Delete,
}

/// A single row change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    /// The table the row belongs to.
    pub table: Table,
    /// What happened to the row.
    #[serde(rename = "eventType")]
    pub kind: ChangeKind,
    /// The row's primary key.
    pub id: String,
    /// The row after the change, absent for deletions.
    #[serde(rename = "new")]
    pub record: Option<Value>,
}

/// A broadcast channel of [RowChange]s.
///
/// Cloning the feed gives another handle on the same channel.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<RowChange>,
}

impl ChangeFeed {
    /// Create a feed that buffers up to `capacity` changes for each subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);

        Self { sender }
    }

    /// Send `change` to every current subscriber.
    ///
    /// Having no subscribers is not an error.
    pub fn publish(&self, change: RowChange) {
        tracing::debug!("{:?} {} row {}", change.kind, change.table, change.id);
        let _ = self.sender.send(change);
    }

    /// Publish a change for `record`, serializing it as the event payload.
    pub fn publish_row<T: Serialize>(
        &self,
        table: Table,
        kind: ChangeKind,
        id: impl ToString,
        record: &T,
    ) {
        let record = match serde_json::to_value(record) {
            Ok(record) => Some(record),
            Err(error) => {
                tracing::error!("Could not serialize {table} row for the change feed: {error}");
                None
            }
        };

        self.publish(RowChange {
            table,
            kind,
            id: id.to_string(),
            record,
        });
    }

    /// Publish the deletion of the row `id`.
    pub fn publish_delete(&self, table: Table, id: impl ToString) {
        self.publish(RowChange {
            table,
            kind: ChangeKind::Delete,
            id: id.to_string(),
            record: None,
        });
    }

    /// Receive the changes published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RowChange> {
        self.sender.subscribe()
    }
}

/// The query string for [get_realtime].
#[derive(Debug, Deserialize)]
pub struct RealtimeQuery {
    /// Only stream changes to this table.
    pub table: Option<Table>,
}

/// Turn a receiver into a stream of changes, skipping changes a slow
/// subscriber missed.
pub fn change_stream(
    receiver: broadcast::Receiver<RowChange>,
    table: Option<Table>,
) -> impl Stream<Item = RowChange> {
    stream::unfold(receiver, move |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(change) if table.is_none_or(|table| table == change.table) => {
                    return Some((change, receiver));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Live subscriber lagged, skipped {skipped} changes");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

fn to_event(change: RowChange) -> Result<Event, Infallible> {
    match Event::default().event("change").json_data(&change) {
        Ok(event) => Ok(event),
        Err(error) => {
            tracing::error!("Could not encode change event: {error}");
            Ok(Event::default().comment("unencodable change"))
        }
    }
}

/// Stream row changes as server-sent events.
///
/// Each event is named `change` and carries a [RowChange] as JSON data.
pub async fn get_realtime(
    State(feed): State<ChangeFeed>,
    QueryParams(query): QueryParams<RealtimeQuery>,
) -> Response {
    let events = change_stream(feed.subscribe(), query.table).map(to_event);

    Sse::new(events)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}
