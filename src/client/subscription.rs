//! The client side of the live change feed.
//!
//! [SseDecoder] turns the server-sent event stream from `/api/realtime` into
//! [RowChange]s and [ChangeDispatcher] hands each change to the handlers
//! registered for its kind.

use std::collections::HashMap;

use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::{
    ChangeKind, RowChange, Table,
    client::network::{NetworkError, ReqwestNetwork},
    endpoints,
};

type Handler = Box<dyn FnMut(&RowChange) + Send>;

struct Registration {
    table: Option<Table>,
    handler: Handler,
}

/// A registry of change handlers keyed by [ChangeKind].
#[derive(Default)]
pub struct ChangeDispatcher {
    handlers: HashMap<ChangeKind, Vec<Registration>>,
}

impl std::fmt::Debug for ChangeDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&ChangeKind, usize> = self
            .handlers
            .iter()
            .map(|(kind, registrations)| (kind, registrations.len()))
            .collect();

        f.debug_struct("ChangeDispatcher")
            .field("handlers", &counts)
            .finish()
    }
}

impl ChangeDispatcher {
    /// Create a dispatcher with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `handler` for every change of `kind`, whatever the table.
    pub fn on(&mut self, kind: ChangeKind, handler: impl FnMut(&RowChange) + Send + 'static) {
        self.register(kind, None, handler);
    }

    /// Call `handler` for every change of `kind` to `table`.
    pub fn on_table(
        &mut self,
        table: Table,
        kind: ChangeKind,
        handler: impl FnMut(&RowChange) + Send + 'static,
    ) {
        self.register(kind, Some(table), handler);
    }

    /// Send every change to `table` down `sender`, e.g. to a task that owns
    /// the hook for that table.
    ///
    /// Changes are dropped once the receiving end is closed.
    pub fn forward(&mut self, table: Table, sender: mpsc::UnboundedSender<RowChange>) {
        for kind in [ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete] {
            let sender = sender.clone();
            self.on_table(table, kind, move |change| {
                let _ = sender.send(change.clone());
            });
        }
    }

    fn register(
        &mut self,
        kind: ChangeKind,
        table: Option<Table>,
        handler: impl FnMut(&RowChange) + Send + 'static,
    ) {
        self.handlers.entry(kind).or_default().push(Registration {
            table,
            handler: Box::new(handler),
        });
    }

    /// Pass `change` to the matching handlers in registration order.
    ///
    /// Returns how many handlers were called.
    pub fn dispatch(&mut self, change: &RowChange) -> usize {
        let Some(registrations) = self.handlers.get_mut(&change.kind) else {
            return 0;
        };

        let mut called = 0;
        for registration in registrations
            .iter_mut()
            .filter(|registration| registration.table.is_none_or(|table| table == change.table))
        {
            (registration.handler)(change);
            called += 1;
        }

        called
    }
}

/// Decodes a server-sent event stream into [RowChange]s.
///
/// Chunks may split lines and events anywhere; incomplete input is buffered
/// until the rest arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Create a decoder with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of the stream and return the completed changes.
    ///
    /// Events that are not `change` events and payloads that do not decode
    /// are skipped.
    pub fn push(&mut self, chunk: &str) -> Vec<RowChange> {
        self.buffer.push_str(chunk);
        let mut changes = Vec::new();

        while let Some(line_end) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=line_end).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                changes.extend(self.finish_event());
            } else if line.starts_with(':') {
                continue;
            } else {
                let (field, value) = line.split_once(':').unwrap_or((line, ""));
                let value = value.strip_prefix(' ').unwrap_or(value);

                match field {
                    "event" => self.event = Some(value.to_owned()),
                    "data" => self.data.push(value.to_owned()),
                    _ => {}
                }
            }
        }

        changes
    }

    fn finish_event(&mut self) -> Option<RowChange> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data);

        if data.is_empty() || event.as_deref().is_some_and(|event| event != "change") {
            return None;
        }

        match serde_json::from_str(&data.join("\n")) {
            Ok(change) => Some(change),
            Err(error) => {
                tracing::warn!("Skipping a change event that could not be decoded: {error}");
                None
            }
        }
    }
}

/// Stream changes from the server into `dispatcher` until the server closes
/// the connection.
///
/// # Errors
/// Returns a [NetworkError] if the stream could not be opened or broke off.
pub async fn listen(
    network: &ReqwestNetwork,
    table: Option<Table>,
    dispatcher: &mut ChangeDispatcher,
) -> Result<(), NetworkError> {
    let mut url = network
        .origin()
        .join(endpoints::REALTIME)
        .map_err(|error| NetworkError::InvalidRequest(error.to_string()))?;
    if let Some(table) = table {
        url.query_pairs_mut().append_pair("table", &table.to_string());
    }

    let response = network
        .client()
        .get(url)
        .send()
        .await
        .map_err(|error| NetworkError::Unreachable(error.to_string()))?;
    let mut chunks = response.bytes_stream();
    let mut decoder = SseDecoder::new();
    // Bytes after the last newline, which may end inside a UTF-8 sequence.
    let mut pending: Vec<u8> = Vec::new();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|error| NetworkError::Unreachable(error.to_string()))?;
        pending.extend_from_slice(&chunk);

        let Some(last_newline) = pending.iter().rposition(|byte| *byte == b'\n') else {
            continue;
        };
        let complete: Vec<u8> = pending.drain(..=last_newline).collect();

        for change in decoder.push(&String::from_utf8_lossy(&complete)) {
            dispatcher.dispatch(&change);
        }
    }

    tracing::info!("The change feed was closed by the server");

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use crate::{ChangeKind, RowChange, Table};

    use super::{ChangeDispatcher, SseDecoder};

    fn change(table: Table, kind: ChangeKind, id: &str) -> RowChange {
        RowChange {
            table,
            kind,
            id: id.to_owned(),
            record: None,
        }
    }

    #[test]
    fn dispatches_by_kind() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = ChangeDispatcher::new();
        let inserts = seen.clone();
        dispatcher.on(ChangeKind::Insert, move |change| {
            inserts.lock().unwrap().push(format!("insert {}", change.id))
        });
        let deletes = seen.clone();
        dispatcher.on(ChangeKind::Delete, move |change| {
            deletes.lock().unwrap().push(format!("delete {}", change.id))
        });

        dispatcher.dispatch(&change(Table::Todos, ChangeKind::Insert, "1"));
        let called = dispatcher.dispatch(&change(Table::Todos, ChangeKind::Update, "1"));
        dispatcher.dispatch(&change(Table::Todos, ChangeKind::Delete, "1"));

        assert_eq!(called, 0);
        assert_eq!(*seen.lock().unwrap(), ["insert 1", "delete 1"]);
    }

    #[test]
    fn table_handlers_ignore_other_tables() {
        let count = Arc::new(Mutex::new(0));
        let mut dispatcher = ChangeDispatcher::new();
        let counter = count.clone();
        dispatcher.on_table(Table::Messages, ChangeKind::Insert, move |_| {
            *counter.lock().unwrap() += 1
        });

        dispatcher.dispatch(&change(Table::Transactions, ChangeKind::Insert, "t1"));
        dispatcher.dispatch(&change(Table::Messages, ChangeKind::Insert, "1"));

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn forwards_table_changes_to_a_channel() {
        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
        let mut dispatcher = ChangeDispatcher::new();
        dispatcher.forward(Table::Transactions, sender);

        dispatcher.dispatch(&change(Table::Transactions, ChangeKind::Update, "t1"));
        dispatcher.dispatch(&change(Table::Todos, ChangeKind::Update, "1"));
        dispatcher.dispatch(&change(Table::Transactions, ChangeKind::Delete, "t1"));

        assert_eq!(receiver.try_recv().unwrap().kind, ChangeKind::Update);
        assert_eq!(receiver.try_recv().unwrap().kind, ChangeKind::Delete);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn decodes_events_split_across_chunks() {
        let event = format!(
            "event: change\ndata: {}\n\n",
            json!({ "table": "todos", "eventType": "INSERT", "id": "1", "new": { "id": 1 } })
        );
        let (first, second) = event.split_at(20);
        let mut decoder = SseDecoder::new();

        assert!(decoder.push(first).is_empty());
        let changes = decoder.push(second);

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Insert);
        assert_eq!(changes[0].record, Some(json!({ "id": 1 })));
    }

    #[test]
    fn skips_comments_and_bad_payloads() {
        let mut decoder = SseDecoder::new();

        let changes = decoder.push(concat!(
            ":keep-alive\n\n",
            "event: change\ndata: not json\n\n",
            "event: change\r\n",
            "data: {\"table\":\"messages\",\"eventType\":\"DELETE\",",
            "\"id\":\"7\",\"new\":null}\r\n\r\n",
        ));

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].id, "7");
        assert_eq!(changes[0].table, Table::Messages);
    }

    #[test]
    fn ignores_other_event_names() {
        let mut decoder = SseDecoder::new();

        let changes = decoder.push("event: ping\ndata: {}\n\n");

        assert!(changes.is_empty());
    }
}
