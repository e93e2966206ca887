//! The offline layer: a cache worker in front of the network.
//!
//! The [ServiceWorker] pre-caches the app shell on install, drops stale caches
//! on activation and answers requests from the network or the cache depending
//! on the request. A transaction POST made while offline is stored in the
//! [PendingTransactions] queue and replayed by [replay_pending] on the next
//! background sync.

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use reqwest::{Method, Url};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{Value, json};
use time::OffsetDateTime;

use crate::{
    client::network::{HttpRequest, HttpResponse, Network, NetworkError, ResponseType},
    endpoints,
};

/// The name of the current cache. Caches with any other name are deleted on
/// activation.
pub const CACHE_NAME: &str = "kasir-saku-plus-v1";

/// The app shell, cached on install.
pub const SHELL_ASSETS: [&str; 6] = [
    "/",
    "/static/js/bundle.js",
    "/static/css/main.css",
    "/manifest.json",
    "/icon-192x192.png",
    "/icon-512x512.png",
];

/// The background sync tag that replays queued transactions.
pub const SYNC_TAG: &str = "background-sync-transactions";

const APP_NAME: &str = "Kasir Saku Plus";
const NOTIFICATION_ICON: &str = "/icon-192x192.png";
const NOTIFICATION_BADGE: &str = "/icon-96x96.png";

/// Errors from the offline layer.
#[derive(Debug, thiserror::Error)]
pub enum OfflineError {
    /// The network failed and nothing was cached for the request.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// The pending transaction queue could not be read or written.
    #[error("the pending transaction queue failed: {0}")]
    Queue(#[from] rusqlite::Error),

    /// A URL could not be built from the worker's origin.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Named caches of responses, keyed by [HttpRequest::cache_key].
///
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    caches: Arc<Mutex<HashMap<String, HashMap<String, HttpResponse>>>>,
}

impl CacheStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    // Every write replaces whole entries, so a poisoned lock still holds
    // consistent data.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, HashMap<String, HttpResponse>>> {
        self.caches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `response` under `key` in the cache `name`, creating the cache if needed.
    pub fn put(&self, name: &str, key: String, response: HttpResponse) {
        self.lock()
            .entry(name.to_owned())
            .or_default()
            .insert(key, response);
    }

    /// The response stored under `key` in the cache `name`.
    pub fn match_key(&self, name: &str, key: &str) -> Option<HttpResponse> {
        self.lock()
            .get(name)
            .and_then(|cache| cache.get(key))
            .cloned()
    }

    /// The names of every cache.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();

        names
    }

    /// Delete the cache `name`, returning whether it existed.
    pub fn delete(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }

    /// The number of responses in the cache `name`.
    pub fn len(&self, name: &str) -> usize {
        self.lock().get(name).map_or(0, HashMap::len)
    }

    /// Whether the cache `name` is missing or empty.
    pub fn is_empty(&self, name: &str) -> bool {
        self.len(name) == 0
    }
}

/// A transaction POST body waiting to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTransaction {
    /// The position in the queue.
    pub id: i64,
    /// The JSON body of the original request.
    pub body: Vec<u8>,
    /// When the request was queued.
    pub queued_at: OffsetDateTime,
}

/// A SQLite-backed queue of transactions created while offline.
///
/// Clones share the same connection.
#[derive(Debug, Clone)]
pub struct PendingTransactions {
    connection: Arc<Mutex<Connection>>,
}

impl PendingTransactions {
    /// Open the queue stored in the database file at `path`.
    ///
    /// # Errors
    /// Returns an error if the database could not be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OfflineError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Create a queue that lives in memory.
    ///
    /// # Errors
    /// Returns an error if the database could not be initialized.
    pub fn in_memory() -> Result<Self, OfflineError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<Self, OfflineError> {
        connection.execute(
            "CREATE TABLE IF NOT EXISTS pending_transaction (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    body BLOB NOT NULL,
                    queued_at TEXT NOT NULL
                    )",
            (),
        )?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn connection(&self) -> MutexGuard<'_, Connection> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a request body to the end of the queue.
    ///
    /// # Errors
    /// Returns an error if the insert failed.
    pub fn enqueue(&self, body: &[u8]) -> Result<PendingTransaction, OfflineError> {
        let entry = self
            .connection()
            .prepare(
                "INSERT INTO pending_transaction (body, queued_at) VALUES (?1, ?2)
                 RETURNING id, body, queued_at",
            )?
            .query_row((body, OffsetDateTime::now_utc()), |row| {
                Ok(PendingTransaction {
                    id: row.get(0)?,
                    body: row.get(1)?,
                    queued_at: row.get(2)?,
                })
            })?;

        Ok(entry)
    }

    /// Every queued body, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query failed.
    pub fn list(&self) -> Result<Vec<PendingTransaction>, OfflineError> {
        let connection = self.connection();
        let mut statement =
            connection.prepare("SELECT id, body, queued_at FROM pending_transaction ORDER BY id")?;

        let entries = statement
            .query_map([], |row| {
                Ok(PendingTransaction {
                    id: row.get(0)?,
                    body: row.get(1)?,
                    queued_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Remove a queued body. Removing an unknown id does nothing.
    ///
    /// # Errors
    /// Returns an error if the delete failed.
    pub fn remove(&self, id: i64) -> Result<(), OfflineError> {
        self.connection()
            .execute("DELETE FROM pending_transaction WHERE id = ?1", [id])?;

        Ok(())
    }
}

/// The outcome of replaying the pending queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries the server accepted, now removed from the queue.
    pub sent: usize,
    /// Entries the server rejected with a 4xx, removed from the queue.
    pub discarded: usize,
    /// Entries kept for the next sync after a network error or 5xx.
    pub retained: usize,
}

/// POST every queued transaction to `endpoint` in queue order.
///
/// A 2xx response removes the entry. A 4xx can never succeed on replay, so
/// the entry is logged and removed. Network errors and 5xx responses leave
/// the entry in the queue.
///
/// # Errors
/// Returns an error only if the queue itself could not be read or written.
pub async fn replay_pending(
    network: &dyn Network,
    endpoint: &Url,
    queue: &PendingTransactions,
) -> Result<SyncReport, OfflineError> {
    let mut report = SyncReport::default();

    for entry in queue.list()? {
        let request = HttpRequest {
            method: Method::POST,
            url: endpoint.clone(),
            body: Some(entry.body),
        };

        match network.fetch(&request).await {
            Ok(response) if response.is_success() => {
                queue.remove(entry.id)?;
                report.sent += 1;
            }
            Ok(response) if (400..500).contains(&response.status) => {
                tracing::warn!(
                    "Discarding queued transaction {}, the server rejected it with {}: {}",
                    entry.id,
                    response.status,
                    String::from_utf8_lossy(&response.body)
                );
                queue.remove(entry.id)?;
                report.discarded += 1;
            }
            Ok(response) => {
                tracing::warn!(
                    "Could not sync queued transaction {}, the server responded with {}",
                    entry.id,
                    response.status
                );
                report.retained += 1;
            }
            Err(error) => {
                tracing::warn!("Could not sync queued transaction {}: {error}", entry.id);
                report.retained += 1;
            }
        }
    }

    tracing::info!(
        "Background sync finished: {} sent, {} discarded, {} retained",
        report.sent,
        report.discarded,
        report.retained
    );

    Ok(report)
}

/// The lifecycle of a [ServiceWorker].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Created, the shell is not cached yet.
    Installing,
    /// The shell is cached, waiting to take over.
    Installed,
    /// Serving requests.
    Active,
    /// Replaced by a newer worker.
    Redundant,
}

/// A button on an OS notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationAction {
    /// The identifier reported back when the button is clicked.
    pub action: String,
    /// The button label.
    pub title: String,
    /// The button icon.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl NotificationAction {
    pub(crate) fn new(action: &str, title: &str, icon: Option<&str>) -> Self {
        Self {
            action: action.to_owned(),
            title: title.to_owned(),
            icon: icon.map(str::to_owned),
        }
    }
}

/// An OS notification to show.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationOptions {
    /// The notification title.
    pub title: String,
    /// The notification text.
    pub body: String,
    /// The large icon.
    pub icon: String,
    /// The small monochrome icon.
    pub badge: String,
    /// The vibration pattern in milliseconds.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vibrate: Vec<u32>,
    /// Notifications with the same tag replace each other.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Data handed back when the notification is clicked.
    pub data: Value,
    /// The buttons.
    pub actions: Vec<NotificationAction>,
}

/// What to do after a notification was clicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Only close the notification.
    Close,
    /// Close the notification and open the app at this URL.
    Open(String),
}

/// The cache worker.
pub struct ServiceWorker {
    network: Arc<dyn Network>,
    origin: Url,
    caches: CacheStorage,
    pending: PendingTransactions,
    cache_name: String,
    state: WorkerState,
}

impl std::fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("origin", &self.origin.as_str())
            .field("cache_name", &self.cache_name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ServiceWorker {
    /// Create a worker for the app served from `origin`, using [CACHE_NAME].
    pub fn new(
        network: Arc<dyn Network>,
        origin: Url,
        caches: CacheStorage,
        pending: PendingTransactions,
    ) -> Self {
        Self {
            network,
            origin,
            caches,
            pending,
            cache_name: CACHE_NAME.to_owned(),
            state: WorkerState::Installing,
        }
    }

    /// Use `name` as the current cache instead of [CACHE_NAME].
    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    /// The current lifecycle state.
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// The name of the cache the worker reads and writes.
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Cache the app shell.
    ///
    /// An asset that fails to download is logged and skipped, so install
    /// always completes. Returns how many assets were cached.
    ///
    /// # Errors
    /// Returns an error if an asset URL could not be built from the origin.
    pub async fn install(&mut self) -> Result<usize, OfflineError> {
        let mut cached = 0;

        for asset in SHELL_ASSETS {
            let request = HttpRequest::get(self.origin.join(asset)?);

            match self.network.fetch(&request).await {
                Ok(response) if response.is_success() => {
                    self.caches
                        .put(&self.cache_name, request.cache_key(), response);
                    cached += 1;
                }
                Ok(response) => {
                    tracing::error!(
                        "Failed to cache {asset}: the server responded with {}",
                        response.status
                    );
                }
                Err(error) => tracing::error!("Failed to cache {asset}: {error}"),
            }
        }

        tracing::info!("Cached {cached} of {} shell assets", SHELL_ASSETS.len());
        self.state = WorkerState::Installed;

        Ok(cached)
    }

    /// Take over from the previous worker, deleting every cache not named
    /// [Self::cache_name]. Returns the deleted cache names.
    pub fn activate(&mut self) -> Vec<String> {
        let stale: Vec<String> = self
            .caches
            .names()
            .into_iter()
            .filter(|name| *name != self.cache_name)
            .collect();

        for name in &stale {
            tracing::info!("Deleting old cache: {name}");
            self.caches.delete(name);
        }

        self.state = WorkerState::Active;

        stale
    }

    /// Mark the worker as replaced by a newer one.
    pub fn retire(&mut self) {
        self.state = WorkerState::Redundant;
    }

    fn is_api(url: &Url) -> bool {
        url.path().starts_with("/api/")
    }

    fn store(&self, key: String, response: &HttpResponse) {
        if response.status == 200 && response.response_type == ResponseType::Basic {
            self.caches.put(&self.cache_name, key, response.clone());
        }
    }

    fn cached(&self, key: &str) -> Option<HttpResponse> {
        self.caches.match_key(&self.cache_name, key)
    }

    /// Answer `request`.
    ///
    /// GET requests for the app are served cache-first, GET requests for the
    /// API network-first. Either way a same-origin 200 is cached and a network
    /// failure falls back to the cache. A transaction POST that fails with a
    /// network error is queued and answered with a 202.
    ///
    /// # Errors
    /// Returns the [NetworkError] when the network failed and nothing was
    /// cached, or a queue error when an offline POST could not be stored.
    pub async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, OfflineError> {
        if request.method != Method::GET {
            return self.fetch_uncached(request).await;
        }

        let key = request.cache_key();

        if !Self::is_api(&request.url) {
            if let Some(hit) = self.cached(&key) {
                return Ok(hit);
            }
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                self.store(key, &response);
                Ok(response)
            }
            Err(error) => match self.cached(&key) {
                Some(hit) => {
                    tracing::debug!("Network failed, serving {key} from the cache: {error}");
                    Ok(hit)
                }
                None => Err(error.into()),
            },
        }
    }

    async fn fetch_uncached(&self, request: &HttpRequest) -> Result<HttpResponse, OfflineError> {
        match self.network.fetch(request).await {
            Ok(response) => Ok(response),
            Err(error)
                if request.method == Method::POST
                    && request.url.path() == endpoints::TRANSACTIONS_API =>
            {
                let body = request.body.as_deref().unwrap_or_default();
                let entry = self.pending.enqueue(body)?;
                tracing::info!(
                    "Offline, queued transaction {} for background sync: {error}",
                    entry.id
                );

                Ok(HttpResponse {
                    status: 202,
                    response_type: ResponseType::Synthetic,
                    body: json!({ "data": null, "queued": true })
                        .to_string()
                        .into_bytes(),
                })
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Handle a background sync event.
    ///
    /// Only [SYNC_TAG] replays the pending queue; other tags return `None`.
    ///
    /// # Errors
    /// Returns an error if the queue could not be read or written.
    pub async fn handle_sync(&self, tag: &str) -> Result<Option<SyncReport>, OfflineError> {
        if tag != SYNC_TAG {
            tracing::debug!("Ignoring sync event {tag:?}");
            return Ok(None);
        }

        let endpoint = self.origin.join(endpoints::TRANSACTIONS_API)?;

        replay_pending(self.network.as_ref(), &endpoint, &self.pending)
            .await
            .map(Some)
    }

    /// The OS notification for a push event carrying `text`.
    pub fn push_notification(&self, text: Option<&str>) -> NotificationOptions {
        let arrived_at = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;

        NotificationOptions {
            title: APP_NAME.to_owned(),
            body: text
                .map(str::to_owned)
                .unwrap_or_else(|| format!("New notification from {APP_NAME}")),
            icon: NOTIFICATION_ICON.to_owned(),
            badge: NOTIFICATION_BADGE.to_owned(),
            vibrate: vec![100, 50, 100],
            tag: None,
            data: json!({ "dateOfArrival": arrived_at as i64, "primaryKey": 1 }),
            actions: vec![
                NotificationAction::new("explore", "Open app", Some(NOTIFICATION_BADGE)),
                NotificationAction::new("close", "Close", Some(NOTIFICATION_BADGE)),
            ],
        }
    }

    /// Decide what a click on a notification does.
    ///
    /// `close` only closes it. Anything else opens the `url` in the
    /// notification data, or the app root.
    pub fn notification_click(&self, action: Option<&str>, data: &Value) -> ClickOutcome {
        if action == Some("close") {
            return ClickOutcome::Close;
        }

        let url = data
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or("/")
            .to_owned();

        ClickOutcome::Open(url)
    }
}
