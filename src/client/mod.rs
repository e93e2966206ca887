//! The client side of Kasir Saku.
//!
//! Everything here talks to the API through the [Network] port:
//!
//! - [ApiClient] makes typed calls to the JSON API.
//! - The hooks ([TransactionsHook], [MessagesHook], [StatsHook]) keep local
//!   state for one resource and apply live [RowChange](crate::RowChange)s
//!   received through a [ChangeDispatcher].
//! - [ServiceWorker] implements the offline cache, the request queue that is
//!   replayed on background sync, and the OS notifications shown for pushes.
//! - [NotificationPipeline] registers the device for push notifications and
//!   turns push messages into toasts or OS notifications, tracked in a
//!   [NotificationState].

mod api;
mod hooks;
mod network;
mod notification_state;
mod offline;
mod push;
mod subscription;

pub use api::{ApiClient, MessageDraft, TransactionDraft, TransactionFilter, TransactionPatch};
pub use hooks::{Keyed, MessagesHook, ResourceState, StatsHook, TransactionsHook};
pub use network::{HttpRequest, HttpResponse, Network, NetworkError, ReqwestNetwork, ResponseType};
pub use notification_state::{NotificationState, ReceivedMessage};
pub use offline::{
    CACHE_NAME, CacheStorage, ClickOutcome, NotificationAction, NotificationOptions, OfflineError,
    PendingTransaction, PendingTransactions, SHELL_ASSETS, SYNC_TAG, ServiceWorker, SyncReport,
    WorkerState, replay_pending,
};
pub use push::{
    NotificationPipeline, PipelineStatus, PushError, PushMessage, PushService, TOKEN_REGISTERED,
    Toast, background_notification,
};
pub use subscription::{ChangeDispatcher, SseDecoder, listen};

/// The errors a client call may end with.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    /// No response was received.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// The API answered with an error status.
    ///
    /// `message` is the `error` field of the response body.
    #[error("the API responded with {status}: {message}")]
    Api {
        /// The HTTP status code.
        status: u16,
        /// The error message from the response body.
        message: String,
    },

    /// The response body was not the expected JSON.
    #[error("could not decode the response: {0}")]
    Decode(String),

    /// The request URL could not be built.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(value: serde_json::Error) -> Self {
        ClientError::Decode(value.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(value: url::ParseError) -> Self {
        ClientError::InvalidUrl(value.to_string())
    }
}
