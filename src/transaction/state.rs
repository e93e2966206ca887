//! The state shared by the transaction endpoints.

use axum::extract::FromRef;

use crate::{AppState, realtime::ChangeFeed, store::Store};

/// The state needed to list, create, edit or delete transactions.
#[derive(Debug, Clone)]
pub struct TransactionState {
    /// The store holding the transactions.
    pub store: Store,
    /// Where transaction changes are published.
    pub changes: ChangeFeed,
    /// The local timezone as a canonical timezone name, e.g. "Asia/Jakarta".
    pub local_timezone: String,
}

impl FromRef<AppState> for TransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            changes: state.changes.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}
