//! Application router configuration with protected and unprotected route definitions.

use std::path::Path;

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use tower_http::services::ServeDir;

use crate::{
    AppState,
    auth::{auth_guard, post_log_in, post_log_out, register_user},
    endpoints,
    fcm_token::{delete_fcm_token_endpoint, get_fcm_tokens, post_fcm_token},
    health::get_store_health,
    logging::logging_middleware,
    message::{
        delete_all_messages, delete_message_endpoint, get_messages, post_message,
        read_message_endpoint,
    },
    notification_log::{get_notification_logs, post_notification_log},
    profile::{get_profiles, post_profile},
    realtime::get_realtime,
    report::{get_report, get_stats},
    todo::{delete_todo_endpoint, get_todos, post_todo, put_todo},
    transaction::{
        delete_transaction_by_id, delete_transaction_by_query, get_transactions,
        post_transaction, put_transaction, put_transaction_by_id,
    },
};

/// Return a router with all the app's routes.
///
/// Editing and deleting transactions and messages requires a session, every
/// other route is open. Paths that are not API routes are served from
/// `static_dir`.
pub fn build_router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    let session = middleware::from_fn_with_state(state.clone(), auth_guard);

    let auth_routes = Router::new()
        .route(endpoints::USERS, post(register_user))
        .route(endpoints::LOG_IN_API, post(post_log_in))
        .route(endpoints::LOG_OUT, post(post_log_out));

    let transaction_routes = Router::new()
        .route(
            endpoints::TRANSACTIONS_API,
            get(get_transactions).post(post_transaction).merge(
                put(put_transaction)
                    .delete(delete_transaction_by_query)
                    .route_layer(session.clone()),
            ),
        )
        .route(
            endpoints::TRANSACTION,
            put(put_transaction_by_id)
                .delete(delete_transaction_by_id)
                .route_layer(session.clone()),
        );

    let message_routes = Router::new()
        .route(
            endpoints::MESSAGES_API,
            get(get_messages).post(post_message),
        )
        .route(
            endpoints::DELETE_ALL_MESSAGES,
            delete(delete_all_messages).route_layer(session.clone()),
        )
        .route(
            endpoints::MESSAGE,
            delete(delete_message_endpoint).route_layer(session.clone()),
        )
        .route(
            endpoints::READ_MESSAGE,
            put(read_message_endpoint).route_layer(session),
        );

    let resource_routes = Router::new()
        .route(
            endpoints::PROFILES_API,
            get(get_profiles).post(post_profile),
        )
        .route(
            endpoints::TODOS_API,
            get(get_todos)
                .post(post_todo)
                .put(put_todo)
                .delete(delete_todo_endpoint),
        )
        .route(
            endpoints::FCM_TOKENS_API,
            get(get_fcm_tokens)
                .post(post_fcm_token)
                .delete(delete_fcm_token_endpoint),
        )
        .route(
            endpoints::NOTIFICATION_LOGS_API,
            get(get_notification_logs).post(post_notification_log),
        )
        .route(endpoints::STATS_API, get(get_stats))
        .route(endpoints::REPORTS_API, get(get_report))
        .route(endpoints::STORE_HEALTH, get(get_store_health))
        .route(endpoints::REALTIME, get(get_realtime));

    auth_routes
        .merge(transaction_routes)
        .merge(message_routes)
        .merge(resource_routes)
        .fallback_service(ServeDir::new(static_dir))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state)
}
