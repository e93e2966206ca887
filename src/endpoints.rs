//! The API endpoints URIs.
//!
//! For endpoints that take a parameter, e.g., '/api/messages/{message_id}', use [format_endpoint].

/// The route for registering a new user.
pub const USERS: &str = "/api/users";
/// The route for logging in a user.
pub const LOG_IN_API: &str = "/api/log_in";
/// The route for the client to log out the current user.
pub const LOG_OUT: &str = "/api/log_out";
/// The route to list, create, update and delete transactions.
pub const TRANSACTIONS_API: &str = "/api/transactions";
/// The route to update or delete a single transaction.
pub const TRANSACTION: &str = "/api/transactions/{transaction_id}";
/// The route to list and create messages.
pub const MESSAGES_API: &str = "/api/messages";
/// The route to delete every message sent by the current user.
pub const DELETE_ALL_MESSAGES: &str = "/api/messages/delete-all";
/// The route to delete a single message.
pub const MESSAGE: &str = "/api/messages/{message_id}";
/// The route to mark a single message as read.
pub const READ_MESSAGE: &str = "/api/messages/{message_id}/read";
/// The route to get and upsert profiles.
pub const PROFILES_API: &str = "/api/profiles";
/// The route to list, create, update and delete todos.
pub const TODOS_API: &str = "/api/todos";
/// The route to list, register and delete push tokens.
pub const FCM_TOKENS_API: &str = "/api/fcm-tokens";
/// The route to list and append notification logs.
pub const NOTIFICATION_LOGS_API: &str = "/api/notification-logs";
/// The route for the income/expense summary.
pub const STATS_API: &str = "/api/stats";
/// The route for period reports.
pub const REPORTS_API: &str = "/api/reports";
/// The route for checking the store connection.
pub const STORE_HEALTH: &str = "/api/health/store";
/// The route for the live row change stream.
pub const REALTIME: &str = "/api/realtime";

/// Replace the parameter in `endpoint_path` with `id`.
///
/// A parameter is a string that starts with a left brace, followed by
/// lowercase letters or underscores, and ends with a right brace.
/// For example, in the endpoint path '/api/messages/{message_id}', '{message_id}' is the parameter.
///
/// This function assumes that an endpoint path only contains ASCII characters
/// and a single parameter.
///
/// If no parameter is found in `endpoint_path`, the function returns the
/// the original `endpoint_path`.
pub fn format_endpoint(endpoint_path: &str, id: impl std::fmt::Display) -> String {
    let Some(param_start) = endpoint_path.find('{') else {
        return endpoint_path.to_owned();
    };

    let param_end = endpoint_path[param_start..]
        .find('}')
        .map(|end| param_start + end + 1)
        .unwrap_or(endpoint_path.len());

    format!(
        "{}{}{}",
        &endpoint_path[..param_start],
        id,
        &endpoint_path[param_end..]
    )
}

// These tests are here so that we know when we call `Uri::from_shared` it will not panic.
#[cfg(test)]
mod endpoints_tests {
    use axum::http::Uri;

    use crate::endpoints;

    use super::format_endpoint;

    fn assert_endpoint_is_valid_uri(uri: &str) {
        assert!(uri.parse::<Uri>().is_ok());
    }

    #[test]
    fn endpoints_are_valid_uris() {
        assert_endpoint_is_valid_uri(endpoints::USERS);
        assert_endpoint_is_valid_uri(endpoints::LOG_IN_API);
        assert_endpoint_is_valid_uri(endpoints::LOG_OUT);
        assert_endpoint_is_valid_uri(endpoints::TRANSACTIONS_API);
        assert_endpoint_is_valid_uri(endpoints::TRANSACTION);
        assert_endpoint_is_valid_uri(endpoints::MESSAGES_API);
        assert_endpoint_is_valid_uri(endpoints::DELETE_ALL_MESSAGES);
        assert_endpoint_is_valid_uri(endpoints::MESSAGE);
        assert_endpoint_is_valid_uri(endpoints::READ_MESSAGE);
        assert_endpoint_is_valid_uri(endpoints::PROFILES_API);
        assert_endpoint_is_valid_uri(endpoints::TODOS_API);
        assert_endpoint_is_valid_uri(endpoints::FCM_TOKENS_API);
        assert_endpoint_is_valid_uri(endpoints::NOTIFICATION_LOGS_API);
        assert_endpoint_is_valid_uri(endpoints::STATS_API);
        assert_endpoint_is_valid_uri(endpoints::REPORTS_API);
        assert_endpoint_is_valid_uri(endpoints::STORE_HEALTH);
        assert_endpoint_is_valid_uri(endpoints::REALTIME);
    }

    #[test]
    fn produces_valid_uri() {
        let formatted_path = format_endpoint("/hello/{world_id}", 1);

        assert_eq!(formatted_path, "/hello/1");
        assert!(formatted_path.parse::<Uri>().is_ok());

        // Parameter with single word should also work.
        let formatted_path = format_endpoint("/hello/{world}", 1);

        assert_eq!(formatted_path, "/hello/1");
        assert!(formatted_path.parse::<Uri>().is_ok());
    }

    #[test]
    fn accepts_string_ids() {
        let formatted_path = format_endpoint(endpoints::TRANSACTION, "5f0c9a4e");

        assert_eq!(formatted_path, "/api/transactions/5f0c9a4e");
    }

    #[test]
    fn returns_original_path_with_no_parameter() {
        let formatted_path = format_endpoint("/hello/world", 1);

        assert_eq!(formatted_path, "/hello/world");
        assert!(formatted_path.parse::<Uri>().is_ok());
    }

    #[test]
    fn parameter_in_middle() {
        let formatted_path = format_endpoint(endpoints::READ_MESSAGE, 7);

        assert_eq!(formatted_path, "/api/messages/7/read");
        assert!(formatted_path.parse::<Uri>().is_ok());
    }
}
