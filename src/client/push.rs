//! Push notification registration and display.
//!
//! [NotificationPipeline::register] asks the [PushService] for permission and
//! a token, then registers the token with the API. Nothing in the pipeline is
//! fatal: failures are logged and the pipeline reports itself disabled.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    UserId,
    client::{
        api::ApiClient,
        notification_state::NotificationState,
        offline::{NotificationAction, NotificationOptions},
    },
};

const DEFAULT_TOAST_TITLE: &str = "New message";
const DEFAULT_TOAST_BODY: &str = "You have a new message.";
const DEFAULT_TAG: &str = "default";
const NOTIFICATION_ICON: &str = "/icon-192x192.png";
const NOTIFICATION_BADGE: &str = "/icon-96x96.png";

/// The status written to the notification log after registering a token.
pub const TOKEN_REGISTERED: &str = "token_registered";

/// Why push notifications could not be set up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    /// The user did not allow notifications.
    #[error("notification permission was denied")]
    PermissionDenied,

    /// The push service did not hand out a token.
    #[error("could not get a push token: {0}")]
    Token(String),
}

/// The platform's push service.
#[async_trait]
pub trait PushService: Send + Sync {
    /// Ask the user to allow notifications.
    ///
    /// # Errors
    /// Returns [PushError::PermissionDenied] if the user refused.
    async fn request_permission(&self) -> Result<(), PushError>;

    /// The token the push service delivers this device's messages to.
    ///
    /// # Errors
    /// Returns [PushError::Token] if no token could be obtained.
    async fn get_token(&self) -> Result<String, PushError>;
}

/// A message delivered by the push service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    /// The notification title.
    pub title: Option<String>,
    /// The notification text.
    pub body: Option<String>,
    /// Extra key-value data, e.g. `tag` and `url`.
    #[serde(default)]
    pub data: HashMap<String, String>,
}

/// A short in-app notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    /// The heading.
    pub title: String,
    /// The text under the heading.
    pub description: String,
}

/// Where the pipeline is after [NotificationPipeline::register].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStatus {
    /// Registration has not run yet.
    Idle,
    /// The runtime cannot receive pushes or this is not a production build.
    Unsupported,
    /// Nobody is signed in, so there is no user to register the token for.
    Skipped,
    /// The token is registered.
    Enabled {
        /// The device's push token.
        token: String,
    },
    /// Registration failed; the reason has been logged.
    Disabled {
        /// What went wrong.
        reason: String,
    },
}

/// Registers the device for push notifications and turns push messages into
/// toasts or OS notifications.
#[derive(Debug)]
pub struct NotificationPipeline {
    api: ApiClient,
    production: bool,
    supported: bool,
    status: PipelineStatus,
    inbox: NotificationState,
}

impl NotificationPipeline {
    /// Create a pipeline.
    ///
    /// Registration only runs when the runtime is `supported` and this is a
    /// `production` build.
    pub fn new(api: ApiClient, production: bool, supported: bool) -> Self {
        Self {
            api,
            production,
            supported,
            status: PipelineStatus::Idle,
            inbox: NotificationState::new(),
        }
    }

    /// The outcome of the last registration.
    pub fn status(&self) -> &PipelineStatus {
        &self.status
    }

    /// The messages received in the foreground.
    pub fn inbox(&self) -> &NotificationState {
        &self.inbox
    }

    /// The inbox, e.g. to mark messages as read.
    pub fn inbox_mut(&mut self) -> &mut NotificationState {
        &mut self.inbox
    }

    /// Register this device's push token for `user_id`.
    ///
    /// Returns a toast to show when notifications were enabled.
    pub async fn register(
        &mut self,
        user_id: Option<&UserId>,
        push: &dyn PushService,
    ) -> Option<Toast> {
        self.status = self.try_register(user_id, push).await;

        matches!(self.status, PipelineStatus::Enabled { .. }).then(|| Toast {
            title: "Notifications enabled".to_owned(),
            description: "The app will send you important notifications.".to_owned(),
        })
    }

    async fn try_register(
        &self,
        user_id: Option<&UserId>,
        push: &dyn PushService,
    ) -> PipelineStatus {
        if !self.supported || !self.production {
            tracing::debug!("Push notifications are not available in this build or runtime");
            return PipelineStatus::Unsupported;
        }

        let Some(user_id) = user_id else {
            tracing::debug!("Nobody is signed in, skipping push registration");
            return PipelineStatus::Skipped;
        };

        if let Err(error) = push.request_permission().await {
            tracing::warn!("Push notifications disabled: {error}");
            return PipelineStatus::Disabled {
                reason: error.to_string(),
            };
        }

        let token = match push.get_token().await {
            Ok(token) => token,
            Err(error) => {
                tracing::warn!("Push notifications disabled: {error}");
                return PipelineStatus::Disabled {
                    reason: error.to_string(),
                };
            }
        };

        if let Err(error) = self.api.register_fcm_token(user_id, &token).await {
            tracing::warn!("Could not register the push token: {error}");
            return PipelineStatus::Disabled {
                reason: error.to_string(),
            };
        }

        if let Err(error) = self
            .api
            .log_notification(
                Some(user_id),
                TOKEN_REGISTERED,
                Some(json!({ "token": token })),
            )
            .await
        {
            tracing::warn!("Could not log the token registration: {error}");
        }

        tracing::info!("Push notifications enabled for user {user_id}");

        PipelineStatus::Enabled { token }
    }

    /// Show a message received while the app is open as a toast and keep it
    /// in the inbox.
    pub fn foreground(&mut self, message: &PushMessage) -> Toast {
        let toast = Toast {
            title: message
                .title
                .clone()
                .unwrap_or_else(|| DEFAULT_TOAST_TITLE.to_owned()),
            description: message
                .body
                .clone()
                .unwrap_or_else(|| DEFAULT_TOAST_BODY.to_owned()),
        };

        self.inbox
            .add_message(&toast.description, &toast.title, false);

        toast
    }
}

/// The OS notification for a message received while the app is closed.
pub fn background_notification(message: &PushMessage) -> NotificationOptions {
    NotificationOptions {
        title: message.title.clone().unwrap_or_default(),
        body: message.body.clone().unwrap_or_default(),
        icon: NOTIFICATION_ICON.to_owned(),
        badge: NOTIFICATION_BADGE.to_owned(),
        vibrate: Vec::new(),
        tag: Some(
            message
                .data
                .get("tag")
                .cloned()
                .unwrap_or_else(|| DEFAULT_TAG.to_owned()),
        ),
        data: json!(message.data),
        actions: vec![NotificationAction::new("open", "Open app", None)],
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use async_trait::async_trait;
    use reqwest::Method;
    use serde_json::{Value, json};

    use crate::{
        UserId,
        client::{
            HttpResponse,
            api::test_utils::{fake_api, url},
        },
    };

    use super::{
        NotificationPipeline, PipelineStatus, PushError, PushMessage, PushService,
        background_notification,
    };

    struct FakePush {
        permission: Result<(), PushError>,
        token: Result<String, PushError>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl FakePush {
        fn granting(token: &str) -> Self {
            Self {
                permission: Ok(()),
                token: Ok(token.to_owned()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PushService for FakePush {
        async fn request_permission(&self) -> Result<(), PushError> {
            self.calls.lock().unwrap().push("permission");
            self.permission.clone()
        }

        async fn get_token(&self) -> Result<String, PushError> {
            self.calls.lock().unwrap().push("token");
            self.token.clone()
        }
    }

    fn registered_token_reply() -> HttpResponse {
        HttpResponse::json(
            201,
            &json!({ "data": {
                "id": "r1",
                "user_id": "u1",
                "token": "tok",
                "created_at": "2025-03-05T08:00:00Z"
            } }),
        )
    }

    fn log_reply() -> HttpResponse {
        HttpResponse::json(
            201,
            &json!({ "data": {
                "id": "l1",
                "user_id": "u1",
                "status": "token_registered",
                "details": { "token": "tok" },
                "created_at": "2025-03-05T08:00:00Z"
            } }),
        )
    }

    #[tokio::test]
    async fn registers_token_and_logs_it() {
        let (api, network) = fake_api();
        network.reply(Method::POST, &url("/api/fcm-tokens"), registered_token_reply());
        network.reply(Method::POST, &url("/api/notification-logs"), log_reply());
        let mut pipeline = NotificationPipeline::new(api, true, true);

        let toast = pipeline
            .register(Some(&UserId::new("u1")), &FakePush::granting("tok"))
            .await;

        assert!(toast.is_some());
        assert_eq!(
            pipeline.status(),
            &PipelineStatus::Enabled {
                token: "tok".to_owned()
            }
        );
        let requests = network.requests();
        let token_body: Value = serde_json::from_slice(requests[0].body.as_ref().unwrap()).unwrap();
        assert_eq!(token_body, json!({ "token": "tok", "user_id": "u1" }));
        let log_body: Value = serde_json::from_slice(requests[1].body.as_ref().unwrap()).unwrap();
        assert_eq!(log_body["status"], "token_registered");
    }

    #[tokio::test]
    async fn skips_without_user() {
        let (api, network) = fake_api();
        let mut pipeline = NotificationPipeline::new(api, true, true);
        let push = FakePush::granting("tok");

        pipeline.register(None, &push).await;

        assert_eq!(pipeline.status(), &PipelineStatus::Skipped);
        assert!(push.calls.lock().unwrap().is_empty());
        assert_eq!(network.request_count(), 0);
    }

    #[tokio::test]
    async fn development_builds_do_not_register() {
        let (api, _) = fake_api();
        let mut pipeline = NotificationPipeline::new(api, false, true);

        pipeline
            .register(Some(&UserId::new("u1")), &FakePush::granting("tok"))
            .await;

        assert_eq!(pipeline.status(), &PipelineStatus::Unsupported);
    }

    #[tokio::test]
    async fn permission_denial_disables_quietly() {
        let (api, network) = fake_api();
        let mut pipeline = NotificationPipeline::new(api, true, true);
        let push = FakePush {
            permission: Err(PushError::PermissionDenied),
            ..FakePush::granting("tok")
        };

        let toast = pipeline.register(Some(&UserId::new("u1")), &push).await;

        assert_eq!(toast, None);
        assert!(matches!(pipeline.status(), PipelineStatus::Disabled { .. }));
        assert_eq!(*push.calls.lock().unwrap(), ["permission"]);
        assert_eq!(network.request_count(), 0);
    }

    #[tokio::test]
    async fn registration_failure_disables_quietly() {
        let (api, network) = fake_api();
        network.reply(
            Method::POST,
            &url("/api/fcm-tokens"),
            HttpResponse::json(503, &json!({ "error": "Store not configured", "data": [] })),
        );
        let mut pipeline = NotificationPipeline::new(api, true, true);

        pipeline
            .register(Some(&UserId::new("u1")), &FakePush::granting("tok"))
            .await;

        assert!(matches!(pipeline.status(), PipelineStatus::Disabled { .. }));
        assert_eq!(network.request_count(), 1);
    }

    #[tokio::test]
    async fn log_failure_keeps_pipeline_enabled() {
        let (api, network) = fake_api();
        network.reply(Method::POST, &url("/api/fcm-tokens"), registered_token_reply());
        let mut pipeline = NotificationPipeline::new(api, true, true);

        pipeline
            .register(Some(&UserId::new("u1")), &FakePush::granting("tok"))
            .await;

        assert!(matches!(pipeline.status(), PipelineStatus::Enabled { .. }));
    }

    #[test]
    fn foreground_toast_defaults() {
        let (api, _) = fake_api();
        let mut pipeline = NotificationPipeline::new(api, true, true);

        let toast = pipeline.foreground(&PushMessage::default());

        assert_eq!(toast.title, "New message");
        assert_eq!(toast.description, "You have a new message.");
        assert_eq!(pipeline.inbox().unread_count(), 1);
    }

    #[test]
    fn background_notification_uses_payload() {
        let message = PushMessage {
            title: Some("Budget".to_owned()),
            body: Some("You spent 50.000 today".to_owned()),
            data: HashMap::from([("url".to_owned(), "/reports".to_owned())]),
        };

        let notification = background_notification(&message);

        assert_eq!(notification.title, "Budget");
        assert_eq!(notification.tag.as_deref(), Some("default"));
        assert_eq!(notification.data, json!({ "url": "/reports" }));
        assert_eq!(notification.actions[0].action, "open");
        assert_eq!(notification.actions[0].title, "Open app");
    }

    #[test]
    fn background_notification_keeps_tag() {
        let message = PushMessage {
            data: HashMap::from([("tag".to_owned(), "chat".to_owned())]),
            ..Default::default()
        };

        assert_eq!(background_notification(&message).tag.as_deref(), Some("chat"));
    }
}
