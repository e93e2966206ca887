//! The message endpoints: listing a conversation, sending, deleting and reading messages.

use axum::{
    Extension,
    extract::{FromRef, State},
    response::Response,
};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    AppState, Error, UserId,
    envelope::{created, non_empty, ok, success},
    extract::{JsonBody, PathParam, QueryParams},
    message::core::{
        MessageId, MessageType, NewMessage, create_message, delete_message,
        delete_messages_sent_by, get_conversation, mark_message_read,
    },
    realtime::{ChangeFeed, ChangeKind, Table},
    store::Store,
};

/// How many messages are returned when the client does not ask for a limit.
pub const DEFAULT_LIMIT: u32 = 50;

/// The state needed by the message endpoints.
#[derive(Debug, Clone)]
pub struct MessageState {
    /// The store holding the messages.
    pub store: Store,
    /// Where message changes are published.
    pub changes: ChangeFeed,
}

impl FromRef<AppState> for MessageState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            changes: state.changes.clone(),
        }
    }
}

/// The query string for [get_messages].
#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    /// One side of the conversation.
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    /// The other side of the conversation.
    #[serde(rename = "contactId")]
    pub contact_id: Option<String>,
    /// The maximum number of messages to return.
    pub limit: Option<u32>,
}

/// A route handler for the latest messages between two users, oldest first.
pub async fn get_messages(
    State(state): State<MessageState>,
    QueryParams(query): QueryParams<ConversationQuery>,
) -> Result<Response, Error> {
    let connection = state.store.connection()?;

    let (Some(user_id), Some(contact_id)) = (non_empty(query.user_id), non_empty(query.contact_id))
    else {
        return Err(Error::Validation(
            "User ID and Contact ID are required".to_owned(),
        ));
    };

    get_conversation(
        &UserId::new(user_id),
        &UserId::new(contact_id),
        query.limit.unwrap_or(DEFAULT_LIMIT),
        &connection,
    )
    .map(ok)
}

/// The JSON body for sending a message.
#[derive(Debug, Default, Deserialize)]
pub struct MessageForm {
    /// The user sending the message.
    pub sender_id: Option<String>,
    /// The user receiving the message.
    pub recipient_id: Option<String>,
    /// Defaults to `image` when a file is attached, otherwise `text`.
    pub message_type: Option<String>,
    /// The text of the message.
    pub content: Option<String>,
    /// Where the attached file is hosted.
    pub file_url: Option<String>,
    /// The message being replied to.
    pub replied_to_message_id: Option<MessageId>,
    /// Free-form data attached by the client.
    pub metadata: Option<Value>,
}

impl MessageForm {
    /// Validate the form and fill in the message type.
    ///
    /// # Errors
    /// Returns an [Error::Validation] naming the first problem found.
    pub fn validate(self) -> Result<NewMessage, Error> {
        let (Some(sender_id), Some(recipient_id)) =
            (non_empty(self.sender_id), non_empty(self.recipient_id))
        else {
            return Err(Error::Validation(
                "Missing required fields: sender_id, recipient_id".to_owned(),
            ));
        };

        let content = non_empty(self.content);
        let file_url = non_empty(self.file_url);

        let message_type = match (non_empty(self.message_type), &content, &file_url) {
            (_, None, None) => {
                return Err(Error::Validation(
                    "Either content or file_url is required".to_owned(),
                ));
            }
            (Some(message_type), _, _) => message_type.parse()?,
            (None, _, Some(_)) => MessageType::Image,
            (None, _, None) => MessageType::Text,
        };

        Ok(NewMessage {
            sender_id: UserId::new(sender_id),
            recipient_id: UserId::new(recipient_id),
            message_type,
            content,
            file_url,
            replied_to_message_id: self.replied_to_message_id,
            metadata: self.metadata.filter(|metadata| !metadata.is_null()),
        })
    }
}

/// A route handler for sending a message.
pub async fn post_message(
    State(state): State<MessageState>,
    JsonBody(form): JsonBody<MessageForm>,
) -> Result<Response, Error> {
    let connection = state.store.connection()?;

    let message = create_message(form.validate()?, &connection)?;
    drop(connection);

    state
        .changes
        .publish_row(Table::Messages, ChangeKind::Insert, message.id, &message);

    Ok(created(message))
}

/// A route handler for deleting every message sent by the current user.
pub async fn delete_all_messages(
    State(state): State<MessageState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Response, Error> {
    let connection = state.store.connection()?;
    let deleted = delete_messages_sent_by(&user_id, &connection)?;
    drop(connection);

    tracing::debug!("Deleted {} messages sent by {user_id}", deleted.len());

    for id in deleted {
        state.changes.publish_delete(Table::Messages, id);
    }

    Ok(success())
}

/// A route handler for deleting a message sent by the current user.
pub async fn delete_message_endpoint(
    State(state): State<MessageState>,
    Extension(user_id): Extension<UserId>,
    PathParam(message_id): PathParam<MessageId>,
) -> Result<Response, Error> {
    let connection = state.store.connection()?;
    delete_message(message_id, &user_id, &connection)?;
    drop(connection);

    state.changes.publish_delete(Table::Messages, message_id);

    Ok(success())
}

/// A route handler for marking a message sent to the current user as read.
pub async fn read_message_endpoint(
    State(state): State<MessageState>,
    Extension(user_id): Extension<UserId>,
    PathParam(message_id): PathParam<MessageId>,
) -> Result<Response, Error> {
    let connection = state.store.connection()?;
    let message = mark_message_read(message_id, &user_id, &connection)?;
    drop(connection);

    state
        .changes
        .publish_row(Table::Messages, ChangeKind::Update, message.id, &message);

    Ok(ok(message))
}
