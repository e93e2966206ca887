//! Defines the core message data types and database queries.

use std::str::FromStr;

use rusqlite::{Connection, OptionalExtension, Row, types::Type};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::{Error, UserId, db::parse_text_column};

// ============================================================================
// MODELS
// ============================================================================

/// The database ID of a message.
pub type MessageId = i64;

/// What a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Plain text.
    Text,
    /// An attached image.
    Image,
    /// An attached voice note or audio file.
    Audio,
    /// Any other attached file.
    Document,
}

impl MessageType {
    /// The name stored in the database and sent over the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Audio => "audio",
            MessageType::Document => "document",
        }
    }
}

impl FromStr for MessageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "audio" => Ok(MessageType::Audio),
            "document" => Ok(MessageType::Document),
            _ => Err(Error::Validation(
                "Message type must be one of text, image, audio or document".to_owned(),
            )),
        }
    }
}

/// A message sent from one user to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The ID of the message.
    pub id: MessageId,
    /// The user who sent the message.
    pub sender_id: UserId,
    /// The user the message was sent to.
    pub recipient_id: UserId,
    /// What the message carries.
    pub message_type: MessageType,
    /// The text of the message.
    pub content: Option<String>,
    /// Where the attached file is hosted.
    pub file_url: Option<String>,
    /// The message this message replies to.
    pub replied_to_message_id: Option<MessageId>,
    /// Free-form data attached by the client.
    pub metadata: Option<Value>,
    /// When the message was sent.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the message reached the recipient's device.
    #[serde(with = "time::serde::rfc3339::option")]
    pub delivered_at: Option<OffsetDateTime>,
    /// When the recipient read the message.
    #[serde(with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
}

/// A validated message that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    /// The user sending the message.
    pub sender_id: UserId,
    /// The user receiving the message.
    pub recipient_id: UserId,
    /// What the message carries.
    pub message_type: MessageType,
    /// The text of the message.
    pub content: Option<String>,
    /// Where the attached file is hosted.
    pub file_url: Option<String>,
    /// The message being replied to.
    pub replied_to_message_id: Option<MessageId>,
    /// Free-form data attached by the client.
    pub metadata: Option<Value>,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

const MESSAGE_COLUMNS: &str = "id, sender_id, recipient_id, message_type, content, file_url, \
    replied_to_message_id, metadata, created_at, delivered_at, read_at";

/// Create the message table.
///
/// # Errors
/// Returns an error if the SQL query failed.
pub fn create_message_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS message (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id TEXT NOT NULL,
                recipient_id TEXT NOT NULL,
                message_type TEXT NOT NULL DEFAULT 'text',
                content TEXT,
                file_url TEXT,
                replied_to_message_id INTEGER,
                metadata TEXT,
                created_at TEXT NOT NULL,
                delivered_at TEXT,
                read_at TEXT,
                FOREIGN KEY(replied_to_message_id) REFERENCES message(id) ON DELETE SET NULL
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_message_pair
            ON message(sender_id, recipient_id, created_at);",
        (),
    )?;

    Ok(())
}

fn map_message_row(row: &Row) -> Result<Message, rusqlite::Error> {
    let sender_id: String = row.get(1)?;
    let recipient_id: String = row.get(2)?;
    let metadata: Option<String> = row.get(7)?;
    let metadata = metadata
        .map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, error.into()))?;

    Ok(Message {
        id: row.get(0)?,
        sender_id: UserId::new(sender_id),
        recipient_id: UserId::new(recipient_id),
        message_type: parse_text_column(row, 3)?,
        content: row.get(4)?,
        file_url: row.get(5)?,
        replied_to_message_id: row.get(6)?,
        metadata,
        created_at: row.get(8)?,
        delivered_at: row.get(9)?,
        read_at: row.get(10)?,
    })
}

/// Store a new message.
///
/// # Errors
/// Returns an [Error::SqlError] if the insert failed.
pub fn create_message(message: NewMessage, connection: &Connection) -> Result<Message, Error> {
    let metadata = message
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let message = connection
        .prepare(&format!(
            "INSERT INTO message (sender_id, recipient_id, message_type, content, file_url,
                replied_to_message_id, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             RETURNING {MESSAGE_COLUMNS}"
        ))?
        .query_row(
            (
                message.sender_id.as_str(),
                message.recipient_id.as_str(),
                message.message_type.as_str(),
                message.content,
                message.file_url,
                message.replied_to_message_id,
                metadata,
                OffsetDateTime::now_utc(),
            ),
            map_message_row,
        )?;

    Ok(message)
}

/// Get the latest `limit` messages exchanged between `user_id` and
/// `contact_id`, in either direction, ordered oldest to newest.
///
/// # Errors
/// Returns an [Error::SqlError] if the query failed.
pub fn get_conversation(
    user_id: &UserId,
    contact_id: &UserId,
    limit: u32,
    connection: &Connection,
) -> Result<Vec<Message>, Error> {
    let mut messages = connection
        .prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM message
             WHERE (sender_id = ?1 AND recipient_id = ?2)
                OR (sender_id = ?2 AND recipient_id = ?1)
             ORDER BY created_at DESC, id DESC
             LIMIT ?3"
        ))?
        .query_map(
            (user_id.as_str(), contact_id.as_str(), limit),
            map_message_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    messages.reverse();

    Ok(messages)
}

/// Delete the message `id` if it was sent by `sender`.
///
/// # Errors
/// Returns [Error::NotFound] if there is no such message or another user sent it.
pub fn delete_message(
    id: MessageId,
    sender: &UserId,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM message WHERE id = ?1 AND sender_id = ?2",
        (id, sender.as_str()),
    )?;

    match rows_affected {
        0 => Err(Error::NotFound),
        _ => Ok(()),
    }
}

/// Delete every message sent by `sender`, returning the IDs of the deleted messages.
///
/// # Errors
/// Returns an [Error::SqlError] if the delete failed.
pub fn delete_messages_sent_by(
    sender: &UserId,
    connection: &Connection,
) -> Result<Vec<MessageId>, Error> {
    connection
        .prepare("DELETE FROM message WHERE sender_id = ?1 RETURNING id")?
        .query_map([sender.as_str()], |row| row.get(0))?
        .map(|maybe_id| maybe_id.map_err(Error::from))
        .collect()
}

/// Mark the message `id` as read if it was sent to `recipient`.
///
/// A message that was already read keeps its original read time. Reading a
/// message implies it was delivered.
///
/// # Errors
/// Returns [Error::NotFound] if there is no such message or it was sent to another user.
pub fn mark_message_read(
    id: MessageId,
    recipient: &UserId,
    connection: &Connection,
) -> Result<Message, Error> {
    let now = OffsetDateTime::now_utc();

    connection
        .prepare(&format!(
            "UPDATE message SET
                read_at = COALESCE(read_at, ?1),
                delivered_at = COALESCE(delivered_at, ?1)
             WHERE id = ?2 AND recipient_id = ?3
             RETURNING {MESSAGE_COLUMNS}"
        ))?
        .query_row((now, id, recipient.as_str()), map_message_row)
        .optional()?
        .ok_or(Error::NotFound)
}

// ============================================================================
// TESTS
// ============================================================================
