//! The in-app notification inbox.

use time::OffsetDateTime;
use uuid::Uuid;

/// The highest unread count shown as a number on the badge.
const BADGE_LIMIT: usize = 99;

/// A message shown in the in-app inbox.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    /// The ID of the message in the inbox.
    pub id: String,
    /// The text of the message.
    pub content: String,
    /// Who or what sent the message.
    pub sender: String,
    /// When the message arrived.
    pub received_at: OffsetDateTime,
    /// Whether the user has seen the message.
    pub read: bool,
}

/// Unread messages and whether a new version of the app is waiting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationState {
    messages: Vec<ReceivedMessage>,
    has_update: bool,
}

impl NotificationState {
    /// An empty inbox with no pending update.
    pub fn new() -> Self {
        Self::default()
    }

    /// The messages in arrival order.
    pub fn messages(&self) -> &[ReceivedMessage] {
        &self.messages
    }

    /// How many messages have not been read.
    pub fn unread_count(&self) -> usize {
        self.messages.iter().filter(|message| !message.read).count()
    }

    /// The text for the unread badge, `None` when there is nothing to show.
    pub fn badge_label(&self) -> Option<String> {
        match self.unread_count() {
            0 => None,
            count if count > BADGE_LIMIT => Some(format!("{BADGE_LIMIT}+")),
            count => Some(count.to_string()),
        }
    }

    /// Add a message to the inbox and return its ID.
    pub fn add_message(&mut self, content: &str, sender: &str, read: bool) -> String {
        let id = Uuid::new_v4().to_string();

        self.messages.push(ReceivedMessage {
            id: id.clone(),
            content: content.to_owned(),
            sender: sender.to_owned(),
            received_at: OffsetDateTime::now_utc(),
            read,
        });

        id
    }

    /// Mark one message as read, returning whether it was found.
    pub fn mark_as_read(&mut self, id: &str) -> bool {
        match self.messages.iter_mut().find(|message| message.id == id) {
            Some(message) => {
                message.read = true;
                true
            }
            None => false,
        }
    }

    /// Mark every message as read.
    pub fn mark_all_as_read(&mut self) {
        for message in &mut self.messages {
            message.read = true;
        }
    }

    /// Whether a new version of the app has taken over and a reload is due.
    pub fn has_update(&self) -> bool {
        self.has_update
    }

    /// Record that a new worker took control of the app.
    pub fn set_update_available(&mut self) {
        self.has_update = true;
    }

    /// Dismiss the update notice.
    pub fn clear_update(&mut self) {
        self.has_update = false;
    }
}
