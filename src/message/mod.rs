//! Messages exchanged between two users.
//!
//! Messages use a single schema with a sender and a recipient. Anyone can read a
//! conversation or send a message; deleting requires a session and only removes
//! messages the session user sent, marking as read only touches messages they
//! received.

mod core;
mod endpoints;

pub use core::{Message, MessageType, NewMessage, create_message_table};
pub use endpoints::{
    delete_all_messages, delete_message_endpoint, get_messages, post_message,
    read_message_endpoint,
};
