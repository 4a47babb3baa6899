//! Message blob chunker.
//!
//! Splits a sorted message sequence into [`MessageBlob`]s of at most
//! `blob_size` messages. Partitioning preserves input order, and each
//! blob's id is derived from the contact id and ordinal alone, so two
//! runs over the same messages produce identical blobs.
//!
//! # Format
//!
//! Every message renders as
//!
//! ```text
//! From: <sender, or "me">
//! Text: <body>
//! ```
//!
//! and the rendered messages are joined with a newline.

use crate::models::{Message, MessageBlob};

/// Default number of messages per blob.
pub const BLOB_SIZE: usize = 1000;

/// Deterministic blob id.
pub fn blob_id(contact_id: &str, ordinal: i64) -> String {
    format!("{}_blob_{}", contact_id, ordinal)
}

/// Render one message.
pub fn format_message(message: &Message) -> String {
    let from = if message.is_from_me {
        "me"
    } else {
        message.sender.as_str()
    };
    format!("From: {}\nText: {}\n", from, message.text)
}

/// Partition `messages` into blobs with contiguous ordinals starting at 0.
///
/// An empty sequence yields no blobs.
pub fn chunk_messages(contact_id: &str, messages: &[Message], blob_size: usize) -> Vec<MessageBlob> {
    let blob_size = blob_size.max(1);
    messages
        .chunks(blob_size)
        .enumerate()
        .map(|(ordinal, run)| MessageBlob {
            contact_id: contact_id.to_string(),
            ordinal: ordinal as i64,
            text: run
                .iter()
                .map(format_message)
                .collect::<Vec<_>>()
                .join("\n"),
        })
        .collect()
}
