use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::{validate_message_body, ValidationError};

/// A chat message posted to a study room.
///
/// Immutable once created. The `id` is assigned by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned unique identifier
    pub id: String,

    /// Room the message was posted to
    pub room_id: String,

    /// Author's user ID
    pub author_id: String,

    /// Author's display name at the time of posting
    pub author_display_name: String,

    /// Message text, 1..=1000 characters
    pub body: String,

    /// Creation time, stamped by the store
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Transcript order: `created_at` ascending, `id` breaks ties.
    pub fn chronological(a: &Message, b: &Message) -> Ordering {
        a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
    }
}

/// Insert payload for a new message; the store assigns `id` and, unless
/// given, `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub room_id: String,
    pub author_id: String,
    pub author_display_name: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl NewMessage {
    /// Validates the body and builds the payload. The stored body is trimmed.
    pub fn new(
        room_id: impl Into<String>,
        author_id: impl Into<String>,
        author_display_name: impl Into<String>,
        body: &str,
    ) -> Result<Self, ValidationError> {
        let body = validate_message_body(body)?;

        Ok(Self {
            room_id: room_id.into(),
            author_id: author_id.into(),
            author_display_name: author_display_name.into(),
            body: body.to_string(),
            created_at: None,
        })
    }
}
