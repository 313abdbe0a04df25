use serde::{Deserialize, Serialize};

/// A user's membership in a study room.
///
/// At most one row exists per `(room_id, user_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Store-assigned membership identifier
    pub id: String,

    /// Room ID
    pub room_id: String,

    /// User ID
    pub user_id: String,

    /// Display name
    pub display_name: String,

    /// Presence toggle
    #[serde(default)]
    pub is_online: bool,
}

/// Insert payload for joining a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewParticipant {
    pub room_id: String,
    pub user_id: String,
    pub display_name: String,
    pub is_online: bool,
}

impl NewParticipant {
    pub fn new(
        room_id: impl Into<String>,
        user_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            user_id: user_id.into(),
            display_name: display_name.into(),
            is_online: true,
        }
    }
}
