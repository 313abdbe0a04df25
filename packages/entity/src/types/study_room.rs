use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::{validate_room_description, validate_room_name, ValidationError};

/// Default participant cap for newly created rooms
pub const DEFAULT_MAX_PARTICIPANTS: u32 = 10;

/// A virtual study room listed in the room directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyRoom {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_by: String,
    pub is_active: bool,
    pub max_participants: u32,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a new study room; the store stamps `created_at`
/// unless given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStudyRoom {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_by: String,
    pub is_active: bool,
    pub max_participants: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl NewStudyRoom {
    pub fn new(
        created_by: impl Into<String>,
        name: &str,
        description: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let name = validate_room_name(name)?;
        let description = validate_room_description(description)?;

        Ok(Self {
            name: name.to_string(),
            description: description.map(str::to_string),
            created_by: created_by.into(),
            is_active: true,
            max_participants: DEFAULT_MAX_PARTICIPANTS,
            created_at: None,
        })
    }
}
