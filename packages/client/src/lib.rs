//! Study room sync client
//!
//! Keeps a local, consistent view of a study room's chat transcript and
//! participant roster on top of a [`RemoteStore`](studyroom_surrealdb::RemoteStore),
//! and manages the room session lifecycle around it.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod directory;
pub mod error;
pub mod presence;
pub mod realtime;
pub mod sync;
pub mod transcript;

use serde::{Deserialize, Serialize};

pub use directory::RoomDirectory;
pub use error::{FetchError, SessionError, SyncError};
pub use presence::{JoinOutcome, PresenceReconciler};
pub use realtime::{RoomSnapshot, RoomSyncClient, RoomUser};
pub use sync::{FetchOutcome, RoomUpdate, SyncPhase};
pub use transcript::TranscriptReconciler;

// Re-export commonly used types from studyroom_entity
pub use studyroom_entity::{Message, Participant, StudyRoom, ValidationError};

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Capacity of the room update broadcast channel
    pub update_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { update_capacity: 256 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.update_capacity, 256);
    }

    #[test]
    fn test_client_config_missing_fields_use_defaults() {
        let config: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
    }
}
