use studyroom_entity::ValidationError;
use studyroom_surrealdb::{StoreError, Table};
use thiserror::Error;

/// The store could not be read or written. Prior local state is kept.
#[derive(Error, Debug)]
#[error("Failed to sync {table}: {source}")]
pub struct FetchError {
    pub table: Table,
    pub source: StoreError,
}

/// Room session lifecycle misuse or a failed session start
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Not in a room")]
    NotInRoom,

    #[error("Already in room {room_id}; exit it first")]
    AlreadyInRoom { room_id: String },

    #[error("Sync for room {room_id} has been torn down")]
    Closed { room_id: String },

    #[error("Failed to enter room {room_id}: {source}")]
    StartFailed {
        room_id: String,
        #[source]
        source: Box<SyncError>,
    },
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl SyncError {
    /// Maps a gateway failure on `table`.
    ///
    /// Rows the store refused (constraint or uniqueness) are caller-correctable
    /// and surface as validation errors; everything else is a fetch error.
    pub(crate) fn from_store(table: Table, err: StoreError) -> Self {
        if err.is_constraint() {
            SyncError::Validation(ValidationError::new(table.as_str(), err.to_string()))
        } else {
            SyncError::Fetch(FetchError { table, source: err })
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, SyncError::Validation(_))
    }

    pub fn is_fetch(&self) -> bool {
        matches!(self, SyncError::Fetch(_))
    }

    pub fn is_session(&self) -> bool {
        matches!(self, SyncError::Session(_))
    }
}
