use std::sync::Arc;

use studyroom_entity::{NewStudyRoom, StudyRoom};
use studyroom_surrealdb::{Filter, OrderBy, RemoteStore, Row, StoreError, Table, from_row, to_row};
use tracing::info;

use crate::error::SyncError;

/// Listing and creation of study rooms
pub struct RoomDirectory {
    store: Arc<dyn RemoteStore>,
}

impl RoomDirectory {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Active rooms, newest first
    pub async fn list_active(&self) -> Result<Vec<StudyRoom>, SyncError> {
        let rows = self
            .store
            .query(
                Table::StudyRooms,
                &Filter::new().eq("is_active", true),
                Some(&OrderBy::desc("created_at")),
            )
            .await
            .map_err(fetch_error)?;

        let mut rooms = decode(rows)?;
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rooms)
    }

    /// Validates and creates an active room owned by `created_by`
    pub async fn create_room(
        &self,
        created_by: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<StudyRoom, SyncError> {
        let room = NewStudyRoom::new(created_by, name, description)?;

        let row = to_row(&room).map_err(fetch_error)?;
        let stored = self
            .store
            .insert(Table::StudyRooms, row)
            .await
            .map_err(|e| SyncError::from_store(Table::StudyRooms, e))?;
        let room: StudyRoom = from_row(stored).map_err(fetch_error)?;

        info!("Created study room {} ({})", room.name, room.id);
        Ok(room)
    }

    pub async fn get_room(&self, room_id: &str) -> Result<Option<StudyRoom>, SyncError> {
        let rows = self
            .store
            .query(Table::StudyRooms, &Filter::new().eq("id", room_id), None)
            .await
            .map_err(fetch_error)?;

        Ok(decode(rows)?.into_iter().next())
    }
}

fn fetch_error(err: StoreError) -> SyncError {
    SyncError::from_store(Table::StudyRooms, err)
}

fn decode(rows: Vec<Row>) -> Result<Vec<StudyRoom>, SyncError> {
    rows.into_iter().map(|row| from_row(row).map_err(fetch_error)).collect()
}
