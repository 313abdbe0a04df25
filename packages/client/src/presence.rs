//! Participant roster of one study room

use std::sync::Arc;

use serde_json::json;
use studyroom_entity::{NewParticipant, Participant};
use studyroom_surrealdb::{
    ChangeEvent, EventMask, Filter, OrderBy, RemoteStore, SubscriptionId, Table, to_row,
};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::SyncError;
use crate::sync::{FetchOutcome, LiveReconciler, LiveView, RoomUpdate, SyncPhase, sort_unique};

pub(crate) struct PresenceView;

impl LiveView for PresenceView {
    type Item = Participant;

    const TABLE: Table = Table::Participants;
    const EVENTS: EventMask = EventMask::ALL;

    fn order() -> Option<OrderBy> {
        None
    }

    fn normalize(participants: Vec<Participant>) -> Vec<Participant> {
        sort_unique(
            participants,
            |a, b| a.display_name.cmp(&b.display_name).then_with(|| a.user_id.cmp(&b.user_id)),
            |participant| participant.user_id.clone(),
        )
    }

    fn changed(room_id: &str) -> RoomUpdate {
        RoomUpdate::RosterChanged { room_id: room_id.to_string() }
    }
}

/// Result of a join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    /// A membership row already existed; nothing changed
    AlreadyJoined,
}

/// Live roster for one room, at most one entry per user.
///
/// Teardown only stops syncing. Leaving is a separate, explicit call so that
/// a dropped view does not evict the participant.
pub struct PresenceReconciler {
    inner: LiveReconciler<PresenceView>,
}

impl PresenceReconciler {
    pub fn new(store: Arc<dyn RemoteStore>, room_id: impl Into<String>) -> Self {
        let (updates, _) = broadcast::channel(64);
        Self::with_updates(store, room_id, updates)
    }

    pub fn with_updates(
        store: Arc<dyn RemoteStore>,
        room_id: impl Into<String>,
        updates: broadcast::Sender<RoomUpdate>,
    ) -> Self {
        Self { inner: LiveReconciler::new(store, room_id.into(), updates) }
    }

    pub fn room_id(&self) -> &str {
        self.inner.room_id()
    }

    pub async fn initialize(&self) -> Result<FetchOutcome, SyncError> {
        self.inner.refresh().await
    }

    pub async fn refresh(&self) -> Result<FetchOutcome, SyncError> {
        self.inner.refresh().await
    }

    /// Re-fetches the roster on any insert, update or delete in this room
    pub async fn apply_change_event(&self, event: ChangeEvent) -> Result<FetchOutcome, SyncError> {
        self.inner.apply_event(event).await
    }

    /// Adds `user_id` to the room. Joining twice is not an error.
    pub async fn join(&self, user_id: &str, display_name: &str) -> Result<JoinOutcome, SyncError> {
        let row = to_row(&NewParticipant::new(self.room_id(), user_id, display_name))
            .map_err(|e| SyncError::from_store(Table::Participants, e))?;

        match self.inner.store().insert(Table::Participants, row).await {
            Ok(_) => {
                info!("User {} joined room {}", user_id, self.room_id());
                Ok(JoinOutcome::Joined)
            },
            Err(e) if e.is_unique_violation() => {
                debug!("User {} already in room {}", user_id, self.room_id());
                Ok(JoinOutcome::AlreadyJoined)
            },
            Err(e) => Err(SyncError::from_store(Table::Participants, e)),
        }
    }

    /// Removes the membership of `user_id`. Returns the number of rows
    /// removed; zero (already gone) is still a success.
    pub async fn leave(&self, user_id: &str) -> Result<u64, SyncError> {
        let removed = self
            .inner
            .store()
            .delete(Table::Participants, &self.membership(user_id))
            .await
            .map_err(|e| SyncError::from_store(Table::Participants, e))?;

        info!("User {} left room {} ({} rows removed)", user_id, self.room_id(), removed);
        Ok(removed)
    }

    /// Toggles the online flag on the caller's own membership
    pub async fn set_online(&self, user_id: &str, is_online: bool) -> Result<u64, SyncError> {
        let patch = to_row(&json!({ "is_online": is_online }))
            .map_err(|e| SyncError::from_store(Table::Participants, e))?;

        self.inner
            .store()
            .update(Table::Participants, &self.membership(user_id), patch)
            .await
            .map_err(|e| SyncError::from_store(Table::Participants, e))
    }

    pub async fn subscribe(&self) -> Result<SubscriptionId, SyncError> {
        self.inner.subscribe().await
    }

    /// Stops syncing. Never leaves the room.
    pub async fn teardown(&self) -> Result<(), SyncError> {
        self.inner.teardown().await
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.inner.items()
    }

    /// Roster entry for `user_id`, if present
    pub fn participant(&self, user_id: &str) -> Option<Participant> {
        self.participants().into_iter().find(|p| p.user_id == user_id)
    }

    pub fn phase(&self) -> SyncPhase {
        self.inner.phase()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error()
    }

    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.inner.subscription_id()
    }

    pub fn updates(&self) -> broadcast::Receiver<RoomUpdate> {
        self.inner.updates()
    }

    fn membership(&self, user_id: &str) -> Filter {
        Filter::new().eq("room_id", self.room_id()).eq("user_id", user_id)
    }
}
