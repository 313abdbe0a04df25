//! Chat transcript of one study room

use std::sync::Arc;

use studyroom_entity::{Message, NewMessage};
use studyroom_surrealdb::{
    ChangeEvent, EventMask, OrderBy, RemoteStore, SubscriptionId, Table, from_row, to_row,
};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::SyncError;
use crate::sync::{FetchOutcome, LiveReconciler, LiveView, RoomUpdate, SyncPhase, sort_unique};

pub(crate) struct TranscriptView;

impl LiveView for TranscriptView {
    type Item = Message;

    const TABLE: Table = Table::Messages;
    const EVENTS: EventMask = EventMask::INSERT;

    fn order() -> Option<OrderBy> {
        Some(OrderBy::asc("created_at"))
    }

    fn normalize(messages: Vec<Message>) -> Vec<Message> {
        sort_unique(messages, Message::chronological, |message| message.id.clone())
    }

    fn changed(room_id: &str) -> RoomUpdate {
        RoomUpdate::TranscriptChanged { room_id: room_id.to_string() }
    }
}

/// Ordered, duplicate-free message log for one room.
///
/// Messages are never spliced in locally, not even the caller's own: the
/// transcript only ever shows what the store returned for the latest fetch.
pub struct TranscriptReconciler {
    inner: LiveReconciler<TranscriptView>,
}

impl TranscriptReconciler {
    pub fn new(store: Arc<dyn RemoteStore>, room_id: impl Into<String>) -> Self {
        let (updates, _) = broadcast::channel(64);
        Self::with_updates(store, room_id, updates)
    }

    /// Reconciler publishing its notifications on `updates`
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

    /// Loads the full transcript, replacing local state on success
    pub async fn initialize(&self) -> Result<FetchOutcome, SyncError> {
        self.inner.refresh().await
    }

    /// Re-fetches the transcript; also the retry path out of `Errored`
    pub async fn refresh(&self) -> Result<FetchOutcome, SyncError> {
        self.inner.refresh().await
    }

    /// Re-fetches when `event` reports a new message in this room.
    /// Other events are ignored without touching the store.
    pub async fn apply_insert_event(&self, event: ChangeEvent) -> Result<FetchOutcome, SyncError> {
        self.inner.apply_event(event).await
    }

    /// Posts a message. Invalid bodies fail before any store call.
    ///
    /// The returned message shows up in [`messages`](Self::messages) only once
    /// the resulting insert notification (or a refresh) has been applied.
    pub async fn send_message(
        &self,
        author_id: &str,
        author_display_name: &str,
        body: &str,
    ) -> Result<Message, SyncError> {
        self.inner.ensure_open()?;
        let message = NewMessage::new(self.room_id(), author_id, author_display_name, body)?;

        let row = to_row(&message).map_err(|e| SyncError::from_store(Table::Messages, e))?;
        let stored = self
            .inner
            .store()
            .insert(Table::Messages, row)
            .await
            .map_err(|e| SyncError::from_store(Table::Messages, e))?;
        let message: Message =
            from_row(stored).map_err(|e| SyncError::from_store(Table::Messages, e))?;

        debug!("Sent message {} to room {}", message.id, message.room_id);
        Ok(message)
    }

    /// Opens the insert subscription for this room
    pub async fn subscribe(&self) -> Result<SubscriptionId, SyncError> {
        self.inner.subscribe().await
    }

    pub async fn teardown(&self) -> Result<(), SyncError> {
        self.inner.teardown().await
    }

    pub fn messages(&self) -> Vec<Message> {
        self.inner.items()
    }

    pub fn phase(&self) -> SyncPhase {
        self.inner.phase()
    }

    /// Message of the latest failed fetch, cleared by the next applied one
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error()
    }

    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.inner.subscription_id()
    }

    pub fn updates(&self) -> broadcast::Receiver<RoomUpdate> {
        self.inner.updates()
    }
}
