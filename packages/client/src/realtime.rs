//! Room session lifecycle
//!
//! [`RoomSyncClient`] owns at most one room session at a time. Entering a room
//! loads the transcript and the roster, opens one change stream per table and
//! joins the room; exiting leaves first and only then closes both streams.

use std::sync::Arc;

use studyroom_entity::{Message, Participant};
use studyroom_surrealdb::RemoteStore;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::ClientConfig;
use crate::error::{SessionError, SyncError};
use crate::presence::PresenceReconciler;
use crate::sync::{RoomUpdate, SyncPhase};
use crate::transcript::TranscriptReconciler;

/// The user a session acts as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomUser {
    pub user_id: String,
    pub display_name: String,
}

impl RoomUser {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), display_name: display_name.into() }
    }
}

/// Point-in-time view of the current room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub room_id: Option<String>,
    pub messages: Vec<Message>,
    pub participants: Vec<Participant>,
    pub transcript_phase: SyncPhase,
    pub presence_phase: SyncPhase,
}

impl RoomSnapshot {
    fn empty() -> Self {
        Self {
            room_id: None,
            messages: Vec::new(),
            participants: Vec::new(),
            transcript_phase: SyncPhase::Uninitialized,
            presence_phase: SyncPhase::Uninitialized,
        }
    }

    /// Participants currently flagged online
    pub fn online_count(&self) -> usize {
        self.participants.iter().filter(|p| p.is_online).count()
    }
}

struct RoomSession {
    room_id: String,
    user: RoomUser,
    transcript: TranscriptReconciler,
    presence: PresenceReconciler,
}

impl RoomSession {
    /// Best-effort teardown of both reconcilers after a failed start
    async fn abandon(&self) {
        if let Err(e) = self.transcript.teardown().await {
            warn!("Failed to tear down transcript for room {}: {}", self.room_id, e);
        }
        if let Err(e) = self.presence.teardown().await {
            warn!("Failed to tear down roster for room {}: {}", self.room_id, e);
        }
    }

    async fn start(&self) -> Result<(), SyncError> {
        let (transcript, presence) =
            tokio::join!(self.transcript.initialize(), self.presence.initialize());
        transcript.and(presence)?;

        self.transcript.subscribe().await?;
        self.presence.subscribe().await?;
        self.presence.join(&self.user.user_id, &self.user.display_name).await?;

        Ok(())
    }
}

/// Realtime client for one study room session at a time
pub struct RoomSyncClient {
    store: Arc<dyn RemoteStore>,
    session: Option<RoomSession>,
    updates: broadcast::Sender<RoomUpdate>,
}

impl RoomSyncClient {
    pub fn new(store: Arc<dyn RemoteStore>, config: &ClientConfig) -> Self {
        let (updates, _) = broadcast::channel(config.update_capacity.max(1));
        Self { store, session: None, updates }
    }

    /// Starts a session in `room_id` acting as `user`.
    ///
    /// Either both views are live and the user has joined, or nothing is
    /// retained: on any failure everything already started is torn down and
    /// [`SessionError::StartFailed`] is returned. Re-entering the current
    /// room is a no-op.
    pub async fn enter_room(&mut self, room_id: &str, user: RoomUser) -> Result<(), SyncError> {
        if let Some(session) = &self.session {
            if session.room_id == room_id {
                return Ok(());
            }
            return Err(SessionError::AlreadyInRoom { room_id: session.room_id.clone() }.into());
        }

        info!("Entering room {} as {}", room_id, user.user_id);

        let session = RoomSession {
            room_id: room_id.to_string(),
            transcript: TranscriptReconciler::with_updates(
                self.store.clone(),
                room_id,
                self.updates.clone(),
            ),
            presence: PresenceReconciler::with_updates(
                self.store.clone(),
                room_id,
                self.updates.clone(),
            ),
            user,
        };

        if let Err(e) = session.start().await {
            warn!("Failed to enter room {}: {}", room_id, e);
            session.abandon().await;
            return Err(SessionError::StartFailed {
                room_id: room_id.to_string(),
                source: Box::new(e),
            }
            .into());
        }

        self.session = Some(session);
        let _ = self.updates.send(RoomUpdate::SessionOpened { room_id: room_id.to_string() });

        info!("Entered room {}", room_id);
        Ok(())
    }

    /// Leaves the room, then closes both views.
    ///
    /// The session is gone afterwards even if leaving failed; that failure is
    /// reported once the subscriptions have been released.
    pub async fn exit_room(&mut self) -> Result<(), SyncError> {
        let session = self.session.take().ok_or(SessionError::NotInRoom)?;

        let left = session.presence.leave(&session.user.user_id).await;
        let transcript = session.transcript.teardown().await;
        let presence = session.presence.teardown().await;

        let _ = self.updates.send(RoomUpdate::SessionClosed { room_id: session.room_id.clone() });
        info!("Exited room {}", session.room_id);

        left?;
        transcript?;
        presence?;
        Ok(())
    }

    /// Current messages and roster. Never waits on the store.
    pub fn snapshot(&self) -> RoomSnapshot {
        match &self.session {
            Some(session) => RoomSnapshot {
                room_id: Some(session.room_id.clone()),
                messages: session.transcript.messages(),
                participants: session.presence.participants(),
                transcript_phase: session.transcript.phase(),
                presence_phase: session.presence.phase(),
            },
            None => RoomSnapshot::empty(),
        }
    }

    /// Posts `body` to the current room as the session user
    pub async fn send_message(&self, body: &str) -> Result<Message, SyncError> {
        let session = self.session()?;
        session
            .transcript
            .send_message(&session.user.user_id, &session.user.display_name, body)
            .await
    }

    /// Marks the session user online or away
    pub async fn set_online(&self, is_online: bool) -> Result<(), SyncError> {
        let session = self.session()?;
        session.presence.set_online(&session.user.user_id, is_online).await?;
        Ok(())
    }

    /// Re-fetches both views; the manual retry after a failed sync
    pub async fn refresh(&self) -> Result<(), SyncError> {
        let session = self.session()?;
        let (transcript, presence) =
            tokio::join!(session.transcript.refresh(), session.presence.refresh());
        transcript.and(presence)?;
        Ok(())
    }

    /// Notifications telling when [`snapshot`](Self::snapshot) changed
    pub fn updates(&self) -> broadcast::Receiver<RoomUpdate> {
        self.updates.subscribe()
    }

    pub fn current_room(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.room_id.as_str())
    }

    pub fn user(&self) -> Option<&RoomUser> {
        self.session.as_ref().map(|session| &session.user)
    }

    fn session(&self) -> Result<&RoomSession, SyncError> {
        self.session.as_ref().ok_or_else(|| SessionError::NotInRoom.into())
    }
}
