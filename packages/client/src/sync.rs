//! Live view reconciliation shared by the transcript and the roster
//!
//! A reconciler keeps one room's rows of one table in memory. Every change
//! notification is only a trigger: the reconciler re-runs the full query and
//! replaces its local copy. Each fetch takes a sequence number when issued and
//! its result is applied only if no later fetch was issued meanwhile, so a slow
//! response can never overwrite a fresher one.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use studyroom_surrealdb::{
    ChangeEvent, EventMask, Filter, OrderBy, RemoteStore, Subscription, SubscriptionId, Table,
    from_row,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{FetchError, SessionError, SyncError};

/// Lifecycle of a reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    /// Nothing fetched yet
    Uninitialized,
    /// A fetch is in flight
    Loading,
    /// Local state matches the latest applied fetch
    Synced,
    /// The latest fetch failed; the previous state is kept
    Errored,
    /// Torn down; terminal
    Closed,
}

impl SyncPhase {
    pub fn is_closed(self) -> bool {
        self == SyncPhase::Closed
    }
}

/// What became of one fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The result replaced local state
    Applied,
    /// A later fetch was issued (or the reconciler closed) first; result dropped
    Superseded,
    /// The notification did not concern this view; nothing was fetched
    Ignored,
}

/// Change notification for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomUpdate {
    /// New transcript state is available
    TranscriptChanged { room_id: String },
    /// New roster state is available
    RosterChanged { room_id: String },
    /// A fetch failed; the previous state is still shown
    SyncFailed { room_id: String, table: Table, message: String },
    /// A room session started
    SessionOpened { room_id: String },
    /// A room session ended
    SessionClosed { room_id: String },
}

/// Table-specific half of a reconciler
pub(crate) trait LiveView: Send + Sync + 'static {
    type Item: Clone + DeserializeOwned + Send + Sync + 'static;

    const TABLE: Table;

    /// Change kinds that trigger a re-fetch
    const EVENTS: EventMask;

    fn order() -> Option<OrderBy>;

    /// Puts fetched rows into view order and drops duplicates
    fn normalize(items: Vec<Self::Item>) -> Vec<Self::Item>;

    fn changed(room_id: &str) -> RoomUpdate;
}

/// Sorts with `compare`, then keeps the first item for every key
pub(crate) fn sort_unique<T, K, C, F>(mut items: Vec<T>, compare: C, key: F) -> Vec<T>
where
    K: Eq + std::hash::Hash,
    C: FnMut(&T, &T) -> std::cmp::Ordering,
    F: Fn(&T) -> K,
{
    items.sort_by(compare);
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(key(item)));
    items
}

struct ViewState<T> {
    phase: SyncPhase,
    items: Vec<T>,
    /// Sequence number of the latest issued fetch
    issued: u64,
    last_error: Option<String>,
}

struct Shared<V: LiveView> {
    store: Arc<dyn RemoteStore>,
    room_id: String,
    state: Mutex<ViewState<V::Item>>,
    updates: broadcast::Sender<RoomUpdate>,
    _view: PhantomData<fn() -> V>,
}

impl<V: LiveView> Shared<V> {
    fn filter(&self) -> Filter {
        Filter::new().eq("room_id", self.room_id.as_str())
    }

    fn notify(&self, update: RoomUpdate) {
        // no receivers is fine
        let _ = self.updates.send(update);
    }

    fn closed(&self) -> SyncError {
        SessionError::Closed { room_id: self.room_id.clone() }.into()
    }

    async fn refresh(&self) -> Result<FetchOutcome, SyncError> {
        let seq = {
            let mut state = self.state.lock();
            if state.phase.is_closed() {
                return Err(self.closed());
            }
            state.issued += 1;
            state.phase = SyncPhase::Loading;
            state.issued
        };

        debug!("Fetching {} for room {} (request {})", V::TABLE, self.room_id, seq);

        let order = V::order();
        let fetched = match self.store.query(V::TABLE, &self.filter(), order.as_ref()).await {
            Ok(rows) => rows.into_iter().map(from_row::<V::Item>).collect::<Result<Vec<_>, _>>(),
            Err(e) => Err(e),
        };

        let mut state = self.state.lock();
        if state.phase.is_closed() || state.issued != seq {
            debug!(
                "Discarding superseded {} fetch for room {} (request {}, latest {})",
                V::TABLE,
                self.room_id,
                seq,
                state.issued
            );
            return Ok(FetchOutcome::Superseded);
        }

        match fetched {
            Ok(items) => {
                state.items = V::normalize(items);
                state.phase = SyncPhase::Synced;
                state.last_error = None;
                drop(state);

                self.notify(V::changed(&self.room_id));
                Ok(FetchOutcome::Applied)
            },
            Err(e) => {
                state.phase = SyncPhase::Errored;
                state.last_error = Some(e.to_string());
                drop(state);

                warn!("Failed to fetch {} for room {}: {}", V::TABLE, self.room_id, e);
                self.notify(RoomUpdate::SyncFailed {
                    room_id: self.room_id.clone(),
                    table: V::TABLE,
                    message: e.to_string(),
                });
                Err(FetchError { table: V::TABLE, source: e }.into())
            },
        }
    }
}

struct LiveHandle {
    id: SubscriptionId,
    pump: JoinHandle<()>,
}

/// Generic reconciler over one table of one room
pub(crate) struct LiveReconciler<V: LiveView> {
    shared: Arc<Shared<V>>,
    live: Mutex<Option<LiveHandle>>,
}

impl<V: LiveView> LiveReconciler<V> {
    pub(crate) fn new(
        store: Arc<dyn RemoteStore>,
        room_id: String,
        updates: broadcast::Sender<RoomUpdate>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                room_id,
                state: Mutex::new(ViewState {
                    phase: SyncPhase::Uninitialized,
                    items: Vec::new(),
                    issued: 0,
                    last_error: None,
                }),
                updates,
                _view: PhantomData,
            }),
            live: Mutex::new(None),
        }
    }

    pub(crate) fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.shared.store
    }

    pub(crate) fn room_id(&self) -> &str {
        &self.shared.room_id
    }

    pub(crate) fn phase(&self) -> SyncPhase {
        self.shared.state.lock().phase
    }

    pub(crate) fn items(&self) -> Vec<V::Item> {
        self.shared.state.lock().items.clone()
    }

    pub(crate) fn last_error(&self) -> Option<String> {
        self.shared.state.lock().last_error.clone()
    }

    pub(crate) fn subscription_id(&self) -> Option<SubscriptionId> {
        self.live.lock().as_ref().map(|handle| handle.id)
    }

    pub(crate) fn updates(&self) -> broadcast::Receiver<RoomUpdate> {
        self.shared.updates.subscribe()
    }

    pub(crate) fn ensure_open(&self) -> Result<(), SyncError> {
        if self.phase().is_closed() { Err(self.shared.closed()) } else { Ok(()) }
    }

    pub(crate) async fn refresh(&self) -> Result<FetchOutcome, SyncError> {
        self.shared.refresh().await
    }

    /// Re-fetches if `event` concerns this view
    pub(crate) async fn apply_event(&self, event: ChangeEvent) -> Result<FetchOutcome, SyncError> {
        if event.table != V::TABLE || !event.matched || !V::EVENTS.includes(event.kind) {
            return Ok(FetchOutcome::Ignored);
        }
        self.shared.refresh().await
    }

    /// Opens the change stream and starts the pump task draining it.
    /// A second call keeps the existing subscription.
    pub(crate) async fn subscribe(&self) -> Result<SubscriptionId, SyncError> {
        self.ensure_open()?;
        if let Some(id) = self.subscription_id() {
            return Ok(id);
        }

        let subscription = self
            .shared
            .store
            .subscribe(V::TABLE, &self.shared.filter(), V::EVENTS)
            .await
            .map_err(|e| SyncError::from_store(V::TABLE, e))?;
        let id = subscription.id();

        // torn down while the subscription was being opened
        if self.phase().is_closed() {
            self.shared.store.unsubscribe(id).await.map_err(|e| SyncError::from_store(V::TABLE, e))?;
            return Err(self.shared.closed());
        }

        let pump = tokio::spawn(pump(self.shared.clone(), subscription));
        *self.live.lock() = Some(LiveHandle { id, pump });

        info!("Subscribed to {} for room {} ({})", V::TABLE, self.shared.room_id, id);
        Ok(id)
    }

    /// Closes the reconciler: pending fetches become no-ops, the pump stops
    /// and the subscription is released. Safe to call repeatedly.
    pub(crate) async fn teardown(&self) -> Result<(), SyncError> {
        {
            let mut state = self.shared.state.lock();
            state.issued += 1;
            if !state.phase.is_closed() {
                state.phase = SyncPhase::Closed;
                info!("Closed {} sync for room {}", V::TABLE, self.shared.room_id);
            }
        }

        let handle = self.live.lock().take();
        if let Some(handle) = handle {
            handle.pump.abort();
            self.shared
                .store
                .unsubscribe(handle.id)
                .await
                .map_err(|e| SyncError::from_store(V::TABLE, e))?;
            debug!("Unsubscribed {} for room {} ({})", V::TABLE, self.shared.room_id, handle.id);
        }

        Ok(())
    }
}

impl<V: LiveView> Drop for LiveReconciler<V> {
    fn drop(&mut self) {
        let Some(handle) = self.live.get_mut().take() else {
            return;
        };
        handle.pump.abort();

        // release the subscription if a runtime is still around to do it
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let store = self.shared.store.clone();
            runtime.spawn(async move {
                if let Err(e) = store.unsubscribe(handle.id).await {
                    warn!("Failed to release subscription {}: {}", handle.id, e);
                }
            });
        }
    }
}

/// Drains one subscription, re-fetching on every relevant notification.
/// Runs until the stream ends or the task is aborted.
async fn pump<V: LiveView>(shared: Arc<Shared<V>>, mut subscription: Subscription) {
    while let Some(event) = subscription.next().await {
        if !event.matched || !V::EVENTS.includes(event.kind) {
            continue;
        }

        debug!("{:?} on {} for room {}", event.kind, event.table, shared.room_id);

        // fetch failures are already reported through RoomUpdate::SyncFailed
        if let Err(SyncError::Session(_)) = shared.refresh().await {
            break;
        }
    }

    debug!("Change stream for {} in room {} ended", V::TABLE, shared.room_id);
}
