//! Remote store gateway contract
//!
//! The sync layer talks to persistence exclusively through [`RemoteStore`]:
//! point queries, inserts, updates, deletes, and change subscriptions over a
//! small set of tables. Rows cross the boundary as JSON objects.
//!
//! Change notifications only say *that* something changed. Their payload is
//! never relied upon; consumers re-query to learn *what* changed.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use bitflags::bitflags;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::repository::error::StoreError;

/// A row as exchanged with the store
pub type Row = Map<String, Value>;

/// Tables the study room client reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    /// Chat transcript, one row per message
    Messages,
    /// Room membership / presence roster
    Participants,
    /// Room directory
    StudyRooms,
}

impl Table {
    pub const fn as_str(self) -> &'static str {
        match self {
            Table::Messages => "room_messages",
            Table::Participants => "room_participants",
            Table::StudyRooms => "study_rooms",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equality filter: every condition must hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: BTreeMap<String, Value>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `field = value` condition
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.conditions.iter().map(|(field, value)| (field.as_str(), value))
    }

    /// Whether `row` satisfies every condition
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|(field, value)| row.get(field) == Some(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: Direction::Ascending }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: Direction::Descending }
    }
}

/// Kind of change reported by a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

bitflags! {
    /// Set of change kinds a subscription is interested in
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u8 {
        const INSERT = 0b001;
        const UPDATE = 0b010;
        const DELETE = 0b100;
        const ALL = Self::INSERT.bits() | Self::UPDATE.bits() | Self::DELETE.bits();
    }
}

impl EventMask {
    pub fn includes(self, kind: ChangeKind) -> bool {
        self.contains(EventMask::from(kind))
    }
}

impl From<ChangeKind> for EventMask {
    fn from(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Insert => EventMask::INSERT,
            ChangeKind::Update => EventMask::UPDATE,
            ChangeKind::Delete => EventMask::DELETE,
        }
    }
}

/// "Something changed" notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub table: Table,
    /// Whether the changed row matched the subscription filter
    pub matched: bool,
}

impl ChangeEvent {
    /// Event for a row that matched the subscription filter
    pub fn new(kind: ChangeKind, table: Table) -> Self {
        Self { kind, table, matched: true }
    }

    pub fn with_matched(mut self, matched: bool) -> Self {
        self.matched = matched;
        self
    }
}

/// Opaque handle identifying one open subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// An open change stream.
///
/// The stream ends (`next` returns `None`) once the store side is released
/// through [`RemoteStore::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    table: Table,
    events: mpsc::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn new(id: SubscriptionId, table: Table, events: mpsc::Receiver<ChangeEvent>) -> Self {
        Self { id, table, events }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }
}

/// Backend-as-a-service boundary used by the sync layer.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Rows of `table` matching `filter`, optionally ordered
    async fn query(
        &self,
        table: Table,
        filter: &Filter,
        order: Option<&OrderBy>,
    ) -> Result<Vec<Row>, StoreError>;

    /// Inserts `row`; the store assigns `id`. Returns the stored row.
    async fn insert(&self, table: Table, row: Row) -> Result<Row, StoreError>;

    /// Merges `patch` into every matching row. Returns the number of rows updated.
    async fn update(&self, table: Table, filter: &Filter, patch: Row) -> Result<u64, StoreError>;

    /// Removes every matching row. Returns the number of rows removed.
    async fn delete(&self, table: Table, filter: &Filter) -> Result<u64, StoreError>;

    /// Opens a change stream over rows of `table` matching `filter`
    async fn subscribe(
        &self,
        table: Table,
        filter: &Filter,
        events: EventMask,
    ) -> Result<Subscription, StoreError>;

    /// Releases a subscription. Unknown or already-released handles are a no-op.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), StoreError>;
}

/// Serializes `value` into a row. Fails unless it serializes to a JSON object.
pub fn to_row<T: Serialize>(value: &T) -> Result<Row, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(row) => Ok(row),
        other => Err(StoreError::InvalidData {
            message: format!("expected an object, found {other}"),
        }),
    }
}

pub fn from_row<T: DeserializeOwned>(row: Row) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(row))?)
}
