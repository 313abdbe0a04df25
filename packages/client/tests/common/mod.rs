#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use studyroom_surrealdb::{
    ChangeEvent, ChangeKind, EventMask, Filter, OrderBy, RemoteStore, Row, StoreError,
    Subscription, SubscriptionId, Table,
};
use tokio::sync::{mpsc, oneshot};

/// Every gateway call, in issue order
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Query(Table),
    Insert(Table, Row),
    Update(Table),
    Delete(Table),
    Subscribe(Table, SubscriptionId),
    Unsubscribe(SubscriptionId),
}

struct Watcher {
    table: Table,
    filter: Filter,
    events: EventMask,
    sender: mpsc::Sender<ChangeEvent>,
}

#[derive(Default)]
struct Inner {
    rows: HashMap<Table, Vec<Row>>,
    next_id: u64,
    calls: Vec<Call>,
    watchers: HashMap<SubscriptionId, Watcher>,
    next_subscription: u64,
    failing: HashSet<Table>,
    failing_writes: HashSet<Table>,
    gated: HashSet<Table>,
    held: Vec<Option<oneshot::Sender<()>>>,
}

/// In-memory gateway with call recording, failure injection and gated queries.
///
/// A gated query snapshots its rows when issued and only returns once the
/// test releases it, which lets tests complete fetches out of order.
#[derive(Default)]
pub struct FakeStore {
    inner: Mutex<Inner>,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Inserts a row directly, without recording a call or notifying
    pub fn seed(&self, table: Table, mut row: Row) -> Row {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = format!("{}-{}", table, inner.next_id);
        row.insert("id".to_string(), Value::String(id));
        if table != Table::Participants && !row.contains_key("created_at") {
            let now = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
            row.insert("created_at".to_string(), Value::String(now));
        }
        inner.rows.entry(table).or_default().push(row.clone());
        row
    }

    pub fn rows(&self, table: Table) -> Vec<Row> {
        self.inner.lock().rows.get(&table).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().calls.clone()
    }

    pub fn query_count(&self, table: Table) -> usize {
        self.calls().iter().filter(|call| **call == Call::Query(table)).count()
    }

    pub fn inserts(&self, table: Table) -> Vec<Row> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Insert(t, row) if t == table => Some(row),
                _ => None,
            })
            .collect()
    }

    pub fn subscribed(&self) -> Vec<SubscriptionId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Subscribe(_, id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn unsubscribed(&self) -> Vec<SubscriptionId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Unsubscribe(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn open_subscriptions(&self) -> usize {
        self.inner.lock().watchers.len()
    }

    /// Queries on `table` fail until [`heal`](Self::heal)
    pub fn fail_queries(&self, table: Table) {
        self.inner.lock().failing.insert(table);
    }

    /// Inserts and deletes on `table` fail until [`heal`](Self::heal)
    pub fn fail_writes(&self, table: Table) {
        self.inner.lock().failing_writes.insert(table);
    }

    pub fn heal(&self, table: Table) {
        let mut inner = self.inner.lock();
        inner.failing.remove(&table);
        inner.failing_writes.remove(&table);
    }

    /// Queries on `table` wait for [`release`](Self::release)
    pub fn gate_queries(&self, table: Table) {
        self.inner.lock().gated.insert(table);
    }

    pub fn held_count(&self) -> usize {
        self.inner.lock().held.len()
    }

    /// Waits until `count` gated queries have been issued
    pub async fn wait_for_held(&self, count: usize) {
        let waiting = async {
            while self.held_count() < count {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        };
        if tokio::time::timeout(Duration::from_secs(5), waiting).await.is_err() {
            panic!("Timed out waiting for {} gated queries", count);
        }
    }

    /// Lets the `index`-th gated query (in issue order) return
    pub fn release(&self, index: usize) {
        let sender = self.inner.lock().held.get_mut(index).and_then(Option::take);
        match sender {
            Some(sender) => {
                let _ = sender.send(());
            },
            None => panic!("No held query at index {}", index),
        }
    }

    /// Sends a notification to every matching subscription on `table`
    pub fn emit(&self, table: Table, kind: ChangeKind) {
        let inner = self.inner.lock();
        for watcher in inner.watchers.values() {
            if watcher.table == table && watcher.events.includes(kind) {
                let _ = watcher.sender.try_send(ChangeEvent::new(kind, table));
            }
        }
    }

    fn notify(inner: &Inner, table: Table, kind: ChangeKind, row: &Row) {
        for watcher in inner.watchers.values() {
            if watcher.table == table && watcher.events.includes(kind) {
                let event = ChangeEvent::new(kind, table).with_matched(watcher.filter.matches(row));
                let _ = watcher.sender.try_send(event);
            }
        }
    }
}

fn unavailable() -> StoreError {
    StoreError::fetch("connection reset by peer")
}

fn field(row: &Row, name: &str) -> Value {
    row.get(name).cloned().unwrap_or(Value::Null)
}

#[async_trait]
impl RemoteStore for FakeStore {
    async fn query(
        &self,
        table: Table,
        filter: &Filter,
        order: Option<&OrderBy>,
    ) -> Result<Vec<Row>, StoreError> {
        let (mut rows, gate, failing) = {
            let mut inner = self.inner.lock();
            inner.calls.push(Call::Query(table));

            let rows: Vec<Row> = inner
                .rows
                .get(&table)
                .map(|rows| rows.iter().filter(|row| filter.matches(row)).cloned().collect())
                .unwrap_or_default();

            let gate = if inner.gated.contains(&table) {
                let (sender, receiver) = oneshot::channel();
                inner.held.push(Some(sender));
                Some(receiver)
            } else {
                None
            };

            (rows, gate, inner.failing.contains(&table))
        };

        if let Some(gate) = gate {
            let _ = gate.await;
        }

        if failing {
            return Err(unavailable());
        }

        if let Some(order) = order {
            rows.sort_by(|a, b| {
                let (a, b) = (field(a, &order.field), field(b, &order.field));
                a.as_str().cmp(&b.as_str())
            });
            if order.direction == studyroom_surrealdb::Direction::Descending {
                rows.reverse();
            }
        }

        Ok(rows)
    }

    async fn insert(&self, table: Table, mut row: Row) -> Result<Row, StoreError> {
        let mut inner = self.inner.lock();
        inner.calls.push(Call::Insert(table, row.clone()));
        if inner.failing_writes.contains(&table) {
            return Err(unavailable());
        }

        if table == Table::Participants {
            let membership = Filter::new()
                .eq("room_id", field(&row, "room_id"))
                .eq("user_id", field(&row, "user_id"));
            let duplicate = inner
                .rows
                .get(&table)
                .is_some_and(|rows| rows.iter().any(|existing| membership.matches(existing)));
            if duplicate {
                return Err(StoreError::UniqueViolation {
                    table: table.to_string(),
                    message: "membership already exists".to_string(),
                });
            }
        }

        inner.next_id += 1;
        let id = format!("{}-{}", table, inner.next_id);
        row.insert("id".to_string(), Value::String(id));
        if table != Table::Participants && !row.contains_key("created_at") {
            let now = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
            row.insert("created_at".to_string(), Value::String(now));
        }
        inner.rows.entry(table).or_default().push(row.clone());

        Self::notify(&inner, table, ChangeKind::Insert, &row);
        Ok(row)
    }

    async fn update(&self, table: Table, filter: &Filter, patch: Row) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        inner.calls.push(Call::Update(table));

        let mut updated = Vec::new();
        if let Some(rows) = inner.rows.get_mut(&table) {
            for row in rows.iter_mut().filter(|row| filter.matches(row)) {
                for (key, value) in &patch {
                    row.insert(key.clone(), value.clone());
                }
                updated.push(row.clone());
            }
        }

        for row in &updated {
            Self::notify(&inner, table, ChangeKind::Update, row);
        }
        Ok(updated.len() as u64)
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        inner.calls.push(Call::Delete(table));
        if inner.failing_writes.contains(&table) {
            return Err(unavailable());
        }

        let mut removed = Vec::new();
        if let Some(rows) = inner.rows.get_mut(&table) {
            let (gone, kept): (Vec<Row>, Vec<Row>) =
                rows.drain(..).partition(|row| filter.matches(row));
            *rows = kept;
            removed = gone;
        }

        for row in &removed {
            Self::notify(&inner, table, ChangeKind::Delete, row);
        }
        Ok(removed.len() as u64)
    }

    async fn subscribe(
        &self,
        table: Table,
        filter: &Filter,
        events: EventMask,
    ) -> Result<Subscription, StoreError> {
        let mut inner = self.inner.lock();
        inner.next_subscription += 1;
        let id = SubscriptionId::new(inner.next_subscription);

        let (sender, receiver) = mpsc::channel(64);
        inner.watchers.insert(id, Watcher { table, filter: filter.clone(), events, sender });
        inner.calls.push(Call::Subscribe(table, id));

        Ok(Subscription::new(id, table, receiver))
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.calls.push(Call::Unsubscribe(id));
        inner.watchers.remove(&id);
        Ok(())
    }
}
