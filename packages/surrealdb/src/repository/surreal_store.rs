//! SurrealDB-backed [`RemoteStore`]
//!
//! Rows are stored schemaless under a UUIDv7 record key which is surfaced as
//! the row `id`. Change subscriptions are SurrealDB LIVE queries whose
//! notifications are forwarded into a bounded channel by one task each.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::{Map, Value};
use studyroom_entity::{Message, Participant, StudyRoom};
use surrealdb::engine::any::{self, Any};
use surrealdb::opt::auth::Root;
use surrealdb::{Action, Notification, Response, Surreal};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::gateway::{
    ChangeEvent, ChangeKind, Direction, EventMask, Filter, OrderBy, RemoteStore, Row,
    Subscription, SubscriptionId, Table, to_row,
};
use crate::repository::error::StoreError;
use crate::repository::schema::{check_field, define_schema, projection};

pub struct SurrealStore {
    db: Surreal<Any>,
    live: Mutex<HashMap<SubscriptionId, JoinHandle<()>>>,
    next_subscription: AtomicU64,
    subscription_buffer: usize,
}

impl SurrealStore {
    /// Connects according to `config` and applies the schema
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        let endpoint = config.endpoint()?;
        info!(engine = ?config.engine, endpoint = %endpoint, "Connecting to store");

        let db = any::connect(endpoint).await?;

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            db.signin(Root { username: username.as_str(), password: password.as_str() }).await?;
        }

        db.use_ns(config.namespace.as_str()).use_db(config.database.as_str()).await?;
        define_schema(&db).await?;

        Ok(Self::from_db(db, config.subscription_buffer))
    }

    /// Wraps an already-selected database. The schema is not applied.
    pub fn from_db(db: Surreal<Any>, subscription_buffer: usize) -> Self {
        Self {
            db,
            live: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(0),
            subscription_buffer: subscription_buffer.max(1),
        }
    }

    pub fn db(&self) -> &Surreal<Any> {
        &self.db
    }

    /// Number of LIVE queries currently forwarded
    pub async fn open_subscriptions(&self) -> usize {
        self.live.lock().await.len()
    }

    async fn run(
        &self,
        table: Table,
        sql: String,
        params: Map<String, Value>,
    ) -> Result<Response, StoreError> {
        let mut query = self.db.query(sql);
        if !params.is_empty() {
            query = query.bind(params);
        }

        let response = query.await.map_err(|err| classify(table, err))?;
        response.check().map_err(|err| classify(table, err))
    }
}

impl Drop for SurrealStore {
    fn drop(&mut self) {
        for (_, task) in self.live.get_mut().drain() {
            task.abort();
        }
    }
}

#[async_trait]
impl RemoteStore for SurrealStore {
    async fn query(
        &self,
        table: Table,
        filter: &Filter,
        order: Option<&OrderBy>,
    ) -> Result<Vec<Row>, StoreError> {
        let (clause, params) = where_clause(filter)?;
        let order = match order {
            Some(order) => format!(
                " ORDER BY {} {}",
                check_field(&order.field)?,
                match order.direction {
                    Direction::Ascending => "ASC",
                    Direction::Descending => "DESC",
                }
            ),
            None => String::new(),
        };

        let sql = format!("SELECT {} FROM {table}{clause}{order}", projection(table));
        let mut response = self.run(table, sql, params).await?;
        let rows = take_rows(table, &mut response, 0)?;

        debug!(%table, rows = rows.len(), "Query complete");
        Ok(rows)
    }

    async fn insert(&self, table: Table, mut row: Row) -> Result<Row, StoreError> {
        row.remove("id");
        let key = Uuid::now_v7().to_string();

        let mut params = Map::new();
        params.insert("table".to_string(), Value::String(table.as_str().to_string()));
        params.insert("key".to_string(), Value::String(key.clone()));
        params.insert("content".to_string(), Value::Object(row));

        // read back so store-assigned fields are included
        let sql = format!(
            "CREATE type::thing($table, $key) CONTENT $content RETURN NONE; \
             SELECT {} FROM type::thing($table, $key);",
            projection(table)
        );
        let mut response = self.run(table, sql, params).await?;
        let stored = take_rows(table, &mut response, 1)?.into_iter().next().ok_or_else(|| {
            StoreError::InvalidData { message: format!("{table} row {key} missing after insert") }
        })?;

        debug!(%table, id = %key, "Row inserted");
        Ok(stored)
    }

    async fn update(&self, table: Table, filter: &Filter, mut patch: Row) -> Result<u64, StoreError> {
        patch.remove("id");
        let (clause, mut params) = where_clause(filter)?;
        params.insert("patch".to_string(), Value::Object(patch));

        let sql = format!("UPDATE {table} MERGE $patch{clause} RETURN BEFORE");
        let mut response = self.run(table, sql, params).await?;
        let updated: Vec<IgnoredAny> = response.take(0)?;

        Ok(updated.len() as u64)
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<u64, StoreError> {
        let (clause, params) = where_clause(filter)?;

        let sql = format!("DELETE {table}{clause} RETURN BEFORE");
        let mut response = self.run(table, sql, params).await?;
        let removed: Vec<IgnoredAny> = response.take(0)?;

        debug!(%table, removed = removed.len(), "Rows deleted");
        Ok(removed.len() as u64)
    }

    async fn subscribe(
        &self,
        table: Table,
        filter: &Filter,
        events: EventMask,
    ) -> Result<Subscription, StoreError> {
        // LIVE queries do not evaluate bound parameters in WHERE, so rows are
        // matched against the filter here instead
        let sql = format!("LIVE SELECT {} FROM {table}", live_fields(filter)?);
        let mut response = self.run(table, sql, Map::new()).await?;
        let stream = response.stream::<Notification<Value>>(0)?;

        let id = SubscriptionId::new(self.next_subscription.fetch_add(1, Ordering::Relaxed) + 1);
        let (sender, receiver) = mpsc::channel(self.subscription_buffer);
        let filter = filter.clone();

        let task = tokio::spawn(async move {
            let mut stream = Box::pin(stream);

            while let Some(notification) = stream.next().await {
                let notification = match notification {
                    Ok(notification) => notification,
                    Err(err) => {
                        warn!(%table, subscription = %id, error = %err, "Live notification failed");
                        continue;
                    },
                };

                let kind = match notification.action {
                    Action::Create => ChangeKind::Insert,
                    Action::Update => ChangeKind::Update,
                    Action::Delete => ChangeKind::Delete,
                    _ => continue,
                };
                if !events.includes(kind) {
                    continue;
                }

                let event = ChangeEvent::new(kind, table)
                    .with_matched(live_row_matches(&filter, &notification.data));
                if sender.send(event).await.is_err() {
                    break;
                }
            }

            debug!(%table, subscription = %id, "Live query stream ended");
        });

        self.live.lock().await.insert(id, task);
        info!(%table, subscription = %id, "Live query opened");

        Ok(Subscription::new(id, table, receiver))
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), StoreError> {
        // dropping the stream inside the task kills the live query
        if let Some(task) = self.live.lock().await.remove(&id) {
            task.abort();
            info!(subscription = %id, "Live query closed");
        }
        Ok(())
    }
}

fn take_rows(table: Table, response: &mut Response, index: usize) -> Result<Vec<Row>, StoreError> {
    match table {
        Table::Messages => take_typed::<Message>(response, index),
        Table::Participants => take_typed::<Participant>(response, index),
        Table::StudyRooms => take_typed::<StudyRoom>(response, index),
    }
}

fn take_typed<T>(response: &mut Response, index: usize) -> Result<Vec<Row>, StoreError>
where
    T: DeserializeOwned + Serialize,
{
    let records: Vec<T> = response.take(index)?;
    records.iter().map(to_row).collect()
}

/// Plain-valued fields a live notification needs to carry for matching
fn live_fields(filter: &Filter) -> Result<String, StoreError> {
    let mut fields = vec!["record::id(id) AS id".to_string()];
    for (field, _) in filter.conditions() {
        if field != "id" {
            fields.push(check_field(field)?.to_string());
        }
    }
    Ok(fields.join(", "))
}

/// Rows whose shape cannot be inspected count as matching; a spurious
/// re-fetch is harmless where a missed one is not.
fn live_row_matches(filter: &Filter, data: &Value) -> bool {
    match data {
        Value::Object(row) => filter.matches(row),
        _ => true,
    }
}

fn where_clause(filter: &Filter) -> Result<(String, Map<String, Value>), StoreError> {
    let mut params = Map::new();
    let mut conditions = Vec::new();

    for (index, (field, value)) in filter.conditions().enumerate() {
        let name = format!("f{index}");
        let lhs = if field == "id" { "record::id(id)" } else { check_field(field)? };

        conditions.push(format!("{lhs} = ${name}"));
        params.insert(name, value.clone());
    }

    if conditions.is_empty() {
        Ok((String::new(), params))
    } else {
        Ok((format!(" WHERE {}", conditions.join(" AND ")), params))
    }
}

fn classify(table: Table, err: surrealdb::Error) -> StoreError {
    let message = err.to_string();

    // unique index violations read "Database index `...` already contains ..."
    if message.contains("already contains") {
        StoreError::UniqueViolation { table: table.to_string(), message }
    } else {
        StoreError::Database(err)
    }
}
