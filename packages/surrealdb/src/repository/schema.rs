use surrealdb::{Connection, Surreal};
use tracing::debug;

use crate::gateway::Table;
use crate::repository::error::StoreError;

const SCHEMA: &str = include_str!("../../migrations/studyroom.surql");

/// Defines tables and indexes. Safe to run repeatedly.
pub async fn define_schema<C: Connection>(db: &Surreal<C>) -> Result<(), StoreError> {
    debug!("Applying study room schema");
    db.query(SCHEMA).await?.check()?;
    Ok(())
}

/// Columns selected for each table. The record key is exposed as `id` and
/// datetimes as fixed-width RFC 3339 UTC strings, which sort chronologically.
pub(crate) fn projection(table: Table) -> &'static str {
    match table {
        Table::Messages => concat!(
            "record::id(id) AS id, room_id, author_id, author_display_name, body, ",
            "time::format(created_at, '%Y-%m-%dT%H:%M:%S%.9fZ') AS created_at"
        ),
        Table::Participants => "record::id(id) AS id, room_id, user_id, display_name, is_online",
        Table::StudyRooms => concat!(
            "record::id(id) AS id, name, description, created_by, is_active, max_participants, ",
            "time::format(created_at, '%Y-%m-%dT%H:%M:%S%.9fZ') AS created_at"
        ),
    }
}

/// Field names are interpolated into queries, so only plain identifiers pass.
pub(crate) fn check_field(field: &str) -> Result<&str, StoreError> {
    let mut chars = field.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if valid {
        Ok(field)
    } else {
        Err(StoreError::InvalidField { field: field.to_string() })
    }
}
