use std::time::Duration;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use studyroom_entity::{Message, NewMessage, NewParticipant, Participant};
use studyroom_surrealdb::test_utils::TestDatabase;
use studyroom_surrealdb::{
    ChangeEvent, ChangeKind, EventMask, Filter, OrderBy, RemoteStore, StoreError, Subscription,
    Table, from_row, to_row,
};

fn message_at(room_id: &str, body: &str, secs: i64) -> NewMessage {
    let mut message = match NewMessage::new(room_id, "U1", "Alice", body) {
        Ok(message) => message,
        Err(e) => panic!("Invalid test message: {:?}", e),
    };
    message.created_at = Some(Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap());
    message
}

#[tokio::test]
async fn test_query_returns_filtered_rows_in_order() {
    let test_db = TestDatabase::new().await.unwrap();
    let store = test_db.store();

    for (body, secs) in [("second", 20), ("first", 10), ("third", 30)] {
        store.insert(Table::Messages, to_row(&message_at("R1", body, secs)).unwrap()).await.unwrap();
    }
    store.insert(Table::Messages, to_row(&message_at("R2", "elsewhere", 0)).unwrap()).await.unwrap();

    let rows = store
        .query(Table::Messages, &Filter::new().eq("room_id", "R1"), Some(&OrderBy::asc("created_at")))
        .await
        .unwrap();

    let bodies: Vec<String> = rows
        .into_iter()
        .map(|row| from_row::<Message>(row).unwrap().body)
        .collect();
    assert_eq!(bodies, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_sub_second_timestamps_sort_chronologically() {
    let test_db = TestDatabase::new().await.unwrap();
    let store = test_db.store();
    let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

    // serialized with 9, 3 and 0 fractional digits
    for (body, nanos) in [("latest", 123_456_789), ("middle", 123_000_000), ("earliest", 0)] {
        let mut message = message_at("R1", body, 0);
        message.created_at = Some(base + chrono::Duration::nanoseconds(nanos));
        store.insert(Table::Messages, to_row(&message).unwrap()).await.unwrap();
    }

    let rows = store
        .query(Table::Messages, &Filter::new().eq("room_id", "R1"), Some(&OrderBy::asc("created_at")))
        .await
        .unwrap();
    let messages: Vec<Message> = rows.into_iter().map(|row| from_row(row).unwrap()).collect();

    let bodies: Vec<&str> = messages.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, vec!["earliest", "middle", "latest"]);
    assert_eq!(messages[2].created_at, base + chrono::Duration::nanoseconds(123_456_789));
}

#[tokio::test]
async fn test_store_stamps_creation_time() {
    let test_db = TestDatabase::new().await.unwrap();
    let store = test_db.store();
    let before = Utc::now();

    let message = NewMessage::new("R1", "U1", "Alice", "Hello").unwrap();
    assert_eq!(message.created_at, None);

    let stored: Message =
        from_row(store.insert(Table::Messages, to_row(&message).unwrap()).await.unwrap()).unwrap();
    assert_eq!(stored.body, "Hello");
    assert!(stored.created_at >= before - chrono::Duration::seconds(1));

    let rows = store
        .query(Table::Messages, &Filter::new().eq("id", stored.id.as_str()), None)
        .await
        .unwrap();
    assert_eq!(from_row::<Message>(rows[0].clone()).unwrap(), stored);
}

#[tokio::test]
async fn test_insert_assigns_id_visible_to_queries() {
    let test_db = TestDatabase::new().await.unwrap();
    let store = test_db.store();

    let stored = store
        .insert(Table::Participants, to_row(&NewParticipant::new("R1", "U1", "Alice")).unwrap())
        .await
        .unwrap();
    let participant: Participant = from_row(stored).unwrap();
    assert!(!participant.id.is_empty());

    let rows = store
        .query(Table::Participants, &Filter::new().eq("id", participant.id.as_str()), None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(from_row::<Participant>(rows[0].clone()).unwrap(), participant);
}

#[tokio::test]
async fn test_duplicate_membership_is_unique_violation() {
    let test_db = TestDatabase::new().await.unwrap();
    let store = test_db.store();
    let row = to_row(&NewParticipant::new("R1", "U2", "Bob")).unwrap();

    store.insert(Table::Participants, row.clone()).await.unwrap();
    let err = store.insert(Table::Participants, row).await.unwrap_err();

    assert!(err.is_unique_violation(), "unexpected error: {err}");

    let rows = store
        .query(Table::Participants, &Filter::new().eq("room_id", "R1"), None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_update_and_delete_report_counts() {
    let test_db = TestDatabase::new().await.unwrap();
    let store = test_db.store();

    store
        .insert(Table::Participants, to_row(&NewParticipant::new("R1", "U1", "Alice")).unwrap())
        .await
        .unwrap();

    let membership = Filter::new().eq("room_id", "R1").eq("user_id", "U1");
    let patch = to_row(&serde_json::json!({ "is_online": false })).unwrap();
    assert_eq!(store.update(Table::Participants, &membership, patch).await.unwrap(), 1);

    let rows = store.query(Table::Participants, &membership, None).await.unwrap();
    assert!(!from_row::<Participant>(rows[0].clone()).unwrap().is_online);

    assert_eq!(store.delete(Table::Participants, &membership).await.unwrap(), 1);
    assert_eq!(store.delete(Table::Participants, &membership).await.unwrap(), 0);
}

#[tokio::test]
async fn test_invalid_field_is_rejected_before_querying() {
    let test_db = TestDatabase::new().await.unwrap();
    let store = test_db.store();

    let result = store
        .query(Table::Messages, &Filter::new().eq("room_id OR 1", "R1"), None)
        .await;
    assert!(matches!(result, Err(StoreError::InvalidField { .. })));
}

async fn next_event(subscription: &mut Subscription) -> ChangeEvent {
    match tokio::time::timeout(Duration::from_secs(5), subscription.next()).await {
        Ok(Some(event)) => event,
        other => panic!("Expected change notification, got {:?}", other),
    }
}

#[tokio::test]
async fn test_live_insert_is_notified_with_match_flag() {
    let test_db = TestDatabase::new().await.unwrap();
    let store = test_db.store();

    let mut subscription = store
        .subscribe(Table::Messages, &Filter::new().eq("room_id", "R1"), EventMask::INSERT)
        .await
        .unwrap();
    assert_eq!(subscription.table(), Table::Messages);

    store.insert(Table::Messages, to_row(&message_at("R2", "Elsewhere", 0)).unwrap()).await.unwrap();
    store.insert(Table::Messages, to_row(&message_at("R1", "Hello", 1)).unwrap()).await.unwrap();

    let other_room = next_event(&mut subscription).await;
    assert_eq!(other_room.kind, ChangeKind::Insert);
    assert!(!other_room.matched);

    let same_room = next_event(&mut subscription).await;
    assert_eq!(same_room, ChangeEvent::new(ChangeKind::Insert, Table::Messages));
}

#[tokio::test]
async fn test_live_membership_changes_are_notified() {
    let test_db = TestDatabase::new().await.unwrap();
    let store = test_db.store();
    let membership = Filter::new().eq("room_id", "R1").eq("user_id", "U1");

    let mut subscription = store
        .subscribe(Table::Participants, &Filter::new().eq("room_id", "R1"), EventMask::ALL)
        .await
        .unwrap();

    store
        .insert(Table::Participants, to_row(&NewParticipant::new("R1", "U1", "Alice")).unwrap())
        .await
        .unwrap();
    let patch = to_row(&serde_json::json!({ "is_online": false })).unwrap();
    store.update(Table::Participants, &membership, patch).await.unwrap();
    store.delete(Table::Participants, &membership).await.unwrap();

    let kinds = [
        next_event(&mut subscription).await,
        next_event(&mut subscription).await,
        next_event(&mut subscription).await,
    ]
    .map(|event| (event.kind, event.matched));
    assert_eq!(
        kinds,
        [(ChangeKind::Insert, true), (ChangeKind::Update, true), (ChangeKind::Delete, true)]
    );
}

#[tokio::test]
async fn test_unsubscribe_ends_stream() {
    let test_db = TestDatabase::new().await.unwrap();
    let store = test_db.store();

    let mut subscription = store
        .subscribe(Table::Participants, &Filter::new().eq("room_id", "R1"), EventMask::ALL)
        .await
        .unwrap();
    assert_eq!(store.open_subscriptions().await, 1);

    store.unsubscribe(subscription.id()).await.unwrap();
    assert_eq!(store.open_subscriptions().await, 0);

    // second release of the same handle is a no-op
    store.unsubscribe(subscription.id()).await.unwrap();

    let next = tokio::time::timeout(Duration::from_secs(5), subscription.next()).await;
    assert!(matches!(next, Ok(None)));
}
