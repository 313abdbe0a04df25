use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use studyroom_client::{Message, RoomDirectory, RoomSyncClient, RoomUpdate, RoomUser};
use studyroom_surrealdb::{RemoteStore, SurrealStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::AppConfig;

pub async fn connect(config: &AppConfig) -> Result<Arc<dyn RemoteStore>> {
    let store = SurrealStore::connect(&config.store)
        .await
        .context("Failed to connect to the room store")?;
    Ok(Arc::new(store))
}

pub async fn list_rooms(store: Arc<dyn RemoteStore>) -> Result<()> {
    let rooms = RoomDirectory::new(store).list_active().await?;

    if rooms.is_empty() {
        println!("No active rooms");
        return Ok(());
    }

    for room in rooms {
        let description = room.description.as_deref().unwrap_or("");
        println!(
            "{}  {}  (max {})  {}",
            room.id, room.name, room.max_participants, description
        );
    }
    Ok(())
}

pub async fn create_room(
    store: Arc<dyn RemoteStore>,
    user_id: &str,
    name: &str,
    description: Option<&str>,
) -> Result<()> {
    let room = RoomDirectory::new(store).create_room(user_id, name, description).await?;
    info!("Created room {} ({})", room.name, room.id);
    println!("{}", room.id);
    Ok(())
}

/// Enters the room, posts one message and exits
pub async fn send(
    store: Arc<dyn RemoteStore>,
    config: &AppConfig,
    room_id: &str,
    user: RoomUser,
    body: &str,
) -> Result<()> {
    let mut client = RoomSyncClient::new(store, &config.client);
    client.enter_room(room_id, user).await?;

    let sent = client.send_message(body).await;
    client.exit_room().await?;

    let message = sent?;
    println!("{}", message.id);
    Ok(())
}

/// Interactive session: stdin lines are posted, the transcript is echoed.
///
/// `/online` and `/away` toggle presence, `/refresh` re-fetches both views,
/// `/quit` or end of input leaves the room.
pub async fn chat(
    store: Arc<dyn RemoteStore>,
    config: &AppConfig,
    room_id: &str,
    user: RoomUser,
) -> Result<()> {
    let mut client = RoomSyncClient::new(store, &config.client);
    let mut updates = client.updates();
    client.enter_room(room_id, user).await?;

    let mut printed = HashSet::new();
    print_new_messages(&client, &mut printed);
    print_roster(&client);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let result = match line {
                    "/quit" => break,
                    "/online" => client.set_online(true).await,
                    "/away" => client.set_online(false).await,
                    "/refresh" => client.refresh().await,
                    body => client.send_message(body).await.map(|_| ()),
                };

                if let Err(e) = result {
                    eprintln!("! {}", e);
                }
            }
            update = updates.recv() => {
                match update {
                    Ok(RoomUpdate::TranscriptChanged { .. }) => {
                        print_new_messages(&client, &mut printed);
                    },
                    Ok(RoomUpdate::RosterChanged { .. }) => print_roster(&client),
                    Ok(RoomUpdate::SyncFailed { table, message, .. }) => {
                        eprintln!("! sync of {} failed: {} (try /refresh)", table, message);
                    },
                    Ok(_) => {},
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Skipped {} room updates", skipped);
                        print_new_messages(&client, &mut printed);
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    client.exit_room().await?;
    Ok(())
}

fn print_new_messages(client: &RoomSyncClient, printed: &mut HashSet<String>) {
    for message in client.snapshot().messages {
        if printed.insert(message.id.clone()) {
            println!("{}", format_message(&message));
        }
    }
}

fn print_roster(client: &RoomSyncClient) {
    let snapshot = client.snapshot();
    let names: Vec<String> = snapshot
        .participants
        .iter()
        .map(|p| {
            if p.is_online {
                p.display_name.clone()
            } else {
                format!("{} (away)", p.display_name)
            }
        })
        .collect();
    println!("-- {} online: {}", snapshot.online_count(), names.join(", "));
}

fn format_message(message: &Message) -> String {
    format!(
        "[{}] {}: {}",
        message.created_at.format("%H:%M:%S"),
        message.author_display_name,
        message.body
    )
}
