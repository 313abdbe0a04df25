#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use studyroom_client::RoomUser;

mod commands;
mod config;
mod logging;

use config::AppConfig;

#[derive(Parser)]
#[command(version, about = "Study room chat and presence", long_about = None)]
struct Cli {
    /// Path to config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List active study rooms, newest first
    Rooms,

    /// Create a study room and print its id
    CreateRoom {
        /// Creating user id
        #[arg(long)]
        user: String,

        name: String,

        #[arg(long)]
        description: Option<String>,
    },

    /// Join a room and chat interactively
    Chat {
        room_id: String,

        #[arg(long)]
        user: String,

        /// Display name shown to other participants
        #[arg(long)]
        name: String,
    },

    /// Post a single message to a room
    Send {
        room_id: String,

        #[arg(long)]
        user: String,

        #[arg(long)]
        name: String,

        body: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    let _guard = logging::init(&config.log)?;

    let store = commands::connect(&config).await?;

    match cli.command {
        Commands::Rooms => commands::list_rooms(store).await?,
        Commands::CreateRoom { user, name, description } => {
            commands::create_room(store, &user, &name, description.as_deref()).await?
        },
        Commands::Chat { room_id, user, name } => {
            commands::chat(store, &config, &room_id, RoomUser::new(user, name)).await?
        },
        Commands::Send { room_id, user, name, body } => {
            commands::send(store, &config, &room_id, RoomUser::new(user, name), &body).await?
        },
    }

    Ok(())
}
