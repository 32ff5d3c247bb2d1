//! A stand-in game server for trying discord-link by hand.
//!
//! Players and the permission registry live in memory; chat commands come
//! from stdin, one per line:
//!
//! ```text
//! join <steam-id> <name>    a player connects
//! leave <steam-id>          a player disconnects
//! discord <steam-id>        the player runs `discord`
//! verify <steam-id>         the player runs `verify`
//! members                   list the verification group
//! status                    show the push connection
//! quit
//! ```
//!
//! Usage: `console-host [config.json] [--poll]`. Without a config file the
//! defaults apply, with `DISCORD_LINK_URL` overriding the WebSocket URL.

use std::collections::HashMap;
use std::sync::Arc;

use discord_link::prelude::*;
use discord_link::{VerificationTransport, logging};
use tokio::io::{AsyncBufReadExt, BufReader};

type Store = Arc<MemoryPermissionStore>;
type Players = Arc<MemoryPlayerDirectory>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init("info,discord_link=debug");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let poll = args.iter().any(|a| a == "--poll");
    let config = load_config(args.iter().find(|a| !a.starts_with("--")))?;

    let store: Store = Arc::new(MemoryPermissionStore::new());
    let players: Players = Arc::new(MemoryPlayerDirectory::new());

    if poll {
        let link = DiscordLink::start_polling(config, store.clone(), players.clone())?;
        run_console(link, store, players).await
    } else {
        let link = DiscordLink::start_websocket(
            config,
            store.clone(),
            players.clone(),
            WebSocketConnector::new(),
        )
        .await?;
        run_console(link, store, players).await
    }
}

fn load_config(path: Option<&String>) -> Result<LinkConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(path) => LinkConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => LinkConfig::default(),
    };
    if let Ok(url) = std::env::var("DISCORD_LINK_URL") {
        config.api.web_socket_url = url;
    }
    Ok(config)
}

async fn run_console<T: VerificationTransport>(
    link: DiscordLink<T, Store, Players>,
    store: Store,
    players: Players,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut online: HashMap<SteamId, MemoryPlayer> = HashMap::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    eprintln!("ready; type `quit` to unload");

    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => {}
            ["quit"] => break,
            ["join", id, name] => {
                let player = players.connect(*id, name);
                online.insert(player.id().clone(), player);
            }
            ["leave", id] => {
                let id = SteamId::new(*id);
                players.disconnect(&id);
                online.remove(&id);
            }
            ["discord", id] => match online.get(&SteamId::new(*id)) {
                Some(player) => link.discord(player),
                None => eprintln!("{id} is not online"),
            },
            ["verify", id] => match online.get(&SteamId::new(*id)) {
                Some(player) => {
                    let outcome = link.verify(player).await;
                    tracing::debug!(?outcome, "verify finished");
                }
                None => eprintln!("{id} is not online"),
            },
            ["members"] => {
                for member in store.members(link.processor().group()) {
                    println!("  {member}");
                }
            }
            ["status"] => match link.connection() {
                Some(connection) => println!("{:#?}", connection.status().await?),
                None => println!("polling {}", link.config().api.verified_users_url),
            },
            _ => eprintln!("unknown command: {line}"),
        }

        // Pushed verifications can land between commands.
        print_replies(&online);
    }

    link.shutdown().await?;
    Ok(())
}

fn print_replies(online: &HashMap<SteamId, MemoryPlayer>) {
    for player in online.values() {
        for reply in player.take_replies() {
            println!("[{}] {reply}", player.name());
        }
    }
}
