//! # discord-link
//!
//! Links game-server players to their verified Discord accounts.
//!
//! A player runs `verify` in game chat. The plugin asks an external
//! verification service about them; when the service reports the player
//! as linked, the plugin adds them to a permission group and tells them
//! so. The service can also push verifications on its own, for players
//! who linked their account while offline.
//!
//! ```text
//! chat command ─→ Commands ─→ VerificationTransport ─→ service
//!                                                        │
//! service push ─→ ConnectionManager ─→ Dispatcher ─→ VerificationProcessor
//!                                                        │
//!                                       PermissionStore / Player::reply
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use discord_link::prelude::*;
//!
//! # async fn run() -> Result<(), LinkError> {
//! let store = Arc::new(MemoryPermissionStore::new());
//! let players = Arc::new(MemoryPlayerDirectory::new());
//!
//! let link = DiscordLink::start_websocket(
//!     LinkConfig::default(),
//!     store,
//!     players.clone(),
//!     WebSocketConnector::new(),
//! )
//! .await?;
//!
//! let player = players.connect("76561198000000001", "rusty");
//! link.verify(&player).await;
//! link.shutdown().await
//! # }
//! ```

mod commands;
mod config;
mod dispatch;
mod error;
pub mod logging;
mod manager;
mod plugin;
mod polling;
mod transport;

pub use commands::{Commands, VerifyCommandOutcome};
pub use config::{
    ApiConfig, GroupConfig, LinkConfig, MessagesConfig, ReconnectSettings,
};
pub use dispatch::VerificationDispatcher;
pub use error::{ConnectionError, LinkError, PollingError};
pub use manager::{
    CONNECTION_NAME, ConnectionHandle, ConnectionManager, ConnectionState,
    ConnectionStatus, InboundHandler,
};
pub use plugin::DiscordLink;
pub use polling::PollingTransport;
pub use transport::{RequestOutcome, VerificationTransport};

pub use discord_link_protocol as protocol;
pub use discord_link_reconnect as reconnect;
pub use discord_link_transport as net;
pub use discord_link_verify as verify;

/// Everything a host needs to load the plugin.
pub mod prelude {
    pub use crate::{
        ConnectionState, ConnectionStatus, DiscordLink, LinkConfig, LinkError,
        VerifyCommandOutcome,
    };
    pub use discord_link_protocol::{SteamId, VerifiedUser};
    pub use discord_link_transport::WebSocketConnector;
    pub use discord_link_verify::{
        MemoryPermissionStore, MemoryPlayer, MemoryPlayerDirectory,
        PermissionStore, Player, PlayerDirectory,
    };
}
