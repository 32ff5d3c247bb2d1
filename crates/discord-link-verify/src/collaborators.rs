//! Interfaces to the game host's player and permission registries.
//!
//! The plugin does not own either registry. The host does, and it shares
//! them with every other plugin on the server. These traits are the narrow
//! slice of each registry the verification flow needs, injected into the
//! [`VerificationProcessor`](crate::VerificationProcessor) at construction.
//!
//! All methods are synchronous: the host answers from memory, and the
//! processor never caches an answer. Every membership check is a live
//! query made immediately before it is acted on.

use std::sync::Arc;

use discord_link_protocol::SteamId;

use crate::VerifyError;

/// The host's permission-group registry.
pub trait PermissionStore: Send + Sync + 'static {
    /// Whether a group named `group` exists.
    fn group_exists(&self, group: &str) -> Result<bool, VerifyError>;

    /// Creates `group` with a display `title` and a `rank`.
    fn create_group(
        &self,
        group: &str,
        title: &str,
        rank: i32,
    ) -> Result<(), VerifyError>;

    /// Whether `steam_id` is a member of `group`.
    fn user_has_group(
        &self,
        steam_id: &SteamId,
        group: &str,
    ) -> Result<bool, VerifyError>;

    /// Adds `steam_id` to `group`.
    fn add_user_group(
        &self,
        steam_id: &SteamId,
        group: &str,
    ) -> Result<(), VerifyError>;
}

/// A player as seen by the host, online or not.
pub trait Player: Send + Sync {
    /// The player's identifier.
    fn id(&self) -> &SteamId;

    /// Whether the player is currently connected to the game server.
    fn is_connected(&self) -> bool;

    /// Sends a chat reply to the player. Delivery to an offline player is
    /// the host's concern; callers check [`is_connected`](Self::is_connected)
    /// first when that matters.
    fn reply(&self, message: &str);
}

/// The host's player registry.
pub trait PlayerDirectory: Send + Sync + 'static {
    /// The host's player handle type.
    type Player: Player;

    /// Looks up a known player by id. `Ok(None)` means the host has never
    /// seen this id.
    fn find_player_by_id(
        &self,
        steam_id: &SteamId,
    ) -> Result<Option<Self::Player>, VerifyError>;
}

// Shared registries are usually handed around as `Arc`s.

impl<T: PermissionStore + ?Sized> PermissionStore for Arc<T> {
    fn group_exists(&self, group: &str) -> Result<bool, VerifyError> {
        (**self).group_exists(group)
    }

    fn create_group(
        &self,
        group: &str,
        title: &str,
        rank: i32,
    ) -> Result<(), VerifyError> {
        (**self).create_group(group, title, rank)
    }

    fn user_has_group(
        &self,
        steam_id: &SteamId,
        group: &str,
    ) -> Result<bool, VerifyError> {
        (**self).user_has_group(steam_id, group)
    }

    fn add_user_group(
        &self,
        steam_id: &SteamId,
        group: &str,
    ) -> Result<(), VerifyError> {
        (**self).add_user_group(steam_id, group)
    }
}

impl<T: PlayerDirectory + ?Sized> PlayerDirectory for Arc<T> {
    type Player = T::Player;

    fn find_player_by_id(
        &self,
        steam_id: &SteamId,
    ) -> Result<Option<Self::Player>, VerifyError> {
        (**self).find_player_by_id(steam_id)
    }
}
