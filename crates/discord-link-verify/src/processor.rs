//! The verification processor: turns a verified user into group membership.
//!
//! # Idempotency
//!
//! The only record of "already verified" is the permission store itself.
//! Each call asks the store whether the player is in the group and only
//! adds them if not, so replaying the same event is harmless: the second
//! run finds the membership and replies "already verified" instead.
//!
//! The check and the add are two separate calls on a shared store. Within
//! this process they run under one lock, so two events for the same player
//! cannot both see "not a member". Other plugins writing to the same store
//! are outside that lock; a duplicate add from them is the store's to
//! tolerate.

use std::sync::{Mutex, PoisonError};

use discord_link_protocol::VerifiedUser;
use tracing::{debug, error, info};

use crate::{PermissionStore, Player, PlayerDirectory, VerifyError};

/// Rank given to the verification group when the processor creates it.
const GROUP_RANK: i32 = 0;

/// The two replies the processor can send to a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationMessages {
    /// Sent when the player was already in the group.
    pub already_verified: String,
    /// Sent when the player was just added to the group.
    pub now_verified: String,
}

impl Default for VerificationMessages {
    fn default() -> Self {
        Self {
            already_verified: "⚠️ You have already been verified.".into(),
            now_verified: "✅ You have been verified and added to the group!"
                .into(),
        }
    }
}

/// What processing one verified user did.
#[derive(Debug)]
pub enum VerificationOutcome {
    /// The player was added to the group. `notified` is `true` if they
    /// were online and got the "now verified" reply.
    Granted { notified: bool },
    /// The player was already in the group; nothing was changed.
    AlreadyVerified { notified: bool },
    /// A collaborator failed. Already logged; never retried.
    Failed(VerifyError),
}

impl VerificationOutcome {
    /// Whether this outcome changed group membership.
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }
}

/// Applies verified users to the configured permission group.
pub struct VerificationProcessor<S, D> {
    store: S,
    directory: D,
    group: String,
    messages: VerificationMessages,
    /// Serialises check-then-add. Holds no data.
    serial: Mutex<()>,
}

impl<S, D> VerificationProcessor<S, D>
where
    S: PermissionStore,
    D: PlayerDirectory,
{
    /// Creates a processor granting `group`.
    pub fn new(
        store: S,
        directory: D,
        group: impl Into<String>,
        messages: VerificationMessages,
    ) -> Self {
        Self {
            store,
            directory,
            group: group.into(),
            messages,
            serial: Mutex::new(()),
        }
    }

    /// The group this processor grants.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The permission store this processor writes to.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The player directory this processor reads from.
    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Creates the verification group if the store does not have it yet.
    ///
    /// Returns `true` if the group was created by this call.
    pub fn ensure_group(&self) -> Result<bool, VerifyError> {
        if self.store.group_exists(&self.group)? {
            return Ok(false);
        }
        self.store.create_group(&self.group, &self.group, GROUP_RANK)?;
        info!(group = %self.group, "created permission group");
        Ok(true)
    }

    /// Applies one verified user.
    ///
    /// Never returns an error: failures are logged with the player's
    /// identifiers and handed back as [`VerificationOutcome::Failed`].
    pub fn process(&self, user: &VerifiedUser) -> VerificationOutcome {
        let _serial = self.serial.lock().unwrap_or_else(PoisonError::into_inner);

        match self.apply(user) {
            Ok(outcome) => outcome,
            Err(e) => {
                let e = e.for_player(&user.steam_id);
                error!(
                    steam_id = %user.steam_id,
                    discord_id = %user.discord_id,
                    group = %self.group,
                    error = %e,
                    "failed to apply verification"
                );
                VerificationOutcome::Failed(e)
            }
        }
    }

    fn apply(
        &self,
        user: &VerifiedUser,
    ) -> Result<VerificationOutcome, VerifyError> {
        let online = self
            .directory
            .find_player_by_id(&user.steam_id)?
            .filter(|p| p.is_connected());

        if self.store.user_has_group(&user.steam_id, &self.group)? {
            if let Some(player) = &online {
                player.reply(&self.messages.already_verified);
            }
            debug!(
                steam_id = %user.steam_id,
                group = %self.group,
                online = online.is_some(),
                "player already verified"
            );
            return Ok(VerificationOutcome::AlreadyVerified {
                notified: online.is_some(),
            });
        }

        self.store.add_user_group(&user.steam_id, &self.group)?;
        if let Some(player) = &online {
            player.reply(&self.messages.now_verified);
        }
        info!(
            steam_id = %user.steam_id,
            steam_name = %user.steam_name,
            discord_id = %user.discord_id,
            discord_username = %user.discord_username,
            group = %self.group,
            online = online.is_some(),
            "granted verification group"
        );
        Ok(VerificationOutcome::Granted {
            notified: online.is_some(),
        })
    }
}
