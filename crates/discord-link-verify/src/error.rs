//! Error types for the verification layer.

use discord_link_protocol::SteamId;

/// Errors raised while applying a verification to player state.
///
/// The first two variants are what collaborators return; the processor
/// wraps them in [`VerifyError::Processing`] together with the player the
/// failure was about, so the log line carries full context.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// The permission store rejected or failed an operation.
    #[error("permission store: {0}")]
    Store(String),

    /// The player directory failed a lookup.
    #[error("player directory: {0}")]
    Directory(String),

    /// Applying a verification for `steam_id` failed part-way.
    #[error("processing verification for {steam_id} failed: {source}")]
    Processing {
        steam_id: SteamId,
        #[source]
        source: Box<VerifyError>,
    },
}

impl VerifyError {
    /// Wraps `self` with the player it concerns.
    pub fn for_player(self, steam_id: &SteamId) -> Self {
        Self::Processing {
            steam_id: steam_id.clone(),
            source: Box::new(self),
        }
    }
}
