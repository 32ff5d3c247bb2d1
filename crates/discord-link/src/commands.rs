//! The two chat commands players can run.

use std::sync::Arc;

use discord_link_verify::{
    PermissionStore, Player, PlayerDirectory, VerificationOutcome,
    VerificationProcessor,
};
use tracing::{debug, warn};

use crate::{LinkError, MessagesConfig, RequestOutcome, VerificationTransport};

/// What a `verify` command did.
#[derive(Debug)]
pub enum VerifyCommandOutcome {
    /// The request went out; the answer will arrive as a push.
    Requested,
    /// The answer came back immediately and was applied.
    Processed(VerificationOutcome),
    /// The service does not know the player. They were told so.
    NotLinked,
    /// The service could not be reached or answered with an HTTP error.
    /// The player was told so.
    Unreachable(LinkError),
    /// The service answered with something unreadable. The player was told
    /// so.
    Unreadable(LinkError),
}

/// Handlers for `discord` and `verify`.
pub struct Commands<T, S, D> {
    transport: T,
    processor: Arc<VerificationProcessor<S, D>>,
    messages: MessagesConfig,
}

impl<T, S, D> Commands<T, S, D>
where
    T: VerificationTransport,
    S: PermissionStore,
    D: PlayerDirectory,
{
    pub fn new(
        transport: T,
        processor: Arc<VerificationProcessor<S, D>>,
        messages: MessagesConfig,
    ) -> Self {
        Self {
            transport,
            processor,
            messages,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// `discord`: replies with the invite message. Touches nothing else.
    pub fn discord<P: Player>(&self, player: &P) {
        player.reply(&self.messages.discord_link);
    }

    /// `verify`: asks the service about the invoking player.
    ///
    /// Every failure becomes a chat reply; none is returned.
    pub async fn verify<P: Player>(&self, player: &P) -> VerifyCommandOutcome {
        let steam_id = player.id();
        if !steam_id.is_numeric() {
            warn!(%steam_id, "verify requested for a non-numeric player id");
        }

        match self.transport.request(steam_id).await {
            Ok(RequestOutcome::Pending) => {
                debug!(%steam_id, "verification requested");
                VerifyCommandOutcome::Requested
            }
            Ok(RequestOutcome::Verified(user)) => {
                let outcome = self.processor.process(&user);
                if let VerificationOutcome::Failed(_) = &outcome {
                    player.reply(&self.messages.parse_error);
                }
                VerifyCommandOutcome::Processed(outcome)
            }
            Ok(RequestOutcome::NotLinked) => {
                player.reply(&self.messages.not_verified);
                VerifyCommandOutcome::NotLinked
            }
            Err(e @ LinkError::Protocol(_)) => {
                warn!(%steam_id, error = %e, "verification response unreadable");
                player.reply(&self.messages.parse_error);
                VerifyCommandOutcome::Unreadable(e)
            }
            Err(LinkError::Polling(e)) => {
                warn!(%steam_id, error = %e, "verification listing unavailable");
                match e.status_code() {
                    Some(code) => player.reply(&self.messages.api_error_for(code)),
                    None => player.reply(&self.messages.connection_error),
                }
                VerifyCommandOutcome::Unreachable(e.into())
            }
            Err(e) => {
                warn!(%steam_id, error = %e, "verification request failed");
                player.reply(&self.messages.connection_error);
                VerifyCommandOutcome::Unreachable(e)
            }
        }
    }
}
