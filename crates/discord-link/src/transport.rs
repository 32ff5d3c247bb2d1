//! How a `verify` command asks the service about a player.
//!
//! Two transports exist. Over the WebSocket the request is fire-and-forget:
//! the answer, if any, arrives later as a `user_verified` push and goes
//! through the same processor as every other push. Over HTTP polling the
//! answer comes back in the same call.

use std::future::Future;

use discord_link_protocol::{SteamId, VerificationCodec, VerifiedUser};
use tracing::debug;

use crate::{ConnectionError, ConnectionHandle, ConnectionState, LinkError};

/// The result of one verification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The request was handed to the service; the answer will be pushed.
    Pending,
    /// The service knows this player as linked.
    Verified(VerifiedUser),
    /// The service does not know this player.
    NotLinked,
}

/// Something that can ask the verification service about one player.
pub trait VerificationTransport: Send + Sync + 'static {
    /// Requests verification for `steam_id`.
    fn request(
        &self,
        steam_id: &SteamId,
    ) -> impl Future<Output = Result<RequestOutcome, LinkError>> + Send;
}

impl VerificationTransport for ConnectionHandle {
    /// Sends `{"action":"verify","steamId":...}` on the open connection.
    ///
    /// # Errors
    /// [`ConnectionError::NotConnected`] if the connection is not open, in
    /// which case nothing is sent. [`ConnectionError::Rejected`] if the
    /// frame was not accepted.
    async fn request(
        &self,
        steam_id: &SteamId,
    ) -> Result<RequestOutcome, LinkError> {
        if self.state().await != ConnectionState::Connected {
            return Err(ConnectionError::NotConnected.into());
        }

        let frame = VerificationCodec::new().encode_verify(steam_id)?;
        if !self.send(frame).await? {
            return Err(ConnectionError::Rejected.into());
        }

        debug!(%steam_id, "verify request sent");
        Ok(RequestOutcome::Pending)
    }
}
