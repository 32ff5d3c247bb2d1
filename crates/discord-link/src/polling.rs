//! HTTP polling transport.
//!
//! For deployments without the push channel: each `verify` fetches the
//! service's full listing of verified users and scans it for the player.

use std::time::Duration;

use discord_link_protocol::{SteamId, VerificationCodec};
use reqwest::StatusCode;
use tracing::debug;

use crate::{LinkError, PollingError, RequestOutcome, VerificationTransport};

/// How long one listing fetch may take.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Answers verification requests by fetching the verified-user listing.
#[derive(Debug, Clone)]
pub struct PollingTransport {
    client: reqwest::Client,
    url: String,
    codec: VerificationCodec,
}

impl PollingTransport {
    /// Creates a transport for the listing at `url`.
    ///
    /// # Errors
    /// [`PollingError::Request`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> Result<Self, PollingError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, url))
    }

    /// Creates a transport that reuses an existing client.
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            codec: VerificationCodec::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Vec<u8>, PollingError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(PollingError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(PollingError::EmptyBody);
        }
        Ok(body.to_vec())
    }
}

impl VerificationTransport for PollingTransport {
    /// Fetches the listing and looks for `steam_id` in it.
    ///
    /// # Errors
    /// [`LinkError::Polling`] if the listing could not be fetched, and
    /// [`LinkError::Protocol`] if it is not a JSON array of users.
    async fn request(
        &self,
        steam_id: &SteamId,
    ) -> Result<RequestOutcome, LinkError> {
        let body = self.fetch().await?;
        let users = self.codec.decode_user_list(&body)?;
        debug!(url = %self.url, users = users.len(), "fetched verified users");

        Ok(users
            .into_iter()
            .find(|user| &user.steam_id == steam_id)
            .map_or(RequestOutcome::NotLinked, RequestOutcome::Verified))
    }
}
