//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! [`JsonCodec`] is the only implementation: the verification service
//! speaks JSON text frames and serves JSON over HTTP.
//!
//! [`VerificationCodec`] sits on top of a [`Codec`] and knows the shape of
//! the service's frames: which event types exist, which ones to drop, and
//! how a `verify` request looks on the wire.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;
#[cfg(feature = "json")]
use crate::types::{
    IgnoreReason, Inbound, RawFrame, ServiceEvent, VerificationRequest,
    VerifiedUser, USER_VERIFIED,
};
#[cfg(feature = "json")]
use crate::SteamId;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because a codec lives inside the connection
/// manager's actor task for the lifetime of the plugin.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use discord_link_protocol::{Codec, JsonCodec, SteamId};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&SteamId::new("76561198000000001")).unwrap();
/// assert_eq!(bytes, br#""76561198000000001""#);
///
/// let back: SteamId = codec.decode(&bytes).unwrap();
/// assert_eq!(back.as_str(), "76561198000000001");
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data)
            .map_err(|e| ProtocolError::decode(data, e))
    }
}

// ---------------------------------------------------------------------------
// VerificationCodec
// ---------------------------------------------------------------------------

/// Frame-level codec for the verification service.
///
/// Decoding happens in two steps. First the frame is parsed as a loose
/// `{type, data}` envelope; anything that is not even that is a
/// [`ProtocolError::Decode`]. Then the `type` picks the payload schema.
/// Frames whose type is absent or unknown are not errors: they come back
/// as [`Inbound::Ignored`] so the caller can log and move on.
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct VerificationCodec {
    codec: JsonCodec,
}

#[cfg(feature = "json")]
impl VerificationCodec {
    /// Creates a new frame codec.
    pub fn new() -> Self {
        Self { codec: JsonCodec }
    }

    /// Decodes one inbound frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] when the frame is not a JSON
    /// object of the envelope shape, or when a `user_verified` frame
    /// carries a payload that does not match [`VerifiedUser`].
    pub fn decode_frame(&self, data: &[u8]) -> Result<Inbound, ProtocolError> {
        let frame: RawFrame = self.codec.decode(data)?;

        let Some(kind) = frame.kind else {
            return Ok(Inbound::Ignored(IgnoreReason::MissingType));
        };
        if kind != USER_VERIFIED {
            return Ok(Inbound::Ignored(IgnoreReason::UnknownType(kind)));
        }

        let payload = frame.data.ok_or_else(|| {
            ProtocolError::decode(
                data,
                <serde_json::Error as serde::de::Error>::missing_field(
                    "data",
                ),
            )
        })?;
        let user: VerifiedUser = serde_json::from_value(payload)
            .map_err(|e| ProtocolError::decode(data, e))?;

        Ok(Inbound::Event(ServiceEvent::UserVerified(user)))
    }

    /// Encodes a request frame as JSON text.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    pub fn encode_request(
        &self,
        request: &VerificationRequest,
    ) -> Result<String, ProtocolError> {
        serde_json::to_string(request).map_err(ProtocolError::Encode)
    }

    /// Shorthand for encoding a `verify` request for `steam_id`.
    pub fn encode_verify(
        &self,
        steam_id: &SteamId,
    ) -> Result<String, ProtocolError> {
        self.encode_request(&VerificationRequest::verify(steam_id.clone()))
    }

    /// Decodes a JSON array of verified users (the HTTP listing).
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the body is not such an array.
    pub fn decode_user_list(
        &self,
        data: &[u8],
    ) -> Result<Vec<VerifiedUser>, ProtocolError> {
        self.codec.decode(data)
    }
}
