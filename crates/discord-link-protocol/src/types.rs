//! Wire types exchanged with the verification service.
//!
//! Inbound, the service pushes tagged events:
//!
//! ```text
//! { "type": "user_verified", "data": { "id": 1, "steamId": "7656…", … } }
//! ```
//!
//! Outbound, the plugin sends one kind of request:
//!
//! ```text
//! { "action": "verify", "steamId": "7656…" }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// The `type` tag of the only event the plugin acts on.
pub const USER_VERIFIED: &str = "user_verified";

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A game-server player identifier (a 64-bit Steam ID in decimal).
///
/// Kept as a string: that is how both the game host and the service
/// hand it around, and nothing here does arithmetic on it. Serialized
/// transparently, so `SteamId("7656")` is just `"7656"` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SteamId(String);

impl SteamId {
    /// Wraps a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the identifier is a non-empty run of ASCII digits.
    pub fn is_numeric(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit())
    }
}

impl fmt::Display for SteamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SteamId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SteamId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A player whose game account the service has linked to a Discord account.
///
/// `id` and `steamId` are required. The display and avatar fields default
/// to empty strings when the service leaves them out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedUser {
    /// The service's own record id.
    pub id: i64,
    /// The linked game account.
    pub steam_id: SteamId,
    #[serde(default)]
    pub steam_name: String,
    #[serde(default)]
    pub steam_avatar_url: String,
    /// The linked Discord account id (a snowflake, as a string).
    #[serde(default)]
    pub discord_id: String,
    #[serde(default)]
    pub discord_username: String,
    #[serde(default)]
    pub discord_avatar: String,
}

/// A typed event pushed by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    /// A player finished linking their accounts.
    UserVerified(VerifiedUser),
}

impl ServiceEvent {
    /// The wire `type` tag of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::UserVerified(_) => USER_VERIFIED,
        }
    }
}

/// Why a well-formed frame was dropped without processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The frame has no `type` field.
    MissingType,
    /// The frame's `type` is not one the plugin handles.
    UnknownType(String),
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingType => write!(f, "frame has no type"),
            Self::UnknownType(kind) => write!(f, "unhandled frame type {kind:?}"),
        }
    }
}

/// The result of decoding one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A frame the plugin should act on.
    Event(ServiceEvent),
    /// A well-formed frame the plugin does not handle.
    Ignored(IgnoreReason),
}

/// The loose envelope every inbound frame must parse as.
#[cfg(feature = "json")]
#[derive(Debug, Deserialize)]
pub(crate) struct RawFrame {
    #[serde(rename = "type")]
    pub(crate) kind: Option<String>,
    pub(crate) data: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// A request frame sent to the service.
///
/// `#[serde(tag = "action")]` puts the variant name in an `action` field
/// next to the variant's own fields, which gives the flat two-key object
/// the service expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum VerificationRequest {
    /// Ask the service to check (and eventually push) a player's link.
    Verify {
        #[serde(rename = "steamId")]
        steam_id: SteamId,
    },
}

impl VerificationRequest {
    /// Builds a `verify` request for `steam_id`.
    pub fn verify(steam_id: SteamId) -> Self {
        Self::Verify { steam_id }
    }

    /// The player this request is about.
    pub fn steam_id(&self) -> &SteamId {
        match self {
            Self::Verify { steam_id } => steam_id,
        }
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;

    #[test]
    fn test_steam_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&SteamId::new("7656")).unwrap();
        assert_eq!(json, "\"7656\"");
    }

    #[test]
    fn test_steam_id_is_numeric() {
        assert!(SteamId::new("76561198000000001").is_numeric());
        assert!(!SteamId::new("").is_numeric());
        assert!(!SteamId::new("7656x").is_numeric());
    }

    #[test]
    fn test_verified_user_uses_camel_case_keys() {
        let user = VerifiedUser {
            id: 3,
            steam_id: SteamId::new("1"),
            steam_name: "a".into(),
            steam_avatar_url: "b".into(),
            discord_id: "c".into(),
            discord_username: "d".into(),
            discord_avatar: "e".into(),
        };
        let value = serde_json::to_value(&user).unwrap();
        for key in [
            "id",
            "steamId",
            "steamName",
            "steamAvatarUrl",
            "discordId",
            "discordUsername",
            "discordAvatar",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
    }

    #[test]
    fn test_verification_request_roundtrips_through_action_tag() {
        let parsed: VerificationRequest =
            serde_json::from_str(r#"{"action":"verify","steamId":"42"}"#)
                .unwrap();
        assert_eq!(parsed.steam_id(), &SteamId::new("42"));
    }

    #[test]
    fn test_service_event_type_tag() {
        let event = ServiceEvent::UserVerified(VerifiedUser {
            id: 1,
            steam_id: SteamId::new("1"),
            steam_name: String::new(),
            steam_avatar_url: String::new(),
            discord_id: String::new(),
            discord_username: String::new(),
            discord_avatar: String::new(),
        });
        assert_eq!(event.event_type(), USER_VERIFIED);
    }

    #[test]
    fn test_ignore_reason_display() {
        assert_eq!(
            IgnoreReason::UnknownType("ping".into()).to_string(),
            "unhandled frame type \"ping\""
        );
    }
}
