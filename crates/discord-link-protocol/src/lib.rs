//! Wire protocol for the discord-link verification service.
//!
//! - **Types** ([`SteamId`], [`VerifiedUser`], [`ServiceEvent`],
//!   [`VerificationRequest`]): what travels on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`], [`VerificationCodec`]):
//!   how those messages are converted to/from bytes, and which inbound
//!   frames are events versus noise.
//! - **Errors** ([`ProtocolError`]): what can go wrong while doing so.
//!
//! ```text
//! Transport (bytes) → Protocol (Inbound) → Verification processor
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::{JsonCodec, VerificationCodec};
pub use error::ProtocolError;
pub use types::{
    IgnoreReason, Inbound, ServiceEvent, SteamId, VerificationRequest,
    VerifiedUser, USER_VERIFIED,
};
