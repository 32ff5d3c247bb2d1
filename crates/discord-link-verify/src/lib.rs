//! Verification processing for discord-link.
//!
//! This crate owns the one piece of game-server state the plugin changes:
//! membership of the verification group.
//!
//! 1. **Collaborators**: the host's registries, behind narrow traits
//!    ([`PermissionStore`], [`PlayerDirectory`], [`Player`])
//! 2. **Processing**: applying a verified user idempotently
//!    ([`VerificationProcessor`])
//! 3. **In-memory registries**: for the demo host and for tests
//!    ([`MemoryPermissionStore`], [`MemoryPlayerDirectory`])
//!
//! ```text
//! Protocol (VerifiedUser) → Processor → PermissionStore / Player::reply
//! ```

mod collaborators;
mod error;
mod memory;
mod processor;

pub use collaborators::{PermissionStore, Player, PlayerDirectory};
pub use error::VerifyError;
pub use memory::{MemoryPermissionStore, MemoryPlayer, MemoryPlayerDirectory};
pub use processor::{
    VerificationMessages, VerificationOutcome, VerificationProcessor,
};
