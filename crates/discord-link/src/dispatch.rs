//! Routes inbound frames from the connection to the verification processor.

use std::sync::Arc;

use discord_link_protocol::{Inbound, ServiceEvent, VerificationCodec};
use discord_link_verify::{
    PermissionStore, PlayerDirectory, VerificationProcessor,
};
use tracing::{debug, warn};

use crate::InboundHandler;

/// Decodes each frame and hands `user_verified` payloads to the processor.
///
/// Frames with no type or an unknown type are dropped at debug level.
/// Malformed frames are dropped with a warning carrying the raw text.
/// Nothing here can take the connection down.
pub struct VerificationDispatcher<S, D> {
    codec: VerificationCodec,
    processor: Arc<VerificationProcessor<S, D>>,
}

impl<S, D> VerificationDispatcher<S, D>
where
    S: PermissionStore,
    D: PlayerDirectory,
{
    pub fn new(processor: Arc<VerificationProcessor<S, D>>) -> Self {
        Self {
            codec: VerificationCodec::new(),
            processor,
        }
    }
}

impl<S, D> InboundHandler for VerificationDispatcher<S, D>
where
    S: PermissionStore,
    D: PlayerDirectory,
{
    fn handle_frame(&self, data: &[u8]) {
        match self.codec.decode_frame(data) {
            Ok(Inbound::Event(event)) => {
                debug!(event = event.event_type(), "service event received");
                match event {
                    ServiceEvent::UserVerified(user) => {
                        self.processor.process(&user);
                    }
                }
            }
            Ok(Inbound::Ignored(reason)) => {
                debug!(%reason, "ignoring frame");
            }
            Err(e) => {
                warn!(
                    error = %e,
                    raw = e.raw_input().unwrap_or_default(),
                    "discarding malformed frame"
                );
            }
        }
    }
}
