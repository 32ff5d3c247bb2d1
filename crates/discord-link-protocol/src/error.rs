//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means the bytes themselves were wrong: the
//! connection that carried them is fine, and there is nothing to retry.

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// `raw` holds the offending input (lossily decoded as UTF-8) so it
    /// can be logged next to the parse failure.
    #[cfg(feature = "json")]
    #[error("decode failed: {source}")]
    Decode {
        raw: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    /// Builds a [`ProtocolError::Decode`] from the raw bytes and the
    /// parse failure.
    #[cfg(feature = "json")]
    pub fn decode(data: &[u8], source: serde_json::Error) -> Self {
        Self::Decode {
            raw: String::from_utf8_lossy(data).into_owned(),
            source,
        }
    }

    /// Returns the raw input of a decode failure.
    pub fn raw_input(&self) -> Option<&str> {
        match self {
            #[cfg(feature = "json")]
            Self::Decode { raw, .. } => Some(raw),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}
