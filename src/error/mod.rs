use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced by the realtime layer.
///
/// The public client methods never return these: `connect` and `send` speak
/// booleans, and transport failures flow through the connection-state
/// listeners. This type serves the configuration layer, the probe binary,
/// and internal plumbing.
#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("Invalid stored user record: {0}")]
    InvalidUserRecord(#[from] serde_json::Error),

    #[error("Stored user record has no usable id")]
    MissingUserId,

    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, RealtimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = RealtimeError::MissingCredential("userToken");
        assert_eq!(err.to_string(), "Missing credential: userToken");

        let err = RealtimeError::MissingUserId;
        assert!(err.to_string().contains("no usable id"));
    }
}
