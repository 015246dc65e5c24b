//! Socket transport seam.
//!
//! The connection runner talks to the network through the [`Transport`] and
//! [`Connector`] traits; reconnection dials a fresh transport through the
//! connector each attempt. Production uses the tokio-tungstenite
//! implementation in [`ws`]; tests script their own.

pub mod ws;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::protocol::Role;

/// Transport-level failures.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Close failed: {0}")]
    Close(String),
}

/// A live, ordered, reliable text-frame transport.
#[async_trait]
pub trait Transport: Send {
    /// Transmit one text frame.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Receive the next text frame. `None` means the peer closed cleanly.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the transport. Closing an already-closed transport is fine.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Factory dialing a fresh [`Transport`] per connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError>;
}

/// Build the connection URI: the configured base plus the `userId`,
/// `userType`, and `token` query parameters (percent-encoded).
pub fn endpoint_url(
    base: &str,
    role: Role,
    user_id: &str,
    token: &str,
) -> Result<String, url::ParseError> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut()
        .append_pair("userId", user_id)
        .append_pair("userType", role.as_str())
        .append_pair("token", token);
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        let url = endpoint_url("wss://rt.roadcall.dev/ws", Role::Customer, "fb-123", "tok").unwrap();
        assert_eq!(
            url,
            "wss://rt.roadcall.dev/ws?userId=fb-123&userType=customer&token=tok"
        );
    }

    #[test]
    fn test_endpoint_url_percent_encodes() {
        let url = endpoint_url("ws://localhost:8081/ws", Role::Provider, "u 1", "a+b/c").unwrap();
        assert!(url.contains("userId=u+1"));
        assert!(url.contains("userType=provider"));
        assert!(url.contains("token=a%2Bb%2Fc"));
    }

    #[test]
    fn test_endpoint_url_rejects_invalid_base() {
        assert!(endpoint_url("not a url", Role::Customer, "u", "t").is_err());
    }
}
