//! Relayed transport: a WebSocket to `<relay>/ws/<SessionId>`.

use crate::channel::{Channel, ChannelId, EventSender};
use handset_core::{ProtocolError, SessionId};
use url::Url;

/// Relay used when nothing else is configured.
pub const LOCAL_RELAY: &str = "ws://localhost:3002";

/// Base address of a relay service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEndpoint {
    base: Url,
}

impl RelayEndpoint {
    /// Parse a `ws://` or `wss://` base URL.
    pub fn new(base: &str) -> Result<Self, EndpointError> {
        let base = Url::parse(base)?;
        if !matches!(base.scheme(), "ws" | "wss") {
            return Err(EndpointError::Scheme(base.scheme().to_string()));
        }
        if base.cannot_be_a_base() {
            return Err(EndpointError::NotABase);
        }
        Ok(Self { base })
    }

    /// Endpoint chosen at build time through `HANDSET_RELAY_URL`, falling
    /// back to the local development relay.
    pub fn from_build_env() -> Self {
        option_env!("HANDSET_RELAY_URL")
            .and_then(|url| Self::new(url).ok())
            .unwrap_or_else(Self::local)
    }

    /// The development relay at [`LOCAL_RELAY`].
    pub fn local() -> Self {
        Self {
            base: Url::parse(LOCAL_RELAY).expect("LOCAL_RELAY is a valid URL"),
        }
    }

    /// `<base>/ws/<session>`.
    pub fn session_url(&self, session: &SessionId) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("ws").push(session.as_str());
        }
        url
    }
}

/// Error building a [`RelayEndpoint`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("invalid relay URL: {0}")]
    Parse(#[from] url::ParseError),
    #[error("relay URL must use ws or wss, got {0}")]
    Scheme(String),
    #[error("relay URL cannot carry a path")]
    NotABase,
}

/// Open a channel to `session` through the relay.
///
/// A refused or failed connection is `ChannelUnavailable`; this function does
/// not retry.
pub async fn connect(
    endpoint: &RelayEndpoint,
    session: &SessionId,
    id: ChannelId,
    events: EventSender,
) -> Result<Channel, ProtocolError> {
    let url = endpoint.session_url(session);
    tracing::debug!(channel = %id, %url, "connecting to relay");
    let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| ProtocolError::ChannelUnavailable(e.to_string()))?;
    tracing::info!(channel = %id, %session, "relay channel connected");
    Ok(Channel::spawn(id, ws, events))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_url_appends_path() {
        let id: SessionId = "ab12cd".parse().unwrap();
        let endpoint = RelayEndpoint::new("ws://localhost:3002").unwrap();
        assert_eq!(
            endpoint.session_url(&id).as_str(),
            "ws://localhost:3002/ws/ab12cd"
        );

        let endpoint = RelayEndpoint::new("wss://relay.example/games/").unwrap();
        assert_eq!(
            endpoint.session_url(&id).as_str(),
            "wss://relay.example/games/ws/ab12cd"
        );
    }

    #[test]
    fn rejects_non_websocket_urls() {
        assert_eq!(
            RelayEndpoint::new("https://relay.example"),
            Err(EndpointError::Scheme("https".into()))
        );
        assert!(matches!(
            RelayEndpoint::new("not a url"),
            Err(EndpointError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_relay_is_channel_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = RelayEndpoint::new(&format!("ws://{addr}")).unwrap();
        let (tx, _rx) = crate::channel::event_queue();
        let err = connect(&endpoint, &"ab12cd".parse().unwrap(), ChannelId(1), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ChannelUnavailable(_)));
    }
}
