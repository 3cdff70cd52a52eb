//! Protocol error taxonomy.

use crate::state::ConnectionState;

/// Everything that can go wrong between two handset endpoints.
///
/// Only [`ChannelUnavailable`](Self::ChannelUnavailable) and
/// [`MalformedSignal`](Self::MalformedSignal) are meant for the user; the
/// others are logged and dropped (or reported to the local caller only).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The transport could not open a channel.
    #[error("channel unavailable: {0}")]
    ChannelUnavailable(String),
    /// A signaling text did not decode under either base64 alphabet.
    #[error("malformed signal: {0}")]
    MalformedSignal(String),
    /// Channel data was not a `{method, payload}` JSON object.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    /// A well-formed envelope named a method nobody handles.
    #[error("unrecognized method: {0}")]
    UnrecognizedMethod(String),
    /// Local send attempted while the channel was not open.
    #[error("cannot send: channel is {0}")]
    SendOnClosedChannel(ConnectionState),
}

impl ProtocolError {
    /// Text to show the user, or `None` if the error is not user-visible.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            Self::ChannelUnavailable(_) => Some("Connection error occurred"),
            Self::MalformedSignal(_) => Some("Invalid or expired connection link"),
            Self::SendOnClosedChannel(_) => Some("Cannot send: not connected"),
            Self::MalformedEnvelope(_) | Self::UnrecognizedMethod(_) => None,
        }
    }
}
