//! Core types for handset.
//!
//! handset lets a secondary device (the remote) mirror and drive a game
//! session running on a primary device (the host). This crate holds the
//! protocol primitives shared by both ends and by the relay: session ids,
//! the `{method, payload}` envelope, the signaling codec for the direct-peer
//! handshake, and the per-channel connection state machine. It has no async
//! runtime; transports and session actors live in `handset-client`.

mod envelope;
mod error;
mod session;
pub mod signal;
mod state;
mod view;

pub use envelope::{ActionMethod, Envelope, Method};
pub use error::ProtocolError;
pub use session::{SessionId, SessionIdParseError};
pub use signal::SignalingArtifact;
pub use state::{
    ChannelEvent, ConnectionMachine, ConnectionState, Effect, Role, Status, TransitionError,
};
pub use view::GameView;
