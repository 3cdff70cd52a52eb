//! Per-channel connection state machine.
//!
//! ```text
//! Idle -> Connecting -> Open -> Closed
//!             |           |
//!             +-----------+--> Errored
//! ```
//!
//! Each side tracks its own machine and infers the peer's state only from
//! transport events. `Closed` and `Errored` are final: recovery always means
//! a brand-new channel with a brand-new machine.

use std::fmt;

/// Lifecycle of one channel instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closed,
    Errored,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        self == Self::Open
    }

    /// `Closed` or `Errored`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Errored)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Errored => "errored",
        })
    }
}

/// Which side of the session this endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Holds the authoritative game state.
    Host,
    /// Mirrors the host's view and issues actions.
    Remote,
}

/// Something the transport reported about a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened,
    Data(Vec<u8>),
    Closed,
    Errored(String),
}

/// Side effect the owner of a machine must carry out after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Channel became usable. The host must push an `init` right away.
    Opened { send_init: bool },
    /// Channel is gone. The remote must drop the view it was showing.
    Lost {
        state: ConnectionState,
        discard_view: bool,
    },
}

/// Error for a transition the machine does not define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot start connecting from {0}")]
pub struct TransitionError(pub ConnectionState);

/// State machine for a single channel instance.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    role: Role,
    state: ConnectionState,
}

impl ConnectionMachine {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: ConnectionState::Idle,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// `Idle -> Connecting`, on `connect()` / `signal()`.
    pub fn connect(&mut self) -> Result<(), TransitionError> {
        if self.state != ConnectionState::Idle {
            return Err(TransitionError(self.state));
        }
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    /// Feed a transport event. Returns the effect to perform, if any.
    ///
    /// Events that make no sense in the current state (data before open,
    /// anything after close) are ignored.
    pub fn apply(&mut self, event: &ChannelEvent) -> Option<Effect> {
        use ConnectionState::*;
        match (self.state, event) {
            (Connecting, ChannelEvent::Opened) => {
                self.state = Open;
                Some(Effect::Opened {
                    send_init: self.role == Role::Host,
                })
            }
            (Connecting | Open, ChannelEvent::Closed) => Some(self.lose(Closed)),
            (Connecting | Open, ChannelEvent::Errored(_)) => Some(self.lose(Errored)),
            _ => None,
        }
    }

    /// Explicit local close. Idempotent: returns `None` once already final.
    pub fn close(&mut self) -> Option<Effect> {
        if self.state.is_terminal() {
            return None;
        }
        Some(self.lose(ConnectionState::Closed))
    }

    fn lose(&mut self, state: ConnectionState) -> Effect {
        self.state = state;
        Effect::Lost {
            state,
            discard_view: self.role == Role::Remote,
        }
    }
}

/// What the user is shown about a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Connecting,
    /// Channel open, no game data yet.
    Connected,
    /// Channel open and a view is being mirrored.
    Live,
    Closed,
    Errored,
    /// The pasted link or signal could not be used.
    InvalidLink,
}

impl Status {
    /// Status after a channel is lost in `state`.
    pub fn lost(state: ConnectionState) -> Self {
        if state == ConnectionState::Errored {
            Self::Errored
        } else {
            Self::Closed
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "Connecting to game...",
            Self::Connected => "Connected! Waiting for game data...",
            Self::Live => "Connected",
            Self::Closed => "Connection closed",
            Self::Errored => "Connection error occurred",
            Self::InvalidLink => "Invalid or expired connection link",
        })
    }
}
