//! The host's projection of game state.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Game state as shown to a remote control.
///
/// Produced by the host's game collaborator. The protocol never looks inside;
/// it forwards the value verbatim in `init` and `update` envelopes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameView(Value);

impl GameView {
    /// Wrap a view value produced by the game.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Borrow the underlying JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Take the underlying JSON value.
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for GameView {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
