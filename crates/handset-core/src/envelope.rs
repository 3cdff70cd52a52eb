//! The `{method, payload}` envelope exchanged over an open channel.
//!
//! The wire shape is a flat JSON object. `method` is either a state-sync
//! directive sent by the host (`init`, `update`), a presence notice injected
//! by the relay (`memberJoined`, `memberLeft`), or the name of a host action
//! triggered from the remote. `seq` is stamped by the host on state envelopes;
//! peers that don't know about it simply ignore it.

use crate::error::ProtocolError;
use crate::view::GameView;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A unit of exchange on an open channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl Envelope {
    /// Envelope for `method` carrying `payload`, without a sequence number.
    pub fn new(method: Method, payload: Option<Value>) -> Self {
        Self {
            method: method.as_str().to_string(),
            payload,
            seq: None,
        }
    }

    /// Full snapshot, sent first on every fresh channel.
    pub fn init(view: &GameView) -> Self {
        Self::new(Method::Init, Some(view.as_value().clone()))
    }

    /// Full view after a change on the host.
    pub fn update(view: &GameView) -> Self {
        Self::new(Method::Update, Some(view.as_value().clone()))
    }

    /// Remote-triggered host action.
    pub fn action(action: ActionMethod, payload: Option<Value>) -> Self {
        Self::new(Method::Action(action), payload)
    }

    /// Stamp the host's sequence number.
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    /// Parse channel data.
    pub fn from_slice(data: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(data).map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))
    }

    /// Serialize as a JSON text frame.
    pub fn to_text(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))
    }

    /// Serialize as UTF-8 JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        self.to_text().map(String::into_bytes)
    }

    /// Resolve the method name against the closed set of known methods.
    pub fn method(&self) -> Result<Method, ProtocolError> {
        self.method.parse()
    }
}

/// Every method the protocol understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Init,
    Update,
    MemberJoined,
    MemberLeft,
    Action(ActionMethod),
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Update => "update",
            Self::MemberJoined => "memberJoined",
            Self::MemberLeft => "memberLeft",
            Self::Action(action) => action.as_str(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Self::Init),
            "update" => Ok(Self::Update),
            "memberJoined" => Ok(Self::MemberJoined),
            "memberLeft" => Ok(Self::MemberLeft),
            other => ActionMethod::from_wire(other)
                .map(Self::Action)
                .ok_or_else(|| ProtocolError::UnrecognizedMethod(other.to_string())),
        }
    }
}

/// Host actions a remote control may trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionMethod {
    Draw,
    AuctionStart,
    AuctionClose,
    AuctionOffer,
    Exchange,
    ExchangeAccept,
    BuyBack,
    CowTradeStart,
    CowTradeRespond,
}

impl ActionMethod {
    pub const ALL: [ActionMethod; 9] = [
        Self::Draw,
        Self::AuctionStart,
        Self::AuctionClose,
        Self::AuctionOffer,
        Self::Exchange,
        Self::ExchangeAccept,
        Self::BuyBack,
        Self::CowTradeStart,
        Self::CowTradeRespond,
    ];

    /// Wire name, as used in the `method` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draw => "onDraw",
            Self::AuctionStart => "onAuctionStart",
            Self::AuctionClose => "onAuctionClose",
            Self::AuctionOffer => "onAuctionOffer",
            Self::Exchange => "onExchange",
            Self::ExchangeAccept => "onExchangeAccept",
            Self::BuyBack => "onBuyBack",
            Self::CowTradeStart => "onCowTradeStart",
            Self::CowTradeRespond => "onCowTradeRespond",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == name)
    }
}

impl fmt::Display for ActionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
