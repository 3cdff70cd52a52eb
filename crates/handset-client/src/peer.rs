//! Direct-peer transport.
//!
//! The two devices talk to each other without a relay. Connection setup needs
//! one out-of-band round trip of signaling artifacts:
//!
//! 1. The host binds a listener and emits an *offer*: a fresh attempt token
//!    plus the socket addresses it can be reached at.
//! 2. The remote consumes the offer and emits an *answer*: the same token and
//!    a fresh nonce. It then dials the host, presenting token and nonce in the
//!    WebSocket request path.
//! 3. The host consumes the answer and accepts the dial that presents exactly
//!    that token and nonce. Both sides are now `Open`.
//!
//! Signaling is non-incremental: each side emits its whole description once.
//! Completing a handshake consumes it, so an artifact can never be fed into a
//! live connection a second time; an answer carrying another attempt's token
//! is rejected as stale.

use crate::channel::{Channel, ChannelId, EventSender};
use handset_core::{ProtocolError, SignalingArtifact};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Instant, timeout, timeout_at};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

const TOKEN_LEN: usize = 16;

/// Settings for the direct-peer transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    /// Where the host listens.
    pub bind: SocketAddr,
    /// Address to put in the offer instead of the bound one (for NAT or
    /// wildcard binds).
    pub advertise: Option<SocketAddr>,
    /// How long either side waits for the other to show up.
    pub handshake_timeout: Duration,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            advertise: None,
            handshake_timeout: Duration::from_secs(60),
        }
    }
}

/// What actually travels inside a [`SignalingArtifact`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerDescription {
    Offer {
        token: String,
        candidates: Vec<SocketAddr>,
    },
    Answer {
        token: String,
        nonce: String,
    },
}

impl PeerDescription {
    pub fn to_artifact(&self) -> Result<SignalingArtifact, ProtocolError> {
        let value = serde_json::to_value(self)
            .map_err(|e| ProtocolError::MalformedSignal(e.to_string()))?;
        SignalingArtifact::new(value)
    }

    pub fn from_artifact(artifact: &SignalingArtifact) -> Result<Self, ProtocolError> {
        serde_json::from_value(artifact.as_value().clone())
            .map_err(|e| ProtocolError::MalformedSignal(e.to_string()))
    }
}

fn random_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

fn peer_path(token: &str, nonce: &str) -> String {
    format!("/peer/{token}/{nonce}")
}

/// Host side of a handshake.
pub struct Offerer {
    listener: TcpListener,
    token: String,
    local: Option<SignalingArtifact>,
    timeout: Duration,
}

/// An answer that passed validation against its offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedAnswer {
    path: String,
}

impl Offerer {
    /// Bind a listener and prepare the offer.
    pub async fn bind(config: &PeerConfig) -> Result<Self, ProtocolError> {
        let listener = TcpListener::bind(config.bind)
            .await
            .map_err(|e| ProtocolError::ChannelUnavailable(e.to_string()))?;
        let bound = listener
            .local_addr()
            .map_err(|e| ProtocolError::ChannelUnavailable(e.to_string()))?;
        let token = random_token();
        let offer = PeerDescription::Offer {
            token: token.clone(),
            candidates: vec![config.advertise.unwrap_or(bound)],
        };
        tracing::debug!(%bound, "peer offer prepared");
        Ok(Self {
            listener,
            token,
            local: Some(offer.to_artifact()?),
            timeout: config.handshake_timeout,
        })
    }

    /// The offer to hand to the remote. Yields it exactly once.
    pub fn local_signal(&mut self) -> Option<SignalingArtifact> {
        self.local.take()
    }

    /// Check an answer without consuming the handshake, so a bad paste can
    /// be corrected.
    pub fn validate(&self, answer: &SignalingArtifact) -> Result<AcceptedAnswer, ProtocolError> {
        match PeerDescription::from_artifact(answer)? {
            PeerDescription::Answer { token, nonce } if token == self.token => Ok(AcceptedAnswer {
                path: peer_path(&token, &nonce),
            }),
            PeerDescription::Answer { .. } => Err(ProtocolError::MalformedSignal(
                "answer belongs to another connection attempt".into(),
            )),
            PeerDescription::Offer { .. } => Err(ProtocolError::MalformedSignal(
                "expected an answer, got an offer".into(),
            )),
        }
    }

    /// Wait for the remote that produced `answer` and open the channel.
    pub async fn connect(
        self,
        answer: AcceptedAnswer,
        id: ChannelId,
        events: EventSender,
    ) -> Result<Channel, ProtocolError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let (stream, from) = timeout_at(deadline, self.listener.accept())
                .await
                .map_err(|_| ProtocolError::ChannelUnavailable("peer never connected".into()))?
                .map_err(|e| ProtocolError::ChannelUnavailable(e.to_string()))?;

            let expected = answer.path.clone();
            let check = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                if req.uri().path() == expected {
                    Ok(resp)
                } else {
                    let mut err = ErrorResponse::new(None);
                    *err.status_mut() = StatusCode::FORBIDDEN;
                    Err(err)
                }
            };

            match timeout_at(deadline, tokio_tungstenite::accept_hdr_async(stream, check)).await {
                Ok(Ok(ws)) => {
                    tracing::info!(channel = %id, %from, "peer channel connected");
                    return Ok(Channel::spawn(id, ws, events));
                }
                Ok(Err(e)) => {
                    tracing::warn!(%from, error = %e, "rejected peer connection");
                }
                Err(_) => {
                    return Err(ProtocolError::ChannelUnavailable(
                        "peer handshake timed out".into(),
                    ));
                }
            }
        }
    }
}

/// Remote side of a handshake.
pub struct Answerer {
    candidates: Vec<SocketAddr>,
    path: String,
    local: Option<SignalingArtifact>,
    timeout: Duration,
}

impl Answerer {
    /// Consume the host's offer and prepare the answer.
    pub fn respond(offer: &SignalingArtifact, config: &PeerConfig) -> Result<Self, ProtocolError> {
        let PeerDescription::Offer { token, candidates } = PeerDescription::from_artifact(offer)?
        else {
            return Err(ProtocolError::MalformedSignal(
                "expected an offer, got an answer".into(),
            ));
        };
        if candidates.is_empty() {
            return Err(ProtocolError::MalformedSignal("offer has no candidates".into()));
        }
        let nonce = random_token();
        let path = peer_path(&token, &nonce);
        let answer = PeerDescription::Answer { token, nonce };
        Ok(Self {
            candidates,
            path,
            local: Some(answer.to_artifact()?),
            timeout: config.handshake_timeout,
        })
    }

    /// The answer to hand back to the host. Yields it exactly once.
    pub fn local_signal(&mut self) -> Option<SignalingArtifact> {
        self.local.take()
    }

    /// Dial the host. Completes once the host has accepted our answer.
    pub async fn connect(self, id: ChannelId, events: EventSender) -> Result<Channel, ProtocolError> {
        let mut last_error = String::from("no candidates");
        for addr in &self.candidates {
            let url = format!("ws://{addr}{}", self.path);
            let attempt = async {
                let stream = TcpStream::connect(addr).await.map_err(|e| e.to_string())?;
                tokio_tungstenite::client_async(url.as_str(), stream)
                    .await
                    .map_err(|e| e.to_string())
            };
            match timeout(self.timeout, attempt).await {
                Ok(Ok((ws, _response))) => {
                    tracing::info!(channel = %id, %addr, "peer channel connected");
                    return Ok(Channel::spawn(id, ws, events));
                }
                Ok(Err(e)) => last_error = e,
                Err(_) => last_error = "peer handshake timed out".into(),
            }
            tracing::debug!(%addr, error = %last_error, "peer candidate failed");
        }
        Err(ProtocolError::ChannelUnavailable(last_error))
    }
}
