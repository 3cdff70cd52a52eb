//! Duplex channel over a WebSocket stream.
//!
//! Both transports end up with a `WebSocketStream` (relayed: to the relay;
//! direct-peer: straight to the other device). [`Channel::spawn`] hands the
//! stream to a pump task and returns a cheap handle. The pump stays parked
//! until [`Channel::start`], then reports everything that happens as
//! `(ChannelId, ChannelEvent)` on a shared event queue, `Opened` first. Every channel instance gets a fresh id, so whoever consumes the
//! queue can tell events of a superseded instance apart and ignore them.

use futures_util::{SinkExt, StreamExt};
use handset_core::{ChannelEvent, ConnectionState, ProtocolError};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::Role;

/// Identity of one channel instance. Never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub type EventSender = mpsc::UnboundedSender<(ChannelId, ChannelEvent)>;
pub type EventReceiver = mpsc::UnboundedReceiver<(ChannelId, ChannelEvent)>;

/// Create the event queue shared by all channels of one session.
pub fn event_queue() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

enum Command {
    Start,
    Send(Vec<u8>),
    Close,
}

/// Handle to an open (or formerly open) channel.
#[derive(Clone)]
pub struct Channel {
    id: ChannelId,
    commands: mpsc::UnboundedSender<Command>,
    state: Arc<Mutex<ConnectionState>>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Channel {
    /// Hand a connected WebSocket stream to a pump. The channel stays
    /// `Connecting` and reports nothing until [`start`](Self::start).
    pub fn spawn<S>(id: ChannelId, ws: WebSocketStream<S>, events: EventSender) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(ConnectionState::Connecting));
        tokio::spawn(pump(id, ws, rx, events, Arc::clone(&state)));
        Self {
            id,
            commands: tx,
            state,
        }
    }

    /// Two channels wired to each other in memory.
    pub async fn pair(
        (a_id, a_events): (ChannelId, EventSender),
        (b_id, b_events): (ChannelId, EventSender),
    ) -> (Self, Self) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let a = WebSocketStream::from_raw_socket(a, Role::Client, None).await;
        let b = WebSocketStream::from_raw_socket(b, Role::Server, None).await;
        (
            Self::spawn(a_id, a, a_events),
            Self::spawn(b_id, b, b_events),
        )
    }

    /// Id every event of this instance is tagged with.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Begin reading: the pump moves to `Open` and emits `Opened`. Whoever
    /// consumes the event queue must know this channel's id before calling
    /// it. Later calls do nothing.
    pub fn start(&self) {
        let _ = self.commands.send(Command::Start);
    }

    /// Current transport state, as last seen by the pump.
    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    /// Queue a frame. Fails without side effects unless the channel is open.
    pub fn send(&self, frame: Vec<u8>) -> Result<(), ProtocolError> {
        let state = self.state();
        if !state.is_open() {
            tracing::warn!(channel = %self.id, %state, "cannot send: not connected");
            return Err(ProtocolError::SendOnClosedChannel(state));
        }
        self.commands.send(Command::Send(frame)).map_err(|_| {
            tracing::warn!(channel = %self.id, "cannot send: pump has exited");
            ProtocolError::SendOnClosedChannel(ConnectionState::Closed)
        })
    }

    /// Close the channel. Safe to call any number of times.
    pub fn close(&self) {
        {
            let mut state = lock(&self.state);
            if state.is_terminal() {
                return;
            }
            *state = ConnectionState::Closed;
        }
        tracing::debug!(channel = %self.id, "closing channel");
        let _ = self.commands.send(Command::Close);
    }
}

fn lock(state: &Mutex<ConnectionState>) -> std::sync::MutexGuard<'_, ConnectionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn frame(data: Vec<u8>) -> Message {
    match String::from_utf8(data) {
        Ok(text) => Message::Text(text.into()),
        Err(e) => Message::Binary(e.into_bytes().into()),
    }
}

async fn pump<S>(
    id: ChannelId,
    ws: WebSocketStream<S>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: EventSender,
    state: Arc<Mutex<ConnectionState>>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let started = loop {
        match commands.recv().await {
            Some(Command::Start) => break true,
            // Sends are refused until the channel is open.
            Some(Command::Send(_)) => {}
            Some(Command::Close) | None => break false,
        }
    };

    let (mut sink, mut stream) = ws.split();
    if !started {
        let _ = sink.close().await;
        finish(id, ChannelEvent::Closed, &events, &state);
        return;
    }

    {
        let mut s = lock(&state);
        if *s == ConnectionState::Connecting {
            *s = ConnectionState::Open;
        }
    }
    let _ = events.send((id, ChannelEvent::Opened));

    let last = loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(Command::Start) => {}
                Some(Command::Send(data)) => {
                    if let Err(e) = sink.send(frame(data)).await {
                        break ChannelEvent::Errored(e.to_string());
                    }
                }
                Some(Command::Close) | None => {
                    let _ = sink.close().await;
                    break ChannelEvent::Closed;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send((id, ChannelEvent::Data(text.as_bytes().to_vec())));
                }
                Some(Ok(Message::Binary(data))) => {
                    let _ = events.send((id, ChannelEvent::Data(data.to_vec())));
                }
                Some(Ok(Message::Close(_))) | None => break ChannelEvent::Closed,
                Some(Ok(_)) => {}
                Some(Err(e)) => break ChannelEvent::Errored(e.to_string()),
            },
        }
    };
    finish(id, last, &events, &state);
}

fn finish(
    id: ChannelId,
    last: ChannelEvent,
    events: &EventSender,
    state: &Mutex<ConnectionState>,
) {
    {
        let mut s = lock(state);
        if !s.is_terminal() {
            *s = match last {
                ChannelEvent::Errored(_) => ConnectionState::Errored,
                _ => ConnectionState::Closed,
            };
        }
    }
    tracing::debug!(channel = %id, event = ?last, "channel pump finished");
    let _ = events.send((id, last));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn next(rx: &mut EventReceiver) -> (ChannelId, ChannelEvent) {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for channel event")
            .expect("event queue closed")
    }

    async fn open_pair() -> (Channel, EventReceiver, Channel, EventReceiver) {
        let (a_tx, mut a_rx) = event_queue();
        let (b_tx, mut b_rx) = event_queue();
        let (a, b) = Channel::pair((ChannelId(1), a_tx), (ChannelId(2), b_tx)).await;
        a.start();
        b.start();
        assert_eq!(next(&mut a_rx).await, (ChannelId(1), ChannelEvent::Opened));
        assert_eq!(next(&mut b_rx).await, (ChannelId(2), ChannelEvent::Opened));
        (a, a_rx, b, b_rx)
    }

    #[tokio::test]
    async fn frames_arrive_in_order() {
        let (a, _a_rx, _b, mut b_rx) = open_pair().await;
        a.send(b"first".to_vec()).unwrap();
        a.send(b"second".to_vec()).unwrap();
        a.send(vec![0xff, 0x00]).unwrap();
        assert_eq!(
            next(&mut b_rx).await,
            (ChannelId(2), ChannelEvent::Data(b"first".to_vec()))
        );
        assert_eq!(
            next(&mut b_rx).await,
            (ChannelId(2), ChannelEvent::Data(b"second".to_vec()))
        );
        assert_eq!(
            next(&mut b_rx).await,
            (ChannelId(2), ChannelEvent::Data(vec![0xff, 0x00]))
        );
    }

    #[tokio::test]
    async fn close_is_idempotent_and_reaches_peer() {
        let (a, mut a_rx, b, mut b_rx) = open_pair().await;
        a.close();
        a.close();
        assert_eq!(a.state(), ConnectionState::Closed);
        assert_eq!(next(&mut a_rx).await, (ChannelId(1), ChannelEvent::Closed));
        assert_eq!(next(&mut b_rx).await, (ChannelId(2), ChannelEvent::Closed));
        assert!(b.state().is_terminal());
    }

    #[tokio::test]
    async fn send_on_closed_channel_is_reported() {
        let (a, _a_rx, _b, _b_rx) = open_pair().await;
        a.close();
        assert_eq!(
            a.send(b"late".to_vec()),
            Err(ProtocolError::SendOnClosedChannel(ConnectionState::Closed))
        );
    }

    #[tokio::test]
    async fn nothing_is_reported_before_start() {
        let (a_tx, mut a_rx) = event_queue();
        let (b_tx, mut b_rx) = event_queue();
        let (a, b) = Channel::pair((ChannelId(1), a_tx), (ChannelId(2), b_tx)).await;
        b.start();
        assert_eq!(next(&mut b_rx).await, (ChannelId(2), ChannelEvent::Opened));
        b.send(b"early".to_vec()).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(a_rx.try_recv().is_err());
        assert_eq!(a.state(), ConnectionState::Connecting);
        assert_eq!(
            a.send(b"too soon".to_vec()),
            Err(ProtocolError::SendOnClosedChannel(ConnectionState::Connecting))
        );

        // Frames that arrived while parked are delivered after `Opened`.
        a.start();
        a.start();
        assert_eq!(next(&mut a_rx).await, (ChannelId(1), ChannelEvent::Opened));
        assert_eq!(
            next(&mut a_rx).await,
            (ChannelId(1), ChannelEvent::Data(b"early".to_vec()))
        );
    }

    #[tokio::test]
    async fn closing_before_start_reports_closed() {
        let (a_tx, mut a_rx) = event_queue();
        let (b_tx, _b_rx) = event_queue();
        let (a, _b) = Channel::pair((ChannelId(1), a_tx), (ChannelId(2), b_tx)).await;
        a.close();
        assert_eq!(next(&mut a_rx).await, (ChannelId(1), ChannelEvent::Closed));
    }
}
