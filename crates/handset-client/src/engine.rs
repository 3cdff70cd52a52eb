//! Sync engines.
//!
//! [`HostEngine`] frames the host's [`GameView`] as `init`/`update` envelopes
//! and dispatches incoming action envelopes to a [`HostActions`]
//! implementation. [`RemoteEngine`] mirrors the host's view and frames user
//! actions. Both are transport-agnostic: they are handed a [`Channel`] and
//! fed the events of the shared queue, and only ever act on the channel they
//! were attached to last. Events tagged with any other [`ChannelId`] are
//! stale and ignored.

use crate::channel::{Channel, ChannelId};
use handset_core::{
    ActionMethod, ChannelEvent, ConnectionMachine, ConnectionState, Effect, Envelope, GameView,
    Method, ProtocolError, Role,
};
use serde_json::Value;
use tokio::sync::watch;

/// Host-side handlers for remote-triggered actions.
///
/// Each handler receives the payload the remote sent, verbatim. Handlers
/// mutate game state; the resulting view change reaches the remote through
/// the view watch, not through a return value.
pub trait HostActions {
    fn draw(&mut self, payload: Option<Value>);
    fn auction_start(&mut self, payload: Option<Value>);
    fn auction_close(&mut self, payload: Option<Value>);
    fn auction_offer(&mut self, payload: Option<Value>);
    fn exchange(&mut self, payload: Option<Value>);
    fn exchange_accept(&mut self, payload: Option<Value>);
    fn buy_back(&mut self, payload: Option<Value>);
    fn cow_trade_start(&mut self, payload: Option<Value>);
    fn cow_trade_respond(&mut self, payload: Option<Value>);
}

/// Route an action to its handler.
pub fn dispatch<A: HostActions + ?Sized>(
    actions: &mut A,
    method: ActionMethod,
    payload: Option<Value>,
) {
    match method {
        ActionMethod::Draw => actions.draw(payload),
        ActionMethod::AuctionStart => actions.auction_start(payload),
        ActionMethod::AuctionClose => actions.auction_close(payload),
        ActionMethod::AuctionOffer => actions.auction_offer(payload),
        ActionMethod::Exchange => actions.exchange(payload),
        ActionMethod::ExchangeAccept => actions.exchange_accept(payload),
        ActionMethod::BuyBack => actions.buy_back(payload),
        ActionMethod::CowTradeStart => actions.cow_trade_start(payload),
        ActionMethod::CowTradeRespond => actions.cow_trade_respond(payload),
    }
}

/// What an event did to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Stale channel, dropped envelope, or nothing to do.
    Ignored,
    /// The current channel opened.
    Opened,
    /// Data was acted on: an action dispatched, a snapshot sent or a view
    /// applied.
    Handled,
    /// The current channel is gone.
    Lost(ConnectionState),
}

/// The channel an engine currently drives, with its own state machine.
#[derive(Debug)]
struct Attached {
    channel: Channel,
    machine: ConnectionMachine,
}

impl Attached {
    fn new(channel: Channel, role: Role) -> Self {
        let mut machine = ConnectionMachine::new(role);
        // A fresh machine is always Idle.
        let _ = machine.connect();
        Self { channel, machine }
    }

    fn is_open(&self) -> bool {
        self.machine.state().is_open()
    }
}

fn attach(slot: &mut Option<Attached>, channel: Channel, role: Role) {
    if let Some(old) = slot.take() {
        tracing::debug!(channel = %old.channel.id(), "superseding channel");
        old.channel.close();
    }
    tracing::debug!(channel = %channel.id(), ?role, "attached channel");
    // Events can only be attributed once the id is known here.
    channel.start();
    *slot = Some(Attached::new(channel, role));
}

fn current(slot: &Option<Attached>) -> Option<ChannelId> {
    slot.as_ref().map(|a| a.channel.id())
}

fn parse(id: ChannelId, data: &[u8]) -> Option<(Envelope, Method)> {
    let envelope = match Envelope::from_slice(data) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(channel = %id, error = %e, "dropping frame");
            return None;
        }
    };
    match envelope.method() {
        Ok(method) => Some((envelope, method)),
        Err(e) => {
            tracing::warn!(channel = %id, error = %e, "dropping envelope");
            None
        }
    }
}

/// Host half of the sync protocol.
pub struct HostEngine {
    view: watch::Receiver<GameView>,
    attached: Option<Attached>,
    seq: u64,
}

impl HostEngine {
    /// `view` is the game's current view; every change to it is pushed to
    /// the remote as an `update`.
    pub fn new(view: watch::Receiver<GameView>) -> Self {
        Self {
            view,
            attached: None,
            seq: 0,
        }
    }

    /// Make `channel` the current one, closing any previous channel.
    pub fn attach(&mut self, channel: Channel) {
        attach(&mut self.attached, channel, Role::Host);
    }

    pub fn current(&self) -> Option<ChannelId> {
        current(&self.attached)
    }

    /// State of the current channel, `Idle` if none was ever attached.
    pub fn state(&self) -> ConnectionState {
        self.attached
            .as_ref()
            .map_or(ConnectionState::Idle, |a| a.machine.state())
    }

    /// Last sequence number stamped on a state envelope.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Wait until the game publishes a new view. Returns `false` once the
    /// game has gone away.
    pub async fn view_changed(&mut self) -> bool {
        self.view.changed().await.is_ok()
    }

    /// Feed one event from the session's queue.
    pub fn handle_event<A: HostActions + ?Sized>(
        &mut self,
        id: ChannelId,
        event: ChannelEvent,
        actions: &mut A,
    ) -> Outcome {
        let Some(attached) = self.attached.as_mut().filter(|a| a.channel.id() == id) else {
            tracing::debug!(channel = %id, ?event, "ignoring event from superseded channel");
            return Outcome::Ignored;
        };

        let data = match event {
            ChannelEvent::Data(data) => data,
            lifecycle => {
                return match attached.machine.apply(&lifecycle) {
                    Some(Effect::Opened { send_init }) => {
                        tracing::info!(channel = %id, "channel open");
                        if send_init {
                            self.send_snapshot();
                        }
                        Outcome::Opened
                    }
                    Some(Effect::Lost { state, .. }) => {
                        tracing::info!(channel = %id, %state, "channel lost");
                        Outcome::Lost(state)
                    }
                    None => Outcome::Ignored,
                };
            }
        };

        if !attached.is_open() {
            return Outcome::Ignored;
        }
        let Some((envelope, method)) = parse(id, &data) else {
            return Outcome::Ignored;
        };
        match method {
            Method::Action(action) => {
                tracing::debug!(channel = %id, %action, "dispatching action");
                dispatch(actions, action, envelope.payload);
                Outcome::Handled
            }
            Method::MemberJoined => {
                tracing::info!(channel = %id, payload = ?envelope.payload, "remote joined");
                self.send_snapshot();
                Outcome::Handled
            }
            Method::MemberLeft => {
                tracing::info!(channel = %id, payload = ?envelope.payload, "remote left");
                Outcome::Ignored
            }
            Method::Init | Method::Update => {
                tracing::warn!(channel = %id, %method, "host received state envelope");
                Outcome::Ignored
            }
        }
    }

    /// Push the current view as an `update`. Does nothing while no channel
    /// is open; the next `init` carries the view instead.
    pub fn publish_update(&mut self) -> Result<(), ProtocolError> {
        if !self.attached.as_ref().is_some_and(Attached::is_open) {
            self.view.borrow_and_update();
            tracing::debug!("view changed while disconnected");
            return Ok(());
        }
        let envelope = Envelope::update(&self.view.borrow_and_update());
        self.send_state(envelope)
    }

    /// Close the current channel.
    pub fn close(&mut self) {
        if let Some(attached) = self.attached.as_mut() {
            attached.machine.close();
            attached.channel.close();
        }
    }

    fn send_snapshot(&mut self) {
        let envelope = Envelope::init(&self.view.borrow_and_update());
        if let Err(e) = self.send_state(envelope) {
            tracing::warn!(error = %e, "could not send snapshot");
        }
    }

    fn send_state(&mut self, envelope: Envelope) -> Result<(), ProtocolError> {
        let Some(attached) = self.attached.as_ref() else {
            return Err(ProtocolError::SendOnClosedChannel(ConnectionState::Idle));
        };
        self.seq += 1;
        let frame = envelope.with_seq(self.seq).to_bytes()?;
        attached.channel.send(frame)
    }
}

/// Remote half of the sync protocol.
pub struct RemoteEngine {
    attached: Option<Attached>,
    view: watch::Sender<Option<GameView>>,
    last_seq: Option<u64>,
    initialized: bool,
}

impl Default for RemoteEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteEngine {
    pub fn new() -> Self {
        Self {
            attached: None,
            view: watch::Sender::new(None),
            last_seq: None,
            initialized: false,
        }
    }

    /// Make `channel` the current one. The next view applied must be an
    /// `init` on this channel.
    pub fn attach(&mut self, channel: Channel) {
        attach(&mut self.attached, channel, Role::Remote);
        self.last_seq = None;
        self.initialized = false;
    }

    pub fn current(&self) -> Option<ChannelId> {
        current(&self.attached)
    }

    pub fn state(&self) -> ConnectionState {
        self.attached
            .as_ref()
            .map_or(ConnectionState::Idle, |a| a.machine.state())
    }

    /// The mirrored view, `None` until an `init` arrives and again after the
    /// channel is lost.
    pub fn view(&self) -> Option<GameView> {
        self.view.borrow().clone()
    }

    /// Watch the mirrored view.
    pub fn subscribe(&self) -> watch::Receiver<Option<GameView>> {
        self.view.subscribe()
    }

    pub fn handle_event(&mut self, id: ChannelId, event: ChannelEvent) -> Outcome {
        let Some(attached) = self.attached.as_mut().filter(|a| a.channel.id() == id) else {
            tracing::debug!(channel = %id, ?event, "ignoring event from superseded channel");
            return Outcome::Ignored;
        };

        let data = match event {
            ChannelEvent::Data(data) => data,
            lifecycle => {
                return match attached.machine.apply(&lifecycle) {
                    Some(Effect::Opened { .. }) => {
                        tracing::info!(channel = %id, "channel open, waiting for snapshot");
                        Outcome::Opened
                    }
                    Some(Effect::Lost {
                        state,
                        discard_view,
                    }) => {
                        tracing::info!(channel = %id, %state, "channel lost");
                        if discard_view {
                            self.view.send_replace(None);
                        }
                        Outcome::Lost(state)
                    }
                    None => Outcome::Ignored,
                };
            }
        };

        if !attached.is_open() {
            return Outcome::Ignored;
        }
        let Some((envelope, method)) = parse(id, &data) else {
            return Outcome::Ignored;
        };
        match method {
            Method::Init => {
                self.apply(envelope);
                self.initialized = true;
                Outcome::Handled
            }
            Method::Update if !self.initialized => {
                tracing::warn!(channel = %id, "dropping update received before snapshot");
                Outcome::Ignored
            }
            Method::Update => {
                if let (Some(seq), Some(last)) = (envelope.seq, self.last_seq)
                    && seq <= last
                {
                    tracing::warn!(channel = %id, seq, last, "dropping stale update");
                    return Outcome::Ignored;
                }
                self.apply(envelope);
                Outcome::Handled
            }
            Method::MemberJoined | Method::MemberLeft | Method::Action(_) => {
                tracing::debug!(channel = %id, %method, "ignoring envelope");
                Outcome::Ignored
            }
        }
    }

    /// Send a user action to the host. Never queued: if the channel is not
    /// open the action is lost and the error returned.
    pub fn send_action(
        &self,
        action: ActionMethod,
        payload: Option<Value>,
    ) -> Result<(), ProtocolError> {
        let Some(attached) = self.attached.as_ref() else {
            tracing::warn!(%action, "cannot send: not connected");
            return Err(ProtocolError::SendOnClosedChannel(ConnectionState::Idle));
        };
        let frame = Envelope::action(action, payload).to_bytes()?;
        attached.channel.send(frame)
    }

    pub fn close(&mut self) {
        if let Some(attached) = self.attached.as_mut() {
            attached.machine.close();
            attached.channel.close();
        }
        self.view.send_replace(None);
    }

    fn apply(&mut self, envelope: Envelope) {
        if envelope.seq.is_some() {
            self.last_seq = envelope.seq;
        }
        let view = GameView::new(envelope.payload.unwrap_or(Value::Null));
        self.view.send_replace(Some(view));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{EventReceiver, event_queue};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(&'static str, Option<Value>)>,
    }

    impl HostActions for Recorder {
        fn draw(&mut self, payload: Option<Value>) {
            self.calls.push(("draw", payload));
        }
        fn auction_start(&mut self, payload: Option<Value>) {
            self.calls.push(("auction_start", payload));
        }
        fn auction_close(&mut self, payload: Option<Value>) {
            self.calls.push(("auction_close", payload));
        }
        fn auction_offer(&mut self, payload: Option<Value>) {
            self.calls.push(("auction_offer", payload));
        }
        fn exchange(&mut self, payload: Option<Value>) {
            self.calls.push(("exchange", payload));
        }
        fn exchange_accept(&mut self, payload: Option<Value>) {
            self.calls.push(("exchange_accept", payload));
        }
        fn buy_back(&mut self, payload: Option<Value>) {
            self.calls.push(("buy_back", payload));
        }
        fn cow_trade_start(&mut self, payload: Option<Value>) {
            self.calls.push(("cow_trade_start", payload));
        }
        fn cow_trade_respond(&mut self, payload: Option<Value>) {
            self.calls.push(("cow_trade_respond", payload));
        }
    }

    async fn next(rx: &mut EventReceiver) -> (ChannelId, ChannelEvent) {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for channel event")
            .expect("event queue closed")
    }

    /// Start a channel no engine drives and wait until it can send.
    async fn opened(channel: Channel, rx: &mut EventReceiver) -> Channel {
        channel.start();
        assert_eq!(next(rx).await, (channel.id(), ChannelEvent::Opened));
        channel
    }

    struct Rig {
        host: HostEngine,
        host_rx: EventReceiver,
        remote: RemoteEngine,
        remote_rx: EventReceiver,
        game: watch::Sender<GameView>,
        actions: Recorder,
        // Raw end the remote engine is attached to, for injecting frames.
        remote_channel: Channel,
    }

    impl Rig {
        async fn host_step(&mut self) -> Outcome {
            let (id, event) = next(&mut self.host_rx).await;
            self.host.handle_event(id, event, &mut self.actions)
        }

        async fn remote_step(&mut self) -> Outcome {
            let (id, event) = next(&mut self.remote_rx).await;
            self.remote.handle_event(id, event)
        }
    }

    async fn rig(initial: Value) -> Rig {
        let (host_tx, host_rx) = event_queue();
        let (remote_tx, remote_rx) = event_queue();
        let (a, b) = Channel::pair((ChannelId(1), host_tx), (ChannelId(1), remote_tx)).await;
        let (game, view) = watch::channel(GameView::new(initial));
        let mut host = HostEngine::new(view);
        host.attach(a);
        let mut remote = RemoteEngine::new();
        remote.attach(b.clone());
        Rig {
            host,
            host_rx,
            remote,
            remote_rx,
            game,
            actions: Recorder::default(),
            remote_channel: b,
        }
    }

    #[tokio::test]
    async fn host_sends_init_on_open() {
        let mut rig = rig(json!({"score": 0})).await;
        assert_eq!(rig.host_step().await, Outcome::Opened);
        assert_eq!(rig.remote_step().await, Outcome::Opened);
        assert_eq!(rig.remote.view(), None);
        assert_eq!(rig.remote_step().await, Outcome::Handled);
        assert_eq!(rig.remote.view(), Some(GameView::new(json!({"score": 0}))));
    }

    #[tokio::test]
    async fn updates_apply_in_order() {
        let mut rig = rig(json!({"n": 0})).await;
        rig.host_step().await;
        rig.remote_step().await;
        rig.remote_step().await;

        let mut seen = rig.remote.subscribe();
        rig.game.send_replace(GameView::new(json!({"n": 1})));
        rig.host.publish_update().unwrap();
        rig.game.send_replace(GameView::new(json!({"n": 2})));
        rig.host.publish_update().unwrap();

        assert_eq!(rig.remote_step().await, Outcome::Handled);
        assert_eq!(
            *seen.borrow_and_update(),
            Some(GameView::new(json!({"n": 1})))
        );
        assert_eq!(rig.remote_step().await, Outcome::Handled);
        assert_eq!(
            *seen.borrow_and_update(),
            Some(GameView::new(json!({"n": 2})))
        );
        assert_eq!(rig.host.seq(), 3);
    }

    #[tokio::test]
    async fn actions_reach_their_handlers() {
        let mut rig = rig(json!({})).await;
        rig.host_step().await;
        rig.remote_step().await;

        for action in ActionMethod::ALL {
            rig.remote.send_action(action, None).unwrap();
        }
        rig.remote
            .send_action(ActionMethod::AuctionOffer, Some(json!({"amount": 30})))
            .unwrap();
        for _ in 0..ActionMethod::ALL.len() + 1 {
            assert_eq!(rig.host_step().await, Outcome::Handled);
        }

        let names: Vec<_> = rig.actions.calls.iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            [
                "draw",
                "auction_start",
                "auction_close",
                "auction_offer",
                "exchange",
                "exchange_accept",
                "buy_back",
                "cow_trade_start",
                "cow_trade_respond",
                "auction_offer",
            ]
        );
        assert_eq!(rig.actions.calls[0].1, None);
        assert_eq!(rig.actions.calls[9].1, Some(json!({"amount": 30})));
    }

    #[tokio::test]
    async fn unknown_and_garbled_frames_are_dropped() {
        let mut rig = rig(json!({})).await;
        rig.host_step().await;
        rig.remote_step().await;

        rig.remote_channel
            .send(br#"{"method":"onSteal","payload":1}"#.to_vec())
            .unwrap();
        rig.remote_channel.send(b"not json".to_vec()).unwrap();
        rig.remote_channel
            .send(br#"{"method":"constructor"}"#.to_vec())
            .unwrap();
        rig.remote.send_action(ActionMethod::Draw, None).unwrap();

        assert_eq!(rig.host_step().await, Outcome::Ignored);
        assert_eq!(rig.host_step().await, Outcome::Ignored);
        assert_eq!(rig.host_step().await, Outcome::Ignored);
        assert_eq!(rig.host_step().await, Outcome::Handled);
        assert_eq!(rig.actions.calls.len(), 1);
        assert_eq!(rig.host.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn remote_requires_snapshot_first_and_drops_stale_seq() {
        let (tx, mut rx) = event_queue();
        let (peer_tx, mut peer_rx) = event_queue();
        let (ours, theirs) = Channel::pair((ChannelId(4), tx), (ChannelId(9), peer_tx)).await;
        let theirs = opened(theirs, &mut peer_rx).await;
        let mut remote = RemoteEngine::new();
        remote.attach(ours);
        let (id, event) = next(&mut rx).await;
        assert_eq!(remote.handle_event(id, event), Outcome::Opened);

        let update = |n: u64| Envelope::update(&GameView::new(json!({ "n": n }))).with_seq(n);
        theirs.send(update(1).to_bytes().unwrap()).unwrap();
        theirs
            .send(
                Envelope::init(&GameView::new(json!({"n": 5})))
                    .with_seq(5)
                    .to_bytes()
                    .unwrap(),
            )
            .unwrap();
        theirs.send(update(4).to_bytes().unwrap()).unwrap();
        theirs.send(update(6).to_bytes().unwrap()).unwrap();

        let mut outcomes = Vec::new();
        for _ in 0..4 {
            let (id, event) = next(&mut rx).await;
            outcomes.push(remote.handle_event(id, event));
        }
        assert_eq!(
            outcomes,
            [
                Outcome::Ignored,
                Outcome::Handled,
                Outcome::Ignored,
                Outcome::Handled
            ]
        );
        assert_eq!(remote.view(), Some(GameView::new(json!({"n": 6}))));
    }

    #[tokio::test]
    async fn late_frames_from_superseded_channel_are_ignored() {
        let (tx, mut rx) = event_queue();
        let (old_peer_tx, mut old_peer_rx) = event_queue();
        let (new_peer_tx, mut new_peer_rx) = event_queue();
        let (old, old_peer) =
            Channel::pair((ChannelId(1), tx.clone()), (ChannelId(100), old_peer_tx)).await;
        let old_peer = opened(old_peer, &mut old_peer_rx).await;

        let mut remote = RemoteEngine::new();
        remote.attach(old);
        let (id, event) = next(&mut rx).await;
        remote.handle_event(id, event);

        // The old host end still has a frame in flight when the remote
        // moves on to a new channel.
        let stale = Envelope::update(&GameView::new(json!({"stale": true}))).with_seq(9);
        let (new, new_peer) = Channel::pair((ChannelId(2), tx), (ChannelId(200), new_peer_tx)).await;
        let new_peer = opened(new_peer, &mut new_peer_rx).await;
        remote.attach(new);
        old_peer.send(stale.to_bytes().unwrap()).ok();
        new_peer
            .send(
                Envelope::init(&GameView::new(json!({"fresh": true})))
                    .with_seq(1)
                    .to_bytes()
                    .unwrap(),
            )
            .unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_millis(300);
        while let Ok(Some((id, event))) = tokio::time::timeout_at(deadline, rx.recv()).await {
            let outcome = remote.handle_event(id, event);
            if id == ChannelId(1) {
                assert_eq!(outcome, Outcome::Ignored);
            }
        }
        assert_eq!(remote.current(), Some(ChannelId(2)));
        assert_eq!(remote.view(), Some(GameView::new(json!({"fresh": true}))));
    }

    #[tokio::test]
    async fn remote_discards_view_when_channel_closes() {
        let mut rig = rig(json!({"score": 3})).await;
        rig.host_step().await;
        rig.remote_step().await;
        rig.remote_step().await;
        assert!(rig.remote.view().is_some());

        rig.host.close();
        rig.host.close();
        loop {
            if let Outcome::Lost(state) = rig.remote_step().await {
                assert!(state.is_terminal());
                break;
            }
        }
        assert_eq!(rig.remote.view(), None);
        assert_eq!(
            rig.remote.send_action(ActionMethod::Draw, None),
            Err(ProtocolError::SendOnClosedChannel(ConnectionState::Closed))
        );
    }

    #[tokio::test]
    async fn member_joined_triggers_fresh_snapshot() {
        let mut rig = rig(json!({"round": 1})).await;
        rig.host_step().await;
        rig.remote_step().await;
        rig.remote_step().await;

        rig.remote_channel
            .send(
                Envelope::new(Method::MemberJoined, Some(json!({"members": 2})))
                    .to_bytes()
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(rig.host_step().await, Outcome::Handled);
        assert_eq!(rig.remote_step().await, Outcome::Handled);
        assert_eq!(rig.host.seq(), 2);
    }

    #[test]
    fn sending_without_channel_fails() {
        let remote = RemoteEngine::new();
        assert_eq!(
            remote.send_action(ActionMethod::Draw, None),
            Err(ProtocolError::SendOnClosedChannel(ConnectionState::Idle))
        );
    }

    #[tokio::test]
    async fn open_is_reported_after_attach_however_late() {
        let (host_tx, mut host_rx) = event_queue();
        let (remote_tx, mut remote_rx) = event_queue();
        let (a, b) = Channel::pair((ChannelId(5), host_tx), (ChannelId(6), remote_tx)).await;
        let (_game, view) = watch::channel(GameView::new(json!({"late": true})));

        // The connect attempt hands the channel over well after the socket
        // is up; nothing may have been reported in the meantime.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(host_rx.try_recv().is_err());
        assert!(remote_rx.try_recv().is_err());

        let mut host = HostEngine::new(view);
        let mut remote = RemoteEngine::new();
        remote.attach(b);
        let (id, event) = next(&mut remote_rx).await;
        assert_eq!(remote.handle_event(id, event), Outcome::Opened);

        tokio::time::sleep(Duration::from_millis(50)).await;
        host.attach(a);
        let (id, event) = next(&mut host_rx).await;
        assert_eq!(
            host.handle_event(id, event, &mut Recorder::default()),
            Outcome::Opened
        );
        assert_eq!(host.state(), ConnectionState::Open);

        let (id, event) = next(&mut remote_rx).await;
        assert_eq!(remote.handle_event(id, event), Outcome::Handled);
        assert_eq!(remote.view(), Some(GameView::new(json!({"late": true}))));
    }
}
