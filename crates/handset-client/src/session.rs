//! Session actors.
//!
//! Every session, host or remote, is one tokio task that exclusively owns its
//! channel, state machine, sync engine and supervisor. The outside world talks
//! to it through a handle: commands go in over an `mpsc` (with `oneshot`
//! replies where there is something to report), status and views come out of
//! `watch` cells. Nothing is shared between sessions.
//!
//! Connection attempts run as separate tasks and report back to the actor, so
//! a slow handshake never stalls event processing.

use crate::channel::{Channel, ChannelId, EventReceiver, EventSender, event_queue};
use crate::engine::{HostActions, HostEngine, Outcome, RemoteEngine};
use crate::peer::{Answerer, Offerer, PeerConfig};
use crate::relayed::{self, RelayEndpoint};
use crate::supervisor::{Decision, ReconnectPolicy, Supervisor};
use handset_core::{
    ActionMethod, ChannelEvent, ConnectionState, GameView, ProtocolError, SessionId,
    SignalingArtifact, Status,
};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Sleep, sleep};

/// How a session reaches its peer.
#[derive(Debug, Clone)]
pub enum Transport {
    /// Through a relay, keyed by a session id that survives reconnects.
    Relayed {
        endpoint: RelayEndpoint,
        session: SessionId,
    },
    /// Directly, after an offer/answer exchange. Every reconnect needs a
    /// fresh exchange.
    Peer(PeerConfig),
}

type Linked = (ChannelId, Result<Channel, ProtocolError>);

/// In-flight connection attempt.
struct Links {
    tx: mpsc::UnboundedSender<Linked>,
    rx: mpsc::UnboundedReceiver<Linked>,
    task: Option<JoinHandle<()>>,
}

impl Links {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx, task: None }
    }

    /// Run `attempt` in the background. Replaces any earlier attempt.
    fn spawn<F>(&mut self, id: ChannelId, attempt: F)
    where
        F: Future<Output = Result<Channel, ProtocolError>> + Send + 'static,
    {
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            let _ = tx.send((id, attempt.await));
        });
        if let Some(old) = self.task.replace(task) {
            old.abort();
        }
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Supervisor plus the pending retry timer.
struct Recovery {
    supervisor: Supervisor,
    retry: Option<(ChannelId, Pin<Box<Sleep>>)>,
}

impl Recovery {
    fn new(policy: ReconnectPolicy) -> Self {
        Self {
            supervisor: Supervisor::new(policy),
            retry: None,
        }
    }

    fn next_channel_id(&mut self) -> ChannelId {
        self.supervisor.next_channel_id()
    }

    fn on_open(&mut self) {
        self.supervisor.on_open();
    }

    fn on_failure(&mut self, id: ChannelId) {
        match self.supervisor.on_failure(id) {
            Decision::Reconnect { next, after } => {
                self.retry = Some((next, Box::pin(sleep(after))));
            }
            Decision::Duplicate => {}
            Decision::GiveUp => self.retry = None,
        }
    }

    /// Resolves with the id to use once the retry timer fires.
    async fn wait(&mut self) -> ChannelId {
        match self.retry.as_mut() {
            Some((id, timer)) => {
                let id = *id;
                timer.await;
                self.retry = None;
                id
            }
            None => std::future::pending().await,
        }
    }
}

enum Wake<C> {
    Event(ChannelId, ChannelEvent),
    Linked(Linked),
    Command(Option<C>),
    ViewChanged(bool),
    Retry(ChannelId),
}

fn session_ended() -> ProtocolError {
    ProtocolError::SendOnClosedChannel(ConnectionState::Closed)
}

fn relayed_attempt(
    endpoint: &RelayEndpoint,
    session: &SessionId,
    id: ChannelId,
    events: EventSender,
) -> impl Future<Output = Result<Channel, ProtocolError>> + Send + 'static {
    let (endpoint, session) = (endpoint.clone(), session.clone());
    async move { relayed::connect(&endpoint, &session, id, events).await }
}

// ---- host ----

enum HostCommand {
    Answer(SignalingArtifact, oneshot::Sender<Result<(), ProtocolError>>),
    Shutdown,
}

/// Handle to a running host session.
pub struct HostHandle {
    commands: mpsc::UnboundedSender<HostCommand>,
    status: watch::Receiver<Status>,
    offer: watch::Receiver<Option<SignalingArtifact>>,
    task: JoinHandle<()>,
}

impl HostHandle {
    pub fn status(&self) -> watch::Receiver<Status> {
        self.status.clone()
    }

    /// The offer to hand to the remote, in direct-peer mode. Replaced by a
    /// fresh one after every loss, and cleared once an answer was accepted.
    pub fn offer(&self) -> watch::Receiver<Option<SignalingArtifact>> {
        self.offer.clone()
    }

    /// Feed the remote's answer to the pending offer.
    ///
    /// A malformed or stale answer is rejected with `MalformedSignal` and the
    /// offer stays valid, so a corrected answer can still be supplied.
    pub async fn answer(&self, artifact: SignalingArtifact) -> Result<(), ProtocolError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(HostCommand::Answer(artifact, tx))
            .map_err(|_| session_ended())?;
        rx.await.map_err(|_| session_ended())?
    }

    /// Close the channel and stop the session.
    pub async fn shutdown(self) {
        let _ = self.commands.send(HostCommand::Shutdown);
        let _ = self.task.await;
    }
}

/// Start a host session.
///
/// `view` carries the game's current view; each change is pushed to the
/// remote. Remote actions are dispatched to `actions`. The session ends when
/// the handle shuts it down, every handle is dropped, or the view sender goes
/// away.
pub fn spawn_host<A>(
    transport: Transport,
    policy: ReconnectPolicy,
    view: watch::Receiver<GameView>,
    actions: A,
) -> HostHandle
where
    A: HostActions + Send + 'static,
{
    let (commands_tx, commands) = mpsc::unbounded_channel();
    let (status, status_rx) = watch::channel(Status::Connecting);
    let (offer, offer_rx) = watch::channel(None);
    let (events_tx, events) = event_queue();

    let session = HostSession {
        transport,
        engine: HostEngine::new(view),
        actions,
        recovery: Recovery::new(policy),
        events_tx,
        events,
        links: Links::new(),
        commands,
        status,
        offer,
        pending: None,
    };
    HostHandle {
        commands: commands_tx,
        status: status_rx,
        offer: offer_rx,
        task: tokio::spawn(session.run()),
    }
}

struct HostSession<A> {
    transport: Transport,
    engine: HostEngine,
    actions: A,
    recovery: Recovery,
    events_tx: EventSender,
    events: EventReceiver,
    links: Links,
    commands: mpsc::UnboundedReceiver<HostCommand>,
    status: watch::Sender<Status>,
    offer: watch::Sender<Option<SignalingArtifact>>,
    pending: Option<(ChannelId, Offerer)>,
}

impl<A: HostActions> HostSession<A> {
    async fn run(mut self) {
        let first = self.recovery.next_channel_id();
        self.begin(first).await;

        loop {
            match self.next_wake().await {
                Wake::Event(id, event) => self.on_event(id, event),
                Wake::Linked((id, result)) => self.on_linked(id, result),
                Wake::Command(Some(HostCommand::Answer(artifact, reply))) => {
                    let _ = reply.send(self.on_answer(artifact));
                }
                Wake::Command(Some(HostCommand::Shutdown) | None) => break,
                Wake::ViewChanged(true) => {
                    if let Err(e) = self.engine.publish_update() {
                        tracing::warn!(error = %e, "could not publish update");
                    }
                }
                Wake::ViewChanged(false) => {
                    tracing::info!("game view went away, ending session");
                    break;
                }
                Wake::Retry(id) => self.begin(id).await,
            }
        }

        self.links.abort();
        self.engine.close();
        self.offer.send_replace(None);
        self.status.send_replace(Status::Closed);
        tracing::info!("host session ended");
    }

    async fn next_wake(&mut self) -> Wake<HostCommand> {
        tokio::select! {
            Some((id, event)) = self.events.recv() => Wake::Event(id, event),
            Some(linked) = self.links.rx.recv() => Wake::Linked(linked),
            command = self.commands.recv() => Wake::Command(command),
            alive = self.engine.view_changed() => Wake::ViewChanged(alive),
            id = self.recovery.wait() => Wake::Retry(id),
        }
    }

    async fn begin(&mut self, id: ChannelId) {
        self.status.send_replace(Status::Connecting);
        match &self.transport {
            Transport::Relayed { endpoint, session } => {
                let attempt = relayed_attempt(endpoint, session, id, self.events_tx.clone());
                self.links.spawn(id, attempt);
            }
            Transport::Peer(config) => match Offerer::bind(config).await {
                Ok(mut offerer) => {
                    tracing::info!(channel = %id, "waiting for answer to new offer");
                    self.offer.send_replace(offerer.local_signal());
                    self.pending = Some((id, offerer));
                }
                Err(e) => {
                    tracing::warn!(channel = %id, error = %e, "could not prepare offer");
                    self.status.send_replace(Status::Errored);
                    self.recovery.on_failure(id);
                }
            },
        }
    }

    fn on_answer(&mut self, artifact: SignalingArtifact) -> Result<(), ProtocolError> {
        let accepted = match &self.pending {
            Some((_, offerer)) => offerer.validate(&artifact),
            None => Err(ProtocolError::MalformedSignal(
                "no offer is waiting for an answer".into(),
            )),
        };
        let open = self.engine.state().is_open();
        let accepted = accepted.inspect_err(|e| {
            tracing::warn!(error = %e, "rejected answer");
            // An open channel keeps its status; the caller gets the error.
            if !open {
                self.status.send_replace(Status::InvalidLink);
            }
        })?;

        if let Some((id, offerer)) = self.pending.take() {
            self.offer.send_replace(None);
            self.status.send_replace(Status::Connecting);
            let attempt = offerer.connect(accepted, id, self.events_tx.clone());
            self.links.spawn(id, attempt);
        }
        Ok(())
    }

    fn on_linked(&mut self, id: ChannelId, result: Result<Channel, ProtocolError>) {
        match result {
            Ok(channel) => self.engine.attach(channel),
            Err(e) => {
                tracing::warn!(channel = %id, error = %e, "could not open channel");
                self.status.send_replace(Status::Errored);
                self.recovery.on_failure(id);
            }
        }
    }

    fn on_event(&mut self, id: ChannelId, event: ChannelEvent) {
        match self.engine.handle_event(id, event, &mut self.actions) {
            Outcome::Opened => {
                self.recovery.on_open();
                self.status.send_replace(Status::Live);
            }
            Outcome::Lost(state) => {
                self.status.send_replace(Status::lost(state));
                self.recovery.on_failure(id);
            }
            Outcome::Handled | Outcome::Ignored => {}
        }
    }
}

// ---- remote ----

enum RemoteCommand {
    Offer(SignalingArtifact, oneshot::Sender<Result<(), ProtocolError>>),
    Send(
        ActionMethod,
        Option<Value>,
        oneshot::Sender<Result<(), ProtocolError>>,
    ),
    Shutdown,
}

/// Handle to a running remote session.
pub struct RemoteHandle {
    commands: mpsc::UnboundedSender<RemoteCommand>,
    status: watch::Receiver<Status>,
    view: watch::Receiver<Option<GameView>>,
    answer: watch::Receiver<Option<SignalingArtifact>>,
    task: JoinHandle<()>,
}

impl RemoteHandle {
    pub fn status(&self) -> watch::Receiver<Status> {
        self.status.clone()
    }

    /// The mirrored game view; `None` while no snapshot is held.
    pub fn view(&self) -> watch::Receiver<Option<GameView>> {
        self.view.clone()
    }

    /// Answer to hand back to the host, in direct-peer mode.
    pub fn answer(&self) -> watch::Receiver<Option<SignalingArtifact>> {
        self.answer.clone()
    }

    /// Start a direct-peer handshake from the host's offer.
    pub async fn offer(&self, artifact: SignalingArtifact) -> Result<(), ProtocolError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(RemoteCommand::Offer(artifact, tx))
            .map_err(|_| session_ended())?;
        rx.await.map_err(|_| session_ended())?
    }

    /// Send an action to the host. Fails, and the action is lost, unless the
    /// channel is open.
    pub async fn send(
        &self,
        action: ActionMethod,
        payload: Option<Value>,
    ) -> Result<(), ProtocolError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(RemoteCommand::Send(action, payload, tx))
            .map_err(|_| session_ended())?;
        rx.await.map_err(|_| session_ended())?
    }

    pub async fn draw(&self) -> Result<(), ProtocolError> {
        self.send(ActionMethod::Draw, None).await
    }

    pub async fn auction_start(&self) -> Result<(), ProtocolError> {
        self.send(ActionMethod::AuctionStart, None).await
    }

    pub async fn auction_close(&self) -> Result<(), ProtocolError> {
        self.send(ActionMethod::AuctionClose, None).await
    }

    pub async fn auction_offer(&self, payload: Value) -> Result<(), ProtocolError> {
        self.send(ActionMethod::AuctionOffer, Some(payload)).await
    }

    pub async fn exchange(&self, payload: Value) -> Result<(), ProtocolError> {
        self.send(ActionMethod::Exchange, Some(payload)).await
    }

    pub async fn exchange_accept(&self) -> Result<(), ProtocolError> {
        self.send(ActionMethod::ExchangeAccept, None).await
    }

    pub async fn buy_back(&self, payload: Value) -> Result<(), ProtocolError> {
        self.send(ActionMethod::BuyBack, Some(payload)).await
    }

    pub async fn cow_trade_start(&self, payload: Value) -> Result<(), ProtocolError> {
        self.send(ActionMethod::CowTradeStart, Some(payload)).await
    }

    pub async fn cow_trade_respond(&self, payload: Value) -> Result<(), ProtocolError> {
        self.send(ActionMethod::CowTradeRespond, Some(payload)).await
    }

    pub async fn shutdown(self) {
        let _ = self.commands.send(RemoteCommand::Shutdown);
        let _ = self.task.await;
    }
}

/// Start a remote session.
///
/// In relayed mode it connects right away. In direct-peer mode it waits for
/// [`RemoteHandle::offer`].
pub fn spawn_remote(transport: Transport, policy: ReconnectPolicy) -> RemoteHandle {
    let (commands_tx, commands) = mpsc::unbounded_channel();
    let (status, status_rx) = watch::channel(Status::Connecting);
    let (answer, answer_rx) = watch::channel(None);
    let (events_tx, events) = event_queue();
    let engine = RemoteEngine::new();
    let view = engine.subscribe();

    let session = RemoteSession {
        transport,
        engine,
        recovery: Recovery::new(policy),
        events_tx,
        events,
        links: Links::new(),
        commands,
        status,
        answer,
    };
    RemoteHandle {
        commands: commands_tx,
        status: status_rx,
        view,
        answer: answer_rx,
        task: tokio::spawn(session.run()),
    }
}

struct RemoteSession {
    transport: Transport,
    engine: RemoteEngine,
    recovery: Recovery,
    events_tx: EventSender,
    events: EventReceiver,
    links: Links,
    commands: mpsc::UnboundedReceiver<RemoteCommand>,
    status: watch::Sender<Status>,
    answer: watch::Sender<Option<SignalingArtifact>>,
}

impl RemoteSession {
    async fn run(mut self) {
        if matches!(self.transport, Transport::Relayed { .. }) {
            let first = self.recovery.next_channel_id();
            self.begin(first);
        }

        loop {
            match self.next_wake().await {
                Wake::Event(id, event) => self.on_event(id, event),
                Wake::Linked((id, result)) => self.on_linked(id, result),
                Wake::Command(Some(RemoteCommand::Offer(artifact, reply))) => {
                    let _ = reply.send(self.on_offer(artifact));
                }
                Wake::Command(Some(RemoteCommand::Send(action, payload, reply))) => {
                    let _ = reply.send(self.engine.send_action(action, payload));
                }
                Wake::Command(Some(RemoteCommand::Shutdown) | None) => break,
                Wake::ViewChanged(_) => {}
                Wake::Retry(id) => self.begin(id),
            }
        }

        self.links.abort();
        self.engine.close();
        self.answer.send_replace(None);
        self.status.send_replace(Status::Closed);
        tracing::info!("remote session ended");
    }

    async fn next_wake(&mut self) -> Wake<RemoteCommand> {
        tokio::select! {
            Some((id, event)) = self.events.recv() => Wake::Event(id, event),
            Some(linked) = self.links.rx.recv() => Wake::Linked(linked),
            command = self.commands.recv() => Wake::Command(command),
            id = self.recovery.wait() => Wake::Retry(id),
        }
    }

    /// Relayed mode only: re-subscribe with the same session id.
    fn begin(&mut self, id: ChannelId) {
        if let Transport::Relayed { endpoint, session } = &self.transport {
            self.status.send_replace(Status::Connecting);
            let attempt = relayed_attempt(endpoint, session, id, self.events_tx.clone());
            self.links.spawn(id, attempt);
        }
    }

    fn on_offer(&mut self, artifact: SignalingArtifact) -> Result<(), ProtocolError> {
        let Transport::Peer(config) = &self.transport else {
            return Err(ProtocolError::MalformedSignal(
                "relayed sessions take no offer".into(),
            ));
        };
        let open = self.engine.state().is_open();
        let mut answerer = Answerer::respond(&artifact, config).inspect_err(|e| {
            tracing::warn!(error = %e, "rejected offer");
            if !open {
                self.status.send_replace(Status::InvalidLink);
            }
        })?;

        let id = self.recovery.next_channel_id();
        tracing::info!(channel = %id, "answering offer");
        self.answer.send_replace(answerer.local_signal());
        self.status.send_replace(Status::Connecting);
        self.links
            .spawn(id, answerer.connect(id, self.events_tx.clone()));
        Ok(())
    }

    fn on_linked(&mut self, id: ChannelId, result: Result<Channel, ProtocolError>) {
        match result {
            Ok(channel) => {
                self.answer.send_replace(None);
                self.engine.attach(channel);
            }
            Err(e) => {
                tracing::warn!(channel = %id, error = %e, "could not open channel");
                self.status.send_replace(Status::Errored);
                self.after_loss(id);
            }
        }
    }

    fn on_event(&mut self, id: ChannelId, event: ChannelEvent) {
        match self.engine.handle_event(id, event) {
            Outcome::Opened => {
                self.recovery.on_open();
                self.status.send_replace(Status::Connected);
            }
            Outcome::Handled => {
                self.status.send_if_modified(|status| {
                    let changed = *status != Status::Live;
                    *status = Status::Live;
                    changed
                });
            }
            Outcome::Lost(state) => {
                self.status.send_replace(Status::lost(state));
                self.after_loss(id);
            }
            Outcome::Ignored => {}
        }
    }

    fn after_loss(&mut self, id: ChannelId) {
        match self.transport {
            Transport::Relayed { .. } => self.recovery.on_failure(id),
            // Needs a fresh offer from the host.
            Transport::Peer(_) => {
                self.answer.send_replace(None);
            }
        }
    }
}
