//! Session registry.
//!
//! Maps a [`SessionId`] to the members currently connected to it. A session
//! is created when its first member joins and removed when its last member
//! leaves. Every mutation happens under one write guard, so concurrent joins
//! and leaves of the same session cannot race. Each session has its own
//! broadcast channel; sessions share nothing else.

use handset_core::SessionId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};

/// One connection within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberId(u64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

/// A frame published to a session, tagged with its sender so it is never
/// echoed back.
#[derive(Debug, Clone)]
pub struct Frame {
    pub from: MemberId,
    pub payload: Payload,
}

/// What a member gets when joining.
pub struct Membership {
    pub member: MemberId,
    /// Members in the session, including this one.
    pub members: usize,
    pub tx: broadcast::Sender<Frame>,
    pub rx: broadcast::Receiver<Frame>,
}

struct Room {
    tx: broadcast::Sender<Frame>,
    members: HashSet<MemberId>,
}

#[derive(Default)]
struct Inner {
    rooms: HashMap<SessionId, Room>,
    next_member: u64,
}

#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RwLock<Inner>>,
    capacity: usize,
}

impl SessionRegistry {
    /// `capacity` bounds how far a slow member may fall behind its session.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::default(),
            capacity: capacity.max(1),
        }
    }

    pub async fn join(&self, session: &SessionId) -> Membership {
        let mut inner = self.inner.write().await;
        inner.next_member += 1;
        let member = MemberId(inner.next_member);
        let room = inner.rooms.entry(session.clone()).or_insert_with(|| {
            tracing::debug!(%session, "session created");
            Room {
                tx: broadcast::channel(self.capacity).0,
                members: HashSet::new(),
            }
        });
        room.members.insert(member);
        Membership {
            member,
            members: room.members.len(),
            tx: room.tx.clone(),
            rx: room.tx.subscribe(),
        }
    }

    /// Remove `member`. Returns how many members remain.
    pub async fn leave(&self, session: &SessionId, member: MemberId) -> usize {
        let mut inner = self.inner.write().await;
        let Some(room) = inner.rooms.get_mut(session) else {
            return 0;
        };
        room.members.remove(&member);
        let remaining = room.members.len();
        if remaining == 0 {
            inner.rooms.remove(session);
            tracing::debug!(%session, "session removed");
        }
        remaining
    }

    /// Member count, or `None` if the session does not exist.
    pub async fn members(&self, session: &SessionId) -> Option<usize> {
        let inner = self.inner.read().await;
        inner.rooms.get(session).map(|room| room.members.len())
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.inner.read().await.rooms.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> SessionId {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn created_on_first_join_removed_when_empty() {
        let registry = SessionRegistry::new(8);
        assert_eq!(registry.members(&id("ab12cd")).await, None);

        let host = registry.join(&id("ab12cd")).await;
        let remote = registry.join(&id("ab12cd")).await;
        assert_eq!(remote.members, 2);
        assert_ne!(host.member, remote.member);
        assert_eq!(registry.members(&id("ab12cd")).await, Some(2));

        assert_eq!(registry.leave(&id("ab12cd"), host.member).await, 1);
        assert_eq!(registry.leave(&id("ab12cd"), remote.member).await, 0);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let registry = SessionRegistry::new(8);
        let a = registry.join(&id("aaaaaa")).await;
        let mut b = registry.join(&id("bbbbbb")).await;

        a.tx.send(Frame {
            from: a.member,
            payload: Payload::Text("hi".into()),
        })
        .unwrap();
        assert!(matches!(
            b.rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn concurrent_join_and_leave_leave_nothing_behind() {
        let registry = SessionRegistry::new(8);
        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    let session = id(if i % 2 == 0 { "even" } else { "odd" });
                    let membership = registry.join(&session).await;
                    tokio::task::yield_now().await;
                    registry.leave(&session, membership.member).await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn leaving_unknown_session_is_harmless() {
        let registry = SessionRegistry::new(8);
        let m = registry.join(&id("ab12cd")).await;
        assert_eq!(registry.leave(&id("zzzzzz"), m.member).await, 0);
        assert_eq!(registry.members(&id("ab12cd")).await, Some(1));
    }
}
