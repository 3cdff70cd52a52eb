//! Reconnection decisions.
//!
//! The supervisor is pure bookkeeping: the session actor reports every loss
//! and every successful open, and carries out the returned [`Decision`].
//! Exactly one new channel is requested per failure event; reporting the same
//! failed channel twice is recognised and yields [`Decision::Duplicate`].

use crate::channel::ChannelId;
use std::time::Duration;

/// How eagerly a session re-establishes a lost channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Pause before each new attempt.
    pub delay: Duration,
    /// Consecutive failures tolerated before giving up. `None` retries
    /// forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(500),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Never reconnect.
    pub fn disabled() -> Self {
        Self {
            delay: Duration::ZERO,
            max_attempts: Some(0),
        }
    }
}

/// What to do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Open a fresh channel with id `next` after waiting `after`.
    Reconnect { next: ChannelId, after: Duration },
    /// This failure was already handled.
    Duplicate,
    /// The attempt budget is spent.
    GiveUp,
}

#[derive(Debug)]
pub struct Supervisor {
    policy: ReconnectPolicy,
    last_failed: Option<ChannelId>,
    consecutive: u32,
    next_id: u64,
}

impl Supervisor {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            last_failed: None,
            consecutive: 0,
            next_id: 1,
        }
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Failures since the last successful open.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive
    }

    /// Allocate an id for a brand-new channel instance.
    pub fn next_channel_id(&mut self) -> ChannelId {
        let id = ChannelId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Report that channel `id` closed, errored, or never opened.
    pub fn on_failure(&mut self, id: ChannelId) -> Decision {
        if self.last_failed.is_some_and(|last| last >= id) {
            return Decision::Duplicate;
        }
        self.last_failed = Some(id);
        self.consecutive += 1;

        if let Some(max) = self.policy.max_attempts
            && self.consecutive > max
        {
            tracing::warn!(channel = %id, failures = self.consecutive, "giving up reconnecting");
            return Decision::GiveUp;
        }
        let next = self.next_channel_id();
        tracing::info!(failed = %id, %next, attempt = self.consecutive, "reconnecting");
        Decision::Reconnect {
            next,
            after: self.policy.delay,
        }
    }

    /// Report that a channel reached `Open`; resets the attempt budget.
    pub fn on_open(&mut self) {
        self.consecutive = 0;
    }
}
