//! Wallet-side change propagation
//!
//! For each session that can accept the target chain: append the account
//! (and its chain) to the live namespace, wait for the update up to the
//! configured bound, then emit the change event. A timed-out update keeps
//! running in the background and the event is emitted anyway; a rejected
//! update is logged and that topic gets no event. Topics are reconciled
//! concurrently, so a stalled session never delays the others.

use super::{deadline_at, Deadline, TopicLocks};
use crate::core::chain::{Account, ChainId};
use crate::core::consts::events;
use crate::core::namespace::{cardano, cardano_mut, Namespaces};
use crate::error::Result;
use crate::relay::{Session, SessionEventPayload, WalletRelay};
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Account(Account),
    /// New account on a new chain; `previous` is the chain being left.
    Chain { account: Account, previous: ChainId },
}

impl Change {
    pub fn account(&self) -> &Account {
        match self {
            Change::Account(account) | Change::Chain { account, .. } => account,
        }
    }

    fn event_name(&self) -> &'static str {
        match self {
            Change::Account(_) => events::ACCOUNTS_CHANGED,
            Change::Chain { .. } => events::CHAIN_CHANGED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    AlreadyPresent,
    /// Still in flight when the bound expired
    TimedOut,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicReport {
    pub topic: String,
    pub update: UpdateOutcome,
    pub emitted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeReport {
    pub topics: Vec<TopicReport>,
    /// Sessions whose namespaces cannot take the chain
    pub skipped: Vec<String>,
}

impl ChangeReport {
    pub fn emitted_to(&self) -> Vec<&str> {
        self.topics.iter().filter(|t| t.emitted).map(|t| t.topic.as_str()).collect()
    }

    pub fn topic(&self, topic: &str) -> Option<&TopicReport> { self.topics.iter().find(|t| t.topic == topic) }
}

#[derive(Clone)]
pub struct ChangePropagator {
    relay: Arc<dyn WalletRelay>,
    locks: TopicLocks,
    update_timeout: Duration,
}

impl ChangePropagator {
    pub fn new(relay: Arc<dyn WalletRelay>, locks: TopicLocks, update_timeout: Duration) -> Self {
        Self { relay, locks, update_timeout }
    }

    /// Every live session.
    pub async fn propagate(&self, change: &Change) -> Result<ChangeReport> { self.propagate_where(change, |_| true).await }

    /// Only the session on `topic`.
    pub async fn propagate_to(&self, topic: &str, change: &Change) -> Result<ChangeReport> {
        self.propagate_where(change, |s| s.topic == topic).await
    }

    async fn propagate_where(&self, change: &Change, selected: impl Fn(&Session) -> bool) -> Result<ChangeReport> {
        let account = change.account();
        let mut report = ChangeReport::default();
        let mut compatible = Vec::new();
        for session in self.relay.sessions().await?.into_iter().filter(|s| selected(s)) {
            if session.accepts_chain(&account.chain) {
                compatible.push(session);
            } else {
                debug!(topic = %session.topic, chain = %account.chain, "session cannot take chain, skipped");
                report.skipped.push(session.topic);
            }
        }

        let outcomes = join_all(compatible.iter().map(|session| self.reconcile_topic(session, change))).await;
        for (session, outcome) in compatible.into_iter().zip(outcomes) {
            match outcome? {
                Some(topic) => report.topics.push(topic),
                None => report.skipped.push(session.topic),
            }
        }
        info!(
            event = change.event_name(),
            account = %account,
            emitted = report.emitted_to().len(),
            skipped = report.skipped.len(),
            "change propagated"
        );
        Ok(report)
    }

    /// Lock, update and emit for one topic. Lock acquisition and the update
    /// share one bound. `None` when the session vanished meanwhile.
    async fn reconcile_topic(&self, session: &Session, change: &Change) -> Result<Option<TopicReport>> {
        let until = Instant::now() + self.update_timeout;
        let guard = match deadline_at(until, self.locks.lock(&session.topic)).await {
            Deadline::Done(guard) => Some(guard?),
            Deadline::TimedOut => {
                warn!(topic = %session.topic, "previous namespace update still outstanding");
                None
            }
        };
        let current = match guard {
            // re-read under the lock; a previous change may have landed
            Some(_) => self.relay.sessions().await?.into_iter().find(|s| s.topic == session.topic),
            None => Some(session.clone()),
        };
        let Some(current) = current else { return Ok(None) };
        Ok(Some(self.reconcile(&current, change, guard, until).await))
    }

    /// Holding `guard` means no other update for this topic is in flight.
    async fn reconcile(
        &self,
        session: &Session,
        change: &Change,
        guard: Option<OwnedMutexGuard<()>>,
        until: Instant,
    ) -> TopicReport {
        let account = change.account();
        let topic = session.topic.clone();
        let live_has_chain = cardano(&session.namespaces).map(|ns| ns.contains_chain(&account.chain)).unwrap_or(false);

        let (update, _held) = match guard {
            None => (UpdateOutcome::TimedOut, None),
            Some(guard) => {
                let mut namespaces = session.namespaces.clone();
                let appended = cardano_mut(&mut namespaces).map(|ns| ns.add_account(account.clone()));
                match appended {
                    None => (UpdateOutcome::Failed("session has no cardano namespace".into()), Some(guard)),
                    Some(false) => (UpdateOutcome::AlreadyPresent, Some(guard)),
                    Some(true) => self.update(&topic, namespaces, guard, until).await,
                }
            }
        };

        if let UpdateOutcome::Failed(reason) = &update {
            warn!(%topic, %reason, "namespace update failed, event not emitted");
            return TopicReport { topic, update, emitted: false };
        }

        // A still-pending update may not carry the new chain yet.
        let emit_chain = match (&update, change) {
            (UpdateOutcome::TimedOut, Change::Chain { previous, .. }) if !live_has_chain => *previous,
            _ => account.chain,
        };
        let event = SessionEventPayload { name: change.event_name().to_string(), data: json!(account.to_string()) };
        let emitted = match self.relay.emit_session_event(&topic, &emit_chain, event).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%topic, error = %e, "change event rejected");
                false
            }
        };
        TopicReport { topic, update, emitted }
    }

    /// The update task owns the topic lock until the relay settles it. On
    /// timeout the lock stays with the task.
    async fn update(
        &self,
        topic: &str,
        namespaces: Namespaces,
        guard: OwnedMutexGuard<()>,
        until: Instant,
    ) -> (UpdateOutcome, Option<OwnedMutexGuard<()>>) {
        let relay = self.relay.clone();
        let owned = topic.to_string();
        let task = tokio::spawn(async move {
            let outcome = relay.update_session(&owned, namespaces).await;
            (outcome, guard)
        });
        match deadline_at(until, task).await {
            Deadline::Done(Ok((Ok(()), guard))) => (UpdateOutcome::Updated, Some(guard)),
            Deadline::Done(Ok((Err(e), guard))) => (UpdateOutcome::Failed(e.to_string()), Some(guard)),
            Deadline::Done(Err(e)) => (UpdateOutcome::Failed(format!("update task: {e}")), None),
            Deadline::TimedOut => {
                warn!(%topic, after = ?self.update_timeout, "namespace update still pending, emitting anyway");
                (UpdateOutcome::TimedOut, None)
            }
        }
    }
}
