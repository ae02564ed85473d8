//! Session Reconciler - establishing, upgrading and tearing down sessions
//!
//! ```text
//! Idle -> Connecting -> Negotiating -> Active -> (AccountChanging | ChainChanging)* -> Active -> Disconnected
//! ```
//!
//! - [`SessionReconciler`]: dApp side. Enable/connect/ghost detection, inbound
//!   session events applied to the emulator, disconnect and remote deletion.
//! - [`ChangePropagator`]: wallet side. Namespace update first, event second,
//!   per topic, with a bounded wait on the update.
//!
//! Work for one topic is serialized through [`TopicLocks`]; different topics
//! interleave freely.

mod dapp;
mod propagate;

pub use dapp::SessionReconciler;
pub use propagate::{Change, ChangePropagator, ChangeReport, TopicReport, UpdateOutcome};

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcilerState {
    #[default]
    Idle,
    Connecting,
    Negotiating,
    Active,
    AccountChanging,
    ChainChanging,
    Disconnected,
}

impl ReconcilerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcilerState::Idle => "idle",
            ReconcilerState::Connecting => "connecting",
            ReconcilerState::Negotiating => "negotiating",
            ReconcilerState::Active => "active",
            ReconcilerState::AccountChanging => "account_changing",
            ReconcilerState::ChainChanging => "chain_changing",
            ReconcilerState::Disconnected => "disconnected",
        }
    }
}

/// Outcome of a bounded wait. `TimedOut` means "unknown", not "failed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deadline<T> {
    Done(T),
    TimedOut,
}

impl<T> Deadline<T> {
    pub fn is_timed_out(&self) -> bool { matches!(self, Deadline::TimedOut) }

    pub fn done(self) -> Option<T> {
        match self {
            Deadline::Done(value) => Some(value),
            Deadline::TimedOut => None,
        }
    }
}

pub async fn deadline<F: Future>(after: Duration, future: F) -> Deadline<F::Output> {
    match tokio::time::timeout(after, future).await {
        Ok(value) => Deadline::Done(value),
        Err(_) => Deadline::TimedOut,
    }
}

/// Like [`deadline`], against an instant shared by several waits.
pub async fn deadline_at<F: Future>(until: tokio::time::Instant, future: F) -> Deadline<F::Output> {
    match tokio::time::timeout_at(until, future).await {
        Ok(value) => Deadline::Done(value),
        Err(_) => Deadline::TimedOut,
    }
}

/// One async mutex per topic.
#[derive(Clone, Default)]
pub struct TopicLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl TopicLocks {
    pub fn new() -> Self { Self::default() }

    pub async fn lock(&self, topic: &str) -> Result<OwnedMutexGuard<()>> {
        let mutex = {
            let mut locks = self.inner.lock().map_err(|_| Error::Transport("topic lock table poisoned".into()))?;
            locks.entry(topic.to_string()).or_default().clone()
        };
        Ok(mutex.lock_owned().await)
    }

    /// Drop the entry for a topic that no longer exists.
    pub fn forget(&self, topic: &str) {
        if let Ok(mut locks) = self.inner.lock() {
            locks.remove(topic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn deadline_reports_timeouts_as_values() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            assert_eq!(deadline(Duration::from_millis(50), async { 7 }).await, Deadline::Done(7));
            let stalled = deadline(Duration::from_millis(20), futures::future::pending::<()>()).await;
            assert!(stalled.is_timed_out());
            assert_eq!(stalled.done(), None);

            // one instant bounds two waits in sequence
            let until = tokio::time::Instant::now() + Duration::from_millis(60);
            let first = deadline_at(until, tokio::time::sleep(Duration::from_millis(40))).await;
            assert!(!first.is_timed_out());
            let second = deadline_at(until, tokio::time::sleep(Duration::from_millis(40))).await;
            assert!(second.is_timed_out());
        });
    }

    #[test]
    fn same_topic_is_serialized() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let locks = TopicLocks::new();
            let inside = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));
            let mut tasks = Vec::new();
            for _ in 0..4 {
                let (locks, inside, peak) = (locks.clone(), inside.clone(), peak.clone());
                tasks.push(tokio::spawn(async move {
                    let _guard = locks.lock("topic").await.unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                }));
            }
            for task in tasks {
                task.await.unwrap();
            }
            assert_eq!(peak.load(Ordering::SeqCst), 1);

            let _a = locks.lock("a").await.unwrap();
            let other = deadline(Duration::from_millis(50), locks.lock("b")).await;
            assert!(!other.is_timed_out());
        });
    }
}
