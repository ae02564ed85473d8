//! Per-emulator event emitter
//!
//! Listeners live here rather than on the relay bus so a torn-down emulator
//! can drop every callback at once. `close()` makes the emitter inert: later
//! subscriptions are accepted but never fire.

use crate::core::chain::{Account, ChainId};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Account,
    Network,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    closed: bool,
    account: BTreeMap<u64, Listener<Account>>,
    network: BTreeMap<u64, Listener<ChainId>>,
}

#[derive(Clone, Default)]
pub struct EventEmitter {
    inner: Arc<Mutex<Listeners>>,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter").field("listeners", &self.listener_count()).finish()
    }
}

impl EventEmitter {
    pub fn new() -> Self { Self::default() }

    pub fn on_account_change(&self, callback: impl Fn(&Account) + Send + Sync + 'static) -> Subscription {
        self.register(Channel::Account, |l, id| {
            l.account.insert(id, Arc::new(callback));
        })
    }

    pub fn on_network_change(&self, callback: impl Fn(&ChainId) + Send + Sync + 'static) -> Subscription {
        self.register(Channel::Network, |l, id| {
            l.network.insert(id, Arc::new(callback));
        })
    }

    fn register(&self, channel: Channel, insert: impl FnOnce(&mut Listeners, u64)) -> Subscription {
        let id = match self.inner.lock() {
            Ok(mut listeners) if !listeners.closed => {
                listeners.next_id += 1;
                let id = listeners.next_id;
                insert(&mut listeners, id);
                id
            }
            _ => 0,
        };
        Subscription { id, channel, emitter: Arc::downgrade(&self.inner) }
    }

    /// Returns how many listeners were called.
    pub fn emit_account_change(&self, account: &Account) -> usize {
        let listeners: Vec<Listener<Account>> = match self.inner.lock() {
            Ok(l) => l.account.values().cloned().collect(),
            Err(_) => return 0,
        };
        listeners.iter().for_each(|cb| cb(account));
        listeners.len()
    }

    pub fn emit_network_change(&self, chain: &ChainId) -> usize {
        let listeners: Vec<Listener<ChainId>> = match self.inner.lock() {
            Ok(l) => l.network.values().cloned().collect(),
            Err(_) => return 0,
        };
        listeners.iter().for_each(|cb| cb(chain));
        listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().map(|l| l.account.len() + l.network.len()).unwrap_or(0)
    }

    pub fn close(&self) {
        if let Ok(mut l) = self.inner.lock() {
            l.closed = true;
            l.account.clear();
            l.network.clear();
        }
    }

    pub fn is_closed(&self) -> bool { self.inner.lock().map(|l| l.closed).unwrap_or(true) }
}

/// Disposer for one listener. Dropping it leaves the listener registered.
#[must_use = "call dispose() to remove the listener"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    channel: Channel,
    emitter: Weak<Mutex<Listeners>>,
}

impl Subscription {
    pub fn dispose(self) {
        let Some(inner) = self.emitter.upgrade() else { return };
        let Ok(mut l) = inner.lock() else { return };
        match self.channel {
            Channel::Account => {
                l.account.remove(&self.id);
            }
            Channel::Network => {
                l.network.remove(&self.id);
            }
        }
    }
}
