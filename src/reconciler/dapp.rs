//! dApp-side reconciliation
//!
//! `enable()` decides between reusing the live session and negotiating a new
//! one. A session whose pairing is gone or inactive is a ghost: it is torn
//! down and renegotiated instead of trusted. Inbound `session_event`s mutate
//! the emulator in place and refresh the persisted defaults;
//! `session_delete` resets everything without touching the transport.

use super::{ReconcilerState, TopicLocks};
use crate::core::chain::{Account, ChainId};
use crate::core::consts::events;
use crate::core::namespace::{build_optional, build_required, cardano, Namespace};
use crate::core::rpc::RpcError;
use crate::emulator::{ApiState, EnabledApi, Mode};
use crate::error::{Error, Result};
use crate::provider::{PairingPrompt, ProviderConfig};
use crate::relay::{ConnectParams, DappRelay, RelayEvent, Session, SessionEventPayload};
use crate::reconciler::Deadline;
use crate::session::SessionStore;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What a change event points at.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EventTarget {
    Account(Account),
    Chain(ChainId),
}

/// Accepts an account string, a chain id, the legacy `chain:stake` form, or
/// an array whose first element is one of those.
fn parse_event_target(data: &Value) -> Option<EventTarget> {
    let raw = match data {
        Value::String(s) => s.as_str(),
        Value::Array(items) => items.first()?.as_str()?,
        _ => return None,
    };
    if let Ok(account) = raw.parse::<Account>() {
        return Some(EventTarget::Account(account));
    }
    if let Ok(chain) = raw.parse::<ChainId>() {
        return Some(EventTarget::Chain(chain));
    }
    let mut parts = raw.splitn(3, ':');
    let chain = format!("{}:{}", parts.next()?, parts.next()?).parse().ok()?;
    Some(EventTarget::Chain(chain))
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

struct Shared {
    relay: Arc<dyn DappRelay>,
    store: SessionStore<dyn DappRelay>,
    config: ProviderConfig,
    state: RwLock<ReconcilerState>,
    emulator: RwLock<Option<EnabledApi>>,
    locks: TopicLocks,
}

impl Shared {
    async fn set_state(&self, next: ReconcilerState) {
        let mut state = self.state.write().await;
        if *state != next {
            debug!(from = state.as_str(), to = next.as_str(), "reconciler");
            *state = next;
        }
    }

    async fn current_api_for(&self, topic: &str) -> Option<EnabledApi> {
        self.emulator.read().await.as_ref().filter(|api| api.topic() == topic).cloned()
    }

    /// Local teardown: emulator listeners, persisted defaults, topic lock.
    async fn reset(&self, topic: Option<&str>) {
        if let Some(api) = self.emulator.write().await.take() {
            api.close();
        }
        if let Err(e) = self.store.clear_defaults().await {
            warn!(error = %e, "clearing persisted defaults failed");
        }
        if let Some(topic) = topic {
            self.locks.forget(topic);
        }
        self.set_state(ReconcilerState::Disconnected).await;
    }

    async fn handle(&self, event: RelayEvent) -> Flow {
        match event {
            RelayEvent::SessionEvent { topic, event, .. } => {
                self.on_session_event(&topic, event).await;
                Flow::Continue
            }
            RelayEvent::SessionDelete { topic } => {
                let current = self.emulator.read().await.as_ref().map(|api| api.topic().to_string());
                match current {
                    Some(current) if current == topic => {
                        info!(%topic, "session deleted by wallet");
                        self.reset(Some(&topic)).await;
                        Flow::Stop
                    }
                    // still negotiating, or some other session: keep listening
                    Some(_) => Flow::Continue,
                    None => {
                        debug!(%topic, "session deleted before activation");
                        self.locks.forget(&topic);
                        Flow::Continue
                    }
                }
            }
            RelayEvent::SessionUpdate { topic, namespaces } => {
                debug!(%topic, chains = ?cardano(&namespaces).map(|ns| ns.chains.len()), "session_update");
                Flow::Continue
            }
            RelayEvent::SessionPing { topic } => {
                info!(%topic, "session_ping");
                Flow::Continue
            }
            _ => Flow::Continue,
        }
    }

    async fn on_session_event(&self, topic: &str, payload: SessionEventPayload) {
        let Some(api) = self.current_api_for(topic).await else {
            debug!(%topic, name = %payload.name, "event for a topic without an emulator");
            return;
        };
        let _guard = match self.locks.lock(topic).await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(%topic, error = %e, "dropping session event");
                return;
            }
        };
        let Some(target) = parse_event_target(&payload.data) else {
            warn!(%topic, name = %payload.name, data = %payload.data, "undecodable session event");
            return;
        };
        let transition = match payload.name.as_str() {
            events::CHAIN_CHANGED | events::LEGACY_NETWORK_CHANGE => ReconcilerState::ChainChanging,
            events::ACCOUNTS_CHANGED | events::LEGACY_ACCOUNT_CHANGE => ReconcilerState::AccountChanging,
            other => {
                debug!(%topic, name = other, "ignoring session event");
                return;
            }
        };
        self.set_state(transition).await;
        let changed = match &target {
            EventTarget::Account(account) => api.apply_account_change(account).await,
            EventTarget::Chain(chain) => api.apply_chain_change(*chain).await,
        };
        if changed {
            let state = api.state().await;
            if let Err(e) = self.store.persist_defaults(&state.chain, state.account().as_ref()).await {
                warn!(%topic, error = %e, "persisting defaults failed");
            }
        }
        self.set_state(ReconcilerState::Active).await;
    }

    /// First granted candidate among: persisted, desired, namespace default, first chain.
    async fn resolve_chain(&self, granted: &Namespace, fresh: bool) -> Result<ChainId> {
        let persisted = if fresh { None } else { self.store.default_chain().await? };
        [persisted, self.config.desired_chain, granted.default_chain, granted.chains.first().copied()]
            .into_iter()
            .flatten()
            .find(|chain| granted.contains_chain(chain))
            .ok_or(Error::DefaultChainNotSet)
    }

    /// The persisted account only counts when it is on `chain`.
    async fn resolve_account(&self, granted: &Namespace, chain: &ChainId, fresh: bool) -> Result<Option<Account>> {
        if !fresh {
            match self.store.default_account().await? {
                Some(account) if account.chain == *chain => return Ok(Some(account)),
                Some(stale) => debug!(account = %stale, %chain, "persisted account is on another chain"),
                None => {}
            }
        }
        Ok(granted.accounts_on(chain).next().cloned())
    }

    async fn activate(&self, session: Session, mode: Mode, fresh: bool) -> Result<EnabledApi> {
        let granted = session
            .cardano()
            .cloned()
            .ok_or_else(|| Error::UnsupportedChain(format!("session {} grants no cip34 namespace", session.topic)))?;
        let chain = self.resolve_chain(&granted, fresh).await?;
        let account = self.resolve_account(&granted, &chain, fresh).await?;
        let state = ApiState {
            chain,
            stake_address: account.as_ref().map(|a| a.stake_address.clone()),
            base_address: account.as_ref().map(|a| a.base_address.clone()),
        };
        let api = EnabledApi::new(self.relay.clone(), session.topic.clone(), state, mode, self.config.timeouts);
        if account.is_none() {
            match api.discover_used_addresses().await {
                Deadline::Done(Ok(addresses)) => debug!(count = addresses.len(), "addresses discovered"),
                Deadline::Done(Err(e)) => warn!(error = %e, "address discovery failed"),
                Deadline::TimedOut => warn!(after = ?self.config.timeouts.address_discovery, "address discovery timed out"),
            }
        }
        self.store.persist_defaults(&chain, api.account().await.as_ref()).await?;
        *self.emulator.write().await = Some(api.clone());
        self.set_state(ReconcilerState::Active).await;
        let mode = api.mode().await;
        info!(topic = %session.topic, %chain, ?mode, "wallet api enabled");
        Ok(api)
    }
}

async fn pump(shared: Arc<Shared>, mut inbound: broadcast::Receiver<RelayEvent>) {
    loop {
        match inbound.recv().await {
            Ok(event) => {
                if shared.handle(event).await == Flow::Stop {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "relay events lagged"),
            Err(RecvError::Closed) => break,
        }
    }
    debug!("relay listener stopped");
}

async fn dismissed(prompt: Option<&dyn PairingPrompt>) {
    match prompt {
        Some(prompt) => prompt.closed().await,
        None => std::future::pending().await,
    }
}

/// dApp-side state machine over one relay endpoint.
pub struct SessionReconciler {
    shared: Arc<Shared>,
    listener: Mutex<Option<JoinHandle<()>>>,
    enabling: Mutex<()>,
}

impl SessionReconciler {
    pub fn new(relay: Arc<dyn DappRelay>, config: ProviderConfig) -> Self {
        let shared = Shared {
            store: SessionStore::new(relay.clone()),
            relay,
            config,
            state: RwLock::new(ReconcilerState::Idle),
            emulator: RwLock::new(None),
            locks: TopicLocks::new(),
        };
        Self { shared: Arc::new(shared), listener: Mutex::new(None), enabling: Mutex::new(()) }
    }

    pub async fn state(&self) -> ReconcilerState { *self.shared.state.read().await }

    pub fn store(&self) -> &SessionStore<dyn DappRelay> { &self.shared.store }

    pub fn relay(&self) -> &Arc<dyn DappRelay> { &self.shared.relay }

    pub async fn emulator(&self) -> Option<EnabledApi> { self.shared.emulator.read().await.clone() }

    pub async fn listening(&self) -> bool {
        self.listener.lock().await.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    async fn ensure_listener(&self) {
        let mut slot = self.listener.lock().await;
        if slot.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return;
        }
        let inbound = self.shared.relay.subscribe();
        *slot = Some(tokio::spawn(pump(self.shared.clone(), inbound)));
    }

    async fn stop_listener(&self) {
        if let Some(handle) = self.listener.lock().await.take() {
            handle.abort();
        }
    }

    /// Reuse the live session when its pairing is alive, otherwise negotiate.
    /// Legacy mode always runs the emulator over the relay.
    pub async fn enable(&self, mode: Mode) -> Result<EnabledApi> {
        let _enabling = self.enabling.lock().await;
        self.ensure_listener().await;
        let mode = if self.shared.config.legacy_mode { Mode::Relay } else { mode };

        if let Some(session) = self.shared.store.first_session().await? {
            if self.shared.store.pairing_alive(&session.pairing_topic).await? {
                if let Some(api) = self.shared.current_api_for(&session.topic).await {
                    if api.mode().await.is_direct() != mode.is_direct() {
                        api.set_mode(mode).await;
                    }
                    return Ok(api);
                }
                return self.shared.activate(session, mode, false).await;
            }
            warn!(topic = %session.topic, pairing = %session.pairing_topic, "ghost session, renegotiating");
            self.shared.reset(Some(&session.topic)).await;
            if let Err(e) = self.shared.relay.disconnect(&session.topic, RpcError::user_disconnected()).await {
                warn!(topic = %session.topic, error = %e, "ghost session disconnect failed");
            }
        }
        self.connect(mode).await
    }

    fn proposal(&self) -> ConnectParams {
        let config = &self.shared.config;
        let mut chains = config.chains.clone();
        if let Some(first) = config.initial_chain() {
            chains.retain(|c| *c != first);
            chains.insert(0, first);
        }
        ConnectParams {
            namespaces: build_required(&chains, config.legacy_mode),
            optional_namespaces: build_optional(&config.chains),
            pairing_topic: None,
        }
    }

    async fn connect(&self, mode: Mode) -> Result<EnabledApi> {
        let shared = &self.shared;
        shared.set_state(ReconcilerState::Connecting).await;
        let prompt = shared.config.qrcode.clone();
        let approval = shared.config.timeouts.approval;
        let mut inbound = shared.relay.subscribe();
        let mut listening = true;

        shared.set_state(ReconcilerState::Negotiating).await;
        let connecting = shared.relay.connect(self.proposal());
        tokio::pin!(connecting);
        let expiry = tokio::time::sleep(approval);
        tokio::pin!(expiry);

        let outcome = loop {
            tokio::select! {
                biased;
                outcome = &mut connecting => break outcome,
                event = inbound.recv(), if listening => match event {
                    Ok(RelayEvent::DisplayUri(uri)) => {
                        info!(%uri, "pairing uri");
                        if let Some(prompt) = &prompt {
                            prompt.open(&uri).await;
                        }
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => listening = false,
                },
                _ = dismissed(prompt.as_deref()) => {
                    warn!("pairing prompt closed before approval");
                    self.abort_attempt().await;
                    return Err(Error::ConnectionAbortedByUser);
                }
                _ = &mut expiry => {
                    warn!(after = ?approval, "no approval");
                    self.abort_attempt().await;
                    return Err(Error::timeout("session approval", approval));
                }
            }
        };
        if let Some(prompt) = &prompt {
            prompt.close().await;
        }
        match outcome {
            Ok(session) => {
                info!(topic = %session.topic, wallet = %session.peer_metadata.name, "session approved");
                shared.activate(session, mode, true).await
            }
            Err(e) => {
                shared.set_state(ReconcilerState::Idle).await;
                Err(e)
            }
        }
    }

    /// Abort the outstanding proposal and drop half-created pairings.
    async fn abort_attempt(&self) {
        let relay = &self.shared.relay;
        if let Err(e) = relay.abort_pairing_attempt().await {
            warn!(error = %e, "abort pairing attempt failed");
        }
        if let Err(e) = relay.cleanup_pending_pairings().await {
            warn!(error = %e, "pending pairing cleanup failed");
        }
        if let Some(prompt) = &self.shared.config.qrcode {
            prompt.close().await;
        }
        self.shared.set_state(ReconcilerState::Idle).await;
    }

    /// Clear persisted defaults, drop every listener, then ask the relay to
    /// disconnect. A session the relay already forgot is not an error.
    pub async fn disconnect(&self) -> Result<()> {
        let topic = match self.shared.emulator.read().await.as_ref() {
            Some(api) => Some(api.topic().to_string()),
            None => None,
        };
        let topic = match topic {
            Some(topic) => Some(topic),
            None => self.shared.store.first_session().await?.map(|s| s.topic),
        };
        self.stop_listener().await;
        self.shared.reset(topic.as_deref()).await;
        let Some(topic) = topic else { return Ok(()) };
        match self.shared.relay.disconnect(&topic, RpcError::user_disconnected()).await {
            Ok(()) => {
                info!(%topic, "disconnected");
                Ok(())
            }
            Err(e) if e.is_no_matching_key() => {
                warn!(%topic, error = %e, "session already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Namespace `defaultChain`, else the first granted chain.
    pub async fn default_chain_id(&self) -> Result<ChainId> {
        let session = self.shared.store.first_session().await?.ok_or(Error::DefaultChainNotSet)?;
        session
            .cardano()
            .and_then(|ns| ns.default_chain.or_else(|| ns.chains.first().copied()))
            .ok_or(Error::DefaultChainNotSet)
    }

    /// Persisted account, else the first account the session grants.
    pub async fn default_account(&self) -> Result<Account> {
        if let Some(account) = self.shared.store.default_account().await? {
            return Ok(account);
        }
        let session = self.shared.store.first_session().await?.ok_or(Error::AccountNotSet)?;
        session.cardano().and_then(|ns| ns.accounts.first().cloned()).ok_or(Error::AccountNotSet)
    }
}

impl Drop for SessionReconciler {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.listener.try_lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_targets_decode() {
        let account = "cip34:1-764824073:stake1abc-addr1xyz";
        assert!(matches!(parse_event_target(&json!(account)), Some(EventTarget::Account(_))));
        assert!(matches!(parse_event_target(&json!([account])), Some(EventTarget::Account(_))));
        assert_eq!(parse_event_target(&json!("cip34:0-2")), Some(EventTarget::Chain(ChainId::PREVIEW)));
        assert_eq!(parse_event_target(&json!("cip34:0-1:stake_test1uq")), Some(EventTarget::Chain(ChainId::PREPROD)));
        assert_eq!(parse_event_target(&json!(42)), None);
        assert_eq!(parse_event_target(&json!("garbage")), None);
    }

    #[test]
    fn delete_before_activation_keeps_the_listener() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let hub = crate::relay::MemoryHub::new();
            let relay: Arc<dyn DappRelay> = Arc::new(hub.dapp(crate::relay::AppMetadata::default()).unwrap());
            let reconciler = SessionReconciler::new(relay, ProviderConfig::new("p").with_chains(vec![ChainId::PREPROD]));
            assert!(!reconciler.listening().await);
            reconciler.ensure_listener().await;
            assert!(reconciler.listening().await);

            reconciler.store().persist_defaults(&ChainId::PREPROD, None).await.unwrap();
            reconciler.shared.set_state(ReconcilerState::Negotiating).await;
            let flow = reconciler.shared.handle(RelayEvent::SessionDelete { topic: "elsewhere".into() }).await;

            assert_eq!(flow, Flow::Continue);
            assert!(reconciler.listening().await);
            assert_eq!(reconciler.state().await, ReconcilerState::Negotiating);
            assert_eq!(reconciler.store().default_chain().await.unwrap(), Some(ChainId::PREPROD));
        });
    }
}
