//! In-process relay hub
//!
//! Loopback Relay Channel connecting any number of dApp endpoints to a single
//! wallet endpoint. Proposals, requests and namespace updates travel through
//! shared state guarded by a mutex; events fan out over per-endpoint
//! broadcast channels. Error messages mirror the hosted relay's wording so
//! callers can classify them the same way.

use super::storage::{KeyValueStorage, MemoryStorage};
use super::types::{AppMetadata, ConnectParams, Pairing, Proposal, RelayEvent, Session, SessionEventPayload, SessionRequest};
use super::{DappRelay, Relay, WalletRelay};
use crate::core::chain::ChainId;
use crate::core::namespace::{cardano, Namespaces};
use crate::core::rpc::{RpcError, RpcRequest, RpcResponse};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{Duration as Ttl, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tracing::debug;

const CHANNEL_CAPACITY: usize = 64;

fn no_matching_key(what: &str, key: impl Display) -> Error {
    Error::Transport(format!("No matching key. {what}: {key}"))
}

fn random_topic() -> String { hex::encode(rand::random::<[u8; 32]>()) }

fn expiry_in(ttl: Ttl) -> i64 { (Utc::now() + ttl).timestamp() }

fn pairing_uri(topic: &str) -> String {
    format!("wc:{topic}@2?relay-protocol=irn&symKey={}", random_topic())
}

/// Topic part of `wc:{topic}@2?...`
pub fn parse_pairing_uri(uri: &str) -> Option<&str> {
    let rest = uri.strip_prefix("wc:")?;
    let (topic, version) = rest.split_once('@')?;
    (!topic.is_empty() && version.starts_with('2')).then_some(topic)
}

struct PendingProposal {
    proposal: Proposal,
    dapp: usize,
    reply: oneshot::Sender<Result<Session>>,
}

struct PendingRequest {
    topic: String,
    reply: oneshot::Sender<std::result::Result<Value, RpcError>>,
}

struct SessionRecord {
    dapp: usize,
    proposer: AppMetadata,
    /// As the dApp sees it (peer = wallet)
    session: Session,
}

impl SessionRecord {
    fn wallet_view(&self) -> Session {
        Session { peer_metadata: self.proposer.clone(), ..self.session.clone() }
    }
}

struct DappSlot {
    events: broadcast::Sender<RelayEvent>,
    metadata: AppMetadata,
}

struct HubState {
    dapps: Vec<DappSlot>,
    pairings: BTreeMap<String, (usize, Pairing)>,
    sessions: BTreeMap<String, SessionRecord>,
    proposals: BTreeMap<u64, PendingProposal>,
    requests: HashMap<u64, PendingRequest>,
    next_id: u64,
    auto_pair: bool,
    stall_updates: bool,
    update_delay: Option<Duration>,
}

impl HubState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn dapp_events(&self, dapp: usize) -> Option<broadcast::Sender<RelayEvent>> {
        self.dapps.get(dapp).map(|slot| slot.events.clone())
    }

    fn activate_pairing(&mut self, topic: &str, peer: Option<AppMetadata>) {
        if let Some((_, pairing)) = self.pairings.get_mut(topic) {
            pairing.active = true;
            pairing.expiry = expiry_in(Ttl::days(30));
            if peer.is_some() {
                pairing.peer_metadata = peer;
            }
        }
    }
}

struct HubInner {
    state: Mutex<HubState>,
    wallet_events: broadcast::Sender<RelayEvent>,
    wallet_storage: Arc<dyn KeyValueStorage>,
    wallet_metadata: AppMetadata,
}

impl HubInner {
    fn state(&self) -> Result<MutexGuard<'_, HubState>> {
        self.state.lock().map_err(|_| Error::Transport("relay hub lock poisoned".into()))
    }
}

/// Loopback relay. Clones share the same hub.
#[derive(Clone)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

impl Default for MemoryHub {
    fn default() -> Self { Self::new() }
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::with_wallet(AppMetadata::new("Memory Wallet", "https://wallet.invalid"), Arc::new(MemoryStorage::new()))
    }

    pub fn with_wallet(metadata: AppMetadata, storage: Arc<dyn KeyValueStorage>) -> Self {
        let (wallet_events, _) = broadcast::channel(CHANNEL_CAPACITY);
        let state = HubState {
            dapps: Vec::new(),
            pairings: BTreeMap::new(),
            sessions: BTreeMap::new(),
            proposals: BTreeMap::new(),
            requests: HashMap::new(),
            next_id: 0,
            auto_pair: true,
            stall_updates: false,
            update_delay: None,
        };
        Self {
            inner: Arc::new(HubInner { state: Mutex::new(state), wallet_events, wallet_storage: storage, wallet_metadata: metadata }),
        }
    }

    /// New dApp endpoint with its own event bus and in-memory storage.
    pub fn dapp(&self, metadata: AppMetadata) -> Result<DappEndpoint> {
        self.dapp_with_storage(metadata, Arc::new(MemoryStorage::new()))
    }

    pub fn dapp_with_storage(&self, metadata: AppMetadata, storage: Arc<dyn KeyValueStorage>) -> Result<DappEndpoint> {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        let mut state = self.inner.state()?;
        state.dapps.push(DappSlot { events, metadata });
        Ok(DappEndpoint { hub: self.inner.clone(), index: state.dapps.len() - 1, storage })
    }

    pub fn wallet(&self) -> WalletEndpoint { WalletEndpoint { hub: self.inner.clone() } }

    /// When off, proposals wait until the wallet calls `pair(uri)`.
    pub fn set_auto_pair(&self, on: bool) -> Result<()> {
        self.inner.state()?.auto_pair = on;
        Ok(())
    }

    /// Namespace updates never settle while set.
    pub fn stall_updates(&self, on: bool) -> Result<()> {
        self.inner.state()?.stall_updates = on;
        Ok(())
    }

    pub fn set_update_delay(&self, delay: Option<Duration>) -> Result<()> {
        self.inner.state()?.update_delay = delay;
        Ok(())
    }

    /// Orphan a pairing while leaving its sessions in place.
    pub fn deactivate_pairing(&self, topic: &str) -> Result<()> {
        let mut state = self.inner.state()?;
        let (_, pairing) = state.pairings.get_mut(topic).ok_or_else(|| no_matching_key("pairing topic doesn't exist", topic))?;
        pairing.active = false;
        Ok(())
    }

    pub fn pending_proposals(&self) -> Result<usize> { Ok(self.inner.state()?.proposals.len()) }
}

/// dApp end of a [`MemoryHub`].
#[derive(Clone)]
pub struct DappEndpoint {
    hub: Arc<HubInner>,
    index: usize,
    storage: Arc<dyn KeyValueStorage>,
}

impl DappEndpoint {
    fn events(&self) -> Result<broadcast::Sender<RelayEvent>> {
        self.hub.state()?.dapp_events(self.index).ok_or_else(|| Error::Transport("unknown dapp endpoint".into()))
    }
}

#[async_trait]
impl Relay for DappEndpoint {
    fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        match self.events() {
            Ok(events) => events.subscribe(),
            Err(_) => broadcast::channel(1).1,
        }
    }

    fn storage(&self) -> Arc<dyn KeyValueStorage> { self.storage.clone() }

    async fn sessions(&self) -> Result<Vec<Session>> {
        let state = self.hub.state()?;
        Ok(state.sessions.values().filter(|r| r.dapp == self.index).map(|r| r.session.clone()).collect())
    }

    async fn pairings(&self, active_only: bool) -> Result<Vec<Pairing>> {
        let state = self.hub.state()?;
        Ok(state
            .pairings
            .values()
            .filter(|(owner, p)| *owner == self.index && (!active_only || p.active))
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn ping(&self, topic: &str) -> Result<()> {
        {
            let state = self.hub.state()?;
            state
                .sessions
                .get(topic)
                .filter(|r| r.dapp == self.index)
                .ok_or_else(|| no_matching_key("session topic doesn't exist", topic))?;
        }
        let _ = self.hub.wallet_events.send(RelayEvent::SessionPing { topic: topic.to_string() });
        Ok(())
    }
}

#[async_trait]
impl DappRelay for DappEndpoint {
    async fn connect(&self, params: ConnectParams) -> Result<Session> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let (uri, delivered) = {
            let mut state = self.hub.state()?;
            let topic = match &params.pairing_topic {
                Some(existing) => {
                    if !state.pairings.contains_key(existing) {
                        return Err(no_matching_key("pairing topic doesn't exist", existing));
                    }
                    existing.clone()
                }
                None => {
                    let topic = random_topic();
                    let pairing = Pairing { topic: topic.clone(), active: false, peer_metadata: None, expiry: expiry_in(Ttl::minutes(5)) };
                    state.pairings.insert(topic.clone(), (self.index, pairing));
                    topic
                }
            };
            let id = state.next_id();
            let proposal = Proposal {
                id,
                pairing_topic: topic.clone(),
                required_namespaces: params.namespaces,
                optional_namespaces: params.optional_namespaces,
                proposer: state.dapps.get(self.index).map(|d| d.metadata.clone()).unwrap_or_default(),
            };
            let deliver = state.auto_pair || params.pairing_topic.is_some();
            state.proposals.insert(id, PendingProposal { proposal: proposal.clone(), dapp: self.index, reply: reply_tx });
            if deliver {
                state.activate_pairing(&topic, None);
            }
            let uri = params.pairing_topic.is_none().then(|| pairing_uri(&topic));
            (uri, deliver.then_some(proposal))
        };
        if let Some(uri) = uri {
            debug!(%uri, "display_uri");
            let _ = self.events()?.send(RelayEvent::DisplayUri(uri));
        }
        if let Some(proposal) = delivered {
            let _ = self.hub.wallet_events.send(RelayEvent::SessionProposal(proposal));
        }
        match reply_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Transport("proposal expired without a response".into())),
        }
    }

    async fn abort_pairing_attempt(&self) -> Result<()> {
        let mut state = self.hub.state()?;
        let aborted: Vec<u64> = state.proposals.iter().filter(|(_, p)| p.dapp == self.index).map(|(id, _)| *id).collect();
        for id in aborted {
            if let Some(pending) = state.proposals.remove(&id) {
                let topic = pending.proposal.pairing_topic;
                if !state.sessions.values().any(|r| r.session.pairing_topic == topic) {
                    state.pairings.remove(&topic);
                }
                debug!(proposal = id, pairing = %topic, "pairing attempt aborted");
            }
        }
        Ok(())
    }

    async fn cleanup_pending_pairings(&self) -> Result<()> {
        let mut state = self.hub.state()?;
        let in_use: Vec<String> = state
            .sessions
            .values()
            .map(|r| r.session.pairing_topic.clone())
            .chain(state.proposals.values().map(|p| p.proposal.pairing_topic.clone()))
            .collect();
        let index = self.index;
        state.pairings.retain(|topic, (owner, pairing)| *owner != index || pairing.active || in_use.contains(topic));
        Ok(())
    }

    async fn disconnect(&self, topic: &str, reason: RpcError) -> Result<()> {
        {
            let mut state = self.hub.state()?;
            match state.sessions.get(topic) {
                Some(record) if record.dapp == self.index => {}
                _ => return Err(no_matching_key("session topic doesn't exist", topic)),
            }
            state.sessions.remove(topic);
            state.requests.retain(|_, pending| pending.topic != topic);
        }
        debug!(%topic, %reason, "session disconnected by dapp");
        let _ = self.hub.wallet_events.send(RelayEvent::SessionDelete { topic: topic.to_string() });
        Ok(())
    }

    async fn request(&self, topic: &str, chain: &ChainId, request: RpcRequest) -> Result<Value> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let id = {
            let mut state = self.hub.state()?;
            let record = state
                .sessions
                .get(topic)
                .filter(|r| r.dapp == self.index)
                .ok_or_else(|| no_matching_key("session topic doesn't exist", topic))?;
            let namespace = cardano(&record.session.namespaces);
            if !namespace.map(|ns| ns.contains_chain(chain)).unwrap_or(false) {
                return Err(Error::UnsupportedChain(format!("{chain} is not approved for session {topic}")));
            }
            if !namespace.map(|ns| ns.supports_method(&request.method)).unwrap_or(false) {
                return Err(Error::Rpc(RpcError::invalid_method(&request.method)));
            }
            let id = state.next_id();
            state.requests.insert(id, PendingRequest { topic: topic.to_string(), reply: reply_tx });
            id
        };
        debug!(id, %topic, method = %request.method, "session_request");
        let event = SessionRequest { id, topic: topic.to_string(), chain_id: *chain, request };
        let _ = self.hub.wallet_events.send(RelayEvent::SessionRequest(event));
        match reply_rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(Error::Rpc(e)),
            Err(_) => Err(Error::Transport(format!("request {id} dropped before a response"))),
        }
    }
}

/// Wallet end of a [`MemoryHub`].
#[derive(Clone)]
pub struct WalletEndpoint {
    hub: Arc<HubInner>,
}

impl WalletEndpoint {
    fn session_owner(&self, topic: &str) -> Result<broadcast::Sender<RelayEvent>> {
        let state = self.hub.state()?;
        let record = state.sessions.get(topic).ok_or_else(|| no_matching_key("session topic doesn't exist", topic))?;
        state.dapp_events(record.dapp).ok_or_else(|| Error::Transport("unknown dapp endpoint".into()))
    }
}

#[async_trait]
impl Relay for WalletEndpoint {
    fn subscribe(&self) -> broadcast::Receiver<RelayEvent> { self.hub.wallet_events.subscribe() }

    fn storage(&self) -> Arc<dyn KeyValueStorage> { self.hub.wallet_storage.clone() }

    async fn sessions(&self) -> Result<Vec<Session>> {
        Ok(self.hub.state()?.sessions.values().map(SessionRecord::wallet_view).collect())
    }

    async fn pairings(&self, active_only: bool) -> Result<Vec<Pairing>> {
        let state = self.hub.state()?;
        Ok(state.pairings.values().map(|(_, p)| p).filter(|p| !active_only || p.active).cloned().collect())
    }

    async fn ping(&self, topic: &str) -> Result<()> {
        let events = self.session_owner(topic)?;
        let _ = events.send(RelayEvent::SessionPing { topic: topic.to_string() });
        Ok(())
    }
}

#[async_trait]
impl WalletRelay for WalletEndpoint {
    async fn pair(&self, uri: &str) -> Result<()> {
        let topic = parse_pairing_uri(uri).ok_or_else(|| Error::Transport(format!("invalid pairing uri: {uri}")))?;
        let proposals: Vec<Proposal> = {
            let mut state = self.hub.state()?;
            if !state.pairings.contains_key(topic) {
                return Err(no_matching_key("pairing topic doesn't exist", topic));
            }
            state.activate_pairing(topic, None);
            state.proposals.values().filter(|p| p.proposal.pairing_topic == topic).map(|p| p.proposal.clone()).collect()
        };
        for proposal in proposals {
            let _ = self.hub.wallet_events.send(RelayEvent::SessionProposal(proposal));
        }
        Ok(())
    }

    async fn approve_session(&self, proposal_id: u64, namespaces: Namespaces) -> Result<Session> {
        for namespace in namespaces.values() {
            namespace.validate()?;
        }
        let (dapp_view, wallet_view, reply) = {
            let mut state = self.hub.state()?;
            let pending = state.proposals.remove(&proposal_id).ok_or_else(|| no_matching_key("proposal id doesn't exist", proposal_id))?;
            let proposal = pending.proposal;
            let session = Session {
                topic: random_topic(),
                pairing_topic: proposal.pairing_topic.clone(),
                namespaces,
                required_namespaces: proposal.required_namespaces,
                optional_namespaces: proposal.optional_namespaces,
                peer_metadata: self.hub.wallet_metadata.clone(),
                expiry: expiry_in(Ttl::days(7)),
            };
            state.activate_pairing(&proposal.pairing_topic, Some(proposal.proposer.clone()));
            let record = SessionRecord { dapp: pending.dapp, proposer: proposal.proposer, session: session.clone() };
            let wallet_view = record.wallet_view();
            state.sessions.insert(session.topic.clone(), record);
            (session, wallet_view, pending.reply)
        };
        if reply.send(Ok(dapp_view)).is_err() {
            self.hub.state()?.sessions.remove(&wallet_view.topic);
            return Err(Error::Transport("proposer is no longer waiting".into()));
        }
        Ok(wallet_view)
    }

    async fn reject_session(&self, proposal_id: u64, reason: RpcError) -> Result<()> {
        let pending = self
            .hub
            .state()?
            .proposals
            .remove(&proposal_id)
            .ok_or_else(|| no_matching_key("proposal id doesn't exist", proposal_id))?;
        let _ = pending.reply.send(Err(Error::Rpc(reason)));
        Ok(())
    }

    async fn update_session(&self, topic: &str, namespaces: Namespaces) -> Result<()> {
        let (stall, delay) = {
            let state = self.hub.state()?;
            if !state.sessions.contains_key(topic) {
                return Err(no_matching_key("session topic doesn't exist", topic));
            }
            (state.stall_updates, state.update_delay)
        };
        for namespace in namespaces.values() {
            namespace.validate()?;
        }
        if stall {
            futures::future::pending::<()>().await;
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let events = {
            let mut state = self.hub.state()?;
            let record = state.sessions.get_mut(topic).ok_or_else(|| no_matching_key("session topic doesn't exist", topic))?;
            record.session.namespaces = namespaces.clone();
            let dapp = record.dapp;
            state.dapp_events(dapp)
        };
        debug!(%topic, "session_update settled");
        if let Some(events) = events {
            let _ = events.send(RelayEvent::SessionUpdate { topic: topic.to_string(), namespaces });
        }
        Ok(())
    }

    async fn emit_session_event(&self, topic: &str, chain: &ChainId, event: SessionEventPayload) -> Result<()> {
        let events = {
            let state = self.hub.state()?;
            let record = state.sessions.get(topic).ok_or_else(|| no_matching_key("session topic doesn't exist", topic))?;
            let namespace = cardano(&record.session.namespaces);
            if !namespace.map(|ns| ns.contains_chain(chain)).unwrap_or(false) {
                return Err(Error::Transport(format!("Missing or invalid. emit() chainId: {chain} not in session {topic}")));
            }
            if !namespace.map(|ns| ns.supports_event(&event.name)).unwrap_or(false) {
                return Err(Error::Transport(format!("Missing or invalid. emit() event: {} not in session {topic}", event.name)));
            }
            state.dapp_events(record.dapp)
        };
        if let Some(events) = events {
            let _ = events.send(RelayEvent::SessionEvent { topic: topic.to_string(), chain_id: *chain, event });
        }
        Ok(())
    }

    async fn respond(&self, topic: &str, response: RpcResponse) -> Result<()> {
        let pending = {
            let mut state = self.hub.state()?;
            let on_topic = state.requests.get(&response.id).map(|p| p.topic == topic).unwrap_or(false);
            if on_topic {
                state.requests.remove(&response.id)
            } else {
                None
            }
        };
        let pending = pending.ok_or_else(|| no_matching_key("request id doesn't exist", response.id))?;
        let _ = pending.reply.send(response.outcome);
        Ok(())
    }

    async fn disconnect_session(&self, topic: &str, reason: RpcError) -> Result<()> {
        let events = self.session_owner(topic)?;
        {
            let mut state = self.hub.state()?;
            state.sessions.remove(topic);
            state.requests.retain(|_, pending| pending.topic != topic);
        }
        debug!(%topic, %reason, "session disconnected by wallet");
        let _ = events.send(RelayEvent::SessionDelete { topic: topic.to_string() });
        Ok(())
    }

    async fn delete_pairing(&self, topic: &str) -> Result<()> {
        self.hub
            .state()?
            .pairings
            .remove(topic)
            .map(|_| ())
            .ok_or_else(|| no_matching_key("pairing topic doesn't exist", topic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::consts::{events, methods};
    use crate::core::namespace::{build_optional, build_required};
    use crate::core::Account;
    use serde_json::json;

    fn approval(chain: ChainId) -> Namespaces {
        let mut ns = build_required(&[chain], false);
        let account = Account::new(chain, "stake1abc", "addr1xyz").unwrap();
        ns.values_mut().for_each(|n| {
            n.add_account(account.clone());
        });
        ns
    }

    fn params(chain: ChainId) -> ConnectParams {
        ConnectParams { namespaces: build_required(&[chain], false), optional_namespaces: build_optional(&ChainId::all()), pairing_topic: None }
    }

    async fn approve_next(wallet: WalletEndpoint, mut inbound: broadcast::Receiver<RelayEvent>, chain: ChainId) {
        while let Ok(event) = inbound.recv().await {
            if let RelayEvent::SessionProposal(p) = event {
                wallet.approve_session(p.id, approval(chain)).await.unwrap();
                return;
            }
        }
    }

    #[test]
    fn pairing_uri_round_trip() {
        let uri = pairing_uri("abc");
        assert_eq!(parse_pairing_uri(&uri), Some("abc"));
        assert_eq!(parse_pairing_uri("wc:abc@1?x"), None);
        assert_eq!(parse_pairing_uri("http://abc"), None);
    }

    #[test]
    fn connect_request_and_disconnect() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let hub = MemoryHub::new();
            let dapp = hub.dapp(AppMetadata::new("dapp", "https://dapp.invalid")).unwrap();
            let wallet = hub.wallet();
            tokio::spawn(approve_next(wallet.clone(), wallet.subscribe(), ChainId::MAINNET));

            let session = dapp.connect(params(ChainId::MAINNET)).await.unwrap();
            assert_eq!(session.peer_metadata.name, "Memory Wallet");
            assert_eq!(dapp.pairings(true).await.unwrap().len(), 1);
            assert_eq!(wallet.sessions().await.unwrap()[0].peer_metadata.name, "dapp");

            let mut inbound = wallet.subscribe();
            let responder = wallet.clone();
            tokio::spawn(async move {
                while let Ok(RelayEvent::SessionRequest(req)) = inbound.recv().await {
                    responder.respond(&req.topic, RpcResponse::result(req.id, json!(["addr1xyz"]))).await.unwrap();
                }
            });
            let used = dapp
                .request(&session.topic, &ChainId::MAINNET, RpcRequest::bare(methods::GET_USED_ADDRESSES))
                .await
                .unwrap();
            assert_eq!(used, json!(["addr1xyz"]));

            let err = dapp.request(&session.topic, &ChainId::PREVIEW, RpcRequest::bare(methods::SIGN_TX)).await.unwrap_err();
            assert!(matches!(err, Error::UnsupportedChain(_)));

            dapp.disconnect(&session.topic, RpcError::user_disconnected()).await.unwrap();
            let again = dapp.disconnect(&session.topic, RpcError::user_disconnected()).await.unwrap_err();
            assert!(again.is_no_matching_key());
        });
    }

    #[test]
    fn emit_outside_namespace_is_rejected() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let hub = MemoryHub::new();
            let dapp = hub.dapp(AppMetadata::default()).unwrap();
            let wallet = hub.wallet();
            tokio::spawn(approve_next(wallet.clone(), wallet.subscribe(), ChainId::MAINNET));
            let session = dapp.connect(params(ChainId::MAINNET)).await.unwrap();

            let event = SessionEventPayload { name: events::CHAIN_CHANGED.into(), data: json!("cip34:0-2") };
            assert!(wallet.emit_session_event(&session.topic, &ChainId::PREVIEW, event.clone()).await.is_err());

            let mut inbound = dapp.subscribe();
            wallet.emit_session_event(&session.topic, &ChainId::MAINNET, event).await.unwrap();
            match inbound.recv().await.unwrap() {
                RelayEvent::SessionEvent { chain_id, .. } => assert_eq!(chain_id, ChainId::MAINNET),
                other => panic!("unexpected {}", other.name()),
            }
        });
    }

    #[test]
    fn manual_pairing_waits_for_wallet() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let hub = MemoryHub::new();
            hub.set_auto_pair(false).unwrap();
            let dapp = hub.dapp(AppMetadata::default()).unwrap();
            let wallet = hub.wallet();
            let mut dapp_events = dapp.subscribe();
            tokio::spawn(approve_next(wallet.clone(), wallet.subscribe(), ChainId::PREPROD));

            let connecting = tokio::spawn({
                let dapp = dapp.clone();
                async move { dapp.connect(params(ChainId::PREPROD)).await }
            });
            let uri = match dapp_events.recv().await.unwrap() {
                RelayEvent::DisplayUri(uri) => uri,
                other => panic!("unexpected {}", other.name()),
            };
            assert!(dapp.pairings(true).await.unwrap().is_empty());
            wallet.pair(&uri).await.unwrap();
            let session = connecting.await.unwrap().unwrap();
            assert_eq!(cardano(&session.namespaces).unwrap().chains, vec![ChainId::PREPROD]);
        });
    }
}
