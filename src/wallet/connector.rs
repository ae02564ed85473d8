//! Wallet-side connector: answers proposals and requests, pushes identity changes

use super::Wallet;
use crate::core::chain::{Account, ChainId, CARDANO_NAMESPACE};
use crate::core::consts::methods;
use crate::core::namespace::{cardano, Namespace, Namespaces};
use crate::core::rpc::{RpcError, RpcRequest, RpcResponse};
use crate::emulator::{DataSource, SubmitTxRequest, UtxoRequest};
use crate::error::{Error, Result};
use crate::reconciler::{Change, ChangePropagator, ChangeReport, TopicLocks};
use crate::relay::{Pairing, Proposal, RelayEvent, Session, SessionRequest, WalletRelay};
use crate::runtime::Shutdown;
use crate::session::SessionStore;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_secs(5);

fn union(a: &[String], b: &[String]) -> Vec<String> {
    let mut out = a.to_vec();
    for item in b {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

fn str_param<'a>(request: &'a RpcRequest, index: usize, name: &str) -> Result<&'a str> {
    request
        .params
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Rpc(RpcError::invalid_params(&format!("{} expects `{name}` at position {index}", request.method))))
}

pub struct WalletConnector {
    relay: Arc<dyn WalletRelay>,
    store: SessionStore<dyn WalletRelay>,
    wallet: Arc<dyn Wallet>,
    data_source: Option<Arc<dyn DataSource>>,
    chain: RwLock<ChainId>,
    locks: TopicLocks,
    propagator: ChangePropagator,
}

impl WalletConnector {
    pub fn new(relay: Arc<dyn WalletRelay>, wallet: Arc<dyn Wallet>, chain: ChainId) -> Self {
        let locks = TopicLocks::new();
        Self {
            store: SessionStore::new(relay.clone()),
            propagator: ChangePropagator::new(relay.clone(), locks.clone(), DEFAULT_UPDATE_TIMEOUT),
            relay,
            wallet,
            data_source: None,
            chain: RwLock::new(chain),
            locks,
        }
    }

    /// Bound on each namespace update before the change event goes out anyway.
    pub fn with_update_timeout(mut self, after: Duration) -> Self {
        self.propagator = ChangePropagator::new(self.relay.clone(), self.locks.clone(), after);
        self
    }

    /// Chain reads and submission for balance, UTxO and submitTx requests.
    pub fn with_data_source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.data_source = Some(source);
        self
    }

    pub async fn chain(&self) -> ChainId { *self.chain.read().await }

    /// Wallet identity on the current chain.
    pub async fn account(&self) -> Result<Account> { self.wallet.account(self.chain().await) }

    pub fn store(&self) -> &SessionStore<dyn WalletRelay> { &self.store }

    // ---- pairing and session records ----

    pub async fn pair(&self, uri: &str) -> Result<()> {
        info!(%uri, "pairing");
        self.relay.pair(uri).await
    }

    pub async fn pairings(&self) -> Result<Vec<Pairing>> { self.store.pairings().await }

    pub async fn pairing(&self, topic: &str) -> Result<Pairing> { self.store.pairing(topic).await }

    pub async fn sessions(&self) -> Result<BTreeMap<String, Session>> { self.store.sessions().await }

    pub async fn session(&self, topic: &str) -> Result<Session> { self.store.session(topic).await }

    pub async fn session_expiry(&self, topic: &str) -> Result<DateTime<Utc>> { self.store.session_expiry(topic).await }

    pub async fn ping(&self, topic: &str) -> Result<()> { self.relay.ping(topic).await }

    pub async fn disconnect_session(&self, topic: &str) -> Result<()> {
        self.relay.disconnect_session(topic, RpcError::user_disconnected()).await?;
        self.locks.forget(topic);
        info!(%topic, "session disconnected");
        Ok(())
    }

    /// Drops the pairing only; sessions on it stay until the dApp notices.
    pub async fn delete_pairing(&self, topic: &str) -> Result<()> {
        self.relay.delete_pairing(topic).await?;
        info!(%topic, "pairing deleted");
        Ok(())
    }

    // ---- proposals ----

    /// Approve or reject one proposal. Rejections are answered on the relay
    /// and reported as `Ok(None)`.
    pub async fn handle_proposal(&self, proposal: &Proposal) -> Result<Option<Session>> {
        let current = self.chain().await;
        let (namespaces, follow_up) = match self.approval(proposal, current) {
            Ok(approved) => approved,
            Err(reason) => {
                warn!(proposal = proposal.id, dapp = %proposal.proposer.name, %reason, "proposal rejected");
                self.relay.reject_session(proposal.id, reason).await?;
                return Ok(None);
            }
        };
        let session = self.relay.approve_session(proposal.id, namespaces).await?;
        info!(topic = %session.topic, dapp = %session.peer_metadata.name, "session approved");

        if let Some(previous) = follow_up {
            let change = Change::Chain { account: self.wallet.account(current)?, previous };
            self.propagator.propagate_to(&session.topic, &change).await?;
        }
        Ok(Some(session))
    }

    /// Approved namespaces, plus the chain to report a switch from when the
    /// wallet's current chain was only optional.
    fn approval(&self, proposal: &Proposal, current: ChainId) -> std::result::Result<(Namespaces, Option<ChainId>), RpcError> {
        if let Some(key) = proposal.required_namespaces.keys().find(|k| k.as_str() != CARDANO_NAMESPACE) {
            return Err(RpcError::unsupported_namespace_key(key));
        }
        let required = cardano(&proposal.required_namespaces).cloned().unwrap_or_default();
        let optional = cardano(&proposal.optional_namespaces).cloned().unwrap_or_default();

        let mut accounts = Vec::with_capacity(required.chains.len());
        for chain in &required.chains {
            if !optional.contains_chain(chain) {
                return Err(RpcError::unsupported_chains(&format!("required chain {chain} is not in the optional namespace")));
            }
            let account = self.wallet.account(*chain).map_err(|e| RpcError::unsupported_chains(&format!("{chain}: {e}")))?;
            accounts.push(account);
        }

        let mut namespace = Namespace {
            chains: required.chains.clone(),
            methods: union(&required.methods, &optional.methods),
            events: union(&required.events, &optional.events),
            accounts: Vec::new(),
            rpc_map: required.rpc_map.clone(),
            default_chain: None,
        };
        for account in accounts {
            namespace.add_account(account);
        }

        let mut follow_up = None;
        if !namespace.contains_chain(&current) && optional.contains_chain(&current) {
            if let Ok(account) = self.wallet.account(current) {
                follow_up = namespace.chains.first().copied();
                namespace.add_account(account);
                namespace.default_chain = Some(current);
            }
        }
        if namespace.chains.is_empty() {
            return Err(RpcError::unsupported_chains("proposal names no chain this wallet serves"));
        }
        Ok((Namespaces::from([(CARDANO_NAMESPACE.to_string(), namespace)]), follow_up))
    }

    // ---- requests ----

    /// Answer one request on the relay. Bad requests get a JSON-RPC error
    /// response; only transport failures surface here.
    pub async fn handle_request(&self, request: &SessionRequest) -> Result<()> {
        let response = self.answer(request).await;
        if let Err(error) = &response.outcome {
            warn!(id = request.id, topic = %request.topic, method = %request.request.method, %error, "request refused");
        }
        self.relay.respond(&request.topic, response).await
    }

    /// Response for a request, without sending it.
    pub async fn answer(&self, request: &SessionRequest) -> RpcResponse {
        let id = request.id;
        let Ok(session) = self.store.session(&request.topic).await else {
            return RpcResponse::error(id, RpcError::invalid_event(&format!("unknown session topic {}", request.topic)));
        };
        let chain = self.chain().await;
        if request.chain_id != chain {
            return RpcResponse::error(
                id,
                RpcError::unsupported_chains(&format!("wallet is on {chain}, request targets {}", request.chain_id)),
            );
        }
        let account = match self.wallet.account(chain) {
            Ok(account) => account,
            Err(e) => return RpcResponse::error(id, RpcError::internal(&e.to_string())),
        };
        let granted = session.cardano();
        if !granted.map(|ns| ns.contains_account(&account)).unwrap_or(false) {
            return RpcResponse::error(id, RpcError::unsupported_accounts(&account.to_string()));
        }
        if !granted.map(|ns| ns.supports_method(&request.request.method)).unwrap_or(false) {
            return RpcResponse::error(id, RpcError::invalid_method(&request.request.method));
        }
        debug!(id, method = %request.request.method, "answering");
        match self.dispatch(&account, &request.request).await {
            Ok(result) => RpcResponse::result(id, result),
            Err(Error::Rpc(e)) => RpcResponse::error(id, e),
            Err(e) => RpcResponse::error(id, RpcError::internal(&e.to_string())),
        }
    }

    fn data_source(&self) -> Result<&Arc<dyn DataSource>> {
        self.data_source.as_ref().ok_or_else(|| Error::DataSource("wallet has no chain data source".into()))
    }

    async fn dispatch(&self, account: &Account, request: &RpcRequest) -> Result<Value> {
        let network = account.chain.network_id();
        let lookup = || UtxoRequest { address: account.stake_address.clone(), network };
        Ok(match request.method.as_str() {
            methods::GET_NETWORK_ID => json!(network.as_u8()),
            methods::GET_USED_ADDRESSES | methods::GET_UNUSED_ADDRESSES => json!([account.base_address]),
            methods::GET_CHANGE_ADDRESS => json!(account.base_address),
            methods::GET_REWARD_ADDRESS => json!(account.stake_address),
            methods::GET_REWARD_ADDRESSES => json!([account.stake_address]),
            methods::GET_COLLATERAL => json!([]),
            methods::SIGN_TX => {
                let tx = str_param(request, 0, "tx")?;
                let partial = request.params.get(1).and_then(Value::as_bool).unwrap_or(false);
                json!(self.wallet.sign_transaction(tx, partial).await?)
            }
            methods::SIGN_DATA => {
                let address = str_param(request, 0, "address")?;
                let payload = str_param(request, 1, "payload")?;
                serde_json::to_value(self.wallet.sign_data(address, payload).await?)?
            }
            methods::GET_BALANCE => json!(self.data_source()?.get_balance(lookup()).await?),
            methods::GET_UTXOS => json!(self.data_source()?.get_utxos(lookup()).await?),
            methods::SUBMIT_TX => {
                let tx = str_param(request, 0, "tx")?.to_string();
                json!(self.data_source()?.submit_tx(SubmitTxRequest { tx, network }).await?)
            }
            other => return Err(Error::Rpc(RpcError::invalid_method(other))),
        })
    }

    // ---- identity changes ----

    /// New account on the current chain.
    pub async fn change_account(&self, account: Account) -> Result<ChangeReport> {
        let current = self.chain().await;
        if account.chain != current {
            return self.change_chain(account).await;
        }
        self.store.persist_defaults(&current, Some(&account)).await?;
        self.propagator.propagate(&Change::Account(account)).await
    }

    /// Move to `account.chain` with `account` as the identity there.
    pub async fn change_chain(&self, account: Account) -> Result<ChangeReport> {
        let previous = {
            let mut chain = self.chain.write().await;
            std::mem::replace(&mut *chain, account.chain)
        };
        self.store.persist_defaults(&account.chain, Some(&account)).await?;
        if previous == account.chain {
            return self.propagator.propagate(&Change::Account(account)).await;
        }
        info!(from = %previous, to = %account.chain, "wallet chain switched");
        self.propagator.propagate(&Change::Chain { account, previous }).await
    }

    /// Switch chain using the wallet's own address pair there.
    pub async fn switch_chain(&self, chain: ChainId) -> Result<ChangeReport> {
        let account = self.wallet.account(chain)?;
        self.change_chain(account).await
    }

    // ---- event pump ----

    /// Serve proposals and requests until `shutdown` fires.
    pub async fn run(&self, shutdown: Shutdown) -> Result<()> {
        let inbound = self.relay.subscribe();
        let stop = shutdown.subscribe();
        self.pump(inbound, stop, &shutdown).await
    }

    /// Subscribe now, serve on a task. Nothing sent after this returns is missed.
    pub fn spawn(self: &Arc<Self>, shutdown: Shutdown) -> JoinHandle<Result<()>> {
        let inbound = self.relay.subscribe();
        let stop = shutdown.subscribe();
        let this = self.clone();
        tokio::spawn(async move { this.pump(inbound, stop, &shutdown).await })
    }

    async fn pump(
        &self,
        mut inbound: broadcast::Receiver<RelayEvent>,
        mut stop: broadcast::Receiver<()>,
        shutdown: &Shutdown,
    ) -> Result<()> {
        if shutdown.is_triggered().await {
            return Ok(());
        }
        let chain = self.chain().await;
        info!(%chain, "wallet connector running");
        loop {
            tokio::select! {
                _ = stop.recv() => break,
                event = inbound.recv() => match event {
                    Ok(RelayEvent::SessionProposal(proposal)) => {
                        if let Err(e) = self.handle_proposal(&proposal).await {
                            warn!(proposal = proposal.id, error = %e, "proposal handling failed");
                        }
                    }
                    Ok(RelayEvent::SessionRequest(request)) => {
                        if let Err(e) = self.handle_request(&request).await {
                            warn!(id = request.id, error = %e, "response not delivered");
                        }
                    }
                    Ok(RelayEvent::SessionDelete { topic }) => {
                        info!(%topic, "session deleted by dapp");
                        self.locks.forget(&topic);
                    }
                    Ok(RelayEvent::SessionPing { topic }) => debug!(%topic, "session_ping"),
                    Ok(other) => debug!(event = other.name(), "ignored"),
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "relay events lagged"),
                    Err(RecvError::Closed) => break,
                },
            }
        }
        info!("wallet connector stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chain::NetworkId;
    use crate::core::namespace::{build_optional, build_required};
    use crate::relay::{AppMetadata, MemoryHub};
    use crate::wallet::StaticWallet;

    fn connector(hub: &MemoryHub, chain: ChainId) -> WalletConnector {
        let wallet = StaticWallet::new()
            .with_addresses(NetworkId::Mainnet, "addr1xyz", "stake1abc")
            .with_addresses(NetworkId::Testnet, "addr_test1qp", "stake_test1uq");
        WalletConnector::new(Arc::new(hub.wallet()), Arc::new(wallet), chain)
    }

    fn proposal(required: &[ChainId], optional: &[ChainId]) -> Proposal {
        Proposal {
            id: 1,
            pairing_topic: "p".into(),
            required_namespaces: build_required(required, false),
            optional_namespaces: build_optional(optional),
            proposer: AppMetadata::default(),
        }
    }

    #[test]
    fn approval_grants_one_account_per_chain_and_the_current_chain() {
        let hub = MemoryHub::new();
        let wallet = connector(&hub, ChainId::PREVIEW);
        let (ns, follow_up) = wallet.approval(&proposal(&[ChainId::MAINNET], &ChainId::all()), ChainId::PREVIEW).unwrap();
        let cip34 = cardano(&ns).unwrap();
        assert_eq!(cip34.chains, vec![ChainId::MAINNET, ChainId::PREVIEW]);
        assert_eq!(cip34.accounts.len(), 2);
        assert_eq!(cip34.default_chain, Some(ChainId::PREVIEW));
        assert!(cip34.supports_method(methods::GET_BALANCE));
        assert_eq!(follow_up, Some(ChainId::MAINNET));
    }

    #[test]
    fn approval_refusals() {
        let hub = MemoryHub::new();
        let wallet = connector(&hub, ChainId::MAINNET);

        let mut foreign = proposal(&[ChainId::MAINNET], &ChainId::all());
        let eip155 = foreign.required_namespaces.values().next().cloned().unwrap();
        foreign.required_namespaces.insert("eip155".into(), eip155);
        assert_eq!(wallet.approval(&foreign, ChainId::MAINNET).unwrap_err().code, 5104);

        let not_optional = proposal(&[ChainId::PREPROD], &[ChainId::MAINNET]);
        assert_eq!(wallet.approval(&not_optional, ChainId::MAINNET).unwrap_err().code, 5100);

        let mainnet_only = WalletConnector::new(
            Arc::new(hub.wallet()),
            Arc::new(StaticWallet::new().with_addresses(NetworkId::Mainnet, "addr1xyz", "stake1abc")),
            ChainId::MAINNET,
        );
        let testnet = proposal(&[ChainId::PREVIEW], &ChainId::all());
        assert_eq!(mainnet_only.approval(&testnet, ChainId::MAINNET).unwrap_err().code, 5100);
    }

    #[test]
    fn unknown_topic_gets_invalid_event() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let hub = MemoryHub::new();
            let wallet = connector(&hub, ChainId::MAINNET);
            let request = SessionRequest {
                id: 9,
                topic: "gone".into(),
                chain_id: ChainId::MAINNET,
                request: RpcRequest::bare(methods::GET_USED_ADDRESSES),
            };
            let response = wallet.answer(&request).await;
            assert_eq!(response.outcome.unwrap_err().code, 1002);
        });
    }
}
