//! Wallet API Emulator - the CIP-30 surface handed to dApp code
//!
//! One method per wallet capability. Dispatch depends on [`Mode`]:
//!
//! | call                                   | `Relay`         | `Direct`            |
//! |----------------------------------------|-----------------|---------------------|
//! | network id                             | local           | local               |
//! | used/unused/change/reward addresses    | wallet request  | cached on emulator  |
//! | balance, utxos                         | wallet request  | data source         |
//! | submitTx                               | wallet request  | data source         |
//! | collateral                             | wallet request  | always empty        |
//! | signTx, signData                       | wallet request  | wallet request      |
//!
//! State (`chain`, stake and base address) changes only through
//! [`EnabledApi::apply_account_change`] and [`EnabledApi::apply_chain_change`].

mod data_source;
mod events;

#[cfg(feature = "http")]
pub use data_source::HttpDataSource;
pub use data_source::{BalanceRequest, DataSource, MemoryDataSource, Paginate, SubmitTxRequest, UtxoRequest};
pub use events::{EventEmitter, Subscription};

use crate::core::chain::{Account, ChainId, NetworkId};
use crate::core::consts::methods;
use crate::core::rpc::RpcRequest;
use crate::error::{Error, Result};
use crate::provider::Timeouts;
use crate::reconciler::{deadline, Deadline};
use crate::relay::DappRelay;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Clone)]
pub enum Mode {
    Relay,
    /// Addresses from cache, chain reads and submission from the data source
    Direct(Arc<dyn DataSource>),
}

impl Mode {
    pub fn is_direct(&self) -> bool { matches!(self, Mode::Direct(_)) }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Relay => "relay",
            Mode::Direct(_) => "direct",
        }
    }
}

impl std::fmt::Debug for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiState {
    pub chain: ChainId,
    pub stake_address: Option<String>,
    pub base_address: Option<String>,
}

impl ApiState {
    pub fn account(&self) -> Option<Account> {
        match (&self.stake_address, &self.base_address) {
            (Some(stake), Some(base)) => Account::new(self.chain, stake.as_str(), base.as_str()).ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSignature {
    pub signature: String,
    pub key: String,
}

struct ApiInner {
    relay: Arc<dyn DappRelay>,
    topic: String,
    state: RwLock<ApiState>,
    mode: RwLock<Mode>,
    events: EventEmitter,
    timeouts: Timeouts,
}

/// Enabled wallet API bound to one session topic. Clones share state.
#[derive(Clone)]
pub struct EnabledApi {
    inner: Arc<ApiInner>,
}

impl std::fmt::Debug for EnabledApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnabledApi").field("topic", &self.inner.topic).finish()
    }
}

impl EnabledApi {
    pub fn new(relay: Arc<dyn DappRelay>, topic: impl Into<String>, state: ApiState, mode: Mode, timeouts: Timeouts) -> Self {
        Self {
            inner: Arc::new(ApiInner {
                relay,
                topic: topic.into(),
                state: RwLock::new(state),
                mode: RwLock::new(mode),
                events: EventEmitter::new(),
                timeouts,
            }),
        }
    }

    pub fn topic(&self) -> &str { &self.inner.topic }

    pub async fn state(&self) -> ApiState { self.inner.state.read().await.clone() }

    pub async fn chain(&self) -> ChainId { self.inner.state.read().await.chain }

    pub async fn account(&self) -> Option<Account> { self.inner.state.read().await.account() }

    pub async fn mode(&self) -> Mode { self.inner.mode.read().await.clone() }

    pub async fn set_mode(&self, mode: Mode) {
        info!(topic = %self.inner.topic, mode = mode.as_str(), "emulator mode");
        *self.inner.mode.write().await = mode;
    }

    pub fn events(&self) -> &EventEmitter { &self.inner.events }

    /// Same underlying emulator (shared state).
    pub fn same_as(&self, other: &EnabledApi) -> bool { Arc::ptr_eq(&self.inner, &other.inner) }

    // ---- state transitions ----

    /// Switch the active identity. A different chain is applied too.
    /// Returns false when nothing changed.
    pub async fn apply_account_change(&self, account: &Account) -> bool {
        let chain_changed = {
            let mut state = self.inner.state.write().await;
            let unchanged = state.chain == account.chain
                && state.stake_address.as_deref() == Some(account.stake_address.as_str())
                && state.base_address.as_deref() == Some(account.base_address.as_str());
            if unchanged {
                return false;
            }
            let chain_changed = state.chain != account.chain;
            state.chain = account.chain;
            state.stake_address = Some(account.stake_address.clone());
            state.base_address = Some(account.base_address.clone());
            chain_changed
        };
        debug!(topic = %self.inner.topic, %account, "account applied");
        if chain_changed {
            self.inner.events.emit_network_change(&account.chain);
        }
        self.inner.events.emit_account_change(account);
        true
    }

    /// Returns false when already on `chain`.
    pub async fn apply_chain_change(&self, chain: ChainId) -> bool {
        {
            let mut state = self.inner.state.write().await;
            if state.chain == chain {
                return false;
            }
            state.chain = chain;
        }
        debug!(topic = %self.inner.topic, %chain, "chain applied");
        self.inner.events.emit_network_change(&chain);
        true
    }

    /// Drop every listener and refuse new ones.
    pub fn close(&self) { self.inner.events.close() }

    pub fn on_account_change(&self, callback: impl Fn(&Account) + Send + Sync + 'static) -> Subscription {
        self.inner.events.on_account_change(callback)
    }

    pub fn on_network_change(&self, callback: impl Fn(&ChainId) + Send + Sync + 'static) -> Subscription {
        self.inner.events.on_network_change(callback)
    }

    // ---- dispatch helpers ----

    async fn bounded<T>(&self, operation: &str, after: Duration, call: impl Future<Output = Result<T>>) -> Result<T> {
        match deadline(after, call).await {
            Deadline::Done(outcome) => outcome,
            Deadline::TimedOut => Err(Error::timeout(operation, after)),
        }
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let chain = self.chain().await;
        let call = self.inner.relay.request(&self.inner.topic, &chain, RpcRequest::new(method, params));
        let value = self.bounded(method, self.inner.timeouts.request, call).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn stake_address(&self) -> Result<String> {
        self.inner.state.read().await.stake_address.clone().ok_or(Error::AccountNotSet)
    }

    async fn base_address(&self) -> Result<String> {
        self.inner.state.read().await.base_address.clone().ok_or(Error::AccountNotSet)
    }

    async fn data_request(&self) -> Result<UtxoRequest> {
        let state = self.inner.state.read().await;
        let address = state.stake_address.clone().ok_or(Error::AccountNotSet)?;
        Ok(UtxoRequest { address, network: state.chain.network_id() })
    }

    // ---- CIP-30 surface ----

    pub async fn get_network_id(&self) -> NetworkId { self.chain().await.network_id() }

    pub async fn get_utxos(&self, amount: Option<String>, paginate: Option<Paginate>) -> Result<Option<Vec<String>>> {
        match self.mode().await {
            Mode::Relay => self.request(methods::GET_UTXOS, vec![json!(amount), json!(paginate)]).await,
            Mode::Direct(source) => {
                let request = self.data_request().await?;
                let utxos = self.bounded("getUtxos", self.inner.timeouts.request, source.get_utxos(request)).await?;
                Ok(Some(utxos))
            }
        }
    }

    pub async fn get_balance(&self) -> Result<String> {
        match self.mode().await {
            Mode::Relay => self.request(methods::GET_BALANCE, Vec::new()).await,
            Mode::Direct(source) => {
                let request = self.data_request().await?;
                self.bounded("getBalance", self.inner.timeouts.request, source.get_balance(request)).await
            }
        }
    }

    pub async fn get_used_addresses(&self, paginate: Option<Paginate>) -> Result<Vec<String>> {
        match self.mode().await {
            Mode::Relay => self.request(methods::GET_USED_ADDRESSES, vec![json!(paginate)]).await,
            Mode::Direct(_) => Ok(vec![self.base_address().await?]),
        }
    }

    pub async fn get_unused_addresses(&self, paginate: Option<Paginate>) -> Result<Vec<String>> {
        match self.mode().await {
            Mode::Relay => self.request(methods::GET_UNUSED_ADDRESSES, vec![json!(paginate)]).await,
            Mode::Direct(_) => Ok(vec![self.base_address().await?]),
        }
    }

    pub async fn get_change_address(&self) -> Result<String> {
        match self.mode().await {
            Mode::Relay => self.request(methods::GET_CHANGE_ADDRESS, Vec::new()).await,
            Mode::Direct(_) => self.base_address().await,
        }
    }

    pub async fn get_reward_address(&self) -> Result<String> {
        match self.mode().await {
            Mode::Relay => self.request(methods::GET_REWARD_ADDRESS, Vec::new()).await,
            Mode::Direct(_) => self.stake_address().await,
        }
    }

    pub async fn get_reward_addresses(&self) -> Result<Vec<String>> {
        match self.mode().await {
            Mode::Relay => self.request(methods::GET_REWARD_ADDRESSES, Vec::new()).await,
            Mode::Direct(_) => Ok(vec![self.stake_address().await?]),
        }
    }

    /// Witness set CBOR. Always answered by the wallet.
    pub async fn sign_tx(&self, tx: &str, partial_sign: bool) -> Result<String> {
        self.request(methods::SIGN_TX, vec![json!(tx), json!(partial_sign)]).await
    }

    pub async fn sign_data(&self, address: &str, payload: &str) -> Result<DataSignature> {
        self.request(methods::SIGN_DATA, vec![json!(address), json!(payload)]).await
    }

    pub async fn submit_tx(&self, tx: &str) -> Result<String> {
        match self.mode().await {
            Mode::Relay => self.request(methods::SUBMIT_TX, vec![json!(tx)]).await,
            Mode::Direct(source) => {
                let network = self.get_network_id().await;
                let request = SubmitTxRequest { tx: tx.to_string(), network };
                self.bounded("submitTx", self.inner.timeouts.request, source.submit_tx(request)).await
            }
        }
    }

    pub async fn get_collateral(&self) -> Result<Vec<String>> {
        match self.mode().await {
            Mode::Relay => self.request(methods::GET_COLLATERAL, Vec::new()).await,
            Mode::Direct(_) => Ok(Vec::new()),
        }
    }

    /// Ask the wallet for its used addresses and cache the first one as the
    /// base address. A timeout leaves the cache untouched.
    pub async fn discover_used_addresses(&self) -> Deadline<Result<Vec<String>>> {
        let chain = self.chain().await;
        let call = self.inner.relay.request(&self.inner.topic, &chain, RpcRequest::bare(methods::GET_USED_ADDRESSES));
        let outcome = deadline(self.inner.timeouts.address_discovery, async {
            let addresses: Vec<String> = serde_json::from_value(call.await?)?;
            Ok(addresses)
        })
        .await;
        if let Deadline::Done(Ok(addresses)) = &outcome {
            if let Some(first) = addresses.first() {
                self.inner.state.write().await.base_address = Some(first.clone());
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{AppMetadata, MemoryHub};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn direct_api(source: Arc<dyn DataSource>) -> EnabledApi {
        let hub = MemoryHub::new();
        let relay: Arc<dyn DappRelay> = Arc::new(hub.dapp(AppMetadata::default()).unwrap());
        let state = ApiState {
            chain: ChainId::PREVIEW,
            stake_address: Some("stake_test1uq".into()),
            base_address: Some("addr_test1qp".into()),
        };
        EnabledApi::new(relay, "no-session", state, Mode::Direct(source), Timeouts::default())
    }

    #[test]
    fn direct_mode_answers_locally() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let source = Arc::new(MemoryDataSource::new().with_balance(NetworkId::Testnet, "stake_test1uq", "1a000f4240"));
            let api = direct_api(source.clone());
            assert_eq!(api.get_collateral().await.unwrap(), Vec::<String>::new());
            assert_eq!(api.get_used_addresses(None).await.unwrap(), vec!["addr_test1qp".to_string()]);
            assert_eq!(api.get_change_address().await.unwrap(), "addr_test1qp");
            assert_eq!(api.get_reward_addresses().await.unwrap(), vec!["stake_test1uq".to_string()]);
            assert_eq!(api.get_balance().await.unwrap(), "1a000f4240");
            assert_eq!(api.get_network_id().await, NetworkId::Testnet);
            api.submit_tx("84a0").await.unwrap();
            assert_eq!(source.submitted()[0].network, NetworkId::Testnet);
            // signing always needs the wallet; this emulator has no session
            assert!(api.sign_tx("84a0", false).await.is_err());
        });
    }

    #[test]
    fn account_change_mutates_in_place_and_notifies() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let api = direct_api(Arc::new(MemoryDataSource::new()));
            let accounts = Arc::new(AtomicUsize::new(0));
            let networks = Arc::new(AtomicUsize::new(0));
            let a = api.on_account_change({
                let accounts = accounts.clone();
                move |_| {
                    accounts.fetch_add(1, Ordering::SeqCst);
                }
            });
            let n = api.on_network_change({
                let networks = networks.clone();
                move |_| {
                    networks.fetch_add(1, Ordering::SeqCst);
                }
            });

            let next = Account::new(ChainId::MAINNET, "stake1abc", "addr1xyz").unwrap();
            let alias = api.clone();
            assert!(api.apply_account_change(&next).await);
            assert!(!api.apply_account_change(&next).await);
            assert_eq!(alias.account().await, Some(next));
            assert_eq!(alias.get_network_id().await, NetworkId::Mainnet);
            assert_eq!(accounts.load(Ordering::SeqCst), 1);
            assert_eq!(networks.load(Ordering::SeqCst), 1);

            assert!(api.apply_chain_change(ChainId::PREPROD).await);
            assert!(!api.apply_chain_change(ChainId::PREPROD).await);
            assert_eq!(networks.load(Ordering::SeqCst), 2);

            a.dispose();
            n.dispose();
            assert_eq!(api.events().listener_count(), 0);
        });
    }

    #[test]
    fn missing_account_is_reported() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let api = direct_api(Arc::new(MemoryDataSource::new()));
            api.inner.state.write().await.base_address = None;
            assert!(matches!(api.get_change_address().await, Err(Error::AccountNotSet)));
        });
    }
}
