//! Connector facade - the entry point for dApp code
//!
//! ```text
//! CardanoProvider::init(config, relay)
//!     │
//!     ├── enable(mode)   → SessionReconciler::enable → EnabledApi
//!     ├── disconnect()   → SessionReconciler::disconnect
//!     ├── default_chain_id() / default_account()
//!     └── provider()     → the relay, for ping and other direct calls
//! ```
//!
//! Everything fails with [`Error::ProviderNotInitialized`] after [`CardanoProvider::close`].

mod config;
mod prompt;

pub use config::{parse_chains, ProviderConfig, RelayRegion, Timeouts};
pub use prompt::{ChannelPrompt, PairingPrompt, PromptHandle};

use crate::core::chain::{Account, ChainId};
use crate::emulator::{EnabledApi, Mode};
use crate::error::{Error, Result};
use crate::reconciler::{ReconcilerState, SessionReconciler};
use crate::relay::DappRelay;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

pub struct CardanoProvider {
    reconciler: RwLock<Option<Arc<SessionReconciler>>>,
    config: ProviderConfig,
}

impl CardanoProvider {
    pub fn init(config: ProviderConfig, relay: Arc<dyn DappRelay>) -> Result<Self> {
        config.validate()?;
        info!(
            dapp = %config.metadata.name,
            chains = config.chains.len(),
            relay = %config.relay_url,
            legacy = config.legacy_mode,
            "provider initialized"
        );
        let reconciler = SessionReconciler::new(relay, config.clone());
        Ok(Self { reconciler: RwLock::new(Some(Arc::new(reconciler))), config })
    }

    pub fn config(&self) -> &ProviderConfig { &self.config }

    async fn reconciler(&self) -> Result<Arc<SessionReconciler>> {
        self.reconciler
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::ProviderNotInitialized("provider was closed".into()))
    }

    /// Without an explicit mode: Direct when a data source is configured and
    /// legacy mode is off, Relay otherwise.
    fn default_mode(&self) -> Mode {
        match (&self.config.data_source, self.config.legacy_mode) {
            (Some(source), false) => Mode::Direct(source.clone()),
            _ => Mode::Relay,
        }
    }

    pub async fn enable(&self, mode: Option<Mode>) -> Result<EnabledApi> {
        let mode = mode.unwrap_or_else(|| self.default_mode());
        self.reconciler().await?.enable(mode).await
    }

    pub async fn disconnect(&self) -> Result<()> { self.reconciler().await?.disconnect().await }

    pub async fn default_chain_id(&self) -> Result<ChainId> { self.reconciler().await?.default_chain_id().await }

    pub async fn default_account(&self) -> Result<Account> { self.reconciler().await?.default_account().await }

    /// The emulator handed out by the last `enable`.
    pub async fn enabled_api(&self) -> Result<EnabledApi> {
        self.reconciler().await?.emulator().await.ok_or(Error::EnabledApiNotFound)
    }

    pub async fn provider(&self) -> Result<Arc<dyn DappRelay>> { Ok(self.reconciler().await?.relay().clone()) }

    pub async fn state(&self) -> Result<ReconcilerState> { Ok(self.reconciler().await?.state().await) }

    /// Local teardown. The session stays on the relay and can be resumed by a
    /// new provider over the same storage.
    pub async fn close(&self) {
        if let Some(reconciler) = self.reconciler.write().await.take() {
            if let Some(api) = reconciler.emulator().await {
                api.close();
            }
            info!("provider closed");
        }
    }
}
