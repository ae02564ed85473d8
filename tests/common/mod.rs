//! Shared harness: one in-process hub, a wallet connector serving it, dApp endpoints.

#![allow(dead_code)]

use cardano_wc::core::namespace::{build_optional, build_required};
use cardano_wc::relay::ConnectParams;
use cardano_wc::{
    AppMetadata, ChainId, DappRelay, MemoryHub, NetworkId, ProviderConfig, Shutdown, StaticWallet, Timeouts,
    WalletConnector,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const MAINNET_STAKE: &str = "stake1abc";
pub const MAINNET_BASE: &str = "addr1xyz";
pub const TESTNET_STAKE: &str = "stake_test1uq";
pub const TESTNET_BASE: &str = "addr_test1qp";

pub fn static_wallet() -> StaticWallet {
    StaticWallet::new()
        .with_addresses(NetworkId::Mainnet, MAINNET_BASE, MAINNET_STAKE)
        .with_addresses(NetworkId::Testnet, TESTNET_BASE, TESTNET_STAKE)
}

pub fn timeouts() -> Timeouts {
    Timeouts {
        namespace_update: Duration::from_millis(200),
        address_discovery: Duration::from_secs(1),
        request: Duration::from_secs(2),
        approval: Duration::from_secs(5),
    }
}

pub fn config(chains: Vec<ChainId>) -> ProviderConfig {
    ProviderConfig::new("test-project")
        .with_chains(chains)
        .with_metadata(AppMetadata::new("test dapp", "https://dapp.invalid"))
        .with_timeouts(timeouts())
}

pub fn dapp(hub: &MemoryHub, name: &str) -> Arc<dyn DappRelay> {
    Arc::new(hub.dapp(AppMetadata::new(name, "https://dapp.invalid")).expect("dapp endpoint"))
}

/// Raw proposal, for sessions whose optional grant is wider than the required one.
pub fn proposal(required: &[ChainId], optional: &[ChainId]) -> ConnectParams {
    ConnectParams {
        namespaces: build_required(required, false),
        optional_namespaces: build_optional(optional),
        pairing_topic: None,
    }
}

pub struct WalletSide {
    pub connector: Arc<WalletConnector>,
    shutdown: Shutdown,
    serving: JoinHandle<cardano_wc::Result<()>>,
}

impl WalletSide {
    pub async fn stop(self) {
        self.shutdown.trigger().await;
        self.serving.await.expect("wallet task").expect("wallet pump");
    }
}

/// Must be called inside a runtime.
pub fn wallet_side(hub: &MemoryHub, chain: ChainId) -> WalletSide {
    serve(WalletConnector::new(Arc::new(hub.wallet()), Arc::new(static_wallet()), chain))
}

pub fn serve(connector: WalletConnector) -> WalletSide {
    let connector = Arc::new(connector);
    let shutdown = Shutdown::new();
    let serving = connector.spawn(shutdown.clone());
    WalletSide { connector, shutdown, serving }
}

/// Polls `check` for up to two seconds.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
