//! Out-of-band data source for Direct mode
//!
//! Some wallets only sign. Balance, UTXO and submission calls then go to a
//! chain indexer keyed by address and network instead of the relay.

use crate::core::chain::NetworkId;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paginate {
    pub page: u32,
    pub limit: u32,
}

/// Stake or base address on a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoRequest {
    pub address: String,
    pub network: NetworkId,
}

pub type BalanceRequest = UtxoRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitTxRequest {
    pub tx: String,
    pub network: NetworkId,
}

#[async_trait]
pub trait DataSource: Send + Sync {
    /// CBOR-hex transaction unspent outputs
    async fn get_utxos(&self, request: UtxoRequest) -> Result<Vec<String>>;

    /// CBOR-hex value
    async fn get_balance(&self, request: BalanceRequest) -> Result<String>;

    /// Transaction hash
    async fn submit_tx(&self, request: SubmitTxRequest) -> Result<String>;
}

/// Fixed answers per address; records submitted transactions.
#[derive(Debug, Default)]
pub struct MemoryDataSource {
    utxos: BTreeMap<(NetworkId, String), Vec<String>>,
    balances: BTreeMap<(NetworkId, String), String>,
    submitted: Mutex<Vec<SubmitTxRequest>>,
}

impl MemoryDataSource {
    pub fn new() -> Self { Self::default() }

    pub fn with_utxos(mut self, network: NetworkId, address: impl Into<String>, utxos: Vec<String>) -> Self {
        self.utxos.insert((network, address.into()), utxos);
        self
    }

    pub fn with_balance(mut self, network: NetworkId, address: impl Into<String>, balance: impl Into<String>) -> Self {
        self.balances.insert((network, address.into()), balance.into());
        self
    }

    pub fn submitted(&self) -> Vec<SubmitTxRequest> { self.submitted.lock().map(|s| s.clone()).unwrap_or_default() }
}

#[async_trait]
impl DataSource for MemoryDataSource {
    async fn get_utxos(&self, request: UtxoRequest) -> Result<Vec<String>> {
        Ok(self.utxos.get(&(request.network, request.address)).cloned().unwrap_or_default())
    }

    async fn get_balance(&self, request: BalanceRequest) -> Result<String> {
        // CBOR for coin 0
        Ok(self.balances.get(&(request.network, request.address)).cloned().unwrap_or_else(|| "00".to_string()))
    }

    async fn submit_tx(&self, request: SubmitTxRequest) -> Result<String> {
        if hex::decode(&request.tx).is_err() {
            return Err(Error::DataSource("transaction is not hex encoded".into()));
        }
        self.submitted.lock().map_err(|_| Error::DataSource("submission log poisoned".into()))?.push(request);
        Ok(hex::encode(rand::random::<[u8; 32]>()))
    }
}

#[cfg(feature = "http")]
pub use http::HttpDataSource;

#[cfg(feature = "http")]
mod http {
    use super::*;
    use std::time::Duration;

    const UTXO_BY_ADDRESS: &str = "/wallet/utxo/address";
    const BALANCE_BY_ADDRESS: &str = "/wallet/balance/address";
    const SUBMIT_TX: &str = "/wallet/submitTx";

    /// Indexer REST API with one base URL per network.
    #[derive(Debug, Clone)]
    pub struct HttpDataSource {
        urls: BTreeMap<NetworkId, String>,
        client: reqwest::Client,
    }

    impl HttpDataSource {
        pub fn new(urls: BTreeMap<NetworkId, String>) -> Result<Self> {
            Self::with_timeout(urls, Duration::from_secs(30))
        }

        pub fn with_timeout(urls: BTreeMap<NetworkId, String>, timeout: Duration) -> Result<Self> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| Error::DataSource(format!("http client: {e}")))?;
            Ok(Self { urls, client })
        }

        fn url(&self, network: NetworkId, path: &str) -> Result<String> {
            let base = self
                .urls
                .get(&network)
                .ok_or_else(|| Error::DataSource(format!("no endpoint for network {}", network.as_u8())))?;
            Ok(format!("{}{path}", base.trim_end_matches('/')))
        }

        async fn get_text(&self, network: NetworkId, path: &str, address: &str) -> Result<String> {
            let response = self
                .client
                .get(self.url(network, path)?)
                .query(&[("address", address)])
                .send()
                .await
                .map_err(|e| Error::DataSource(e.to_string()))?;
            if !response.status().is_success() {
                return Err(Error::DataSource(format!("unexpected status {}", response.status())));
            }
            response.text().await.map_err(|e| Error::DataSource(e.to_string()))
        }
    }

    #[async_trait]
    impl DataSource for HttpDataSource {
        async fn get_utxos(&self, request: UtxoRequest) -> Result<Vec<String>> {
            let body = self.get_text(request.network, UTXO_BY_ADDRESS, &request.address).await?;
            Ok(serde_json::from_str(&body)?)
        }

        async fn get_balance(&self, request: BalanceRequest) -> Result<String> {
            self.get_text(request.network, BALANCE_BY_ADDRESS, &request.address).await
        }

        async fn submit_tx(&self, request: SubmitTxRequest) -> Result<String> {
            let response = self
                .client
                .post(self.url(request.network, SUBMIT_TX)?)
                .json(&serde_json::json!({ "tx": request.tx }))
                .send()
                .await
                .map_err(|e| Error::DataSource(e.to_string()))?;
            if !response.status().is_success() {
                return Err(Error::DataSource(format!("unexpected status {}", response.status())));
            }
            response.text().await.map_err(|e| Error::DataSource(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_answers_per_network() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let source = MemoryDataSource::new()
                .with_balance(NetworkId::Testnet, "stake_test1uq", "1a000f4240")
                .with_utxos(NetworkId::Testnet, "stake_test1uq", vec!["82a0".into()]);
            let testnet = BalanceRequest { address: "stake_test1uq".into(), network: NetworkId::Testnet };
            assert_eq!(source.get_balance(testnet.clone()).await.unwrap(), "1a000f4240");
            assert_eq!(source.get_utxos(testnet).await.unwrap(), vec!["82a0".to_string()]);

            let mainnet = BalanceRequest { address: "stake_test1uq".into(), network: NetworkId::Mainnet };
            assert_eq!(source.get_balance(mainnet).await.unwrap(), "00");

            assert!(source.submit_tx(SubmitTxRequest { tx: "zz".into(), network: NetworkId::Testnet }).await.is_err());
            let hash = source.submit_tx(SubmitTxRequest { tx: "84a0".into(), network: NetworkId::Testnet }).await.unwrap();
            assert_eq!(hash.len(), 64);
            assert_eq!(source.submitted().len(), 1);
        });
    }
}
