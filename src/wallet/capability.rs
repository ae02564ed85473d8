//! Wallet capability: the signer and address source behind the connector
//!
//! Key derivation and real signing live outside this crate. [`StaticWallet`]
//! holds one address pair per network; the active pair follows the chain.

use crate::core::chain::{Account, ChainId, NetworkId};
use crate::emulator::DataSignature;
use crate::error::{Error, Result};
use async_trait::async_trait;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[async_trait]
pub trait Wallet: Send + Sync {
    /// Witness set CBOR hex for `tx_cbor`.
    async fn sign_transaction(&self, tx_cbor: &str, partial_sign: bool) -> Result<String>;

    fn base_address(&self, network: NetworkId) -> Result<String>;

    fn reward_address(&self, network: NetworkId) -> Result<String>;

    async fn sign_data(&self, address: &str, _payload: &str) -> Result<DataSignature> {
        Err(Error::Wallet(format!("signData is not supported for {address}")))
    }

    /// Identity on `chain`.
    fn account(&self, chain: ChainId) -> Result<Account> {
        let network = chain.network_id();
        Account::new(chain, self.reward_address(network)?, self.base_address(network)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPair {
    pub base: String,
    pub reward: String,
}

/// Fixed address table with a placeholder signer that records what it signed.
#[derive(Debug, Default)]
pub struct StaticWallet {
    addresses: BTreeMap<NetworkId, AddressPair>,
    signed: Mutex<Vec<String>>,
}

impl StaticWallet {
    pub fn new() -> Self { Self::default() }

    pub fn with_addresses(mut self, network: NetworkId, base: impl Into<String>, reward: impl Into<String>) -> Self {
        self.addresses.insert(network, AddressPair { base: base.into(), reward: reward.into() });
        self
    }

    pub fn networks(&self) -> Vec<NetworkId> { self.addresses.keys().copied().collect() }

    pub fn signed(&self) -> Vec<String> { self.signed.lock().map(|s| s.clone()).unwrap_or_default() }

    fn pair(&self, network: NetworkId) -> Result<&AddressPair> {
        self.addresses
            .get(&network)
            .ok_or_else(|| Error::Wallet(format!("no addresses for network {}", network.as_u8())))
    }

    fn owns(&self, address: &str) -> bool { self.addresses.values().any(|p| p.base == address || p.reward == address) }
}

fn random_hex<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill(&mut bytes[..]);
    hex::encode(bytes)
}

#[async_trait]
impl Wallet for StaticWallet {
    async fn sign_transaction(&self, tx_cbor: &str, _partial_sign: bool) -> Result<String> {
        hex::decode(tx_cbor).map_err(|e| Error::Wallet(format!("transaction is not hex: {e}")))?;
        self.signed
            .lock()
            .map_err(|_| Error::Wallet("signer lock poisoned".into()))?
            .push(tx_cbor.to_string());
        // {0: [[vkey, signature]]}
        Ok(format!("a10081825820{}5840{}", random_hex::<32>(), random_hex::<64>()))
    }

    fn base_address(&self, network: NetworkId) -> Result<String> { Ok(self.pair(network)?.base.clone()) }

    fn reward_address(&self, network: NetworkId) -> Result<String> { Ok(self.pair(network)?.reward.clone()) }

    async fn sign_data(&self, address: &str, payload: &str) -> Result<DataSignature> {
        if !self.owns(address) {
            return Err(Error::Wallet(format!("address {address} is not owned by this wallet")));
        }
        hex::decode(payload).map_err(|e| Error::Wallet(format!("payload is not hex: {e}")))?;
        Ok(DataSignature { signature: random_hex::<64>(), key: random_hex::<32>() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet() -> StaticWallet {
        StaticWallet::new()
            .with_addresses(NetworkId::Mainnet, "addr1xyz", "stake1abc")
            .with_addresses(NetworkId::Testnet, "addr_test1qp", "stake_test1uq")
    }

    #[test]
    fn active_pair_follows_chain() {
        let w = wallet();
        assert_eq!(w.account(ChainId::MAINNET).unwrap().to_string(), "cip34:1-764824073:stake1abc-addr1xyz");
        assert_eq!(w.account(ChainId::PREVIEW).unwrap().base_address, "addr_test1qp");
        assert!(StaticWallet::new().account(ChainId::MAINNET).is_err());
    }

    #[test]
    fn signer_checks_input() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let w = wallet();
            assert!(w.sign_transaction("84a0", false).await.unwrap().starts_with("a100"));
            assert!(w.sign_transaction("zz", false).await.is_err());
            assert_eq!(w.signed(), vec!["84a0".to_string()]);
            assert!(w.sign_data("addr1xyz", "48656c6c6f").await.is_ok());
            assert!(w.sign_data("addr1other", "00").await.is_err());
        });
    }
}
