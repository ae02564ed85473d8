//! Session Store - read view over relay sessions plus persisted defaults
//!
//! Sessions and pairings are owned by the relay; this is a query layer over
//! them. The only state written here is the small key/value record under
//! [`consts::storage::PREFIX`](crate::core::consts::storage::PREFIX):
//!
//! | key              | value                  |
//! |------------------|------------------------|
//! | `defaultChainId` | `cip34:1-764824073`    |
//! | `defaultAccount` | `{chain}:{stake}-{base}` |
//!
//! Values may come from an older snapshot (a previous account, a chain the
//! current session no longer grants). Undecodable values read as absent.

use crate::core::chain::{Account, ChainId};
use crate::core::consts::storage;
use crate::error::{Error, Result};
use crate::relay::{KeyValueStorage, Pairing, Relay, Session};
use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

pub struct SessionStore<R: Relay + ?Sized> {
    relay: Arc<R>,
}

impl<R: Relay + ?Sized> Clone for SessionStore<R> {
    fn clone(&self) -> Self { Self { relay: self.relay.clone() } }
}

impl<R: Relay + ?Sized> SessionStore<R> {
    pub fn new(relay: Arc<R>) -> Self { Self { relay } }

    pub fn relay(&self) -> &Arc<R> { &self.relay }

    fn storage(&self) -> Arc<dyn KeyValueStorage> { self.relay.storage() }

    /// Live read-through, keyed by topic.
    pub async fn sessions(&self) -> Result<BTreeMap<String, Session>> {
        Ok(self.relay.sessions().await?.into_iter().map(|s| (s.topic.clone(), s)).collect())
    }

    pub async fn session(&self, topic: &str) -> Result<Session> {
        self.relay
            .sessions()
            .await?
            .into_iter()
            .find(|s| s.topic == topic)
            .ok_or_else(|| Error::SessionNotFound(topic.to_string()))
    }

    pub async fn first_session(&self) -> Result<Option<Session>> {
        Ok(self.relay.sessions().await?.into_iter().next())
    }

    pub async fn pairings(&self) -> Result<Vec<Pairing>> { self.relay.pairings(false).await }

    pub async fn pairing(&self, topic: &str) -> Result<Pairing> {
        self.relay
            .pairings(false)
            .await?
            .into_iter()
            .find(|p| p.topic == topic)
            .ok_or_else(|| Error::PairingNotFound(topic.to_string()))
    }

    /// False when the pairing is gone or inactive.
    pub async fn pairing_alive(&self, topic: &str) -> Result<bool> {
        Ok(self.relay.pairings(true).await?.iter().any(|p| p.topic == topic))
    }

    pub async fn session_expiry(&self, topic: &str) -> Result<DateTime<Utc>> {
        let session = self.session(topic).await?;
        Utc.timestamp_opt(session.expiry, 0)
            .single()
            .ok_or_else(|| Error::Transport(format!("session {topic} has an invalid expiry {}", session.expiry)))
    }

    pub async fn persist<T: Serialize + Sync>(&self, name: &str, value: &T) -> Result<()> {
        self.storage().set_item(&storage::key(name), serde_json::to_value(value)?).await
    }

    pub async fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let Some(raw) = self.storage().get_item(&storage::key(name)).await? else {
            return Ok(None);
        };
        match serde_json::from_value(raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key = name, error = %e, "ignoring stale persisted value");
                Ok(None)
            }
        }
    }

    pub async fn remove(&self, name: &str) -> Result<()> { self.storage().remove_item(&storage::key(name)).await }

    pub async fn default_chain(&self) -> Result<Option<ChainId>> { self.read(storage::CHAIN_ID_KEY).await }

    pub async fn default_account(&self) -> Result<Option<Account>> { self.read(storage::ACCOUNT_KEY).await }

    pub async fn persist_defaults(&self, chain: &ChainId, account: Option<&Account>) -> Result<()> {
        self.persist(storage::CHAIN_ID_KEY, chain).await?;
        if let Some(account) = account {
            self.persist(storage::ACCOUNT_KEY, account).await?;
        }
        Ok(())
    }

    pub async fn clear_defaults(&self) -> Result<()> {
        self.remove(storage::CHAIN_ID_KEY).await?;
        self.remove(storage::ACCOUNT_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{AppMetadata, MemoryHub};
    use serde_json::json;

    #[test]
    fn persisted_defaults_round_trip_and_tolerate_garbage() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let hub = MemoryHub::new();
            let store = SessionStore::new(Arc::new(hub.dapp(AppMetadata::default()).unwrap()));
            assert_eq!(store.default_chain().await.unwrap(), None);

            let account = Account::new(ChainId::PREVIEW, "stake_test1uq", "addr_test1qp").unwrap();
            store.persist_defaults(&ChainId::PREVIEW, Some(&account)).await.unwrap();
            assert_eq!(store.default_chain().await.unwrap(), Some(ChainId::PREVIEW));
            assert_eq!(store.default_account().await.unwrap(), Some(account));

            let raw = store.relay().storage();
            assert!(raw.get_item("wc@2:cardano_provider:/defaultAccount").await.unwrap().is_some());
            raw.set_item(&storage::key(storage::ACCOUNT_KEY), json!("not-an-account")).await.unwrap();
            assert_eq!(store.default_account().await.unwrap(), None);

            store.clear_defaults().await.unwrap();
            assert!(raw.keys().await.unwrap().is_empty());
        });
    }

    #[test]
    fn missing_records_are_typed_errors() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let hub = MemoryHub::new();
            let store = SessionStore::new(Arc::new(hub.wallet()));
            assert!(matches!(store.session("nope").await, Err(Error::SessionNotFound(_))));
            assert!(matches!(store.pairing("nope").await, Err(Error::PairingNotFound(_))));
            assert!(!store.pairing_alive("nope").await.unwrap());
        });
    }
}
