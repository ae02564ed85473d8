//! File-backed relay storage under CARDANO_WC_ROOT
//!
//! Tests that touch the environment serialize on ENV_LOCK.

#![cfg(feature = "native")]

mod common;

use cardano_wc::core::consts::storage;
use cardano_wc::{
    AppMetadata, CardanoProvider, ChainId, DappRelay, FileStorage, KeyValueStorage, MemoryHub, SessionStore,
};
use common::*;
use once_cell::sync::Lazy;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

fn lock_env() -> std::sync::MutexGuard<'static, ()> { ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner()) }

/// Test: storage lands under the configured root and survives a reopen
#[test]
fn file_storage_under_root() {
    let _guard = lock_env();
    let dir = TempDir::new().expect("tempdir");
    std::env::set_var("CARDANO_WC_ROOT", dir.path());

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let store = FileStorage::open("shop").unwrap();
        assert_eq!(store.path(), dir.path().join("shop").join("data").join("storage.json"));
        assert!(store.keys().await.unwrap().is_empty());

        store.set_item("answer", json!(42)).await.unwrap();
        store.set_item("gone", json!("soon")).await.unwrap();
        store.remove_item("gone").await.unwrap();
        assert!(store.path().exists());

        let reopened = FileStorage::open("shop").unwrap();
        assert_eq!(reopened.get_item("answer").await.unwrap(), Some(json!(42)));
        assert_eq!(reopened.get_item("gone").await.unwrap(), None);
    });

    std::env::remove_var("CARDANO_WC_ROOT");
}

/// Test: corrupt storage is reported instead of silently discarded
#[test]
fn corrupt_file_is_an_error() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("storage.json");
    std::fs::write(&path, "{not json").unwrap();
    assert!(matches!(FileStorage::open_at(&path), Err(cardano_wc::Error::Storage(_))));
}

/// Test: defaults written by a provider are readable after a restart and cleared on disconnect
#[test]
fn provider_defaults_persist_to_disk() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("dapp").join("storage.json");

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let hub = MemoryHub::new();
        let wallet = wallet_side(&hub, ChainId::PREPROD);
        let disk = Arc::new(FileStorage::open_at(&path).unwrap());
        let relay: Arc<dyn DappRelay> =
            Arc::new(hub.dapp_with_storage(AppMetadata::new("disk dapp", "https://dapp.invalid"), disk).unwrap());

        let provider = CardanoProvider::init(config(vec![ChainId::PREPROD]), relay.clone()).unwrap();
        let api = provider.enable(None).await.unwrap();
        let account = api.account().await.unwrap();

        let restarted = FileStorage::open_at(&path).unwrap();
        assert_eq!(
            restarted.get_item(&storage::key(storage::CHAIN_ID_KEY)).await.unwrap(),
            Some(json!(ChainId::PREPROD.to_string()))
        );
        let store = SessionStore::new(relay.clone());
        assert_eq!(store.default_account().await.unwrap(), Some(account));
        assert_eq!(store.default_chain().await.unwrap(), Some(ChainId::PREPROD));

        provider.disconnect().await.unwrap();
        let after = FileStorage::open_at(&path).unwrap();
        assert!(after.keys().await.unwrap().is_empty());

        wallet.stop().await;
    });
}
