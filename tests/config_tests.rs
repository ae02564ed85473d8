//! ProviderConfig from the process environment

use cardano_wc::core::consts::relayers;
use cardano_wc::{ChainId, Error, ProviderConfig};
use once_cell::sync::Lazy;
use std::sync::Mutex;

static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

fn lock_env() -> std::sync::MutexGuard<'static, ()> { ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner()) }

const VARS: &[&str] = &["CARDANO_WC_PROJECT_ID", "CARDANO_WC_RELAY_URL", "CARDANO_WC_CHAINS", "CARDANO_WC_LEGACY_MODE"];

fn clear_env() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

/// Test: every variable lands in the config
#[test]
fn config_from_env() {
    let _guard = lock_env();
    clear_env();
    std::env::set_var("CARDANO_WC_PROJECT_ID", "abc123");
    std::env::set_var("CARDANO_WC_RELAY_URL", "eu");
    std::env::set_var("CARDANO_WC_CHAINS", "cip34:0-2, preprod");
    std::env::set_var("CARDANO_WC_LEGACY_MODE", "true");

    let config = ProviderConfig::from_env().unwrap();
    assert_eq!(config.project_id, "abc123");
    assert_eq!(config.relay_url, relayers::EU);
    assert_eq!(config.chains, vec![ChainId::PREVIEW, ChainId::PREPROD]);
    assert!(config.legacy_mode);
    assert!(config.validate().is_ok());

    clear_env();
}

/// Test: defaults apply when only the project id is given
#[test]
fn config_defaults() {
    let _guard = lock_env();
    clear_env();
    std::env::set_var("CARDANO_WC_PROJECT_ID", "abc123");

    let config = ProviderConfig::from_env().unwrap();
    assert_eq!(config.relay_url, relayers::DEFAULT);
    assert_eq!(config.chains, vec![ChainId::MAINNET]);
    assert!(!config.legacy_mode);

    std::env::set_var("CARDANO_WC_RELAY_URL", "wss://relay.example");
    assert_eq!(ProviderConfig::from_env().unwrap().relay_url, "wss://relay.example");

    clear_env();
}

/// Test: a missing project id or a bad chain list is a config error
#[test]
fn config_errors() {
    let _guard = lock_env();
    clear_env();
    assert!(matches!(ProviderConfig::from_env(), Err(Error::Config(_))));

    std::env::set_var("CARDANO_WC_PROJECT_ID", "abc123");
    std::env::set_var("CARDANO_WC_CHAINS", "cip34:7-1");
    assert!(ProviderConfig::from_env().is_err());

    clear_env();
}
