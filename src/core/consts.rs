//! Wire constants: session methods, events, relay events and storage keys
//!
//! Centralized registry so every module names the wire the same way.

/// Session JSON-RPC methods
pub mod methods {
    pub const SIGN_TX: &str = "cardano_signTx";
    pub const SIGN_DATA: &str = "cardano_signData";
    pub const SUBMIT_TX: &str = "cardano_submitTx";
    pub const GET_USED_ADDRESSES: &str = "cardano_getUsedAddresses";
    pub const GET_UNUSED_ADDRESSES: &str = "cardano_getUnusedAddresses";
    pub const GET_CHANGE_ADDRESS: &str = "cardano_getChangeAddress";
    pub const GET_REWARD_ADDRESS: &str = "cardano_getRewardAddress";
    pub const GET_REWARD_ADDRESSES: &str = "cardano_getRewardAddresses";
    pub const GET_BALANCE: &str = "cardano_getBalance";
    pub const GET_UTXOS: &str = "cardano_getUtxos";
    pub const GET_NETWORK_ID: &str = "cardano_getNetworkId";
    pub const GET_COLLATERAL: &str = "cardano_getCollateral";

    /// Minimum set a wallet must grant for a session to exist
    pub const REQUIRED: &[&str] = &[SIGN_TX, SIGN_DATA, GET_USED_ADDRESSES];

    pub const ALL: &[&str] = &[
        SIGN_TX,
        SIGN_DATA,
        SUBMIT_TX,
        GET_USED_ADDRESSES,
        GET_UNUSED_ADDRESSES,
        GET_CHANGE_ADDRESS,
        GET_REWARD_ADDRESS,
        GET_REWARD_ADDRESSES,
        GET_BALANCE,
        GET_UTXOS,
        GET_NETWORK_ID,
        GET_COLLATERAL,
    ];
}

/// Session events
pub mod events {
    pub const CHAIN_CHANGED: &str = "chainChanged";
    pub const ACCOUNTS_CHANGED: &str = "accountsChanged";

    /// Names used by earlier wallets; accepted inbound, never emitted
    pub const LEGACY_NETWORK_CHANGE: &str = "cardano_onNetworkChange";
    pub const LEGACY_ACCOUNT_CHANGE: &str = "cardano_onAccountChange";

    pub const ALL: &[&str] = &[CHAIN_CHANGED, ACCOUNTS_CHANGED];
}

/// Relay channel event names
pub mod relay {
    pub const DISPLAY_URI: &str = "display_uri";
    pub const SESSION_PROPOSAL: &str = "session_proposal";
    pub const SESSION_REQUEST: &str = "session_request";
    pub const SESSION_EVENT: &str = "session_event";
    pub const SESSION_UPDATE: &str = "session_update";
    pub const SESSION_DELETE: &str = "session_delete";
    pub const SESSION_PING: &str = "session_ping";
}

/// Persisted keys, namespaced under the relay's durable storage
pub mod storage {
    pub const PREFIX: &str = "wc@2:cardano_provider:";
    pub const CHAIN_ID_KEY: &str = "defaultChainId";
    pub const ACCOUNT_KEY: &str = "defaultAccount";

    pub fn key(name: &str) -> String { format!("{PREFIX}/{name}") }
}

/// Regional relay endpoints
pub mod relayers {
    pub const DEFAULT: &str = "wss://relay.walletconnect.org";
    pub const US: &str = "wss://us-east-1.relay.walletconnect.com/";
    pub const EU: &str = "wss://eu-central-1.relay.walletconnect.com/";
    pub const APAC: &str = "wss://ap-southeast-1.relay.walletconnect.com/";
}

pub const RPC_ENDPOINT: &str = "https://rpc.walletconnect.com/v1";
