//! cardano-wc: Cardano dApp/wallet sessions over a pairing relay.
//!
//! # Architecture
//!
//! ```text
//! CardanoProvider (dApp entry point)
//!   │
//!   ├── SessionReconciler
//!   │     ├── SessionStore ──► Relay storage (defaultChainId, defaultAccount)
//!   │     ├── Namespace builders (required / optional)
//!   │     └── inbound pump: session_event, session_delete, session_ping
//!   │
//!   └── EnabledApi (CIP-30 surface)
//!         ├── Mode::Relay  → JSON-RPC over the relay
//!         └── Mode::Direct → cached addresses + DataSource
//!
//! WalletConnector (wallet entry point)
//!   ├── proposals → approve / reject
//!   ├── requests  → Wallet capability → respond
//!   └── account / chain change → ChangePropagator (update namespace, then emit)
//! ```
//!
//! # Identifiers
//!
//! | Value   | Format                                  | Example                                    |
//! |---------|-----------------------------------------|--------------------------------------------|
//! | chain   | `cip34:{networkId}-{protocolMagic}`     | `cip34:1-764824073`                        |
//! | account | `{chain}:{stakeAddress}-{baseAddress}`  | `cip34:1-764824073:stake1abc-addr1xyz`     |
//!
//! # Features
//!
//! - `native` - file-backed relay storage, log subscriber, signal handling, CLI
//! - `http` - HTTP out-of-band data source for Direct mode
//!
//! # Usage
//!
//! ```ignore
//! use cardano_wc::{CardanoProvider, ProviderConfig, ChainId, MemoryHub, AppMetadata};
//! use std::sync::Arc;
//!
//! let hub = MemoryHub::new();
//! let relay = Arc::new(hub.dapp(AppMetadata::new("my dapp", "https://dapp.example"))?);
//! let provider = CardanoProvider::init(
//!     ProviderConfig::new("project-id").with_chains(vec![ChainId::MAINNET, ChainId::PREPROD]),
//!     relay,
//! )?;
//!
//! let api = provider.enable(None).await?;
//! let balance = api.get_balance().await?;
//! let _sub = api.on_account_change(|account| println!("now {account}"));
//! ```

pub mod core;
pub mod emulator;
pub mod error;
pub mod provider;
pub mod reconciler;
pub mod relay;
pub mod runtime;
pub mod session;
pub mod wallet;

#[cfg(feature = "native")]
pub mod logging;

pub use crate::core::{Account, ChainId, Namespace, Namespaces, NetworkId, RpcError, RpcRequest, RpcResponse};
pub use emulator::{DataSource, EnabledApi, MemoryDataSource, Mode, Subscription};
#[cfg(feature = "http")]
pub use emulator::HttpDataSource;
pub use error::{Error, Result};
pub use provider::{CardanoProvider, ChannelPrompt, PairingPrompt, PromptHandle, ProviderConfig, RelayRegion, Timeouts};
pub use reconciler::{ChangeReport, ReconcilerState, SessionReconciler};
pub use relay::{AppMetadata, DappRelay, KeyValueStorage, MemoryHub, MemoryStorage, Relay, WalletRelay};
#[cfg(feature = "native")]
pub use relay::FileStorage;
pub use runtime::Shutdown;
#[cfg(feature = "native")]
pub use runtime::install_signal_handlers;
pub use session::SessionStore;
pub use wallet::{StaticWallet, Wallet, WalletConnector};
