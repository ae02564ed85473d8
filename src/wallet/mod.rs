//! Wallet side of the session
//!
//! ```text
//! WalletConnector
//!     │
//!     ├── session_proposal → approve (one account per chain) | reject (JSON-RPC error)
//!     ├── session_request  → Wallet capability / DataSource → respond
//!     └── change_account / change_chain → ChangePropagator (update, then emit)
//! ```

mod capability;
mod connector;

pub use capability::{AddressPair, StaticWallet, Wallet};
pub use connector::WalletConnector;
