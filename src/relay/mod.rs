//! Relay Channel - the pairing/relay transport, seen from either end
//!
//! The transport and its cryptography stay outside this crate. What the
//! connector needs is an opaque channel keyed by topic:
//!
//! - [`Relay`]: what both ends share (event bus, durable storage, records, ping)
//! - [`DappRelay`]: proposing sessions and sending requests to the wallet
//! - [`WalletRelay`]: answering proposals and requests, mutating live namespaces
//!
//! [`memory::MemoryHub`] is a complete loopback implementation of both ends.

pub mod memory;
pub mod storage;
pub mod types;

pub use memory::MemoryHub;
pub use storage::{KeyValueStorage, MemoryStorage};
#[cfg(feature = "native")]
pub use storage::FileStorage;
pub use types::{AppMetadata, ConnectParams, Pairing, Proposal, RelayEvent, Session, SessionEventPayload, SessionRequest};

use crate::core::chain::ChainId;
use crate::core::namespace::Namespaces;
use crate::core::rpc::{RpcError, RpcRequest, RpcResponse};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

#[async_trait]
pub trait Relay: Send + Sync {
    /// Inbound events for this end. Each receiver sees events sent after it subscribed.
    fn subscribe(&self) -> broadcast::Receiver<RelayEvent>;

    fn storage(&self) -> Arc<dyn KeyValueStorage>;

    async fn sessions(&self) -> Result<Vec<Session>>;

    async fn pairings(&self, active_only: bool) -> Result<Vec<Pairing>>;

    async fn ping(&self, topic: &str) -> Result<()>;
}

#[async_trait]
pub trait DappRelay: Relay {
    /// Propose a session and wait for the wallet. A `display_uri` event
    /// carrying the pairing URI is published before waiting.
    async fn connect(&self, params: ConnectParams) -> Result<Session>;

    /// Drop the outstanding proposal and its pairing record.
    async fn abort_pairing_attempt(&self) -> Result<()>;

    /// Remove pairings that never produced a session.
    async fn cleanup_pending_pairings(&self) -> Result<()>;

    async fn disconnect(&self, topic: &str, reason: RpcError) -> Result<()>;

    async fn request(&self, topic: &str, chain: &ChainId, request: RpcRequest) -> Result<Value>;
}

#[async_trait]
pub trait WalletRelay: Relay {
    async fn pair(&self, uri: &str) -> Result<()>;

    async fn approve_session(&self, proposal_id: u64, namespaces: Namespaces) -> Result<Session>;

    async fn reject_session(&self, proposal_id: u64, reason: RpcError) -> Result<()>;

    /// Replace the live namespaces. May take arbitrarily long to settle.
    async fn update_session(&self, topic: &str, namespaces: Namespaces) -> Result<()>;

    /// Rejected when the chain or event name is outside the live namespace.
    async fn emit_session_event(&self, topic: &str, chain: &ChainId, event: SessionEventPayload) -> Result<()>;

    async fn respond(&self, topic: &str, response: RpcResponse) -> Result<()>;

    async fn disconnect_session(&self, topic: &str, reason: RpcError) -> Result<()>;

    async fn delete_pairing(&self, topic: &str) -> Result<()>;
}
