//! Relay-level records: pairings, sessions, proposals and events

use crate::core::chain::ChainId;
use crate::core::consts::relay as names;
use crate::core::namespace::{cardano, Namespace, Namespaces};
use crate::core::rpc::RpcRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppMetadata {
    pub name: String,
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub icons: Vec<String>,
}

impl AppMetadata {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self { name: name.into(), url: url.into(), ..Default::default() }
    }
}

/// Transport handshake beneath a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pairing {
    pub topic: String,
    pub active: bool,
    pub peer_metadata: Option<AppMetadata>,
    pub expiry: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub topic: String,
    pub pairing_topic: String,
    /// Live grant
    pub namespaces: Namespaces,
    pub required_namespaces: Namespaces,
    pub optional_namespaces: Namespaces,
    pub peer_metadata: AppMetadata,
    /// Unix seconds
    pub expiry: i64,
}

impl Session {
    pub fn cardano(&self) -> Option<&Namespace> { cardano(&self.namespaces) }

    pub fn optional_cardano(&self) -> Option<&Namespace> { cardano(&self.optional_namespaces) }

    /// Chain is live or may be added without renegotiation.
    pub fn accepts_chain(&self, chain: &ChainId) -> bool {
        self.optional_cardano().map(|ns| ns.contains_chain(chain)).unwrap_or(false)
            || self.cardano().map(|ns| ns.contains_chain(chain)).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectParams {
    pub namespaces: Namespaces,
    pub optional_namespaces: Namespaces,
    pub pairing_topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub id: u64,
    pub pairing_topic: String,
    pub required_namespaces: Namespaces,
    pub optional_namespaces: Namespaces,
    pub proposer: AppMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    pub id: u64,
    pub topic: String,
    pub chain_id: ChainId,
    pub request: RpcRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEventPayload {
    pub name: String,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    DisplayUri(String),
    SessionProposal(Proposal),
    SessionRequest(SessionRequest),
    SessionEvent { topic: String, chain_id: ChainId, event: SessionEventPayload },
    SessionUpdate { topic: String, namespaces: Namespaces },
    SessionDelete { topic: String },
    SessionPing { topic: String },
}

impl RelayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RelayEvent::DisplayUri(_) => names::DISPLAY_URI,
            RelayEvent::SessionProposal(_) => names::SESSION_PROPOSAL,
            RelayEvent::SessionRequest(_) => names::SESSION_REQUEST,
            RelayEvent::SessionEvent { .. } => names::SESSION_EVENT,
            RelayEvent::SessionUpdate { .. } => names::SESSION_UPDATE,
            RelayEvent::SessionDelete { .. } => names::SESSION_DELETE,
            RelayEvent::SessionPing { .. } => names::SESSION_PING,
        }
    }
}
