//! Error taxonomy for the connector

use crate::core::rpc::RpcError;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("provider not initialized: {0}")]
    ProviderNotInitialized(String),
    #[error("enabled api not initialized")]
    EnabledApiNotFound,
    #[error("default chain not set")]
    DefaultChainNotSet,
    #[error("no account set")]
    AccountNotSet,
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("pairing not found: {0}")]
    PairingNotFound(String),
    #[error("connection aborted by user")]
    ConnectionAbortedByUser,
    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),
    #[error("unsupported account: {0}")]
    UnsupportedAccount(String),
    #[error("invalid chain: {0}")]
    InvalidChain(String),
    #[error("invalid account: {0}")]
    InvalidAccount(String),
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },
    #[error("peer error: {0}")]
    Rpc(RpcError),
    #[error("transport: {0}")]
    Transport(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("wallet: {0}")]
    Wallet(String),
    #[error("data source: {0}")]
    DataSource(String),
    #[error("config: {0}")]
    Config(String),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

fn no_matching_key() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)no matching key").expect("static regex"))
}

impl Error {
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Error::Timeout { operation: operation.into(), after }
    }

    /// Transport noise from disconnecting a session the relay already forgot.
    pub fn is_no_matching_key(&self) -> bool {
        match self {
            Error::Transport(message) => no_matching_key().is_match(message),
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool { matches!(self, Error::Timeout { .. }) }
}

impl From<RpcError> for Error {
    fn from(e: RpcError) -> Self { Error::Rpc(e) }
}
