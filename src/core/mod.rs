//! Core: chain identity, wire constants, JSON-RPC envelopes, namespaces.
//! Pure values and functions; no I/O.

pub mod chain;
pub mod consts;
pub mod namespace;
pub mod rpc;

pub use chain::{decode_account, decode_chain, encode_account, encode_chain, network_id_for, Account, ChainId, NetworkId};
pub use namespace::{build_optional, build_required, Namespace, Namespaces};
pub use rpc::{RpcError, RpcRequest, RpcResponse};
