//! Namespaces: permission grants and proposal builders
//!
//! A proposal carries two maps keyed by namespace name (`cip34`):
//! - **required**: must be granted for the session to exist
//! - **optional**: everything the connector could accept later, so a wallet
//!   can add chains or accounts without a fresh negotiation
//!
//! The builders are pure; they never touch session state.

use crate::core::chain::{Account, ChainId, CARDANO_NAMESPACE};
use crate::core::consts::{events, methods, RPC_ENDPOINT};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Namespace {
    #[serde(default)]
    pub chains: Vec<ChainId>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accounts: Vec<Account>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rpc_map: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_chain: Option<ChainId>,
}

/// Namespace name → grant
pub type Namespaces = BTreeMap<String, Namespace>;

impl Namespace {
    pub fn contains_chain(&self, chain: &ChainId) -> bool { self.chains.contains(chain) }

    pub fn contains_account(&self, account: &Account) -> bool { self.accounts.contains(account) }

    pub fn supports_method(&self, method: &str) -> bool { self.methods.iter().any(|m| m == method) }

    pub fn supports_event(&self, event: &str) -> bool { self.events.iter().any(|e| e == event) }

    pub fn accounts_on(&self, chain: &ChainId) -> impl Iterator<Item = &Account> + '_ {
        let chain = *chain;
        self.accounts.iter().filter(move |a| a.chain == chain)
    }

    /// Returns false when the chain was already present.
    pub fn add_chain(&mut self, chain: ChainId) -> bool {
        if self.contains_chain(&chain) {
            return false;
        }
        self.chains.push(chain);
        true
    }

    /// Appends the account (and its chain) once. Returns false when nothing changed.
    pub fn add_account(&mut self, account: Account) -> bool {
        let chain_added = self.add_chain(account.chain);
        if self.contains_account(&account) {
            return chain_added;
        }
        self.accounts.push(account);
        true
    }

    /// Every account's chain must be listed in `chains`.
    pub fn validate(&self) -> Result<()> {
        match self.accounts.iter().find(|a| !self.contains_chain(&a.chain)) {
            Some(orphan) => Err(Error::UnsupportedAccount(format!(
                "{orphan} references chain {} outside the namespace",
                orphan.chain
            ))),
            None => Ok(()),
        }
    }
}

pub fn cardano(namespaces: &Namespaces) -> Option<&Namespace> { namespaces.get(CARDANO_NAMESPACE) }

pub fn cardano_mut(namespaces: &mut Namespaces) -> Option<&mut Namespace> { namespaces.get_mut(CARDANO_NAMESPACE) }

pub fn chain_to_rpc(chain: &ChainId) -> String { format!("{RPC_ENDPOINT}?chainId={chain}") }

/// One relay endpoint per chain, keyed by chain reference (`1-764824073`).
pub fn rpc_map(chains: &[ChainId]) -> BTreeMap<String, String> {
    chains.iter().map(|c| (c.reference(), chain_to_rpc(c))).collect()
}

fn owned(list: &[&str]) -> Vec<String> { list.iter().map(|s| s.to_string()).collect() }

/// Required grant for `chains`. The rpc map covers every known chain so a
/// later chain switch already has an endpoint.
pub fn build_required(chains: &[ChainId], legacy_mode: bool) -> Namespaces {
    let method_set = if legacy_mode { methods::ALL } else { methods::REQUIRED };
    let namespace = Namespace {
        chains: chains.to_vec(),
        methods: owned(method_set),
        events: owned(events::ALL),
        rpc_map: rpc_map(&ChainId::all()),
        ..Default::default()
    };
    BTreeMap::from([(CARDANO_NAMESPACE.to_string(), namespace)])
}

/// Superset grant advertising every chain and method the connector accepts.
pub fn build_optional(supported: &[ChainId]) -> Namespaces {
    let namespace = Namespace {
        chains: supported.to_vec(),
        methods: owned(methods::ALL),
        events: owned(events::ALL),
        rpc_map: rpc_map(supported),
        ..Default::default()
    };
    BTreeMap::from([(CARDANO_NAMESPACE.to_string(), namespace)])
}
