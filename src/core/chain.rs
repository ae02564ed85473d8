//! Chain identity: CIP-34 chain ids and session account strings
//!
//! ```text
//! ChainId  cip34:{networkId}-{protocolMagic}           cip34:1-764824073
//! Account  {chainId}:{stakeAddress}-{baseAddress}      cip34:1-764824073:stake1..-addr1..
//! ```
//!
//! Account decoding takes the stake address up to the first `-` after the
//! chain and keeps the remainder verbatim as the base address, so a base
//! address may itself contain `-` or `:`. Stake addresses with either
//! separator are refused at encode time.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Namespace code for the Cardano address family (CIP-34)
pub const CARDANO_NAMESPACE: &str = "cip34";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NetworkId {
    Testnet = 0,
    Mainnet = 1,
}

impl NetworkId {
    pub fn as_u8(&self) -> u8 { *self as u8 }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(NetworkId::Testnet),
            1 => Some(NetworkId::Mainnet),
            _ => None,
        }
    }
}

impl Serialize for NetworkId {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for NetworkId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = u8::deserialize(d)?;
        NetworkId::from_u8(raw).ok_or_else(|| serde::de::Error::custom(format!("unknown network id {raw}")))
    }
}

/// Networks this connector knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownChain {
    pub network_id: NetworkId,
    pub protocol_magic: u32,
    pub name: &'static str,
}

pub const KNOWN_CHAINS: &[KnownChain] = &[
    KnownChain { network_id: NetworkId::Mainnet, protocol_magic: 764_824_073, name: "Cardano Mainnet" },
    KnownChain { network_id: NetworkId::Testnet, protocol_magic: 1, name: "Cardano Testnet Preprod" },
    KnownChain { network_id: NetworkId::Testnet, protocol_magic: 2, name: "Cardano Testnet Preview" },
];

/// A Cardano network, `cip34:{networkId}-{protocolMagic}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId {
    network_id: NetworkId,
    protocol_magic: u32,
}

impl ChainId {
    pub const MAINNET: ChainId = ChainId { network_id: NetworkId::Mainnet, protocol_magic: 764_824_073 };
    pub const PREPROD: ChainId = ChainId { network_id: NetworkId::Testnet, protocol_magic: 1 };
    pub const PREVIEW: ChainId = ChainId { network_id: NetworkId::Testnet, protocol_magic: 2 };

    /// Build a chain id. The magic must name a known network and agree with `network_id`.
    pub fn new(network_id: NetworkId, protocol_magic: u32) -> Result<Self> {
        let known = KNOWN_CHAINS
            .iter()
            .find(|c| c.protocol_magic == protocol_magic)
            .ok_or_else(|| Error::InvalidChain(format!("unknown protocol magic {protocol_magic}")))?;
        if known.network_id != network_id {
            return Err(Error::InvalidChain(format!(
                "protocol magic {protocol_magic} belongs to network {}, not {}",
                known.network_id.as_u8(),
                network_id.as_u8()
            )));
        }
        Ok(Self { network_id, protocol_magic })
    }

    pub fn all() -> Vec<ChainId> {
        KNOWN_CHAINS.iter().map(|c| ChainId { network_id: c.network_id, protocol_magic: c.protocol_magic }).collect()
    }

    pub fn network_id(&self) -> NetworkId { self.network_id }
    pub fn protocol_magic(&self) -> u32 { self.protocol_magic }

    /// Reference part without the namespace, e.g. `1-764824073`.
    pub fn reference(&self) -> String { format!("{}-{}", self.network_id.as_u8(), self.protocol_magic) }

    pub fn name(&self) -> &'static str {
        KNOWN_CHAINS
            .iter()
            .find(|c| c.protocol_magic == self.protocol_magic)
            .map(|c| c.name)
            .unwrap_or("Cardano")
    }

    pub fn is_mainnet(&self) -> bool { self.network_id == NetworkId::Mainnet }

    /// `mainnet`, `preprod`, `preview`, or a full chain id.
    pub fn from_alias(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(ChainId::MAINNET),
            "preprod" => Ok(ChainId::PREPROD),
            "preview" => Ok(ChainId::PREVIEW),
            other => other.parse(),
        }
    }
}

pub fn network_id_for(chain: &ChainId) -> NetworkId { chain.network_id }

pub fn encode_chain(network_id: NetworkId, protocol_magic: u32) -> Result<ChainId> {
    ChainId::new(network_id, protocol_magic)
}

pub fn decode_chain(raw: &str) -> Result<(NetworkId, u32)> {
    let chain: ChainId = raw.parse()?;
    Ok((chain.network_id, chain.protocol_magic))
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", CARDANO_NAMESPACE, self.reference())
    }
}

impl FromStr for ChainId {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid = |why: &str| Error::InvalidChain(format!("{raw}: {why}"));
        if raw.matches(':').count() != 1 || raw.matches('-').count() != 1 {
            return Err(invalid("expected exactly one ':' and one '-'"));
        }
        let (namespace, reference) = raw.split_once(':').ok_or_else(|| invalid("missing namespace"))?;
        if namespace != CARDANO_NAMESPACE {
            return Err(invalid("unsupported namespace"));
        }
        let (network, magic) = reference.split_once('-').ok_or_else(|| invalid("missing protocol magic"))?;
        let network = network
            .parse::<u8>()
            .ok()
            .and_then(NetworkId::from_u8)
            .ok_or_else(|| invalid("network id must be 0 or 1"))?;
        let magic = magic.parse::<u32>().map_err(|_| invalid("protocol magic is not a number"))?;
        ChainId::new(network, magic)
    }
}

impl Serialize for ChainId {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One wallet identity on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Account {
    pub chain: ChainId,
    pub stake_address: String,
    pub base_address: String,
}

impl Account {
    pub fn new(chain: ChainId, stake_address: impl Into<String>, base_address: impl Into<String>) -> Result<Self> {
        let account = Self { chain, stake_address: stake_address.into(), base_address: base_address.into() };
        account.validate()?;
        Ok(account)
    }

    fn validate(&self) -> Result<()> {
        if self.stake_address.is_empty() || self.base_address.is_empty() {
            return Err(Error::InvalidAccount("stake and base address must be non-empty".into()));
        }
        if self.stake_address.contains(['-', ':']) {
            return Err(Error::InvalidAccount(format!(
                "stake address '{}' contains a reserved separator",
                self.stake_address
            )));
        }
        if !is_address_like(&self.stake_address) {
            return Err(Error::InvalidAccount(format!("'{}' is not a bech32 or hex address", self.stake_address)));
        }
        Ok(())
    }
}

pub fn encode_account(chain: ChainId, stake_address: &str, base_address: &str) -> Result<String> {
    Ok(Account::new(chain, stake_address, base_address)?.to_string())
}

pub fn decode_account(raw: &str) -> Result<Account> {
    raw.parse()
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chain, self.stake_address, self.base_address)
    }
}

impl FromStr for Account {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid = |why: &str| Error::InvalidAccount(format!("{raw}: {why}"));
        let mut parts = raw.splitn(3, ':');
        let (namespace, reference, addresses) = match (parts.next(), parts.next(), parts.next()) {
            (Some(n), Some(r), Some(a)) => (n, r, a),
            _ => return Err(invalid("expected {chain}:{stake}-{base}")),
        };
        let chain: ChainId = format!("{namespace}:{reference}").parse()?;
        let (stake, base) = addresses.split_once('-').ok_or_else(|| invalid("missing '-' between stake and base address"))?;
        Account::new(chain, stake, base)
    }
}

impl Serialize for Account {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Account {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Bech32 (`hrp1data`) or hex (CSL `to_hex`) address text.
fn is_address_like(value: &str) -> bool {
    let bech32 = value
        .rsplit_once('1')
        .map(|(hrp, data)| !hrp.is_empty() && !data.is_empty() && data.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(false);
    bech32 || hex::decode(value).is_ok()
}
