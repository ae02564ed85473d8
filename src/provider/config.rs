//! Provider configuration - passed from the embedding dApp

use super::prompt::PairingPrompt;
use crate::core::chain::ChainId;
use crate::core::consts::relayers;
use crate::emulator::DataSource;
use crate::error::{Error, Result};
use crate::relay::AppMetadata;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayRegion {
    #[default]
    Default,
    Us,
    Eu,
    Apac,
}

impl RelayRegion {
    pub fn url(&self) -> &'static str {
        match self {
            RelayRegion::Default => relayers::DEFAULT,
            RelayRegion::Us => relayers::US,
            RelayRegion::Eu => relayers::EU,
            RelayRegion::Apac => relayers::APAC,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelayRegion::Default => "default",
            RelayRegion::Us => "us",
            RelayRegion::Eu => "eu",
            RelayRegion::Apac => "apac",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "default" | "" => Some(RelayRegion::Default),
            "us" | "us-east-1" => Some(RelayRegion::Us),
            "eu" | "eu-central-1" => Some(RelayRegion::Eu),
            "apac" | "ap-southeast-1" => Some(RelayRegion::Apac),
            _ => None,
        }
    }
}

/// Upper bounds on relay round trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Session namespace update during an account or chain change (best effort)
    pub namespace_update: Duration,
    /// First-time address discovery over the relay (best effort)
    pub address_discovery: Duration,
    /// Any other wallet request or data-source call
    pub request: Duration,
    /// Waiting for the wallet to approve a proposal
    pub approval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            namespace_update: Duration::from_secs(5),
            address_discovery: Duration::from_secs(15),
            request: Duration::from_secs(60),
            approval: Duration::from_secs(300),
        }
    }
}

/// Provider configuration. Higher layers construct this.
#[derive(Clone, Default)]
pub struct ProviderConfig {
    pub project_id: String,
    pub chains: Vec<ChainId>,
    pub desired_chain: Option<ChainId>,
    pub relay_url: String,
    pub metadata: AppMetadata,
    /// Full method set up front and never Direct mode
    pub legacy_mode: bool,
    pub qrcode: Option<Arc<dyn PairingPrompt>>,
    pub data_source: Option<Arc<dyn DataSource>>,
    pub timeouts: Timeouts,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("project_id", &self.project_id)
            .field("chains", &self.chains)
            .field("desired_chain", &self.desired_chain)
            .field("relay_url", &self.relay_url)
            .field("metadata", &self.metadata)
            .field("legacy_mode", &self.legacy_mode)
            .field("qrcode", &self.qrcode.is_some())
            .field("data_source", &self.data_source.is_some())
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self { project_id: project_id.into(), relay_url: RelayRegion::Default.url().into(), ..Default::default() }
    }
    pub fn with_chains(mut self, chains: Vec<ChainId>) -> Self { self.chains = chains; self }
    pub fn with_desired_chain(mut self, chain: ChainId) -> Self { self.desired_chain = Some(chain); self }
    pub fn with_region(mut self, region: RelayRegion) -> Self { self.relay_url = region.url().into(); self }
    pub fn with_relay_url(mut self, url: impl Into<String>) -> Self { self.relay_url = url.into(); self }
    pub fn with_metadata(mut self, metadata: AppMetadata) -> Self { self.metadata = metadata; self }
    pub fn with_legacy_mode(mut self, on: bool) -> Self { self.legacy_mode = on; self }
    pub fn with_qrcode(mut self, prompt: Arc<dyn PairingPrompt>) -> Self { self.qrcode = Some(prompt); self }
    pub fn with_data_source(mut self, source: Arc<dyn DataSource>) -> Self { self.data_source = Some(source); self }
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self { self.timeouts = timeouts; self }

    /// `CARDANO_WC_PROJECT_ID` (required), `CARDANO_WC_RELAY_URL` (url or region),
    /// `CARDANO_WC_CHAINS` (comma separated), `CARDANO_WC_LEGACY_MODE`.
    pub fn from_env() -> Result<Self> {
        let project_id = std::env::var("CARDANO_WC_PROJECT_ID")
            .map_err(|_| Error::Config("CARDANO_WC_PROJECT_ID is not set".into()))?;
        let mut config = Self::new(project_id);
        if let Ok(relay) = std::env::var("CARDANO_WC_RELAY_URL") {
            config = match RelayRegion::from_str(&relay) {
                Some(region) => config.with_region(region),
                None => config.with_relay_url(relay),
            };
        }
        config.chains = match std::env::var("CARDANO_WC_CHAINS") {
            Ok(raw) => parse_chains(&raw)?,
            Err(_) => vec![ChainId::MAINNET],
        };
        if let Ok(raw) = std::env::var("CARDANO_WC_LEGACY_MODE") {
            config.legacy_mode = matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            return Err(Error::Config("project id must not be empty".into()));
        }
        if self.chains.is_empty() {
            return Err(Error::Config("at least one chain is required".into()));
        }
        if let Some(desired) = &self.desired_chain {
            if !self.chains.contains(desired) {
                return Err(Error::Config(format!("desired chain {desired} is not among the configured chains")));
            }
        }
        Ok(())
    }

    /// Chain proposed when no default is persisted.
    pub fn initial_chain(&self) -> Option<ChainId> { self.desired_chain.or_else(|| self.chains.first().copied()) }
}

pub fn parse_chains(raw: &str) -> Result<Vec<ChainId>> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(ChainId::from_alias).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rules() {
        assert!(matches!(ProviderConfig::new("").with_chains(vec![ChainId::MAINNET]).validate(), Err(Error::Config(_))));
        assert!(matches!(ProviderConfig::new("p").validate(), Err(Error::Config(_))));
        let desired_elsewhere = ProviderConfig::new("p").with_chains(vec![ChainId::MAINNET]).with_desired_chain(ChainId::PREVIEW);
        assert!(matches!(desired_elsewhere.validate(), Err(Error::Config(_))));

        let config = ProviderConfig::new("p").with_chains(vec![ChainId::MAINNET, ChainId::PREVIEW]).with_desired_chain(ChainId::PREVIEW);
        config.validate().unwrap();
        assert_eq!(config.initial_chain(), Some(ChainId::PREVIEW));
        assert_eq!(config.relay_url, relayers::DEFAULT);
    }

    #[test]
    fn regions_and_chain_lists_parse() {
        assert_eq!(RelayRegion::from_str("EU"), Some(RelayRegion::Eu));
        assert_eq!(RelayRegion::from_str("mars"), None);
        assert_eq!(parse_chains("mainnet, cip34:0-2,").unwrap(), vec![ChainId::MAINNET, ChainId::PREVIEW]);
        assert!(parse_chains("mainnet,cip34:9-9").is_err());
    }
}
