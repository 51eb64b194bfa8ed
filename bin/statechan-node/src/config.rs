//! `NodeConfig`: `chainProviders`, `chainAddresses`, `rebalanceProfiles`,
//! `allowedSwaps`, `mnemonic`, `messagingUrl`, `skipCheckIn`, the way
//! `raiden_primitives::config::RaidenConfig` shapes its own node-level
//! configuration. Loaded from an optional JSON file and then overlaid
//! with CLI flags, since the nested per-chain and per-route maps are
//! unwieldy as repeated flags alone.
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{
	Deserialize,
	Serialize,
};
use statechan_forwarding::config::{
	ForwardingConfig,
	RebalanceProfile,
};
use statechan_forwarding::swap::{
	PricingTable,
	SwapRate,
};
use statechan_primitives::types::{
	Address,
	ChainId,
	U256,
};

/// The on-chain deployment a chain id resolves to: the channel factory and
/// the transfer-definition registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainAddresses {
	pub channel_factory_address: Address,
	pub transfer_registry_address: Address,
}

/// One entry of `rebalanceProfiles`, with balances carried as decimal
/// strings so the config file round-trips through `serde_json` without
/// precision loss.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RebalanceProfileEntry {
	pub chain_id: u64,
	pub asset_id: Address,
	pub reclaim_threshold: String,
	pub target: String,
	pub collateralize_threshold: String,
}

/// One entry of `allowedSwaps`: a configured conversion rate between an
/// asset on one chain and an asset on another.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AllowedSwapEntry {
	pub from_asset: Address,
	pub from_chain_id: u64,
	pub to_asset: Address,
	pub to_chain_id: u64,
	pub rate_numerator: String,
	pub rate_denominator: String,
}

/// A statechan node's full external configuration, as read from a JSON
/// file and overlaid with CLI flags in `cli::Opt::into_config`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeConfig {
	pub chain_providers: HashMap<u64, String>,
	pub chain_addresses: HashMap<u64, ChainAddresses>,
	#[serde(default)]
	pub rebalance_profiles: Vec<RebalanceProfileEntry>,
	#[serde(default)]
	pub allowed_swaps: Vec<AllowedSwapEntry>,
	pub mnemonic: Option<String>,
	pub messaging_url: Option<String>,
	#[serde(default)]
	pub skip_check_in: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
	#[error("could not read config file {path}: {source}")]
	Read { path: String, source: std::io::Error },
	#[error("could not parse config file {path}: {source}")]
	Parse { path: String, source: serde_json::Error },
	#[error("invalid decimal amount `{0}`")]
	Amount(String),
	#[error("invalid address: {0}")]
	InvalidAddress(String),
	#[error("no chain provider configured for chain {0}")]
	MissingProvider(u64),
	#[error("no chain addresses configured for chain {0}")]
	MissingAddresses(u64),
	#[error("no mnemonic configured; pass --mnemonic or set it in the config file")]
	MissingMnemonic,
}

fn parse_u256(s: &str) -> Result<U256, ConfigError> {
	U256::from_dec_str(s).map_err(|_| ConfigError::Amount(s.to_owned()))
}

impl NodeConfig {
	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let raw = fs::read_to_string(path)
			.map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
		serde_json::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.display().to_string(), source })
	}

	/// Builds the `(chainId, channelFactory, transferRegistry)` triple the
	/// node needs to register with the reference `InMemoryChainReader` for
	/// a given chain.
	pub fn addresses_for(&self, chain_id: ChainId) -> Result<&ChainAddresses, ConfigError> {
		self.chain_addresses.get(&chain_id.0).ok_or(ConfigError::MissingAddresses(chain_id.0))
	}

	pub fn provider_url_for(&self, chain_id: ChainId) -> Result<&str, ConfigError> {
		self.chain_providers.get(&chain_id.0).map(String::as_str).ok_or(ConfigError::MissingProvider(chain_id.0))
	}

	/// Converts the configured rebalance profiles and allowed swaps into
	/// the `ForwardingConfig` the `ForwardingEngine` expects, leaving
	/// `require_online_default` at its `Default` (the per-transfer
	/// `RoutingMeta::require_online` flag, set by the caller of
	/// `create_conditional_transfer`, overrides it).
	pub fn forwarding_config(&self) -> Result<ForwardingConfig, ConfigError> {
		let mut rates = Vec::with_capacity(self.allowed_swaps.len());
		for swap in &self.allowed_swaps {
			rates.push(SwapRate {
				from_asset: swap.from_asset,
				from_chain: ChainId(swap.from_chain_id),
				to_asset: swap.to_asset,
				to_chain: ChainId(swap.to_chain_id),
				rate_numerator: parse_u256(&swap.rate_numerator)?,
				rate_denominator: parse_u256(&swap.rate_denominator)?,
			});
		}

		let mut profiles = Vec::with_capacity(self.rebalance_profiles.len());
		for profile in &self.rebalance_profiles {
			profiles.push(RebalanceProfile {
				chain_id: ChainId(profile.chain_id),
				asset_id: profile.asset_id,
				reclaim_threshold: parse_u256(&profile.reclaim_threshold)?,
				target: parse_u256(&profile.target)?,
				collateralize_threshold: parse_u256(&profile.collateralize_threshold)?,
			});
		}

		Ok(ForwardingConfig {
			pricing: PricingTable::new(rates),
			rebalance_profiles: profiles,
			require_online_default: false,
			skip_check_in: self.skip_check_in,
		})
	}

	pub fn mnemonic(&self) -> Result<&str, ConfigError> {
		self.mnemonic.as_deref().ok_or(ConfigError::MissingMnemonic)
	}
}

/// Parses a hex-encoded 20-byte address, with or without a `0x` prefix.
/// Used both by CLI flag parsing and by config deserialization helpers
/// that accept raw strings instead of relying on `Address`'s own
/// `FromStr` implementation.
pub fn parse_address(s: &str) -> Result<Address, String> {
	let trimmed = s.strip_prefix("0x").unwrap_or(s);
	Address::from_str(trimmed).map_err(|e| format!("invalid address `{}`: {}", s, e))
}
