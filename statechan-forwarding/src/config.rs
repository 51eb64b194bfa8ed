//! Router-wide forwarding configuration ("Configuration").
use statechan_primitives::types::{
	AssetId,
	ChainId,
	U256,
};

use crate::swap::PricingTable;

/// Rebalancing thresholds for one `(chainId, assetId)` pair a router holds
/// collateral in ("Configuration" `rebalanceProfiles`).
/// scopes actually rebalancing (moving collateral on-chain) out
/// of this crate; these thresholds feed the collateralization check the
/// Forwarding Engine performs before submitting a `create`.
#[derive(Clone, Debug)]
pub struct RebalanceProfile {
	pub chain_id: ChainId,
	pub asset_id: AssetId,
	pub reclaim_threshold: U256,
	pub target: U256,
	pub collateralize_threshold: U256,
}

/// Everything the Forwarding Engine needs besides the collaborators it
/// shares with the Update Engine: the router's pricing table, its
/// rebalance profiles, and the two boolean switches lists
/// alongside them (`skipCheckIn`, and the default for `requireOnline` when
/// a `PathHop` omits it).
#[derive(Clone, Debug, Default)]
pub struct ForwardingConfig {
	pub pricing: PricingTable,
	pub rebalance_profiles: Vec<RebalanceProfile>,
	pub require_online_default: bool,
	pub skip_check_in: bool,
}

impl ForwardingConfig {
	/// The configured profile for `(chain_id, asset_id)`, if the router
	/// holds collateral in it.
	pub fn profile_for(&self, chain_id: ChainId, asset_id: AssetId) -> Option<&RebalanceProfile> {
		self.rebalance_profiles.iter().find(|p| p.chain_id == chain_id && p.asset_id == asset_id)
	}
}
