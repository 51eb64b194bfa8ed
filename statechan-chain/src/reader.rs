use async_trait::async_trait;
use statechan_primitives::types::{
	AssetId,
	Address,
	ChainId,
	TransferDefinitionAddress,
	U256,
};

use crate::{
	dispute::DisputeRecord,
	errors::ChainReaderError,
};

/// External collaborator ("Chain Reader"): deterministic
/// channel-address derivation, transfer-definition registry lookup, and
/// on-chain dispute/deposit reads. The Update Engine depends only on this
/// trait, never on a concrete chain client.
#[async_trait]
pub trait ChainReader: Send + Sync {
	/// Deterministically derives the channel address for a given pair of
	/// participants on a given chain, via the configured factory's Create2
	/// scheme.
	async fn get_channel_address(
		&self,
		alice: Address,
		bob: Address,
		chain_id: ChainId,
		factory: Address,
	) -> Result<Address, ChainReaderError>;

	/// Returns the transfer-definition addresses registered on `chain_id`,
	/// as `(name, address)` pairs.
	async fn get_registered_transfers(
		&self,
		chain_id: ChainId,
	) -> Result<Vec<(String, TransferDefinitionAddress)>, ChainReaderError>;

	/// Returns the last observed on-chain dispute record for a channel, if
	/// any.
	async fn get_channel_dispute(
		&self,
		channel_address: Address,
	) -> Result<Option<DisputeRecord>, ChainReaderError>;

	/// Returns the cumulative amount deposited on-chain for `asset_id` by
	/// the party at `party_index` (0 = alice, 1 = bob) into `channel_address`.
	async fn latest_deposit_by_asset_id(
		&self,
		channel_address: Address,
		asset_id: AssetId,
		party_index: usize,
	) -> Result<U256, ChainReaderError>;

	/// Returns whether the underlying chain client is still catching up to
	/// the chain head; callers should treat reads as provisional while true.
	async fn get_syncing(&self, chain_id: ChainId) -> Result<bool, ChainReaderError>;
}
