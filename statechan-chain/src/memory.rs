use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use statechan_primitives::{
	hashing::derive_channel_address,
	types::{
		AssetId,
		Address,
		ChainId,
		TransferDefinitionAddress,
		U256,
	},
};

use crate::{
	dispute::DisputeRecord,
	errors::ChainReaderError,
	reader::ChainReader,
	registry::TransferDefinitionRegistry,
};

/// Reference, in-memory `ChainReader` adapter. Not a production chain
/// client, the adjudicator/factory contracts are out of scope; it exists
/// so the engine and its tests have a port to exercise, the role
/// `raiden_storage::StateStorage` plays relative to `raiden_state_machine`
/// but scaled down to a trait-backed fake.
pub struct InMemoryChainReader {
	factories: HashMap<u64, Address>,
	registries: HashMap<u64, Vec<(String, TransferDefinitionAddress)>>,
	deposits: RwLock<HashMap<(Address, AssetId, usize), U256>>,
	disputes: RwLock<HashMap<Address, DisputeRecord>>,
	syncing: RwLock<HashMap<u64, bool>>,
}

impl InMemoryChainReader {
	pub fn new() -> Self {
		Self {
			factories: HashMap::new(),
			registries: HashMap::new(),
			deposits: RwLock::new(HashMap::new()),
			disputes: RwLock::new(HashMap::new()),
			syncing: RwLock::new(HashMap::new()),
		}
	}

	/// Registers the channel-factory address used for Create2 derivation on
	/// `chain_id`.
	pub fn with_factory(mut self, chain_id: ChainId, factory: Address) -> Self {
		self.factories.insert(chain_id.0, factory);
		self
	}

	/// Seeds the registered transfer definitions visible on `chain_id`.
	pub fn with_registry(mut self, chain_id: ChainId, registry: &TransferDefinitionRegistry) -> Self {
		self.registries.insert(chain_id.0, registry.entries());
		self
	}

	/// Test/operator hook: records an on-chain deposit, as if observed by a
	/// real chain client watching the factory's deposit events.
	pub fn record_deposit(&self, channel: Address, asset_id: AssetId, party_index: usize, total: U256) {
		self.deposits.write().insert((channel, asset_id, party_index), total);
	}

	/// Test/operator hook: records a dispute as if observed on-chain.
	pub fn record_dispute(&self, record: DisputeRecord) {
		self.disputes.write().insert(record.channel_address, record);
	}

	/// Test/operator hook: marks `chain_id` as syncing or caught up.
	pub fn set_syncing(&self, chain_id: ChainId, syncing: bool) {
		self.syncing.write().insert(chain_id.0, syncing);
	}
}

impl Default for InMemoryChainReader {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl ChainReader for InMemoryChainReader {
	async fn get_channel_address(
		&self,
		alice: Address,
		bob: Address,
		chain_id: ChainId,
		factory: Address,
	) -> Result<Address, ChainReaderError> {
		if let Some(expected) = self.factories.get(&chain_id.0) {
			if *expected != factory {
				return Err(ChainReaderError::UnknownChain(chain_id.0))
			}
		}
		Ok(derive_channel_address(alice, bob, chain_id, factory))
	}

	async fn get_registered_transfers(
		&self,
		chain_id: ChainId,
	) -> Result<Vec<(String, TransferDefinitionAddress)>, ChainReaderError> {
		self.registries
			.get(&chain_id.0)
			.cloned()
			.ok_or(ChainReaderError::UnknownChain(chain_id.0))
	}

	async fn get_channel_dispute(
		&self,
		channel_address: Address,
	) -> Result<Option<DisputeRecord>, ChainReaderError> {
		Ok(self.disputes.read().get(&channel_address).cloned())
	}

	async fn latest_deposit_by_asset_id(
		&self,
		channel_address: Address,
		asset_id: AssetId,
		party_index: usize,
	) -> Result<U256, ChainReaderError> {
		Ok(self
			.deposits
			.read()
			.get(&(channel_address, asset_id, party_index))
			.copied()
			.unwrap_or_default())
	}

	async fn get_syncing(&self, chain_id: ChainId) -> Result<bool, ChainReaderError> {
		Ok(self.syncing.read().get(&chain_id.0).copied().unwrap_or(false))
	}
}
