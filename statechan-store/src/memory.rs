use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use statechan_chain::DisputeRecord;
use statechan_primitives::{
	state::{
		Channel,
		Transfer,
	},
	types::{
		Address,
		ChainId,
		Identifier,
		QueuedRouterUpdate,
		QueuedUpdateStatus,
		RoutingId,
		TransferId,
	},
};
use ulid::Ulid;

use crate::{
	errors::StoreError,
	Store,
};

/// Reference in-memory `Store` adapter. Not a durable backend, durability
/// itself is an external collaborator's concern; exists for tests and the
/// default node binary.
#[derive(Default)]
pub struct InMemoryStore {
	channels: Mutex<HashMap<Address, Channel>>,
	transfers: Mutex<HashMap<TransferId, Transfer>>,
	queue: Mutex<HashMap<String, QueuedRouterUpdate>>,
	queue_order: Mutex<Vec<String>>,
	disputes: Mutex<HashMap<Address, DisputeRecord>>,
}

impl InMemoryStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl Store for InMemoryStore {
	async fn get_channel_state(&self, channel_address: Address) -> Result<Option<Channel>, StoreError> {
		Ok(self.channels.lock().get(&channel_address).cloned())
	}

	async fn get_channel_state_by_participants(
		&self,
		alice: Address,
		bob: Address,
		chain_id: ChainId,
	) -> Result<Option<Channel>, StoreError> {
		Ok(self
			.channels
			.lock()
			.values()
			.find(|c| c.alice == alice && c.bob == bob && c.chain_id == chain_id)
			.cloned())
	}

	async fn get_channel_state_by_counterparty_identifier(
		&self,
		router: Address,
		counterparty: &Identifier,
		chain_id: ChainId,
	) -> Result<Option<Channel>, StoreError> {
		Ok(self
			.channels
			.lock()
			.values()
			.find(|c| {
				c.chain_id == chain_id &&
					((c.alice == router && &c.bob_identifier == counterparty) ||
						(c.bob == router && &c.alice_identifier == counterparty))
			})
			.cloned())
	}

	async fn get_active_transfers(&self, channel_address: Address) -> Result<Vec<Transfer>, StoreError> {
		Ok(self
			.transfers
			.lock()
			.values()
			.filter(|t| t.channel_address.channel_address == channel_address && t.is_active())
			.cloned()
			.collect())
	}

	async fn get_transfer_state(&self, transfer_id: TransferId) -> Result<Option<Transfer>, StoreError> {
		Ok(self.transfers.lock().get(&transfer_id).cloned())
	}

	async fn get_transfers_by_routing_id(
		&self,
		routing_id: RoutingId,
	) -> Result<Vec<Transfer>, StoreError> {
		let wanted = format!("{:#x}", routing_id);
		Ok(self
			.transfers
			.lock()
			.values()
			.filter(|t| {
				t.meta.get("routingId").and_then(|v| v.as_str()).map(|s| s == wanted).unwrap_or(false)
			})
			.cloned()
			.collect())
	}

	async fn save_channel_state_and_transfers(
		&self,
		channel: Channel,
		transfers: Vec<Transfer>,
	) -> Result<(), StoreError> {
		let channel_address = channel.channel_address.channel_address;
		self.channels.lock().insert(channel_address, channel);
		let mut store = self.transfers.lock();
		for transfer in transfers {
			store.insert(transfer.transfer_id, transfer);
		}
		Ok(())
	}

	async fn get_queued_updates(
		&self,
		channel_address: Address,
		status: QueuedUpdateStatus,
	) -> Result<Vec<QueuedRouterUpdate>, StoreError> {
		let queue = self.queue.lock();
		Ok(self
			.queue_order
			.lock()
			.iter()
			.filter_map(|id| queue.get(id))
			.filter(|row| row.channel_address == channel_address && row.status == status)
			.cloned()
			.collect())
	}

	async fn queue_update(&self, mut update: QueuedRouterUpdate) -> Result<String, StoreError> {
		if update.id.is_empty() {
			update.id = Ulid::new().to_string();
		}
		let id = update.id.clone();
		self.queue_order.lock().push(id.clone());
		self.queue.lock().insert(id.clone(), update);
		Ok(id)
	}

	async fn set_update_status(
		&self,
		id: &str,
		status: QueuedUpdateStatus,
		last_failure_reason: Option<String>,
	) -> Result<(), StoreError> {
		let mut queue = self.queue.lock();
		let row = queue.get_mut(id).ok_or_else(|| StoreError::QueuedUpdateNotFound(id.to_owned()))?;
		row.status = status;
		if last_failure_reason.is_some() {
			row.last_failure_reason = last_failure_reason;
		}
		Ok(())
	}

	async fn save_channel_dispute(&self, dispute: DisputeRecord) -> Result<(), StoreError> {
		self.disputes.lock().insert(dispute.channel_address, dispute);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use statechan_primitives::types::{
		Nonce,
		H256,
	};

	use super::*;
	use crate::Store;

	fn sample_channel() -> Channel {
		use statechan_primitives::{
			state::NetworkContext,
			types::CanonicalChannelId,
		};
		Channel {
			channel_address: CanonicalChannelId {
				chain_id: ChainId(1),
				factory: Address::zero(),
				channel_address: Address::repeat_byte(1),
			},
			alice_identifier: "alice".into(),
			bob_identifier: "bob".into(),
			alice: Address::repeat_byte(0xa),
			bob: Address::repeat_byte(0xb),
			chain_id: ChainId(1),
			network_context: NetworkContext {
				factory: Address::zero(),
				transfer_registry_address: Address::zero(),
				provider_url: "http://localhost:8545".into(),
			},
			nonce: Nonce::initial(),
			latest_update: None,
			balances: Default::default(),
			processed_deposits_alice: Default::default(),
			processed_deposits_bob: Default::default(),
			asset_ids: vec![],
			merkle_root: H256::zero(),
			timeout: 0,
			in_dispute: false,
		}
	}

	#[tokio::test]
	async fn roundtrips_channel_state() {
		let store = InMemoryStore::new();
		let channel = sample_channel();
		let address = channel.channel_address.channel_address;
		store.save_channel_state_and_transfers(channel, vec![]).await.unwrap();
		let loaded = store.get_channel_state(address).await.unwrap();
		assert!(loaded.is_some());
	}

	#[tokio::test]
	async fn queue_update_defaults_pending_and_cas_transitions() {
		let store = InMemoryStore::new();
		let row = QueuedRouterUpdate {
			id: String::new(),
			channel_address: Address::repeat_byte(1),
			update_type: statechan_primitives::types::QueuedUpdateType::TransferCreation,
			payload: serde_json::json!({}),
			status: QueuedUpdateStatus::Pending,
			created_at: 0,
			last_failure_reason: None,
		};
		let id = store.queue_update(row).await.unwrap();
		let pending =
			store.get_queued_updates(Address::repeat_byte(1), QueuedUpdateStatus::Pending).await.unwrap();
		assert_eq!(pending.len(), 1);

		store.set_update_status(&id, QueuedUpdateStatus::Processing, None).await.unwrap();
		let pending =
			store.get_queued_updates(Address::repeat_byte(1), QueuedUpdateStatus::Pending).await.unwrap();
		assert!(pending.is_empty());
	}
}
