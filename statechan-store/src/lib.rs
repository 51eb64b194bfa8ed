//! Store port ("Store"): durable channel state, transfer state, queued
//! updates, dispute records. Durability itself is out of scope; this crate
//! defines the trait the Update Engine and Forwarding Engine depend on,
//! plus an in-memory reference adapter for tests and the default node
//! binary, the role `raiden_storage` plays relative to
//! `raiden_state_machine`, narrowed here to a port.

use async_trait::async_trait;
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

use crate::errors::StoreError;

/// On-chain dispute record observed for a channel (/// "Supplemented: `Dispute`"); re-exported from `statechan-chain` so store
/// callers do not need a second import for the same type.
pub use statechan_chain::DisputeRecord;

/// Errors surfaced by the store port.
pub mod errors;
/// Reference in-memory `Store` adapter.
pub mod memory;

pub use memory::InMemoryStore;

/// External collaborator ("Store"). Every method here maps
/// onto exactly one named operation in .
#[async_trait]
pub trait Store: Send + Sync {
	/// Loads a channel by its deterministic address.
	async fn get_channel_state(&self, channel_address: Address) -> Result<Option<Channel>, StoreError>;

	/// Loads a channel by its participants and chain, used by the Transfer
	/// Builder and forwarding engine to resolve "the channel with this
	/// counterparty" without knowing its address up front.
	async fn get_channel_state_by_participants(
		&self,
		alice: Address,
		bob: Address,
		chain_id: ChainId,
	) -> Result<Option<Channel>, StoreError>;

	/// Loads the channel in which `router` and `counterparty` are
	/// participants on `chain_id`, where `counterparty` is known only by
	/// its messaging identifier rather than its on-chain address. Used by
	/// the forwarding engine to resolve a `PathHop`'s `recipient` to a
	/// channel ("resolve the recipient channel by (router, recipient,
	/// recipientChainId)").
	async fn get_channel_state_by_counterparty_identifier(
		&self,
		router: Address,
		counterparty: &Identifier,
		chain_id: ChainId,
	) -> Result<Option<Channel>, StoreError>;

	/// Returns every currently-active (unresolved) transfer for a channel.
	async fn get_active_transfers(&self, channel_address: Address) -> Result<Vec<Transfer>, StoreError>;

	/// Loads a single transfer by id, active or resolved.
	async fn get_transfer_state(&self, transfer_id: TransferId) -> Result<Option<Transfer>, StoreError>;

	/// Returns the transfers (sender-side and recipient-side) sharing a
	/// routed payment's `routingId`, used by the forwarding engine's
	/// resolution path to find the sender-side transfer by `routingId`.
	async fn get_transfers_by_routing_id(
		&self,
		routing_id: RoutingId,
	) -> Result<Vec<Transfer>, StoreError>;

	/// Atomically persists a channel and the delta to its active-transfer
	/// set (step 4 "persist `{channel, activeTransfers
	/// delta}` atomically").
	async fn save_channel_state_and_transfers(
		&self,
		channel: Channel,
		transfers: Vec<Transfer>,
	) -> Result<(), StoreError>;

	/// Returns queued rows for `channel_address` with the given `status`,
	/// in insertion order ("Check-In Handler": "drained in
	/// insertion order").
	async fn get_queued_updates(
		&self,
		channel_address: Address,
		status: QueuedUpdateStatus,
	) -> Result<Vec<QueuedRouterUpdate>, StoreError>;

	/// Inserts a new queued row with status `PENDING`, returning its id.
	async fn queue_update(&self, update: QueuedRouterUpdate) -> Result<String, StoreError>;

	/// Compare-and-swap status transition for a queued row (	/// "status transitions … are CAS"). `last_failure_reason` is attached
	/// on a transition to `FAILED`.
	async fn set_update_status(
		&self,
		id: &str,
		status: QueuedUpdateStatus,
		last_failure_reason: Option<String>,
	) -> Result<(), StoreError>;

	/// Records an on-chain dispute observation for a channel. Dispute
	/// adjudication logic itself is out of scope; only the observation is
	/// recorded.
	async fn save_channel_dispute(&self, dispute: DisputeRecord) -> Result<(), StoreError>;
}
