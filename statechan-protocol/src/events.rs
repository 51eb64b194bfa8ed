//! The engine's event bus ("Event fanout"): a typed
//! multi-producer/multi-consumer channel, subscribers filter by matching on
//! the `Event` variant rather than any dynamic reflection. Grounded on
//! `raiden_state_machine::types::Event` plus `#[derive(IntoEvent)]`,
//! narrowed to a `tokio::sync::broadcast` channel since the Update Engine
//! (unlike a pure reducer) owns its own runtime loop rather than draining
//! an external effects queue.
use statechan_primitives::{
	state::{
		Transfer,
		Update,
	},
	types::{
		Address,
		RoutingId,
	},
};
use statechan_macros::IntoEvent;

/// Emitted once a channel update is applied and persisted.
#[derive(Clone, Debug, IntoEvent)]
pub struct ChannelUpdateEvent {
	pub channel_address: Address,
	pub update: Update,
}

/// Emitted when a `create` update commits a new conditional transfer
/// (`CONDITIONAL_TRANSFER_CREATED`); this is the Forwarding
/// Engine's trigger.
#[derive(Clone, Debug, IntoEvent)]
pub struct ConditionalTransferCreated {
	pub channel_address: Address,
	pub transfer: Transfer,
}

/// Emitted when a `resolve` update attaches a resolver to a transfer
/// (`CONDITIONAL_TRANSFER_RESOLVED`); this is the Forwarding
/// Engine's resolution-path trigger.
#[derive(Clone, Debug, IntoEvent)]
pub struct ConditionalTransferResolved {
	pub channel_address: Address,
	pub transfer: Transfer,
}

/// Emitted when a liveness signal arrives for a channel; triggers the
/// Check-In Handler's queue drain.
#[derive(Clone, Debug, IntoEvent)]
pub struct IsAlive {
	pub channel_address: Address,
}

/// Emitted when a restore procedure completes successfully.
#[derive(Clone, Debug, IntoEvent)]
pub struct RestoreStateEvent {
	pub channel_address: Address,
	pub nonce: statechan_primitives::types::Nonce,
}

/// Emitted once an on-chain withdrawal's dual signature is reconciled with
/// the withdraw transfer definition (/// `WITHDRAWAL_RECONCILED_EVENT`).
#[derive(Clone, Debug, IntoEvent)]
pub struct WithdrawalReconciledEvent {
	pub channel_address: Address,
	pub routing_id: Option<RoutingId>,
}

/// The engine's typed event, one variant per "Event fanout"
/// member. Dispatch over this enum is exhaustive by construction.
#[derive(Clone, Debug)]
pub enum Event {
	ChannelUpdateEvent(ChannelUpdateEvent),
	ConditionalTransferCreated(ConditionalTransferCreated),
	ConditionalTransferResolved(ConditionalTransferResolved),
	IsAlive(IsAlive),
	RestoreStateEvent(RestoreStateEvent),
	WithdrawalReconciledEvent(WithdrawalReconciledEvent),
}

/// Typed multi-producer/multi-consumer event bus. Subscribers receive
/// every event and filter by matching the variant they care about.
pub type EventBus = tokio::sync::broadcast::Sender<Event>;

/// Builds a fresh event bus with the given channel capacity.
pub fn new_event_bus(capacity: usize) -> EventBus {
	tokio::sync::broadcast::channel(capacity).0
}
