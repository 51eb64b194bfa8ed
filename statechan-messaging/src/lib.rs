//! Messaging transport port ("Messaging"): a request/response channel and
//! a named-inbox reply mechanism. The wire payload itself (`{update,
//! previousUpdate?}`) is owned by `statechan-protocol`; this crate only
//! moves opaque JSON between identifiers, so it carries no dependency on
//! the protocol's update types, the same separation `raiden_network_
//! transport` (moves bytes over Matrix) draws from `raiden_network_
//! messages` (defines what the bytes mean).

use std::{
	sync::Arc,
	time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;
use statechan_primitives::types::{
	Address,
	AssetId,
	Identifier,
	U256,
};
use thiserror::Error;

/// Errors surfaced by the messaging port.
#[derive(Error, Debug, Clone)]
pub enum MessagingError {
	#[error("no handler registered for identifier `{0}`")]
	NoHandler(Identifier),
	#[error("timed out waiting for a reply on inbox `{0}`")]
	Timeout(String),
	#[error("reply inbox `{0}` was never registered")]
	UnknownInbox(String),
	#[error("transport error: `{0}`")]
	Transport(String),
}

/// Handles an inbound message delivered to a locally-owned identifier.
#[async_trait]
pub trait ProtocolMessageHandler: Send + Sync {
	/// `message` is the opaque wire payload; `from` is the sender's
	/// identifier; `reply_inbox`, if present, is where a response should be
	/// sent via `Messaging::reply`.
	async fn handle(&self, message: Value, from: Identifier, reply_inbox: Option<String>);
}

/// External collaborator ("Transport"). Required operations map directly
/// onto the named protocol sends, plus the generic request/reply pair
/// (`reply`/`await_reply`) that backs
/// `send_restore_state_message`'s "transmits … releases the lock only
/// after an acknowledgment" exchange and the Update Engine's outbound
/// protocol round-trip.
#[async_trait]
pub trait Messaging: Send + Sync {
	/// Registers the handler invoked for messages addressed to
	/// `identifier`.
	async fn on_receive_protocol_message(
		&self,
		identifier: &Identifier,
		handler: Arc<dyn ProtocolMessageHandler>,
	);

	/// Sends a protocol message (an update exchange, a schema-validated RPC
	/// forward, etc). If `reply_inbox` is `Some`, the recipient is expected
	/// to eventually call `reply` with that inbox name.
	async fn send_protocol_message(
		&self,
		from: &Identifier,
		to: &Identifier,
		payload: Value,
		reply_inbox: Option<String>,
	) -> Result<(), MessagingError>;

	/// Delivers `payload` to whoever is awaiting `inbox` via `await_reply`.
	async fn reply(&self, inbox: &str, payload: Value) -> Result<(), MessagingError>;

	/// Blocks until `reply` is called for `inbox`, or `timeout` elapses.
	async fn await_reply(&self, inbox: &str, timeout: Duration) -> Result<Value, MessagingError>;

	/// Publishes a liveness signal for `channel_address`, triggering the
	/// recipient's Check-In Handler to drain queued updates.
	async fn send_is_alive_message(
		&self,
		from: &Identifier,
		to: &Identifier,
		channel_address: Address,
	) -> Result<(), MessagingError>;

	/// Sends a restore-state request/response payload and awaits the
	/// counterparty's reply ("Restore-State Procedure").
	async fn send_restore_state_message(
		&self,
		from: &Identifier,
		to: &Identifier,
		payload: Value,
	) -> Result<Value, MessagingError>;

	/// Announces a freshly-derived channel to its counterparty before the
	/// first `setup` update is exchanged.
	async fn send_setup_message(
		&self,
		from: &Identifier,
		to: &Identifier,
		payload: Value,
	) -> Result<(), MessagingError>;

	/// Requests the counterparty collateralize `asset_id` for an upcoming
	/// forward (step 6a).
	async fn send_request_collateral_message(
		&self,
		from: &Identifier,
		to: &Identifier,
		channel_address: Address,
		asset_id: AssetId,
		amount: U256,
	) -> Result<(), MessagingError>;
}

/// Reference in-memory `Messaging` adapter: handlers are invoked in-process
/// (no real network hop) and reply inboxes are `tokio::sync::oneshot`
/// channels. Not a production transport (scopes messaging out
/// as an external collaborator) — exists for tests and the default node
/// binary wiring two in-process nodes together.
pub mod memory;
pub use memory::InMemoryMessaging;
