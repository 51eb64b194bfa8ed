//! Errors surfaced by the Forwarding Engine. Grounded on
//! `raiden_api::errors::ApiError`: one flat enum of named failure modes
//! rather than a single `msg: String`, each carrying enough context to
//! decide whether the sender-side transfer needs cancelling.
use statechan_primitives::types::{
	Address,
	TransferId,
};
use thiserror::Error;

use crate::swap::SwapError;

/// What happened to the sender-side transfer when a forwarding step failed
/// partway through ("Cancellation": "report
/// `senderTransferCancellation` as `executed` or `enqueued`").
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CancellationOutcome {
	/// The cancelling `resolve` was submitted and accepted immediately.
	Executed,
	/// The cancelling `resolve` could not be submitted synchronously (the
	/// same reasons a forward can't be: offline recipient engine, a
	/// transient error) and was queued for the Check-In Handler instead.
	Enqueued,
}

#[derive(Error, Debug, Clone)]
pub enum ForwardingError {
	#[error("transfer meta is missing or malformed routing information: {0:?}")]
	InvalidForwardingInfo { transfer_id: TransferId },

	#[error("sender channel `{channel_address:#x}` not found")]
	SenderChannelNotFound { channel_address: Address },

	#[error("no channel found with router {router:#x} and the routed recipient, sender transfer cancellation {cancellation:?}")]
	RecipientChannelNotFound {
		router: Address,
		cancellation: CancellationOutcome,
	},

	#[error("unable to calculate swapped amount: {source}, sender transfer cancellation {cancellation:?}")]
	UnableToCalculateSwap {
		#[source]
		source: SwapError,
		cancellation: CancellationOutcome,
	},

	#[error("recipient channel has insufficient collateral, sender transfer cancellation {cancellation:?}")]
	InsufficientCollateral { cancellation: CancellationOutcome },

	#[error("recipient requires online delivery and did not answer the liveness probe in time, sender transfer cancellation {cancellation:?}")]
	RecipientOffline { cancellation: CancellationOutcome },

	#[error("no sender-side transfer found for routingId `{0:#x}`")]
	RoutingIdNotFound(statechan_primitives::types::RoutingId),

	#[error("protocol engine rejected the forwarding step: {0}")]
	Engine(#[from] statechan_protocol::errors::EngineError),

	#[error("store error: {0}")]
	Store(#[from] statechan_store::errors::StoreError),

	#[error("messaging error: {0}")]
	Messaging(#[from] statechan_messaging::MessagingError),
}

impl ForwardingError {
	/// True for the one kind the Check-In Handler leaves `PENDING` instead
	/// of marking `FAILED` ("Timeout", mirrored here for the
	/// queue's own retry classification).
	pub fn is_timeout(&self) -> bool {
		match self {
			ForwardingError::Engine(e) => e.is_timeout(),
			_ => false,
		}
	}
}
