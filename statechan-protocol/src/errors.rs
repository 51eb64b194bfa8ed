use statechan_primitives::types::{
	Address,
	RoutingId,
	TransferId,
};
use thiserror::Error;

/// Context attached to every `EngineError`, mirroring /// "Propagation": `{kind, context: {channelAddress, transferId,
/// nodeError?, ...}}`.
#[derive(Clone, Debug, Default)]
pub struct ErrorContext {
	pub channel_address: Option<Address>,
	pub transfer_id: Option<TransferId>,
	pub routing_id: Option<RoutingId>,
	pub node_error: Option<String>,
}

impl ErrorContext {
	pub fn channel(channel_address: Address) -> Self {
		Self { channel_address: Some(channel_address), ..Default::default() }
	}

	pub fn with_transfer(mut self, transfer_id: TransferId) -> Self {
		self.transfer_id = Some(transfer_id);
		self
	}

	pub fn with_routing_id(mut self, routing_id: RoutingId) -> Self {
		self.routing_id = Some(routing_id);
		self
	}
}

/// The Update Engine's error taxonomy, kinds only. One flat enum rather
/// than a single `StateTransitionError { msg: String }`, because callers
/// here must branch on `BadSignatures` vs `StaleUpdate` vs `Timeout`.
/// See `DESIGN.md`.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
	#[error("validation failed: {0:?}")]
	Validation(ErrorContext),
	#[error("channel not found: {0:?}")]
	ChannelNotFound(ErrorContext),
	#[error("transfer not found: {0:?}")]
	TransferNotFound(ErrorContext),
	#[error("counterparty is stale: {0:?}")]
	StaleUpdate(ErrorContext),
	#[error("restore needed: {0:?}")]
	RestoreNeeded(ErrorContext),
	#[error("bad signatures: {0:?}")]
	BadSignatures(ErrorContext),
	#[error("timed out: {0:?}")]
	Timeout(ErrorContext),
	#[error("unregistered transfer type: {0:?}")]
	InvalidTransferType(ErrorContext),
	#[error("channel is disputed: {0:?}")]
	Dispute(ErrorContext),
	#[error("external dependency failed: {0:?}")]
	External(ErrorContext),
}

impl EngineError {
	/// The context every variant carries, for logging and RPC error
	/// envelopes.
	pub fn context(&self) -> &ErrorContext {
		match self {
			EngineError::Validation(c)
			| EngineError::ChannelNotFound(c)
			| EngineError::TransferNotFound(c)
			| EngineError::StaleUpdate(c)
			| EngineError::RestoreNeeded(c)
			| EngineError::BadSignatures(c)
			| EngineError::Timeout(c)
			| EngineError::InvalidTransferType(c)
			| EngineError::Dispute(c)
			| EngineError::External(c) => c,
		}
	}

	/// True for the one kind the outbound deposit retry loop is allowed to
	/// retry (the "Deposit Race" `BadSignatures` case).
	pub fn is_retryable_bad_signatures(&self) -> bool {
		matches!(self, EngineError::BadSignatures(_))
	}

	/// True for the kind a queued row stays `PENDING` for rather than
	/// being marked `FAILED` ("Timeout").
	pub fn is_timeout(&self) -> bool {
		matches!(self, EngineError::Timeout(_))
	}
}

/// Errors surfaced by the Transfer Builder.
#[derive(Error, Debug, Clone)]
pub enum BuilderError {
	#[error("unregistered transfer type `{0}`")]
	InvalidTransferType(String),
	#[error("engine rejected the built update: {0}")]
	Engine(#[from] EngineError),
	#[error("encryption of transfer secret failed: {0}")]
	Encryption(String),
}
