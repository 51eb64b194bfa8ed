//! The wire-level result envelope (point 3): every `chan_`
//! method returns a tagged `{ok: T} | {fail: {message, context}}` value
//! rather than overloading JSON-RPC 2.0's own success/error framing, so a
//! failure still carries the full `ErrorContext` the engine attached to it
//! ("Propagation"), not just a flat code/message pair.
use serde::{
	Deserialize,
	Serialize,
};
use statechan_primitives::types::{
	Address,
	RoutingId,
	TransferId,
};
use statechan_protocol::errors::{
	BuilderError,
	ErrorContext,
	EngineError,
};

/// `{kind, context}`, rendered for the wire with addresses
/// and ids as `0x`-hex strings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RpcErrorContext {
	pub channel_address: Option<String>,
	pub transfer_id: Option<String>,
	pub routing_id: Option<String>,
	pub node_error: Option<String>,
}

impl From<&ErrorContext> for RpcErrorContext {
	fn from(context: &ErrorContext) -> Self {
		Self {
			channel_address: context.channel_address.map(|a: Address| format!("{:#x}", a)),
			transfer_id: context.transfer_id.map(|t: TransferId| format!("{:#x}", t)),
			routing_id: context.routing_id.map(|r: RoutingId| format!("{:#x}", r)),
			node_error: context.node_error.clone(),
		}
	}
}

/// "errors going over the wire are serialized as
/// `{message, context}`".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcFailure {
	pub message: String,
	pub context: RpcErrorContext,
}

impl From<&EngineError> for RpcFailure {
	fn from(error: &EngineError) -> Self {
		Self { message: error.to_string(), context: error.context().into() }
	}
}

impl From<&BuilderError> for RpcFailure {
	fn from(error: &BuilderError) -> Self {
		match error {
			BuilderError::Engine(e) => e.into(),
			BuilderError::InvalidTransferType(_) | BuilderError::Encryption(_) => {
				Self { message: error.to_string(), context: RpcErrorContext::default() }
			},
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcEnvelope<T> {
	Ok(T),
	Fail(RpcFailure),
}

/// Lifts an `EngineError`-producing result into the wire envelope.
pub fn envelope<T>(result: Result<T, EngineError>) -> RpcEnvelope<T> {
	match result {
		Ok(v) => RpcEnvelope::Ok(v),
		Err(e) => RpcEnvelope::Fail((&e).into()),
	}
}

/// Lifts a `BuilderError`-producing result into the wire envelope.
pub fn builder_envelope<T>(result: Result<T, BuilderError>) -> RpcEnvelope<T> {
	match result {
		Ok(v) => RpcEnvelope::Ok(v),
		Err(e) => RpcEnvelope::Fail((&e).into()),
	}
}
