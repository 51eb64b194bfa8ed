use thiserror::Error;

/// Errors surfaced by the chain reader port.
#[derive(Error, Debug, Clone)]
pub enum ChainReaderError {
	#[error("chain `{0}` is not configured")]
	UnknownChain(u64),
	#[error("channel `{0:?}` has no on-chain record")]
	ChannelNotFound(web3::types::Address),
	#[error("on-chain call failed: `{0}`")]
	Rpc(String),
}

/// Errors surfaced while encoding or resolving a transfer against its
/// registered definition.
#[derive(Error, Debug, Clone)]
pub enum DefinitionError {
	#[error("transfer type `{0}` is not registered")]
	NotRegistered(String),
	#[error("initial state invalid for definition `{0}`: `{1}`")]
	InvalidInitialState(String, String),
	#[error("resolver invalid for definition `{0}`")]
	InvalidResolver(String),
}
