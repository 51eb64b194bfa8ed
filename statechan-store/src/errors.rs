use thiserror::Error;

/// Errors surfaced by the store port ("External": "errors
/// surfaced from signer, chain, or store; wrapped with context and
/// propagated").
#[derive(Error, Debug, Clone)]
pub enum StoreError {
	#[error("channel `{0}` not found")]
	ChannelNotFound(String),
	#[error("transfer `{0}` not found")]
	TransferNotFound(String),
	#[error("queued update `{0}` not found")]
	QueuedUpdateNotFound(String),
	#[error("backend error: `{0}`")]
	Backend(String),
}
