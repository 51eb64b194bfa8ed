//! The RPC Surface: a single JSON-RPC 2.0 entry point with
//! `chan_`-prefixed methods, each returning a tagged `ok|fail` envelope.
//! Built on `jsonrpsee` the way the `chronx-rpc` crate builds its own
//! surface, rather than a hand-rolled dispatcher: schema validation and
//! method routing are what the `#[rpc(server)]` macro already does.
pub mod api;
pub mod envelope;
pub mod server;
pub mod types;

pub use api::ChanApiServer;
pub use envelope::{
	RpcEnvelope,
	RpcErrorContext,
	RpcFailure,
};
pub use server::{
	RpcServer,
	RpcServerState,
};
pub use types::CreateOutcome;

#[cfg(test)]
mod tests;
