//! The Forwarding Engine: routes conditional transfers between a router's
//! channels, propagates resolution, and drains the queued-updates table on
//! liveness signals. Builds on `statechan-protocol`'s Update Engine and
//! event bus the way `raiden_transfer`'s mediator logic builds on
//! `raiden_state_machine`: this crate owns no channel state of its own,
//! only the forwarding decision.
pub mod config;
pub mod engine;
pub mod errors;
pub mod queue;
pub mod swap;

pub use config::{
	ForwardingConfig,
	RebalanceProfile,
};
pub use engine::{
	ForwardOutcome,
	ForwardingEngine,
	QueuedCreateParams,
};
pub use errors::{
	CancellationOutcome,
	ForwardingError,
};
pub use swap::{
	PricingTable,
	SwapError,
	SwapRate,
};

#[cfg(test)]
mod tests;
