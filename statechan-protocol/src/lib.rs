//! The Update Engine and Transfer Builder: the off-chain channel-update
//! sync algorithm and the layer that turns user-facing transfer
//! parameters into it.
pub mod builder;
pub mod engine;
pub mod errors;
pub mod events;
pub mod merkle;

pub use builder::{
	ConditionalTransferParams,
	ResolveConditionParams,
	WithdrawParams,
};
pub use engine::{
	CreateParams,
	Engine,
	EngineMessageHandler,
};
pub use errors::{
	BuilderError,
	EngineError,
	ErrorContext,
};
pub use events::{
	Event,
	EventBus,
};

#[cfg(test)]
mod tests;
