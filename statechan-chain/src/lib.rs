//! Chain reader port ("Chain Reader") and registered transfer-definition
//! resolvers ("Transfer Definition"). The on-chain adjudicator and
//! channel-factory contracts are out of scope for this crate; only the
//! read/resolve contracts the core depends on live here, alongside a
//! reference in-memory adapter for tests and the default node binary.

/// Registered transfer-definition semantics (hash lock, withdraw).
pub mod definitions;
/// On-chain dispute record.
pub mod dispute;
/// Errors surfaced by the chain reader port and definition resolution.
pub mod errors;
/// Reference in-memory `ChainReader` adapter.
pub mod memory;
/// The `ChainReader` port trait.
pub mod reader;
/// Lookup from transfer type to registered definition.
pub mod registry;

pub use definitions::{
	HashlockTransferDefinition,
	TransferDefinition,
	WithdrawTransferDefinition,
};
pub use dispute::DisputeRecord;
pub use memory::InMemoryChainReader;
pub use reader::ChainReader;
pub use registry::TransferDefinitionRegistry;
