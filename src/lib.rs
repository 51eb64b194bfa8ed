//! # statechan
//!
//! A bidirectional off-chain payment-channel engine and routing node:
//! doubly-signed nonce-ordered channel updates, conditional transfers over
//! pluggable transfer definitions, and a router that forwards, collateral-
//! checks, and cross-asset/cross-chain swaps between two channels.
//!
//! ## Quickstart: `prelude`
//!
//! A prelude is provided which imports the most commonly used types. Use
//! this when you want to quickly bootstrap a new project.
//!
//! ```rust
//! use statechan::prelude::*;
//! ```
//!
//! ## Modules
//!
//! The following paragraphs are a quick explanation of each crate in
//! ascending order of abstraction.
//!
//! ### `statechan_primitives`
//!
//! Shared types (`ChainId`, `Identifier`, `Nonce`, `Channel`, `Transfer`,
//! `Update`, ...) and the EIP-191 hashing helpers every other crate builds
//! on.
//!
//! ### `statechan_chain`, `statechan_store`, `statechan_lock`,
//! ### `statechan_messaging`, `statechan_signer`
//!
//! The external ports the Update Engine depends on (chain reads, channel
//! persistence, the distributed lock, protocol-message transport, and
//! signing), each with a trait plus an in-memory reference implementation.
//!
//! ### `statechan_protocol`
//!
//! The Update Engine state machine and the Transfer Builder that turns
//! user-facing transfer parameters into signed updates.
//!
//! ### `statechan_forwarding`
//!
//! The Forwarding Engine: routes conditional transfers between a router's
//! two channels, enforces collateralization, and runs the Check-In
//! Handler.
//!
//! ### `statechan_rpc`
//!
//! The JSON-RPC surface exposing the Update Engine and Transfer Builder as
//! `chan_`-prefixed methods.
//!
//! ### `statechan_macros`
//!
//! Derive macros shared across the workspace (`IntoEvent`).
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[doc(inline)]
pub use statechan_chain;
#[doc(inline)]
pub use statechan_forwarding;
#[doc(inline)]
pub use statechan_lock;
#[doc(inline)]
pub use statechan_macros;
#[doc(inline)]
pub use statechan_messaging;
#[doc(inline)]
pub use statechan_primitives;
#[doc(inline)]
pub use statechan_protocol;
#[doc(inline)]
pub use statechan_rpc;
#[doc(inline)]
pub use statechan_signer;
#[doc(inline)]
pub use statechan_store;

/// Easy imports of frequently used type definitions and traits.
#[doc(hidden)]
#[allow(unknown_lints, ambiguous_glob_reexports)]
pub mod prelude {
	pub use statechan_macros::*;
	pub use statechan_primitives::*;
}

// For macro expansions only, not public API.
#[doc(hidden)]
#[allow(unused_extern_crates)]
extern crate self as statechan;
