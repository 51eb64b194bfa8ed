#![warn(clippy::missing_docs_in_private_items)]

//! Primitives crate defining the core types shared by every statechan crate:
//! addresses, identifiers, hashing, merkle commitments and the small set of
//! numeric/serde helpers the wire format needs.

/// Base constants.
pub mod constants;
/// Base deserializers for numeric/hash wire types.
pub mod deserializers;
/// Transfer-id, balance-hash and channel-address hashing.
pub mod hashing;
/// Base trait implementations.
pub mod impls;
/// Merkle commitment over the set of active transfers.
pub mod merkle;
/// Base serializers for numeric/hash wire types.
pub mod serializers;
/// The `Channel`/`Transfer`/`Update` data model, shared between
/// `statechan-store` and `statechan-protocol` to avoid a dependency cycle
/// between the two (the store persists these types; the engine produces
/// and validates them).
pub mod state;
/// Base traits.
pub mod traits;
/// Base types, some of which are aliases from rust-web3.
pub mod types;
