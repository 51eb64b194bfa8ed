#![warn(clippy::missing_docs_in_private_items)]

use derive_more::Display;
use serde::{
	Deserialize,
	Serialize,
	Serializer,
};
pub use web3::types::{
	Address,
	Bytes,
	H160,
	H256,
	U256,
};

use crate::{
	deserializers::u256_from_str,
	serializers::u256_to_str,
	traits::Checksum,
};

/// Alias type for a 256-bit balance-preserving hash (see `hashing::hash_balance_data`).
pub type BalanceHash = H256;

/// Alias type for an asset (token) identifier. Assets are addressed the same
/// way across chains; cross-chain/cross-asset equivalence is resolved by the
/// forwarding engine's swap table, not by the type system.
pub type AssetId = Address;

/// Alias type for a signature, encoded as `r || s || v`.
pub type Signature = Bytes;

/// Alias type for a 256-bit merkle root over the active-transfer set.
pub type MerkleRoot = H256;

/// Alias type for a deterministic transfer identifier.
pub type TransferId = H256;

/// Alias type for a globally unique routed-payment identifier.
pub type RoutingId = H256;

/// Alias type for an address of a registered transfer-definition contract.
pub type TransferDefinitionAddress = Address;

/// Alias type for a block number, used for timeout bookkeeping only (this
/// spec does not itself read the chain for block numbers; the chain reader
/// port supplies them).
pub type BlockNumber = u64;

/// Alias type for a relative block timeout.
pub type BlockTimeout = u64;

/// A chain identifier. Deliberately a bare numeric newtype rather than an
/// enum of named networks: the forwarding engine must route between
/// arbitrary chain pairs, so there is no privileged "home" network.
#[derive(Copy, Clone, Display, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct ChainId(pub u64);

impl From<u64> for ChainId {
	fn from(value: u64) -> Self {
		Self(value)
	}
}

impl From<ChainId> for u64 {
	fn from(value: ChainId) -> Self {
		value.0
	}
}

impl<'de> Deserialize<'de> for ChainId {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let value = serde_json::Value::deserialize(deserializer)?;
		if let Some(n) = value.as_u64() {
			return Ok(ChainId(n))
		}
		value
			.as_str()
			.and_then(|s| s.parse::<u64>().ok())
			.map(ChainId)
			.ok_or_else(|| serde::de::Error::custom("could not parse ChainId"))
	}
}

impl Serialize for ChainId {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.0.to_string())
	}
}

/// A monotonically-increasing per-channel update counter. `setup` produces
/// nonce 1; every subsequent applied update increments by exactly 1.
#[derive(
	Copy, Clone, Display, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Nonce(#[serde(deserialize_with = "u256_from_str", serialize_with = "u256_to_str")] pub U256);

impl Nonce {
	/// The nonce a `setup` update initializes a channel to.
	pub fn initial() -> Self {
		Self(U256::one())
	}

	/// Returns the next nonce in sequence (`self + 1`).
	pub fn next(&self) -> Self {
		Self(self.0 + U256::one())
	}

	/// True if `other` is exactly one greater than `self`.
	pub fn is_successor(&self, other: &Nonce) -> bool {
		other.0 == self.0 + U256::one()
	}
}

impl From<u64> for Nonce {
	fn from(value: u64) -> Self {
		Self(U256::from(value))
	}
}

/// The channel's canonical on-chain-derived identifier: deterministic from
/// `{alice, bob, chain_id, factory}` via the chain reader's Create2
/// derivation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalChannelId {
	pub chain_id: ChainId,
	pub factory: Address,
	pub channel_address: Address,
}

impl ToString for CanonicalChannelId {
	fn to_string(&self) -> String {
		format!(
			"ChainId: {}, Factory: {}, ChannelAddress: {}",
			self.chain_id,
			self.factory.checksum(),
			self.channel_address.checksum()
		)
	}
}

/// A counterparty identifier in the off-chain messaging layer. May differ
/// from the on-chain signer address (e.g. a pubkey or a messaging-network
/// user id); the engine never assumes the two coincide.
#[derive(Clone, Debug, Default, Display, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Identifier(pub String);

impl From<&str> for Identifier {
	fn from(value: &str) -> Self {
		Self(value.to_owned())
	}
}

impl From<String> for Identifier {
	fn from(value: String) -> Self {
		Self(value)
	}
}

/// Per-asset, per-party balance vector carried on every signed update.
/// Index 0 is always Alice's balance, index 1 Bob's.
pub type BalanceVector = [U256; 2];

/// A point in a routed payment's path: the next hop's identifier and the
/// asset/chain it should be delivered in, if a swap is required.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathHop {
	pub recipient: Identifier,
	pub recipient_asset_id: Option<AssetId>,
	pub recipient_chain_id: Option<ChainId>,
}

/// Routing metadata carried in a transfer's opaque `meta` map, per
/// `RoutingMeta`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingMeta {
	pub routing_id: RoutingId,
	pub path: Vec<PathHop>,
	#[serde(default)]
	pub require_online: bool,
	#[serde(default)]
	pub sender_identifier: Option<Identifier>,
}

/// Distinguishes the two kinds of row the forwarding engine's queue holds,
/// per `QueuedRouterUpdate`.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueuedUpdateType {
	TransferCreation,
	TransferResolution,
}

/// Status of a queued row (`QueuedRouterUpdate`). Transitions
/// `Pending -> Processing -> {Complete, Failed, Pending}` are
/// compare-and-swap at the store.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueuedUpdateStatus {
	Pending,
	Processing,
	Complete,
	Failed,
	Unverified,
}

/// A forwarding action persisted because it could not (yet) be executed
/// synchronously: an offline recipient, a transient resolve failure, or a
/// check-in replay (`QueuedRouterUpdate`, retried by the Check-In
/// Handler). Shared between `statechan-store` (which persists it) and
/// `statechan-forwarding` (which produces and drains it), so it lives here
/// rather than in either crate to avoid a dependency cycle between them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueuedRouterUpdate {
	pub id: String,
	pub channel_address: Address,
	#[serde(rename = "type")]
	pub update_type: QueuedUpdateType,
	/// The exact transfer parameters the queued action replays, opaque to
	/// the store.
	pub payload: serde_json::Value,
	pub status: QueuedUpdateStatus,
	pub created_at: u64,
	pub last_failure_reason: Option<String>,
}
