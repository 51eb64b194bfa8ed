//! Core data model: `Channel`, `Transfer`, `Update`.
use std::collections::HashMap;

use serde::{
	Deserialize,
	Serialize,
};
use crate::types::{
	AssetId,
	BalanceVector,
	BlockTimeout,
	CanonicalChannelId,
	ChainId,
	H256,
	Identifier,
	MerkleRoot,
	Nonce,
	Signature,
	TransferDefinitionAddress,
	TransferId,
};
use web3::types::Address;

/// Everything a channel needs to address its on-chain anchor: the factory
/// that deployed it, the registry of valid transfer definitions, and the
/// provider URL the Chain Reader uses for this channel's chain.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkContext {
	pub factory: Address,
	pub transfer_registry_address: Address,
	pub provider_url: String,
}

/// A two-party off-chain state machine anchored by an on-chain multisig
/// (`Channel`, GLOSSARY).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
	pub channel_address: CanonicalChannelId,
	pub alice_identifier: Identifier,
	pub bob_identifier: Identifier,
	pub alice: Address,
	pub bob: Address,
	pub chain_id: ChainId,
	pub network_context: NetworkContext,
	pub nonce: Nonce,
	pub latest_update: Option<Update>,
	/// Per-asset two-party balance vector; index 0 is Alice's balance.
	pub balances: HashMap<AssetId, BalanceVector>,
	/// Per-asset cumulative on-chain deposits reconciled for Alice.
	pub processed_deposits_alice: HashMap<AssetId, u128>,
	/// Per-asset cumulative on-chain deposits reconciled for Bob.
	pub processed_deposits_bob: HashMap<AssetId, u128>,
	pub asset_ids: Vec<AssetId>,
	pub merkle_root: MerkleRoot,
	pub timeout: BlockTimeout,
	pub in_dispute: bool,
}

impl Channel {
	/// Balance vector for `asset_id`, defaulting to `[0, 0]` for an asset
	/// the channel has not yet seen a deposit for.
	pub fn balance_for(&self, asset_id: &AssetId) -> BalanceVector {
		self.balances.get(asset_id).copied().unwrap_or_default()
	}

	/// A channel becomes terminal for the protocol once disputed
	/// ("State Transitions"): all updates are rejected
	/// except bookkeeping writes the Store performs directly.
	pub fn is_terminal(&self) -> bool {
		self.in_dispute
	}

	/// The identifier (`alice`/`bob`) and party index of `address`, or
	/// `None` if it is not a participant.
	pub fn party_index_of(&self, address: Address) -> Option<usize> {
		if address == self.alice {
			Some(0)
		} else if address == self.bob {
			Some(1)
		} else {
			None
		}
	}
}

/// A conditional payment whose resolution is computed by a registered
/// predicate (`Transfer`, GLOSSARY).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
	pub transfer_id: TransferId,
	pub channel_address: CanonicalChannelId,
	pub initiator: Address,
	pub responder: Address,
	pub transfer_definition: TransferDefinitionAddress,
	pub transfer_timeout: BlockTimeout,
	pub initial_state_hash: H256,
	/// The transfer-definition-encoded initial state, canonically encoded
	/// by `TransferDefinition::encode_initial_state`.
	pub encoded_initial_state: Vec<u8>,
	/// Present iff the transfer has been resolved (	/// "Lifecycle").
	pub transfer_resolver: Option<Vec<u8>>,
	pub balance: BalanceVector,
	pub asset_id: AssetId,
	pub chain_id: ChainId,
	/// Opaque routing/application metadata; decoded as `RoutingMeta` by the
	/// forwarding engine.
	pub meta: serde_json::Value,
	pub in_dispute: bool,
}

impl Transfer {
	/// A transfer is active until a `resolve` update attaches a resolver
	/// ("Lifecycle").
	pub fn is_active(&self) -> bool {
		self.transfer_resolver.is_none()
	}
}

/// Variant-specific fields of an `Update`, tagged so the wire payload
/// self-describes its `type`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UpdateDetails {
	Setup { timeout: BlockTimeout, network_context: NetworkContext },
	Deposit { total_deposits_alice: u128, total_deposits_bob: u128 },
	Create {
		transfer_id: TransferId,
		transfer_definition: TransferDefinitionAddress,
		initial_state: serde_json::Value,
		transfer_timeout: BlockTimeout,
		encoded_state: Vec<u8>,
		merkle_proof_data: Vec<H256>,
		meta: serde_json::Value,
	},
	Resolve {
		transfer_id: TransferId,
		resolver: Vec<u8>,
		merkle_root: MerkleRoot,
		meta: serde_json::Value,
	},
}

impl UpdateDetails {
	/// The bare `UpdateType` this variant carries, used for error context
	/// and logging without destructuring the whole payload.
	pub fn kind(&self) -> &'static str {
		match self {
			UpdateDetails::Setup { .. } => "setup",
			UpdateDetails::Deposit { .. } => "deposit",
			UpdateDetails::Create { .. } => "create",
			UpdateDetails::Resolve { .. } => "resolve",
		}
	}
}

/// A signed state transition on a channel (`Update`,
/// GLOSSARY). The wire payload is `{update, previousUpdate?}` per
/// .
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Update {
	pub channel_address: CanonicalChannelId,
	pub from_identifier: Identifier,
	pub to_identifier: Identifier,
	pub nonce: Nonce,
	/// Post-update two-party balance vector for `asset_id`.
	pub balance: BalanceVector,
	pub asset_id: AssetId,
	pub details: UpdateDetails,
	pub alice_signature: Option<Signature>,
	pub bob_signature: Option<Signature>,
}

impl Update {
	/// Bytes the two signatures are computed over: everything in the
	/// update except the signatures themselves, so attaching a signature
	/// never changes what was signed.
	pub fn signing_payload(&self) -> Vec<u8> {
		let mut unsigned = self.clone();
		unsigned.alice_signature = None;
		unsigned.bob_signature = None;
		serde_json::to_vec(&unsigned).expect("Update serialization is infallible")
	}

	/// True once both signatures are present, the only state in which an
	/// update may be persisted as `latest_update`.
	pub fn is_fully_signed(&self) -> bool {
		self.alice_signature.is_some() && self.bob_signature.is_some()
	}
}

/// The wire envelope for an update exchange ("Wire payload"):
/// the new update plus the sender's previous `latestUpdate`, so the
/// receiver can detect a one-nonce gap and self-heal via sync.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEnvelope {
	pub update: Update,
	pub previous_update: Option<Update>,
}
