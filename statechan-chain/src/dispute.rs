use serde::{
	Deserialize,
	Serialize,
};
use statechan_primitives::types::{
	Address,
	BlockNumber,
	MerkleRoot,
	Nonce,
};

/// The data side of dispute handling: scopes dispute
/// *adjudication logic* out, but the core still records that a channel is
/// disputed and what the chain last observed, since a channel is terminal
/// for the protocol once `inDispute` is true.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DisputeRecord {
	pub channel_address: Address,
	pub observed_at: BlockNumber,
	pub onchain_nonce: Nonce,
	pub merkle_root_on_chain: MerkleRoot,
}
