#![warn(clippy::missing_docs_in_private_items)]

//! Deterministic hashing for transfer identity and balance commitments, so
//! both channel peers compute identical values off of the same inputs (see
//! "Transfer Identity and Merkle Commitment").

use web3::{
	signing::keccak256,
	types::{
		Address,
		H256,
		U256,
	},
};

use crate::types::{
	CanonicalChannelId,
	ChainId,
	Nonce,
	TransferDefinitionAddress,
	TransferId,
};

/// Computes a channel's deterministic address the way the chain-reader port
/// would derive it via Create2 from `{alice, bob, chain_id, factory}`. This
/// helper exists so the engine can re-verify a `CanonicalChannelId` it is
/// handed (e.g. during restore) without round-tripping to the chain reader.
pub fn derive_channel_address(
	alice: Address,
	bob: Address,
	chain_id: ChainId,
	factory: Address,
) -> Address {
	let mut buf = Vec::with_capacity(20 + 20 + 8 + 20);
	let (low, high) = if alice < bob { (alice, bob) } else { (bob, alice) };
	buf.extend_from_slice(low.as_bytes());
	buf.extend_from_slice(high.as_bytes());
	buf.extend_from_slice(&chain_id.0.to_be_bytes());
	buf.extend_from_slice(factory.as_bytes());
	Address::from_slice(&keccak256(&buf)[12..])
}

/// Computes the deterministic `transferId` for a transfer created at a given
/// channel nonce, so both peers compute the identical identifier from the
/// same `create` update details.
pub fn hash_transfer_id(
	channel: &CanonicalChannelId,
	nonce_at_creation: Nonce,
	definition: TransferDefinitionAddress,
	encoded_initial_state: &[u8],
) -> TransferId {
	let mut buf = Vec::new();
	buf.extend_from_slice(channel.channel_address.as_bytes());
	buf.extend_from_slice(&channel.chain_id.0.to_be_bytes());
	let mut nonce_bytes = [0u8; 32];
	nonce_at_creation.0.to_big_endian(&mut nonce_bytes);
	buf.extend_from_slice(&nonce_bytes);
	buf.extend_from_slice(definition.as_bytes());
	buf.extend_from_slice(encoded_initial_state);
	H256::from_slice(&keccak256(&buf))
}

/// Hashes the post-update balance data committed into every signed update,
/// analogous to `raiden_primitives::hashing::hash_balance_data` over
/// transferred amount, locked amount and locksroot.
pub fn hash_balance_data(balances: [U256; 2], merkle_root: H256) -> H256 {
	let mut buf = Vec::new();
	for balance in balances {
		let mut bytes = [0u8; 32];
		balance.to_big_endian(&mut bytes);
		buf.extend_from_slice(&bytes);
	}
	buf.extend_from_slice(merkle_root.as_bytes());
	H256::from_slice(&keccak256(&buf))
}
