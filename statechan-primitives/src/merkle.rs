#![warn(clippy::missing_docs_in_private_items)]

//! A direct, pairwise-sorted keccak256 merkle tree over the set of active
//! transfer ids. Follows `raiden_primitives::{hashing, packing}`'s
//! precedent of hand-building its own locksroot/balance-hash packing
//! rather than reaching for an external merkle-tree crate: the structure
//! needed here (commit to an unordered set, recompute deterministically on
//! both peers) is small enough that a dependency would add more surface
//! than it saves.

use web3::{
	signing::keccak256,
	types::H256,
};

use crate::types::{
	MerkleRoot,
	TransferId,
};

/// Computes the merkle root over a set of active transfer ids. The set is
/// order-independent: ids are sorted before pairing so both channel peers
/// converge on the same root regardless of insertion order.
pub fn root(transfer_ids: &[TransferId]) -> MerkleRoot {
	if transfer_ids.is_empty() {
		return empty_root()
	}

	let mut layer: Vec<H256> = transfer_ids.to_vec();
	layer.sort();

	while layer.len() > 1 {
		let mut next = Vec::with_capacity(layer.len().div_ceil(2));
		for pair in layer.chunks(2) {
			let hash = if pair.len() == 2 {
				hash_pair(pair[0], pair[1])
			} else {
				pair[0]
			};
			next.push(hash);
		}
		layer = next;
	}

	layer[0]
}

/// The merkle root of the empty active-transfer set, committed by `setup`.
pub fn empty_root() -> MerkleRoot {
	H256::from_slice(&keccak256(&[]))
}

/// Hashes two sibling nodes in canonical (sorted) order, so the tree does
/// not depend on which side of a `create`/`resolve` a node fell on.
fn hash_pair(a: H256, b: H256) -> H256 {
	let (left, right) = if a <= b { (a, b) } else { (b, a) };
	let mut buf = Vec::with_capacity(64);
	buf.extend_from_slice(left.as_bytes());
	buf.extend_from_slice(right.as_bytes());
	H256::from_slice(&keccak256(&buf))
}
