//! Merkle-root bookkeeping over a channel's active-transfer set. Delegates
//! the actual tree construction to `statechan_primitives::merkle`; this
//! module only
//! adapts it to a `&[Transfer]` view so callers never hand-sort transfer
//! ids themselves.
use statechan_primitives::{
	state::Transfer,
	types::MerkleRoot,
};

/// Computes the merkle root over `transfers`' ids. The root is always
/// derived on demand ("never cached across updates").
pub fn root_of(transfers: &[Transfer]) -> MerkleRoot {
	let ids: Vec<_> = transfers.iter().map(|t| t.transfer_id).collect();
	statechan_primitives::merkle::root(&ids)
}

#[cfg(test)]
mod tests {
	use statechan_primitives::merkle::empty_root;

	use super::*;

	#[test]
	fn empty_transfer_set_matches_empty_root() {
		assert_eq!(root_of(&[]), empty_root());
	}
}
