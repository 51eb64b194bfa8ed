use serde::{
	Deserialize,
	Serialize,
};
use statechan_primitives::types::{
	BalanceVector,
	TransferDefinitionAddress,
	U256,
};
use web3::signing::keccak256;

use crate::errors::DefinitionError;

/// A registered on-chain predicate contract: the pure `create`/`resolve`
/// semantics attaches to every `Transfer`. The Update Engine
/// calls `resolve` as a pure function of the transfer's initial state and a
/// claimed resolver when applying a `resolve` update (step
/// "For `resolve`: compute the post-resolve balance vector by invoking the
/// transfer definition's resolve semantics via the Chain Reader").
pub trait TransferDefinition: Send + Sync {
	/// The name this definition is registered under (used by the Transfer
	/// Builder to resolve a user-facing `type` string).
	fn name(&self) -> &'static str;

	/// The on-chain address of the predicate contract.
	fn address(&self) -> TransferDefinitionAddress;

	/// Validates and canonically encodes a user-supplied initial state into
	/// the bytes committed into the `create` update and hashed into the
	/// `transferId`.
	fn encode_initial_state(&self, initial_state: &serde_json::Value) -> Result<Vec<u8>, DefinitionError>;

	/// Pure resolve function: given the encoded initial state, a claimed
	/// resolver, and the transfer's locked amount, returns the
	/// `[initiator_delta, responder_delta]` balance vector the resolve
	/// update must commit to. `initiator_delta + responder_delta ==
	/// locked_amount` must hold for every implementation (balance
	/// conservation, ).
	fn resolve(
		&self,
		encoded_initial_state: &[u8],
		resolver: &[u8],
		locked_amount: U256,
	) -> Result<BalanceVector, DefinitionError>;

	/// The canonical "zero-out" resolver used by forwarding-engine
	/// cancellation ("Cancellation"): resolving with it always returns the
	/// full locked amount to the initiator. Every registered definition is
	/// required to expose one.
	fn cancel_resolver(&self, encoded_initial_state: &[u8]) -> Vec<u8>;
}

/// A preimage-revealed hash lock: `create` commits to `lock_hash`; `resolve`
/// reveals a preimage whose keccak256 must match it, moving the full locked
/// amount to the responder.
pub struct HashlockTransferDefinition {
	address: TransferDefinitionAddress,
}

impl HashlockTransferDefinition {
	pub fn new(address: TransferDefinitionAddress) -> Self {
		Self { address }
	}
}

/// The cancel sentinel hashlock resolve() special-cases: no preimage hashes
/// to this value, so it can never be confused with a real reveal.
const HASHLOCK_CANCEL_SENTINEL: &[u8] = b"statechan.cancel.v1";

impl TransferDefinition for HashlockTransferDefinition {
	fn name(&self) -> &'static str {
		"HashlockTransfer"
	}

	fn address(&self) -> TransferDefinitionAddress {
		self.address
	}

	fn encode_initial_state(&self, initial_state: &serde_json::Value) -> Result<Vec<u8>, DefinitionError> {
		let lock_hash = initial_state
			.get("lockHash")
			.and_then(|v| v.as_str())
			.ok_or_else(|| {
				DefinitionError::InvalidInitialState(self.name().into(), "missing lockHash".into())
			})?;
		hex::decode(lock_hash.trim_start_matches("0x")).map_err(|e| {
			DefinitionError::InvalidInitialState(self.name().into(), e.to_string())
		})
	}

	fn resolve(
		&self,
		encoded_initial_state: &[u8],
		resolver: &[u8],
		locked_amount: U256,
	) -> Result<BalanceVector, DefinitionError> {
		if resolver == HASHLOCK_CANCEL_SENTINEL {
			return Ok([locked_amount, U256::zero()])
		}
		if encoded_initial_state != keccak256(resolver) {
			return Err(DefinitionError::InvalidResolver(self.name().into()))
		}
		Ok([U256::zero(), locked_amount])
	}

	fn cancel_resolver(&self, _encoded_initial_state: &[u8]) -> Vec<u8> {
		HASHLOCK_CANCEL_SENTINEL.to_vec()
	}
}

/// Models an on-chain withdrawal ("withdrawals are modeled
/// as a transfer whose resolver triggers an on-chain payout"): `create`
/// commits to the withdrawing party's index; `resolve` with any non-empty
/// resolver (the dual signature authorizing the on-chain call) returns the
/// full locked amount to that party.
pub struct WithdrawTransferDefinition {
	address: TransferDefinitionAddress,
}

impl WithdrawTransferDefinition {
	pub fn new(address: TransferDefinitionAddress) -> Self {
		Self { address }
	}
}

/// The cancel sentinel `resolve()` special-cases: no dual-signature
/// authorization ever equals this value, so it can never be confused with a
/// real on-chain payout authorization.
const WITHDRAW_CANCEL_SENTINEL: &[u8] = b"statechan.cancel.v1.withdraw";

#[derive(Serialize, Deserialize)]
struct WithdrawInitialState {
	withdrawing_party_index: u8,
}

impl TransferDefinition for WithdrawTransferDefinition {
	fn name(&self) -> &'static str {
		"Withdraw"
	}

	fn address(&self) -> TransferDefinitionAddress {
		self.address
	}

	fn encode_initial_state(&self, initial_state: &serde_json::Value) -> Result<Vec<u8>, DefinitionError> {
		let party_index = initial_state
			.get("withdrawingPartyIndex")
			.and_then(|v| v.as_u64())
			.ok_or_else(|| {
				DefinitionError::InvalidInitialState(
					self.name().into(),
					"missing withdrawingPartyIndex".into(),
				)
			})?;
		if party_index > 1 {
			return Err(DefinitionError::InvalidInitialState(
				self.name().into(),
				"withdrawingPartyIndex must be 0 or 1".into(),
			))
		}
		Ok(vec![party_index as u8])
	}

	fn resolve(
		&self,
		encoded_initial_state: &[u8],
		resolver: &[u8],
		locked_amount: U256,
	) -> Result<BalanceVector, DefinitionError> {
		if resolver == WITHDRAW_CANCEL_SENTINEL {
			return Ok([locked_amount, U256::zero()])
		}
		if resolver.is_empty() {
			return Err(DefinitionError::InvalidResolver(self.name().into()))
		}
		let party_index = *encoded_initial_state.first().ok_or_else(|| {
			DefinitionError::InvalidResolver(self.name().into())
		})?;
		let mut delta = [U256::zero(), U256::zero()];
		delta[party_index as usize] = locked_amount;
		Ok(delta)
	}

	fn cancel_resolver(&self, _encoded_initial_state: &[u8]) -> Vec<u8> {
		WITHDRAW_CANCEL_SENTINEL.to_vec()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hashlock_resolves_with_matching_preimage() {
		let def = HashlockTransferDefinition::new(Default::default());
		let preimage = b"secret".to_vec();
		let lock_hash = keccak256(&preimage).to_vec();
		let delta = def.resolve(&lock_hash, &preimage, U256::from(100)).unwrap();
		assert_eq!(delta, [U256::zero(), U256::from(100)]);
	}

	#[test]
	fn hashlock_rejects_wrong_preimage() {
		let def = HashlockTransferDefinition::new(Default::default());
		let lock_hash = keccak256(b"secret").to_vec();
		assert!(def.resolve(&lock_hash, b"wrong", U256::from(100)).is_err());
	}

	#[test]
	fn hashlock_cancel_returns_full_amount_to_initiator() {
		let def = HashlockTransferDefinition::new(Default::default());
		let lock_hash = keccak256(b"secret").to_vec();
		let cancel = def.cancel_resolver(&lock_hash);
		let delta = def.resolve(&lock_hash, &cancel, U256::from(100)).unwrap();
		assert_eq!(delta, [U256::from(100), U256::zero()]);
	}

	#[test]
	fn withdraw_rejects_empty_resolver() {
		let def = WithdrawTransferDefinition::new(Default::default());
		let encoded = def.encode_initial_state(&serde_json::json!({"withdrawingPartyIndex": 1})).unwrap();
		assert!(def.resolve(&encoded, &[], U256::from(100)).is_err());
	}

	#[test]
	fn withdraw_resolves_to_withdrawing_party() {
		let def = WithdrawTransferDefinition::new(Default::default());
		let encoded = def.encode_initial_state(&serde_json::json!({"withdrawingPartyIndex": 1})).unwrap();
		let delta = def.resolve(&encoded, b"dual-signature", U256::from(100)).unwrap();
		assert_eq!(delta, [U256::zero(), U256::from(100)]);
	}

	#[test]
	fn withdraw_cancel_returns_full_amount_to_initiator() {
		let def = WithdrawTransferDefinition::new(Default::default());
		let encoded = def.encode_initial_state(&serde_json::json!({"withdrawingPartyIndex": 1})).unwrap();
		let cancel = def.cancel_resolver(&encoded);
		let delta = def.resolve(&encoded, &cancel, U256::from(100)).unwrap();
		assert_eq!(delta, [U256::from(100), U256::zero()]);
	}
}
