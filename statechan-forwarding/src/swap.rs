//! Pure cross-asset/cross-chain conversion (step 3: "swap via
//! a pure `getSwappedAmount`"). No side effects, no chain or store access:
//! the rate table is supplied by configuration and looked up by exact
//! `(fromAsset, fromChain, toAsset, toChain)` match.
use statechan_primitives::types::{
	AssetId,
	ChainId,
	U256,
};
use thiserror::Error;

/// Errors `PricingTable::get_swapped_amount` can return.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum SwapError {
	#[error("no configured swap rate for this asset/chain pair")]
	NoRoute,
	#[error("configured swap rate has a zero denominator")]
	InvalidRate,
}

/// A single configured conversion rate: `amount * rate_numerator /
/// rate_denominator` units of `to_asset` on `to_chain` per unit of
/// `from_asset` on `from_chain`.
#[derive(Clone, Debug)]
pub struct SwapRate {
	pub from_asset: AssetId,
	pub from_chain: ChainId,
	pub to_asset: AssetId,
	pub to_chain: ChainId,
	pub rate_numerator: U256,
	pub rate_denominator: U256,
}

/// A router's configured cross-asset/cross-chain conversion rates. Identity
/// when the asset and chain on both sides already match, so callers never
/// need to special-case the non-swap path.
#[derive(Clone, Debug, Default)]
pub struct PricingTable {
	rates: Vec<SwapRate>,
}

impl PricingTable {
	pub fn new(rates: Vec<SwapRate>) -> Self {
		Self { rates }
	}

	/// Converts `amount` of `from_asset`/`from_chain` into `to_asset`/
	/// `to_chain`. Errors rather than panicking so the forwarding engine
	/// can cancel the sender-side transfer on failure (	/// "Cancellation").
	pub fn get_swapped_amount(
		&self,
		from_asset: AssetId,
		from_chain: ChainId,
		to_asset: AssetId,
		to_chain: ChainId,
		amount: U256,
	) -> Result<U256, SwapError> {
		if from_asset == to_asset && from_chain == to_chain {
			return Ok(amount)
		}
		let rate = self
			.rates
			.iter()
			.find(|r| {
				r.from_asset == from_asset &&
					r.from_chain == from_chain &&
					r.to_asset == to_asset &&
					r.to_chain == to_chain
			})
			.ok_or(SwapError::NoRoute)?;
		if rate.rate_denominator.is_zero() {
			return Err(SwapError::InvalidRate)
		}
		Ok(amount.saturating_mul(rate.rate_numerator) / rate.rate_denominator)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identity_when_asset_and_chain_already_match() {
		let table = PricingTable::new(vec![]);
		let asset = AssetId::repeat_byte(1);
		let chain = ChainId(1);
		assert_eq!(
			table.get_swapped_amount(asset, chain, asset, chain, U256::from(100)).unwrap(),
			U256::from(100)
		);
	}

	#[test]
	fn applies_configured_rate() {
		let from = AssetId::repeat_byte(1);
		let to = AssetId::repeat_byte(2);
		let chain = ChainId(1);
		let table = PricingTable::new(vec![SwapRate {
			from_asset: from,
			from_chain: chain,
			to_asset: to,
			to_chain: chain,
			rate_numerator: U256::from(1),
			rate_denominator: U256::from(2),
		}]);
		assert_eq!(table.get_swapped_amount(from, chain, to, chain, U256::from(100)).unwrap(), U256::from(50));
	}

	#[test]
	fn missing_rate_errors() {
		let table = PricingTable::new(vec![]);
		let a = AssetId::repeat_byte(1);
		let b = AssetId::repeat_byte(2);
		let err = table.get_swapped_amount(a, ChainId(1), b, ChainId(1), U256::from(1));
		assert_eq!(err, Err(SwapError::NoRoute));
	}

	#[test]
	fn cross_chain_same_asset_still_requires_a_rate() {
		let table = PricingTable::new(vec![]);
		let asset = AssetId::repeat_byte(1);
		let err = table.get_swapped_amount(asset, ChainId(1), asset, ChainId(2), U256::from(1));
		assert_eq!(err, Err(SwapError::NoRoute));
	}
}
