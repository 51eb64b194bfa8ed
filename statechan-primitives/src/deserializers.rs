#![warn(clippy::missing_docs_in_private_items)]

use serde::{
	de::Error,
	Deserialize,
	Deserializer,
};
use web3::types::U256;

/// Deserialize a JSON number or decimal string into `U256`. The wire format
/// for updates carries large integers as decimal strings to avoid
/// precision loss in non-Rust peers, but accepts bare numbers too.
pub fn u256_from_str<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
	D: Deserializer<'de>,
{
	let value = serde_json::Value::deserialize(deserializer)?;
	if let Some(n) = value.as_u64() {
		return Ok(U256::from(n))
	}
	let s = value.as_str().ok_or_else(|| D::Error::custom("could not parse U256"))?;
	U256::from_dec_str(s).map_err(|_| D::Error::custom("invalid U256"))
}
