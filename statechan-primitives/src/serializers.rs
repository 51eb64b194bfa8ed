#![warn(clippy::missing_docs_in_private_items)]

use serde::Serializer;

/// Serialize any integer-like value as a decimal string, the counterpart to
/// `deserializers::u256_from_str`.
pub fn u256_to_str<T, S>(v: &T, serializer: S) -> Result<S::Ok, S::Error>
where
	T: ToString,
	S: Serializer,
{
	serializer.serialize_str(&v.to_string())
}
