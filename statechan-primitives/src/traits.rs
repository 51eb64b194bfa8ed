#![warn(clippy::missing_docs_in_private_items)]

/// Convert a type to its canonical byte encoding (used for hash/signature
/// inputs).
pub trait ToBytes {
	fn to_bytes(&self) -> Vec<u8>;
}

/// Checksum-encode an address (EIP-55).
pub trait Checksum {
	fn checksum(&self) -> String;
}
