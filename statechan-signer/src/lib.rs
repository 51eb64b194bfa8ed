//! Signer port: produces EIP-191/-712-style signatures and decrypts
//! payloads. The private key material itself is an external concern; the
//! Update Engine and Transfer Builder depend only on the `Signer` trait.

use async_trait::async_trait;
use ethsign::SecretKey;
use statechan_primitives::types::{
	Address,
	Signature,
};
use thiserror::Error;
use web3::signing::keccak256;

/// Errors surfaced by the signer port.
#[derive(Error, Debug, Clone)]
pub enum SignerError {
	#[error("signing failed: `{0}`")]
	Sign(String),
	#[error("recovery failed: `{0}`")]
	Recover(String),
	#[error("decryption failed: `{0}`")]
	Decrypt(String),
}

/// External collaborator: signs channel updates on behalf of one party and
/// decrypts payloads (e.g. an encrypted preimage) addressed to that
/// party's public identifier.
#[async_trait]
pub trait Signer: Send + Sync {
	/// The signer's on-chain address, used as `alice`/`bob` in a
	/// `CanonicalChannelId`.
	fn address(&self) -> Address;

	/// Signs `data` with the EIP-191 personal-message prefix, the same hash
	/// scheme every signed `Update` field uses.
	async fn sign(&self, data: &[u8]) -> Result<Signature, SignerError>;

	/// Decrypts `ciphertext` addressed to this signer's public identifier
	/// (the Transfer Builder encrypts `preImage`/`secret` into `meta` when
	/// required by the transfer definition).
	async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, SignerError>;
}

/// Hashes `data` with the `\x19Ethereum Signed Message:\n<len>` prefix
/// before signing/recovery, the same scheme `raiden_primitives::signing::
/// hash_data` uses.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
	let prefix_msg = b"\x19Ethereum Signed Message:\n";
	let len_str = data.len().to_string();
	let mut buf = Vec::with_capacity(prefix_msg.len() + len_str.len() + data.len());
	buf.extend_from_slice(prefix_msg);
	buf.extend_from_slice(len_str.as_bytes());
	buf.extend_from_slice(data);
	keccak256(&buf)
}

/// Recovers the signer address from `data` and a 65-byte `r || s || v`
/// signature, independent of which `Signer` produced it — both channel
/// peers call this to verify each other's counter-signature.
pub fn recover(data: &[u8], signature: &[u8]) -> Result<Address, SignerError> {
	if signature.len() != 65 {
		return Err(SignerError::Recover("signature must be 65 bytes".into()))
	}
	let data_hash = hash_data(data);
	let recovery_id = signature[64] as i32 - 27;
	web3::signing::recover(&data_hash, &signature[..64], recovery_id)
		.map_err(|e| SignerError::Recover(e.to_string()))
}

/// Encrypts `data` under a recipient's secp256k1 public key, used by the
/// Transfer Builder to encrypt a preimage/secret into a transfer's `meta`
/// before it leaves this process.
pub fn encrypt_for(recipient_public_key: &[u8], data: &[u8]) -> Result<Vec<u8>, SignerError> {
	ecies::encrypt(recipient_public_key, data).map_err(|e| SignerError::Decrypt(e.to_string()))
}

/// Reference `Signer` backed by a local secp256k1 secret key. Not a
/// production keystore/HSM integration — exists for tests and the default
/// node binary.
pub struct LocalSigner {
	key: SecretKey,
}

impl LocalSigner {
	pub fn new(key: SecretKey) -> Self {
		Self { key }
	}

	/// Builds a signer from a raw 32-byte secret key, as loaded from a
	/// keystore file by the node binary's CLI.
	pub fn from_raw(raw: &[u8]) -> Result<Self, SignerError> {
		let key = SecretKey::from_raw(raw).map_err(|e| SignerError::Sign(e.to_string()))?;
		Ok(Self::new(key))
	}
}

#[async_trait]
impl Signer for LocalSigner {
	fn address(&self) -> Address {
		Address::from(self.key.public().address())
	}

	async fn sign(&self, data: &[u8]) -> Result<Signature, SignerError> {
		let data_hash = hash_data(data);
		let signature =
			self.key.sign(&data_hash).map_err(|e| SignerError::Sign(format!("{:?}", e)))?;
		let mut bytes = Vec::with_capacity(65);
		bytes.extend_from_slice(&signature.r);
		bytes.extend_from_slice(&signature.s);
		bytes.push(signature.v + 27);
		Ok(Signature(bytes))
	}

	async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, SignerError> {
		ecies::decrypt(&self.key.raw(), ciphertext).map_err(|e| SignerError::Decrypt(e.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use ethsign::SecretKey;

	use super::*;

	fn alice() -> LocalSigner {
		LocalSigner::new(SecretKey::from_raw(&[0x11; 32]).unwrap())
	}

	#[tokio::test]
	async fn sign_then_recover_roundtrips() {
		let signer = alice();
		let data = b"hello channel";
		let signature = signer.sign(data).await.unwrap();
		let recovered = recover(data, &signature.0).unwrap();
		assert_eq!(recovered, signer.address());
	}

	#[tokio::test]
	async fn recover_rejects_tampered_data() {
		let signer = alice();
		let signature = signer.sign(b"original").await.unwrap();
		let recovered = recover(b"tampered", &signature.0).unwrap();
		assert_ne!(recovered, signer.address());
	}
}
