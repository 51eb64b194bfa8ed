//! Distributed lock-service port ("Lock Service"): named
//! mutual exclusion across process boundaries keyed by channel address. The
//! Update Engine's leader acquires this lock before an outbound protocol
//! exchange and releases it only once the exchange terminates.

use std::{
	collections::HashMap,
	fmt,
	sync::{
		Arc,
		Mutex,
	},
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{
	Mutex as AsyncMutex,
	OwnedMutexGuard,
};
use ulid::Ulid;

/// An opaque token returned by `acquire_lock`, presented back to
/// `release_lock` to prove ownership.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct LockKey(Ulid);

impl fmt::Display for LockKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Errors surfaced by the lock service port.
#[derive(Error, Debug, Clone)]
pub enum LockError {
	#[error("lock `{0}` is not held under key `{1}`")]
	KeyMismatch(String, LockKey),
	#[error("lock `{0}` has no holder")]
	NotHeld(String),
}

/// External collaborator: named mutual-exclusion across process
/// boundaries keyed by channel address. Implementations must be reentrant
/// per `(name, key)` and globally mutually exclusive by `name`.
#[async_trait]
pub trait LockService: Send + Sync {
	/// Acquires the named lock, blocking until available, and returns a key
	/// that must be presented to `release_lock`.
	async fn acquire_lock(
		&self,
		name: &str,
		is_alice: bool,
		counterparty_identifier: &str,
	) -> LockKey;

	/// Releases the named lock. Fails if `key` does not match the current
	/// holder.
	async fn release_lock(
		&self,
		name: &str,
		key: LockKey,
		is_alice: bool,
		counterparty_identifier: &str,
	) -> Result<(), LockError>;
}

/// Reference, in-memory `LockService` adapter: a per-name `tokio::sync::
/// Mutex` whose owned guard is parked under the key returned from
/// `acquire_lock` until `release_lock` drops it. Not a production
/// cross-process implementation (scopes the lock service out
/// as an external collaborator) — exists for tests and the default node
/// binary.
pub struct InMemoryLockService {
	locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
	held: Mutex<HashMap<LockKey, (String, OwnedMutexGuard<()>)>>,
}

impl InMemoryLockService {
	pub fn new() -> Self {
		Self { locks: Mutex::new(HashMap::new()), held: Mutex::new(HashMap::new()) }
	}

	fn mutex_for(&self, name: &str) -> Arc<AsyncMutex<()>> {
		self.locks
			.lock()
			.expect("lock map poisoned")
			.entry(name.to_owned())
			.or_insert_with(|| Arc::new(AsyncMutex::new(())))
			.clone()
	}
}

impl Default for InMemoryLockService {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl LockService for InMemoryLockService {
	async fn acquire_lock(&self, name: &str, _is_alice: bool, _counterparty_identifier: &str) -> LockKey {
		let mutex = self.mutex_for(name);
		let guard = mutex.lock_owned().await;
		let key = LockKey(Ulid::new());
		self.held.lock().expect("held map poisoned").insert(key, (name.to_owned(), guard));
		key
	}

	async fn release_lock(
		&self,
		name: &str,
		key: LockKey,
		_is_alice: bool,
		_counterparty_identifier: &str,
	) -> Result<(), LockError> {
		let mut held = self.held.lock().expect("held map poisoned");
		match held.remove(&key) {
			Some((held_name, guard)) if held_name == name => {
				drop(guard);
				Ok(())
			},
			Some(other) => {
				held.insert(key, other);
				Err(LockError::KeyMismatch(name.to_owned(), key))
			},
			None => Err(LockError::NotHeld(name.to_owned())),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use tokio::time::timeout;

	use super::*;

	#[tokio::test]
	async fn second_acquire_blocks_until_release() {
		let service = InMemoryLockService::new();
		let key_a = service.acquire_lock("channel-1", true, "bob").await;

		let second = timeout(Duration::from_millis(50), service.acquire_lock("channel-1", false, "alice")).await;
		assert!(second.is_err(), "second acquire should block while the first holds the lock");

		service.release_lock("channel-1", key_a, true, "bob").await.unwrap();
		let key_b = timeout(Duration::from_millis(50), service.acquire_lock("channel-1", false, "alice"))
			.await
			.expect("should acquire promptly after release");
		service.release_lock("channel-1", key_b, false, "alice").await.unwrap();
	}

	#[tokio::test]
	async fn release_with_wrong_key_is_rejected() {
		let service = InMemoryLockService::new();
		let key = service.acquire_lock("channel-1", true, "bob").await;
		let bogus = service.acquire_lock("channel-2", true, "bob").await;
		assert!(service.release_lock("channel-1", bogus, true, "bob").await.is_err());
		service.release_lock("channel-1", key, true, "bob").await.unwrap();
		service.release_lock("channel-2", bogus, true, "bob").await.unwrap();
	}

	#[tokio::test]
	async fn independent_names_do_not_contend() {
		let service = InMemoryLockService::new();
		let key_a = service.acquire_lock("channel-1", true, "bob").await;
		let key_b = timeout(Duration::from_millis(50), service.acquire_lock("channel-2", true, "carol"))
			.await
			.expect("different lock names must not contend");
		service.release_lock("channel-1", key_a, true, "bob").await.unwrap();
		service.release_lock("channel-2", key_b, true, "carol").await.unwrap();
	}
}
