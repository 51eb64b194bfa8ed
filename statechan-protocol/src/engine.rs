//! The Update Engine: drives the outbound (leader) and inbound
//! (non-leader) sync protocol that produces a totally ordered,
//! doubly-signed sequence of updates per channel.
use std::{
	collections::HashMap,
	sync::Arc,
};

use async_trait::async_trait;
use statechan_chain::{
	ChainReader,
	TransferDefinitionRegistry,
};
use statechan_lock::LockService;
use statechan_messaging::{
	Messaging,
	ProtocolMessageHandler,
};
use statechan_primitives::{
	hashing::{
		hash_transfer_id,
		derive_channel_address,
	},
	state::{
		Channel,
		NetworkContext,
		Transfer,
		Update,
		UpdateDetails,
		UpdateEnvelope,
	},
	types::{
		Address,
		AssetId,
		BlockTimeout,
		CanonicalChannelId,
		ChainId,
		Identifier,
		Nonce,
		TransferDefinitionAddress,
		TransferId,
		U256,
	},
};
use statechan_signer::Signer;
use statechan_store::Store;
use tracing::{
	info,
	warn,
};
use ulid::Ulid;

use crate::{
	errors::{
		EngineError,
		ErrorContext,
	},
	events::{
		ChannelUpdateEvent,
		ConditionalTransferCreated,
		ConditionalTransferResolved,
		Event,
		EventBus,
		RestoreStateEvent,
	},
	merkle,
};

/// Parameters for `Engine::create`, the leader-side "create a conditional
/// transfer" entry point (`Update` "create has
/// transferId/Definition/InitialState/Timeout/EncodedState/
/// merkleProofData/meta").
pub struct CreateParams {
	pub transfer_definition: TransferDefinitionAddress,
	pub initial_state: serde_json::Value,
	pub encoded_initial_state: Vec<u8>,
	pub transfer_timeout: BlockTimeout,
	pub asset_id: AssetId,
	pub amount: U256,
	pub initiator: Address,
	pub responder: Address,
	pub meta: serde_json::Value,
}

/// Drives end to end against its external ports. One
/// `Engine` instance is shared (behind an `Arc`) between the outbound
/// entry points (`setup`/`deposit`/`create`/`resolve`) and the inbound
/// `ProtocolMessageHandler` registered with `Messaging`.
pub struct Engine {
	pub self_identifier: Identifier,
	pub self_address: Address,
	pub store: Arc<dyn Store>,
	pub lock: Arc<dyn LockService>,
	pub chain: Arc<dyn ChainReader>,
	pub messaging: Arc<dyn Messaging>,
	pub signer: Arc<dyn Signer>,
	pub registry: Arc<TransferDefinitionRegistry>,
	pub events: EventBus,
	/// Per-channel in-process mutexes serializing inbound apply
	/// ("Roles and Locking": "Non-leaders do not take the
	/// [Lock Service] lock but apply inbound updates serially per
	/// channel"). Deliberately separate from `lock`, which is the
	/// cross-process leader lock.
	inbound_locks: tokio::sync::Mutex<HashMap<Address, Arc<tokio::sync::Mutex<()>>>>,
}

impl Engine {
	/// Builds an `Engine` wired to its external ports.
	pub fn new(
		self_identifier: Identifier,
		self_address: Address,
		store: Arc<dyn Store>,
		lock: Arc<dyn LockService>,
		chain: Arc<dyn ChainReader>,
		messaging: Arc<dyn Messaging>,
		signer: Arc<dyn Signer>,
		registry: Arc<TransferDefinitionRegistry>,
		events: EventBus,
	) -> Self {
		Self {
			self_identifier,
			self_address,
			store,
			lock,
			chain,
			messaging,
			signer,
			registry,
			events,
			inbound_locks: tokio::sync::Mutex::new(HashMap::new()),
		}
	}

	async fn inbound_mutex(&self, channel_address: Address) -> Arc<tokio::sync::Mutex<()>> {
		self.inbound_locks
			.lock()
			.await
			.entry(channel_address)
			.or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
			.clone()
	}

	/// Signs `update`'s payload and attaches it under the slot matching
	/// `is_alice`.
	async fn sign_as(&self, mut update: Update, is_alice: bool) -> Result<Update, EngineError> {
		let payload = update.signing_payload();
		let signature =
			self.signer.sign(&payload).await.map_err(|e| EngineError::External(ErrorContext {
				node_error: Some(e.to_string()),
				..Default::default()
			}))?;
		if is_alice {
			update.alice_signature = Some(signature);
		} else {
			update.bob_signature = Some(signature);
		}
		Ok(update)
	}

	/// Verifies the counterparty's signature on `update` against the party
	/// who did not yet sign locally.
	fn verify_counter_signature(&self, update: &Update, channel: &Channel) -> Result<(), EngineError> {
		let payload = update.signing_payload();
		let (counterparty_address, signature) = if channel.alice == self.self_address {
			(channel.bob, update.bob_signature.as_ref())
		} else {
			(channel.alice, update.alice_signature.as_ref())
		};
		let signature = signature.ok_or_else(|| {
			EngineError::BadSignatures(ErrorContext::channel(channel.channel_address.channel_address))
		})?;
		let recovered = statechan_signer::recover(&payload, &signature.0).map_err(|e| {
			EngineError::BadSignatures(ErrorContext {
				channel_address: Some(channel.channel_address.channel_address),
				node_error: Some(e.to_string()),
				..Default::default()
			})
		})?;
		if recovered != counterparty_address {
			return Err(EngineError::BadSignatures(ErrorContext::channel(
				channel.channel_address.channel_address,
			)))
		}
		Ok(())
	}

	/// Sends `envelope` to `to` and blocks for the counter-signed reply,
	/// the leader's half of "Outbound Protocol" step 3.
	async fn exchange(
		&self,
		to: &Identifier,
		envelope: &UpdateEnvelope,
		timeout: std::time::Duration,
	) -> Result<Update, EngineError> {
		let inbox = format!("update-{}", Ulid::new());
		let payload = serde_json::to_value(envelope).expect("UpdateEnvelope serializes");
		self.messaging
			.send_protocol_message(&self.self_identifier, to, payload, Some(inbox.clone()))
			.await
			.map_err(|e| {
				EngineError::External(ErrorContext { node_error: Some(e.to_string()), ..Default::default() })
			})?;
		let reply = self.messaging.await_reply(&inbox, timeout).await.map_err(|e| {
			EngineError::Timeout(ErrorContext { node_error: Some(e.to_string()), ..Default::default() })
		})?;
		if let Some(error) = reply.get("error") {
			return Err(classify_remote_error(error))
		}
		serde_json::from_value::<Update>(reply).map_err(|e| {
			EngineError::Validation(ErrorContext { node_error: Some(e.to_string()), ..Default::default() })
		})
	}

	/// Runs `body` under the named channel lock, releasing it on every exit
	/// path including an early error ("Roles and Locking").
	async fn with_lock<T, F, Fut>(&self, name: &str, is_alice: bool, counterparty: &str, body: F) -> T
	where
		F: FnOnce() -> Fut,
		Fut: std::future::Future<Output = T>,
	{
		let key = self.lock.acquire_lock(name, is_alice, counterparty).await;
		let result = body().await;
		if let Err(e) = self.lock.release_lock(name, key, is_alice, counterparty).await {
			warn!(lock = name, error = %e, "failed to release channel lock");
		}
		result
	}

	/// "Outbound Protocol" step 1, shared by every leader
	/// entry point below.
	async fn load_channel(&self, channel_address: Address) -> Result<Channel, EngineError> {
		self.store
			.get_channel_state(channel_address)
			.await
			.map_err(|e| {
				EngineError::External(ErrorContext { node_error: Some(e.to_string()), ..Default::default() })
			})?
			.ok_or_else(|| EngineError::ChannelNotFound(ErrorContext::channel(channel_address)))
	}

	/// `setup`: the only update type with no prior channel state.
	pub async fn setup(
		&self,
		bob: Address,
		bob_identifier: Identifier,
		chain_id: ChainId,
		factory: Address,
		network_context: NetworkContext,
		timeout: BlockTimeout,
	) -> Result<Channel, EngineError> {
		let channel_address = derive_channel_address(self.self_address, bob, chain_id, factory);
		let lock_name = format!("{:#x}", channel_address);
		self.with_lock(&lock_name, true, bob_identifier.0.as_str(), || async {
			let canonical =
				CanonicalChannelId { chain_id, factory, channel_address };
			let mut update = Update {
				channel_address: canonical.clone(),
				from_identifier: self.self_identifier.clone(),
				to_identifier: bob_identifier.clone(),
				nonce: Nonce::initial(),
				balance: [U256::zero(), U256::zero()],
				asset_id: Address::zero(),
				details: UpdateDetails::Setup { timeout, network_context: network_context.clone() },
				alice_signature: None,
				bob_signature: None,
			};
			update = self.sign_as(update, true).await?;

			let envelope = UpdateEnvelope { update: update.clone(), previous_update: None };
			let signed = self.exchange(&bob_identifier, &envelope, statechan_primitives::constants::DEFAULT_PROTOCOL_TIMEOUT).await?;

			let channel = Channel {
				channel_address: canonical,
				alice_identifier: self.self_identifier.clone(),
				bob_identifier,
				alice: self.self_address,
				bob,
				chain_id,
				network_context,
				nonce: Nonce::initial(),
				latest_update: Some(signed.clone()),
				balances: Default::default(),
				processed_deposits_alice: Default::default(),
				processed_deposits_bob: Default::default(),
				asset_ids: vec![],
				merkle_root: statechan_primitives::merkle::empty_root(),
				timeout,
				in_dispute: false,
			};
			self.verify_counter_signature(&signed, &channel)?;
			self.store.save_channel_state_and_transfers(channel.clone(), vec![]).await.map_err(|e| {
				EngineError::External(ErrorContext { node_error: Some(e.to_string()), ..Default::default() })
			})?;
			let _ = self.events.send(Event::ChannelUpdateEvent(ChannelUpdateEvent {
				channel_address,
				update: signed,
			}));
			info!(channel = %lock_name, "setup complete");
			Ok(channel)
		})
		.await
	}

	/// `deposit` ("Outbound Protocol", "Deposit Race"):
	/// reconciles on-chain deposits and retries up to
	/// `MAX_DEPOSIT_RETRIES` times when the counterparty's independent
	/// reconciliation produces a signature mismatch.
	pub async fn deposit(&self, channel_address: Address, asset_id: AssetId) -> Result<Update, EngineError> {
		for attempt in 0..statechan_primitives::constants::MAX_DEPOSIT_RETRIES {
			match self.deposit_once(channel_address, asset_id).await {
				Ok(update) => return Ok(update),
				Err(e) if e.is_retryable_bad_signatures() && attempt + 1 < statechan_primitives::constants::MAX_DEPOSIT_RETRIES => {
					warn!(channel = %channel_address, attempt, "deposit signature mismatch, retrying");
					continue
				},
				Err(e) => return Err(e),
			}
		}
		unreachable!("loop always returns on its final iteration")
	}

	pub(crate) async fn deposit_once(&self, channel_address: Address, asset_id: AssetId) -> Result<Update, EngineError> {
		let channel = self.load_channel(channel_address).await?;
		if channel.is_terminal() {
			return Err(EngineError::Dispute(ErrorContext::channel(channel_address)))
		}
		let lock_name = format!("{:#x}", channel_address);
		let is_alice = channel.alice == self.self_address;
		let counterparty = if is_alice { channel.bob_identifier.0.clone() } else { channel.alice_identifier.0.clone() };
		let to = if is_alice { channel.bob_identifier.clone() } else { channel.alice_identifier.clone() };

		self.with_lock(&lock_name, is_alice, &counterparty, || async {
			let mut channel = self.load_channel(channel_address).await?;
			let onchain_alice = self
				.chain
				.latest_deposit_by_asset_id(channel_address, asset_id, 0)
				.await
				.map_err(external)?;
			let onchain_bob = self
				.chain
				.latest_deposit_by_asset_id(channel_address, asset_id, 1)
				.await
				.map_err(external)?;
			let processed_alice = channel.processed_deposits_alice.get(&asset_id).copied().unwrap_or_default();
			let processed_bob = channel.processed_deposits_bob.get(&asset_id).copied().unwrap_or_default();
			let delta_alice = onchain_alice.saturating_sub(U256::from(processed_alice));
			let delta_bob = onchain_bob.saturating_sub(U256::from(processed_bob));

			let mut balance = channel.balance_for(&asset_id);
			balance[0] += delta_alice;
			balance[1] += delta_bob;

			let nonce = channel.nonce.next();
			let mut update = Update {
				channel_address: channel.channel_address.clone(),
				from_identifier: self.self_identifier.clone(),
				to_identifier: to.clone(),
				nonce,
				balance,
				asset_id,
				details: UpdateDetails::Deposit {
					total_deposits_alice: onchain_alice.as_u128(),
					total_deposits_bob: onchain_bob.as_u128(),
				},
				alice_signature: None,
				bob_signature: None,
			};
			update = self.sign_as(update, is_alice).await?;
			let envelope = UpdateEnvelope {
				update: update.clone(),
				previous_update: channel.latest_update.clone(),
			};
			let signed = self.exchange(&to, &envelope, statechan_primitives::constants::DEFAULT_PROTOCOL_TIMEOUT).await?;
			self.verify_counter_signature(&signed, &channel)?;

			channel.nonce = nonce;
			channel.balances.insert(asset_id, balance);
			channel.processed_deposits_alice.insert(asset_id, onchain_alice.as_u128());
			channel.processed_deposits_bob.insert(asset_id, onchain_bob.as_u128());
			channel.latest_update = Some(signed.clone());
			self.store.save_channel_state_and_transfers(channel, vec![]).await.map_err(external)?;
			let _ = self.events.send(Event::ChannelUpdateEvent(ChannelUpdateEvent {
				channel_address,
				update: signed.clone(),
			}));
			Ok(signed)
		})
		.await
	}

	/// `create` ("Outbound Protocol"): derives a fresh
	/// `transferId`, extends the active-transfer merkle root, and signs.
	pub async fn create(
		&self,
		channel_address: Address,
		params: CreateParams,
	) -> Result<(Update, Transfer), EngineError> {
		let lock_name = format!("{:#x}", channel_address);
		let channel = self.load_channel(channel_address).await?;
		if channel.is_terminal() {
			return Err(EngineError::Dispute(ErrorContext::channel(channel_address)))
		}
		let is_alice = channel.alice == self.self_address;
		let counterparty = if is_alice { channel.bob_identifier.0.clone() } else { channel.alice_identifier.0.clone() };
		let to = if is_alice { channel.bob_identifier.clone() } else { channel.alice_identifier.clone() };

		self.with_lock(&lock_name, is_alice, &counterparty, || async {
			let mut channel = self.load_channel(channel_address).await?;
			let nonce = channel.nonce.next();
			let transfer_id = hash_transfer_id(
				&channel.channel_address,
				nonce,
				params.transfer_definition,
				&params.encoded_initial_state,
			);

			let mut active = self.store.get_active_transfers(channel_address).await.map_err(external)?;
			let transfer_balance = [params.amount, U256::zero()];
			let transfer = Transfer {
				transfer_id,
				channel_address: channel.channel_address.clone(),
				initiator: params.initiator,
				responder: params.responder,
				transfer_definition: params.transfer_definition,
				transfer_timeout: params.transfer_timeout,
				initial_state_hash: statechan_primitives::hashing::hash_balance_data(
					transfer_balance,
					channel.merkle_root,
				),
				encoded_initial_state: params.encoded_initial_state.clone(),
				transfer_resolver: None,
				balance: transfer_balance,
				asset_id: params.asset_id,
				chain_id: channel.chain_id,
				meta: params.meta.clone(),
				in_dispute: false,
			};
			active.push(transfer.clone());
			let merkle_root = merkle::root_of(&active);

			let mut balance = channel.balance_for(&params.asset_id);
			balance[0] = balance[0].saturating_sub(params.amount);

			let mut update = Update {
				channel_address: channel.channel_address.clone(),
				from_identifier: self.self_identifier.clone(),
				to_identifier: to.clone(),
				nonce,
				balance,
				asset_id: params.asset_id,
				details: UpdateDetails::Create {
					transfer_id,
					transfer_definition: params.transfer_definition,
					initial_state: params.initial_state.clone(),
					transfer_timeout: params.transfer_timeout,
					encoded_state: params.encoded_initial_state.clone(),
					merkle_proof_data: active.iter().map(|t| t.transfer_id).collect(),
					meta: params.meta.clone(),
				},
				alice_signature: None,
				bob_signature: None,
			};
			update = self.sign_as(update, is_alice).await?;
			let envelope = UpdateEnvelope {
				update: update.clone(),
				previous_update: channel.latest_update.clone(),
			};
			let signed = self.exchange(&to, &envelope, statechan_primitives::constants::DEFAULT_PROTOCOL_TIMEOUT).await?;
			self.verify_counter_signature(&signed, &channel)?;

			channel.nonce = nonce;
			channel.balances.insert(params.asset_id, balance);
			channel.merkle_root = merkle_root;
			channel.latest_update = Some(signed.clone());
			if !channel.asset_ids.contains(&params.asset_id) {
				channel.asset_ids.push(params.asset_id);
			}
			self.store
				.save_channel_state_and_transfers(channel, vec![transfer.clone()])
				.await
				.map_err(external)?;
			let _ = self.events.send(Event::ChannelUpdateEvent(ChannelUpdateEvent {
				channel_address,
				update: signed.clone(),
			}));
			let _ = self.events.send(Event::ConditionalTransferCreated(ConditionalTransferCreated {
				channel_address,
				transfer: transfer.clone(),
			}));
			Ok((signed, transfer))
		})
		.await
	}

	/// `resolve` ("Outbound Protocol"): invokes the
	/// transfer definition's pure `resolve` to compute the post-resolve
	/// balance, then signs.
	pub async fn resolve(
		&self,
		channel_address: Address,
		transfer_id: TransferId,
		resolver: Vec<u8>,
	) -> Result<Update, EngineError> {
		let lock_name = format!("{:#x}", channel_address);
		let channel = self.load_channel(channel_address).await?;
		if channel.is_terminal() {
			return Err(EngineError::Dispute(ErrorContext::channel(channel_address)))
		}
		let is_alice = channel.alice == self.self_address;
		let counterparty = if is_alice { channel.bob_identifier.0.clone() } else { channel.alice_identifier.0.clone() };
		let to = if is_alice { channel.bob_identifier.clone() } else { channel.alice_identifier.clone() };

		self.with_lock(&lock_name, is_alice, &counterparty, || async {
			let mut channel = self.load_channel(channel_address).await?;
			let mut transfer = self
				.store
				.get_transfer_state(transfer_id)
				.await
				.map_err(external)?
				.ok_or_else(|| EngineError::TransferNotFound(ErrorContext::channel(channel_address)))?;
			let definition = self.registry.get(transfer.transfer_definition).ok_or_else(|| {
				EngineError::InvalidTransferType(ErrorContext::channel(channel_address))
			})?;
			let delta = definition
				.resolve(&transfer.encoded_initial_state, &resolver, transfer.balance[0])
				.map_err(|e| {
					EngineError::Validation(ErrorContext {
						channel_address: Some(channel_address),
						transfer_id: Some(transfer_id),
						node_error: Some(e.to_string()),
						..Default::default()
					})
				})?;

			let mut active = self.store.get_active_transfers(channel_address).await.map_err(external)?;
			active.retain(|t| t.transfer_id != transfer_id);
			let merkle_root = merkle::root_of(&active);

			let mut balance = channel.balance_for(&transfer.asset_id);
			balance[0] += delta[0];
			balance[1] += delta[1];

			let nonce = channel.nonce.next();
			let mut update = Update {
				channel_address: channel.channel_address.clone(),
				from_identifier: self.self_identifier.clone(),
				to_identifier: to.clone(),
				nonce,
				balance,
				asset_id: transfer.asset_id,
				details: UpdateDetails::Resolve {
					transfer_id,
					resolver: resolver.clone(),
					merkle_root,
					meta: transfer.meta.clone(),
				},
				alice_signature: None,
				bob_signature: None,
			};
			update = self.sign_as(update, is_alice).await?;
			let envelope = UpdateEnvelope {
				update: update.clone(),
				previous_update: channel.latest_update.clone(),
			};
			let signed = self.exchange(&to, &envelope, statechan_primitives::constants::DEFAULT_PROTOCOL_TIMEOUT).await?;
			self.verify_counter_signature(&signed, &channel)?;

			channel.nonce = nonce;
			channel.balances.insert(transfer.asset_id, balance);
			channel.merkle_root = merkle_root;
			channel.latest_update = Some(signed.clone());
			transfer.transfer_resolver = Some(resolver);
			self.store
				.save_channel_state_and_transfers(channel, vec![transfer.clone()])
				.await
				.map_err(external)?;
			let _ = self.events.send(Event::ChannelUpdateEvent(ChannelUpdateEvent {
				channel_address,
				update: signed.clone(),
			}));
			let _ = self.events.send(Event::ConditionalTransferResolved(ConditionalTransferResolved {
				channel_address,
				transfer,
			}));
			Ok(signed)
		})
		.await
	}

	/// Inbound half of : validates, counter-signs, and
	/// persists a message received from the leader.
	pub async fn handle_inbound(&self, envelope: UpdateEnvelope) -> Result<Update, EngineError> {
		let update = &envelope.update;
		if update.from_identifier == self.self_identifier {
			return Err(EngineError::Validation(ErrorContext::default()))
		}
		let channel_address = update.channel_address.channel_address;

		if matches!(update.details, UpdateDetails::Setup { .. }) {
			return self.handle_inbound_setup(envelope).await
		}
		let update = update.clone();

		let channel_mutex = self.inbound_mutex(channel_address).await;
		let _guard = channel_mutex.lock().await;

		let mut channel = self.load_channel(channel_address).await?;
		if channel.is_terminal() {
			return Err(EngineError::Dispute(ErrorContext::channel(channel_address)))
		}

		if update.nonce.0 <= channel.nonce.0 {
			let latest = channel.latest_update.clone().ok_or_else(|| {
				EngineError::ChannelNotFound(ErrorContext::channel(channel_address))
			})?;
			return Err(EngineError::StaleUpdate(ErrorContext {
				channel_address: Some(channel_address),
				node_error: Some(serde_json::to_string(&latest).unwrap_or_default()),
				..Default::default()
			}))
		}

		if update.nonce.0 == channel.nonce.0 + U256::from(2u8) {
			if let Some(previous) = &envelope.previous_update {
				if previous.nonce.0 == channel.nonce.0 + U256::one() {
					channel = self.apply_one(channel, previous.clone()).await?;
				} else {
					return Err(EngineError::RestoreNeeded(ErrorContext::channel(channel_address)))
				}
			} else {
				return Err(EngineError::RestoreNeeded(ErrorContext::channel(channel_address)))
			}
		} else if update.nonce.0 != channel.nonce.0 + U256::one() {
			return Err(EngineError::RestoreNeeded(ErrorContext::channel(channel_address)))
		}

		self.apply_and_countersign(channel, update).await
	}

	async fn handle_inbound_setup(&self, envelope: UpdateEnvelope) -> Result<Update, EngineError> {
		let update = envelope.update;
		let UpdateDetails::Setup { timeout, network_context } = update.details.clone() else {
			return Err(EngineError::Validation(ErrorContext::default()))
		};
		let leader_is_alice = update.alice_signature.is_some();
		let leader_signature = if leader_is_alice { &update.alice_signature } else { &update.bob_signature }
			.clone()
			.ok_or_else(|| EngineError::BadSignatures(ErrorContext::default()))?;
		let leader_address =
			statechan_signer::recover(&update.signing_payload(), &leader_signature.0).map_err(|e| {
				EngineError::BadSignatures(ErrorContext { node_error: Some(e.to_string()), ..Default::default() })
			})?;

		let signed = self.sign_as(update.clone(), !leader_is_alice).await?;
		let channel_address = signed.channel_address.channel_address;
		let (alice, bob, alice_identifier, bob_identifier) = if leader_is_alice {
			(leader_address, self.self_address, signed.from_identifier.clone(), signed.to_identifier.clone())
		} else {
			(self.self_address, leader_address, signed.to_identifier.clone(), signed.from_identifier.clone())
		};
		let expected_address = derive_channel_address(
			alice,
			bob,
			signed.channel_address.chain_id,
			signed.channel_address.factory,
		);
		if expected_address != channel_address {
			return Err(EngineError::Validation(ErrorContext::channel(channel_address)))
		}
		let channel = Channel {
			channel_address: signed.channel_address.clone(),
			alice_identifier,
			bob_identifier,
			alice,
			bob,
			chain_id: signed.channel_address.chain_id,
			network_context,
			nonce: Nonce::initial(),
			latest_update: Some(signed.clone()),
			balances: Default::default(),
			processed_deposits_alice: Default::default(),
			processed_deposits_bob: Default::default(),
			asset_ids: vec![],
			merkle_root: statechan_primitives::merkle::empty_root(),
			timeout,
			in_dispute: false,
		};
		self.store.save_channel_state_and_transfers(channel.clone(), vec![]).await.map_err(external)?;
		let _ = self
			.events
			.send(Event::ChannelUpdateEvent(ChannelUpdateEvent { channel_address, update: signed.clone() }));
		Ok(signed)
	}

	/// Applies a sync-recovered `previous_update` locally without
	/// re-exchanging it ("Inbound Protocol" sync branch).
	async fn apply_one(&self, channel: Channel, update: Update) -> Result<Channel, EngineError> {
		let channel_address = channel.channel_address.channel_address;
		self.apply_and_countersign(channel, update).await?;
		self.load_channel(channel_address).await
	}

	/// Validates, counter-signs, and persists `update` against `channel`
	/// ("Inbound Protocol" steps 4-5). Recomputes the
	/// expected balance, merkle root, and transfer id from the local view
	/// of active transfers before accepting (step 4 "Any
	/// mismatch ⇒ reject").
	async fn apply_and_countersign(&self, mut channel: Channel, update: Update) -> Result<Update, EngineError> {
		let channel_address = channel.channel_address.channel_address;
		self.verify_counter_signature(&update, &channel)?;

		let mut transfers_delta = vec![];
		let mut merkle_root = channel.merkle_root;
		let mut created_transfer = None;
		let mut resolved_transfer = None;
		match &update.details {
			UpdateDetails::Deposit { total_deposits_alice, total_deposits_bob } => {
				// Reconcile independently against the chain reader rather than
				// trusting the leader's claimed totals ("Deposit
				// Race": "Both sides reconcile independently; if the inbound
				// side computes a different total than the leader signed,
				// signature recovery fails").
				let expected_alice = self
					.chain
					.latest_deposit_by_asset_id(channel_address, update.asset_id, 0)
					.await
					.map_err(external)?;
				let expected_bob = self
					.chain
					.latest_deposit_by_asset_id(channel_address, update.asset_id, 1)
					.await
					.map_err(external)?;
				if expected_alice.as_u128() != *total_deposits_alice || expected_bob.as_u128() != *total_deposits_bob
				{
					return Err(EngineError::BadSignatures(ErrorContext::channel(channel_address)))
				}
				channel.processed_deposits_alice.insert(update.asset_id, *total_deposits_alice);
				channel.processed_deposits_bob.insert(update.asset_id, *total_deposits_bob);
			},
			UpdateDetails::Create {
				transfer_id,
				transfer_definition,
				encoded_state,
				transfer_timeout,
				meta,
				merkle_proof_data,
				..
			} => {
				let expected_id =
					hash_transfer_id(&channel.channel_address, update.nonce, *transfer_definition, encoded_state);
				if expected_id != *transfer_id {
					return Err(EngineError::Validation(ErrorContext::channel(channel_address)))
				}
				let transfer_balance = [channel.balance_for(&update.asset_id)[0] - update.balance[0], U256::zero()];
				let new_transfer = Transfer {
					transfer_id: *transfer_id,
					channel_address: channel.channel_address.clone(),
					initiator: channel.alice,
					responder: channel.bob,
					transfer_definition: *transfer_definition,
					transfer_timeout: *transfer_timeout,
					initial_state_hash: statechan_primitives::hashing::hash_balance_data(
						transfer_balance,
						channel.merkle_root,
					),
					encoded_initial_state: encoded_state.clone(),
					transfer_resolver: None,
					balance: transfer_balance,
					asset_id: update.asset_id,
					chain_id: channel.chain_id,
					meta: meta.clone(),
					in_dispute: false,
				};
				let mut active =
					self.store.get_active_transfers(channel_address).await.map_err(external)?;
				active.push(new_transfer.clone());
				let expected_root = merkle::root_of(&active);
				if expected_root != statechan_primitives::merkle::root(merkle_proof_data) {
					return Err(EngineError::Validation(ErrorContext::channel(channel_address)))
				}
				merkle_root = expected_root;
				transfers_delta.push(new_transfer.clone());
				created_transfer = Some(new_transfer);
			},
			UpdateDetails::Resolve { transfer_id, resolver, merkle_root: claimed_root, .. } => {
				let mut transfer = self
					.store
					.get_transfer_state(*transfer_id)
					.await
					.map_err(external)?
					.ok_or_else(|| EngineError::TransferNotFound(ErrorContext::channel(channel_address)))?;
				let mut active =
					self.store.get_active_transfers(channel_address).await.map_err(external)?;
				active.retain(|t| t.transfer_id != *transfer_id);
				let expected_root = merkle::root_of(&active);
				if expected_root != *claimed_root {
					return Err(EngineError::Validation(ErrorContext::channel(channel_address)))
				}
				merkle_root = expected_root;
				transfer.transfer_resolver = Some(resolver.clone());
				transfers_delta.push(transfer.clone());
				resolved_transfer = Some(transfer);
			},
			UpdateDetails::Setup { .. } => {},
		}

		let is_alice = channel.alice == self.self_address;
		let update = self.sign_as(update, is_alice).await?;

		channel.nonce = update.nonce;
		channel.balances.insert(update.asset_id, update.balance);
		channel.merkle_root = merkle_root;
		channel.latest_update = Some(update.clone());

		self.store.save_channel_state_and_transfers(channel, transfers_delta).await.map_err(external)?;
		let _ = self.events.send(Event::ChannelUpdateEvent(ChannelUpdateEvent { channel_address, update: update.clone() }));
		// The counter-signing side applies the same `create`/`resolve` the
		// leader produced, so it must fan out the same triggers the leader's
		// own `create`/`resolve` methods do: the Forwarding Engine subscribes
		// from whichever side is its own `Engine`, which for a router is
		// always this counter-signing path, never the leader path.
		if let Some(transfer) = created_transfer {
			let _ = self.events.send(Event::ConditionalTransferCreated(ConditionalTransferCreated { channel_address, transfer }));
		}
		if let Some(transfer) = resolved_transfer {
			let _ = self.events.send(Event::ConditionalTransferResolved(ConditionalTransferResolved { channel_address, transfer }));
		}
		Ok(update)
	}

	/// "Restore-State Procedure", requester side: verifies
	/// the holder's payload and overwrites local state on success.
	pub async fn restore(
		&self,
		counterparty: Identifier,
		counterparty_address: Address,
		chain_id: ChainId,
		factory: Address,
	) -> Result<Channel, EngineError> {
		let payload = serde_json::json!({ "type": "restoreRequest", "chainId": chain_id });
		let reply = self
			.messaging
			.send_restore_state_message(&self.self_identifier, &counterparty, payload)
			.await
			.map_err(|e| {
				EngineError::External(ErrorContext { node_error: Some(e.to_string()), ..Default::default() })
			})?;
		let channel: Channel = serde_json::from_value(
			reply
				.get("channel")
				.cloned()
				.ok_or_else(|| EngineError::Validation(ErrorContext::default()))?,
		)
		.map_err(|e| EngineError::Validation(ErrorContext { node_error: Some(e.to_string()), ..Default::default() }))?;
		let transfers: Vec<Transfer> = serde_json::from_value(
			reply.get("activeTransfers").cloned().unwrap_or(serde_json::Value::Array(vec![])),
		)
		.map_err(|e| EngineError::Validation(ErrorContext { node_error: Some(e.to_string()), ..Default::default() }))?;

		let expected_address =
			derive_channel_address(self.self_address, counterparty_address, chain_id, factory);
		if channel.channel_address.channel_address != expected_address {
			return Err(EngineError::Validation(ErrorContext::channel(channel.channel_address.channel_address)))
		}
		let latest = channel.latest_update.clone().ok_or_else(|| {
			EngineError::Validation(ErrorContext::channel(channel.channel_address.channel_address))
		})?;
		self.verify_counter_signature(&latest, &channel)?;
		let self_signature = if channel.alice == self.self_address {
			&latest.alice_signature
		} else {
			&latest.bob_signature
		};
		if self_signature.is_none() {
			return Err(EngineError::BadSignatures(ErrorContext::channel(channel.channel_address.channel_address)))
		}
		if merkle::root_of(&transfers) != channel.merkle_root {
			return Err(EngineError::Validation(ErrorContext::channel(channel.channel_address.channel_address)))
		}
		let local_nonce =
			self.store.get_channel_state(channel.channel_address.channel_address).await.map_err(external)?
				.map(|c| c.nonce)
				.unwrap_or_default();
		if channel.nonce.0 <= local_nonce.0 + U256::one() {
			return Err(EngineError::Validation(ErrorContext::channel(channel.channel_address.channel_address)))
		}

		let channel_address = channel.channel_address.channel_address;
		self.store.save_channel_state_and_transfers(channel.clone(), transfers).await.map_err(external)?;
		let _ = self.events.send(Event::RestoreStateEvent(RestoreStateEvent {
			channel_address,
			nonce: channel.nonce,
		}));
		Ok(channel)
	}

	/// "Restore-State Procedure", holder side: resolves the
	/// channel this counterparty is requesting a restore for and replies
	/// with its current state and active transfers, under the same
	/// per-channel lock `create`/`resolve` acquire.
	async fn handle_restore_request(
		&self,
		from: Identifier,
		chain_id: ChainId,
	) -> Result<serde_json::Value, EngineError> {
		let channel = self
			.store
			.get_channel_state_by_counterparty_identifier(self.self_address, &from, chain_id)
			.await
			.map_err(external)?
			.ok_or_else(|| EngineError::ChannelNotFound(ErrorContext::default()))?;
		let channel_address = channel.channel_address.channel_address;
		let is_alice = channel.alice == self.self_address;
		let lock_name = format!("{:#x}", channel_address);

		self.with_lock(&lock_name, is_alice, &from.0, || async {
			let channel = self.load_channel(channel_address).await?;
			let transfers = self.store.get_active_transfers(channel_address).await.map_err(external)?;
			Ok(serde_json::json!({ "channel": channel, "activeTransfers": transfers }))
		})
		.await
	}
}

/// Classifies `{"error": {"kind": ..., "context": ...}}` replies from a
/// non-leader back into an `EngineError` ("Propagation").
fn classify_remote_error(error: &serde_json::Value) -> EngineError {
	let kind = error.get("kind").and_then(|v| v.as_str()).unwrap_or("External");
	let context = ErrorContext {
		node_error: error.get("context").map(|c| c.to_string()),
		..Default::default()
	};
	match kind {
		"StaleUpdate" => EngineError::StaleUpdate(context),
		"RestoreNeeded" => EngineError::RestoreNeeded(context),
		"BadSignatures" => EngineError::BadSignatures(context),
		"Dispute" => EngineError::Dispute(context),
		"ChannelNotFound" => EngineError::ChannelNotFound(context),
		_ => EngineError::External(context),
	}
}

fn external<E: std::fmt::Display>(e: E) -> EngineError {
	EngineError::External(ErrorContext { node_error: Some(e.to_string()), ..Default::default() })
}

/// Adapts `Engine` to `statechan_messaging::ProtocolMessageHandler`. Routes
/// a `{"type": "restoreRequest"}` payload to the holder side of the
/// Restore-State Procedure; anything else is wired into `handle_inbound`.
/// Replies with either the counter-signed update (or restored state) or a
/// structured `{error: {kind, context}}`.
pub struct EngineMessageHandler(pub Arc<Engine>);

#[async_trait]
impl ProtocolMessageHandler for EngineMessageHandler {
	async fn handle(
		&self,
		message: serde_json::Value,
		from: Identifier,
		reply_inbox: Option<String>,
	) {
		let Some(inbox) = reply_inbox else {
			warn!("inbound protocol message with no reply inbox, ignoring");
			return
		};
		if message.get("type").and_then(|v| v.as_str()) == Some("restoreRequest") {
			let chain_id: Option<ChainId> =
				message.get("chainId").cloned().and_then(|v| serde_json::from_value(v).ok());
			let reply = match chain_id {
				Some(chain_id) => match self.0.handle_restore_request(from, chain_id).await {
					Ok(value) => value,
					Err(e) => serde_json::json!({
						"error": { "kind": engine_error_kind(&e), "context": format!("{:?}", e.context()) }
					}),
				},
				None => {
					warn!("malformed restore request, missing chainId, ignoring (requester will time out)");
					return
				},
			};
			if let Err(e) = self.0.messaging.reply(&inbox, reply).await {
				warn!(error = %e, "failed to reply to inbound restore request");
			}
			return
		}
		let envelope: UpdateEnvelope = match serde_json::from_value(message) {
			Ok(envelope) => envelope,
			Err(_) => {
				warn!("malformed inbound update, ignoring (leader will time out)");
				return
			},
		};
		let reply = match self.0.handle_inbound(envelope).await {
			Ok(update) => serde_json::to_value(update).expect("Update serializes"),
			Err(e) => serde_json::json!({
				"error": { "kind": engine_error_kind(&e), "context": format!("{:?}", e.context()) }
			}),
		};
		if let Err(e) = self.0.messaging.reply(&inbox, reply).await {
			warn!(error = %e, "failed to reply to inbound protocol message");
		}
	}
}

fn engine_error_kind(e: &EngineError) -> &'static str {
	match e {
		EngineError::Validation(_) => "ValidationError",
		EngineError::ChannelNotFound(_) => "ChannelNotFound",
		EngineError::TransferNotFound(_) => "TransferNotFound",
		EngineError::StaleUpdate(_) => "StaleUpdate",
		EngineError::RestoreNeeded(_) => "RestoreNeeded",
		EngineError::BadSignatures(_) => "BadSignatures",
		EngineError::Timeout(_) => "Timeout",
		EngineError::InvalidTransferType(_) => "InvalidTransferType",
		EngineError::Dispute(_) => "Dispute",
		EngineError::External(_) => "External",
	}
}
