//! The Forwarding Engine: routes a conditional transfer created on one
//! channel onto the next channel in its `RoutingMeta.path`, propagates
//! resolution back to the sender side, and drains the queued rows a
//! Check-In Handler retries once the recipient checks back in. Grounded
//! on `raiden_api::api::Api` for the validate-then-mutate method shape and
//! on `raiden_pathfinding::routing` for channel resolution, narrowed from
//! "pick the best of several channels" to "find the one channel to this
//! counterparty", since the routing decision here is made by whoever
//! built the transfer's `path`, not by this engine.
use std::{
	collections::HashMap,
	sync::Arc,
};

use serde::{
	Deserialize,
	Serialize,
};
use statechan_chain::TransferDefinitionRegistry;
use statechan_messaging::Messaging;
use statechan_primitives::{
	constants::TRANSFER_DECREMENT,
	state::{
		Channel,
		Transfer,
		Update,
		UpdateDetails,
	},
	types::{
		Address,
		AssetId,
		BlockTimeout,
		Identifier,
		RoutingMeta,
		TransferDefinitionAddress,
		TransferId,
		U256,
	},
};
use statechan_protocol::{
	engine::{
		CreateParams,
		Engine,
	},
	events::Event,
};
use statechan_store::Store;
use tokio::sync::Mutex;

use crate::{
	config::ForwardingConfig,
	errors::{
		CancellationOutcome,
		ForwardingError,
	},
};

/// Everything needed to (re)submit the outgoing `create` for a forwarded
/// transfer, persisted verbatim into a queued row's `payload` when it
/// cannot be submitted synchronously (`QueuedRouterUpdate`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueuedCreateParams {
	pub recipient_channel_address: Address,
	pub sender_channel_address: Address,
	pub sender_transfer_id: TransferId,
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

/// The result of attempting to forward a conditional transfer.
#[derive(Clone, Debug)]
pub enum ForwardOutcome {
	/// Forwarded synchronously. `None` when there was nothing to forward
	/// (this router was the path's final hop).
	Forwarded(Option<Update>),
	/// Could not be submitted synchronously; persisted for the Check-In
	/// Handler to retry.
	Queued { reason: String },
}

/// Routes conditional transfers between the channels of a single router
/// identity, wrapping that identity's own `Engine` rather than owning a
/// second copy of its collaborators.
pub struct ForwardingEngine {
	pub engine: Arc<Engine>,
	pub store: Arc<dyn Store>,
	pub messaging: Arc<dyn Messaging>,
	pub registry: Arc<TransferDefinitionRegistry>,
	pub config: ForwardingConfig,
	pub(crate) channel_locks: Mutex<HashMap<Address, Arc<Mutex<()>>>>,
}

impl ForwardingEngine {
	pub fn new(
		engine: Arc<Engine>,
		store: Arc<dyn Store>,
		messaging: Arc<dyn Messaging>,
		registry: Arc<TransferDefinitionRegistry>,
		config: ForwardingConfig,
	) -> Arc<Self> {
		Arc::new(Self { engine, store, messaging, registry, config, channel_locks: Mutex::new(HashMap::new()) })
	}

	/// Subscribes to the Update Engine's event bus and drives the
	/// forwarding algorithm, the resolution path, and the Check-In Handler
	/// from their respective triggers. Runs until the event bus is
	/// dropped; intended to be spawned once per node at startup.
	pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
		let forwarding = self.clone();
		let mut receiver = self.engine.events.subscribe();
		tokio::spawn(async move {
			loop {
				let event = match receiver.recv().await {
					Ok(event) => event,
					Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
						tracing::warn!(skipped, "forwarding engine lagged behind the event bus");
						continue
					},
					Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
				};
				forwarding.handle_event(event).await;
			}
		})
	}

	async fn handle_event(&self, event: Event) {
		match event {
			Event::ConditionalTransferCreated(e) => {
				if let Err(err) = self.forward_conditional_transfer_created(e.channel_address, e.transfer).await {
					tracing::warn!(channel_address = %format!("{:#x}", e.channel_address), error = %err, "forward failed");
				}
			},
			Event::ConditionalTransferResolved(e) => {
				if let Err(err) = self.resolve_forwarded_transfer(e.channel_address, e.transfer).await {
					tracing::warn!(channel_address = %format!("{:#x}", e.channel_address), error = %err, "resolution propagation failed");
				}
			},
			Event::IsAlive(e) => {
				if let Err(err) = self.check_in(e.channel_address).await {
					tracing::warn!(channel_address = %format!("{:#x}", e.channel_address), error = %err, "check-in failed");
				}
			},
			Event::ChannelUpdateEvent(_) | Event::RestoreStateEvent(_) | Event::WithdrawalReconciledEvent(_) => {},
		}
	}

	/// The Forwarding Engine's main algorithm (steps 1-7):
	/// derive the recipient's asset/chain, swap if required, resolve the
	/// recipient channel, check collateralization and liveness, and submit
	/// the outgoing `create`, queuing instead wherever the recipient can't
	/// be reached synchronously.
	pub async fn forward_conditional_transfer_created(
		&self,
		sender_channel_address: Address,
		transfer: Transfer,
	) -> Result<ForwardOutcome, ForwardingError> {
		let routing: RoutingMeta = serde_json::from_value(transfer.meta.clone())
			.map_err(|_| ForwardingError::InvalidForwardingInfo { transfer_id: transfer.transfer_id })?;
		let Some(hop) = routing.path.first().cloned() else {
			return Ok(ForwardOutcome::Forwarded(None))
		};

		let sender_channel = self
			.store
			.get_channel_state(sender_channel_address)
			.await?
			.ok_or(ForwardingError::SenderChannelNotFound { channel_address: sender_channel_address })?;

		let recipient_asset_id = hop.recipient_asset_id.unwrap_or(transfer.asset_id);
		let recipient_chain_id = hop.recipient_chain_id.unwrap_or(sender_channel.chain_id);
		let locked_amount = transfer.balance[0];

		let recipient_amount = if recipient_asset_id == transfer.asset_id && recipient_chain_id == sender_channel.chain_id
		{
			locked_amount
		} else {
			match self.config.pricing.get_swapped_amount(
				transfer.asset_id,
				sender_channel.chain_id,
				recipient_asset_id,
				recipient_chain_id,
				locked_amount,
			) {
				Ok(amount) => amount,
				Err(source) => {
					let cancellation = self
						.cancel_sender_transfer(sender_channel_address, transfer.transfer_id, "unableToCalculateSwap")
						.await;
					return Err(ForwardingError::UnableToCalculateSwap { source, cancellation })
				},
			}
		};

		let router_address = self.engine.self_address;
		let recipient_channel = match self
			.store
			.get_channel_state_by_counterparty_identifier(router_address, &hop.recipient, recipient_chain_id)
			.await?
		{
			Some(channel) if !channel.is_terminal() => channel,
			_ => {
				let cancellation = self
					.cancel_sender_transfer(sender_channel_address, transfer.transfer_id, "recipientChannelNotFound")
					.await;
				return Err(ForwardingError::RecipientChannelNotFound { router: router_address, cancellation })
			},
		};
		let recipient_channel_address = recipient_channel.channel_address.channel_address;
		let (recipient_address, recipient_identifier) = if recipient_channel.alice == router_address {
			(recipient_channel.bob, recipient_channel.bob_identifier.clone())
		} else {
			(recipient_channel.alice, recipient_channel.alice_identifier.clone())
		};
		let router_index = recipient_channel
			.party_index_of(router_address)
			.expect("the recipient channel was resolved by this router's own address");
		let router_collateral = recipient_channel.balance_for(&recipient_asset_id)[router_index];

		let queued_params = QueuedCreateParams {
			recipient_channel_address,
			sender_channel_address,
			sender_transfer_id: transfer.transfer_id,
			transfer_definition: transfer.transfer_definition,
			initial_state: forwarded_initial_state(&sender_channel, &transfer),
			encoded_initial_state: transfer.encoded_initial_state.clone(),
			transfer_timeout: transfer.transfer_timeout.saturating_sub(TRANSFER_DECREMENT),
			asset_id: recipient_asset_id,
			amount: recipient_amount,
			initiator: router_address,
			responder: recipient_address,
			meta: advance_routing_meta(&transfer.meta, &routing, self.engine.self_identifier.clone()),
		};

		if router_collateral < recipient_amount {
			let _ = self
				.messaging
				.send_request_collateral_message(
					&self.engine.self_identifier,
					&recipient_identifier,
					recipient_channel_address,
					recipient_asset_id,
					recipient_amount - router_collateral,
				)
				.await;
			self.enqueue_transfer_creation(recipient_channel_address, &queued_params).await?;
			return Ok(ForwardOutcome::Queued {
				reason: "insufficient collateral in the recipient channel; collateral requested and creation queued"
					.into(),
			})
		}

		let require_online = routing.require_online || self.config.require_online_default;
		let recipient_is_live = self
			.messaging
			.send_is_alive_message(&self.engine.self_identifier, &recipient_identifier, recipient_channel_address)
			.await
			.is_ok();

		if !recipient_is_live {
			if require_online {
				let cancellation = self
					.cancel_sender_transfer(sender_channel_address, transfer.transfer_id, "recipientOffline")
					.await;
				return Err(ForwardingError::RecipientOffline { cancellation })
			}
			self.enqueue_transfer_creation(recipient_channel_address, &queued_params).await?;
			return Ok(ForwardOutcome::Queued {
				reason: "recipient did not answer the liveness probe and is not required to be online".into(),
			})
		}

		match self.submit_forward(queued_params.clone()).await {
			Ok(update) => Ok(ForwardOutcome::Forwarded(Some(update))),
			Err(ForwardingError::Engine(e)) if e.is_timeout() => {
				self.enqueue_transfer_creation(recipient_channel_address, &queued_params).await?;
				Ok(ForwardOutcome::Queued {
					reason: "recipient engine timed out accepting the forwarded transfer".into(),
				})
			},
			Err(e) => {
				let cancellation =
					self.cancel_sender_transfer(sender_channel_address, transfer.transfer_id, &e.to_string()).await;
				tracing::warn!(?cancellation, error = %e, "forward failed, sender-side transfer cancelled");
				Err(e)
			},
		}
	}

	/// Resolution path: once the recipient-side transfer resolves, finds
	/// the sender-side transfer sharing its `routingId` and resolves it
	/// with the same resolver.
	pub async fn resolve_forwarded_transfer(
		&self,
		_recipient_channel_address: Address,
		transfer: Transfer,
	) -> Result<(), ForwardingError> {
		let Ok(routing) = serde_json::from_value::<RoutingMeta>(transfer.meta.clone()) else { return Ok(()) };
		let Some(resolver) = transfer.transfer_resolver.clone() else { return Ok(()) };

		let sender_side = self
			.store
			.get_transfers_by_routing_id(routing.routing_id)
			.await?
			.into_iter()
			.find(|t| t.transfer_id != transfer.transfer_id && t.is_active());
		let Some(sender_side) = sender_side else {
			// Either this node originated the payment (nothing upstream to
			// resolve) or the sender-side leg was already resolved.
			return Ok(())
		};

		match self
			.engine
			.resolve(sender_side.channel_address.channel_address, sender_side.transfer_id, resolver.clone())
			.await
		{
			Ok(_) => Ok(()),
			Err(e) if e.is_timeout() => {
				self.enqueue_transfer_resolution(
					sender_side.channel_address.channel_address,
					sender_side.transfer_id,
					resolver,
				)
				.await?;
				Ok(())
			},
			Err(e) => Err(ForwardingError::Engine(e)),
		}
	}

	/// Cancellation ("Cancellation"): resolves the
	/// sender-side transfer with its definition's canonical "zero-out"
	/// resolver, queuing the cancellation itself if it cannot be submitted
	/// synchronously.
	pub(crate) async fn cancel_sender_transfer(
		&self,
		channel_address: Address,
		transfer_id: TransferId,
		reason: &str,
	) -> CancellationOutcome {
		let definition = match self.store.get_transfer_state(transfer_id).await {
			Ok(Some(transfer)) => self.registry.get(transfer.transfer_definition).map(|def| {
				(def.cancel_resolver(&transfer.encoded_initial_state), transfer.encoded_initial_state)
			}),
			_ => None,
		};
		let Some((resolver, _encoded_initial_state)) = definition else {
			tracing::warn!(reason, "could not look up the cancel resolver, queuing cancellation instead");
			let _ = self.enqueue_transfer_resolution(channel_address, transfer_id, Vec::new()).await;
			return CancellationOutcome::Enqueued
		};

		match self.engine.resolve(channel_address, transfer_id, resolver.clone()).await {
			Ok(_) => CancellationOutcome::Executed,
			Err(_) => {
				let _ = self.enqueue_transfer_resolution(channel_address, transfer_id, resolver).await;
				CancellationOutcome::Enqueued
			},
		}
	}

	pub(crate) async fn submit_forward(&self, params: QueuedCreateParams) -> Result<Update, ForwardingError> {
		let create_params = CreateParams {
			transfer_definition: params.transfer_definition,
			initial_state: params.initial_state,
			encoded_initial_state: params.encoded_initial_state,
			transfer_timeout: params.transfer_timeout,
			asset_id: params.asset_id,
			amount: params.amount,
			initiator: params.initiator,
			responder: params.responder,
			meta: params.meta,
		};
		let (update, _transfer) =
			self.engine.create(params.recipient_channel_address, create_params).await.map_err(ForwardingError::Engine)?;
		Ok(update)
	}
}

/// Recovers the raw `initial_state` JSON the sender attached to `transfer`,
/// which `Transfer` itself doesn't carry (only its canonically-encoded
/// bytes do) but the `create` update that produced it does.
fn forwarded_initial_state(sender_channel: &Channel, transfer: &Transfer) -> serde_json::Value {
	if let Some(update) = &sender_channel.latest_update {
		if let UpdateDetails::Create { transfer_id, initial_state, .. } = &update.details {
			if *transfer_id == transfer.transfer_id {
				return initial_state.clone()
			}
		}
	}
	serde_json::json!({})
}

/// Pops the hop just taken off `routing`'s path and re-attaches the
/// remainder under this router's identifier as the new `senderIdentifier`,
/// leaving any non-routing application `meta` fields untouched.
fn advance_routing_meta(original_meta: &serde_json::Value, routing: &RoutingMeta, router_identifier: Identifier) -> serde_json::Value {
	let remaining = RoutingMeta {
		routing_id: routing.routing_id,
		path: routing.path[1..].to_vec(),
		require_online: routing.require_online,
		sender_identifier: Some(router_identifier),
	};
	let mut meta = if original_meta.is_object() { original_meta.clone() } else { serde_json::json!({}) };
	let Ok(routing_value) = serde_json::to_value(&remaining) else { return meta };
	if let (Some(meta_obj), Some(routing_obj)) = (meta.as_object_mut(), routing_value.as_object()) {
		for (k, v) in routing_obj {
			meta_obj.insert(k.clone(), v.clone());
		}
	}
	meta
}
