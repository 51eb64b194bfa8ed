//! The Transfer Builder: turns user-facing conditional
//! transfer/resolve/withdraw parameters into the Update Engine's `create`
//! and `resolve` calls, handling transfer-definition lookup, `routingId`
//! generation, and secret encryption along the way.
use serde::{
	Deserialize,
	Serialize,
};
use statechan_chain::TransferDefinitionRegistry;
use statechan_primitives::{
	state::{
		Channel,
		Transfer,
		Update,
	},
	types::{
		AssetId,
		BlockTimeout,
		ChainId,
		Identifier,
		PathHop,
		RoutingId,
		RoutingMeta,
		TransferId,
		U256,
	},
};
use ulid::Ulid;

use crate::{
	engine::{
		CreateParams,
		Engine,
	},
	errors::BuilderError,
};

/// User-facing parameters for creating a conditional transfer:
/// `{type, details, amount, assetId, recipient, recipientChainId?,
/// recipientAssetId?, timeout?, meta}`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ConditionalTransferParams {
	#[serde(rename = "type")]
	pub transfer_type: String,
	pub details: serde_json::Value,
	pub amount: U256,
	pub asset_id: AssetId,
	pub recipient: Identifier,
	pub recipient_chain_id: Option<ChainId>,
	pub recipient_asset_id: Option<AssetId>,
	pub timeout: Option<BlockTimeout>,
	/// Whether the recipient must answer a liveness probe before the router
	/// forwards this transfer onward (false, the recipient may be offline
	/// and the forward is queued for the Check-In Handler instead).
	#[serde(default)]
	pub require_online: bool,
	#[serde(default)]
	pub meta: serde_json::Value,
	/// Encryption target for `details`' `preImage`/`secret`, the recipient's
	/// messaging-layer public key. Required only when the registered
	/// definition's initial state carries a secret ("Encrypt
	/// `preImage`/`secret` in `meta` under recipient's public identifier
	/// when required by the definition").
	pub recipient_public_key: Option<Vec<u8>>,
}

/// User-facing parameters for resolving a conditional transfer.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ResolveConditionParams {
	pub transfer_id: TransferId,
	pub resolver: Vec<u8>,
}

/// User-facing parameters for an on-chain withdrawal, modeled as a
/// `Withdraw`-typed transfer ("withdrawals are modeled as a
/// transfer whose resolver triggers an on-chain payout").
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WithdrawParams {
	pub amount: U256,
	pub asset_id: AssetId,
	pub withdrawing_party_index: u8,
	#[serde(default)]
	pub meta: serde_json::Value,
}

const DEFAULT_TIMEOUT: BlockTimeout = 8640;

/// Converts `params` into the Update Engine's `create` params and invokes
/// it, attaching routing metadata to `meta` (steps 1-4).
pub async fn convert_conditional_transfer_params(
	engine: &Engine,
	channel_address: statechan_primitives::types::Address,
	registry: &TransferDefinitionRegistry,
	channel: &Channel,
	params: ConditionalTransferParams,
) -> Result<(Update, Transfer), BuilderError> {
	let definition = registry
		.resolve(&params.transfer_type)
		.map_err(|_| BuilderError::InvalidTransferType(params.transfer_type.clone()))?;

	let mut details = params.details;
	if let Some(key) = &params.recipient_public_key {
		encrypt_secret_fields(&mut details, key)?;
	}
	let encoded_initial_state =
		definition.encode_initial_state(&details).map_err(|e| BuilderError::Engine(
			crate::errors::EngineError::Validation(crate::errors::ErrorContext {
				node_error: Some(e.to_string()),
				..Default::default()
			}),
		))?;

	let routing_id = extract_routing_id(&params.meta)
		.unwrap_or_else(|| RoutingId::from(web3::signing::keccak256(&Ulid::new().to_bytes())));
	let routing_meta = RoutingMeta {
		routing_id,
		path: vec![PathHop {
			recipient: params.recipient.clone(),
			recipient_asset_id: params.recipient_asset_id,
			recipient_chain_id: params.recipient_chain_id,
		}],
		require_online: params.require_online,
		sender_identifier: Some(engine.self_identifier.clone()),
	};
	let meta = merge_routing_meta(params.meta, &routing_meta)?;

	let (initiator, responder) = initiator_responder(engine, channel);
	let create_params = CreateParams {
		transfer_definition: definition.address(),
		initial_state: details,
		encoded_initial_state,
		transfer_timeout: params.timeout.unwrap_or(DEFAULT_TIMEOUT),
		asset_id: params.asset_id,
		amount: params.amount,
		initiator,
		responder,
		meta,
	};
	engine.create(channel_address, create_params).await.map_err(BuilderError::Engine)
}

/// Converts `params` into the Update Engine's `resolve` call, the
/// symmetric counterpart to `convert_conditional_transfer_params`.
pub async fn convert_resolve_condition_params(
	engine: &Engine,
	channel_address: statechan_primitives::types::Address,
	params: ResolveConditionParams,
) -> Result<Update, BuilderError> {
	engine
		.resolve(channel_address, params.transfer_id, params.resolver)
		.await
		.map_err(BuilderError::Engine)
}

/// Converts `params` into a `Withdraw`-typed `create` call, the same shape
/// `convert_conditional_transfer_params` produces, just with a fixed
/// transfer type and no routing metadata.
pub async fn convert_withdraw_params(
	engine: &Engine,
	channel_address: statechan_primitives::types::Address,
	registry: &TransferDefinitionRegistry,
	channel: &Channel,
	params: WithdrawParams,
) -> Result<(Update, Transfer), BuilderError> {
	let definition = registry
		.resolve("Withdraw")
		.map_err(|_| BuilderError::InvalidTransferType("Withdraw".into()))?;
	let initial_state = serde_json::json!({ "withdrawingPartyIndex": params.withdrawing_party_index });
	let encoded_initial_state = definition.encode_initial_state(&initial_state).map_err(|e| {
		BuilderError::Engine(crate::errors::EngineError::Validation(crate::errors::ErrorContext {
			node_error: Some(e.to_string()),
			..Default::default()
		}))
	})?;
	let (initiator, responder) = initiator_responder(engine, channel);
	let (initiator, responder) = if params.withdrawing_party_index == 0 {
		(initiator, responder)
	} else {
		(responder, initiator)
	};
	let create_params = CreateParams {
		transfer_definition: definition.address(),
		initial_state,
		encoded_initial_state,
		transfer_timeout: DEFAULT_TIMEOUT,
		asset_id: params.asset_id,
		amount: params.amount,
		initiator,
		responder,
		meta: params.meta,
	};
	engine.create(channel_address, create_params).await.map_err(BuilderError::Engine)
}

fn initiator_responder(
	engine: &Engine,
	channel: &Channel,
) -> (statechan_primitives::types::Address, statechan_primitives::types::Address) {
	if channel.alice == engine.self_address {
		(channel.alice, channel.bob)
	} else {
		(channel.bob, channel.alice)
	}
}

fn extract_routing_id(meta: &serde_json::Value) -> Option<RoutingId> {
	meta.get("routingId").and_then(|v| v.as_str()).and_then(|s| s.parse().ok())
}

fn merge_routing_meta(
	mut meta: serde_json::Value,
	routing: &RoutingMeta,
) -> Result<serde_json::Value, BuilderError> {
	let routing_value = serde_json::to_value(routing).map_err(|e| {
		BuilderError::Engine(crate::errors::EngineError::Validation(crate::errors::ErrorContext {
			node_error: Some(e.to_string()),
			..Default::default()
		}))
	})?;
	if !meta.is_object() {
		meta = serde_json::json!({});
	}
	if let (Some(meta_obj), Some(routing_obj)) = (meta.as_object_mut(), routing_value.as_object()) {
		for (k, v) in routing_obj {
			meta_obj.insert(k.clone(), v.clone());
		}
	}
	Ok(meta)
}

/// Encrypts `preImage`/`secret` string fields in `details` under the
/// recipient's public key in place ("Encrypt `preImage`/
/// `secret` in `meta` ... when required by the definition").
fn encrypt_secret_fields(details: &mut serde_json::Value, recipient_public_key: &[u8]) -> Result<(), BuilderError> {
	let Some(obj) = details.as_object_mut() else { return Ok(()) };
	for field in ["preImage", "secret"] {
		if let Some(serde_json::Value::String(plain)) = obj.get(field).cloned() {
			let encrypted = statechan_signer::encrypt_for(recipient_public_key, plain.as_bytes())
				.map_err(|e| BuilderError::Encryption(e.to_string()))?;
			obj.insert(field.to_string(), serde_json::Value::String(hex::encode(encrypted)));
		}
	}
	Ok(())
}
