//! Scenario tests driving the `ChanApi` trait methods directly (no HTTP
//! transport involved; `jsonrpsee`'s own test suite covers the transport).
mod factories;

use statechan_primitives::{
	state::NetworkContext,
	types::{
		Address,
		U256,
	},
};
use statechan_protocol::builder::ConditionalTransferParams;

use crate::{
	api::ChanApiServer,
	envelope::RpcEnvelope,
};

fn network_context(factory: Address) -> NetworkContext {
	NetworkContext { factory, transfer_registry_address: Address::repeat_byte(0xCC), provider_url: "http://localhost:8545".into() }
}

#[tokio::test]
async fn setup_deposit_and_create_round_trip_through_the_rpc_surface() {
	let fixture = factories::rpc_fixture().await;

	let setup_result = fixture
		.server
		.setup(
			fixture.bob_address,
			fixture.bob_identifier.clone(),
			fixture.chain_id,
			fixture.factory,
			network_context(fixture.factory),
			8640,
		)
		.await
		.expect("transport-level call succeeds");
	let channel = match setup_result {
		RpcEnvelope::Ok(channel) => channel,
		RpcEnvelope::Fail(f) => panic!("setup failed: {:?}", f),
	};
	let channel_address = channel.channel_address.channel_address;

	let asset_id = Address::repeat_byte(0x01);
	fixture.alice_chain.record_deposit(channel_address, asset_id, 0, U256::from(1_000));
	fixture.bob_chain.record_deposit(channel_address, asset_id, 0, U256::from(1_000));

	let deposit_result =
		fixture.server.deposit(channel_address, asset_id).await.expect("transport-level call succeeds");
	assert!(matches!(deposit_result, RpcEnvelope::Ok(_)));

	let preimage = b"rpc-secret".to_vec();
	let lock_hash = web3::signing::keccak256(&preimage).to_vec();
	let params = ConditionalTransferParams {
		transfer_type: "HashlockTransfer".into(),
		details: serde_json::json!({ "lockHash": format!("0x{}", hex::encode(&lock_hash)) }),
		amount: U256::from(50),
		asset_id,
		recipient: fixture.bob_identifier.clone(),
		recipient_chain_id: None,
		recipient_asset_id: None,
		timeout: None,
		meta: serde_json::json!({}),
		recipient_public_key: None,
	};
	let create_result = fixture
		.server
		.create_conditional_transfer(channel_address, params)
		.await
		.expect("transport-level call succeeds");
	let outcome = match create_result {
		RpcEnvelope::Ok(outcome) => outcome,
		RpcEnvelope::Fail(f) => panic!("create failed: {:?}", f),
	};
	assert_eq!(outcome.transfer.balance[0], U256::from(50));

	let active = fixture.bob_engine.store.get_active_transfers(channel_address).await.unwrap();
	assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn get_channel_state_returns_ok_none_for_an_unknown_channel() {
	let fixture = factories::rpc_fixture().await;
	let result =
		fixture.server.get_channel_state(Address::repeat_byte(0x99)).await.expect("transport-level call succeeds");
	match result {
		RpcEnvelope::Ok(None) => {},
		other => panic!("expected Ok(None) for an unknown channel, got {:?}", other),
	}
}

#[tokio::test]
async fn create_conditional_transfer_on_an_unknown_channel_reports_channel_not_found() {
	let fixture = factories::rpc_fixture().await;
	let params = ConditionalTransferParams {
		transfer_type: "HashlockTransfer".into(),
		details: serde_json::json!({}),
		amount: U256::from(1),
		asset_id: Address::repeat_byte(0x01),
		recipient: fixture.bob_identifier.clone(),
		recipient_chain_id: None,
		recipient_asset_id: None,
		timeout: None,
		meta: serde_json::json!({}),
		recipient_public_key: None,
	};
	let result = fixture
		.server
		.create_conditional_transfer(Address::repeat_byte(0xDE), params)
		.await
		.expect("transport-level call succeeds");
	match result {
		RpcEnvelope::Fail(f) => assert!(f.message.to_lowercase().contains("not found")),
		RpcEnvelope::Ok(_) => panic!("expected a failure for a channel that was never set up"),
	}
}
