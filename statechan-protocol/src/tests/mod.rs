//! Scenario tests against a fully-wired two-party fixture.

use std::sync::Arc;

use statechan_lock::InMemoryLockService;
use statechan_primitives::{
	merkle::empty_root,
	types::{
		Address,
		U256,
	},
};
use statechan_store::{
	InMemoryStore,
	Store,
};

use crate::{
	engine::{
		CreateParams,
		Engine,
	},
	events::new_event_bus,
};

async fn setup_channel(fixture: &factories::TwoPartyFixture) -> Address {
	let network_context = statechan_primitives::state::NetworkContext {
		factory: fixture.factory,
		transfer_registry_address: Address::repeat_byte(0xCC),
		provider_url: "http://localhost:8545".into(),
	};
	let channel = fixture
		.alice
		.engine
		.setup(
			fixture.bob.address,
			fixture.bob.identifier.clone(),
			fixture.chain_id,
			fixture.factory,
			network_context,
			8640,
		)
		.await
		.expect("setup succeeds");
	channel.channel_address.channel_address
}

#[tokio::test]
async fn happy_path_setup_produces_nonce_one_and_empty_root() {
	let fixture = factories::two_party_fixture().await;
	let channel_address = setup_channel(&fixture).await;

	let alice_view =
		fixture.alice.engine.store.get_channel_state(channel_address).await.unwrap().expect("alice has channel");
	let bob_view =
		fixture.bob.engine.store.get_channel_state(channel_address).await.unwrap().expect("bob has channel");

	assert_eq!(alice_view.nonce, statechan_primitives::types::Nonce::initial());
	assert_eq!(bob_view.nonce, statechan_primitives::types::Nonce::initial());
	assert_eq!(alice_view.merkle_root, empty_root());
	assert_eq!(bob_view.merkle_root, empty_root());

	let latest = alice_view.latest_update.expect("latest update recorded");
	assert!(latest.is_fully_signed());
}

#[tokio::test]
async fn deposit_race_retries_until_both_sides_reconcile() {
	let fixture = factories::two_party_fixture().await;
	let channel_address = setup_channel(&fixture).await;
	let asset_id = Address::repeat_byte(0x01);

	// Alice observes her own 5-unit deposit; Bob has not yet deposited by
	// Alice's view.
	fixture.alice.chain.record_deposit(channel_address, asset_id, 0, U256::from(5));
	// Bob independently deposits 3 before Alice's update arrives.
	fixture.bob.chain.record_deposit(channel_address, asset_id, 1, U256::from(3));

	// Alice's first attempt only knows about her own deposit; Bob's
	// independent reconciliation disagrees and rejects with BadSignatures.
	let first = fixture.alice.engine.deposit_once(channel_address, asset_id).await;
	assert!(matches!(first, Err(crate::errors::EngineError::BadSignatures(_))));

	// Alice's view converges once her chain client also observes Bob's
	// deposit (as it would on the same underlying chain).
	fixture.alice.chain.record_deposit(channel_address, asset_id, 1, U256::from(3));

	let signed = fixture.alice.engine.deposit(channel_address, asset_id).await.expect("retry succeeds");
	assert!(signed.is_fully_signed());

	let alice_view = fixture.alice.engine.store.get_channel_state(channel_address).await.unwrap().unwrap();
	let bob_view = fixture.bob.engine.store.get_channel_state(channel_address).await.unwrap().unwrap();
	assert_eq!(alice_view.processed_deposits_alice.get(&asset_id), Some(&5));
	assert_eq!(alice_view.processed_deposits_bob.get(&asset_id), Some(&3));
	assert_eq!(bob_view.processed_deposits_alice.get(&asset_id), Some(&5));
	assert_eq!(bob_view.processed_deposits_bob.get(&asset_id), Some(&3));
}

#[tokio::test]
async fn create_then_resolve_restores_pre_create_sum_and_merkle_root() {
	let fixture = factories::two_party_fixture().await;
	let channel_address = setup_channel(&fixture).await;
	let asset_id = Address::repeat_byte(0x01);

	fixture.alice.chain.record_deposit(channel_address, asset_id, 0, U256::from(1_000));
	fixture.bob.chain.record_deposit(channel_address, asset_id, 0, U256::from(1_000));
	fixture.alice.engine.deposit(channel_address, asset_id).await.expect("deposit applies");

	let pre_create_balance =
		fixture.alice.engine.store.get_channel_state(channel_address).await.unwrap().unwrap().balance_for(&asset_id);
	let pre_create_sum = pre_create_balance[0] + pre_create_balance[1];

	let preimage = b"super-secret".to_vec();
	let lock_hash = web3::signing::keccak256(&preimage).to_vec();
	let (update, transfer) = fixture
		.alice
		.engine
		.create(
			channel_address,
			CreateParams {
				transfer_definition: Address::repeat_byte(0xAA),
				initial_state: serde_json::json!({ "lockHash": format!("0x{}", hex::encode(&lock_hash)) }),
				encoded_initial_state: lock_hash.clone(),
				transfer_timeout: 100,
				asset_id,
				amount: U256::from(100),
				initiator: fixture.alice.address,
				responder: fixture.bob.address,
				meta: serde_json::json!({}),
			},
		)
		.await
		.expect("create succeeds");
	assert!(update.is_fully_signed());

	let active = fixture.bob.engine.store.get_active_transfers(channel_address).await.unwrap();
	assert_eq!(active.len(), 1);
	assert_eq!(active[0].transfer_id, transfer.transfer_id);

	let resolved = fixture
		.alice
		.engine
		.resolve(channel_address, transfer.transfer_id, preimage)
		.await
		.expect("resolve succeeds");
	assert!(resolved.is_fully_signed());

	let post_resolve_balance =
		fixture.alice.engine.store.get_channel_state(channel_address).await.unwrap().unwrap().balance_for(&asset_id);
	assert_eq!(post_resolve_balance[0] + post_resolve_balance[1], pre_create_sum);

	let bob_active = fixture.bob.engine.store.get_active_transfers(channel_address).await.unwrap();
	assert!(bob_active.is_empty());
	let bob_channel = fixture.bob.engine.store.get_channel_state(channel_address).await.unwrap().unwrap();
	assert_eq!(bob_channel.merkle_root, empty_root());
}

#[tokio::test]
async fn stale_update_redelivery_is_a_no_op() {
	let fixture = factories::two_party_fixture().await;
	let channel_address = setup_channel(&fixture).await;
	let asset_id = Address::repeat_byte(0x01);

	fixture.alice.chain.record_deposit(channel_address, asset_id, 0, U256::from(10));
	fixture.bob.chain.record_deposit(channel_address, asset_id, 0, U256::from(10));
	let applied_update = fixture.alice.engine.deposit(channel_address, asset_id).await.expect("deposit applies");

	let pre_channel = fixture.alice.engine.store.get_channel_state(channel_address).await.unwrap().unwrap();
	let envelope = statechan_primitives::state::UpdateEnvelope {
		update: applied_update,
		previous_update: None,
	};

	// Bob already applied this exact update once; redelivering it must be
	// rejected as stale rather than re-applied: a nonce <= local nonce is
	// always a no-op.
	let err = fixture.bob.engine.handle_inbound(envelope).await.expect_err("nonce already applied is stale");
	assert!(matches!(err, crate::errors::EngineError::StaleUpdate(_)));

	let bob_channel_after = fixture.bob.engine.store.get_channel_state(channel_address).await.unwrap().unwrap();
	assert_eq!(bob_channel_after.nonce, pre_channel.nonce);
}

#[tokio::test]
async fn restore_after_storage_loss_recovers_channel_state_from_counterparty() {
	let fixture = factories::two_party_fixture().await;
	let channel_address = setup_channel(&fixture).await;
	let asset_id = Address::repeat_byte(0x01);

	fixture.alice.chain.record_deposit(channel_address, asset_id, 0, U256::from(10));
	fixture.bob.chain.record_deposit(channel_address, asset_id, 0, U256::from(10));
	fixture.alice.engine.deposit(channel_address, asset_id).await.expect("deposit applies");

	let bob_view = fixture.bob.engine.store.get_channel_state(channel_address).await.unwrap().unwrap();

	// Alice loses her local store; a fresh `Engine` sharing her identity
	// and signer but backed by an empty store stands in for her restarted
	// node.
	let recovering_store = Arc::new(InMemoryStore::new());
	let recovering_engine = Arc::new(Engine::new(
		fixture.alice.engine.self_identifier.clone(),
		fixture.alice.engine.self_address,
		recovering_store.clone(),
		Arc::new(InMemoryLockService::new()),
		fixture.alice.engine.chain.clone(),
		fixture.alice.engine.messaging.clone(),
		fixture.alice.engine.signer.clone(),
		fixture.alice.engine.registry.clone(),
		new_event_bus(64),
	));

	let restored = recovering_engine
		.restore(fixture.bob.identifier.clone(), fixture.bob.address, fixture.chain_id, fixture.factory)
		.await
		.expect("restore succeeds");

	assert_eq!(restored.nonce, bob_view.nonce);
	assert_eq!(restored.merkle_root, bob_view.merkle_root);

	let recovered = recovering_store.get_channel_state(channel_address).await.unwrap().expect("channel persisted");
	assert_eq!(recovered.nonce, bob_view.nonce);
	assert_eq!(recovered.balance_for(&asset_id), bob_view.balance_for(&asset_id));
}
