//! Scenario tests against the three-party routed fixture.
mod factories;

use statechan_primitives::types::{
	Address,
	PathHop,
	RoutingId,
	RoutingMeta,
	U256,
};
use statechan_store::Store;

use crate::engine::{
	ForwardOutcome,
	QueuedCreateParams,
};

async fn seed_deposit(
	alice_chain: &statechan_chain::InMemoryChainReader,
	bob_chain: &statechan_chain::InMemoryChainReader,
	channel_address: Address,
	asset_id: Address,
	amount: U256,
) {
	alice_chain.record_deposit(channel_address, asset_id, 0, amount);
	bob_chain.record_deposit(channel_address, asset_id, 0, amount);
}

#[tokio::test]
async fn forwards_and_propagates_resolution_end_to_end() {
	let fixture = factories::routed_fixture().await;
	let asset_id = Address::repeat_byte(0x01);

	// Alice collateralizes her leg to router, and router collateralizes its
	// own leg to bob, independently observed on both sides of each channel.
	seed_deposit(&fixture.alice.chain, &fixture.router.chain, fixture.alice_router_channel, asset_id, U256::from(1_000))
		.await;
	fixture.alice.engine.deposit(fixture.alice_router_channel, asset_id).await.expect("alice-router deposit applies");

	seed_deposit(&fixture.router.chain, &fixture.bob.chain, fixture.router_bob_channel, asset_id, U256::from(1_000))
		.await;
	fixture.router.engine.deposit(fixture.router_bob_channel, asset_id).await.expect("router-bob deposit applies");

	let preimage = b"routed-secret".to_vec();
	let lock_hash = web3::signing::keccak256(&preimage).to_vec();
	let routing = RoutingMeta {
		routing_id: RoutingId::repeat_byte(0x77),
		path: vec![PathHop { recipient: fixture.bob.identifier.clone(), recipient_asset_id: None, recipient_chain_id: None }],
		require_online: false,
		sender_identifier: Some(fixture.alice.identifier.clone()),
	};

	let (_, alice_transfer) = fixture
		.alice
		.engine
		.create(
			fixture.alice_router_channel,
			statechan_protocol::engine::CreateParams {
				transfer_definition: Address::repeat_byte(0xAA),
				initial_state: serde_json::json!({ "lockHash": format!("0x{}", hex::encode(&lock_hash)) }),
				encoded_initial_state: lock_hash.clone(),
				transfer_timeout: 100,
				asset_id,
				amount: U256::from(100),
				initiator: fixture.alice.address,
				responder: fixture.router.address,
				meta: serde_json::to_value(&routing).unwrap(),
			},
		)
		.await
		.expect("alice creates the routed transfer");

	let router_side_transfer = fixture
		.router
		.engine
		.store
		.get_transfer_state(alice_transfer.transfer_id)
		.await
		.unwrap()
		.expect("router counter-signed alice's create");

	let outcome = fixture
		.forwarding
		.forward_conditional_transfer_created(fixture.alice_router_channel, router_side_transfer)
		.await
		.expect("forward succeeds");
	assert!(matches!(outcome, ForwardOutcome::Forwarded(Some(_))));

	let bob_active = fixture.bob.engine.store.get_active_transfers(fixture.router_bob_channel).await.unwrap();
	assert_eq!(bob_active.len(), 1);
	let bob_transfer = bob_active.into_iter().next().unwrap();
	assert_eq!(bob_transfer.balance[0], U256::from(100));
	assert_eq!(bob_transfer.asset_id, asset_id);

	fixture
		.bob
		.engine
		.resolve(fixture.router_bob_channel, bob_transfer.transfer_id, preimage.clone())
		.await
		.expect("bob resolves");

	let router_resolved_transfer = fixture
		.router
		.engine
		.store
		.get_transfer_state(bob_transfer.transfer_id)
		.await
		.unwrap()
		.expect("router countersigned bob's resolve");
	assert_eq!(router_resolved_transfer.transfer_resolver, Some(preimage.clone()));

	fixture
		.forwarding
		.resolve_forwarded_transfer(fixture.router_bob_channel, router_resolved_transfer)
		.await
		.expect("resolution propagates");

	let alice_resolved_transfer = fixture
		.alice
		.engine
		.store
		.get_transfer_state(alice_transfer.transfer_id)
		.await
		.unwrap()
		.expect("alice has the transfer");
	assert_eq!(alice_resolved_transfer.transfer_resolver, Some(preimage));
	assert!(!alice_resolved_transfer.is_active());
}

#[tokio::test]
async fn missing_recipient_channel_cancels_the_sender_leg() {
	let fixture = factories::routed_fixture().await;
	let asset_id = Address::repeat_byte(0x01);

	seed_deposit(&fixture.alice.chain, &fixture.router.chain, fixture.alice_router_channel, asset_id, U256::from(1_000))
		.await;
	fixture.alice.engine.deposit(fixture.alice_router_channel, asset_id).await.expect("alice-router deposit applies");

	let preimage = b"nobody-home".to_vec();
	let lock_hash = web3::signing::keccak256(&preimage).to_vec();
	let unknown_recipient: statechan_primitives::types::Identifier = "nobody".into();
	let routing = RoutingMeta {
		routing_id: RoutingId::repeat_byte(0x88),
		path: vec![PathHop { recipient: unknown_recipient, recipient_asset_id: None, recipient_chain_id: None }],
		require_online: false,
		sender_identifier: Some(fixture.alice.identifier.clone()),
	};

	let (_, alice_transfer) = fixture
		.alice
		.engine
		.create(
			fixture.alice_router_channel,
			statechan_protocol::engine::CreateParams {
				transfer_definition: Address::repeat_byte(0xAA),
				initial_state: serde_json::json!({ "lockHash": format!("0x{}", hex::encode(&lock_hash)) }),
				encoded_initial_state: lock_hash,
				transfer_timeout: 100,
				asset_id,
				amount: U256::from(100),
				initiator: fixture.alice.address,
				responder: fixture.router.address,
				meta: serde_json::to_value(&routing).unwrap(),
			},
		)
		.await
		.expect("alice creates the routed transfer");

	let router_side_transfer = fixture
		.router
		.engine
		.store
		.get_transfer_state(alice_transfer.transfer_id)
		.await
		.unwrap()
		.expect("router counter-signed alice's create");

	let err = fixture
		.forwarding
		.forward_conditional_transfer_created(fixture.alice_router_channel, router_side_transfer)
		.await
		.expect_err("no channel exists to the unknown recipient");
	assert!(matches!(err, crate::errors::ForwardingError::RecipientChannelNotFound { .. }));

	let alice_active = fixture.alice.engine.store.get_active_transfers(fixture.alice_router_channel).await.unwrap();
	assert!(alice_active.is_empty(), "the sender-side transfer should have been cancelled");
}

#[tokio::test]
async fn insufficient_collateral_queues_the_forward_and_requests_collateral() {
	let fixture = factories::routed_fixture().await;
	let asset_id = Address::repeat_byte(0x01);

	seed_deposit(&fixture.alice.chain, &fixture.router.chain, fixture.alice_router_channel, asset_id, U256::from(1_000))
		.await;
	fixture.alice.engine.deposit(fixture.alice_router_channel, asset_id).await.expect("alice-router deposit applies");
	// Deliberately no deposit into the router-bob channel: router has no
	// collateral there yet.

	let preimage = b"needs-collateral".to_vec();
	let lock_hash = web3::signing::keccak256(&preimage).to_vec();
	let routing = RoutingMeta {
		routing_id: RoutingId::repeat_byte(0x99),
		path: vec![PathHop { recipient: fixture.bob.identifier.clone(), recipient_asset_id: None, recipient_chain_id: None }],
		require_online: false,
		sender_identifier: Some(fixture.alice.identifier.clone()),
	};

	let (_, alice_transfer) = fixture
		.alice
		.engine
		.create(
			fixture.alice_router_channel,
			statechan_protocol::engine::CreateParams {
				transfer_definition: Address::repeat_byte(0xAA),
				initial_state: serde_json::json!({ "lockHash": format!("0x{}", hex::encode(&lock_hash)) }),
				encoded_initial_state: lock_hash,
				transfer_timeout: 100,
				asset_id,
				amount: U256::from(100),
				initiator: fixture.alice.address,
				responder: fixture.router.address,
				meta: serde_json::to_value(&routing).unwrap(),
			},
		)
		.await
		.expect("alice creates the routed transfer");

	let router_side_transfer = fixture
		.router
		.engine
		.store
		.get_transfer_state(alice_transfer.transfer_id)
		.await
		.unwrap()
		.expect("router counter-signed alice's create");

	let outcome = fixture
		.forwarding
		.forward_conditional_transfer_created(fixture.alice_router_channel, router_side_transfer)
		.await
		.expect("queuing is not an error");
	assert!(matches!(outcome, ForwardOutcome::Queued { .. }));

	let pending =
		fixture.router.engine.store.get_queued_updates(fixture.router_bob_channel, statechan_primitives::types::QueuedUpdateStatus::Pending)
			.await
			.unwrap();
	assert_eq!(pending.len(), 1);
	let queued: QueuedCreateParams = serde_json::from_value(pending[0].payload.clone()).expect("queued payload decodes");
	assert_eq!(queued.amount, U256::from(100));
	assert_eq!(queued.sender_transfer_id, alice_transfer.transfer_id);

	// Once router collateralizes, the Check-In Handler drains the row.
	seed_deposit(&fixture.router.chain, &fixture.bob.chain, fixture.router_bob_channel, asset_id, U256::from(1_000))
		.await;
	fixture.router.engine.deposit(fixture.router_bob_channel, asset_id).await.expect("router-bob deposit applies");

	fixture.forwarding.check_in(fixture.router_bob_channel).await.expect("check-in drains the queue");

	let bob_active = fixture.bob.engine.store.get_active_transfers(fixture.router_bob_channel).await.unwrap();
	assert_eq!(bob_active.len(), 1);
	assert_eq!(bob_active[0].balance[0], U256::from(100));
}

#[tokio::test]
async fn require_online_cancels_the_sender_leg_when_recipient_is_offline() {
	let (fixture, flaky) = factories::routed_fixture_with_flaky_bob().await;
	let asset_id = Address::repeat_byte(0x01);

	seed_deposit(&fixture.alice.chain, &fixture.router.chain, fixture.alice_router_channel, asset_id, U256::from(1_000))
		.await;
	fixture.alice.engine.deposit(fixture.alice_router_channel, asset_id).await.expect("alice-router deposit applies");
	seed_deposit(&fixture.router.chain, &fixture.bob.chain, fixture.router_bob_channel, asset_id, U256::from(1_000))
		.await;
	fixture.router.engine.deposit(fixture.router_bob_channel, asset_id).await.expect("router-bob deposit applies");

	let preimage = b"must-be-online".to_vec();
	let lock_hash = web3::signing::keccak256(&preimage).to_vec();
	let routing = RoutingMeta {
		routing_id: RoutingId::repeat_byte(0xA1),
		path: vec![PathHop { recipient: fixture.bob.identifier.clone(), recipient_asset_id: None, recipient_chain_id: None }],
		require_online: true,
		sender_identifier: Some(fixture.alice.identifier.clone()),
	};

	let (_, alice_transfer) = fixture
		.alice
		.engine
		.create(
			fixture.alice_router_channel,
			statechan_protocol::engine::CreateParams {
				transfer_definition: Address::repeat_byte(0xAA),
				initial_state: serde_json::json!({ "lockHash": format!("0x{}", hex::encode(&lock_hash)) }),
				encoded_initial_state: lock_hash,
				transfer_timeout: 100,
				asset_id,
				amount: U256::from(100),
				initiator: fixture.alice.address,
				responder: fixture.router.address,
				meta: serde_json::to_value(&routing).unwrap(),
			},
		)
		.await
		.expect("alice creates the routed transfer");

	let router_side_transfer = fixture
		.router
		.engine
		.store
		.get_transfer_state(alice_transfer.transfer_id)
		.await
		.unwrap()
		.expect("router counter-signed alice's create");

	flaky.set_offline(true);

	let err = fixture
		.forwarding
		.forward_conditional_transfer_created(fixture.alice_router_channel, router_side_transfer)
		.await
		.expect_err("an offline required-online recipient must fail the forward");
	assert!(matches!(err, crate::errors::ForwardingError::RecipientOffline { .. }));

	let alice_active = fixture.alice.engine.store.get_active_transfers(fixture.alice_router_channel).await.unwrap();
	assert!(alice_active.is_empty(), "the sender-side transfer should have been cancelled");

	let bob_active = fixture.bob.engine.store.get_active_transfers(fixture.router_bob_channel).await.unwrap();
	assert!(bob_active.is_empty(), "nothing should have been forwarded to bob");
}

#[tokio::test]
async fn offline_tolerant_transfer_queues_after_the_failed_liveness_probe() {
	let (fixture, flaky) = factories::routed_fixture_with_flaky_bob().await;
	let asset_id = Address::repeat_byte(0x01);

	seed_deposit(&fixture.alice.chain, &fixture.router.chain, fixture.alice_router_channel, asset_id, U256::from(1_000))
		.await;
	fixture.alice.engine.deposit(fixture.alice_router_channel, asset_id).await.expect("alice-router deposit applies");
	seed_deposit(&fixture.router.chain, &fixture.bob.chain, fixture.router_bob_channel, asset_id, U256::from(1_000))
		.await;
	fixture.router.engine.deposit(fixture.router_bob_channel, asset_id).await.expect("router-bob deposit applies");

	let preimage = b"fine-if-offline".to_vec();
	let lock_hash = web3::signing::keccak256(&preimage).to_vec();
	let routing = RoutingMeta {
		routing_id: RoutingId::repeat_byte(0xA2),
		path: vec![PathHop { recipient: fixture.bob.identifier.clone(), recipient_asset_id: None, recipient_chain_id: None }],
		require_online: false,
		sender_identifier: Some(fixture.alice.identifier.clone()),
	};

	let (_, alice_transfer) = fixture
		.alice
		.engine
		.create(
			fixture.alice_router_channel,
			statechan_protocol::engine::CreateParams {
				transfer_definition: Address::repeat_byte(0xAA),
				initial_state: serde_json::json!({ "lockHash": format!("0x{}", hex::encode(&lock_hash)) }),
				encoded_initial_state: lock_hash,
				transfer_timeout: 100,
				asset_id,
				amount: U256::from(100),
				initiator: fixture.alice.address,
				responder: fixture.router.address,
				meta: serde_json::to_value(&routing).unwrap(),
			},
		)
		.await
		.expect("alice creates the routed transfer");

	let router_side_transfer = fixture
		.router
		.engine
		.store
		.get_transfer_state(alice_transfer.transfer_id)
		.await
		.unwrap()
		.expect("router counter-signed alice's create");

	flaky.set_offline(true);

	let outcome = fixture
		.forwarding
		.forward_conditional_transfer_created(fixture.alice_router_channel, router_side_transfer)
		.await
		.expect("an offline-tolerant transfer queues instead of failing");
	assert!(matches!(outcome, ForwardOutcome::Queued { .. }));

	let alice_active = fixture.alice.engine.store.get_active_transfers(fixture.alice_router_channel).await.unwrap();
	assert_eq!(alice_active.len(), 1, "the sender-side transfer must not be cancelled while queued");

	let pending = fixture
		.router
		.engine
		.store
		.get_queued_updates(fixture.router_bob_channel, statechan_primitives::types::QueuedUpdateStatus::Pending)
		.await
		.unwrap();
	assert_eq!(pending.len(), 1);

	// Recipient comes back; the Check-In Handler drains the queued forward.
	flaky.set_offline(false);
	fixture.forwarding.check_in(fixture.router_bob_channel).await.expect("check-in drains the queue");

	let bob_active = fixture.bob.engine.store.get_active_transfers(fixture.router_bob_channel).await.unwrap();
	assert_eq!(bob_active.len(), 1);
	assert_eq!(bob_active[0].balance[0], U256::from(100));
}
