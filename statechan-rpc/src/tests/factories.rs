//! A minimal two-party fixture exposing alice's `Engine` behind an RPC
//! server under test, mirroring `statechan_protocol::tests::factories`.
use std::sync::Arc;

use statechan_chain::{
	HashlockTransferDefinition,
	InMemoryChainReader,
	TransferDefinitionRegistry,
	WithdrawTransferDefinition,
};
use statechan_lock::InMemoryLockService;
use statechan_messaging::InMemoryMessaging;
use statechan_primitives::types::{
	Address,
	ChainId,
	Identifier,
};
use statechan_protocol::{
	engine::{
		Engine,
		EngineMessageHandler,
	},
	events::new_event_bus,
};
use statechan_signer::LocalSigner;
use statechan_store::InMemoryStore;

use crate::server::{
	RpcServer,
	RpcServerState,
};

pub struct RpcFixture {
	pub server: RpcServer,
	pub bob_identifier: Identifier,
	pub bob_address: Address,
	pub chain_id: ChainId,
	pub factory: Address,
	pub alice_chain: Arc<InMemoryChainReader>,
	pub bob_chain: Arc<InMemoryChainReader>,
	pub bob_engine: Arc<Engine>,
}

fn registry() -> Arc<TransferDefinitionRegistry> {
	let mut registry = TransferDefinitionRegistry::new();
	registry.register(Box::new(HashlockTransferDefinition::new(Address::repeat_byte(0xAA))));
	registry.register(Box::new(WithdrawTransferDefinition::new(Address::repeat_byte(0xBB))));
	Arc::new(registry)
}

pub async fn rpc_fixture() -> RpcFixture {
	let messaging = Arc::new(InMemoryMessaging::new());
	let chain_id = ChainId(1);
	let factory = Address::repeat_byte(0xF0);

	let alice_signer = Arc::new(LocalSigner::from_raw(&[0x11; 32]).expect("valid key"));
	let bob_signer = Arc::new(LocalSigner::from_raw(&[0x22; 32]).expect("valid key"));
	let alice_address = alice_signer.address();
	let bob_address = bob_signer.address();
	let alice_identifier: Identifier = "alice".into();
	let bob_identifier: Identifier = "bob".into();

	let alice_registry = registry();
	let bob_registry = registry();
	let alice_chain =
		Arc::new(InMemoryChainReader::new().with_factory(chain_id, factory).with_registry(chain_id, &alice_registry));
	let bob_chain =
		Arc::new(InMemoryChainReader::new().with_factory(chain_id, factory).with_registry(chain_id, &bob_registry));

	let alice_engine = Arc::new(Engine::new(
		alice_identifier.clone(),
		alice_address,
		Arc::new(InMemoryStore::new()),
		Arc::new(InMemoryLockService::new()),
		alice_chain.clone(),
		messaging.clone(),
		alice_signer,
		alice_registry,
		new_event_bus(64),
	));
	let bob_engine = Arc::new(Engine::new(
		bob_identifier.clone(),
		bob_address,
		Arc::new(InMemoryStore::new()),
		Arc::new(InMemoryLockService::new()),
		bob_chain.clone(),
		messaging.clone(),
		bob_signer,
		bob_registry,
		new_event_bus(64),
	));

	messaging.on_receive_protocol_message(&alice_identifier, Arc::new(EngineMessageHandler(alice_engine.clone()))).await;
	messaging.on_receive_protocol_message(&bob_identifier, Arc::new(EngineMessageHandler(bob_engine.clone()))).await;

	let server = RpcServer::new(Arc::new(RpcServerState { engine: alice_engine }));

	RpcFixture { server, bob_identifier, bob_address, chain_id, factory, alice_chain, bob_chain, bob_engine }
}
