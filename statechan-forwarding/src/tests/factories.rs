//! A three-party fixture (alice, router, bob) wiring two channels — alice to
//! router and router to bob — behind a single `ForwardingEngine` owned by
//! router's identity, used by the scenario tests in `super`.
use std::sync::{
	atomic::{
		AtomicBool,
		Ordering,
	},
	Arc,
};

use async_trait::async_trait;
use statechan_chain::{
	HashlockTransferDefinition,
	InMemoryChainReader,
	TransferDefinitionRegistry,
	WithdrawTransferDefinition,
};
use statechan_lock::InMemoryLockService;
use statechan_messaging::{
	InMemoryMessaging,
	Messaging,
	MessagingError,
	ProtocolMessageHandler,
};
use statechan_primitives::{
	state::NetworkContext,
	types::{
		Address,
		AssetId,
		ChainId,
		Identifier,
		U256,
	},
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

use crate::{
	config::ForwardingConfig,
	engine::ForwardingEngine,
};

/// Wraps `InMemoryMessaging` to make the liveness probe toggleably fail for
/// one identifier, simulating a recipient that has gone offline without
/// actually deregistering its protocol message handler (so a subsequent
/// `create` exchange to that same identifier still succeeds, isolating the
/// liveness-probe branch under test from the forward-submission path).
pub struct FlakyMessaging {
	inner: Arc<InMemoryMessaging>,
	offline: Identifier,
	is_offline: AtomicBool,
}

impl FlakyMessaging {
	pub fn new(inner: Arc<InMemoryMessaging>, offline: Identifier) -> Self {
		Self { inner, offline, is_offline: AtomicBool::new(false) }
	}

	pub fn set_offline(&self, offline: bool) {
		self.is_offline.store(offline, Ordering::SeqCst);
	}
}

#[async_trait]
impl Messaging for FlakyMessaging {
	async fn on_receive_protocol_message(&self, identifier: &Identifier, handler: Arc<dyn ProtocolMessageHandler>) {
		self.inner.on_receive_protocol_message(identifier, handler).await
	}

	async fn send_protocol_message(
		&self,
		from: &Identifier,
		to: &Identifier,
		payload: serde_json::Value,
		reply_inbox: Option<String>,
	) -> Result<(), MessagingError> {
		self.inner.send_protocol_message(from, to, payload, reply_inbox).await
	}

	async fn reply(&self, inbox: &str, payload: serde_json::Value) -> Result<(), MessagingError> {
		self.inner.reply(inbox, payload).await
	}

	async fn await_reply(&self, inbox: &str, timeout: std::time::Duration) -> Result<serde_json::Value, MessagingError> {
		self.inner.await_reply(inbox, timeout).await
	}

	async fn send_is_alive_message(
		&self,
		from: &Identifier,
		to: &Identifier,
		channel_address: Address,
	) -> Result<(), MessagingError> {
		if to == &self.offline && self.is_offline.load(Ordering::SeqCst) {
			return Err(MessagingError::NoHandler(to.clone()))
		}
		self.inner.send_is_alive_message(from, to, channel_address).await
	}

	async fn send_restore_state_message(
		&self,
		from: &Identifier,
		to: &Identifier,
		payload: serde_json::Value,
	) -> Result<serde_json::Value, MessagingError> {
		self.inner.send_restore_state_message(from, to, payload).await
	}

	async fn send_setup_message(
		&self,
		from: &Identifier,
		to: &Identifier,
		payload: serde_json::Value,
	) -> Result<(), MessagingError> {
		self.inner.send_setup_message(from, to, payload).await
	}

	async fn send_request_collateral_message(
		&self,
		from: &Identifier,
		to: &Identifier,
		channel_address: Address,
		asset_id: AssetId,
		amount: U256,
	) -> Result<(), MessagingError> {
		self.inner.send_request_collateral_message(from, to, channel_address, asset_id, amount).await
	}
}

/// One party's fully-wired `Engine` plus the chain-reader test hooks to
/// seed on-chain deposits.
pub struct Party {
	pub identifier: Identifier,
	pub address: Address,
	pub engine: Arc<Engine>,
	pub chain: Arc<InMemoryChainReader>,
}

/// Alice pays Bob through router's two channels; `forwarding` is router's
/// wired `ForwardingEngine`.
pub struct RoutedFixture {
	pub alice: Party,
	pub router: Party,
	pub bob: Party,
	pub alice_router_channel: Address,
	pub router_bob_channel: Address,
	pub forwarding: Arc<ForwardingEngine>,
}

fn registry() -> Arc<TransferDefinitionRegistry> {
	let mut registry = TransferDefinitionRegistry::new();
	registry.register(Box::new(HashlockTransferDefinition::new(Address::repeat_byte(0xAA))));
	registry.register(Box::new(WithdrawTransferDefinition::new(Address::repeat_byte(0xBB))));
	Arc::new(registry)
}

fn make_party(
	name: &str,
	key_byte: u8,
	messaging: Arc<dyn Messaging>,
	chain_id: ChainId,
	factory: Address,
) -> Party {
	let signer = Arc::new(LocalSigner::from_raw(&[key_byte; 32]).expect("valid key"));
	let address = signer.address();
	let identifier: Identifier = name.into();
	let registry = registry();
	let chain =
		Arc::new(InMemoryChainReader::new().with_factory(chain_id, factory).with_registry(chain_id, &registry));
	let engine = Arc::new(Engine::new(
		identifier.clone(),
		address,
		Arc::new(InMemoryStore::new()),
		Arc::new(InMemoryLockService::new()),
		chain.clone(),
		messaging,
		signer,
		registry,
		new_event_bus(64),
	));
	Party { identifier, address, engine, chain }
}

/// Builds alice-router and router-bob channels with a fresh `ForwardingEngine`
/// for router. Neither channel has any deposits yet.
pub async fn routed_fixture() -> RoutedFixture {
	let messaging = Arc::new(InMemoryMessaging::new());
	let chain_id = ChainId(1);
	let factory = Address::repeat_byte(0xF0);

	let alice = make_party("alice", 0x11, messaging.clone(), chain_id, factory);
	let router = make_party("router", 0x22, messaging.clone(), chain_id, factory);
	let bob = make_party("bob", 0x33, messaging.clone(), chain_id, factory);

	messaging.on_receive_protocol_message(&alice.identifier, Arc::new(EngineMessageHandler(alice.engine.clone()))).await;
	messaging.on_receive_protocol_message(&router.identifier, Arc::new(EngineMessageHandler(router.engine.clone()))).await;
	messaging.on_receive_protocol_message(&bob.identifier, Arc::new(EngineMessageHandler(bob.engine.clone()))).await;

	let network_context = NetworkContext {
		factory,
		transfer_registry_address: Address::repeat_byte(0xCC),
		provider_url: "http://localhost:8545".into(),
	};

	let alice_router_channel = alice
		.engine
		.setup(router.address, router.identifier.clone(), chain_id, factory, network_context.clone(), 8640)
		.await
		.expect("alice-router setup succeeds")
		.channel_address
		.channel_address;
	let router_bob_channel = router
		.engine
		.setup(bob.address, bob.identifier.clone(), chain_id, factory, network_context, 8640)
		.await
		.expect("router-bob setup succeeds")
		.channel_address
		.channel_address;

	let forwarding = ForwardingEngine::new(
		router.engine.clone(),
		router.engine.store.clone(),
		router.engine.messaging.clone(),
		router.engine.registry.clone(),
		ForwardingConfig::default(),
	);

	RoutedFixture { alice, router, bob, alice_router_channel, router_bob_channel, forwarding }
}

/// Like `routed_fixture`, but router's `Engine` and `ForwardingEngine` talk
/// through a `FlakyMessaging` that can make bob fail the liveness probe on
/// demand, without touching bob's registered handler (so the setup handshake
/// above always succeeds, and a later `submit_forward` to bob still reaches
/// bob's real handler once `set_offline(false)` is called again).
pub async fn routed_fixture_with_flaky_bob() -> (RoutedFixture, Arc<FlakyMessaging>) {
	let inner = Arc::new(InMemoryMessaging::new());
	let chain_id = ChainId(1);
	let factory = Address::repeat_byte(0xF0);

	let alice = make_party("alice", 0x11, inner.clone(), chain_id, factory);
	let bob = make_party("bob", 0x33, inner.clone(), chain_id, factory);
	let flaky = Arc::new(FlakyMessaging::new(inner.clone(), bob.identifier.clone()));
	let router = make_party("router", 0x22, flaky.clone(), chain_id, factory);

	inner.on_receive_protocol_message(&alice.identifier, Arc::new(EngineMessageHandler(alice.engine.clone()))).await;
	inner.on_receive_protocol_message(&router.identifier, Arc::new(EngineMessageHandler(router.engine.clone()))).await;
	inner.on_receive_protocol_message(&bob.identifier, Arc::new(EngineMessageHandler(bob.engine.clone()))).await;

	let network_context = NetworkContext {
		factory,
		transfer_registry_address: Address::repeat_byte(0xCC),
		provider_url: "http://localhost:8545".into(),
	};

	let alice_router_channel = alice
		.engine
		.setup(router.address, router.identifier.clone(), chain_id, factory, network_context.clone(), 8640)
		.await
		.expect("alice-router setup succeeds")
		.channel_address
		.channel_address;
	let router_bob_channel = router
		.engine
		.setup(bob.address, bob.identifier.clone(), chain_id, factory, network_context, 8640)
		.await
		.expect("router-bob setup succeeds")
		.channel_address
		.channel_address;

	let forwarding = ForwardingEngine::new(
		router.engine.clone(),
		router.engine.store.clone(),
		router.engine.messaging.clone(),
		router.engine.registry.clone(),
		ForwardingConfig::default(),
	);

	(RoutedFixture { alice, router, bob, alice_router_channel, router_bob_channel, forwarding }, flaky)
}
