//! Dependency wiring, grounded on `bin/raiden/src/init.rs`'s `init_*`
//! functions: each builds one collaborator and returns `Result<_, String>`
//! so `main` can report a single flat error and exit.
use std::sync::Arc;

use statechan_chain::{
	ChainReader,
	HashlockTransferDefinition,
	InMemoryChainReader,
	TransferDefinitionRegistry,
	WithdrawTransferDefinition,
};
use statechan_forwarding::{
	config::ForwardingConfig,
	engine::ForwardingEngine,
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
use web3::signing::keccak256;

use crate::config::NodeConfig;

/// Derives a raw secp256k1 key from the configured mnemonic. Not a real
/// BIP-39 derivation, the signer's key material is an external
/// collaborator; a reproducible stand-in so the reference node has a
/// stable address across restarts for the same mnemonic string.
pub fn init_signer(mnemonic: &str) -> Result<Arc<LocalSigner>, String> {
	let seed = keccak256(mnemonic.as_bytes());
	let signer = LocalSigner::from_raw(&seed).map_err(|e| format!("could not derive signer key: {}", e))?;
	Ok(Arc::new(signer))
}

/// Builds the transfer-definition registry every channel on this node
/// shares. The reference node ships the two definitions `statechan-chain`
/// provides; a production deployment would register additional
/// definitions here.
pub fn init_registry(hashlock_address: Address, withdraw_address: Address) -> Arc<TransferDefinitionRegistry> {
	let mut registry = TransferDefinitionRegistry::new();
	registry.register(Box::new(HashlockTransferDefinition::new(hashlock_address)));
	registry.register(Box::new(WithdrawTransferDefinition::new(withdraw_address)));
	Arc::new(registry)
}

/// Builds the reference `ChainReader`, registering every chain named in
/// the config's `chainAddresses` map against the shared registry so
/// `Engine::setup` can resolve a factory/registry pair for any configured
/// chain id.
pub fn init_chain_reader(
	config: &NodeConfig,
	registry: &TransferDefinitionRegistry,
) -> Result<Arc<InMemoryChainReader>, String> {
	let mut chain = InMemoryChainReader::new();
	for (&chain_id, addresses) in &config.chain_addresses {
		chain = chain
			.with_factory(ChainId(chain_id), addresses.channel_factory_address)
			.with_registry(ChainId(chain_id), registry);
	}
	Ok(Arc::new(chain))
}

/// Wires the Update Engine to its ports: store, lock service, chain
/// reader, messaging, signer, registry, and a fresh event bus.
#[allow(clippy::too_many_arguments)]
pub async fn init_engine(
	identifier: Identifier,
	address: Address,
	chain: Arc<InMemoryChainReader>,
	messaging: Arc<InMemoryMessaging>,
	signer: Arc<LocalSigner>,
	registry: Arc<TransferDefinitionRegistry>,
) -> Result<Arc<Engine>, String> {
	let engine = Arc::new(Engine::new(
		identifier.clone(),
		address,
		Arc::new(InMemoryStore::new()),
		Arc::new(InMemoryLockService::new()),
		chain as Arc<dyn ChainReader>,
		messaging.clone() as Arc<dyn statechan_messaging::Messaging>,
		signer as Arc<dyn statechan_signer::Signer>,
		registry,
		new_event_bus(1024),
	));
	messaging.on_receive_protocol_message(&identifier, Arc::new(EngineMessageHandler(engine.clone()))).await;
	Ok(engine)
}

/// Builds the Forwarding Engine wrapping this node's own `Engine`,
/// spawning its event-loop task.
pub fn init_forwarding(engine: Arc<Engine>, config: ForwardingConfig) -> Arc<ForwardingEngine> {
	let forwarding = ForwardingEngine::new(
		engine.clone(),
		engine.store.clone(),
		engine.messaging.clone(),
		engine.registry.clone(),
		config,
	);
	forwarding.spawn();
	forwarding
}
