//! The RPC server, grounded on `chronx_rpc::server::RpcServer`: shared
//! state behind an `Arc`, a `start(addr)` that wires permissive CORS and
//! hands the built module to `jsonrpsee`'s HTTP server.
use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::core::{
	async_trait,
	RpcResult,
};
use jsonrpsee::server::{
	Server,
	ServerHandle,
};
use statechan_primitives::{
	state::{
		Channel,
		NetworkContext,
		Transfer,
		Update,
	},
	types::{
		Address,
		AssetId,
		BlockTimeout,
		ChainId,
		Identifier,
		RoutingId,
		TransferId,
	},
};
use statechan_protocol::{
	builder::{
		self,
		ConditionalTransferParams,
		ResolveConditionParams,
		WithdrawParams,
	},
	engine::Engine,
	errors::{
		ErrorContext,
		EngineError,
	},
};
use statechan_store::Store;
use tower_http::cors::{
	Any,
	CorsLayer,
};

use crate::api::ChanApiServer;
use crate::envelope::{
	builder_envelope,
	envelope,
	RpcEnvelope,
};
use crate::types::CreateOutcome;

/// Shared state behind the RPC server: one node's own `Engine`, wrapping
/// its own store/lock/chain/messaging/signer/registry/event bus.
pub struct RpcServerState {
	pub engine: Arc<Engine>,
}

pub struct RpcServer {
	state: Arc<RpcServerState>,
}

impl RpcServer {
	pub fn new(state: Arc<RpcServerState>) -> Self {
		Self { state }
	}

	/// Starts the JSON-RPC server on `addr` with permissive CORS. Returns a
	/// handle to stop it.
	pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
		let cors = CorsLayer::new().allow_methods(Any).allow_origin(Any).allow_headers(Any);
		let server = Server::builder()
			.set_http_middleware(tower::ServiceBuilder::new().layer(cors))
			.build(addr)
			.await?;
		let module = self.into_rpc();
		let handle = server.start(module);
		tracing::info!(%addr, "RPC server started");
		Ok(handle)
	}
}

impl RpcServer {
	async fn load_channel(&self, channel_address: Address) -> Result<Channel, EngineError> {
		self.state
			.engine
			.store
			.get_channel_state(channel_address)
			.await
			.map_err(|e| EngineError::External(ErrorContext { node_error: Some(e.to_string()), ..Default::default() }))?
			.ok_or_else(|| EngineError::ChannelNotFound(ErrorContext::channel(channel_address)))
	}
}

#[async_trait]
impl ChanApiServer for RpcServer {
	async fn setup(
		&self,
		bob: Address,
		bob_identifier: Identifier,
		chain_id: ChainId,
		factory: Address,
		network_context: NetworkContext,
		timeout: BlockTimeout,
	) -> RpcResult<RpcEnvelope<Channel>> {
		let result =
			self.state.engine.setup(bob, bob_identifier, chain_id, factory, network_context, timeout).await;
		Ok(envelope(result))
	}

	async fn deposit(&self, channel_address: Address, asset_id: AssetId) -> RpcResult<RpcEnvelope<Update>> {
		Ok(envelope(self.state.engine.deposit(channel_address, asset_id).await))
	}

	async fn create_conditional_transfer(
		&self,
		channel_address: Address,
		params: ConditionalTransferParams,
	) -> RpcResult<RpcEnvelope<CreateOutcome>> {
		let channel = match self.load_channel(channel_address).await {
			Ok(channel) => channel,
			Err(e) => return Ok(envelope(Err(e))),
		};
		let registry = self.state.engine.registry.clone();
		let result = builder::convert_conditional_transfer_params(
			&self.state.engine,
			channel_address,
			&registry,
			&channel,
			params,
		)
		.await
		.map(CreateOutcome::from);
		Ok(builder_envelope(result))
	}

	async fn resolve_condition(
		&self,
		channel_address: Address,
		params: ResolveConditionParams,
	) -> RpcResult<RpcEnvelope<Update>> {
		Ok(builder_envelope(
			builder::convert_resolve_condition_params(&self.state.engine, channel_address, params).await,
		))
	}

	async fn withdraw(
		&self,
		channel_address: Address,
		params: WithdrawParams,
	) -> RpcResult<RpcEnvelope<CreateOutcome>> {
		let channel = match self.load_channel(channel_address).await {
			Ok(channel) => channel,
			Err(e) => return Ok(envelope(Err(e))),
		};
		let registry = self.state.engine.registry.clone();
		let result =
			builder::convert_withdraw_params(&self.state.engine, channel_address, &registry, &channel, params)
				.await
				.map(CreateOutcome::from);
		Ok(builder_envelope(result))
	}

	async fn restore(
		&self,
		counterparty: Identifier,
		counterparty_address: Address,
		chain_id: ChainId,
		factory: Address,
	) -> RpcResult<RpcEnvelope<Channel>> {
		Ok(envelope(self.state.engine.restore(counterparty, counterparty_address, chain_id, factory).await))
	}

	async fn get_channel_state(&self, channel_address: Address) -> RpcResult<RpcEnvelope<Option<Channel>>> {
		let result = self
			.state
			.engine
			.store
			.get_channel_state(channel_address)
			.await
			.map_err(|e| EngineError::External(ErrorContext { node_error: Some(e.to_string()), ..Default::default() }));
		Ok(envelope(result))
	}

	async fn get_active_transfers(&self, channel_address: Address) -> RpcResult<RpcEnvelope<Vec<Transfer>>> {
		let result = self
			.state
			.engine
			.store
			.get_active_transfers(channel_address)
			.await
			.map_err(|e| EngineError::External(ErrorContext { node_error: Some(e.to_string()), ..Default::default() }));
		Ok(envelope(result))
	}

	async fn get_transfer_state(&self, transfer_id: TransferId) -> RpcResult<RpcEnvelope<Option<Transfer>>> {
		let result = self
			.state
			.engine
			.store
			.get_transfer_state(transfer_id)
			.await
			.map_err(|e| EngineError::External(ErrorContext { node_error: Some(e.to_string()), ..Default::default() }));
		Ok(envelope(result))
	}

	async fn get_transfers_by_routing_id(&self, routing_id: RoutingId) -> RpcResult<RpcEnvelope<Vec<Transfer>>> {
		let result = self
			.state
			.engine
			.store
			.get_transfers_by_routing_id(routing_id)
			.await
			.map_err(|e| EngineError::External(ErrorContext { node_error: Some(e.to_string()), ..Default::default() }));
		Ok(envelope(result))
	}
}
