//! The JSON-RPC 2.0 surface, grounded on `chronx-rpc::api::ChronxApi`: a
//! single `#[rpc(server)]` trait under one namespace, with `jsonrpsee`
//! rejecting a call whose params don't match the declared signature
//! before a handler ever runs.
use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;
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
use statechan_protocol::builder::{
	ConditionalTransferParams,
	ResolveConditionParams,
	WithdrawParams,
};

use crate::envelope::RpcEnvelope;
use crate::types::CreateOutcome;

#[rpc(server, namespace = "chan")]
pub trait ChanApi {
	/// "setup": opens a new channel with `bob`.
	#[method(name = "setup")]
	async fn setup(
		&self,
		bob: Address,
		bob_identifier: Identifier,
		chain_id: ChainId,
		factory: Address,
		network_context: NetworkContext,
		timeout: BlockTimeout,
	) -> RpcResult<RpcEnvelope<Channel>>;

	/// "Deposit Race": reconciles an on-chain deposit into
	/// `channel_address`'s off-chain balance.
	#[method(name = "deposit")]
	async fn deposit(&self, channel_address: Address, asset_id: AssetId) -> RpcResult<RpcEnvelope<Update>>;

	/// : builds and submits a conditional transfer `create`.
	#[method(name = "createConditionalTransfer")]
	async fn create_conditional_transfer(
		&self,
		channel_address: Address,
		params: ConditionalTransferParams,
	) -> RpcResult<RpcEnvelope<CreateOutcome>>;

	/// : resolves a conditional transfer.
	#[method(name = "resolveCondition")]
	async fn resolve_condition(
		&self,
		channel_address: Address,
		params: ResolveConditionParams,
	) -> RpcResult<RpcEnvelope<Update>>;

	/// : withdrawals modeled as a `Withdraw`-typed transfer.
	#[method(name = "withdraw")]
	async fn withdraw(
		&self,
		channel_address: Address,
		params: WithdrawParams,
	) -> RpcResult<RpcEnvelope<CreateOutcome>>;

	/// "Restore-State Procedure", requester side.
	#[method(name = "restore")]
	async fn restore(
		&self,
		counterparty: Identifier,
		counterparty_address: Address,
		chain_id: ChainId,
		factory: Address,
	) -> RpcResult<RpcEnvelope<Channel>>;

	/// Read-only: bypasses the channel lock (point 2).
	#[method(name = "getChannelState")]
	async fn get_channel_state(&self, channel_address: Address) -> RpcResult<RpcEnvelope<Option<Channel>>>;

	/// Read-only.
	#[method(name = "getActiveTransfers")]
	async fn get_active_transfers(&self, channel_address: Address) -> RpcResult<RpcEnvelope<Vec<Transfer>>>;

	/// Read-only.
	#[method(name = "getTransferState")]
	async fn get_transfer_state(&self, transfer_id: TransferId) -> RpcResult<RpcEnvelope<Option<Transfer>>>;

	/// Read-only.
	#[method(name = "getTransfersByRoutingId")]
	async fn get_transfers_by_routing_id(&self, routing_id: RoutingId) -> RpcResult<RpcEnvelope<Vec<Transfer>>>;
}
