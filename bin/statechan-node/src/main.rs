//! statechan reference node executable: wires the Update Engine, the
//! Forwarding Engine, and the RPC Surface to the in-memory reference port
//! adapters and serves `chan_` JSON-RPC until interrupted. Grounded on
//! `bin/raiden/src/main.rs`'s shape (parse CLI, build a logger, build
//! configs, build the app, run it) with `tracing_subscriber` in place of
//! `bin/raiden`'s `slog` setup, matching `bin/raiden`'s own
//! `tracing-subscriber` dependency and the rest of this workspace's
//! logging.
use std::process;
use std::sync::Arc;

use clap::Parser;
use statechan_messaging::InMemoryMessaging;
use statechan_primitives::types::Address;
use statechan_rpc::server::{
	RpcServer,
	RpcServerState,
};
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod init;

use cli::Opt;

/// Placeholder on-chain addresses for the two definitions this reference
/// node ships. A production deployment would read these from its chain
/// registry deployment; the in-memory adapter has no real registry to
/// read them from.
fn hashlock_definition_address() -> Address {
	Address::repeat_byte(0xA0)
}

fn withdraw_definition_address() -> Address {
	Address::repeat_byte(0xB0)
}

fn init_tracing(verbosity: u8) {
	let default_level = match verbosity {
		0 => "info",
		1 => "debug",
		_ => "trace",
	};
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("statechan={}", default_level)));
	tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
	let cli = Opt::parse();
	init_tracing(cli.verbose);

	let rpc_addr = cli.rpc_addr;
	let identifier: statechan_primitives::types::Identifier = cli.identifier.clone().into();

	tracing::info!(%identifier, "statechan node starting");

	let config = match cli.into_config() {
		Ok(config) => config,
		Err(e) => {
			eprintln!("Error building node config: {}", e);
			process::exit(1);
		},
	};

	let mnemonic = match config.mnemonic() {
		Ok(mnemonic) => mnemonic,
		Err(e) => {
			eprintln!("{}", e);
			process::exit(1);
		},
	};
	let signer = match init::init_signer(mnemonic) {
		Ok(signer) => signer,
		Err(e) => {
			eprintln!("Error initializing signer: {}", e);
			process::exit(1);
		},
	};
	let self_address = signer.address();

	let registry = init::init_registry(hashlock_definition_address(), withdraw_definition_address());
	let chain = match init::init_chain_reader(&config, &registry) {
		Ok(chain) => chain,
		Err(e) => {
			eprintln!("Error initializing chain reader: {}", e);
			process::exit(1);
		},
	};
	let messaging = Arc::new(InMemoryMessaging::new());

	let engine =
		match init::init_engine(identifier.clone(), self_address, chain, messaging, signer, registry).await {
			Ok(engine) => engine,
			Err(e) => {
				eprintln!("Error initializing engine: {}", e);
				process::exit(1);
			},
		};

	let forwarding_config = match config.forwarding_config() {
		Ok(config) => config,
		Err(e) => {
			eprintln!("Error building forwarding config: {}", e);
			process::exit(1);
		},
	};
	let _forwarding = init::init_forwarding(engine.clone(), forwarding_config);

	let rpc_state = Arc::new(RpcServerState { engine: engine.clone() });
	let rpc_server = RpcServer::new(rpc_state);
	let handle = match rpc_server.start(rpc_addr).await {
		Ok(handle) => handle,
		Err(e) => {
			eprintln!("Error starting RPC server: {}", e);
			process::exit(1);
		},
	};

	tracing::info!(%rpc_addr, %self_address, "statechan node ready");

	tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
	tracing::info!("shutting down");
	handle.stop().ok();
}
