//! Command-line surface, grounded on `bin/raiden/src/cli.rs`'s `Opt`
//! struct: a `clap`-derived argument set that is merged with an optional
//! JSON config file into a `NodeConfig` (`cli.try_into()` there,
//! `Opt::into_config` here).
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::config::{
	parse_address,
	ConfigError,
	NodeConfig,
};

/// Parses a single `KEY=VALUE` pair, the same helper
/// `bin/raiden/src/cli.rs::parse_key_val` provides for `--flat-fee` and
/// friends.
fn parse_key_val<T, U>(s: &str) -> Result<(T, U), Box<dyn Error + Send + Sync + 'static>>
where
	T: std::str::FromStr,
	T::Err: Error + Send + Sync + 'static,
	U: std::str::FromStr,
	U::Err: Error + Send + Sync + 'static,
{
	let pos = s.find('=').ok_or_else(|| format!("invalid KEY=VALUE: no `=` found in `{}`", s))?;
	Ok((s[..pos].parse()?, s[pos + 1..].parse()?))
}

/// A statechan reference node: an Update Engine, a Forwarding Engine, and
/// the RPC Surface, wired to the in-memory reference port adapters.
#[derive(Parser, Debug)]
#[command(name = "statechan-node", about = "statechan reference routing node")]
pub struct Opt {
	/// This node's own identifier, used as the `alice`/`bob` party name in
	/// every channel it opens.
	#[arg(long)]
	pub identifier: String,

	/// Address the JSON-RPC server binds to.
	#[arg(long, default_value = "127.0.0.1:9545")]
	pub rpc_addr: SocketAddr,

	/// Path to a JSON file holding the node's configuration. CLI flags
	/// below are overlaid on top of it.
	#[arg(long)]
	pub config: Option<PathBuf>,

	/// The secret-material seed for this node's `Signer`. Out of scope as
	/// a real keystore/HSM integration (the signer port is an external
	/// collaborator); hashed into a raw secp256k1 key for the reference
	/// `LocalSigner`.
	#[arg(long)]
	pub mnemonic: Option<String>,

	/// A `chainId=providerUrl` pair; repeatable.
	#[arg(long = "chain-provider", value_parser = parse_key_val::<u64, String>, number_of_values = 1)]
	pub chain_providers: Vec<(u64, String)>,

	/// A `chainId=0xfactoryAddress` pair; repeatable.
	#[arg(long = "chain-factory", value_parser = parse_key_val::<u64, String>, number_of_values = 1)]
	pub chain_factories: Vec<(u64, String)>,

	/// A `chainId=0xregistryAddress` pair; repeatable.
	#[arg(long = "chain-registry", value_parser = parse_key_val::<u64, String>, number_of_values = 1)]
	pub chain_registries: Vec<(u64, String)>,

	/// Skips the Check-In Handler's periodic collateral scan.
	#[arg(long)]
	pub skip_check_in: bool,

	/// Verbose mode (-v, -vv, -vvv, ...); raises the default `tracing`
	/// filter level.
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,
}

impl Opt {
	/// Loads the config file (if any) and overlays the CLI's own
	/// chain/mnemonic/skip-check-in flags on top of it, the same shape as
	/// `bin/raiden/src/cli.rs`'s `cli.try_into()` building its config
	/// struct from parsed args.
	pub fn into_config(self) -> Result<NodeConfig, ConfigError> {
		let mut config = match &self.config {
			Some(path) => NodeConfig::from_file(path)?,
			None => NodeConfig::default(),
		};

		for (chain_id, url) in self.chain_providers {
			config.chain_providers.insert(chain_id, url);
		}
		for (chain_id, factory) in self.chain_factories {
			let factory = parse_address(&factory).map_err(ConfigError::InvalidAddress)?;
			config
				.chain_addresses
				.entry(chain_id)
				.or_insert_with(|| crate::config::ChainAddresses {
					channel_factory_address: factory,
					transfer_registry_address: Default::default(),
				})
				.channel_factory_address = factory;
		}
		for (chain_id, registry) in self.chain_registries {
			let registry = parse_address(&registry).map_err(ConfigError::InvalidAddress)?;
			config
				.chain_addresses
				.entry(chain_id)
				.or_insert_with(|| crate::config::ChainAddresses {
					channel_factory_address: Default::default(),
					transfer_registry_address: registry,
				})
				.transfer_registry_address = registry;
		}
		if self.mnemonic.is_some() {
			config.mnemonic = self.mnemonic;
		}
		config.skip_check_in = config.skip_check_in || self.skip_check_in;

		Ok(config)
	}
}
