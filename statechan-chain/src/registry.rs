use std::collections::HashMap;

use statechan_primitives::types::TransferDefinitionAddress;

use crate::{
	definitions::TransferDefinition,
	errors::DefinitionError,
};

/// A lookup from transfer-type name or literal definition address to the
/// registered `TransferDefinition`, the job assigns the
/// Transfer Builder ("Look up the transfer definition address from the
/// chain registry by `type`").
pub struct TransferDefinitionRegistry {
	by_name: HashMap<String, TransferDefinitionAddress>,
	by_address: HashMap<TransferDefinitionAddress, Box<dyn TransferDefinition>>,
}

impl TransferDefinitionRegistry {
	pub fn new() -> Self {
		Self { by_name: HashMap::new(), by_address: HashMap::new() }
	}

	/// Registers a definition under its own `name()`.
	pub fn register(&mut self, definition: Box<dyn TransferDefinition>) {
		self.by_name.insert(definition.name().to_owned(), definition.address());
		self.by_address.insert(definition.address(), definition);
	}

	/// Resolves a user-facing `type` (a registered name or a literal
	/// definition address rendered as `0x...`) to its definition.
	pub fn resolve(&self, transfer_type: &str) -> Result<&dyn TransferDefinition, DefinitionError> {
		if let Some(address) = self.by_name.get(transfer_type) {
			return self.by_address.get(address).map(|d| d.as_ref()).ok_or_else(|| {
				DefinitionError::NotRegistered(transfer_type.to_owned())
			})
		}
		if let Ok(address) = transfer_type.parse::<TransferDefinitionAddress>() {
			if let Some(definition) = self.by_address.get(&address) {
				return Ok(definition.as_ref())
			}
		}
		Err(DefinitionError::NotRegistered(transfer_type.to_owned()))
	}

	/// Resolves a definition by its address, used when re-hydrating a
	/// `Transfer`'s definition on the inbound/restore path.
	pub fn get(&self, address: TransferDefinitionAddress) -> Option<&dyn TransferDefinition> {
		self.by_address.get(&address).map(|d| d.as_ref())
	}

	/// All registered `(name, address)` pairs, the shape `ChainReader::
	/// get_registered_transfers` returns.
	pub fn entries(&self) -> Vec<(String, TransferDefinitionAddress)> {
		self.by_name.iter().map(|(name, address)| (name.clone(), *address)).collect()
	}
}

impl Default for TransferDefinitionRegistry {
	fn default() -> Self {
		Self::new()
	}
}
