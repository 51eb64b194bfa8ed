//! Wire DTOs that don't already exist as protocol types.
use serde::{
	Deserialize,
	Serialize,
};
use statechan_primitives::state::{
	Transfer,
	Update,
};

/// `Engine::create`'s `(Update, Transfer)` pair, named for the wire.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateOutcome {
	pub update: Update,
	pub transfer: Transfer,
}

impl From<(Update, Transfer)> for CreateOutcome {
	fn from((update, transfer): (Update, Transfer)) -> Self {
		Self { update, transfer }
	}
}
