#![warn(clippy::missing_docs_in_private_items)]

use std::time::Duration;

use crate::types::BlockTimeout;

/// Safety margin (in relative block timeouts) the router subtracts from the
/// sender-side transfer timeout when creating the recipient-side transfer,
/// guaranteeing the router has room to resolve the sender side after the
/// recipient resolves (step 5).
pub const TRANSFER_DECREMENT: BlockTimeout = 50;

/// Default bounded timeout for an outbound protocol exchange other than
/// withdraw confirmation.
pub const DEFAULT_PROTOCOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bounded timeout for a withdraw confirmation round-trip.
pub const WITHDRAW_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(90);

/// Number of retries the leader attempts for a `deposit` update classified
/// as `BadSignatures` before propagating the error (the "Deposit Race"
/// case).
pub const MAX_DEPOSIT_RETRIES: u8 = 3;

/// Recipient liveness probe timeout used before queueing an offline
/// recipient's transfer creation.
pub const LIVENESS_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
