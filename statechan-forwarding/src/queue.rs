//! The Check-In Handler: on an `IsAlive` signal, drains a channel's
//! `PENDING` queued rows in insertion order, retrying each against the
//! protocol engine and reclassifying the outcome via compare-and-swap
//! status transitions.
use statechan_primitives::types::{
	Address,
	QueuedRouterUpdate,
	QueuedUpdateStatus,
	QueuedUpdateType,
	TransferId,
};

use crate::{
	engine::{
		ForwardingEngine,
		QueuedCreateParams,
	},
	errors::ForwardingError,
};

impl ForwardingEngine {
	pub(crate) async fn enqueue_transfer_creation(
		&self,
		channel_address: Address,
		params: &QueuedCreateParams,
	) -> Result<String, ForwardingError> {
		let payload = serde_json::to_value(params).expect("QueuedCreateParams serializes infallibly");
		self.enqueue(channel_address, QueuedUpdateType::TransferCreation, payload).await
	}

	pub(crate) async fn enqueue_transfer_resolution(
		&self,
		channel_address: Address,
		transfer_id: TransferId,
		resolver: Vec<u8>,
	) -> Result<String, ForwardingError> {
		let payload = serde_json::json!({
			"transferId": format!("{:#x}", transfer_id),
			"resolver": hex::encode(resolver),
		});
		self.enqueue(channel_address, QueuedUpdateType::TransferResolution, payload).await
	}

	async fn enqueue(
		&self,
		channel_address: Address,
		update_type: QueuedUpdateType,
		payload: serde_json::Value,
	) -> Result<String, ForwardingError> {
		let row = QueuedRouterUpdate {
			id: String::new(),
			channel_address,
			update_type,
			payload,
			status: QueuedUpdateStatus::Pending,
			created_at: wall_clock_seconds(),
			last_failure_reason: None,
		};
		Ok(self.store.queue_update(row).await?)
	}

	/// Drains `channel_address`'s `PENDING` rows in insertion order,
	/// serialized against any other check-in running for the same channel
	/// ("drained in insertion order").
	pub async fn check_in(&self, channel_address: Address) -> Result<(), ForwardingError> {
		if self.config.skip_check_in {
			return Ok(())
		}
		let mutex = {
			let mut locks = self.channel_locks.lock().await;
			locks.entry(channel_address).or_insert_with(|| std::sync::Arc::new(tokio::sync::Mutex::new(()))).clone()
		};
		let _guard = mutex.lock().await;

		let pending = self.store.get_queued_updates(channel_address, QueuedUpdateStatus::Pending).await?;
		for row in pending {
			self.store.set_update_status(&row.id, QueuedUpdateStatus::Processing, None).await?;
			match self.retry_queued_row(&row).await {
				Ok(()) => {
					self.store.set_update_status(&row.id, QueuedUpdateStatus::Complete, None).await?;
				},
				Err(e) if e.is_timeout() => {
					self.store.set_update_status(&row.id, QueuedUpdateStatus::Pending, Some(e.to_string())).await?;
				},
				Err(e) => {
					self.store.set_update_status(&row.id, QueuedUpdateStatus::Failed, Some(e.to_string())).await?;
				},
			}
		}
		Ok(())
	}

	async fn retry_queued_row(&self, row: &QueuedRouterUpdate) -> Result<(), ForwardingError> {
		match row.update_type {
			QueuedUpdateType::TransferCreation => self.retry_transfer_creation(row).await,
			QueuedUpdateType::TransferResolution => self.retry_transfer_resolution(row).await,
		}
	}

	async fn retry_transfer_creation(&self, row: &QueuedRouterUpdate) -> Result<(), ForwardingError> {
		let params: QueuedCreateParams = serde_json::from_value(row.payload.clone()).map_err(|_| {
			ForwardingError::InvalidForwardingInfo { transfer_id: TransferId::zero() }
		})?;
		self.submit_forward(params).await.map(|_| ())
	}

	async fn retry_transfer_resolution(&self, row: &QueuedRouterUpdate) -> Result<(), ForwardingError> {
		let transfer_id: TransferId = row
			.payload
			.get("transferId")
			.and_then(|v| v.as_str())
			.and_then(|s| s.parse().ok())
			.ok_or(ForwardingError::InvalidForwardingInfo { transfer_id: TransferId::zero() })?;
		let resolver = row
			.payload
			.get("resolver")
			.and_then(|v| v.as_str())
			.and_then(|s| hex::decode(s).ok())
			.ok_or(ForwardingError::InvalidForwardingInfo { transfer_id })?;
		self.engine.resolve(row.channel_address, transfer_id, resolver).await?;
		Ok(())
	}
}

fn wall_clock_seconds() -> u64 {
	std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}
