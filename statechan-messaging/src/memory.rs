use std::{
	collections::HashMap,
	sync::Arc,
	time::Duration,
};

use async_trait::async_trait;
use serde_json::{
	json,
	Value,
};
use statechan_primitives::types::{
	Address,
	AssetId,
	Identifier,
	U256,
};
use tokio::sync::{
	oneshot,
	Mutex,
};
use tracing::debug;
use ulid::Ulid;

use crate::{
	Messaging,
	MessagingError,
	ProtocolMessageHandler,
};

/// Reference in-memory `Messaging` adapter. See the module-level docs in
/// `lib.rs` for scope.
#[derive(Default)]
pub struct InMemoryMessaging {
	handlers: Mutex<HashMap<Identifier, Arc<dyn ProtocolMessageHandler>>>,
	inboxes: Mutex<HashMap<String, oneshot::Sender<Value>>>,
}

impl InMemoryMessaging {
	pub fn new() -> Self {
		Self::default()
	}

	/// Hands `payload` to `to`'s handler on a detached task. Dispatch must
	/// not block on handler completion: a caller that passes `reply_inbox`
	/// registers it with `await_reply` only after this returns, so the
	/// handler's eventual `reply()` has to run concurrently with that
	/// registration rather than racing ahead of it.
	async fn dispatch(
		&self,
		to: &Identifier,
		from: Identifier,
		payload: Value,
		reply_inbox: Option<String>,
	) -> Result<(), MessagingError> {
		let handler = self
			.handlers
			.lock()
			.await
			.get(to)
			.cloned()
			.ok_or_else(|| MessagingError::NoHandler(to.clone()))?;
		debug!(to = %to, from = %from, "dispatching protocol message");
		tokio::spawn(async move {
			handler.handle(payload, from, reply_inbox).await;
		});
		Ok(())
	}
}

#[async_trait]
impl Messaging for InMemoryMessaging {
	async fn on_receive_protocol_message(
		&self,
		identifier: &Identifier,
		handler: Arc<dyn ProtocolMessageHandler>,
	) {
		self.handlers.lock().await.insert(identifier.clone(), handler);
	}

	async fn send_protocol_message(
		&self,
		from: &Identifier,
		to: &Identifier,
		payload: Value,
		reply_inbox: Option<String>,
	) -> Result<(), MessagingError> {
		self.dispatch(to, from.clone(), payload, reply_inbox).await
	}

	async fn reply(&self, inbox: &str, payload: Value) -> Result<(), MessagingError> {
		let sender = self
			.inboxes
			.lock()
			.await
			.remove(inbox)
			.ok_or_else(|| MessagingError::UnknownInbox(inbox.to_owned()))?;
		sender.send(payload).map_err(|_| MessagingError::UnknownInbox(inbox.to_owned()))
	}

	async fn await_reply(&self, inbox: &str, timeout: Duration) -> Result<Value, MessagingError> {
		let (tx, rx) = oneshot::channel();
		self.inboxes.lock().await.insert(inbox.to_owned(), tx);
		match tokio::time::timeout(timeout, rx).await {
			Ok(Ok(value)) => Ok(value),
			Ok(Err(_)) | Err(_) => {
				self.inboxes.lock().await.remove(inbox);
				Err(MessagingError::Timeout(inbox.to_owned()))
			},
		}
	}

	async fn send_is_alive_message(
		&self,
		from: &Identifier,
		to: &Identifier,
		channel_address: Address,
	) -> Result<(), MessagingError> {
		let payload = json!({ "type": "isAlive", "channelAddress": channel_address });
		self.dispatch(to, from.clone(), payload, None).await
	}

	async fn send_restore_state_message(
		&self,
		from: &Identifier,
		to: &Identifier,
		payload: Value,
	) -> Result<Value, MessagingError> {
		let inbox = format!("restore-{}", Ulid::new());
		self.dispatch(to, from.clone(), payload, Some(inbox.clone())).await?;
		self.await_reply(&inbox, Duration::from_secs(30)).await
	}

	async fn send_setup_message(
		&self,
		from: &Identifier,
		to: &Identifier,
		payload: Value,
	) -> Result<(), MessagingError> {
		self.dispatch(to, from.clone(), payload, None).await
	}

	async fn send_request_collateral_message(
		&self,
		from: &Identifier,
		to: &Identifier,
		channel_address: Address,
		asset_id: AssetId,
		amount: U256,
	) -> Result<(), MessagingError> {
		let payload = json!({
			"type": "requestCollateral",
			"channelAddress": channel_address,
			"assetId": asset_id,
			"amount": amount.to_string(),
		});
		self.dispatch(to, from.clone(), payload, None).await
	}
}
