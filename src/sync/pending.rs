//! Watcher for wallet-broadcast transactions awaiting finality.
//!
//! The tracker polls receipt status for every persisted `Pending` transaction
//! on its own timer. When one reaches a terminal state it persists the state
//! transition and signals the orchestrator, which forces an out-of-cycle
//! re-poll of the category matching the transaction's operation type so fresh
//! data is not delayed by the fixed polling interval.

use crate::explorer::{ReceiptSource, ReceiptStatus};
use crate::store::TransactionStore;
use crate::sync::events::SyncEvent;
use crate::types::{ChainId, TransactionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Polls pending transactions until they are mined, failed, or dropped.
pub struct PendingTransactionTracker {
	chain_id: ChainId,
	store: Arc<dyn TransactionStore>,
	receipts: Arc<dyn ReceiptSource>,
	poll_interval: Duration,
	events: mpsc::UnboundedSender<SyncEvent>,
	shutdown: watch::Receiver<bool>,
}

impl PendingTransactionTracker {
	pub fn new(
		chain_id: ChainId,
		store: Arc<dyn TransactionStore>,
		receipts: Arc<dyn ReceiptSource>,
		poll_interval: Duration,
		events: mpsc::UnboundedSender<SyncEvent>,
		shutdown: watch::Receiver<bool>,
	) -> Self {
		Self {
			chain_id,
			store,
			receipts,
			poll_interval,
			events,
			shutdown,
		}
	}

	/// Run the watch loop until shutdown.
	pub async fn run(mut self) {
		info!(
			"Starting pending-transaction tracker on chain {}",
			self.chain_id
		);

		let mut ticker = tokio::time::interval(self.poll_interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				_ = ticker.tick() => {}
				changed = self.shutdown.changed() => {
					if changed.is_err() || *self.shutdown.borrow() {
						break;
					}
					continue;
				}
			}

			self.poll_once().await;
		}

		info!("Pending-transaction tracker stopped");
	}

	/// Check every pending transaction once; terminal outcomes are persisted
	/// and signalled, lookup failures are retried on the next tick.
	async fn poll_once(&self) {
		let pending = match self.store.pending(self.chain_id).await {
			Ok(pending) => pending,
			Err(e) => {
				warn!("Failed to load pending transactions: {}", e);
				return;
			}
		};

		for mut record in pending {
			let status = match self.receipts.receipt_status(&record.id).await {
				Ok(status) => status,
				Err(e) => {
					debug!("Receipt lookup for {} failed: {}", record.id, e);
					continue;
				}
			};

			let next_state = match status {
				ReceiptStatus::Pending => continue,
				ReceiptStatus::Mined => TransactionState::Completed,
				ReceiptStatus::Failed => TransactionState::Failed,
				ReceiptStatus::Dropped => TransactionState::Error,
			};

			record.state = next_state;
			match self.store.add_or_update(vec![record]).await {
				Ok(mut changed) => {
					if let Some(finalized) = changed.pop() {
						info!(
							"Transaction {} finalized as {:?}",
							finalized.id, finalized.state
						);
						let _ = self
							.events
							.send(SyncEvent::TransactionFinalized { record: finalized });
					}
				}
				Err(e) => {
					warn!("Failed to persist finalized transaction: {}", e);
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::explorer::ExplorerError;
	use crate::store::MemoryTransactionStore;
	use crate::types::{
		OperationKind, OperationRecord, RecordId, TransactionCategory, TransactionRecord,
	};
	use chrono::Utc;
	use std::collections::HashMap;
	use std::sync::Mutex;

	struct MapReceipts {
		statuses: Mutex<HashMap<RecordId, ReceiptStatus>>,
	}

	#[async_trait::async_trait]
	impl ReceiptSource for MapReceipts {
		async fn receipt_status(&self, id: &RecordId) -> Result<ReceiptStatus, ExplorerError> {
			Ok(self
				.statuses
				.lock()
				.unwrap()
				.get(id)
				.copied()
				.unwrap_or(ReceiptStatus::Pending))
		}
	}

	fn pending_erc20(id: &str) -> TransactionRecord {
		TransactionRecord {
			id: id.to_string(),
			chain_id: 1,
			block_number: 0,
			transaction_index: 0,
			from: "0xf1".to_string(),
			to: "0xc0".to_string(),
			value: 0,
			gas: 60000,
			gas_price: 1,
			gas_used: 0,
			nonce: 1,
			timestamp: Utc::now(),
			state: TransactionState::Pending,
			operations: vec![OperationRecord {
				kind: OperationKind::Erc20Transfer,
				contract: "0xc0".to_string(),
				symbol: "DAI".to_string(),
				decimals: 18,
				from: "0xf1".to_string(),
				to: "0xf2".to_string(),
				amount: 100,
				token_id: None,
			}],
		}
	}

	#[tokio::test]
	async fn mined_transaction_is_finalized_and_signalled() {
		let store = Arc::new(MemoryTransactionStore::new());
		store
			.add_or_update(vec![pending_erc20("0xa"), pending_erc20("0xb")])
			.await
			.unwrap();

		let receipts = Arc::new(MapReceipts {
			statuses: Mutex::new(HashMap::from([("0xa".to_string(), ReceiptStatus::Mined)])),
		});

		let (tx, mut rx) = mpsc::unbounded_channel();
		let (_shutdown_tx, shutdown_rx) = watch::channel(false);
		let tracker = PendingTransactionTracker::new(
			1,
			store.clone(),
			receipts,
			Duration::from_secs(10),
			tx,
			shutdown_rx,
		);

		tracker.poll_once().await;

		match rx.try_recv().unwrap() {
			SyncEvent::TransactionFinalized { record } => {
				assert_eq!(record.id, "0xa");
				assert_eq!(record.state, TransactionState::Completed);
				assert_eq!(record.category(), TransactionCategory::Erc20);
			}
			other => panic!("unexpected event: {:?}", other),
		}
		// Only one finalization; 0xb is still pending.
		assert!(rx.try_recv().is_err());
		assert_eq!(store.pending(1).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn dropped_transaction_maps_to_error_state() {
		let store = Arc::new(MemoryTransactionStore::new());
		store.add_or_update(vec![pending_erc20("0xa")]).await.unwrap();

		let receipts = Arc::new(MapReceipts {
			statuses: Mutex::new(HashMap::from([("0xa".to_string(), ReceiptStatus::Dropped)])),
		});

		let (tx, mut rx) = mpsc::unbounded_channel();
		let (_shutdown_tx, shutdown_rx) = watch::channel(false);
		let tracker = PendingTransactionTracker::new(
			1,
			store.clone(),
			receipts,
			Duration::from_secs(10),
			tx,
			shutdown_rx,
		);

		tracker.poll_once().await;

		match rx.try_recv().unwrap() {
			SyncEvent::TransactionFinalized { record } => {
				assert_eq!(record.state, TransactionState::Error);
			}
			other => panic!("unexpected event: {:?}", other),
		}
	}
}
