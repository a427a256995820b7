//! Transaction sync orchestrator.
//!
//! This module defines the `TransactionProvider`, which coordinates all
//! components involved in pulling a wallet's transaction history: it owns one
//! category scheduler per supported category plus the pending-transaction
//! tracker, persists incoming batches through the transaction store, and hands
//! the new-or-changed subset to token auto-detection.
//!
//! The provider is responsible for:
//! - Wiring schedulers, the tracker, and the event loop together
//! - The start/pause/resume lifecycle (cursors survive a pause)
//! - The one-time startup sweep of untrustworthy `Unknown`-state records
//! - Forcing an out-of-cycle re-poll when a pending transaction finalizes
//!
//! Schedulers operate independently: a failure or permanent stop in one
//! category never affects the others.

use crate::explorer::{ExplorerApi, ReceiptSource};
use crate::store::{PaginationStore, TokenDetector, TransactionStore};
use crate::sync::events::SyncEvent;
use crate::sync::pending::PendingTransactionTracker;
use crate::sync::scheduler::CategoryScheduler;
use crate::types::{ChainId, SyncError, TransactionCategory, TransactionState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The wallet/chain pair one provider instance synchronizes.
#[derive(Debug, Clone)]
pub struct WalletSession {
	pub address: String,
	pub chain_id: ChainId,
}

/// Configuration for the sync orchestrator.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
	/// Poll interval for plain transfers.
	pub normal_poll_interval: Duration,
	/// Poll interval for ERC-20 transfers.
	pub erc20_poll_interval: Duration,
	/// Poll interval for ERC-721 transfers.
	pub erc721_poll_interval: Duration,
	/// Poll interval for ERC-1155 transfers.
	pub erc1155_poll_interval: Duration,
	/// Poll interval for pending-transaction receipt checks.
	pub pending_poll_interval: Duration,
	/// Page size requested from the explorer.
	pub page_limit: usize,
}

impl Default for ProviderConfig {
	fn default() -> Self {
		Self {
			normal_poll_interval: Duration::from_secs(15),
			erc20_poll_interval: Duration::from_secs(25),
			erc721_poll_interval: Duration::from_secs(40),
			erc1155_poll_interval: Duration::from_secs(40),
			pending_poll_interval: Duration::from_secs(10),
			page_limit: 50,
		}
	}
}

impl ProviderConfig {
	fn interval_for(&self, category: TransactionCategory) -> Duration {
		match category {
			TransactionCategory::Normal => self.normal_poll_interval,
			TransactionCategory::Erc20 => self.erc20_poll_interval,
			TransactionCategory::Erc721 => self.erc721_poll_interval,
			TransactionCategory::Erc1155 => self.erc1155_poll_interval,
		}
	}
}

/// Provider lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
	/// Constructed but never started.
	Pending,
	Running,
	Paused,
	Stopped,
}

/// Counters accumulated by the orchestrator's event loop.
#[derive(Debug, Clone, Default)]
pub struct ProviderStats {
	pub batches_persisted: usize,
	pub records_persisted: usize,
	pub pending_finalized: usize,
	pub fetch_failures: usize,
	pub categories_stopped: usize,
}

impl ProviderStats {
	/// Human-readable summary for logging.
	pub fn summary(&self) -> String {
		format!(
			"{} records in {} batches, {} pending finalized, {} fetch failures, {} categories stopped",
			self.records_persisted,
			self.batches_persisted,
			self.pending_finalized,
			self.fetch_failures,
			self.categories_stopped
		)
	}
}

/// Handles for the running service tasks; dropped as a unit on pause/stop.
struct Runtime {
	shutdown: watch::Sender<bool>,
	tasks: Vec<JoinHandle<()>>,
}

/// Orchestrates category schedulers and the pending-transaction tracker for
/// one wallet session.
pub struct TransactionProvider {
	session: WalletSession,
	explorer: Arc<dyn ExplorerApi>,
	receipts: Arc<dyn ReceiptSource>,
	store: Arc<dyn TransactionStore>,
	cursors: Arc<dyn PaginationStore>,
	detector: Arc<dyn TokenDetector>,
	config: ProviderConfig,
	state: Mutex<ProviderState>,
	runtime: Mutex<Option<Runtime>>,
	stats: Arc<Mutex<ProviderStats>>,
}

impl TransactionProvider {
	pub fn new(
		session: WalletSession,
		explorer: Arc<dyn ExplorerApi>,
		receipts: Arc<dyn ReceiptSource>,
		store: Arc<dyn TransactionStore>,
		cursors: Arc<dyn PaginationStore>,
		detector: Arc<dyn TokenDetector>,
		config: ProviderConfig,
	) -> Self {
		Self {
			session,
			explorer,
			receipts,
			store,
			cursors,
			detector,
			config,
			state: Mutex::new(ProviderState::Pending),
			runtime: Mutex::new(None),
			stats: Arc::new(Mutex::new(ProviderStats::default())),
		}
	}

	/// Start synchronization. No-op unless the provider has never run.
	///
	/// Performs the one-time sweep removing transactions left in the
	/// `Unknown` terminal state by a previous run, then spawns all services.
	pub async fn start(&self) -> Result<(), SyncError> {
		{
			let state = self.state.lock().unwrap();
			if *state != ProviderState::Pending {
				debug!("start() ignored in state {:?}", *state);
				return Ok(());
			}
		}

		self.store
			.remove_in_states(&[TransactionState::Unknown], self.session.chain_id)
			.await?;

		*self.state.lock().unwrap() = ProviderState::Running;
		self.spawn_services();

		info!(
			"Transaction provider started for {} on chain {}",
			self.session.address, self.session.chain_id
		);
		Ok(())
	}

	/// Stop all timers without losing cursors. In-flight fetches complete but
	/// their results are dropped unpersisted.
	pub fn pause(&self) {
		let mut state = self.state.lock().unwrap();
		if *state != ProviderState::Running {
			return;
		}
		*state = ProviderState::Paused;
		drop(state);

		self.shutdown_runtime();
		info!("Transaction provider paused");
	}

	/// Restart schedulers and the tracker from their persisted cursors.
	pub fn resume(&self) {
		let mut state = self.state.lock().unwrap();
		if *state != ProviderState::Paused {
			return;
		}
		*state = ProviderState::Running;
		drop(state);

		self.spawn_services();
		info!("Transaction provider resumed");
	}

	/// Stop permanently.
	pub fn stop(&self) {
		{
			let mut state = self.state.lock().unwrap();
			if *state == ProviderState::Stopped {
				return;
			}
			*state = ProviderState::Stopped;
		}
		self.shutdown_runtime();
		info!(
			"Transaction provider stopped: {}",
			self.stats.lock().unwrap().summary()
		);
	}

	pub fn state(&self) -> ProviderState {
		*self.state.lock().unwrap()
	}

	pub fn stats(&self) -> ProviderStats {
		self.stats.lock().unwrap().clone()
	}

	fn shutdown_runtime(&self) {
		if let Some(runtime) = self.runtime.lock().unwrap().take() {
			// Tasks observe the signal at their next select point and end on
			// their own; handles are dropped rather than aborted so in-flight
			// ticks finish cleanly.
			let _ = runtime.shutdown.send(true);
			drop(runtime.tasks);
		}
	}

	/// Spawn schedulers, the pending tracker, and the event loop.
	fn spawn_services(&self) {
		let (events_tx, events_rx) = mpsc::unbounded_channel();
		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		let mut tasks = Vec::new();
		let mut force_handles = HashMap::new();

		for category in TransactionCategory::all() {
			let force = Arc::new(Notify::new());
			force_handles.insert(category, force.clone());

			let scheduler = CategoryScheduler::new(
				category,
				self.session.chain_id,
				self.session.address.clone(),
				self.explorer.clone(),
				self.cursors.clone(),
				self.config.interval_for(category),
				self.config.page_limit,
				events_tx.clone(),
				force,
				shutdown_rx.clone(),
			);
			tasks.push(tokio::spawn(scheduler.run()));
		}

		let tracker = PendingTransactionTracker::new(
			self.session.chain_id,
			self.store.clone(),
			self.receipts.clone(),
			self.config.pending_poll_interval,
			events_tx.clone(),
			shutdown_rx.clone(),
		);
		tasks.push(tokio::spawn(tracker.run()));

		let store = self.store.clone();
		let detector = self.detector.clone();
		let stats = self.stats.clone();
		let mut shutdown = shutdown_rx;
		tasks.push(tokio::spawn(async move {
			let mut events_rx = events_rx;
			loop {
				tokio::select! {
					maybe_event = events_rx.recv() => {
						let Some(event) = maybe_event else { break };
						handle_event(event, &store, &detector, &stats, &force_handles).await;
					}
					changed = shutdown.changed() => {
						if changed.is_err() || *shutdown.borrow() {
							break;
						}
					}
				}
			}
		}));

		*self.runtime.lock().unwrap() = Some(Runtime {
			shutdown: shutdown_tx,
			tasks,
		});
	}
}

/// Handle one scheduler/tracker event: persist, detect, force re-polls.
async fn handle_event(
	event: SyncEvent,
	store: &Arc<dyn TransactionStore>,
	detector: &Arc<dyn TokenDetector>,
	stats: &Arc<Mutex<ProviderStats>>,
	force_handles: &HashMap<TransactionCategory, Arc<Notify>>,
) {
	match event {
		SyncEvent::RecordsFetched { category, records } => {
			match store.add_or_update(records).await {
				Ok(changed) => {
					if changed.is_empty() {
						return;
					}
					debug!(
						"Persisted {} new-or-changed {} records",
						changed.len(),
						category.as_str()
					);
					{
						let mut stats = stats.lock().unwrap();
						stats.batches_persisted += 1;
						stats.records_persisted += changed.len();
					}
					detector.detect(&changed).await;
				}
				Err(e) => {
					warn!("Failed to persist {} batch: {}", category.as_str(), e);
				}
			}
		}
		SyncEvent::TransactionFinalized { record } => {
			stats.lock().unwrap().pending_finalized += 1;
			let category = record.category();
			if let Some(force) = force_handles.get(&category) {
				debug!(
					"Forcing {} re-poll after finalization of {}",
					category.as_str(),
					record.id
				);
				force.notify_one();
			}
		}
		SyncEvent::CategoryStopped { category } => {
			stats.lock().unwrap().categories_stopped += 1;
			info!("{} category permanently stopped", category.as_str());
		}
		SyncEvent::FetchFailed { category, error } => {
			stats.lock().unwrap().fetch_failures += 1;
			debug!("{} fetch failure recorded: {}", category.as_str(), error);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::explorer::{ExplorerError, ReceiptStatus};
	use crate::store::{MemoryPaginationStore, MemoryTransactionStore};
	use crate::sync::pagination::PaginationCursor;
	use crate::types::{RecordId, TransactionRecord};
	use chrono::Utc;

	fn init_tracing() {
		let _ = tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.with_test_writer()
			.try_init();
	}

	struct OnePageExplorer {
		records: Mutex<Option<Vec<TransactionRecord>>>,
	}

	#[async_trait::async_trait]
	impl ExplorerApi for OnePageExplorer {
		async fn fetch_transactions(
			&self,
			category: TransactionCategory,
			_address: &str,
			_cursor: &PaginationCursor,
		) -> Result<Vec<TransactionRecord>, ExplorerError> {
			if category == TransactionCategory::Normal {
				Ok(self.records.lock().unwrap().take().unwrap_or_default())
			} else {
				Err(ExplorerError::CategoryUnsupported)
			}
		}
	}

	struct SlowExplorer {
		records: Vec<TransactionRecord>,
	}

	#[async_trait::async_trait]
	impl ExplorerApi for SlowExplorer {
		async fn fetch_transactions(
			&self,
			category: TransactionCategory,
			_address: &str,
			_cursor: &PaginationCursor,
		) -> Result<Vec<TransactionRecord>, ExplorerError> {
			if category == TransactionCategory::Normal {
				tokio::time::sleep(Duration::from_secs(5)).await;
				Ok(self.records.clone())
			} else {
				Err(ExplorerError::CategoryUnsupported)
			}
		}
	}

	struct NoReceipts;

	#[async_trait::async_trait]
	impl ReceiptSource for NoReceipts {
		async fn receipt_status(&self, _id: &RecordId) -> Result<ReceiptStatus, ExplorerError> {
			Ok(ReceiptStatus::Pending)
		}
	}

	#[derive(Default)]
	struct RecordingDetector {
		seen: Mutex<Vec<RecordId>>,
	}

	#[async_trait::async_trait]
	impl TokenDetector for RecordingDetector {
		async fn detect(&self, records: &[TransactionRecord]) {
			self.seen
				.lock()
				.unwrap()
				.extend(records.iter().map(|r| r.id.clone()));
		}
	}

	fn record(id: &str, state: TransactionState) -> TransactionRecord {
		TransactionRecord {
			id: id.to_string(),
			chain_id: 1,
			block_number: 5,
			transaction_index: 0,
			from: "0xf1".to_string(),
			to: "0xf2".to_string(),
			value: 1,
			gas: 21000,
			gas_price: 1,
			gas_used: 21000,
			nonce: 0,
			timestamp: Utc::now(),
			state,
			operations: Vec::new(),
		}
	}

	fn provider(
		explorer: Arc<dyn ExplorerApi>,
		store: Arc<dyn TransactionStore>,
		detector: Arc<dyn TokenDetector>,
	) -> TransactionProvider {
		TransactionProvider::new(
			WalletSession {
				address: "0xwallet".to_string(),
				chain_id: 1,
			},
			explorer,
			Arc::new(NoReceipts),
			store,
			Arc::new(MemoryPaginationStore::new()),
			detector,
			ProviderConfig::default(),
		)
	}

	#[tokio::test(start_paused = true)]
	async fn start_sweeps_unknown_records_and_persists_fetched_batch() {
		init_tracing();
		let store = Arc::new(MemoryTransactionStore::new());
		store
			.add_or_update(vec![record("0xstale", TransactionState::Unknown)])
			.await
			.unwrap();

		let explorer = Arc::new(OnePageExplorer {
			records: Mutex::new(Some(vec![record("0xa", TransactionState::Completed)])),
		});
		let detector = Arc::new(RecordingDetector::default());
		let provider = provider(explorer, store.clone(), detector.clone());

		provider.start().await.unwrap();
		assert_eq!(provider.state(), ProviderState::Running);

		// Let the immediate first ticks and the event loop run.
		tokio::time::sleep(Duration::from_millis(100)).await;

		let window = store.transactions(1, None).await.unwrap();
		assert_eq!(window.len(), 1);
		assert_eq!(window[0].id, "0xa");
		assert_eq!(detector.seen.lock().unwrap().as_slice(), ["0xa"]);

		let stats = provider.stats();
		assert_eq!(stats.records_persisted, 1);
		// The three token categories are unsupported on this backend.
		assert_eq!(stats.categories_stopped, 3);

		provider.stop();
	}

	#[tokio::test(start_paused = true)]
	async fn start_is_a_noop_when_not_pending() {
		init_tracing();
		let store = Arc::new(MemoryTransactionStore::new());
		let explorer = Arc::new(OnePageExplorer {
			records: Mutex::new(None),
		});
		let provider = provider(explorer, store, Arc::new(RecordingDetector::default()));

		provider.start().await.unwrap();
		provider.start().await.unwrap();
		assert_eq!(provider.state(), ProviderState::Running);

		provider.pause();
		assert_eq!(provider.state(), ProviderState::Paused);
		// start() does not restart a paused provider; resume() does.
		provider.start().await.unwrap();
		assert_eq!(provider.state(), ProviderState::Paused);

		provider.resume();
		assert_eq!(provider.state(), ProviderState::Running);
		provider.stop();
	}

	#[tokio::test(start_paused = true)]
	async fn pause_preserves_cursors() {
		init_tracing();
		let store = Arc::new(MemoryTransactionStore::new());
		let cursors = Arc::new(MemoryPaginationStore::new());
		let explorer = Arc::new(OnePageExplorer {
			records: Mutex::new(Some(vec![record("0xa", TransactionState::Completed)])),
		});
		let provider = TransactionProvider::new(
			WalletSession {
				address: "0xwallet".to_string(),
				chain_id: 1,
			},
			explorer,
			Arc::new(NoReceipts),
			store,
			cursors.clone(),
			Arc::new(RecordingDetector::default()),
			ProviderConfig::default(),
		);

		provider.start().await.unwrap();
		tokio::time::sleep(Duration::from_millis(100)).await;
		provider.pause();

		let cursor = cursors
			.load(1, TransactionCategory::Normal)
			.await
			.unwrap()
			.expect("cursor persisted before pause");
		assert_eq!(cursor.last_fetched.len(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn fetch_completing_after_pause_is_not_persisted() {
		init_tracing();
		let store = Arc::new(MemoryTransactionStore::new());
		let explorer = Arc::new(SlowExplorer {
			records: vec![record("0xlate", TransactionState::Completed)],
		});
		let provider = provider(
			explorer,
			store.clone(),
			Arc::new(RecordingDetector::default()),
		);

		provider.start().await.unwrap();
		// The first tick is now inside the slow fetch.
		tokio::time::sleep(Duration::from_millis(10)).await;
		provider.pause();
		assert_eq!(provider.state(), ProviderState::Paused);

		// The in-flight fetch completes well after the pause; its results
		// must be dropped unpersisted.
		tokio::time::sleep(Duration::from_secs(30)).await;
		assert!(store.transactions(1, None).await.unwrap().is_empty());
	}
}
