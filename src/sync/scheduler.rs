//! Per-category transaction polling.
//!
//! One `CategoryScheduler` runs per transaction category, on its own timer,
//! with its own persisted pagination cursor. Each tick fetches one page from
//! the explorer, classifies new records through the pagination cursor, and
//! emits them to the orchestrator. A scheduler whose category the backend does
//! not support stops permanently; any other failure leaves the cursor
//! untouched and retries on the next tick.

use crate::explorer::{ExplorerApi, ExplorerError};
use crate::store::PaginationStore;
use crate::sync::events::SyncEvent;
use crate::sync::pagination::{self, PaginationCursor};
use crate::types::{ChainId, RecordId, TransactionCategory};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, mpsc, watch};
use tracing::{debug, info, warn};

/// Lifecycle state of one category scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
	/// Last tick succeeded (or no tick has run yet).
	Running,
	/// Permanently stopped: the backend does not support this category.
	Stopped,
	/// Last tick failed transiently; eligible for retry on the next tick.
	Failed,
}

/// Polls one transaction category against the explorer.
pub struct CategoryScheduler {
	category: TransactionCategory,
	chain_id: ChainId,
	wallet_address: String,
	explorer: Arc<dyn ExplorerApi>,
	cursors: Arc<dyn PaginationStore>,
	poll_interval: Duration,
	page_limit: usize,
	events: mpsc::UnboundedSender<SyncEvent>,
	force: Arc<Notify>,
	shutdown: watch::Receiver<bool>,
	state: SchedulerState,
}

impl CategoryScheduler {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		category: TransactionCategory,
		chain_id: ChainId,
		wallet_address: String,
		explorer: Arc<dyn ExplorerApi>,
		cursors: Arc<dyn PaginationStore>,
		poll_interval: Duration,
		page_limit: usize,
		events: mpsc::UnboundedSender<SyncEvent>,
		force: Arc<Notify>,
		shutdown: watch::Receiver<bool>,
	) -> Self {
		Self {
			category,
			chain_id,
			wallet_address,
			explorer,
			cursors,
			poll_interval,
			page_limit,
			events,
			force,
			shutdown,
			state: SchedulerState::Running,
		}
	}

	/// Run the polling loop until shutdown or a permanent stop.
	///
	/// The first tick fires immediately; later ticks follow the configured
	/// interval. A notification on the force handle triggers an out-of-cycle
	/// poll without waiting for the timer.
	pub async fn run(mut self) {
		info!(
			"Starting {} scheduler for {} on chain {}",
			self.category.as_str(),
			self.wallet_address,
			self.chain_id
		);

		let mut ticker = tokio::time::interval(self.poll_interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				_ = ticker.tick() => {}
				_ = self.force.notified() => {
					debug!("Forced re-poll of {} scheduler", self.category.as_str());
				}
				changed = self.shutdown.changed() => {
					if changed.is_err() || *self.shutdown.borrow() {
						break;
					}
					continue;
				}
			}

			self.tick().await;

			if self.state == SchedulerState::Stopped {
				break;
			}
		}

		info!("{} scheduler stopped", self.category.as_str());
	}

	/// Execute one poll: load cursor, fetch, classify, persist cursor, emit.
	async fn tick(&mut self) {
		let cursor = match self.cursors.load(self.chain_id, self.category).await {
			Ok(Some(cursor)) => cursor,
			Ok(None) => PaginationCursor::new(self.page_limit),
			Err(e) => {
				warn!(
					"{} scheduler failed to load cursor: {}",
					self.category.as_str(),
					e
				);
				self.state = SchedulerState::Failed;
				return;
			}
		};

		match self
			.explorer
			.fetch_transactions(self.category, &self.wallet_address, &cursor)
			.await
		{
			Ok(records) => {
				let ids: Vec<RecordId> = records.iter().map(|r| r.id.clone()).collect();
				let (new_ids, next_cursor) = pagination::advance(&ids, &cursor);

				if let Err(e) = self
					.cursors
					.save(self.chain_id, self.category, &next_cursor)
					.await
				{
					// Cursor not advanced; the same page is re-fetched and
					// re-deduplicated on the next tick.
					warn!(
						"{} scheduler failed to persist cursor: {}",
						self.category.as_str(),
						e
					);
					self.state = SchedulerState::Failed;
					return;
				}

				self.state = SchedulerState::Running;

				let new_set: HashSet<RecordId> = new_ids.into_iter().collect();
				let new_records: Vec<_> = records
					.into_iter()
					.filter(|r| new_set.contains(&r.id))
					.collect();

				if !new_records.is_empty() {
					debug!(
						"{} scheduler classified {} new records",
						self.category.as_str(),
						new_records.len()
					);
					let _ = self.events.send(SyncEvent::RecordsFetched {
						category: self.category,
						records: new_records,
					});
				}
			}
			Err(ExplorerError::CategoryUnsupported) => {
				info!(
					"{} not supported on chain {}, stopping scheduler permanently",
					self.category.as_str(),
					self.chain_id
				);
				self.state = SchedulerState::Stopped;
				let _ = self.events.send(SyncEvent::CategoryStopped {
					category: self.category,
				});
			}
			Err(e) => {
				warn!(
					"{} scheduler fetch failed, retrying next tick: {}",
					self.category.as_str(),
					e
				);
				self.state = SchedulerState::Failed;
				let _ = self.events.send(SyncEvent::FetchFailed {
					category: self.category,
					error: e.to_string(),
				});
			}
		}
	}
}
