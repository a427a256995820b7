//! Events flowing from schedulers and the pending tracker to the orchestrator.
//!
//! Schedulers never talk to the store directly; they emit events over an
//! unbounded channel and the orchestrator's event loop persists, detects, and
//! forces re-polls. This keeps a scheduler from ever blocking on a consumer
//! and gives the orchestrator a single place to observe every outcome.

use crate::types::{TransactionCategory, TransactionRecord};

/// Events emitted by the category schedulers and the pending tracker.
#[derive(Debug)]
pub enum SyncEvent {
	/// A scheduler classified records as new for its category.
	RecordsFetched {
		category: TransactionCategory,
		records: Vec<TransactionRecord>,
	},
	/// A scheduler stopped permanently: the backend does not support its
	/// category on this chain.
	CategoryStopped { category: TransactionCategory },
	/// A scheduler tick failed transiently; it will retry on its next tick.
	FetchFailed {
		category: TransactionCategory,
		error: String,
	},
	/// A wallet-broadcast transaction reached a terminal state.
	TransactionFinalized { record: TransactionRecord },
}
