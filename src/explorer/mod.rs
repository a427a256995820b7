//! Blockchain-explorer API surface.
//!
//! This module defines the narrow async contracts the sync engine consumes
//! from the remote indexing backend — paginated per-category transaction
//! fetches, the bounded recent-event window, and receipt lookups for pending
//! transactions — along with a reqwest-based client for etherscan-style
//! backends.

/// HTTP client for etherscan-style explorer backends
pub mod client;
/// Wire types and the explorer error taxonomy
pub mod types;

pub use client::HttpExplorerClient;
pub use types::{ExplorerError, ReceiptStatus};

use crate::sync::pagination::PaginationCursor;
use crate::types::{RawEvent, RecordId, TransactionCategory, TransactionRecord};

/// Remote transaction fetch, one call per category per tick.
///
/// Implementations must signal an unsupported category through
/// `ExplorerError::CategoryUnsupported` so the caller can distinguish it from
/// transient failures.
#[async_trait::async_trait]
pub trait ExplorerApi: Send + Sync {
	/// Fetch one page of transactions for the given category and wallet
	/// address at the position described by `cursor`.
	async fn fetch_transactions(
		&self,
		category: TransactionCategory,
		address: &str,
		cursor: &PaginationCursor,
	) -> Result<Vec<TransactionRecord>, ExplorerError>;
}

/// Source of decoded on-chain events, already scoped to a bounded recent
/// window by the backend.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
	async fn recent_events(&self) -> Result<Vec<RawEvent>, ExplorerError>;
}

/// Receipt lookups for transactions the wallet broadcast itself.
#[async_trait::async_trait]
pub trait ReceiptSource: Send + Sync {
	async fn receipt_status(&self, id: &RecordId) -> Result<ReceiptStatus, ExplorerError>;
}
