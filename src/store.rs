//! Narrow collaborator interfaces around the sync engine.
//!
//! The engine never owns the persistent transaction/token tables; it talks to
//! them through the traits defined here, mirroring the repository pattern used
//! for state persistence elsewhere in this codebase. In-memory implementations
//! are provided for embedders without a database and for tests.

use crate::sync::pagination::PaginationCursor;
use crate::types::{
	ChainId, RecordId, SyncError, Token, TransactionCategory, TransactionRecord, TransactionState,
};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Writer-of-record for transactions.
///
/// `add_or_update` owns the only mutation rules: a record's `state` may move
/// `Pending` to a terminal state, and newly-discovered operations may be
/// appended; every other field is frozen at first insert.
#[async_trait::async_trait]
pub trait TransactionStore: Send + Sync {
	/// Persist a batch, returning only the subset that is new or changed.
	async fn add_or_update(
		&self,
		records: Vec<TransactionRecord>,
	) -> Result<Vec<TransactionRecord>, SyncError>;

	/// Delete every transaction on `chain_id` whose state is in `states`.
	async fn remove_in_states(
		&self,
		states: &[TransactionState],
		chain_id: ChainId,
	) -> Result<(), SyncError>;

	/// The known transaction window for a chain, optionally restricted to
	/// block numbers at or above `min_block`, newest first. `Unknown`-state
	/// records are never returned.
	async fn transactions(
		&self,
		chain_id: ChainId,
		min_block: Option<u64>,
	) -> Result<Vec<TransactionRecord>, SyncError>;

	/// Transactions still pending on a chain.
	async fn pending(&self, chain_id: ChainId) -> Result<Vec<TransactionRecord>, SyncError>;
}

/// Persistence for per-category pagination cursors.
#[async_trait::async_trait]
pub trait PaginationStore: Send + Sync {
	async fn load(
		&self,
		chain_id: ChainId,
		category: TransactionCategory,
	) -> Result<Option<PaginationCursor>, SyncError>;

	async fn save(
		&self,
		chain_id: ChainId,
		category: TransactionCategory,
		cursor: &PaginationCursor,
	) -> Result<(), SyncError>;
}

/// Token auto-detection, invoked after every persisted batch so newly
/// observed contracts can be onboarded.
#[async_trait::async_trait]
pub trait TokenDetector: Send + Sync {
	async fn detect(&self, records: &[TransactionRecord]);
}

/// Read access to the wallet's token collection.
#[async_trait::async_trait]
pub trait TokenRegistry: Send + Sync {
	/// Every token known to the wallet.
	async fn all_tokens(&self) -> Vec<Token>;

	/// Look up one token by contract and chain.
	async fn token(&self, contract: &str, chain_id: ChainId) -> Option<Token>;
}

/// In-memory transaction store.
#[derive(Default)]
pub struct MemoryTransactionStore {
	records: Mutex<HashMap<(ChainId, RecordId), TransactionRecord>>,
}

impl MemoryTransactionStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait::async_trait]
impl TransactionStore for MemoryTransactionStore {
	async fn add_or_update(
		&self,
		records: Vec<TransactionRecord>,
	) -> Result<Vec<TransactionRecord>, SyncError> {
		let mut table = self
			.records
			.lock()
			.map_err(|e| SyncError::Store(e.to_string()))?;

		let mut changed = Vec::new();
		for record in records {
			let key = (record.chain_id, record.id.clone());
			match table.get_mut(&key) {
				None => {
					changed.push(record.clone());
					table.insert(key, record);
				}
				Some(existing) => {
					let mut touched = false;

					if existing.state != record.state
						&& existing.state.can_transition_to(record.state)
					{
						existing.state = record.state;
						touched = true;
					}

					for op in &record.operations {
						if !existing.operations.contains(op) {
							existing.operations.push(op.clone());
							touched = true;
						}
					}

					if touched {
						changed.push(existing.clone());
					}
				}
			}
		}

		debug!("Persisted batch: {} new or changed", changed.len());
		Ok(changed)
	}

	async fn remove_in_states(
		&self,
		states: &[TransactionState],
		chain_id: ChainId,
	) -> Result<(), SyncError> {
		let mut table = self
			.records
			.lock()
			.map_err(|e| SyncError::Store(e.to_string()))?;
		table.retain(|(chain, _), record| *chain != chain_id || !states.contains(&record.state));
		Ok(())
	}

	async fn transactions(
		&self,
		chain_id: ChainId,
		min_block: Option<u64>,
	) -> Result<Vec<TransactionRecord>, SyncError> {
		let table = self
			.records
			.lock()
			.map_err(|e| SyncError::Store(e.to_string()))?;
		let mut out: Vec<TransactionRecord> = table
			.values()
			.filter(|r| r.chain_id == chain_id)
			.filter(|r| r.state != TransactionState::Unknown)
			.filter(|r| min_block.map(|b| r.block_number >= b).unwrap_or(true))
			.cloned()
			.collect();
		out.sort_by(|a, b| {
			b.block_number
				.cmp(&a.block_number)
				.then(b.transaction_index.cmp(&a.transaction_index))
		});
		Ok(out)
	}

	async fn pending(&self, chain_id: ChainId) -> Result<Vec<TransactionRecord>, SyncError> {
		let table = self
			.records
			.lock()
			.map_err(|e| SyncError::Store(e.to_string()))?;
		Ok(table
			.values()
			.filter(|r| r.chain_id == chain_id && r.state == TransactionState::Pending)
			.cloned()
			.collect())
	}
}

/// In-memory pagination cursor store.
#[derive(Default)]
pub struct MemoryPaginationStore {
	cursors: Mutex<HashMap<(ChainId, TransactionCategory), PaginationCursor>>,
}

impl MemoryPaginationStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait::async_trait]
impl PaginationStore for MemoryPaginationStore {
	async fn load(
		&self,
		chain_id: ChainId,
		category: TransactionCategory,
	) -> Result<Option<PaginationCursor>, SyncError> {
		let table = self
			.cursors
			.lock()
			.map_err(|e| SyncError::Cursor(e.to_string()))?;
		Ok(table.get(&(chain_id, category)).cloned())
	}

	async fn save(
		&self,
		chain_id: ChainId,
		category: TransactionCategory,
		cursor: &PaginationCursor,
	) -> Result<(), SyncError> {
		let mut table = self
			.cursors
			.lock()
			.map_err(|e| SyncError::Cursor(e.to_string()))?;
		table.insert((chain_id, category), cursor.clone());
		Ok(())
	}
}

/// In-memory token registry backed by a fixed token list.
#[derive(Default)]
pub struct MemoryTokenRegistry {
	tokens: Mutex<Vec<Token>>,
}

impl MemoryTokenRegistry {
	pub fn new(tokens: Vec<Token>) -> Self {
		Self {
			tokens: Mutex::new(tokens),
		}
	}

	/// Add or replace a token.
	pub fn upsert(&self, token: Token) {
		let mut tokens = self.tokens.lock().expect("token registry poisoned");
		if let Some(existing) = tokens
			.iter_mut()
			.find(|t| t.contract.eq_ignore_ascii_case(&token.contract) && t.chain_id == token.chain_id)
		{
			*existing = token;
		} else {
			tokens.push(token);
		}
	}
}

#[async_trait::async_trait]
impl TokenRegistry for MemoryTokenRegistry {
	async fn all_tokens(&self) -> Vec<Token> {
		self.tokens.lock().expect("token registry poisoned").clone()
	}

	async fn token(&self, contract: &str, chain_id: ChainId) -> Option<Token> {
		self.tokens
			.lock()
			.expect("token registry poisoned")
			.iter()
			.find(|t| t.contract.eq_ignore_ascii_case(contract) && t.chain_id == chain_id)
			.cloned()
	}
}

/// Token detector that does nothing, for embedders without auto-detection.
#[derive(Default)]
pub struct NoopTokenDetector;

#[async_trait::async_trait]
impl TokenDetector for NoopTokenDetector {
	async fn detect(&self, _records: &[TransactionRecord]) {}
}
