//! Shared data model for the transaction/activity synchronization engine.
//!
//! This module defines the records that flow between the explorer client, the
//! category schedulers, the orchestrator, the persistent store, and the
//! activity resolver: transactions and their token operations, raw on-chain
//! events, tokens, and the error taxonomy used across the sync layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::explorer::ExplorerError;

/// Chain identifier (EIP-155 style numeric id).
pub type ChainId = u64;

/// Transaction identifier (the transaction hash, lowercase hex).
pub type RecordId = String;

/// The four transaction categories tracked independently against the explorer.
///
/// Each category is polled by its own scheduler with its own pagination
/// cursor; a backend may support only a subset of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionCategory {
	/// Plain/native value transfers.
	Normal,
	/// ERC-20 token transfers.
	Erc20,
	/// ERC-721 token transfers.
	Erc721,
	/// ERC-1155 token transfers.
	Erc1155,
}

impl TransactionCategory {
	/// All categories, in scheduling order.
	pub fn all() -> [TransactionCategory; 4] {
		[
			TransactionCategory::Normal,
			TransactionCategory::Erc20,
			TransactionCategory::Erc721,
			TransactionCategory::Erc1155,
		]
	}

	/// Short name used for logging and cursor keys.
	pub fn as_str(&self) -> &'static str {
		match self {
			TransactionCategory::Normal => "normal",
			TransactionCategory::Erc20 => "erc20",
			TransactionCategory::Erc721 => "erc721",
			TransactionCategory::Erc1155 => "erc1155",
		}
	}
}

/// Lifecycle state of a persisted transaction.
///
/// `Pending` may only move to `Completed`, `Error`, or `Failed`. `Unknown` is
/// terminal but not trustworthy to display; records left in it are swept at
/// orchestrator startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
	Completed,
	Pending,
	Error,
	Failed,
	Unknown,
}

impl TransactionState {
	/// Whether a transaction in this state will never change again.
	pub fn is_terminal(&self) -> bool {
		!matches!(self, TransactionState::Pending)
	}

	/// Whether the `from -> to` state transition is permitted.
	///
	/// Only `Pending` transitions anywhere; terminal states are frozen.
	pub fn can_transition_to(&self, to: TransactionState) -> bool {
		matches!(self, TransactionState::Pending)
			&& matches!(
				to,
				TransactionState::Completed | TransactionState::Error | TransactionState::Failed
			)
	}
}

/// Kind of a token operation embedded in a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
	NativeTransfer,
	Erc20Transfer,
	Erc20Approve,
	Erc721Transfer,
	Erc1155Transfer,
}

impl OperationKind {
	/// The scheduler category responsible for discovering this operation.
	pub fn category(&self) -> TransactionCategory {
		match self {
			OperationKind::NativeTransfer => TransactionCategory::Normal,
			OperationKind::Erc20Transfer | OperationKind::Erc20Approve => {
				TransactionCategory::Erc20
			}
			OperationKind::Erc721Transfer => TransactionCategory::Erc721,
			OperationKind::Erc1155Transfer => TransactionCategory::Erc1155,
		}
	}
}

/// One token transfer/approve sub-event inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
	pub kind: OperationKind,
	/// Token contract the operation acts on.
	pub contract: String,
	pub symbol: String,
	pub decimals: u32,
	pub from: String,
	pub to: String,
	/// Amount in the token's smallest unit. `1` for ERC-721 transfers.
	pub amount: u128,
	/// Token instance id for NFT-like operations.
	pub token_id: Option<String>,
}

/// One transaction as fetched from the explorer or tracked locally.
///
/// Never mutated after persistence except for `state` (pending transactions
/// reaching a terminal state) and newly-discovered `operations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
	/// Transaction hash.
	pub id: RecordId,
	pub chain_id: ChainId,
	pub block_number: u64,
	pub transaction_index: u64,
	pub from: String,
	pub to: String,
	/// Native value moved, in wei.
	pub value: u128,
	pub gas: u64,
	pub gas_price: u128,
	pub gas_used: u64,
	pub nonce: u64,
	pub timestamp: DateTime<Utc>,
	pub state: TransactionState,
	/// Token transfer/approve sub-events carried by this transaction.
	pub operations: Vec<OperationRecord>,
}

impl TransactionRecord {
	/// Category of the scheduler that should be re-polled when this
	/// transaction finalizes, derived from its first operation.
	pub fn category(&self) -> TransactionCategory {
		self.operations
			.first()
			.map(|op| op.kind.category())
			.unwrap_or(TransactionCategory::Normal)
	}
}

/// A decoded on-chain event from the bounded recent window.
///
/// Immutable once fetched. The `filter` field carries the per-wallet
/// interpolated filter key (e.g. `from=0xabc...`) the event was indexed under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
	pub contract: String,
	pub chain_id: ChainId,
	pub event_name: String,
	pub filter: String,
	pub block_number: u64,
	pub log_index: u64,
	pub transaction_id: RecordId,
	pub transaction_index: u64,
	pub timestamp: DateTime<Utc>,
	/// Decoded event parameters keyed by parameter name, as raw strings.
	pub values: HashMap<String, String>,
}

/// Broad token classification used for holder resolution and attribute
/// applicability rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
	Native,
	Erc20,
	Erc721,
	Erc1155,
}

impl TokenKind {
	/// NFT-like tokens are held as instance sets rather than a balance.
	pub fn is_non_fungible(&self) -> bool {
		matches!(self, TokenKind::Erc721 | TokenKind::Erc1155)
	}
}

/// A token known to the wallet, as surfaced by the token registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
	pub contract: String,
	pub chain_id: ChainId,
	pub name: String,
	pub symbol: String,
	pub decimals: u32,
	pub kind: TokenKind,
	/// Wallet balance in the token's smallest unit (fungible tokens).
	pub balance: u128,
	/// Owned instance ids (NFT-like tokens).
	pub instances: Vec<String>,
}

/// Errors surfaced by the sync layer (schedulers, orchestrator, stores).
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	#[error("Explorer error: {0}")]
	Explorer(#[from] ExplorerError),

	#[error("Store error: {0}")]
	Store(String),

	#[error("Cursor persistence error: {0}")]
	Cursor(String),
}

/// Errors surfaced by the activity resolver pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
	#[error("Event source error: {0}")]
	Events(#[from] ExplorerError),

	#[error("Sync error: {0}")]
	Sync(#[from] SyncError),
}
