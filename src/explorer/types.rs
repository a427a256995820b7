//! Wire types for the blockchain-explorer HTTP API.

use serde::{Deserialize, Serialize};

/// Envelope returned by etherscan-style account endpoints.
///
/// `status` is `"1"` on success and `"0"` otherwise; `"No transactions found"`
/// is reported with status `"0"` but is not an error.
#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerEnvelope {
	pub status: String,
	pub message: String,
	#[serde(default)]
	pub result: serde_json::Value,
}

/// One transaction entry as returned by the `txlist` action.
///
/// All numeric fields arrive as decimal strings and are parsed when the entry
/// is converted into a `TransactionRecord`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalTransactionEntry {
	pub hash: String,
	#[serde(rename = "blockNumber")]
	pub block_number: String,
	#[serde(rename = "transactionIndex", default)]
	pub transaction_index: String,
	pub from: String,
	#[serde(default)]
	pub to: String,
	pub value: String,
	pub gas: String,
	#[serde(rename = "gasPrice")]
	pub gas_price: String,
	#[serde(rename = "gasUsed", default)]
	pub gas_used: String,
	pub nonce: String,
	#[serde(rename = "timeStamp")]
	pub time_stamp: String,
	/// `"1"` when the transaction reverted.
	#[serde(rename = "isError", default)]
	pub is_error: String,
}

/// One token transfer entry as returned by the `tokentx`, `tokennfttx`, and
/// `token1155tx` actions. The three shapes share every field this engine
/// reads; `token_id`/`token_value` are absent where not applicable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenTransferEntry {
	pub hash: String,
	#[serde(rename = "blockNumber")]
	pub block_number: String,
	#[serde(rename = "transactionIndex", default)]
	pub transaction_index: String,
	pub from: String,
	#[serde(default)]
	pub to: String,
	#[serde(rename = "contractAddress")]
	pub contract_address: String,
	#[serde(rename = "tokenSymbol", default)]
	pub token_symbol: String,
	#[serde(rename = "tokenDecimal", default)]
	pub token_decimal: String,
	/// Transfer amount for fungible tokens; absent for ERC-721.
	#[serde(default)]
	pub value: String,
	/// Token instance id for NFT transfers.
	#[serde(rename = "tokenID", default)]
	pub token_id: String,
	/// Per-instance amount for ERC-1155 transfers.
	#[serde(rename = "tokenValue", default)]
	pub token_value: String,
	pub gas: String,
	#[serde(rename = "gasPrice")]
	pub gas_price: String,
	#[serde(rename = "gasUsed", default)]
	pub gas_used: String,
	pub nonce: String,
	#[serde(rename = "timeStamp")]
	pub time_stamp: String,
}

/// Outcome of a transaction-receipt lookup for the pending tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
	/// Still in the mempool.
	Pending,
	/// Mined and succeeded.
	Mined,
	/// Mined and reverted.
	Failed,
	/// No longer known to the backend.
	Dropped,
}

/// Error types for explorer operations.
///
/// `CategoryUnsupported` is the one non-transient variant: it signals that the
/// backend does not implement a transaction category for this chain, and the
/// corresponding scheduler must stop permanently.
#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
	#[error("Transaction category not supported by this backend")]
	CategoryUnsupported,

	#[error("Explorer rejected request: {0}")]
	Rejected(String),

	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("Malformed explorer response: {0}")]
	Decode(String),
}

impl ExplorerError {
	/// Whether retrying on the next scheduler tick can succeed.
	pub fn is_transient(&self) -> bool {
		!matches!(self, ExplorerError::CategoryUnsupported)
	}
}
