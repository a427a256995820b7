//!
//! HTTP client for etherscan-style blockchain explorers.
//!
//! This module provides an async client for the account endpoints of an
//! etherscan-compatible explorer (`txlist`, `tokentx`, `tokennfttx`,
//! `token1155tx`) and for receipt-status lookups. All methods are async and
//! designed for use with Tokio; transient transport failures are retried with
//! exponential backoff before being surfaced to the caller.

use super::types::*;
use super::{ExplorerApi, ReceiptSource};
use crate::sync::pagination::PaginationCursor;
use crate::types::{
	ChainId, OperationKind, OperationRecord, RecordId, TransactionCategory, TransactionRecord,
	TransactionState,
};
use backoff::{ExponentialBackoff, future::retry};
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Explorer HTTP client for one chain.
#[derive(Clone)]
pub struct HttpExplorerClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Base URL of the explorer API endpoint.
	base_url: String,
	/// Optional API key appended to every request.
	api_key: Option<String>,
	/// Chain the explorer indexes; stamped onto every record.
	chain_id: ChainId,
}

impl HttpExplorerClient {
	/// Create a new explorer client.
	///
	/// # Arguments
	/// * `base_url` - The explorer API endpoint, e.g. `https://api.etherscan.io/api`.
	/// * `api_key` - Optional API key for authenticated rate limits.
	/// * `chain_id` - The chain this explorer indexes.
	pub fn new(base_url: String, api_key: Option<String>, chain_id: ChainId) -> Self {
		let http_client = Client::builder()
			.timeout(Duration::from_secs(30))
			.build()
			.expect("Failed to create HTTP client");

		Self {
			http_client,
			base_url,
			api_key,
			chain_id,
		}
	}

	/// Execute one GET request against the explorer, retrying transient
	/// transport failures with exponential backoff. Non-transport failures
	/// (bad JSON, rejected requests) are not retried here; retry across ticks
	/// belongs to the scheduler.
	async fn execute(&self, params: &[(&str, String)]) -> Result<ExplorerEnvelope, ExplorerError> {
		let mut query: Vec<(&str, String)> = params.to_vec();
		if let Some(key) = &self.api_key {
			query.push(("apikey", key.clone()));
		}

		let policy = ExponentialBackoff {
			max_elapsed_time: Some(Duration::from_secs(20)),
			..ExponentialBackoff::default()
		};

		let body = retry(policy, || async {
			let resp = self
				.http_client
				.get(&self.base_url)
				.query(&query)
				.send()
				.await
				.map_err(|e| {
					debug!("Explorer send error: {}", e);
					backoff::Error::transient(e)
				})?;

			let resp = resp.error_for_status().map_err(|e| {
				debug!("Explorer status error: {}", e);
				backoff::Error::transient(e)
			})?;

			resp.text().await.map_err(backoff::Error::transient)
		})
		.await?;

		let envelope: ExplorerEnvelope = serde_json::from_str(&body)?;
		Ok(envelope)
	}

	/// Interpret the envelope of an account-list request, distinguishing the
	/// unsupported-category reply from empty pages and transient rejections.
	fn check_envelope(envelope: &ExplorerEnvelope) -> Result<(), ExplorerError> {
		if envelope.status == "1" {
			return Ok(());
		}

		if envelope.message.contains("No transactions found") {
			return Ok(());
		}

		let detail = envelope
			.result
			.as_str()
			.unwrap_or(envelope.message.as_str());
		let lowered = detail.to_lowercase();
		if lowered.contains("invalid action") || lowered.contains("not supported") {
			return Err(ExplorerError::CategoryUnsupported);
		}

		Err(ExplorerError::Rejected(detail.to_string()))
	}

	fn convert_normal(&self, entry: NormalTransactionEntry) -> Result<TransactionRecord, ExplorerError> {
		let state = if entry.is_error == "1" {
			TransactionState::Error
		} else {
			TransactionState::Completed
		};

		Ok(TransactionRecord {
			id: entry.hash.to_lowercase(),
			chain_id: self.chain_id,
			block_number: parse_u64("blockNumber", &entry.block_number)?,
			transaction_index: parse_u64("transactionIndex", &entry.transaction_index)?,
			from: entry.from.to_lowercase(),
			to: entry.to.to_lowercase(),
			value: parse_u128("value", &entry.value)?,
			gas: parse_u64("gas", &entry.gas)?,
			gas_price: parse_u128("gasPrice", &entry.gas_price)?,
			gas_used: parse_u64("gasUsed", &entry.gas_used)?,
			nonce: parse_u64("nonce", &entry.nonce)?,
			timestamp: parse_timestamp(&entry.time_stamp)?,
			state,
			operations: Vec::new(),
		})
	}

	fn convert_token_transfer(
		&self,
		category: TransactionCategory,
		entry: TokenTransferEntry,
	) -> Result<TransactionRecord, ExplorerError> {
		let (kind, amount, token_id) = match category {
			TransactionCategory::Erc20 => (
				OperationKind::Erc20Transfer,
				parse_u128("value", &entry.value)?,
				None,
			),
			TransactionCategory::Erc721 => {
				(OperationKind::Erc721Transfer, 1, Some(entry.token_id.clone()))
			}
			TransactionCategory::Erc1155 => (
				OperationKind::Erc1155Transfer,
				parse_u128("tokenValue", &entry.token_value)?,
				Some(entry.token_id.clone()),
			),
			TransactionCategory::Normal => {
				return Err(ExplorerError::Decode(
					"normal category has no token transfer shape".to_string(),
				));
			}
		};

		let operation = OperationRecord {
			kind,
			contract: entry.contract_address.to_lowercase(),
			symbol: entry.token_symbol.clone(),
			decimals: parse_u64("tokenDecimal", &entry.token_decimal)? as u32,
			from: entry.from.to_lowercase(),
			to: entry.to.to_lowercase(),
			amount,
			token_id,
		};

		Ok(TransactionRecord {
			id: entry.hash.to_lowercase(),
			chain_id: self.chain_id,
			block_number: parse_u64("blockNumber", &entry.block_number)?,
			transaction_index: parse_u64("transactionIndex", &entry.transaction_index)?,
			from: entry.from.to_lowercase(),
			to: entry.to.to_lowercase(),
			value: 0,
			gas: parse_u64("gas", &entry.gas)?,
			gas_price: parse_u128("gasPrice", &entry.gas_price)?,
			gas_used: parse_u64("gasUsed", &entry.gas_used)?,
			nonce: parse_u64("nonce", &entry.nonce)?,
			timestamp: parse_timestamp(&entry.time_stamp)?,
			state: TransactionState::Completed,
			operations: vec![operation],
		})
	}
}

#[async_trait::async_trait]
impl ExplorerApi for HttpExplorerClient {
	async fn fetch_transactions(
		&self,
		category: TransactionCategory,
		address: &str,
		cursor: &PaginationCursor,
	) -> Result<Vec<TransactionRecord>, ExplorerError> {
		let action = match category {
			TransactionCategory::Normal => "txlist",
			TransactionCategory::Erc20 => "tokentx",
			TransactionCategory::Erc721 => "tokennfttx",
			TransactionCategory::Erc1155 => "token1155tx",
		};

		// Explorer pages are 1-based; the cursor counts from 0.
		let params = [
			("module", "account".to_string()),
			("action", action.to_string()),
			("address", address.to_string()),
			("page", (cursor.page + 1).to_string()),
			("offset", cursor.limit.to_string()),
			("sort", "desc".to_string()),
		];

		let envelope = self.execute(&params).await?;
		Self::check_envelope(&envelope)?;

		if envelope.result.is_null() || envelope.result.as_str().is_some() {
			return Ok(Vec::new());
		}

		let mut records = Vec::new();
		match category {
			TransactionCategory::Normal => {
				let entries: Vec<NormalTransactionEntry> =
					serde_json::from_value(envelope.result)?;
				for entry in entries {
					records.push(self.convert_normal(entry)?);
				}
			}
			_ => {
				let entries: Vec<TokenTransferEntry> = serde_json::from_value(envelope.result)?;
				for entry in entries {
					records.push(self.convert_token_transfer(category, entry)?);
				}
			}
		}

		debug!(
			"Fetched {} {} transactions for {} at page {}",
			records.len(),
			category.as_str(),
			address,
			cursor.page
		);
		Ok(records)
	}
}

#[async_trait::async_trait]
impl ReceiptSource for HttpExplorerClient {
	async fn receipt_status(&self, id: &RecordId) -> Result<ReceiptStatus, ExplorerError> {
		let params = [
			("module", "transaction".to_string()),
			("action", "gettxreceiptstatus".to_string()),
			("txhash", id.clone()),
		];

		let envelope = self.execute(&params).await?;

		if envelope.status != "1" {
			let detail = envelope
				.result
				.as_str()
				.unwrap_or(envelope.message.as_str());
			if detail.to_lowercase().contains("no transaction") {
				return Ok(ReceiptStatus::Dropped);
			}
			warn!("Receipt lookup for {} rejected: {}", id, detail);
			return Err(ExplorerError::Rejected(detail.to_string()));
		}

		let status = envelope
			.result
			.get("status")
			.and_then(|s| s.as_str())
			.unwrap_or("");

		Ok(match status {
			"1" => ReceiptStatus::Mined,
			"0" => ReceiptStatus::Failed,
			_ => ReceiptStatus::Pending,
		})
	}
}

fn parse_u64(field: &str, raw: &str) -> Result<u64, ExplorerError> {
	if raw.is_empty() {
		return Ok(0);
	}
	raw.parse::<u64>()
		.map_err(|e| ExplorerError::Decode(format!("invalid {} '{}': {}", field, raw, e)))
}

fn parse_u128(field: &str, raw: &str) -> Result<u128, ExplorerError> {
	if raw.is_empty() {
		return Ok(0);
	}
	raw.parse::<u128>()
		.map_err(|e| ExplorerError::Decode(format!("invalid {} '{}': {}", field, raw, e)))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ExplorerError> {
	let secs = parse_u64("timeStamp", raw)?;
	DateTime::<Utc>::from_timestamp(secs as i64, 0)
		.ok_or_else(|| ExplorerError::Decode(format!("timestamp out of range: {}", raw)))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn envelope(status: &str, message: &str, result: serde_json::Value) -> ExplorerEnvelope {
		ExplorerEnvelope {
			status: status.to_string(),
			message: message.to_string(),
			result,
		}
	}

	#[test]
	fn empty_page_is_not_an_error() {
		let env = envelope("0", "No transactions found", serde_json::Value::Null);
		assert!(HttpExplorerClient::check_envelope(&env).is_ok());
	}

	#[test]
	fn invalid_action_maps_to_category_unsupported() {
		let env = envelope(
			"0",
			"NOTOK",
			serde_json::json!("Error! Invalid action name"),
		);
		assert!(matches!(
			HttpExplorerClient::check_envelope(&env),
			Err(ExplorerError::CategoryUnsupported)
		));
	}

	#[test]
	fn other_rejections_are_transient() {
		let env = envelope(
			"0",
			"NOTOK",
			serde_json::json!("Max rate limit reached"),
		);
		let err = HttpExplorerClient::check_envelope(&env).unwrap_err();
		assert!(err.is_transient());
	}

	#[test]
	fn token_transfer_entry_becomes_operation() {
		let client = HttpExplorerClient::new("http://localhost".to_string(), None, 1);
		let entry: TokenTransferEntry = serde_json::from_value(serde_json::json!({
			"hash": "0xAB",
			"blockNumber": "100",
			"transactionIndex": "3",
			"from": "0xF1",
			"to": "0xF2",
			"contractAddress": "0xC0",
			"tokenSymbol": "DAI",
			"tokenDecimal": "18",
			"value": "5000",
			"gas": "21000",
			"gasPrice": "1000000000",
			"gasUsed": "21000",
			"nonce": "7",
			"timeStamp": "1700000000"
		}))
		.unwrap();

		let record = client
			.convert_token_transfer(TransactionCategory::Erc20, entry)
			.unwrap();
		assert_eq!(record.id, "0xab");
		assert_eq!(record.operations.len(), 1);
		let op = &record.operations[0];
		assert_eq!(op.kind, OperationKind::Erc20Transfer);
		assert_eq!(op.amount, 5000);
		assert_eq!(op.symbol, "DAI");
	}
}
