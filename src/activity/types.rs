//! Types for resolved activities and the display-ready feed.

use crate::types::{ChainId, OperationKind, RecordId, Token, TokenKind, TransactionRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A typed attribute value attached to an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "value")]
pub enum AttributeValue {
	Address(String),
	Text(String),
	Uint(u128),
	Bool(bool),
	Timestamp(DateTime<Utc>),
}

impl AttributeValue {
	pub fn as_uint(&self) -> Option<u128> {
		match self {
			AttributeValue::Uint(v) => Some(*v),
			_ => None,
		}
	}

	/// Address-like reading; `Text` values are accepted for comparison.
	pub fn as_address(&self) -> Option<String> {
		match self {
			AttributeValue::Address(a) => Some(a.to_lowercase()),
			AttributeValue::Text(t) => Some(t.to_lowercase()),
			_ => None,
		}
	}
}

/// Cached projection of a token contract, resolved once per cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedToken {
	pub contract: String,
	pub chain_id: ChainId,
	pub name: String,
	pub symbol: String,
	pub decimals: u32,
	pub kind: TokenKind,
}

impl From<&Token> for ResolvedToken {
	fn from(token: &Token) -> Self {
		Self {
			contract: token.contract.to_lowercase(),
			chain_id: token.chain_id,
			name: token.name.clone(),
			symbol: token.symbol.clone(),
			decimals: token.decimals,
			kind: token.kind,
		}
	}
}

/// The resolved quantity/instance-set the wallet owns of a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenHolder {
	pub balance: u128,
	pub instances: Vec<String>,
}

impl TokenHolder {
	/// Synthetic single-unit holder used for the native currency, which has
	/// no contract-side holder state to resolve.
	pub fn synthetic_native() -> Self {
		Self {
			balance: 1,
			instances: Vec::new(),
		}
	}

	pub fn from_token(token: &Token) -> Self {
		Self {
			balance: token.balance,
			instances: token.instances.clone(),
		}
	}
}

/// Completion state of an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityState {
	Pending,
	Completed,
}

/// A display-ready representation of one on-chain event, resolved against
/// token/holder context and attribute values.
///
/// The identifier is stable across versions of the same activity: stage-6
/// attribute refinement produces a new version under the same id so consumers
/// can replace it in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
	pub id: String,
	pub token: ResolvedToken,
	pub chain_id: ChainId,
	pub card_name: String,
	pub event_name: String,
	pub block_number: u64,
	pub transaction_id: RecordId,
	pub transaction_index: u64,
	pub log_index: u64,
	pub timestamp: DateTime<Utc>,
	/// Implicit token-level attributes (owner, symbol, contract address).
	pub token_attributes: HashMap<String, AttributeValue>,
	/// Card-level attributes: event timestamp plus coerced event parameters.
	pub card_attributes: HashMap<String, AttributeValue>,
	/// View template identifier for the feed row.
	pub item_view: String,
	/// View template identifier for the detail view.
	pub view: String,
	pub state: ActivityState,
}

impl Activity {
	/// The operation kind this activity describes, for filter strategies and
	/// reconciliation semantics.
	pub fn operation_kind(&self) -> OperationKind {
		if self.event_name == "Approval" {
			return OperationKind::Erc20Approve;
		}
		match self.token.kind {
			TokenKind::Native => OperationKind::NativeTransfer,
			TokenKind::Erc20 => OperationKind::Erc20Transfer,
			TokenKind::Erc721 => OperationKind::Erc721Transfer,
			TokenKind::Erc1155 => OperationKind::Erc1155Transfer,
		}
	}

	/// Sender-side card attribute, if present.
	pub fn from_address(&self) -> Option<String> {
		self.card_attributes
			.get("from")
			.or_else(|| self.card_attributes.get("owner"))
			.and_then(AttributeValue::as_address)
	}

	/// Receiver-side card attribute, if present.
	pub fn to_address(&self) -> Option<String> {
		self.card_attributes
			.get("to")
			.or_else(|| self.card_attributes.get("spender"))
			.and_then(AttributeValue::as_address)
	}

	/// Amount-like card attribute, if present.
	pub fn amount(&self) -> Option<u128> {
		self.card_attributes
			.get("amount")
			.or_else(|| self.card_attributes.get("value"))
			.and_then(AttributeValue::as_uint)
	}
}

/// One row of the merged, sorted, grouped feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActivityRowModel {
	/// An activity with no transaction sharing its block.
	StandaloneActivity(Activity),
	/// A transaction displayed on its own.
	StandaloneTransaction(TransactionRecord),
	/// A transaction heading a group of child rows.
	ParentTransaction {
		record: TransactionRecord,
		/// The group contains both a send-like and a receive-like movement
		/// from the wallet's perspective.
		is_swap: bool,
	},
	/// One token operation of a parent transaction.
	ChildTransaction {
		transaction_id: RecordId,
		operation: crate::types::OperationRecord,
	},
	/// An activity grouped under a parent transaction.
	ChildActivity(Activity),
}

impl ActivityRowModel {
	/// The activity carried by this row, if any.
	pub fn activity(&self) -> Option<&Activity> {
		match self {
			ActivityRowModel::StandaloneActivity(a) | ActivityRowModel::ChildActivity(a) => Some(a),
			_ => None,
		}
	}
}

/// Service-level filter applied to resolved (activity, token, holder) triples.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActivitiesFilterStrategy {
	/// No restriction.
	#[default]
	None,
	/// Only native-currency records.
	NativeCurrency,
	/// Only one contract.
	Contract(String),
	/// One contract restricted to an explicit operation-type set.
	ContractWithOperations {
		contract: String,
		operations: HashSet<OperationKind>,
	},
}

impl ActivitiesFilterStrategy {
	pub fn accepts(&self, activity: &Activity, token: &ResolvedToken) -> bool {
		match self {
			ActivitiesFilterStrategy::None => true,
			ActivitiesFilterStrategy::NativeCurrency => token.kind == TokenKind::Native,
			ActivitiesFilterStrategy::Contract(contract) => {
				token.contract.eq_ignore_ascii_case(contract)
			}
			ActivitiesFilterStrategy::ContractWithOperations {
				contract,
				operations,
			} => {
				token.contract.eq_ignore_ascii_case(contract)
					&& operations.contains(&activity.operation_kind())
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn resolved(kind: TokenKind, contract: &str) -> ResolvedToken {
		ResolvedToken {
			contract: contract.to_string(),
			chain_id: 1,
			name: "Test".to_string(),
			symbol: "TST".to_string(),
			decimals: 18,
			kind,
		}
	}

	fn activity(token: ResolvedToken, event_name: &str) -> Activity {
		Activity {
			id: "a1".to_string(),
			chain_id: token.chain_id,
			card_name: "sent".to_string(),
			event_name: event_name.to_string(),
			block_number: 1,
			transaction_id: "0xa".to_string(),
			transaction_index: 0,
			log_index: 0,
			timestamp: Utc::now(),
			token_attributes: HashMap::new(),
			card_attributes: HashMap::new(),
			item_view: "item".to_string(),
			view: "view".to_string(),
			state: ActivityState::Completed,
			token,
		}
	}

	#[test]
	fn filter_strategies_restrict_as_configured() {
		let erc20 = resolved(TokenKind::Erc20, "0xc0");
		let native = resolved(TokenKind::Native, "0x0");
		let transfer = activity(erc20.clone(), "Transfer");
		let approval = activity(erc20.clone(), "Approval");
		let native_act = activity(native.clone(), "Transfer");

		assert!(ActivitiesFilterStrategy::None.accepts(&transfer, &erc20));

		let native_only = ActivitiesFilterStrategy::NativeCurrency;
		assert!(native_only.accepts(&native_act, &native));
		assert!(!native_only.accepts(&transfer, &erc20));

		let by_contract = ActivitiesFilterStrategy::Contract("0xC0".to_string());
		assert!(by_contract.accepts(&transfer, &erc20));
		assert!(!by_contract.accepts(&native_act, &native));

		let by_ops = ActivitiesFilterStrategy::ContractWithOperations {
			contract: "0xc0".to_string(),
			operations: HashSet::from([OperationKind::Erc20Approve]),
		};
		assert!(by_ops.accepts(&approval, &erc20));
		assert!(!by_ops.accepts(&transfer, &erc20));
	}
}
