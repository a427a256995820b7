//! Reconciliation of metadata-derived activities with explorer transactions.
//!
//! Activities (from the event log) and transaction operations (from the
//! explorer) are independently sourced and routinely describe the identical
//! on-chain action. This module merges both streams into one block-grouped,
//! descending feed and absorbs every activity that duplicates a transaction
//! operation, so the same transfer never renders twice.

use crate::activity::types::{Activity, ActivityRowModel};
use crate::types::{OperationKind, OperationRecord, RecordId, TransactionRecord};
use itertools::Itertools;
use std::collections::HashMap;

enum FeedItem {
	Transaction(TransactionRecord),
	Activity(Activity),
}

impl FeedItem {
	fn block_number(&self) -> u64 {
		match self {
			FeedItem::Transaction(tx) => tx.block_number,
			FeedItem::Activity(a) => a.block_number,
		}
	}
}

/// Build the display-ready feed from resolved activities and the known
/// transaction window.
///
/// Activities are sorted descending by block number before grouping; groups
/// are emitted newest block first. Running this twice on unchanged input
/// yields an identical row list.
pub fn build_feed(
	mut activities: Vec<Activity>,
	transactions: Vec<TransactionRecord>,
	own_address: &str,
) -> Vec<ActivityRowModel> {
	activities.sort_by(|a, b| {
		b.block_number
			.cmp(&a.block_number)
			.then(b.transaction_index.cmp(&a.transaction_index))
			.then(b.log_index.cmp(&a.log_index))
	});

	let mut grouped: HashMap<u64, Vec<FeedItem>> = activities
		.into_iter()
		.map(FeedItem::Activity)
		.chain(transactions.into_iter().map(FeedItem::Transaction))
		.map(|item| (item.block_number(), item))
		.into_group_map();

	let mut blocks: Vec<u64> = grouped.keys().copied().collect();
	blocks.sort_unstable_by(|a, b| b.cmp(a));

	let own = own_address.to_lowercase();
	let mut rows = Vec::new();
	for block in blocks {
		if let Some(items) = grouped.remove(&block) {
			rows.extend(build_group(items, &own));
		}
	}
	rows
}

/// Build the rows for one block's worth of items.
fn build_group(items: Vec<FeedItem>, own_address: &str) -> Vec<ActivityRowModel> {
	// Single-item groups pass through unchanged.
	if items.len() == 1 {
		return match items.into_iter().next() {
			Some(FeedItem::Activity(a)) => vec![ActivityRowModel::StandaloneActivity(a)],
			Some(FeedItem::Transaction(tx)) => vec![ActivityRowModel::StandaloneTransaction(tx)],
			None => Vec::new(),
		};
	}

	let mut transactions = Vec::new();
	let mut activities = Vec::new();
	for item in items {
		match item {
			FeedItem::Transaction(tx) => transactions.push(tx),
			FeedItem::Activity(a) => activities.push(a),
		}
	}

	transactions.sort_by(|a, b| b.transaction_index.cmp(&a.transaction_index));

	// No transaction in the group: a flat list of standalone activities.
	if transactions.is_empty() {
		return activities
			.into_iter()
			.map(ActivityRowModel::StandaloneActivity)
			.collect();
	}

	if transactions.len() == 1 {
		let tx = transactions.into_iter().next().expect("one transaction");
		return build_transaction_group(tx, activities, own_address);
	}

	// Several transactions share the block: attach each activity to the
	// transaction it originated from, leftovers stay standalone.
	let mut by_transaction: HashMap<RecordId, Vec<Activity>> = HashMap::new();
	let mut leftovers = Vec::new();
	for activity in activities {
		if transactions.iter().any(|tx| tx.id == activity.transaction_id) {
			by_transaction
				.entry(activity.transaction_id.clone())
				.or_default()
				.push(activity);
		} else {
			leftovers.push(activity);
		}
	}

	let mut rows = Vec::new();
	for tx in transactions {
		let attached = by_transaction.remove(&tx.id).unwrap_or_default();
		rows.extend(build_transaction_group(tx, attached, own_address));
	}
	rows.extend(leftovers.into_iter().map(ActivityRowModel::StandaloneActivity));
	rows
}

/// Build the rows for one transaction plus the activities sharing its block.
fn build_transaction_group(
	tx: TransactionRecord,
	activities: Vec<Activity>,
	own_address: &str,
) -> Vec<ActivityRowModel> {
	// Absorb every activity that duplicates one of the transaction's
	// operations: same economic event, independently sourced.
	let remaining: Vec<Activity> = activities
		.into_iter()
		.filter(|activity| {
			!tx.operations
				.iter()
				.any(|op| operation_absorbs_activity(op, activity))
		})
		.collect();

	if tx.operations.is_empty() && remaining.is_empty() {
		return vec![ActivityRowModel::StandaloneTransaction(tx)];
	}

	// A zero-value transaction with exactly one operation is a pure token
	// transfer; the operation is what the row displays.
	if tx.operations.len() == 1 && tx.value == 0 && remaining.is_empty() {
		return vec![ActivityRowModel::StandaloneTransaction(tx)];
	}

	if tx.operations.is_empty() && remaining.len() == 1 {
		let activity = remaining.into_iter().next().expect("one activity");
		return vec![
			ActivityRowModel::ParentTransaction {
				record: tx,
				is_swap: false,
			},
			ActivityRowModel::ChildActivity(activity),
		];
	}

	let is_swap = group_is_swap(&tx, &remaining, own_address);
	let transaction_id = tx.id.clone();
	let operations = tx.operations.clone();

	let mut rows = vec![ActivityRowModel::ParentTransaction {
		record: tx,
		is_swap,
	}];
	for operation in operations {
		rows.push(ActivityRowModel::ChildTransaction {
			transaction_id: transaction_id.clone(),
			operation,
		});
	}
	for activity in remaining {
		rows.push(ActivityRowModel::ChildActivity(activity));
	}
	rows
}

/// Whether an explorer-sourced operation and a metadata-derived activity
/// describe the same economic event.
///
/// Symbols must match; transfer-like and approve-like operations additionally
/// require matching from/to/amount, read from the activity's card attributes.
fn operation_absorbs_activity(op: &OperationRecord, activity: &Activity) -> bool {
	if !op.symbol.eq_ignore_ascii_case(&activity.token.symbol) {
		return false;
	}

	let expected_event = match op.kind {
		OperationKind::Erc20Approve => "Approval",
		_ => "Transfer",
	};
	if activity.event_name != expected_event {
		return false;
	}

	activity.from_address().as_deref() == Some(op.from.to_lowercase().as_str())
		&& activity.to_address().as_deref() == Some(op.to.to_lowercase().as_str())
		&& activity.amount() == Some(op.amount)
}

/// A group is a swap when it contains both a send-like and a receive-like
/// movement from the wallet's perspective.
fn group_is_swap(tx: &TransactionRecord, activities: &[Activity], own_address: &str) -> bool {
	let mut sends = false;
	let mut receives = false;

	if tx.value > 0 {
		sends |= tx.from.eq_ignore_ascii_case(own_address);
		receives |= tx.to.eq_ignore_ascii_case(own_address);
	}
	for op in &tx.operations {
		sends |= op.from.eq_ignore_ascii_case(own_address);
		receives |= op.to.eq_ignore_ascii_case(own_address);
	}
	for activity in activities {
		sends |= activity.from_address().as_deref() == Some(own_address);
		receives |= activity.to_address().as_deref() == Some(own_address);
	}

	sends && receives
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::activity::types::{ActivityState, AttributeValue, ResolvedToken};
	use crate::types::TokenKind;
	use chrono::Utc;
	use std::collections::HashMap;

	const OWN: &str = "0xf1";

	fn token(symbol: &str, kind: TokenKind) -> ResolvedToken {
		ResolvedToken {
			contract: "0xc0".to_string(),
			chain_id: 1,
			name: symbol.to_string(),
			symbol: symbol.to_string(),
			decimals: 18,
			kind,
		}
	}

	fn transaction(id: &str, block: u64, value: u128) -> TransactionRecord {
		TransactionRecord {
			id: id.to_string(),
			chain_id: 1,
			block_number: block,
			transaction_index: 0,
			from: OWN.to_string(),
			to: "0xf2".to_string(),
			value,
			gas: 21000,
			gas_price: 1,
			gas_used: 21000,
			nonce: 0,
			timestamp: Utc::now(),
			state: crate::types::TransactionState::Completed,
			operations: Vec::new(),
		}
	}

	fn operation(kind: OperationKind, symbol: &str, from: &str, to: &str, amount: u128) -> OperationRecord {
		OperationRecord {
			kind,
			contract: "0xc0".to_string(),
			symbol: symbol.to_string(),
			decimals: 18,
			from: from.to_string(),
			to: to.to_string(),
			amount,
			token_id: None,
		}
	}

	fn transfer_activity(id: &str, tx_id: &str, block: u64, symbol: &str, from: &str, to: &str, amount: u128) -> Activity {
		Activity {
			id: id.to_string(),
			token: token(symbol, TokenKind::Erc20),
			chain_id: 1,
			card_name: "sent".to_string(),
			event_name: "Transfer".to_string(),
			block_number: block,
			transaction_id: tx_id.to_string(),
			transaction_index: 0,
			log_index: 0,
			timestamp: Utc::now(),
			token_attributes: HashMap::new(),
			card_attributes: HashMap::from([
				("from".to_string(), AttributeValue::Address(from.to_string())),
				("to".to_string(), AttributeValue::Address(to.to_string())),
				("amount".to_string(), AttributeValue::Uint(amount)),
			]),
			item_view: "item".to_string(),
			view: "view".to_string(),
			state: ActivityState::Completed,
		}
	}

	#[test]
	fn duplicate_activity_is_absorbed_into_the_operation() {
		let mut tx = transaction("0xa", 10, 0);
		tx.operations
			.push(operation(OperationKind::Erc20Transfer, "DAI", OWN, "0xf2", 100));
		let activity = transfer_activity("act1", "0xa", 10, "DAI", OWN, "0xf2", 100);

		let rows = build_feed(vec![activity], vec![tx], OWN);

		// The transfer renders once: zero-value, one operation, no remaining
		// activities is the pure token-transfer display case.
		assert_eq!(rows.len(), 1);
		assert!(matches!(rows[0], ActivityRowModel::StandaloneTransaction(_)));
		assert!(rows.iter().all(|r| !matches!(r, ActivityRowModel::ChildActivity(_))));
	}

	#[test]
	fn differing_amount_is_not_absorbed() {
		let mut tx = transaction("0xa", 10, 0);
		tx.operations
			.push(operation(OperationKind::Erc20Transfer, "DAI", OWN, "0xf2", 100));
		let activity = transfer_activity("act1", "0xa", 10, "DAI", OWN, "0xf2", 250);

		let rows = build_feed(vec![activity], vec![tx], OWN);

		assert!(matches!(
			rows[0],
			ActivityRowModel::ParentTransaction { .. }
		));
		assert_eq!(
			rows.iter()
				.filter(|r| matches!(r, ActivityRowModel::ChildActivity(_)))
				.count(),
			1
		);
	}

	#[test]
	fn grouping_boundary_one_tx_two_ops_one_unrelated_activity() {
		let mut tx = transaction("0xa", 10, 0);
		tx.operations
			.push(operation(OperationKind::Erc20Transfer, "DAI", OWN, "0xf2", 100));
		tx.operations
			.push(operation(OperationKind::Erc20Transfer, "USDC", "0xf3", OWN, 90));
		let unrelated = transfer_activity("act1", "0xother", 10, "WETH", "0xf4", "0xf5", 7);

		let rows = build_feed(vec![unrelated], vec![tx], OWN);

		assert_eq!(rows.len(), 4);
		assert!(matches!(rows[0], ActivityRowModel::ParentTransaction { .. }));
		assert_eq!(
			rows.iter()
				.filter(|r| matches!(r, ActivityRowModel::ChildTransaction { .. }))
				.count(),
			2
		);
		assert_eq!(
			rows.iter()
				.filter(|r| matches!(r, ActivityRowModel::ChildActivity(_)))
				.count(),
			1
		);
	}

	#[test]
	fn swap_tagging_requires_both_directions() {
		let mut tx = transaction("0xa", 10, 0);
		tx.operations
			.push(operation(OperationKind::Erc20Transfer, "DAI", OWN, "0xpool", 100));
		tx.operations
			.push(operation(OperationKind::Erc20Transfer, "USDC", "0xpool", OWN, 99));

		let rows = build_feed(Vec::new(), vec![tx], OWN);
		match &rows[0] {
			ActivityRowModel::ParentTransaction { is_swap, .. } => assert!(is_swap),
			other => panic!("unexpected row: {:?}", other),
		}

		let mut one_way = transaction("0xb", 11, 0);
		one_way
			.operations
			.push(operation(OperationKind::Erc20Transfer, "DAI", OWN, "0xf2", 100));
		one_way
			.operations
			.push(operation(OperationKind::Erc20Transfer, "DAI", OWN, "0xf3", 50));

		let rows = build_feed(Vec::new(), vec![one_way], OWN);
		match &rows[0] {
			ActivityRowModel::ParentTransaction { is_swap, .. } => assert!(!is_swap),
			other => panic!("unexpected row: {:?}", other),
		}
	}

	#[test]
	fn feed_is_strictly_descending_by_block() {
		let activities = vec![
			transfer_activity("a1", "0x1", 5, "DAI", "0xf3", "0xf4", 1),
			transfer_activity("a2", "0x2", 9, "DAI", "0xf3", "0xf4", 2),
			transfer_activity("a3", "0x3", 7, "DAI", "0xf3", "0xf4", 3),
		];

		let rows = build_feed(activities, Vec::new(), OWN);
		let blocks: Vec<u64> = rows
			.iter()
			.filter_map(|r| r.activity().map(|a| a.block_number))
			.collect();
		assert_eq!(blocks, vec![9, 7, 5]);
	}

	#[test]
	fn single_activity_and_parentless_transaction_pass_through() {
		let activity = transfer_activity("a1", "0x1", 5, "DAI", "0xf3", "0xf4", 1);
		let tx = transaction("0xa", 8, 1000);

		let rows = build_feed(vec![activity], vec![tx], OWN);
		assert_eq!(rows.len(), 2);
		assert!(matches!(rows[0], ActivityRowModel::StandaloneTransaction(_)));
		assert!(matches!(rows[1], ActivityRowModel::StandaloneActivity(_)));
	}

	#[test]
	fn transaction_with_one_remaining_activity_becomes_parent_child() {
		let tx = transaction("0xa", 10, 1000);
		let activity = transfer_activity("a1", "0xa", 10, "DAI", "0xf3", "0xf4", 1);

		let rows = build_feed(vec![activity], vec![tx], OWN);
		assert_eq!(rows.len(), 2);
		assert!(matches!(
			rows[0],
			ActivityRowModel::ParentTransaction { is_swap: false, .. }
		));
		assert!(matches!(rows[1], ActivityRowModel::ChildActivity(_)));
	}

	#[test]
	fn reconciliation_is_idempotent() {
		let mut tx = transaction("0xa", 10, 0);
		tx.operations
			.push(operation(OperationKind::Erc20Transfer, "DAI", OWN, "0xf2", 100));
		let activities = vec![
			transfer_activity("a1", "0xa", 10, "DAI", OWN, "0xf2", 100),
			transfer_activity("a2", "0xz", 12, "WETH", "0xf3", "0xf4", 5),
		];

		let first = build_feed(activities.clone(), vec![tx.clone()], OWN);
		let second = build_feed(activities, vec![tx], OWN);
		assert_eq!(first, second);
	}
}
