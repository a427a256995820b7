//! Activity cards derived from token metadata definitions.
//!
//! A card describes which on-chain event to watch for and how to interpret
//! and display it: the event name, a per-wallet filter template, typed
//! attribute coercion rules, and view template identifiers. Cards are
//! read-only inputs supplied by the metadata-definition provider.

use crate::activity::types::AttributeValue;
use crate::types::ChainId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The value side of a card's event filter template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CardFilterValue {
	/// Interpolated with the wallet's own address.
	OwnerAddress,
	/// A fixed value. Not currently supported for matching; cards carrying
	/// one are skipped during discovery.
	Literal(String),
}

/// A card's event filter template, e.g. `from=${ownerAddress}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardFilter {
	pub key: String,
	pub value: CardFilterValue,
}

impl CardFilter {
	/// Interpolate the filter for a wallet. Only owner-address filters are
	/// supported; any other kind yields `None` and the card is skipped.
	pub fn interpolate(&self, owner_address: &str) -> Option<String> {
		match &self.value {
			CardFilterValue::OwnerAddress => {
				Some(format!("{}={}", self.key, owner_address.to_lowercase()))
			}
			CardFilterValue::Literal(_) => {
				debug!("Skipping card filter '{}': unsupported filter kind", self.key);
				None
			}
		}
	}
}

/// Declared type of a card attribute, driving coercion of raw event
/// parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
	Address,
	Text,
	Uint,
	Bool,
	Timestamp,
}

/// One declared attribute of a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardAttribute {
	pub name: String,
	pub kind: AttributeKind,
}

impl CardAttribute {
	/// Coerce a raw decoded parameter to the declared type. Values that do
	/// not parse are dropped rather than failing the event.
	pub fn coerce(&self, raw: &str) -> Option<AttributeValue> {
		match self.kind {
			AttributeKind::Address => Some(AttributeValue::Address(raw.to_lowercase())),
			AttributeKind::Text => Some(AttributeValue::Text(raw.to_string())),
			AttributeKind::Uint => parse_uint(raw).map(AttributeValue::Uint),
			AttributeKind::Bool => match raw {
				"true" | "1" => Some(AttributeValue::Bool(true)),
				"false" | "0" => Some(AttributeValue::Bool(false)),
				_ => None,
			},
			AttributeKind::Timestamp => {
				let secs = parse_uint(raw)?;
				DateTime::<Utc>::from_timestamp(secs as i64, 0).map(AttributeValue::Timestamp)
			}
		}
	}
}

/// Parse a decimal or 0x-prefixed hex unsigned integer.
fn parse_uint(raw: &str) -> Option<u128> {
	if let Some(hex) = raw.strip_prefix("0x") {
		u128::from_str_radix(hex, 16).ok()
	} else {
		raw.parse::<u128>().ok()
	}
}

/// A metadata-defined template describing one watchable event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityCard {
	pub name: String,
	pub event_name: String,
	/// Contract the card watches; defaults to the defining token's contract.
	pub contract: Option<String>,
	pub filter: CardFilter,
	pub attributes: Vec<CardAttribute>,
	/// View template identifier for the feed row.
	pub item_view: String,
	/// View template identifier for the detail view.
	pub view: String,
	pub is_base: bool,
}

/// A token's metadata definition as far as the activity engine consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDefinition {
	/// Target chain; `None` means the definition applies to any enabled chain.
	pub chain_id: Option<ChainId>,
	pub cards: Vec<ActivityCard>,
}

/// Supplies per-token metadata definitions.
#[async_trait::async_trait]
pub trait CardProvider: Send + Sync {
	/// The definition for a token, or `None` when the token has none.
	async fn definition(&self, contract: &str, chain_id: ChainId) -> Option<TokenDefinition>;
}
