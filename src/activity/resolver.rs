//! The activity resolution pipeline.
//!
//! `ActivitiesService` turns raw decoded events plus the synced transaction
//! window into a display-ready feed. A reload runs six stages:
//!
//! 1. Card discovery: collect watchable cards from every registered token's
//!    metadata definition, interpolated for the wallet.
//! 2. Event matching: match recent events against the discovered cards and
//!    build resolved activities, memoizing token lookups per cycle.
//! 3. Filtering: apply the service-level filter strategy.
//! 4. Windowing: pull the transaction window, bounded by the oldest matched
//!    activity once a full page of activities exists.
//! 5. Reconciliation and publish: merge, group, and push the feed through the
//!    watch channel, rate-limited after the first publish.
//! 6. Attribute refinement: asynchronous per-activity token-attribute updates
//!    applied in place under the activity's stable id.
//!
//! Reloads are single-flight: a reload requested while one is running is
//! dropped, not queued.

use crate::activity::cache::CycleCache;
use crate::activity::cards::{ActivityCard, CardProvider};
use crate::activity::reconcile::build_feed;
use crate::activity::types::{
	ActivitiesFilterStrategy, Activity, ActivityRowModel, ActivityState, AttributeValue,
	ResolvedToken, TokenHolder,
};
use crate::explorer::EventSource;
use crate::store::{TokenRegistry, TransactionStore};
use crate::types::{ActivityError, ChainId, RawEvent, TokenKind};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Pseudo-contract address under which native-currency events are reported.
const NATIVE_SHADOW_CONTRACT: &str = "0x0000000000000000000000000000000000000000";

/// The wallet identity and chain set a service instance resolves for.
#[derive(Debug, Clone)]
pub struct SessionContext {
	pub wallet_address: String,
	pub enabled_chains: Vec<ChainId>,
}

/// Tuning knobs for the pipeline.
#[derive(Debug, Clone)]
pub struct ActivitiesConfig {
	/// Activity count at which the transaction window gets block-bounded.
	pub page_size: usize,
	/// Minimum spacing between feed publishes after the first one.
	pub publish_throttle: Duration,
}

impl Default for ActivitiesConfig {
	fn default() -> Self {
		Self {
			page_size: 50,
			publish_throttle: Duration::from_secs(1),
		}
	}
}

/// A card resolved against a concrete (contract, chain) pair with its filter
/// already interpolated for the wallet.
struct WatchedCard {
	card: ActivityCard,
	contract: String,
	chain_id: ChainId,
	filter: String,
}

/// Known-spurious event shapes that must never surface as activities.
struct SpuriousEventRule {
	card_name: &'static str,
	event_name: &'static str,
	contract: &'static str,
}

/// Some backends report a zero-amount native "mint" transfer alongside every
/// contract deployment; it carries no user-visible information.
const SPURIOUS_EVENT_RULES: &[SpuriousEventRule] = &[SpuriousEventRule {
	card_name: "mint",
	event_name: "Transfer",
	contract: NATIVE_SHADOW_CONTRACT,
}];

/// Resolves raw events into the published activity feed.
pub struct ActivitiesService {
	session: SessionContext,
	config: ActivitiesConfig,
	events: Arc<dyn EventSource>,
	cards: Arc<dyn CardProvider>,
	registry: Arc<dyn TokenRegistry>,
	store: Arc<dyn TransactionStore>,
	filter: Mutex<ActivitiesFilterStrategy>,
	reload_gate: tokio::sync::Mutex<()>,
	rows_tx: watch::Sender<Vec<ActivityRowModel>>,
	updates_tx: mpsc::UnboundedSender<Activity>,
	updates_rx: Mutex<Option<mpsc::UnboundedReceiver<Activity>>>,
	row_index: Mutex<HashMap<String, usize>>,
	last_publish: Mutex<Option<Instant>>,
}

impl ActivitiesService {
	pub fn new(
		session: SessionContext,
		config: ActivitiesConfig,
		events: Arc<dyn EventSource>,
		cards: Arc<dyn CardProvider>,
		registry: Arc<dyn TokenRegistry>,
		store: Arc<dyn TransactionStore>,
	) -> Self {
		let (rows_tx, _) = watch::channel(Vec::new());
		let (updates_tx, updates_rx) = mpsc::unbounded_channel();
		Self {
			session,
			config,
			events,
			cards,
			registry,
			store,
			filter: Mutex::new(ActivitiesFilterStrategy::default()),
			reload_gate: tokio::sync::Mutex::new(()),
			rows_tx,
			updates_tx,
			updates_rx: Mutex::new(Some(updates_rx)),
			row_index: Mutex::new(HashMap::new()),
			last_publish: Mutex::new(None),
		}
	}

	/// Replace the service-level filter. Takes effect on the next reload.
	pub fn set_filter(&self, strategy: ActivitiesFilterStrategy) {
		*self.filter.lock().expect("filter lock poisoned") = strategy;
	}

	/// Subscribe to the published feed. The receiver starts at the most
	/// recently published row list.
	pub fn rows(&self) -> watch::Receiver<Vec<ActivityRowModel>> {
		self.rows_tx.subscribe()
	}

	/// Take the per-activity refinement stream. Yields each activity's new
	/// version after a token-attribute update. Can be taken once.
	pub fn activity_updates(&self) -> Option<mpsc::UnboundedReceiver<Activity>> {
		self.updates_rx.lock().expect("updates lock poisoned").take()
	}

	/// Run one full pipeline cycle and publish the result.
	///
	/// Single-flight: when a cycle is already running the call returns
	/// immediately without queuing.
	pub async fn reload(&self) -> Result<(), ActivityError> {
		let Ok(_gate) = self.reload_gate.try_lock() else {
			debug!("Reload already in progress, dropping request");
			return Ok(());
		};

		let watched = self.discover_cards().await;
		debug!("Discovered {} watchable cards", watched.len());

		let mut cache = CycleCache::new();
		let activities = self.match_events(&watched, &mut cache).await?;
		debug!(
			"Matched {} activities across {} contracts",
			activities.len(),
			cache.len()
		);

		// Once a full page of activities exists, transactions older than the
		// oldest activity cannot interleave with it and are left out.
		let min_block = if activities.len() >= self.config.page_size {
			activities.iter().map(|a| a.block_number).min()
		} else {
			None
		};

		let mut transactions = Vec::new();
		for chain_id in &self.session.enabled_chains {
			transactions.extend(self.store.transactions(*chain_id, min_block).await?);
		}

		let rows = build_feed(activities, transactions, &self.session.wallet_address);
		info!("Publishing activity feed with {} rows", rows.len());
		self.publish(rows).await;
		Ok(())
	}

	/// Stage 1: resolve every registered token's definition into concrete
	/// watched cards for the session's enabled chains.
	async fn discover_cards(&self) -> Vec<WatchedCard> {
		let mut watched = Vec::new();
		for token in self.registry.all_tokens().await {
			let Some(definition) = self.cards.definition(&token.contract, token.chain_id).await
			else {
				continue;
			};

			// A definition either pins one chain or applies to all enabled
			// ones.
			let chains: Vec<ChainId> = match definition.chain_id {
				Some(chain) if self.session.enabled_chains.contains(&chain) => vec![chain],
				Some(_) => continue,
				None => self.session.enabled_chains.clone(),
			};

			for card in definition.cards {
				let Some(filter) = card.filter.interpolate(&self.session.wallet_address) else {
					continue;
				};
				let contract = card
					.contract
					.clone()
					.unwrap_or_else(|| token.contract.clone())
					.to_lowercase();
				for chain_id in &chains {
					watched.push(WatchedCard {
						card: card.clone(),
						contract: contract.clone(),
						chain_id: *chain_id,
						filter: filter.clone(),
					});
				}
			}
		}
		watched
	}

	/// Stages 2 and 3: match recent events against the watched cards, resolve
	/// token context, drop spurious and filtered-out events.
	async fn match_events(
		&self,
		watched: &[WatchedCard],
		cache: &mut CycleCache,
	) -> Result<Vec<Activity>, ActivityError> {
		let filter = self.filter.lock().expect("filter lock poisoned").clone();
		let mut activities = Vec::new();

		for event in self.events.recent_events().await? {
			let contract = event.contract.to_lowercase();
			let Some(hit) = watched.iter().find(|w| {
				w.contract == contract
					&& w.chain_id == event.chain_id
					&& w.card.event_name == event.event_name
					&& w.filter == event.filter
			}) else {
				continue;
			};

			if is_spurious(hit, &event) {
				debug!(
					"Dropping spurious '{}' event in tx {}",
					event.event_name, event.transaction_id
				);
				continue;
			}

			let Some((token, holder)) = cache
				.resolve(&hit.contract, hit.chain_id, self.registry.as_ref())
				.await
			else {
				warn!(
					"No token registered for contract {} on chain {}, skipping event",
					hit.contract, hit.chain_id
				);
				continue;
			};

			let activity = self.build_activity(hit, &event, &token, &holder);
			if filter.accepts(&activity, &token) {
				activities.push(activity);
			}
		}
		Ok(activities)
	}

	fn build_activity(
		&self,
		watched: &WatchedCard,
		event: &RawEvent,
		token: &ResolvedToken,
		_holder: &TokenHolder,
	) -> Activity {
		let mut id_bytes = [0u8; 16];
		rand::rng().fill_bytes(&mut id_bytes);

		let own = self.session.wallet_address.to_lowercase();
		let mut token_attributes = HashMap::from([
			(
				"ownerAddress".to_string(),
				AttributeValue::Address(own),
			),
			(
				"symbol".to_string(),
				AttributeValue::Text(token.symbol.clone()),
			),
		]);
		// The native currency has no real contract to point at.
		if token.kind != TokenKind::Native {
			token_attributes.insert(
				"contractAddress".to_string(),
				AttributeValue::Address(watched.contract.clone()),
			);
		}

		let mut card_attributes = HashMap::from([(
			"timestamp".to_string(),
			AttributeValue::Timestamp(event.timestamp),
		)]);
		for (name, raw) in &event.values {
			let value = match watched.card.attributes.iter().find(|a| &a.name == name) {
				Some(declared) => declared.coerce(raw),
				None => Some(AttributeValue::Text(raw.clone())),
			};
			if let Some(value) = value {
				card_attributes.insert(name.clone(), value);
			}
		}

		Activity {
			id: hex::encode(id_bytes),
			token: token.clone(),
			chain_id: watched.chain_id,
			card_name: watched.card.name.clone(),
			event_name: event.event_name.clone(),
			block_number: event.block_number,
			transaction_id: event.transaction_id.clone(),
			transaction_index: event.transaction_index,
			log_index: event.log_index,
			timestamp: event.timestamp,
			token_attributes,
			card_attributes,
			item_view: watched.card.item_view.clone(),
			view: watched.card.view.clone(),
			state: ActivityState::Completed,
		}
	}

	/// Stage 5: push the row list through the watch channel, spacing
	/// publishes after the first one.
	async fn publish(&self, rows: Vec<ActivityRowModel>) {
		let wait = {
			let last = self.last_publish.lock().expect("publish lock poisoned");
			last.map(|at| (at + self.config.publish_throttle).saturating_duration_since(Instant::now()))
		};
		if let Some(wait) = wait {
			if !wait.is_zero() {
				tokio::time::sleep(wait).await;
			}
		}

		let mut index = HashMap::new();
		for (position, row) in rows.iter().enumerate() {
			if let Some(activity) = row.activity() {
				index.insert(activity.id.clone(), position);
			}
		}
		*self.row_index.lock().expect("index lock poisoned") = index;

		self.rows_tx.send_replace(rows);
		*self.last_publish.lock().expect("publish lock poisoned") = Some(Instant::now());
	}

	/// Stage 6: merge refined token attributes into a published activity and
	/// emit its new version on the updates stream.
	///
	/// Card attributes are untouched; the activity keeps its id so consumers
	/// can replace it in place. Unknown ids are ignored, the feed may have
	/// been republished since the refinement was scheduled.
	pub fn apply_token_attributes(
		&self,
		activity_id: &str,
		attributes: HashMap<String, AttributeValue>,
	) {
		let position = self
			.row_index
			.lock()
			.expect("index lock poisoned")
			.get(activity_id)
			.copied();
		let Some(position) = position else {
			debug!("No published row for activity {activity_id}, dropping refinement");
			return;
		};

		let mut updated = None;
		self.rows_tx.send_modify(|rows| {
			let refreshed = match rows.get_mut(position) {
				Some(ActivityRowModel::StandaloneActivity(a))
				| Some(ActivityRowModel::ChildActivity(a))
					if a.id == activity_id =>
				{
					Some(a)
				}
				_ => None,
			};
			if let Some(activity) = refreshed {
				for (name, value) in &attributes {
					activity.token_attributes.insert(name.clone(), value.clone());
				}
				updated = Some(activity.clone());
			}
		});

		if let Some(activity) = updated {
			let _ = self.updates_tx.send(activity);
		}
	}
}

fn is_spurious(watched: &WatchedCard, event: &RawEvent) -> bool {
	SPURIOUS_EVENT_RULES.iter().any(|rule| {
		watched.card.name == rule.card_name
			&& event.event_name == rule.event_name
			&& watched.contract == rule.contract
			&& event
				.values
				.get("amount")
				.map(|raw| is_zero_amount(raw))
				.unwrap_or(false)
	})
}

fn is_zero_amount(raw: &str) -> bool {
	let digits = raw.strip_prefix("0x").unwrap_or(raw);
	!digits.is_empty() && digits.chars().all(|c| c == '0')
}
