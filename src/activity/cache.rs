//! Per-cycle token/holder resolution cache.
//!
//! The same contract can appear in hundreds of events within one reload, and
//! re-deriving holder state per event does not scale. The cache memoizes
//! resolution per contract for exactly one pipeline cycle: it is constructed
//! fresh at the start of every reload and passed by reference through the
//! stages, which makes the rebuilt-every-cycle invariant structural rather
//! than a convention. Misses (including unknown contracts) are cached too, so
//! a contract with no token is looked up once per cycle at most.

use crate::activity::types::{ResolvedToken, TokenHolder};
use crate::store::TokenRegistry;
use crate::types::{ChainId, TokenKind};
use std::collections::HashMap;

/// Request-scoped memoization of (contract, chain) -> token/holder.
#[derive(Default)]
pub struct CycleCache {
	entries: HashMap<(String, ChainId), Option<(ResolvedToken, TokenHolder)>>,
}

impl CycleCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// Resolve a contract's token and holder representation, hitting the
	/// registry at most once per (contract, chain) per cycle.
	///
	/// Native-currency tokens get a synthetic single-unit holder; contracts
	/// the registry does not know resolve to `None`.
	pub async fn resolve(
		&mut self,
		contract: &str,
		chain_id: ChainId,
		registry: &dyn TokenRegistry,
	) -> Option<(ResolvedToken, TokenHolder)> {
		let key = (contract.to_lowercase(), chain_id);
		if let Some(cached) = self.entries.get(&key) {
			return cached.clone();
		}

		let resolved = registry.token(contract, chain_id).await.map(|token| {
			let holder = if token.kind == TokenKind::Native {
				TokenHolder::synthetic_native()
			} else {
				TokenHolder::from_token(&token)
			};
			(ResolvedToken::from(&token), holder)
		});

		self.entries.insert(key, resolved.clone());
		resolved
	}

	/// Number of distinct contracts resolved this cycle.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
