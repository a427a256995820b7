//! Transaction Synchronization Module
//!
//! This module provides the core logic for incrementally pulling a wallet's
//! transaction history from a remote explorer. It is composed of several
//! submodules, each responsible for a specific aspect of the sync process:
//!
//! - `pagination`: The overlap-tolerant cursor advancing over offset-paginated pages.
//! - `scheduler`: One polling loop per transaction category, each with its own cursor and interval.
//! - `pending`: The watcher finalizing wallet-broadcast transactions.
//! - `events`: The event types flowing from schedulers to the orchestrator.
//! - `provider`: The orchestrator owning schedulers, tracker, persistence, and lifecycle.
//!
//! Categories are fully independent: each scheduler persists its own cursor
//! and a permanent stop or failure in one never affects the others.

/// Events flowing from schedulers to the orchestrator
pub mod events;
/// Overlap-tolerant pagination cursor
pub mod pagination;
/// Watcher for wallet-broadcast pending transactions
pub mod pending;
/// Sync orchestrator and lifecycle
pub mod provider;
/// Per-category polling loops
pub mod scheduler;

pub use pagination::{PaginationCursor, advance};
pub use provider::{
	ProviderConfig, ProviderState, ProviderStats, TransactionProvider, WalletSession,
};
pub use scheduler::SchedulerState;
