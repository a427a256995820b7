//! Wallet transaction and activity synchronization engine.
//!
//! This crate incrementally pulls a wallet's transaction history from an
//! etherscan-style explorer, tracks wallet-broadcast pending transactions to
//! finality, and resolves decoded on-chain events into a display-ready
//! activity feed.
//!
//! The two entry points are:
//!
//! - [`sync::TransactionProvider`]: the orchestrator running one polling loop
//!   per transaction category plus the pending-transaction watcher.
//! - [`activity::ActivitiesService`]: the pipeline turning raw events and the
//!   synced transaction window into the published feed.
//!
//! Persistence and token knowledge are supplied by the embedder through the
//! traits in [`store`]; in-memory implementations are included.

/// Event-to-feed activity resolution
pub mod activity;
/// Explorer API contracts and the HTTP client
pub mod explorer;
/// Persistence and token collaborator traits
pub mod store;
/// Transaction synchronization
pub mod sync;
/// Shared data model
pub mod types;

pub use activity::{ActivitiesConfig, ActivitiesService, SessionContext};
pub use explorer::{ExplorerApi, ExplorerError, HttpExplorerClient};
pub use sync::{ProviderConfig, TransactionProvider, WalletSession};
pub use types::{
	ActivityError, ChainId, RecordId, SyncError, Token, TransactionCategory, TransactionRecord,
	TransactionState,
};
