//! Activity Resolution Module
//!
//! This module turns raw decoded on-chain events into the display-ready
//! activity feed. It is composed of several submodules, each responsible for
//! one stage of the pipeline:
//!
//! - `cards`: Metadata-defined event templates and attribute coercion.
//! - `cache`: Per-cycle memoization of token/holder resolution.
//! - `reconcile`: Merging activities with the synced transaction window.
//! - `resolver`: The orchestrating service running the full pipeline.
//! - `types`: Activities, feed rows, and filter strategies.
//!
//! The feed is published through a watch channel; consumers additionally get
//! a per-activity update stream for asynchronous attribute refinement.

/// Per-cycle token/holder resolution cache
pub mod cache;
/// Metadata-defined activity cards
pub mod cards;
/// Feed reconciliation and grouping
pub mod reconcile;
/// The pipeline-orchestrating service
pub mod resolver;
/// Activity and feed row types
pub mod types;

pub use cards::{ActivityCard, CardProvider, TokenDefinition};
pub use reconcile::build_feed;
pub use resolver::{ActivitiesConfig, ActivitiesService, SessionContext};
pub use types::{
	ActivitiesFilterStrategy, Activity, ActivityRowModel, ActivityState, AttributeValue,
};
