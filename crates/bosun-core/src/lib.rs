//! Bosun Core - cluster-free logic for the Kubernetes application deployer
//!
//! This crate provides:
//! - **Resource Classifier**: Decode manifest documents into typed records, keeping undecodable ones
//! - **Resource Planner**: Order resources into phases for creation and deletion
//! - **Diff Engine**: Compute what a new version no longer contains, honoring retention rules
//! - **Health States**: The `State` lattice and the `AppStatus` it reduces into
//! - **Status Informers**: `[namespace/]kind/name` watch declarations with kind aliasing
//! - **Charts**: Discover chart artifacts, match them to declarations, order installs
//! - **Annotations**: The `bosun.io/*` keys the engine interprets

pub mod annotations;
pub mod chart;
pub mod diff;
pub mod error;
pub mod informer;
pub mod order;
pub mod plan;
pub mod property;
pub mod resource;
pub mod selector;
pub mod state;

pub use chart::{
    ChartEntry, ChartSpec, FoundChart, declared_charts, discover_charts, order_entries,
    removed_charts, sort_charts,
};
pub use diff::{
    DiffOptions, RetainReason, compute_deletions, plan_deletions, resource_key, retain_reason,
};
pub use error::{CoreError, Result};
pub use informer::{KindAliases, StatusInformer, parse_informers};
pub use order::KindOrder;
pub use plan::{Phase, PhaseSummary, Plan, PlanSummary, Planner, compare_phases, should_dry_run};
pub use property::PropertyPath;
pub use resource::{Gvk, Resource, classify, parse_manifests, split_documents};
pub use selector::{selector_matches, selector_to_query};
pub use state::{
    AppStatus, ResourceKey, ResourceState, State, StatusBoard, max_state, min_state,
};
