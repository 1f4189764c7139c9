//! Bosun Kube - Kubernetes integration for Bosun
//!
//! This crate provides:
//! - **Appliers**: Apply and delete manifests through `kubectl` or in-process Server-Side Apply
//! - **Deployment Executor**: Diff, delete, dry-run, apply and wait, in plan order
//! - **Health**: Per-kind state calculators behind a kind capability registry
//! - **Readiness Waiter**: Block a deploy until a resource is ready or a property holds
//! - **App State Monitor**: Supervised watches streaming throttled `AppStatus` updates
//! - **Charts**: Drive `helm` installs and uninstalls in weight order
//! - **Hooks**: Background cleanup of finished hook Jobs
//! - **Shared routines**: Deploy-sequence tracking, pull-secret ensuring, namespace clearing

pub mod applier;
pub mod charts;
pub mod config;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod health;
pub mod hooks;
pub mod monitor;
pub mod namespaces;
pub mod registry;
pub mod tracker;
pub mod waiter;

pub use applier::{
    Applier, ApplyOutcome, ApplyRequest, CommandFailure, CommandOutput, KubectlApplier,
    RemoveRequest, ServerSideApplier,
};
pub use charts::{ChartInstaller, ChartOrchestrator, ChartSyncReport, HelmCli};
pub use config::{ApplierKind, EngineConfig, KindOrderConfig};
pub use discovery::{ApiResolver, ResolvedType};
pub use error::{KubeError, Result};
pub use executor::{DeployPhase, DeployRequest, DeployResult, Executor, UndeployRequest};
pub use health::GenerationTracker;
pub use hooks::{HookCleaner, JobOutcome, job_outcome, should_clean_up};
pub use monitor::{Monitor, MonitorConfig, MonitorHandle, WatchGroup};
pub use namespaces::{DiscoveryClearer, NamespaceClearer};
pub use registry::{KindCapability, KindRegistry, StateCalculator, StateSink, TypedKind};
pub use tracker::{DeployTracker, PullSecretEnsurer, docker_config_json};
pub use waiter::{Check, ObjectFetcher, ReadinessWaiter, ResourceWaiter, poll_until};
