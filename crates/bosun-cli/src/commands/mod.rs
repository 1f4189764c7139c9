//! CLI commands

// Offline planning
pub mod diff;
pub mod plan;

// Cluster operations
pub mod charts;
pub mod deploy;
pub mod undeploy;
pub mod watch;
