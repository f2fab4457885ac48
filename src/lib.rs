//! kf - declarative app control plane for Kubernetes
//!
//! kf turns a high-level `App` description (a 12-factor app with scaling and
//! revision semantics) into the low-level primitives that run it: a
//! Deployment, a Service and a HorizontalPodAutoscaler. It then folds the
//! observed state of those primitives back into a single aggregated readiness
//! verdict on the App.
//!
//! # Architecture
//!
//! Every reconcile pass runs the same three steps:
//! - Synthesis: pure functions compute desired sub-resources from the App spec
//!   and the Space it lives in
//! - Apply: the controller diffs desired against observed and writes changes
//! - Propagation: observed sub-resource state is mapped onto App conditions,
//!   honouring generation staleness
//!
//! # Modules
//!
//! - [`conditions`] - Condition sets and the aggregate readiness state machine
//! - [`crd`] - Custom Resource Definitions (App, Space)
//! - [`resources`] - Sub-resource synthesis (Deployment, Service, autoscaler)
//! - [`status`] - Status propagation from observed sub-resources
//! - [`controller`] - Kubernetes controller reconciliation logic
//! - [`config`] - Controller configuration
//! - [`telemetry`] - Logging initialisation
//! - [`error`] - Error types for the controller

#![deny(missing_docs)]

pub mod conditions;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod resources;
pub mod status;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Field manager used for server-side apply
pub const DEFAULT_FIELD_MANAGER: &str = "kf-controller";

/// Port the user container listens on when the App declares none
pub const DEFAULT_USER_PORT: i32 = 8080;

/// Port the synthesized Service exposes inside the cluster
pub const SERVICE_PORT: i32 = 80;

/// Name given to the user port on containers and Services
pub const USER_PORT_NAME: &str = "http-user-port";

/// Seconds a Deployment may make no progress before it is marked failed
pub const PROGRESS_DEADLINE_SECONDS: i32 = 300;

/// Old ReplicaSets kept around for rollback
pub const REVISION_HISTORY_LIMIT: i32 = 10;

/// Default interval between periodic resyncs of a converged App
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Default delay before retrying a failed reconcile
pub const DEFAULT_ERROR_BACKOFF_SECS: u64 = 5;
