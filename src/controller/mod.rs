//! Controller implementation for the App CRD
//!
//! The reconciler follows the Kubernetes controller pattern: synthesize the
//! desired children, diff them against the cluster, apply the difference, and
//! report what the cluster says back onto the App.

mod app;

pub use app::{
    error_policy, json_controlled_by, json_subset, reconcile, AppKubeClient, Context,
    ContextBuilder, KubeAppClient,
};
