//! Integration tests for kf
//!
//! These tests need a kind cluster and tell the story of how developers and
//! platform operators interact with kf resources through the Kubernetes API.
//!
//! - `crd_operations`: creating, reading and updating Apps and Spaces, and
//!   reconciling an App into real Deployments, Services and autoscalers
//!
//! ```bash
//! cargo test --test kind -- --ignored
//! ```

mod crd_operations;
mod helpers;
