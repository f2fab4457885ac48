//! Space Custom Resource Definition
//!
//! A Space is the policy object for one namespace. It is cluster-scoped and
//! named after the namespace it governs; every App in that namespace picks up
//! the Space's execution defaults at synthesis time.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::app::EnvVar;

/// Specification for a Space
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "kf.dev",
    version = "v1alpha1",
    kind = "Space",
    plural = "spaces",
    namespaced = false,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SpaceSpec {
    /// Runtime defaults applied to every App in the Space
    #[serde(default)]
    pub execution: SpaceSpecExecution,
}

/// Runtime defaults for Apps in a Space
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct SpaceSpecExecution {
    /// Environment variables injected before each App's own variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

impl Space {
    /// A Space with no defaults, used for namespaces nobody configured
    pub fn unconfigured(name: &str) -> Self {
        Space::new(name, SpaceSpec::default())
    }

    /// Default environment variables, in declared order
    pub fn default_env(&self) -> &[EnvVar] {
        &self.spec.execution.env
    }
}
