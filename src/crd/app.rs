//! App Custom Resource Definition
//!
//! An App is a 12-factor application: one container template, a scaling
//! policy and the image produced by its build. The controller turns it into a
//! Deployment, a Service and a HorizontalPodAutoscaler and reports their
//! combined health on the App's status.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::gen::SchemaGenerator;
use schemars::schema::{Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::instances::AppSpecInstances;
use super::types::Condition;
use crate::conditions::ConditionSet;

/// Condition type set once the Service fronting the App exists
pub const SERVICE_READY: &str = "ServiceReady";

/// Condition type set once the App's autoscaler has been observed
pub const AUTOSCALER_READY: &str = "AutoscalerReady";

/// Condition type mirroring the readiness of the App's Deployment
pub const DEPLOYMENT_READY: &str = "DeploymentReady";

/// Specification for an App
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "kf.dev",
    version = "v1alpha1",
    kind = "App",
    plural = "apps",
    shortname = "app",
    status = "AppStatus",
    namespaced,
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.build.image"}"#,
    printcolumn = r#"{"name":"Instances","type":"integer","jsonPath":".status.replicas.currentReplicas"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Reason","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AppSpec {
    /// Runtime configuration for the App's pods
    #[serde(default)]
    pub template: AppSpecTemplate,

    /// Output of the App's build
    #[serde(default)]
    pub build: AppSpecBuild,

    /// Scaling rules
    #[serde(default)]
    pub instances: AppSpecInstances,
}

/// Pod-level runtime configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSpecTemplate {
    /// Containers for the App; only the first one is run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<ContainerSpec>,

    /// Service account the pods run as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    /// Bump to force a rollout without changing anything else
    #[serde(default)]
    pub update_requests: u32,
}

/// Build output for an App
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSpecBuild {
    /// Fully resolved image reference published by the build
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A user container
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    /// Container name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Entrypoint override
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    /// Arguments to the entrypoint
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Environment variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// Ports the container listens on; only the first is routed to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ContainerPortSpec>,

    /// Compute resource requests and limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirementsSpec>,

    /// Probe deciding when the container is restarted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<ProbeSpec>,

    /// Probe deciding when the container receives traffic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<ProbeSpec>,
}

/// An environment variable
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct EnvVar {
    /// Variable name
    pub name: String,

    /// Variable value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl EnvVar {
    /// Create a variable with a value
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }
}

/// A container port
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPortSpec {
    /// Port name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Port number; zero means unset
    #[serde(default)]
    pub container_port: i32,

    /// Protocol (TCP, UDP)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// Compute resources in Kubernetes quantity notation
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ResourceRequirementsSpec {
    /// Resource requests (e.g. `cpu: 100m`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,

    /// Resource limits (e.g. `memory: 1Gi`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
}

/// A health probe
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeSpec {
    /// HTTP GET handler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_get: Option<HttpGetProbe>,

    /// TCP socket handler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_socket: Option<TcpSocketProbe>,

    /// Command handler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<ExecProbe>,

    /// Seconds after start before the first probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay_seconds: Option<i32>,

    /// Seconds before a probe times out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i32>,

    /// Seconds between probes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_seconds: Option<i32>,

    /// Consecutive successes to count as healthy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_threshold: Option<i32>,

    /// Consecutive failures to count as unhealthy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<i32>,
}

/// HTTP GET probe handler
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct HttpGetProbe {
    /// Request path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Target port, by number or name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "int_or_string")]
    pub port: Option<ProbePort>,

    /// HTTP or HTTPS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
}

/// TCP socket probe handler
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct TcpSocketProbe {
    /// Target port, by number or name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "int_or_string")]
    pub port: Option<ProbePort>,
}

/// Command probe handler
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ExecProbe {
    /// Command to run inside the container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
}

/// A probe target port
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ProbePort {
    /// Literal port number
    Number(i32),
    /// Named container port
    Name(String),
}

fn int_or_string(_: &mut SchemaGenerator) -> Schema {
    let mut schema = SchemaObject::default();
    schema
        .extensions
        .insert("x-kubernetes-int-or-string".into(), true.into());
    Schema::Object(schema)
}

/// Status for an App
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppStatus {
    /// Generation of the spec this status reflects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Conditions representing the App state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Replica counts reported by the autoscaler
    #[serde(default)]
    pub replicas: ReplicaStatus,

    /// Where the App can be reached
    #[serde(default)]
    pub route: RouteStatus,

    /// Revision bookkeeping
    #[serde(default)]
    pub revisions: RevisionStatus,
}

/// Replica counts snapshot
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaStatus {
    /// Replicas currently running
    #[serde(default)]
    pub current_replicas: i32,

    /// Replicas the autoscaler wants
    #[serde(default)]
    pub desired_replicas: i32,
}

/// Routing information
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct RouteStatus {
    /// Externally observable URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Cluster-local address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Addressable>,
}

/// An addressable endpoint
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Addressable {
    /// Endpoint URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Revision names derived from the Deployment's rollout history
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RevisionStatus {
    /// Most recently created revision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_created_revision_name: Option<String>,

    /// Most recent revision that became ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_ready_revision_name: Option<String>,
}

impl App {
    /// The condition set every App status is managed with
    pub fn condition_set() -> ConditionSet {
        ConditionSet::living([SERVICE_READY, AUTOSCALER_READY, DEPLOYMENT_READY])
    }

    /// The built image, if the build has published a non-empty one
    pub fn image(&self) -> Option<&str> {
        self.spec
            .build
            .image
            .as_deref()
            .filter(|image| !image.trim().is_empty())
    }

    /// The first declared container, if any
    pub fn first_container(&self) -> Option<&ContainerSpec> {
        self.spec.template.containers.first()
    }
}
