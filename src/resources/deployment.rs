//! Deployment synthesis
//!
//! The Deployment runs exactly one user container built from the App's first
//! container template, the built image and the Space's execution defaults.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, ExecAction, HTTPGetAction, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements, TCPSocketAction,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use super::env::{compose_env, injected_env_from, to_k8s_env};
use super::labels::{owned_metadata, pod_labels, APP_SERVER_COMPONENT};
use crate::crd::{App, ContainerSpec, ProbePort, ProbeSpec, ResourceRequirementsSpec, Space};
use crate::{
    Error, DEFAULT_USER_PORT, PROGRESS_DEADLINE_SECONDS, REVISION_HISTORY_LIMIT, USER_PORT_NAME,
};

/// Pod-template annotation mirroring `spec.template.updateRequests`
pub const UPDATE_REQUESTS_ANNOTATION: &str = "kf.dev/update-requests";

/// Container name used when the App does not name its container
pub const DEFAULT_CONTAINER_NAME: &str = "user-container";

/// Name of the Deployment for `app`
pub fn deployment_name(app: &App) -> String {
    app.name_any()
}

/// Port the user container listens on
///
/// The first declared container port wins when it is non-zero; later ports
/// are ignored.
pub fn user_port(app: &App) -> i32 {
    app.first_container()
        .and_then(|c| c.ports.first())
        .map(|p| p.container_port)
        .filter(|port| *port != 0)
        .unwrap_or(DEFAULT_USER_PORT)
}

/// Build the desired Deployment for `app` in `space`
///
/// Fails with [`Error::MissingImage`] until the build has published an image
/// and with [`Error::InvalidScalingPolicy`] when the instances block cannot
/// be resolved to a replica count.
pub fn make_deployment(app: &App, space: &Space) -> Result<Deployment, Error> {
    let image = app
        .image()
        .ok_or_else(|| Error::missing_image(app.name_any()))?;
    let replicas = app.spec.instances.deployment_replicas(&app.name_any())?;

    let selector = pod_labels(app);

    let mut pod_annotations = BTreeMap::new();
    pod_annotations.insert(
        UPDATE_REQUESTS_ANNOTATION.to_string(),
        app.spec.template.update_requests.to_string(),
    );

    Ok(Deployment {
        metadata: owned_metadata(app, APP_SERVER_COMPONENT)?,
        spec: Some(DeploymentSpec {
            progress_deadline_seconds: Some(PROGRESS_DEADLINE_SECONDS),
            replicas: Some(replicas),
            revision_history_limit: Some(REVISION_HISTORY_LIMIT),
            selector: LabelSelector {
                match_labels: Some(selector.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector),
                    annotations: Some(pod_annotations),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: app.spec.template.service_account_name.clone(),
                    containers: vec![make_container(app, space, image)],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    })
}

fn make_container(app: &App, space: &Space, image: &str) -> Container {
    // A degenerate template still yields one structurally valid container
    let placeholder = ContainerSpec::default();
    let spec = app.first_container().unwrap_or(&placeholder);
    let port = user_port(app);
    let env = compose_env(space.default_env(), &spec.env, port);

    Container {
        name: spec
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTAINER_NAME.to_string()),
        image: Some(image.to_string()),
        command: non_empty(&spec.command),
        args: non_empty(&spec.args),
        env: Some(to_k8s_env(&env)),
        env_from: Some(vec![injected_env_from(app)]),
        ports: Some(vec![ContainerPort {
            name: Some(USER_PORT_NAME.to_string()),
            container_port: port,
            protocol: Some(
                spec.ports
                    .first()
                    .and_then(|p| p.protocol.clone())
                    .unwrap_or_else(|| "TCP".to_string()),
            ),
            ..Default::default()
        }]),
        resources: spec.resources.as_ref().map(make_resources),
        liveness_probe: spec.liveness_probe.as_ref().map(|p| make_probe(p, port)),
        readiness_probe: spec.readiness_probe.as_ref().map(|p| make_probe(p, port)),
        ..Default::default()
    }
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values.to_vec())
    }
}

fn make_resources(spec: &ResourceRequirementsSpec) -> ResourceRequirements {
    let quantities = |m: &BTreeMap<String, String>| {
        if m.is_empty() {
            None
        } else {
            Some(
                m.iter()
                    .map(|(k, v)| (k.clone(), Quantity(v.clone())))
                    .collect::<BTreeMap<_, _>>(),
            )
        }
    };
    ResourceRequirements {
        requests: quantities(&spec.requests),
        limits: quantities(&spec.limits),
        ..Default::default()
    }
}

/// Convert a probe, pointing literal ports at the user port
///
/// Named ports are kept as written. A handler with no port targets the user
/// port, since the core API requires one.
fn make_probe(spec: &ProbeSpec, user_port: i32) -> Probe {
    let target = |port: &Option<ProbePort>| match port {
        Some(ProbePort::Name(name)) => IntOrString::String(name.clone()),
        Some(ProbePort::Number(_)) | None => IntOrString::Int(user_port),
    };

    Probe {
        http_get: spec.http_get.as_ref().map(|h| HTTPGetAction {
            path: h.path.clone(),
            port: target(&h.port),
            scheme: h.scheme.clone(),
            ..Default::default()
        }),
        tcp_socket: spec.tcp_socket.as_ref().map(|t| TCPSocketAction {
            port: target(&t.port),
            host: None,
        }),
        exec: spec.exec.as_ref().map(|e| ExecAction {
            command: non_empty(&e.command),
        }),
        initial_delay_seconds: spec.initial_delay_seconds,
        timeout_seconds: spec.timeout_seconds,
        period_seconds: spec.period_seconds,
        success_threshold: spec.success_threshold,
        failure_threshold: spec.failure_threshold,
        ..Default::default()
    }
}
