//! Integration tests for CRD operations
//!
//! These tests tell the story of how developers and operators work with App
//! and Space resources through the Kubernetes API, and what the reconciler
//! builds from them in a real cluster.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};

use kf::config::ControllerConfig;
use kf::controller::{reconcile, Context};
use kf::crd::{App, AppSpec, EnvVar, Space, SpaceSpec};

use super::helpers::{ensure_test_cluster, TEST_FIELD_MANAGER};

const NAMESPACE: &str = "default";

// =============================================================================
// Test Fixtures
// =============================================================================

fn sample_app(name: &str) -> App {
    let mut app = App::new(name, AppSpec::default());
    app.metadata.namespace = Some(NAMESPACE.to_string());
    app.spec.build.image = Some("nginx:1.27".to_string());
    app.spec.instances.exactly = Some(1);
    app
}

async fn cleanup_app(client: &Client, name: &str) {
    let api: Api<App> = Api::namespaced(client.clone(), NAMESPACE);
    let _ = api.delete(name, &DeleteParams::default()).await;
}

async fn cleanup_space(client: &Client, name: &str) {
    let api: Api<Space> = Api::all(client.clone());
    let _ = api.delete(name, &DeleteParams::default()).await;
}

// =============================================================================
// CRD Round-trip Stories
// =============================================================================

/// Story: A developer creates an App and reads it back unchanged
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_developer_creates_app() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<App> = Api::namespaced(client.clone(), NAMESPACE);
    let name = "test-app-create";
    cleanup_app(&client, name).await;

    let mut app = sample_app(name);
    app.spec.template.containers = vec![kf::crd::ContainerSpec {
        env: vec![EnvVar::new("GREETING", "hello")],
        ..Default::default()
    }];

    let created = api
        .create(&PostParams::default(), &app)
        .await
        .expect("failed to create app");
    assert_eq!(created.name_any(), name);

    let fetched = api.get(name).await.expect("failed to get app");
    assert_eq!(fetched.spec, app.spec);
    assert!(fetched.metadata.generation.is_some());

    cleanup_app(&client, name).await;
}

/// Story: An operator configures a Space with default environment
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_operator_configures_space() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<Space> = Api::all(client.clone());
    let name = "test-space";
    cleanup_space(&client, name).await;

    let mut spec = SpaceSpec::default();
    spec.execution.env = vec![EnvVar::new("LOG_LEVEL", "debug")];
    api.create(&PostParams::default(), &Space::new(name, spec))
        .await
        .expect("failed to create space");

    let fetched = api.get(name).await.expect("failed to get space");
    assert_eq!(fetched.default_env(), &[EnvVar::new("LOG_LEVEL", "debug")]);
    assert!(fetched.namespace().is_none(), "Space is cluster-scoped");

    cleanup_space(&client, name).await;
}

/// Story: The status subresource accepts the controller's patches
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_status_is_patched_separately() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<App> = Api::namespaced(client.clone(), NAMESPACE);
    let name = "test-app-status";
    cleanup_app(&client, name).await;

    api.create(&PostParams::default(), &sample_app(name))
        .await
        .expect("failed to create app");

    let patch = serde_json::json!({"status": {"observedGeneration": 1}});
    api.patch_status(
        name,
        &PatchParams::apply(TEST_FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await
    .expect("failed to patch status");

    let fetched = api.get(name).await.expect("failed to get app");
    assert_eq!(
        fetched.status.and_then(|s| s.observed_generation),
        Some(1)
    );

    cleanup_app(&client, name).await;
}

// =============================================================================
// Reconcile Stories
// =============================================================================

/// Story: Reconciling an App builds its children in the cluster
///
/// Expected behavior:
/// - A Deployment, a Service and an autoscaler named after the App exist
/// - Each is controlled by the App, so deleting the App collects them
/// - The App status reports the Service URL
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_reconcile_builds_children() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let apps: Api<App> = Api::namespaced(client.clone(), NAMESPACE);
    let name = "test-app-reconcile";
    cleanup_app(&client, name).await;

    let created = apps
        .create(&PostParams::default(), &sample_app(name))
        .await
        .expect("failed to create app");

    let config = ControllerConfig {
        field_manager: TEST_FIELD_MANAGER.to_string(),
        ..Default::default()
    };
    let ctx = Arc::new(Context::for_cluster(client.clone(), &config));
    reconcile(Arc::new(created.clone()), ctx)
        .await
        .expect("reconcile");

    let uid = created.uid().expect("uid");
    let deployment = Api::<Deployment>::namespaced(client.clone(), NAMESPACE)
        .get(name)
        .await
        .expect("deployment");
    let service = Api::<Service>::namespaced(client.clone(), NAMESPACE)
        .get(name)
        .await
        .expect("service");
    let hpa = Api::<HorizontalPodAutoscaler>::namespaced(client.clone(), NAMESPACE)
        .get(name)
        .await
        .expect("autoscaler");

    for owners in [
        deployment.owner_references(),
        service.owner_references(),
        hpa.owner_references(),
    ] {
        assert!(owners
            .iter()
            .any(|o| o.uid == uid && o.controller == Some(true)));
    }

    let status = apps
        .get(name)
        .await
        .expect("app")
        .status
        .expect("status written");
    assert_eq!(
        status.route.url,
        Some(format!("http://{name}.{NAMESPACE}.svc.cluster.local"))
    );

    cleanup_app(&client, name).await;
}
