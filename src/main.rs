//! kf controller - reconciles Apps into Deployments, Services and autoscalers

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::Service;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt, Resource};

use kf::config::ControllerConfig;
use kf::controller::{error_policy, reconcile, Context};
use kf::crd::{App, Space};
use kf::telemetry::init_logging;

/// kf - declarative app control plane for Kubernetes
#[derive(Parser, Debug)]
#[command(name = "kf", version, about, long_about = None)]
struct Cli {
    /// Print CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the App controller (default mode)
    Controller(ControllerConfig),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        println!("{}", crd_manifests()?);
        return Ok(());
    }

    let config = match cli.command {
        Some(Commands::Controller(config)) => config,
        // Bare `kf` runs the controller with env and default settings
        None => match Cli::parse_from(["kf", "controller"]).command {
            Some(Commands::Controller(config)) => config,
            None => ControllerConfig::default(),
        },
    };

    init_logging(config.log_format)?;
    run_controller(config).await
}

/// Render every kf CRD as one multi-document YAML stream
fn crd_manifests() -> anyhow::Result<String> {
    let app = serde_yaml::to_string(&App::crd())
        .map_err(|e| anyhow::anyhow!("Failed to serialize App CRD: {}", e))?;
    let space = serde_yaml::to_string(&Space::crd())
        .map_err(|e| anyhow::anyhow!("Failed to serialize Space CRD: {}", e))?;
    Ok(format!("{app}---\n{space}"))
}

/// Install or update the kf CRDs with server-side apply
async fn ensure_crds_installed(client: &Client, field_manager: &str) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(field_manager).force();

    tracing::info!("Installing App CRD...");
    crds.patch(&App::crd_name(), &params, &Patch::Apply(&App::crd()))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install App CRD: {}", e))?;

    tracing::info!("Installing Space CRD...");
    crds.patch(&Space::crd_name(), &params, &Patch::Apply(&Space::crd()))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install Space CRD: {}", e))?;

    tracing::info!("All kf CRDs installed/updated");
    Ok(())
}

/// Namespaced API when a watch namespace is configured, cluster-wide otherwise
fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Run the App controller until a shutdown signal arrives
async fn run_controller(config: ControllerConfig) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client, &config.field_manager).await?;

    let namespace = config.namespace.as_deref();
    let apps: Api<App> = scoped_api(&client, namespace);
    let deployments: Api<Deployment> = scoped_api(&client, namespace);
    let services: Api<Service> = scoped_api(&client, namespace);
    let autoscalers: Api<HorizontalPodAutoscaler> = scoped_api(&client, namespace);

    let ctx = Arc::new(Context::for_cluster(client, &config));

    tracing::info!(
        namespace = namespace.unwrap_or("*"),
        field_manager = %config.field_manager,
        resync_secs = config.resync_interval_secs,
        "Starting App controller"
    );

    Controller::new(apps, WatcherConfig::default())
        .owns(deployments, WatcherConfig::default())
        .owns(services, WatcherConfig::default())
        .owns(autoscalers, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "App reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "App reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("App controller stopped");
    Ok(())
}
