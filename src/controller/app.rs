//! App controller implementation
//!
//! Every pass synthesizes the App's sub-resources, writes the ones that
//! drifted, and folds what the cluster reports back into the App status.
//! Sub-resources are handled in registry order. A synthesis failure for one
//! kind does not stop the others, but a failed cluster call does.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::conditions::ConditionSet;
use crate::config::ControllerConfig;
use crate::crd::{App, AppStatus, Space};
use crate::resources::labels::is_controlled_by;
use crate::resources::{registered_kinds, DynSubResource, SubResourceKind};
use crate::status::AppStatusManager;
use crate::{Error, DEFAULT_ERROR_BACKOFF_SECS, DEFAULT_RESYNC_INTERVAL_SECS};

/// Trait abstracting the Kubernetes operations the App controller needs
///
/// Sub-resources travel as JSON so one client serves every registered kind.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AppKubeClient: Send + Sync {
    /// Get a Space by name, returning None if it does not exist
    async fn get_space(&self, name: &str) -> Result<Option<Space>, Error>;

    /// Get a sub-resource, returning None if it does not exist
    async fn get_resource(
        &self,
        kind: SubResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Value>, Error>;

    /// Create or update a sub-resource and return the object the server stored
    async fn apply_resource(
        &self,
        kind: SubResourceKind,
        namespace: &str,
        name: &str,
        desired: &Value,
    ) -> Result<Value, Error>;

    /// Replace the status of an App
    async fn patch_app_status(
        &self,
        namespace: &str,
        name: &str,
        status: &AppStatus,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeAppClient {
    client: Client,
    field_manager: String,
}

impl KubeAppClient {
    /// Create a new KubeAppClient writing as `field_manager`
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn dynamic_api(&self, kind: SubResourceKind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &kind.api_resource())
    }
}

#[async_trait]
impl AppKubeClient for KubeAppClient {
    async fn get_space(&self, name: &str) -> Result<Option<Space>, Error> {
        let api: Api<Space> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn get_resource(
        &self,
        kind: SubResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Value>, Error> {
        let Some(object) = self.dynamic_api(kind, namespace).get_opt(name).await? else {
            return Ok(None);
        };
        let value = serde_json::to_value(&object)
            .map_err(|e| Error::serialization_for_kind(kind.noun(), e.to_string()))?;
        Ok(Some(value))
    }

    async fn apply_resource(
        &self,
        kind: SubResourceKind,
        namespace: &str,
        name: &str,
        desired: &Value,
    ) -> Result<Value, Error> {
        let applied = self
            .dynamic_api(kind, namespace)
            .patch(
                name,
                &PatchParams::apply(&self.field_manager).force(),
                &Patch::Apply(desired),
            )
            .await?;
        serde_json::to_value(&applied)
            .map_err(|e| Error::serialization_for_kind(kind.noun(), e.to_string()))
    }

    async fn patch_app_status(
        &self,
        namespace: &str,
        name: &str,
        status: &AppStatus,
    ) -> Result<(), Error> {
        let api: Api<App> = Api::namespaced(self.client.clone(), namespace);

        let status_patch = serde_json::json!({
            "status": status
        });

        api.patch_status(
            name,
            &PatchParams::apply(&self.field_manager),
            &Patch::Merge(&status_patch),
        )
        .await?;

        Ok(())
    }
}

/// Controller context shared across reconciles
///
/// Use [`Context::for_cluster`] in production and [`Context::builder`] when
/// supplying your own client:
///
/// ```ignore
/// let ctx = Context::builder(Arc::new(fake_client))
///     .resync_interval(Duration::from_secs(30))
///     .build();
/// ```
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn AppKubeClient>,
    /// Condition set the App status is managed with
    pub conditions: ConditionSet,
    /// Sub-resource kinds reconciled for every App, in order
    pub kinds: Vec<Arc<dyn DynSubResource>>,
    /// Requeue delay after a converged pass
    pub resync_interval: Duration,
    /// Requeue delay after a failed pass
    pub error_backoff: Duration,
}

impl Context {
    /// Create a builder around `kube`
    pub fn builder(kube: Arc<dyn AppKubeClient>) -> ContextBuilder {
        ContextBuilder::new(kube)
    }

    /// Create a context talking to a real cluster
    pub fn for_cluster(client: Client, config: &ControllerConfig) -> Self {
        Self::builder(Arc::new(KubeAppClient::new(
            client,
            config.field_manager.clone(),
        )))
        .resync_interval(config.resync_interval())
        .error_backoff(config.error_backoff())
        .build()
    }

    /// Create a context for testing with a mock client
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn AppKubeClient>) -> Self {
        Self::builder(kube).build()
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    kube: Arc<dyn AppKubeClient>,
    conditions: Option<ConditionSet>,
    kinds: Option<Vec<Arc<dyn DynSubResource>>>,
    resync_interval: Duration,
    error_backoff: Duration,
}

impl ContextBuilder {
    fn new(kube: Arc<dyn AppKubeClient>) -> Self {
        Self {
            kube,
            conditions: None,
            kinds: None,
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
            error_backoff: Duration::from_secs(DEFAULT_ERROR_BACKOFF_SECS),
        }
    }

    /// Override the condition set (defaults to [`App::condition_set`])
    pub fn conditions(mut self, conditions: ConditionSet) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Override the reconciled kinds (defaults to [`registered_kinds`])
    pub fn kinds(mut self, kinds: Vec<Arc<dyn DynSubResource>>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    /// Set the requeue delay after a converged pass
    pub fn resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval;
        self
    }

    /// Set the requeue delay after a failed pass
    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            kube: self.kube,
            conditions: self.conditions.unwrap_or_else(App::condition_set),
            kinds: self.kinds.unwrap_or_else(registered_kinds),
            resync_interval: self.resync_interval,
            error_backoff: self.error_backoff,
        }
    }
}

/// Reconcile an App
///
/// Returns `Err` for retryable failures so the controller backs off,
/// `await_change` when only a spec edit can help, and otherwise requeues
/// after the resync interval.
#[instrument(
    skip(app, ctx),
    fields(app = %app.name_any(), namespace = %app.namespace().unwrap_or_default())
)]
pub async fn reconcile(app: Arc<App>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = app.name_any();
    let Some(namespace) = app.namespace() else {
        return Err(Error::validation_for(&name, "App must be namespaced"));
    };
    info!("reconciling app");

    let space = match ctx.kube.get_space(&namespace).await? {
        Some(space) => space,
        None => {
            warn!(space = %namespace, "space not found, reconciling without space defaults");
            Space::unconfigured(&namespace)
        }
    };

    let original = app.status.clone().unwrap_or_default();
    let mut status = original.clone();
    let mut failure: Option<Error> = None;

    {
        let mut manager = AppStatusManager::new(&ctx.conditions, &mut status);
        manager.initialize_conditions();
        manager.set_observed_generation(app.metadata.generation);

        for sub in &ctx.kinds {
            let result =
                reconcile_kind(sub.as_ref(), &app, &space, &namespace, &ctx, &mut manager).await;
            match result {
                Ok(()) => {}
                Err(e @ Error::Kube { .. }) => {
                    failure = Some(e);
                    break;
                }
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }

        debug!(ready = manager.is_ready(), "propagated sub-resource status");
    }

    if status != original {
        debug!("status changed, patching");
        ctx.kube.patch_app_status(&namespace, &name, &status).await?;
    }

    match failure {
        Some(e) if e.is_retryable() => Err(e),
        Some(e) => {
            warn!(error = %e, reason = e.reason(), "app cannot converge until its spec changes");
            Ok(Action::await_change())
        }
        None => Ok(Action::requeue(ctx.resync_interval)),
    }
}

/// Bring one sub-resource kind in line with the App
///
/// Every failure is recorded on the kind's condition before it is returned.
async fn reconcile_kind(
    sub: &dyn DynSubResource,
    app: &App,
    space: &Space,
    namespace: &str,
    ctx: &Context,
    status: &mut AppStatusManager<'_>,
) -> Result<(), Error> {
    let kind = sub.kind();

    let mut desired = match sub.synthesize(app, space) {
        Ok(desired) => desired,
        Err(e) => {
            warn!(%kind, error = %e, "failed to synthesize");
            status.condition_for(kind).mark_template_error(&e);
            return Err(e);
        }
    };
    let name = object_name(&desired).unwrap_or_else(|| app.name_any());

    let observed = match ctx.kube.get_resource(kind, namespace, &name).await {
        Ok(observed) => observed,
        Err(e) => {
            status.condition_for(kind).mark_reconciliation_error("getting", &e);
            return Err(e);
        }
    };

    if let Some(current) = &observed {
        if !json_controlled_by(current, app) {
            warn!(%kind, %name, "existing object is not controlled by this app");
            status.condition_for(kind).mark_child_not_owned(&name);
            return Ok(());
        }
        for pointer in sub.delegated_fields(app) {
            remove_field(&mut desired, pointer);
        }
    }

    let current = match observed {
        Some(current) if json_subset(&desired, &current) => current,
        observed => {
            let action = if observed.is_some() { "updating" } else { "creating" };
            info!(%kind, %name, action, "applying");
            match ctx.kube.apply_resource(kind, namespace, &name, &desired).await {
                Ok(applied) => applied,
                Err(e) => {
                    status.condition_for(kind).mark_reconciliation_error(action, &e);
                    return Err(e);
                }
            }
        }
    };

    if let Err(e) = sub.propagate(status, &current) {
        warn!(%kind, %name, error = %e, "failed to read observed object");
        status.condition_for(kind).mark_reconciliation_error("reading", &e);
        return Err(e);
    }
    Ok(())
}

/// Remove the field a JSON pointer names, if it is present
fn remove_field(object: &mut Value, pointer: &str) {
    let Some((parent, key)) = pointer.rsplit_once('/') else {
        return;
    };
    if let Some(Value::Object(map)) = object.pointer_mut(parent) {
        map.remove(key);
    }
}

fn object_name(object: &Value) -> Option<String> {
    object
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Returns true if the JSON object names `app` as its controller
pub fn json_controlled_by(object: &Value, app: &App) -> bool {
    object
        .get("metadata")
        .cloned()
        .and_then(|meta| serde_json::from_value::<ObjectMeta>(meta).ok())
        .is_some_and(|meta| is_controlled_by(&meta, app))
}

/// Returns true if every field set in `desired` has the same value in `observed`
///
/// Objects may carry extra keys in `observed`, which is where server-side
/// defaults land. Arrays must match element by element. The API server omits
/// zero values on output, so a desired `false`, `""`, `0`, `null` or empty
/// collection matches an absent field.
pub fn json_subset(desired: &Value, observed: &Value) -> bool {
    match (desired, observed) {
        (Value::Object(want), Value::Object(have)) => want.iter().all(|(key, value)| {
            match have.get(key) {
                Some(found) => json_subset(value, found),
                None => is_zero(value),
            }
        }),
        (Value::Array(want), Value::Array(have)) => {
            want.len() == have.len() && want.iter().zip(have).all(|(w, h)| json_subset(w, h))
        }
        (want, have) => want == have,
    }
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.values().all(is_zero),
    }
}

/// Error policy for the controller
///
/// Logs the failure and requeues after the configured backoff.
pub fn error_policy(app: Arc<App>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        app = %app.name_any(),
        reason = error.reason(),
        "reconciliation failed"
    );

    Action::requeue(ctx.error_backoff)
}
