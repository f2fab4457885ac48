//! Status propagation from observed sub-resources onto the App
//!
//! [`AppStatusManager`] binds the App's [`ConditionSet`] to an [`AppStatus`]
//! and hands out one named condition view per sub-resource. The
//! `propagate_*` methods read an observed object and update the matching
//! view.
//!
//! Any observed object whose `status.observedGeneration` differs from its
//! `metadata.generation` has not caught up with the latest desired state.
//! Its condition is marked ReconciliationPending and no other field is read.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;

use crate::conditions::{ConditionManager, ConditionSet, SingleConditionManager};
use crate::crd::{
    Addressable, AppStatus, Condition, ConditionStatus, AUTOSCALER_READY, DEPLOYMENT_READY,
    SERVICE_READY,
};
use crate::resources::SubResourceKind;

/// Annotation the Deployment controller stamps with the rollout revision
pub const DEPLOYMENT_REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";

/// Aggregate condition type of the derived Deployment set
pub const DEPLOYMENT_CONDITION_READY: &str = "Ready";

/// Derived condition following the Deployment's `Progressing` condition
pub const DEPLOYMENT_CONDITION_PROGRESSING: &str = "Progressing";

/// Derived condition inverting the Deployment's `ReplicaFailure` condition
pub const DEPLOYMENT_CONDITION_REPLICA_SET_READY: &str = "ReplicaSetReady";

/// Binds the App condition set to one status record
pub struct AppStatusManager<'a> {
    set: &'a ConditionSet,
    status: &'a mut AppStatus,
}

impl<'a> AppStatusManager<'a> {
    /// Manage `status` with `set`
    pub fn new(set: &'a ConditionSet, status: &'a mut AppStatus) -> Self {
        Self { set, status }
    }

    /// The status being managed
    pub fn status(&self) -> &AppStatus {
        &*self.status
    }

    /// The underlying condition manager
    pub fn manage(&mut self) -> ConditionManager<'_> {
        self.set.manage(&mut self.status.conditions)
    }

    /// Insert any missing condition as Unknown
    pub fn initialize_conditions(&mut self) {
        self.manage().initialize_conditions();
    }

    /// Record the App generation this status describes
    pub fn set_observed_generation(&mut self, generation: Option<i64>) {
        self.status.observed_generation = generation;
    }

    /// Returns true iff the aggregate condition is True
    pub fn is_ready(&mut self) -> bool {
        self.manage().is_happy()
    }

    /// View on the ServiceReady condition
    pub fn service_condition(&mut self) -> SingleConditionManager<'_> {
        self.condition_for(SubResourceKind::Service)
    }

    /// View on the AutoscalerReady condition
    pub fn autoscaler_condition(&mut self) -> SingleConditionManager<'_> {
        self.condition_for(SubResourceKind::Autoscaler)
    }

    /// View on the DeploymentReady condition
    pub fn deployment_condition(&mut self) -> SingleConditionManager<'_> {
        self.condition_for(SubResourceKind::Deployment)
    }

    /// View on the condition owned by `kind`
    pub fn condition_for(&mut self, kind: SubResourceKind) -> SingleConditionManager<'_> {
        let condition_type = match kind {
            SubResourceKind::Deployment => DEPLOYMENT_READY,
            SubResourceKind::Service => SERVICE_READY,
            SubResourceKind::Autoscaler => AUTOSCALER_READY,
        };
        SingleConditionManager::new(self.manage(), condition_type, kind.noun())
    }

    /// Publish the Service's cluster-local address and mark it ready
    ///
    /// Services carry no generation or conditions, so nothing can be stale.
    pub fn propagate_service_status(&mut self, service: &Service) {
        let url = format!(
            "http://{}.{}.svc.cluster.local",
            service.name_any(),
            service.namespace().unwrap_or_default()
        );

        self.status.route.url = Some(url.clone());
        self.status.route.address = Some(Addressable { url: Some(url) });

        self.service_condition().mark_success();
    }

    /// Copy autoscaler replica counts and mark it ready
    ///
    /// Replica counts are written before the success mark; a reader between
    /// the two sees the latest counts next to the previous condition.
    pub fn propagate_autoscaler_status(&mut self, autoscaler: &HorizontalPodAutoscaler) {
        let observed = autoscaler
            .status
            .as_ref()
            .and_then(|s| s.observed_generation);
        if observed != autoscaler.metadata.generation {
            self.autoscaler_condition().mark_reconciliation_pending();
            return;
        }

        if let Some(status) = autoscaler.status.as_ref() {
            self.status.replicas.current_replicas = status.current_replicas;
            self.status.replicas.desired_replicas = status.desired_replicas;
        }

        self.autoscaler_condition().mark_success();
    }

    /// Map the Deployment's rollout state onto DeploymentReady
    pub fn propagate_deployment_status(&mut self, deployment: &Deployment) {
        let observed = deployment
            .status
            .as_ref()
            .and_then(|s| s.observed_generation);
        if observed != deployment.metadata.generation {
            self.deployment_condition().mark_reconciliation_pending();
            return;
        }

        let revision = deployment
            .annotations()
            .get(DEPLOYMENT_REVISION_ANNOTATION)
            .map(|rev| format!("{}-{}", deployment.name_any(), rev));
        if revision.is_some() {
            self.status.revisions.latest_created_revision_name = revision.clone();
        }

        let derived = transform_deployment_status(deployment.status.as_ref());
        let Some(ready) = derived
            .iter()
            .find(|c| c.type_ == DEPLOYMENT_CONDITION_READY)
        else {
            return;
        };

        let mut condition = self.deployment_condition();
        match ready.status {
            ConditionStatus::True => condition.mark_success(),
            ConditionStatus::False => condition.mark_false(&ready.reason, &ready.message),
            ConditionStatus::Unknown => condition.mark_unknown(&ready.reason, &ready.message),
        }

        if ready.is_true() && revision.is_some() {
            self.status.revisions.latest_ready_revision_name = revision;
        }
    }
}

/// Derive a Ready/Progressing/ReplicaSetReady condition set from a Deployment
///
/// `Progressing` starts Unknown with reason `Deploying` and follows the
/// Deployment's own `Progressing` condition. `ReplicaSetReady` starts True
/// and is the inverse of `ReplicaFailure`. The aggregate `Ready` combines
/// the two.
pub fn transform_deployment_status(status: Option<&DeploymentStatus>) -> Vec<Condition> {
    let set = ConditionSet::new(
        DEPLOYMENT_CONDITION_READY,
        [
            DEPLOYMENT_CONDITION_PROGRESSING,
            DEPLOYMENT_CONDITION_REPLICA_SET_READY,
        ],
    );

    let mut conditions = Vec::new();
    let mut mgr = set.manage(&mut conditions);
    mgr.initialize_conditions();
    mgr.mark_true(DEPLOYMENT_CONDITION_REPLICA_SET_READY);
    mgr.mark_unknown(DEPLOYMENT_CONDITION_PROGRESSING, "Deploying", "");

    for cond in status.and_then(|s| s.conditions.as_ref()).into_iter().flatten() {
        let reason = cond.reason.as_deref().unwrap_or_default();
        let message = cond.message.as_deref().unwrap_or_default();
        let state = ConditionStatus::from_k8s(&cond.status);

        match cond.type_.as_str() {
            "Progressing" => match state {
                ConditionStatus::True => mgr.mark_true(DEPLOYMENT_CONDITION_PROGRESSING),
                ConditionStatus::False => {
                    mgr.mark_false(DEPLOYMENT_CONDITION_PROGRESSING, reason, message)
                }
                ConditionStatus::Unknown => {
                    mgr.mark_unknown(DEPLOYMENT_CONDITION_PROGRESSING, reason, message)
                }
            },
            "ReplicaFailure" => match state {
                ConditionStatus::True => {
                    mgr.mark_false(DEPLOYMENT_CONDITION_REPLICA_SET_READY, reason, message)
                }
                ConditionStatus::False => mgr.mark_true(DEPLOYMENT_CONDITION_REPLICA_SET_READY),
                ConditionStatus::Unknown => {
                    mgr.mark_unknown(DEPLOYMENT_CONDITION_REPLICA_SET_READY, reason, message)
                }
            },
            _ => {}
        }
    }

    conditions
}
