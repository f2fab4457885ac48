//! Sub-resource synthesis
//!
//! Each low-level resource an App owns is described by a [`SubResource`]:
//! how to synthesize the desired object from `(App, Space)` and how to fold
//! the observed object back into the App status. Synthesis is a pure
//! function of the App spec and the Space; it never reads App status.
//!
//! The controller does not call the typed impls directly. It iterates
//! [`registered_kinds`], a list of type-erased [`DynSubResource`] handles that
//! exchange objects as JSON, so adding a kind means adding one impl and one
//! registry entry.

pub mod autoscaler;
pub mod deployment;
pub mod env;
pub mod labels;
pub mod service;

use std::marker::PhantomData;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::Service;
use kube::api::ApiResource;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::crd::{App, Space};
use crate::status::AppStatusManager;
use crate::Error;

/// The kinds of resource an App owns
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubResourceKind {
    /// apps/v1 Deployment
    Deployment,
    /// v1 Service
    Service,
    /// autoscaling/v1 HorizontalPodAutoscaler
    Autoscaler,
}

impl SubResourceKind {
    /// Human-readable name used in condition messages
    pub fn noun(&self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::Service => "Service",
            Self::Autoscaler => "Autoscaler",
        }
    }

    /// API coordinates for dynamic clients
    pub fn api_resource(&self) -> ApiResource {
        match self {
            Self::Deployment => ApiResource::erase::<Deployment>(&()),
            Self::Service => ApiResource::erase::<Service>(&()),
            Self::Autoscaler => ApiResource::erase::<HorizontalPodAutoscaler>(&()),
        }
    }
}

impl std::fmt::Display for SubResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.noun())
    }
}

/// A resource kind an App owns
pub trait SubResource: Send + Sync + 'static {
    /// The concrete API type
    type Resource: Serialize + DeserializeOwned;

    /// Which kind this is
    const KIND: SubResourceKind;

    /// Compute the desired object
    fn synthesize(app: &App, space: &Space) -> Result<Self::Resource, Error>;

    /// Fold an observed object into the App status
    fn propagate(status: &mut AppStatusManager<'_>, observed: &Self::Resource);

    /// JSON pointers another controller owns once the object exists
    ///
    /// They are written on create and left out of later drift checks and
    /// applies.
    fn delegated_fields(_app: &App) -> &'static [&'static str] {
        &[]
    }
}

/// The App's Deployment
pub struct AppDeployment;

impl SubResource for AppDeployment {
    type Resource = Deployment;
    const KIND: SubResourceKind = SubResourceKind::Deployment;

    fn synthesize(app: &App, space: &Space) -> Result<Deployment, Error> {
        deployment::make_deployment(app, space)
    }

    fn propagate(status: &mut AppStatusManager<'_>, observed: &Deployment) {
        status.propagate_deployment_status(observed);
    }

    // The autoscaler resizes the Deployment through its scale subresource.
    fn delegated_fields(app: &App) -> &'static [&'static str] {
        if app.spec.instances.is_autoscaled() {
            &["/spec/replicas"]
        } else {
            &[]
        }
    }
}

/// The App's Service
pub struct AppService;

impl SubResource for AppService {
    type Resource = Service;
    const KIND: SubResourceKind = SubResourceKind::Service;

    fn synthesize(app: &App, _space: &Space) -> Result<Service, Error> {
        service::make_service(app)
    }

    fn propagate(status: &mut AppStatusManager<'_>, observed: &Service) {
        status.propagate_service_status(observed);
    }
}

/// The App's HorizontalPodAutoscaler
pub struct AppAutoscaler;

impl SubResource for AppAutoscaler {
    type Resource = HorizontalPodAutoscaler;
    const KIND: SubResourceKind = SubResourceKind::Autoscaler;

    fn synthesize(app: &App, _space: &Space) -> Result<HorizontalPodAutoscaler, Error> {
        autoscaler::make_autoscaler(app)
    }

    fn propagate(status: &mut AppStatusManager<'_>, observed: &HorizontalPodAutoscaler) {
        status.propagate_autoscaler_status(observed);
    }
}

/// Object-safe handle on a [`SubResource`], exchanging objects as JSON
pub trait DynSubResource: Send + Sync {
    /// Which kind this handle drives
    fn kind(&self) -> SubResourceKind;

    /// Compute the desired object as JSON
    fn synthesize(&self, app: &App, space: &Space) -> Result<serde_json::Value, Error>;

    /// Fold an observed JSON object into the App status
    fn propagate(
        &self,
        status: &mut AppStatusManager<'_>,
        observed: &serde_json::Value,
    ) -> Result<(), Error>;

    /// JSON pointers left to another controller once the object exists
    fn delegated_fields(&self, app: &App) -> &'static [&'static str];
}

struct Erased<S>(PhantomData<fn() -> S>);

impl<S: SubResource> DynSubResource for Erased<S> {
    fn kind(&self) -> SubResourceKind {
        S::KIND
    }

    fn synthesize(&self, app: &App, space: &Space) -> Result<serde_json::Value, Error> {
        let desired = S::synthesize(app, space)?;
        serde_json::to_value(&desired)
            .map_err(|e| Error::serialization_for_kind(S::KIND.noun(), e.to_string()))
    }

    fn propagate(
        &self,
        status: &mut AppStatusManager<'_>,
        observed: &serde_json::Value,
    ) -> Result<(), Error> {
        let observed: S::Resource = serde_json::from_value(observed.clone())
            .map_err(|e| Error::serialization_for_kind(S::KIND.noun(), e.to_string()))?;
        S::propagate(status, &observed);
        Ok(())
    }

    fn delegated_fields(&self, app: &App) -> &'static [&'static str] {
        S::delegated_fields(app)
    }
}

/// Type-erase a [`SubResource`]
pub fn erase<S: SubResource>() -> Arc<dyn DynSubResource> {
    Arc::new(Erased::<S>(PhantomData))
}

/// Every kind an App owns, in reconcile order
pub fn registered_kinds() -> Vec<Arc<dyn DynSubResource>> {
    vec![
        erase::<AppDeployment>(),
        erase::<AppService>(),
        erase::<AppAutoscaler>(),
    ]
}
