//! Custom Resource Definitions for kf
//!
//! This module contains all CRD definitions used by the kf controller.

mod app;
mod instances;
mod space;
mod types;

pub use app::{
    Addressable, App, AppSpec, AppSpecBuild, AppSpecTemplate, AppStatus, ContainerPortSpec,
    ContainerSpec, EnvVar, ExecProbe, HttpGetProbe, ProbePort, ProbeSpec, ReplicaStatus,
    ResourceRequirementsSpec, RevisionStatus, RouteStatus, TcpSocketProbe, AUTOSCALER_READY,
    DEPLOYMENT_READY, SERVICE_READY,
};
pub use instances::AppSpecInstances;
pub use space::{Space, SpaceSpec, SpaceSpecExecution};
pub use types::{Condition, ConditionStatus};
