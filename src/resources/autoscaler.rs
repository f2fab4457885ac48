//! HorizontalPodAutoscaler synthesis

use k8s_openapi::api::autoscaling::v1::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec,
};
use kube::ResourceExt;

use super::deployment::deployment_name;
use super::labels::{owned_metadata, AUTOSCALER_COMPONENT};
use crate::crd::App;
use crate::Error;

/// Average CPU utilization the autoscaler aims for
pub const TARGET_CPU_UTILIZATION_PERCENTAGE: i32 = 80;

/// Name of the autoscaler for `app`
pub fn autoscaler_name(app: &App) -> String {
    app.name_any()
}

/// Build the autoscaler targeting the App's Deployment
///
/// A stopped App keeps its autoscaler; Kubernetes leaves a Deployment scaled
/// to zero alone.
pub fn make_autoscaler(app: &App) -> Result<HorizontalPodAutoscaler, Error> {
    let (min, max) = app.spec.instances.autoscaling_bounds(&app.name_any())?;

    Ok(HorizontalPodAutoscaler {
        metadata: owned_metadata(app, AUTOSCALER_COMPONENT)?,
        spec: Some(HorizontalPodAutoscalerSpec {
            min_replicas: Some(min),
            max_replicas: max,
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".to_string()),
                kind: "Deployment".to_string(),
                name: deployment_name(app),
            },
            target_cpu_utilization_percentage: Some(TARGET_CPU_UTILIZATION_PERCENTAGE),
        }),
        status: None,
    })
}
