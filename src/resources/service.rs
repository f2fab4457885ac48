//! Service synthesis

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use super::deployment::user_port;
use super::labels::{owned_metadata, pod_labels, SERVICE_COMPONENT};
use crate::crd::App;
use crate::{Error, SERVICE_PORT, USER_PORT_NAME};

/// Name of the Service for `app`
pub fn service_name(app: &App) -> String {
    app.name_any()
}

/// Build the Service fronting the App's pods
///
/// Port 80 maps onto the resolved user port, which always has a value, so
/// the only failure is an App without name, uid or namespace.
pub fn make_service(app: &App) -> Result<Service, Error> {
    Ok(Service {
        metadata: owned_metadata(app, SERVICE_COMPONENT)?,
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                name: Some(USER_PORT_NAME.to_string()),
                protocol: Some("TCP".to_string()),
                port: SERVICE_PORT,
                target_port: Some(IntOrString::Int(user_port(app))),
                ..Default::default()
            }]),
            selector: Some(pod_labels(app)),
            ..Default::default()
        }),
        status: None,
    })
}
