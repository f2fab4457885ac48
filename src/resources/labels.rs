//! Labels, annotations and ownership metadata shared by every sub-resource

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::crd::App;
use crate::Error;

/// Label naming the tool that manages a resource
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Label naming the App a resource belongs to
pub const NAME_LABEL: &str = "app.kubernetes.io/name";

/// Label naming the role a resource plays for its App
pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";

/// Value of [`MANAGED_BY_LABEL`] on everything kf creates
pub const MANAGED_BY: &str = "kf";

/// Annotation carrying the App generation a sub-resource was synthesized from
pub const APP_GENERATION_ANNOTATION: &str = "kf.dev/app-generation";

/// Component running the App's pods (Deployment and pod template)
pub const APP_SERVER_COMPONENT: &str = "app-server";

/// Component for the Service fronting the pods
pub const SERVICE_COMPONENT: &str = "service";

/// Component for the App's autoscaler
pub const AUTOSCALER_COMPONENT: &str = "autoscaler";

/// The fixed label set identifying one component of an App
pub fn component_labels(app: &App, component: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string());
    labels.insert(NAME_LABEL.to_string(), app.name_any());
    labels.insert(COMPONENT_LABEL.to_string(), component.to_string());
    labels
}

/// Labels selecting the App's pods
pub fn pod_labels(app: &App) -> BTreeMap<String, String> {
    component_labels(app, APP_SERVER_COMPONENT)
}

/// Merge `overrides` over `base`; keys in `overrides` win
pub fn union_maps(
    base: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = base.clone();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Controller owner reference pointing back at the App
pub fn owner_reference(app: &App) -> Result<OwnerReference, Error> {
    let owner = app.controller_owner_ref(&()).ok_or_else(|| {
        Error::validation_for(app.name_any(), "App has no name or uid to own resources with")
    })?;
    Ok(OwnerReference {
        block_owner_deletion: Some(true),
        ..owner
    })
}

/// Metadata for a sub-resource of `app` playing `component`
///
/// The resource is named after the App, lives in the App's namespace, carries
/// the App's labels plus the component labels, and is controller-owned by
/// the App.
pub fn owned_metadata(app: &App, component: &str) -> Result<ObjectMeta, Error> {
    let name = app.name_any();
    let namespace = app
        .namespace()
        .ok_or_else(|| Error::validation_for(&name, "App has no namespace"))?;

    let mut annotations = BTreeMap::new();
    annotations.insert(
        APP_GENERATION_ANNOTATION.to_string(),
        app.metadata.generation.unwrap_or_default().to_string(),
    );

    Ok(ObjectMeta {
        name: Some(name),
        namespace: Some(namespace),
        labels: Some(union_maps(app.labels(), &component_labels(app, component))),
        annotations: Some(annotations),
        owner_references: Some(vec![owner_reference(app)?]),
        ..Default::default()
    })
}

/// Returns true if `meta` names `app` as its controller
pub fn is_controlled_by(meta: &ObjectMeta, app: &App) -> bool {
    let Some(uid) = app.metadata.uid.as_deref() else {
        return false;
    };
    meta.owner_references
        .iter()
        .flatten()
        .any(|owner| owner.controller == Some(true) && owner.uid == uid)
}
