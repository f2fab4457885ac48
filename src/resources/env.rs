//! Environment variable composition for the user container
//!
//! Variables are layered in a fixed order and later layers override earlier
//! ones by name:
//!
//! 1. Space defaults, in the order the Space declares them
//! 2. the App's own variables
//! 3. `PORT`, set to the resolved user port
//!
//! Variables injected by the platform (service bindings and the like) come
//! from a per-App secret attached through `envFrom` rather than inlined.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvFromSource, EnvVar as K8sEnvVar, SecretEnvSource};
use kube::ResourceExt;

use crate::crd::{App, EnvVar};

/// Name of the variable carrying the port the App must listen on
pub const PORT_ENV: &str = "PORT";

/// Prefix of the secret holding platform-injected variables
pub const INJECTED_ENV_SECRET_PREFIX: &str = "kf-injected-envs-";

/// Name of the secret holding platform-injected variables for `app`
pub fn injected_env_secret_name(app: &App) -> String {
    format!("{}{}", INJECTED_ENV_SECRET_PREFIX, app.name_any())
}

/// Deduplicate variables by name, keeping the last occurrence
///
/// The result is ordered by name so that identical inputs always produce
/// identical pod templates.
pub fn dedup_env<I>(vars: I) -> Vec<EnvVar>
where
    I: IntoIterator<Item = EnvVar>,
{
    let mut by_name: BTreeMap<String, EnvVar> = BTreeMap::new();
    for var in vars {
        by_name.insert(var.name.clone(), var);
    }
    by_name.into_values().collect()
}

/// Layer Space defaults, App variables and `PORT` into the final list
pub fn compose_env(space_env: &[EnvVar], app_env: &[EnvVar], port: i32) -> Vec<EnvVar> {
    let layered = space_env
        .iter()
        .chain(app_env)
        .cloned()
        .chain(std::iter::once(EnvVar::new(PORT_ENV, port.to_string())));
    dedup_env(layered)
}

/// Convert composed variables into their core API form
pub fn to_k8s_env(vars: &[EnvVar]) -> Vec<K8sEnvVar> {
    vars.iter()
        .map(|var| K8sEnvVar {
            name: var.name.clone(),
            value: var.value.clone(),
            value_from: None,
        })
        .collect()
}

/// `envFrom` source attaching the App's injected-variable secret
pub fn injected_env_from(app: &App) -> EnvFromSource {
    EnvFromSource {
        secret_ref: Some(SecretEnvSource {
            name: Some(injected_env_secret_name(app)),
            optional: None,
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::AppSpec;

    fn pairs(vars: &[EnvVar]) -> Vec<(String, String)> {
        vars.iter()
            .map(|v| (v.name.clone(), v.value.clone().unwrap_or_default()))
            .collect()
    }

    /// Story: App variables override Space defaults of the same name
    #[test]
    fn story_app_env_overrides_space_defaults() {
        let space = vec![EnvVar::new("FOO", "0"), EnvVar::new("BAR", "0")];
        let app = vec![EnvVar::new("FOO", "1"), EnvVar::new("BAZZ", "0")];

        let deduped = dedup_env(space.into_iter().chain(app));
        assert_eq!(
            pairs(&deduped),
            vec![
                ("BAR".to_string(), "0".to_string()),
                ("BAZZ".to_string(), "0".to_string()),
                ("FOO".to_string(), "1".to_string()),
            ]
        );
    }

    /// Story: PORT always reflects the resolved port, even if the user set it
    #[test]
    fn story_port_cannot_be_overridden() {
        let app = vec![EnvVar::new(PORT_ENV, "1234")];
        let composed = compose_env(&[], &app, 9090);
        assert_eq!(pairs(&composed), vec![("PORT".to_string(), "9090".to_string())]);
    }

    #[test]
    fn test_compose_is_deterministic() {
        let space = vec![EnvVar::new("Z", "1"), EnvVar::new("A", "2")];
        let app = vec![EnvVar::new("M", "3")];
        assert_eq!(compose_env(&space, &app, 8080), compose_env(&space, &app, 8080));
    }

    #[test]
    fn test_unset_values_survive_conversion() {
        let vars = vec![EnvVar {
            name: "EMPTY".to_string(),
            value: None,
        }];
        let k8s = to_k8s_env(&vars);
        assert_eq!(k8s[0].name, "EMPTY");
        assert!(k8s[0].value.is_none());
    }

    #[test]
    fn test_injected_secret_reference() {
        let app = App::new("petclinic", AppSpec::default());
        let source = injected_env_from(&app);
        let secret = source.secret_ref.expect("secret ref");
        assert_eq!(secret.name.as_deref(), Some("kf-injected-envs-petclinic"));
        assert!(source.config_map_ref.is_none());
    }
}
