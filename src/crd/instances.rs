//! Instance and scaling policy for Apps

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Scaling rules for an App
///
/// `exactly` pins the replica count; `min`/`max` give autoscaler bounds.
/// The two styles are mutually exclusive.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppSpecInstances {
    /// Scale the App to zero without deleting it
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stopped: bool,

    /// Exact number of instances to run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exactly: Option<i32>,

    /// Minimum number of instances
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i32>,

    /// Maximum number of instances
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i32>,
}

impl AppSpecInstances {
    /// Check that the policy resolves to a concrete shape
    pub fn validate(&self, app: &str) -> Result<(), Error> {
        for (field, value) in [("exactly", self.exactly), ("min", self.min), ("max", self.max)] {
            if let Some(v) = value {
                if v < 0 {
                    return Err(Error::invalid_scaling_policy(
                        app,
                        format!("{field} must be non-negative, got {v}"),
                    ));
                }
            }
        }

        if self.exactly.is_some() && (self.min.is_some() || self.max.is_some()) {
            return Err(Error::invalid_scaling_policy(
                app,
                "exactly cannot be combined with min or max",
            ));
        }

        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(Error::invalid_scaling_policy(
                    app,
                    format!("min ({min}) is greater than max ({max})"),
                ));
            }
        }

        Ok(())
    }

    /// Replica count for the App's Deployment
    ///
    /// A stopped App runs zero replicas; otherwise `exactly`, then `min`,
    /// then a single instance.
    pub fn deployment_replicas(&self, app: &str) -> Result<i32, Error> {
        self.validate(app)?;

        if self.stopped {
            return Ok(0);
        }

        Ok(self.exactly.or(self.min).unwrap_or(1))
    }

    /// Whether the autoscaler, not the App, decides the running replica count
    ///
    /// Stopped and `exactly` apps pin their replicas; everything else scales
    /// between the autoscaler bounds.
    pub fn is_autoscaled(&self) -> bool {
        !self.stopped && self.exactly.is_none()
    }

    /// `(min, max)` bounds for the App's autoscaler
    ///
    /// The autoscaler API rejects a minimum below one, and the maximum never
    /// drops under the minimum.
    pub fn autoscaling_bounds(&self, app: &str) -> Result<(i32, i32), Error> {
        self.validate(app)?;

        let min = self.min.or(self.exactly).unwrap_or(1).max(1);
        let max = self.max.or(self.exactly).unwrap_or(min).max(min);
        Ok((min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instances(exactly: Option<i32>, min: Option<i32>, max: Option<i32>) -> AppSpecInstances {
        AppSpecInstances {
            stopped: false,
            exactly,
            min,
            max,
        }
    }

    #[test]
    fn test_default_runs_one_instance() {
        let policy = AppSpecInstances::default();
        assert_eq!(policy.deployment_replicas("app").expect("valid"), 1);
        assert_eq!(policy.autoscaling_bounds("app").expect("valid"), (1, 1));
    }

    #[test]
    fn test_exactly_pins_replicas_and_bounds() {
        let policy = instances(Some(3), None, None);
        assert_eq!(policy.deployment_replicas("app").expect("valid"), 3);
        assert_eq!(policy.autoscaling_bounds("app").expect("valid"), (3, 3));
    }

    #[test]
    fn test_min_max_range() {
        let policy = instances(None, Some(2), Some(5));
        assert_eq!(policy.deployment_replicas("app").expect("valid"), 2);
        assert_eq!(policy.autoscaling_bounds("app").expect("valid"), (2, 5));
    }

    #[test]
    fn test_zero_exactly_keeps_autoscaler_floor() {
        let policy = instances(Some(0), None, None);
        assert_eq!(policy.deployment_replicas("app").expect("valid"), 0);
        assert_eq!(policy.autoscaling_bounds("app").expect("valid"), (1, 1));
    }

    #[test]
    fn test_only_max_set() {
        let policy = instances(None, None, Some(4));
        assert_eq!(policy.deployment_replicas("app").expect("valid"), 1);
        assert_eq!(policy.autoscaling_bounds("app").expect("valid"), (1, 4));
    }

    /// Story: Stopping an App scales it to zero but keeps its policy intact
    #[test]
    fn story_stopped_app_runs_nothing() {
        let mut policy = instances(Some(3), None, None);
        policy.stopped = true;
        assert_eq!(policy.deployment_replicas("app").expect("valid"), 0);
        assert_eq!(policy.autoscaling_bounds("app").expect("valid"), (3, 3));
    }

    #[test]
    fn test_only_unpinned_running_apps_are_autoscaled() {
        assert!(AppSpecInstances::default().is_autoscaled());
        assert!(instances(None, Some(2), Some(6)).is_autoscaled());
        assert!(!instances(Some(3), None, None).is_autoscaled());

        let mut stopped = instances(None, Some(2), Some(6));
        stopped.stopped = true;
        assert!(!stopped.is_autoscaled());
    }

    /// Story: Contradictory policies are rejected with a reason the user can act on
    #[test]
    fn story_conflicting_policies_are_rejected() {
        let cases = [
            (instances(Some(2), Some(1), None), "exactly cannot be combined"),
            (instances(Some(2), None, Some(3)), "exactly cannot be combined"),
            (instances(None, Some(5), Some(2)), "min (5) is greater than max (2)"),
            (instances(Some(-1), None, None), "exactly must be non-negative"),
            (instances(None, Some(-2), None), "min must be non-negative"),
        ];

        for (policy, expected) in cases {
            let err = policy
                .deployment_replicas("petclinic")
                .expect_err("policy should be rejected");
            assert!(
                matches!(err, Error::InvalidScalingPolicy { .. }),
                "unexpected error {err:?}"
            );
            assert!(err.to_string().contains(expected), "{err} lacks {expected}");
            assert!(policy.autoscaling_bounds("petclinic").is_err());
        }
    }

    #[test]
    fn test_serde_omits_unset_fields() {
        let json = serde_json::to_value(instances(None, Some(1), Some(3))).expect("serialize");
        assert_eq!(json, serde_json::json!({"min": 1, "max": 3}));

        let parsed: AppSpecInstances =
            serde_json::from_value(serde_json::json!({"stopped": true})).expect("deserialize");
        assert!(parsed.stopped);
        assert_eq!(parsed.exactly, None);
    }
}
