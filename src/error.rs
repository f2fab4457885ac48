//! Error types for the kf controller
//!
//! Errors carry the app they relate to so that the reconciler can log them
//! with context and map them onto status conditions. Two families matter to
//! the reconcile loop:
//!
//! - Synthesis errors (`MissingImage`, `InvalidScalingPolicy`) are expected
//!   intermediate or user-fixable states and are reflected on the App status.
//! - Collaborator errors (`Kube`) are retried with backoff by the controller.

use thiserror::Error;

/// Main error type for kf operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The App has no built image yet
    #[error("waiting for a built image for app {app}")]
    MissingImage {
        /// Name of the app waiting on its build
        app: String,
    },

    /// The instances policy cannot be resolved to a replica count
    #[error("invalid scaling policy for app {app}: {message}")]
    InvalidScalingPolicy {
        /// Name of the app with the bad policy
        app: String,
        /// Description of the conflict
        message: String,
    },

    /// Validation error for CRD specs
    #[error("validation error for {app}: {message}")]
    Validation {
        /// Name of the app with invalid configuration
        app: String,
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

}

impl Error {
    /// Create a missing-image error for the given app
    pub fn missing_image(app: impl Into<String>) -> Self {
        Self::MissingImage { app: app.into() }
    }

    /// Create an invalid-scaling-policy error for the given app
    pub fn invalid_scaling_policy(app: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidScalingPolicy {
            app: app.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error with app context
    pub fn validation_for(app: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            app: app.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Check if this error is retryable
    ///
    /// A missing image resolves itself once the build publishes one, so it is
    /// retried. Scaling, validation and serialization errors need a spec fix.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                // 4xx means the request itself is wrong; retrying won't help
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code)
                )
            }
            Error::MissingImage { .. } => true,
            Error::InvalidScalingPolicy { .. } => false,
            Error::Validation { .. } => false,
            Error::Serialization { .. } => false,
        }
    }

    /// Machine-readable reason used when this error is written to a condition
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Kube { .. } => "KubernetesError",
            Error::MissingImage { .. } => "MissingImage",
            Error::InvalidScalingPolicy { .. } => "InvalidScalingPolicy",
            Error::Validation { .. } => "ValidationFailed",
            Error::Serialization { .. } => "SerializationError",
        }
    }
}
