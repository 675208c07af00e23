//! Error types for the ingress route proxy
//!
//! Errors carry the resource kind and safe name they concern so a failed
//! `add_route` or `delete_route` can be traced back to the cluster object
//! that caused it. Conflicts on create and missing objects on delete are
//! handled inside the reconciler and never show up here.

use std::time::Duration;

use thiserror::Error;

/// Boxed error kept as the cause of configuration failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for route operations
#[derive(Debug, Error)]
pub enum Error {
    /// Cluster API call failed with a status the reconciler does not recover from
    #[error("kubernetes error on {kind}/{name}: {source}")]
    Api {
        /// Resource kind (endpoints, service, ingress)
        kind: &'static str,
        /// Safe name of the resource
        name: String,
        /// The underlying kube-rs error
        #[source]
        source: kube::Error,
    },

    /// A write was acknowledged but never became visible in the watch cache
    #[error("could not find {kind}/{name} after creating it (waited {waited:?})")]
    ConfirmationTimeout {
        /// Resource kind (endpoints, service, ingress)
        kind: &'static str,
        /// Safe name of the resource
        name: String,
        /// How long the cache was polled before giving up
        waited: Duration,
    },

    /// The route target could not be turned into a backend address
    #[error("invalid target '{target}': {message}")]
    InvalidTarget {
        /// Target as supplied by the caller
        target: String,
        /// What is wrong with it
        message: String,
    },

    /// Route data could not be encoded into an annotation
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Client configuration could not be loaded
    #[error("configuration error: {message}")]
    Config {
        /// Description of what failed
        message: String,
        /// Underlying error, if any
        #[source]
        source: Option<BoxError>,
    },

    /// A resource watch stopped before its initial list completed
    #[error("watch for {kind} stopped before the cache was populated")]
    CacheNotReady {
        /// Resource kind being watched
        kind: &'static str,
    },
}

impl Error {
    /// Wrap a kube-rs error with the resource it concerns
    pub fn api(kind: &'static str, name: impl Into<String>, source: kube::Error) -> Self {
        Self::Api {
            kind,
            name: name.into(),
            source,
        }
    }

    /// Create an invalid-target error
    pub fn invalid_target(target: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidTarget {
            target: target.into(),
            message: msg.into(),
        }
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a configuration error caused by `source`
    pub fn config_with(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// HTTP status of the API failure, if this error came from the API server
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api {
                source: kube::Error::Api(ae),
                ..
            } => Some(ae.code),
            _ => None,
        }
    }
}

/// Returns true if the kube error is an API response with the given status code
pub(crate) fn is_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == code)
}

#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("test {}", reason),
        reason: reason.to_string(),
        code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_names_kind_and_resource() {
        let err = Error::api("service", "jupyter-abc-route", api_error(500, "InternalError"));
        let msg = err.to_string();
        assert!(msg.contains("service/jupyter-abc-route"));
        assert!(msg.contains("kubernetes error"));
        assert_eq!(err.status_code(), Some(500));
    }

    #[test]
    fn confirmation_timeout_names_kind_and_resource() {
        let err = Error::ConfirmationTimeout {
            kind: "ingress",
            name: "jupyter-x-route".to_string(),
            waited: Duration::from_secs(10),
        };
        assert!(err.to_string().contains("ingress/jupyter-x-route"));
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn status_matching_only_hits_api_responses() {
        assert!(is_status(&api_error(404, "NotFound"), 404));
        assert!(!is_status(&api_error(409, "AlreadyExists"), 404));
    }

    #[test]
    fn constructors_accept_str_and_string() {
        let err = Error::invalid_target(String::from("nope"), "missing host");
        assert!(err.to_string().contains("invalid target 'nope'"));

        let err = Error::config(format!("bad CA file {}", "/tmp/ca.pem"));
        assert!(err.to_string().contains("/tmp/ca.pem"));
    }

    #[test]
    fn config_error_keeps_its_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = Error::config_with("failed to read CA cert /tmp/ca.pem", cause);

        assert!(err.to_string().contains("/tmp/ca.pem"));
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "no such file");

        assert!(std::error::Error::source(&Error::config("plain")).is_none());
    }
}
