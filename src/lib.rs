//! kube-ingress-proxy - a proxy route table stored as Kubernetes resources
//!
//! Each route (routespec -> backend target) is materialized as an
//! `Endpoints`, a `Service` and an `Ingress` sharing one name, so the
//! cluster's ingress controller does the actual forwarding. There is no
//! private database: the route table is read back from a watch-fed cache of
//! the Ingress objects.
//!
//! # Modules
//!
//! - [`naming`] - Deterministic routespec -> resource name mapping
//! - [`resources`] - Builds the three route objects and reads routes back
//! - [`client`] - Per-kind create/replace/delete seam over the cluster API
//! - [`cache`] - Reflector-backed caches of the route objects
//! - [`proxy`] - Route reconciliation, teardown and the route table
//! - [`retry`] - Backoff used to confirm writes against the caches
//! - [`config`] - Proxy settings and kube client configuration
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod naming;
pub mod proxy;
pub mod resources;
pub mod retry;

pub use error::Error;
pub use naming::safe_name;
pub use proxy::KubeIngressProxy;
pub use resources::RouteRecord;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Labels and annotations on route resources
// =============================================================================

/// Label identifying the component that owns the route resources
pub const LABEL_COMPONENT: &str = "component";

/// Label marking a resource as a proxy route
pub const LABEL_PROXY_ROUTE: &str = "hub.jupyter.org/proxy-route";

/// Label naming the system that created the resource
pub const LABEL_HERITAGE: &str = "heritage";

/// Ingress annotation holding the routespec
pub const ANNOTATION_ROUTESPEC: &str = "hub.jupyter.org/proxy-routespec";

/// Ingress annotation holding the route target
pub const ANNOTATION_TARGET: &str = "hub.jupyter.org/proxy-target";

/// Ingress annotation holding the JSON-encoded route data
pub const ANNOTATION_DATA: &str = "hub.jupyter.org/proxy-data";
