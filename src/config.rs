//! Proxy configuration
//!
//! Settings come from command-line flags with environment fallbacks. The
//! kube client configuration is inferred (kubeconfig or in-cluster service
//! account) and can be overridden with an explicit API host and CA bundle.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use tracing::{debug, info};

use crate::retry::BackoffConfig;
use crate::{Error, Result, LABEL_COMPONENT, LABEL_HERITAGE, LABEL_PROXY_ROUTE};

/// File holding the pod's namespace when running with a service account
pub const SERVICE_ACCOUNT_NAMESPACE_PATH: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Namespace used when not running inside a cluster
pub const FALLBACK_NAMESPACE: &str = "default";

/// Default value of the `component` label on route resources
pub const DEFAULT_COMPONENT_LABEL: &str = "singleuser-server";

/// Proxy settings
#[derive(Args, Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    /// Namespace to create route resources in
    ///
    /// Defaults to the pod's namespace when running with a service account,
    /// `default` otherwise.
    #[arg(long, env = "PROXY_NAMESPACE")]
    pub namespace: Option<String>,

    /// Value of the `component` label on route resources
    ///
    /// Useful to keep several hubs apart in one namespace.
    #[arg(long, env = "PROXY_COMPONENT_LABEL", default_value = DEFAULT_COMPONENT_LABEL)]
    pub component_label: String,

    /// Full URL of the Kubernetes API server ("https://hostname:port")
    ///
    /// Normally picked up from kubeconfig or the in-cluster environment.
    #[arg(long, env = "PROXY_K8S_API_HOST")]
    pub k8s_api_host: Option<String>,

    /// PEM file with the CA certificate(s) of the Kubernetes API server
    #[arg(long, env = "PROXY_K8S_API_SSL_CA_CERT")]
    pub k8s_api_ssl_ca_cert: Option<PathBuf>,

    /// Seconds to wait for a created resource to show up in the watch cache
    #[arg(long, default_value = "10")]
    pub confirm_timeout_secs: u64,

    /// First delay between cache checks, in milliseconds
    #[arg(long, default_value = "200")]
    pub confirm_initial_delay_ms: u64,

    /// Maximum delay between cache checks, in milliseconds
    #[arg(long, default_value = "5000")]
    pub confirm_max_delay_ms: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            component_label: DEFAULT_COMPONENT_LABEL.to_string(),
            k8s_api_host: None,
            k8s_api_ssl_ca_cert: None,
            confirm_timeout_secs: 10,
            confirm_initial_delay_ms: 200,
            confirm_max_delay_ms: 5000,
        }
    }
}

impl ProxyConfig {
    /// Namespace to manage routes in
    pub async fn namespace(&self) -> String {
        match &self.namespace {
            Some(ns) => ns.clone(),
            None => namespace_from_file(Path::new(SERVICE_ACCOUNT_NAMESPACE_PATH)).await,
        }
    }

    /// Labels the route caches select on
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LABEL_COMPONENT.to_string(), self.component_label.clone()),
            (LABEL_PROXY_ROUTE.to_string(), "true".to_string()),
        ])
    }

    /// Labels written on every route resource
    pub fn resource_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.selector_labels();
        labels.insert(LABEL_HERITAGE.to_string(), "jupyterhub".to_string());
        labels
    }

    /// Label selector string for the route caches
    pub fn label_selector(&self) -> String {
        self.selector_labels()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Backoff used when confirming writes against the cache
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(self.confirm_initial_delay_ms),
            max_delay: Duration::from_millis(self.confirm_max_delay_ms),
            timeout: Duration::from_secs(self.confirm_timeout_secs),
            ..Default::default()
        }
    }

    /// Load the kube client configuration, applying host and CA overrides
    pub async fn kube_config(&self) -> Result<kube::Config> {
        let mut config = kube::Config::infer()
            .await
            .map_err(|e| Error::config_with("failed to load kube config", e))?;

        if let Some(host) = &self.k8s_api_host {
            config.cluster_url = host
                .parse()
                .map_err(|e| Error::config_with(format!("invalid API host '{}'", host), e))?;
            info!(host = %host, "using configured Kubernetes API host");
        }

        if let Some(path) = &self.k8s_api_ssl_ca_cert {
            let bundle = tokio::fs::read(path).await.map_err(|e| {
                Error::config_with(format!("failed to read CA cert {}", path.display()), e)
            })?;
            config.root_cert = Some(parse_pem_certs(&bundle)?);
            info!(path = %path.display(), "using configured Kubernetes API CA cert");
        }

        debug!(cluster_url = %config.cluster_url, "loaded kube config");
        Ok(config)
    }
}

/// Read the namespace from a service account file, or fall back to `default`
async fn namespace_from_file(path: &Path) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(ns) if !ns.trim().is_empty() => ns.trim().to_string(),
        _ => FALLBACK_NAMESPACE.to_string(),
    }
}

/// Split a PEM bundle into DER certificates, ignoring non-certificate blocks
fn parse_pem_certs(bundle: &[u8]) -> Result<Vec<Vec<u8>>> {
    let blocks = pem::parse_many(bundle)
        .map_err(|e| Error::config_with("CA cert is not valid PEM", e))?;

    let certs: Vec<Vec<u8>> = blocks
        .iter()
        .filter(|block| block.tag() == "CERTIFICATE")
        .map(|block| block.contents().to_vec())
        .collect();

    if certs.is_empty() {
        return Err(Error::config("CA cert file contains no certificates"));
    }
    Ok(certs)
}
