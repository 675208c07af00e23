//! Route reconciliation against the cluster
//!
//! [`KubeIngressProxy`] is the route table: `add_route` makes the Endpoints,
//! Service and Ingress for a route exist and match the desired bodies,
//! `delete_route` makes them not exist, and `get_all_routes` reads the table
//! back from the Ingress cache.
//!
//! Writes are confirmed against the watch caches rather than trusted from
//! the API response: an acknowledged write is not necessarily visible to
//! readers yet, and Ingress visibility is what downstream treats as "the
//! route is live". Resources are therefore reconciled in dependency order
//! (Endpoints, Service, Ingress), each one confirmed before the next.
//!
//! # Concurrency
//!
//! Calls for different routespecs are independent. Calls for the *same*
//! routespec must be serialized by the caller: two interleaved
//! `add_route`/`delete_route` calls race at the API server and the final
//! state depends on which write lands last.

use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::Ingress;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, info, instrument, warn};

use crate::cache::{ResourceCache, RouteCaches, KIND_ENDPOINTS, KIND_INGRESS, KIND_SERVICE};
use crate::client::{ResourceClient, RouteClients};
use crate::config::ProxyConfig;
use crate::error::is_status;
use crate::naming::safe_name;
use crate::resources::{build_route_resources, RouteRecord};
use crate::retry::{wait_until, BackoffConfig};
use crate::{Error, Result};

/// Route table backed by Kubernetes Endpoints, Services and Ingresses.
///
/// Only obtainable through [`KubeIngressProxy::initialize`] (or
/// [`KubeIngressProxy::from_parts`] with caches that are already synced), so
/// route operations cannot run against caches that have not been populated.
pub struct KubeIngressProxy {
    namespace: String,
    labels: BTreeMap<String, String>,
    backoff: BackoffConfig,
    clients: RouteClients,
    caches: RouteCaches,
}

impl KubeIngressProxy {
    /// Connect to the cluster, start the route caches and wait for them to sync.
    pub async fn initialize(config: &ProxyConfig) -> Result<Self> {
        let namespace = config.namespace().await;
        let kube_config = config.kube_config().await?;
        let client = Client::try_from(kube_config)
            .map_err(|e| Error::config_with("failed to create kube client", e))?;

        let caches = RouteCaches::start(client.clone(), &namespace, &config.label_selector());
        caches.wait_until_ready().await?;
        info!(namespace = %namespace, "route caches synced");

        Ok(Self::from_parts(
            namespace,
            config.resource_labels(),
            config.backoff(),
            RouteClients::kube(client),
            caches,
        ))
    }

    /// Assemble a proxy from already constructed clients and caches
    pub fn from_parts(
        namespace: impl Into<String>,
        labels: BTreeMap<String, String>,
        backoff: BackoffConfig,
        clients: RouteClients,
        caches: RouteCaches,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            labels,
            backoff,
            clients,
            caches,
        }
    }

    /// Namespace the route resources live in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Create or update the resources for a route and wait until they are visible.
    ///
    /// Fails if the target cannot be parsed, if the API server rejects a
    /// write with anything but a conflict, or if a written resource does not
    /// appear in its cache within the backoff budget.
    #[instrument(skip(self, data), fields(namespace = %self.namespace))]
    pub async fn add_route(
        &self,
        routespec: &str,
        target: &str,
        data: &serde_json::Value,
    ) -> Result<()> {
        let name = safe_name(routespec);
        let resources = build_route_resources(&name, routespec, target, &self.labels, data)?;

        match &resources.endpoints {
            Some(endpoints) => {
                self.ensure_object(
                    self.clients.endpoints.as_ref(),
                    &self.caches.endpoints,
                    &name,
                    endpoints,
                )
                .await?
            }
            // Target is not an IP; a previous version of this route may have left one behind
            None => {
                self.delete_if_exists(self.clients.endpoints.as_ref(), KIND_ENDPOINTS, &name)
                    .await?
            }
        }

        self.ensure_object(
            self.clients.services.as_ref(),
            &self.caches.services,
            &name,
            &resources.service,
        )
        .await?;

        self.ensure_object(
            self.clients.ingresses.as_ref(),
            &self.caches.ingresses,
            &name,
            &resources.ingress,
        )
        .await?;

        info!(name = %name, target = %target, "route added");
        Ok(())
    }

    /// Delete the resources of a route. Resources that are already gone are fine.
    ///
    /// The three deletions run concurrently: deleting the Service makes the
    /// cluster garbage-collect its Endpoints in the background, so the
    /// Endpoints deletion may find nothing left to delete.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn delete_route(&self, routespec: &str) -> Result<()> {
        let name = safe_name(routespec);

        let (endpoints, service, ingress) = futures::join!(
            self.delete_if_exists(self.clients.endpoints.as_ref(), KIND_ENDPOINTS, &name),
            self.delete_if_exists(self.clients.services.as_ref(), KIND_SERVICE, &name),
            self.delete_if_exists(self.clients.ingresses.as_ref(), KIND_INGRESS, &name),
        );
        endpoints?;
        service?;
        ingress?;

        info!(name = %name, "route deleted");
        Ok(())
    }

    /// All routes currently visible in the Ingress cache, keyed by routespec.
    ///
    /// Never calls the API server; the result lags the cluster by the watch
    /// latency. Ingresses without valid route annotations are skipped.
    pub fn get_all_routes(&self) -> BTreeMap<String, RouteRecord> {
        let ingresses = self.caches.ingresses.snapshot();
        ingresses
            .iter()
            .filter_map(|ingress| route_from_ingress(ingress))
            .map(|route| (route.routespec.clone(), route))
            .collect()
    }

    /// Create `body`, replacing the existing object on conflict, then wait
    /// for it to show up in `cache`.
    async fn ensure_object<K>(
        &self,
        api: &dyn ResourceClient<K>,
        cache: &ResourceCache<K>,
        name: &str,
        body: &K,
    ) -> Result<()>
    where
        K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
    {
        let kind = cache.kind();

        match api.create(&self.namespace, body).await {
            Ok(_) => info!(kind = %kind, name = %name, "created"),
            Err(e) if is_status(&e, 409) => {
                warn!(kind = %kind, name = %name, "already exists, replacing");
                api.replace(&self.namespace, name, body)
                    .await
                    .map_err(|e| Error::api(kind, name, e))?;
                info!(kind = %kind, name = %name, "replaced");
            }
            Err(e) => return Err(Error::api(kind, name, e)),
        }

        self.confirm_visible(cache, name).await
    }

    /// Wait for `namespace/name` to appear in `cache`
    async fn confirm_visible<K>(&self, cache: &ResourceCache<K>, name: &str) -> Result<()>
    where
        K: Resource<DynamicType = ()> + Clone + 'static,
    {
        let kind = cache.kind();
        let what = format!("{}/{}", kind, name);

        wait_until(&self.backoff, &what, || cache.contains(&self.namespace, name))
            .await
            .map_err(|exhausted| Error::ConfirmationTimeout {
                kind,
                name: name.to_string(),
                waited: exhausted.elapsed,
            })?;

        debug!(kind = %kind, name = %name, "visible in cache");
        Ok(())
    }

    /// Delete `name`, treating "not found" as success
    async fn delete_if_exists<K>(
        &self,
        api: &dyn ResourceClient<K>,
        kind: &'static str,
        name: &str,
    ) -> Result<()>
    where
        K: Send + Sync + 'static,
    {
        match api.delete(&self.namespace, name).await {
            Ok(()) => {
                info!(kind = %kind, name = %name, "deleted");
                Ok(())
            }
            Err(e) if is_status(&e, 404) => {
                warn!(kind = %kind, name = %name, "could not delete, does not exist");
                Ok(())
            }
            Err(e) => Err(Error::api(kind, name, e)),
        }
    }
}

fn route_from_ingress(ingress: &Ingress) -> Option<RouteRecord> {
    let route = RouteRecord::from_ingress(ingress);
    if route.is_none() {
        warn!(
            name = %ingress.name_any(),
            "ingress has no valid route annotations, skipping"
        );
    }
    route
}
