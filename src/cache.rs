//! Watch-fed caches of route resources
//!
//! One kube-rs reflector per kind (Endpoints, Service, Ingress) mirrors the
//! labelled route objects of the proxy namespace. The watch tasks are the
//! only writers; readers go through [`ResourceCache`], which either looks
//! up a single object or hands out a point-in-time snapshot, never the live
//! map.

use std::fmt::Debug;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::api::Api;
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{info, trace, warn};

use crate::{Error, Result};

/// Kind name of the Endpoints cache
pub const KIND_ENDPOINTS: &str = "endpoints";
/// Kind name of the Service cache
pub const KIND_SERVICE: &str = "service";
/// Kind name of the Ingress cache
pub const KIND_INGRESS: &str = "ingress";

/// Read side of one reflector
pub struct ResourceCache<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    kind: &'static str,
    store: Store<K>,
}

impl<K> Clone for ResourceCache<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            store: self.store.clone(),
        }
    }
}

impl<K> ResourceCache<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    /// Wrap a reflector store
    pub fn new(kind: &'static str, store: Store<K>) -> Self {
        Self { kind, store }
    }

    /// Kind name used in logs and errors
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Whether `namespace/name` is currently in the cache
    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        self.get(namespace, name).is_some()
    }

    /// Look up `namespace/name`
    pub fn get(&self, namespace: &str, name: &str) -> Option<Arc<K>> {
        self.store.get(&ObjectRef::new(name).within(namespace))
    }

    /// Copy of the cache contents at this instant
    pub fn snapshot(&self) -> Vec<Arc<K>> {
        self.store.state()
    }

    /// Wait until the initial list of the watch has been applied
    pub async fn wait_until_ready(&self) -> Result<()> {
        self.store
            .wait_until_ready()
            .await
            .map_err(|_| Error::CacheNotReady { kind: self.kind })
    }
}

/// The three route caches and the watch tasks feeding them
pub struct RouteCaches {
    /// Endpoints cache
    pub endpoints: ResourceCache<Endpoints>,
    /// Service cache
    pub services: ResourceCache<Service>,
    /// Ingress cache
    pub ingresses: ResourceCache<Ingress>,
    watches: Vec<JoinHandle<()>>,
}

impl RouteCaches {
    /// Start watching route resources in `namespace` matching `label_selector`.
    ///
    /// The caches fill in the background; call [`RouteCaches::wait_until_ready`]
    /// before relying on their contents.
    pub fn start(client: Client, namespace: &str, label_selector: &str) -> Self {
        let (endpoints, endpoints_watch) = spawn_watch::<Endpoints>(
            Api::namespaced(client.clone(), namespace),
            KIND_ENDPOINTS,
            label_selector,
        );
        let (services, services_watch) = spawn_watch::<Service>(
            Api::namespaced(client.clone(), namespace),
            KIND_SERVICE,
            label_selector,
        );
        let (ingresses, ingresses_watch) = spawn_watch::<Ingress>(
            Api::namespaced(client, namespace),
            KIND_INGRESS,
            label_selector,
        );

        info!(
            namespace = %namespace,
            label_selector = %label_selector,
            "started route resource watches"
        );

        Self {
            endpoints,
            services,
            ingresses,
            watches: vec![endpoints_watch, services_watch, ingresses_watch],
        }
    }

    /// Caches over stores fed by someone else (no background watches)
    pub fn from_stores(
        endpoints: Store<Endpoints>,
        services: Store<Service>,
        ingresses: Store<Ingress>,
    ) -> Self {
        Self {
            endpoints: ResourceCache::new(KIND_ENDPOINTS, endpoints),
            services: ResourceCache::new(KIND_SERVICE, services),
            ingresses: ResourceCache::new(KIND_INGRESS, ingresses),
            watches: Vec::new(),
        }
    }

    /// Wait until all three caches have completed their initial list
    pub async fn wait_until_ready(&self) -> Result<()> {
        self.endpoints.wait_until_ready().await?;
        self.services.wait_until_ready().await?;
        self.ingresses.wait_until_ready().await?;
        Ok(())
    }
}

impl Drop for RouteCaches {
    fn drop(&mut self) {
        for watch in &self.watches {
            watch.abort();
        }
    }
}

/// Spawn a reflector for `K` and return its read side and task handle
fn spawn_watch<K>(
    api: Api<K>,
    kind: &'static str,
    label_selector: &str,
) -> (ResourceCache<K>, JoinHandle<()>)
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    let (reader, writer) = reflector::store();
    let config = watcher::Config::default().labels(label_selector);

    let stream = watcher(api, config)
        .default_backoff()
        .reflect(writer)
        .applied_objects();

    let handle = tokio::spawn(async move {
        let mut stream = std::pin::pin!(stream);
        while let Some(event) = stream.next().await {
            match event {
                Ok(obj) => trace!(kind = %kind, name = %obj.name_any(), "cache updated"),
                Err(e) => warn!(kind = %kind, error = %e, "watch error, backing off"),
            }
        }
        warn!(kind = %kind, "watch stream ended");
    });

    (ResourceCache::new(kind, reader), handle)
}
