//! Cluster API access for route resources
//!
//! The reconciler only needs three verbs per resource kind. They sit behind
//! [`ResourceClient`] so tests can stand in for the API server; status codes
//! are left on the returned `kube::Error` for the caller to classify.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[cfg(test)]
use mockall::automock;

/// Create, replace and delete for one namespaced resource kind
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceClient<K: Send + Sync + 'static>: Send + Sync {
    /// Create `body` in `namespace`; fails with 409 if it already exists
    async fn create(&self, namespace: &str, body: &K) -> Result<K, kube::Error>;

    /// Replace the object `name` in `namespace` with `body`
    async fn replace(&self, namespace: &str, name: &str, body: &K) -> Result<K, kube::Error>;

    /// Delete `name` in `namespace` immediately; fails with 404 if it is absent
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error>;
}

/// [`ResourceClient`] backed by the real cluster API
#[derive(Clone)]
pub struct KubeResourceClient {
    client: Client,
}

impl KubeResourceClient {
    /// Create a new KubeResourceClient wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<K> ResourceClient<K> for KubeResourceClient
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
{
    async fn create(&self, namespace: &str, body: &K) -> Result<K, kube::Error> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), body).await
    }

    async fn replace(&self, namespace: &str, name: &str, body: &K) -> Result<K, kube::Error> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.replace(name, &PostParams::default(), body).await
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default().grace_period(0))
            .await
            .map(|_| ())
    }
}

/// One client per route resource kind
#[derive(Clone)]
pub struct RouteClients {
    /// Endpoints client
    pub endpoints: Arc<dyn ResourceClient<Endpoints>>,
    /// Service client
    pub services: Arc<dyn ResourceClient<Service>>,
    /// Ingress client
    pub ingresses: Arc<dyn ResourceClient<Ingress>>,
}

impl RouteClients {
    /// Clients for all three kinds talking to the cluster behind `client`
    pub fn kube(client: Client) -> Self {
        let kube = Arc::new(KubeResourceClient::new(client));
        Self {
            endpoints: kube.clone(),
            services: kube.clone(),
            ingresses: kube,
        }
    }
}
