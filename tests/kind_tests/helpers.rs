//! Shared helpers for cluster tests

use std::sync::Once;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;

use kube_ingress_proxy::config::ProxyConfig;
use kube_ingress_proxy::KubeIngressProxy;

static CRYPTO: Once = Once::new();

fn install_crypto_provider() {
    CRYPTO.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

/// A namespace that exists for the duration of one test, deleted on drop
pub struct TestNamespace {
    pub client: Client,
    pub name: String,
}

impl TestNamespace {
    pub async fn create(prefix: &str) -> Self {
        install_crypto_provider();
        let client = Client::try_default()
            .await
            .expect("kubeconfig should point at a test cluster");

        let name = format!("{}-{}", prefix, std::process::id());
        let api: Api<Namespace> = Api::all(client.clone());
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                ..Default::default()
            },
            ..Default::default()
        };
        api.create(&PostParams::default(), &ns)
            .await
            .expect("failed to create test namespace");

        Self { client, name }
    }

    pub async fn proxy(&self) -> KubeIngressProxy {
        let config = ProxyConfig {
            namespace: Some(self.name.clone()),
            component_label: "kind-test".to_string(),
            confirm_timeout_secs: 30,
            ..Default::default()
        };
        KubeIngressProxy::initialize(&config)
            .await
            .expect("proxy should initialize against the test cluster")
    }

}

/// Deletes the namespace when the test ends, including when it panics.
///
/// Runs on its own thread and runtime: the test's runtime is no longer
/// driven while the test future is being dropped.
impl Drop for TestNamespace {
    fn drop(&mut self) {
        let name = self.name.clone();
        let cleanup = std::thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    eprintln!("cannot clean up namespace {}: {}", name, e);
                    return;
                }
            };
            runtime.block_on(async {
                let client = match Client::try_default().await {
                    Ok(client) => client,
                    Err(e) => {
                        eprintln!("cannot clean up namespace {}: {}", name, e);
                        return;
                    }
                };
                let api: Api<Namespace> = Api::all(client);
                if let Err(e) = api.delete(&name, &DeleteParams::default()).await {
                    eprintln!("failed to delete namespace {}: {}", name, e);
                }
            });
        });
        let _ = cleanup.join();
    }
}
