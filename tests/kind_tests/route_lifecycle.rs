//! Stories about a hub adding and removing routes for user servers

use k8s_openapi::api::core::v1::{Endpoints, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::Api;
use serde_json::json;

use kube_ingress_proxy::{safe_name, RouteRecord};

use super::helpers::TestNamespace;

/// Story: a user server starts and the hub routes `/user/alice/` to it
#[tokio::test]
#[ignore = "requires a Kubernetes cluster"]
async fn story_route_is_live_after_add() {
    let ns = TestNamespace::create("proxy-add").await;
    let proxy = ns.proxy().await;
    let data = json!({"user": "alice"});

    proxy
        .add_route("/user/alice/", "http://10.244.0.10:8888", &data)
        .await
        .unwrap();

    let name = safe_name("/user/alice/");
    let endpoints: Api<Endpoints> = Api::namespaced(ns.client.clone(), &ns.name);
    let services: Api<Service> = Api::namespaced(ns.client.clone(), &ns.name);
    let ingresses: Api<Ingress> = Api::namespaced(ns.client.clone(), &ns.name);
    assert!(endpoints.get_opt(&name).await.unwrap().is_some());
    assert!(services.get_opt(&name).await.unwrap().is_some());
    assert!(ingresses.get_opt(&name).await.unwrap().is_some());

    let routes = proxy.get_all_routes();
    assert_eq!(
        routes.get("/user/alice/"),
        Some(&RouteRecord {
            routespec: "/user/alice/".to_string(),
            target: "http://10.244.0.10:8888".to_string(),
            data,
        })
    );

}

/// Story: the hub restarts and re-adds routes that already exist
#[tokio::test]
#[ignore = "requires a Kubernetes cluster"]
async fn story_readding_a_route_replaces_it() {
    let ns = TestNamespace::create("proxy-readd").await;
    let proxy = ns.proxy().await;

    proxy
        .add_route("/user/bob/", "http://10.244.0.11:8888", &json!({}))
        .await
        .unwrap();
    proxy
        .add_route("/user/bob/", "http://10.244.0.12:8888", &json!({"moved": true}))
        .await
        .unwrap();

    let ingresses: Api<Ingress> = Api::namespaced(ns.client.clone(), &ns.name);
    let list = ingresses.list(&Default::default()).await.unwrap();
    assert_eq!(list.items.len(), 1);

    // The cache catches up with the replace shortly after
    let mut target = None;
    for _ in 0..50 {
        target = proxy
            .get_all_routes()
            .get("/user/bob/")
            .map(|r| r.target.clone());
        if target.as_deref() == Some("http://10.244.0.12:8888") {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    assert_eq!(target.as_deref(), Some("http://10.244.0.12:8888"));

}

/// Story: a user server stops and the hub removes its route, twice
#[tokio::test]
#[ignore = "requires a Kubernetes cluster"]
async fn story_delete_is_idempotent() {
    let ns = TestNamespace::create("proxy-delete").await;
    let proxy = ns.proxy().await;

    proxy
        .add_route("/user/carol/", "http://10.244.0.13:8888", &json!({}))
        .await
        .unwrap();
    proxy.delete_route("/user/carol/").await.unwrap();
    proxy.delete_route("/user/carol/").await.unwrap();

    let name = safe_name("/user/carol/");
    let services: Api<Service> = Api::namespaced(ns.client.clone(), &ns.name);
    let ingresses: Api<Ingress> = Api::namespaced(ns.client.clone(), &ns.name);
    assert!(services.get_opt(&name).await.unwrap().is_none());
    assert!(ingresses.get_opt(&name).await.unwrap().is_none());

}
