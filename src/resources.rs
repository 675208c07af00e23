//! Route resource construction
//!
//! Turns a route into the three objects that realize it in the cluster:
//!
//! - `Endpoints` pointing at the backend address (only when the target host
//!   is an IP literal; a selector-less Service needs it to route anywhere)
//! - `Service` in front of the endpoints, or of type `ExternalName` when
//!   the target is a hostname
//! - `Ingress` sending the routespec's host/path to that Service
//!
//! The full route record travels in annotations on the Ingress so the route
//! table can be rebuilt from the watch cache alone.

use std::collections::BTreeMap;
use std::net::IpAddr;

use http::Uri;
use k8s_openapi::api::core::v1::{
    EndpointAddress, EndpointPort, EndpointSubset, Endpoints, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, ANNOTATION_DATA, ANNOTATION_ROUTESPEC, ANNOTATION_TARGET};

/// A route as seen by the owning proxy framework
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteRecord {
    /// Routespec the route was added with
    pub routespec: String,
    /// Backend address, e.g. `http://10.0.0.1:8000`
    pub target: String,
    /// Opaque payload stored alongside the route
    pub data: serde_json::Value,
}

impl RouteRecord {
    /// Rebuild a route from the annotations on its Ingress.
    ///
    /// Returns `None` if any annotation is missing or the data annotation
    /// is not JSON.
    pub fn from_ingress(ingress: &Ingress) -> Option<Self> {
        let annotations = ingress.metadata.annotations.as_ref()?;
        let routespec = annotations.get(ANNOTATION_ROUTESPEC)?;
        let target = annotations.get(ANNOTATION_TARGET)?;
        let data = serde_json::from_str(annotations.get(ANNOTATION_DATA)?).ok()?;
        Some(Self {
            routespec: routespec.clone(),
            target: target.clone(),
            data,
        })
    }
}

/// The objects realizing one route
#[derive(Clone, Debug)]
pub struct RouteResources {
    /// Endpoints, absent when the target is not an IP address
    pub endpoints: Option<Endpoints>,
    /// Service the ingress points at
    pub service: Service,
    /// Ingress rule for the routespec
    pub ingress: Ingress,
}

/// Backend host and port parsed from a route target
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendAddress {
    /// Host name or IP literal (without IPv6 brackets)
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl BackendAddress {
    /// Parse a target URL such as `http://10.0.0.1:8000`.
    ///
    /// The port defaults from the scheme (80 for http, 443 for https).
    pub fn parse(target: &str) -> Result<Self> {
        let uri: Uri = target
            .parse()
            .map_err(|e| Error::invalid_target(target, format!("{}", e)))?;

        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::invalid_target(target, "missing host"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');

        let port = match (uri.port_u16(), uri.scheme_str()) {
            (Some(port), _) => port,
            (None, Some("http")) => 80,
            (None, Some("https")) => 443,
            (None, _) => return Err(Error::invalid_target(target, "missing port")),
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// The host as an IP address, if it is one
    pub fn ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }
}

/// Split a routespec into the Ingress host and path.
///
/// `/user/alice/` has no host; `hub.example.com/user/alice/` routes on host
/// `hub.example.com` with path `/user/alice/`.
pub fn split_routespec(routespec: &str) -> (Option<&str>, String) {
    if routespec.starts_with('/') {
        return (None, routespec.to_string());
    }
    match routespec.split_once('/') {
        Some((host, path)) => (Some(host), format!("/{}", path)),
        None => (Some(routespec), "/".to_string()),
    }
}

/// Build the Endpoints, Service and Ingress for a route.
pub fn build_route_resources(
    name: &str,
    routespec: &str,
    target: &str,
    labels: &BTreeMap<String, String>,
    data: &serde_json::Value,
) -> Result<RouteResources> {
    let backend = BackendAddress::parse(target)?;
    let port = i32::from(backend.port);

    let metadata = ObjectMeta {
        name: Some(name.to_string()),
        labels: Some(labels.clone()),
        annotations: Some(BTreeMap::from([
            (ANNOTATION_DATA.to_string(), serde_json::to_string(data)?),
            (ANNOTATION_ROUTESPEC.to_string(), routespec.to_string()),
            (ANNOTATION_TARGET.to_string(), target.to_string()),
        ])),
        ..Default::default()
    };

    let service_port = ServicePort {
        port,
        target_port: Some(IntOrString::Int(port)),
        ..Default::default()
    };

    let (endpoints, service_spec) = match backend.ip() {
        Some(ip) => {
            let endpoints = Endpoints {
                metadata: metadata.clone(),
                subsets: Some(vec![EndpointSubset {
                    addresses: Some(vec![EndpointAddress {
                        ip: ip.to_string(),
                        ..Default::default()
                    }]),
                    ports: Some(vec![EndpointPort {
                        port,
                        ..Default::default()
                    }]),
                    ..Default::default()
                }]),
            };
            let spec = ServiceSpec {
                type_: Some("ClusterIP".to_string()),
                ports: Some(vec![service_port]),
                ..Default::default()
            };
            (Some(endpoints), spec)
        }
        None => {
            let spec = ServiceSpec {
                type_: Some("ExternalName".to_string()),
                external_name: Some(backend.host.clone()),
                ports: Some(vec![service_port]),
                ..Default::default()
            };
            (None, spec)
        }
    };

    let service = Service {
        metadata: metadata.clone(),
        spec: Some(service_spec),
        ..Default::default()
    };

    let (host, path) = split_routespec(routespec);
    let ingress = Ingress {
        metadata,
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                host: host.map(str::to_string),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some(path),
                        path_type: "ImplementationSpecific".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: name.to_string(),
                                port: Some(ServiceBackendPort {
                                    number: Some(port),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };

    Ok(RouteResources {
        endpoints,
        service,
        ingress,
    })
}
