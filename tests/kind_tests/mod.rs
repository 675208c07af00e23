//! Route lifecycle tests against a live cluster
//!
//! - `route_lifecycle`: add, replace, list and delete routes and check the
//!   resulting Endpoints, Services and Ingresses through the API server

mod helpers;
mod route_lifecycle;
