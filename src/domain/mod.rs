//! Domain layer: service manifests, runtime descriptors, the service
//! registry, and the route table.
//!
//! Manifests are parsed once into immutable [`ServiceConfig`] values.
//! Each registered service is tracked by a [`ServiceDescriptor`] held in
//! the [`ServiceRegistry`], from which the [`RouteTable`] is derived.

pub mod descriptor;
pub mod manifest;
pub mod route_table;
pub mod service_registry;

pub use descriptor::{ProcessStatus, ServiceDescriptor, ServiceState};
pub use manifest::{ServiceConfig, VolumeSpec};
pub use route_table::{RouteEntry, RouteMatch, RouteTable, SharedRouteTable};
pub use service_registry::ServiceRegistry;
