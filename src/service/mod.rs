//! Service layer: discovery, process supervision and request dispatch.
//!
//! [`ServiceDiscovery`] walks the services root and hands each manifest to
//! the [`ProcessSupervisor`] before registering it. [`GatewayService`]
//! serves requests against the resulting registry, forwarding through the
//! [`UpstreamProxy`].

pub mod discovery;
pub mod gateway_service;
pub mod proxy;
pub mod supervisor;

pub use discovery::{DiscoveryReport, DiscoverySettings, FailedService, ServiceDiscovery};
pub use gateway_service::{GatewayService, ServiceSummary};
pub use proxy::UpstreamProxy;
pub use supervisor::{ProcessSupervisor, SupervisorSettings};
