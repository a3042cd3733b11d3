//! # polyglot-gateway
//!
//! API gateway fronting independently deployed services written in any
//! language.
//!
//! At startup the gateway walks a services directory, reads each
//! service's manifest, runs its setup script, launches its start command
//! under supervision and registers it. Every registered service gets a
//! unique public route prefix. Inbound requests are matched to a service,
//! checked against that service's token rules, and forwarded with the
//! accepted token in an internal header.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)
//!     │
//!     ├── Control handlers (api/)      /health /test /endpoints /services /routes
//!     ├── Gateway fallback (api/)
//!     │
//!     ├── GatewayService (service/)    RouteTable → AuthEngine → UpstreamProxy
//!     ├── AuthEngine (auth/)
//!     │
//!     ├── ServiceRegistry, RouteTable (domain/)
//!     │
//!     └── ServiceDiscovery → ProcessSupervisor (service/) → child processes
//! ```

pub mod api;
pub mod app_state;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
