//! Public path prefix → service mapping with deterministic collision
//! resolution.
//!
//! A [`RouteTable`] is built in one pass over a registry snapshot and is
//! immutable afterwards. [`SharedRouteTable`] publishes the current table
//! and swaps in rebuilt ones atomically.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use super::ServiceDescriptor;

/// Paths served by the gateway itself. Services cannot claim them.
pub const RESERVED_PREFIXES: &[&str] = &[
    "/endpoints",
    "/test",
    "/health",
    "/services",
    "/routes",
    "/swagger-ui",
    "/api-docs",
];

/// One assigned route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct RouteEntry {
    /// Public path prefix.
    pub prefix: String,
    /// Name of the service behind it.
    pub service: String,
}

/// Result of resolving a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    /// The matched prefix.
    pub prefix: &'a str,
    /// Service the prefix is assigned to.
    pub service: &'a str,
    /// Request path with the prefix removed; always starts with `/`.
    pub remainder: &'a str,
}

/// Immutable route table for one registry snapshot.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    /// Builds the table from descriptors in registration order.
    ///
    /// Each service asks for its manifest route, or `/` + slug(name) when
    /// none is given. The first claimant keeps the bare prefix; later ones
    /// get `-1`, `-2`, ... appended.
    #[must_use]
    pub fn build<'a, I>(services: I) -> Self
    where
        I: IntoIterator<Item = &'a ServiceDescriptor>,
    {
        let mut builder = RouteTableBuilder::new();
        for service in services {
            let candidate = service
                .config()
                .route
                .clone()
                .unwrap_or_else(|| slug_route(service.name()));
            builder.claim(service.name(), &candidate);
        }
        builder.finish()
    }

    /// Returns the longest prefix matching `path` on a segment boundary.
    #[must_use]
    pub fn resolve<'a>(&'a self, path: &'a str) -> Option<RouteMatch<'a>> {
        self.entries
            .iter()
            .filter_map(|entry| {
                strip_route(&entry.prefix, path).map(|remainder| RouteMatch {
                    prefix: &entry.prefix,
                    service: &entry.service,
                    remainder,
                })
            })
            .max_by_key(|matched| matched.prefix.len())
    }

    /// Route assigned to `service`, if any.
    #[must_use]
    pub fn route_for(&self, service: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.service == service)
            .map(|entry| entry.prefix.as_str())
    }

    /// All entries in assignment order.
    #[must_use]
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Returns the number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table has no routes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Collision state for a single build pass.
#[derive(Debug)]
struct RouteTableBuilder {
    claimed: HashSet<String>,
    entries: Vec<RouteEntry>,
}

impl RouteTableBuilder {
    fn new() -> Self {
        Self {
            claimed: RESERVED_PREFIXES.iter().map(|p| (*p).to_string()).collect(),
            entries: Vec::new(),
        }
    }

    fn claim(&mut self, service: &str, candidate: &str) {
        let mut prefix = candidate.to_string();
        let mut counter: u32 = 1;
        while self.claimed.contains(&prefix) {
            prefix = format!("{candidate}-{counter}");
            counter = counter.saturating_add(1);
        }
        if prefix != candidate {
            tracing::warn!(
                service,
                requested = candidate,
                assigned = %prefix,
                "route conflict; assigned unique route"
            );
        } else {
            tracing::info!(service, route = %prefix, "configured route");
        }
        self.claimed.insert(prefix.clone());
        self.entries.push(RouteEntry {
            prefix,
            service: service.to_string(),
        });
    }

    fn finish(self) -> RouteTable {
        RouteTable {
            entries: self.entries,
        }
    }
}

/// Lower-cases `name` and replaces spaces with `-`.
#[must_use]
pub fn slugify(name: &str) -> String {
    name.trim().replace(' ', "-").to_lowercase()
}

fn slug_route(name: &str) -> String {
    format!("/{}", slugify(name))
}

/// Normalises a manifest route: forces a leading `/`, trims trailing `/`.
///
/// Returns `None` for an empty or whitespace-only route. `/` alone is kept.
#[must_use]
pub fn normalize_route(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let body = trimmed.trim_matches('/');
    Some(format!("/{body}"))
}

/// Strips `prefix` from `path` when it ends on a segment boundary.
fn strip_route<'a>(prefix: &str, path: &'a str) -> Option<&'a str> {
    if prefix == "/" {
        return path.starts_with('/').then_some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// The currently published [`RouteTable`].
///
/// Readers clone an `Arc` under a short read lock; a rebuild replaces the
/// whole `Arc`, so a request never observes a half-built table.
#[derive(Debug, Default)]
pub struct SharedRouteTable {
    current: RwLock<Arc<RouteTable>>,
}

impl SharedRouteTable {
    /// Publishes `table` as the initial table.
    #[must_use]
    pub fn new(table: RouteTable) -> Self {
        Self {
            current: RwLock::new(Arc::new(table)),
        }
    }

    /// Returns the current table.
    pub async fn snapshot(&self) -> Arc<RouteTable> {
        Arc::clone(&*self.current.read().await)
    }

    /// Replaces the current table, returning the previous one.
    pub async fn swap(&self, table: RouteTable) -> Arc<RouteTable> {
        let mut current = self.current.write().await;
        std::mem::replace(&mut *current, Arc::new(table))
    }
}
