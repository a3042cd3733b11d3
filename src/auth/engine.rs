//! Authorization decision for one inbound request.

use std::net::SocketAddr;

use axum::http::{HeaderMap, Uri};

use super::extract::first_token;
use crate::domain::ServiceDescriptor;

/// What to do with services whose manifest has no `auth` block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnauthenticatedPolicy {
    /// Refuse every request (fail closed).
    #[default]
    Deny,
    /// Forward without a token check.
    Allow,
}

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// The path resolved to no registered service.
    NoService,
    /// The service has no `auth` block and the policy is [`UnauthenticatedPolicy::Deny`].
    NoAuthConfig,
    /// None of the service's extraction methods produced a token.
    NoToken,
    /// A token was found but failed validation.
    InvalidToken,
    /// The service's auth configuration cannot be evaluated.
    Misconfigured(String),
}

/// Per-request outcome of the authentication pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthDecision {
    /// Whether the request may be forwarded.
    pub authorized: bool,
    /// The extracted token, if any.
    pub token: Option<String>,
    /// Value for the internal auth header on the forwarded request.
    pub enriched_header_value: Option<String>,
    /// Reason for refusal; `None` when authorized.
    pub denial: Option<Denial>,
}

impl AuthDecision {
    fn allow(token: Option<String>) -> Self {
        Self {
            authorized: true,
            enriched_header_value: token.clone(),
            token,
            denial: None,
        }
    }

    fn deny(denial: Denial, token: Option<String>) -> Self {
        Self {
            authorized: false,
            token,
            enriched_header_value: None,
            denial: Some(denial),
        }
    }
}

/// The parts of a request the auth pipeline reads.
#[derive(Debug, Clone, Copy)]
pub struct AuthRequest<'a> {
    /// Request headers.
    pub headers: &'a HeaderMap,
    /// Request URI (path and query).
    pub uri: &'a Uri,
    /// Client socket address, when known.
    pub client: Option<SocketAddr>,
    /// Route prefix the request resolved to; logged on denial.
    pub route: &'a str,
}

/// Stateless evaluator applying a service's compiled [`crate::auth::AuthPolicy`].
///
/// Reads only data cached on the [`ServiceDescriptor`] at discovery time, so
/// it never blocks on I/O and is safe to share across request tasks.
#[derive(Debug, Clone, Default)]
pub struct AuthEngine {
    unauthenticated: UnauthenticatedPolicy,
}

impl AuthEngine {
    /// Creates an engine with the given policy for services without `auth`.
    #[must_use]
    pub const fn new(unauthenticated: UnauthenticatedPolicy) -> Self {
        Self { unauthenticated }
    }

    /// Decides whether `request` may reach `service`.
    ///
    /// `service` is `None` when routing found nothing; such requests are
    /// always denied. Denials are logged with the route and client address,
    /// never with the token.
    #[must_use]
    pub fn authorize(
        &self,
        service: Option<&ServiceDescriptor>,
        request: &AuthRequest<'_>,
    ) -> AuthDecision {
        let decision = self.evaluate(service, request);
        if let Some(denial) = &decision.denial {
            let client = request
                .client
                .map_or_else(|| "unknown".to_string(), |addr| addr.to_string());
            match denial {
                Denial::Misconfigured(reason) => tracing::error!(
                    route = request.route,
                    %client,
                    reason = reason.as_str(),
                    "rejecting request: service auth configuration is invalid"
                ),
                other => tracing::warn!(
                    route = request.route,
                    %client,
                    reason = ?other,
                    "unauthorized access attempt"
                ),
            }
        }
        decision
    }

    fn evaluate(
        &self,
        service: Option<&ServiceDescriptor>,
        request: &AuthRequest<'_>,
    ) -> AuthDecision {
        let Some(service) = service else {
            return AuthDecision::deny(Denial::NoService, None);
        };

        let Some(policy) = service.auth() else {
            return match self.unauthenticated {
                UnauthenticatedPolicy::Allow => AuthDecision::allow(None),
                UnauthenticatedPolicy::Deny => AuthDecision::deny(Denial::NoAuthConfig, None),
            };
        };

        if let Some(reason) = policy.misconfiguration() {
            return AuthDecision::deny(Denial::Misconfigured(reason.to_string()), None);
        }

        let Some(token) = first_token(policy.methods(), request.headers, request.uri) else {
            return AuthDecision::deny(Denial::NoToken, None);
        };

        if policy.validator().accepts(&token) {
            AuthDecision::allow(Some(token))
        } else {
            AuthDecision::deny(Denial::InvalidToken, Some(token))
        }
    }
}
