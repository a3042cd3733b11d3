//! Per-request authentication pipeline.
//!
//! A service's manifest names the places a token may be found
//! ([`ExtractionMethod`]) and the rule it must satisfy
//! ([`ValidationStrategy`]). Both are compiled once into an [`AuthPolicy`]
//! at discovery time; the [`AuthEngine`] then evaluates every inbound
//! request against the matched service's policy without touching storage.

pub mod engine;
pub mod extract;
pub mod policy;

pub use engine::{AuthDecision, AuthEngine, AuthRequest, Denial, UnauthenticatedPolicy};
pub use policy::{AuthConfig, AuthPolicy, ExtractionMethod, TokenValidator, ValidationStrategy};

/// Header the gateway sets on forwarded requests after a successful check.
///
/// Any client-supplied value is discarded before forwarding, so upstream
/// services can trust it originated from the gateway.
pub const INTERNAL_AUTH_HEADER: &str = "x-internal-auth-token";
