//! Forwarding of authorized requests to upstream services.

use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use axum::response::Response;

use crate::auth::INTERNAL_AUTH_HEADER;
use crate::domain::ServiceDescriptor;
use crate::error::GatewayError;

/// Connection-scoped headers that must not cross the proxy.
const HOP_BY_HOP: &[HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// HTTP client forwarding requests to a service's upstream.
#[derive(Debug, Clone)]
pub struct UpstreamProxy {
    client: reqwest::Client,
    default_upstream: String,
}

impl UpstreamProxy {
    /// Creates a proxy with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if the HTTP client cannot be built.
    pub fn new(default_upstream: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            default_upstream: default_upstream.to_string(),
        })
    }

    /// Full upstream URL for a request whose route prefix was stripped.
    #[must_use]
    pub fn upstream_url(
        &self,
        service: &ServiceDescriptor,
        remainder: &str,
        query: Option<&str>,
    ) -> String {
        let base = service
            .config()
            .upstream
            .as_deref()
            .unwrap_or(&self.default_upstream)
            .trim_end_matches('/');
        match query {
            Some(q) if !q.is_empty() => format!("{base}{remainder}?{q}"),
            _ => format!("{base}{remainder}"),
        }
    }

    /// Sends the request upstream and relays the response.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if the internal token cannot
    /// be sent as a header, and [`GatewayError::UpstreamUnavailable`] or
    /// [`GatewayError::UpstreamTimeout`] when the upstream cannot answer.
    pub async fn forward(
        &self,
        service: &ServiceDescriptor,
        remainder: &str,
        parts: &Parts,
        body: Bytes,
        internal_token: Option<&str>,
    ) -> Result<Response, GatewayError> {
        let url = self.upstream_url(service, remainder, parts.uri.query());
        let headers = outbound_headers(&parts.headers, internal_token)?;
        tracing::debug!(service = service.name(), %url, method = %parts.method, "forwarding request");

        let upstream = self
            .client
            .request(parts.method.clone(), &url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = upstream.status();
        let mut response_headers = upstream.headers().clone();
        strip_hop_by_hop(&mut response_headers);
        response_headers.remove(header::CONTENT_LENGTH);
        let bytes = upstream.bytes().await?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

/// Builds the header set sent upstream.
///
/// Client headers pass through except hop-by-hop headers, `Host`, and any
/// client-supplied internal auth header. The gateway's own internal auth
/// value is added when the request was authorized with a token.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] if `internal_token` is not a
/// valid header value. The request must not be forwarded without it.
pub fn outbound_headers(
    incoming: &HeaderMap,
    internal_token: Option<&str>,
) -> Result<HeaderMap, GatewayError> {
    let mut headers = incoming.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(INTERNAL_AUTH_HEADER);

    if let Some(token) = internal_token {
        let value = HeaderValue::from_bytes(token.as_bytes()).map_err(|_| {
            GatewayError::InvalidRequest("token cannot be forwarded as a header".to_string())
        })?;
        headers.insert(INTERNAL_AUTH_HEADER, value);
    }
    Ok(headers)
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named in `Connection` are hop-by-hop too.
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named.iter().chain(HOP_BY_HOP) {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}
