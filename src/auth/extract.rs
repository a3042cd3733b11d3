//! Candidate token lookup, one function per [`ExtractionMethod`].

use axum::extract::Query;
use axum::http::{HeaderMap, HeaderValue, Uri, header};

use super::ExtractionMethod;

const BEARER_PREFIX: &str = "Bearer ";
const CUSTOM_HEADER: &str = "x-auth-token";
const QUERY_PARAM: &str = "auth_token";
const PATH_MARKER: &str = "/token/";

/// Runs `methods` in order and returns the first usable candidate.
///
/// A candidate is usable when it is non-empty and can be carried in the
/// internal auth header; anything else counts as no token for that method.
#[must_use]
pub fn first_token(methods: &[ExtractionMethod], headers: &HeaderMap, uri: &Uri) -> Option<String> {
    methods
        .iter()
        .find_map(|method| extract(method, headers, uri).filter(|token| is_forwardable(token)))
}

fn is_forwardable(token: &str) -> bool {
    !token.is_empty() && HeaderValue::from_str(token).is_ok()
}

/// Looks up a candidate token using a single method.
#[must_use]
pub fn extract(method: &ExtractionMethod, headers: &HeaderMap, uri: &Uri) -> Option<String> {
    match method {
        ExtractionMethod::HeaderBearer => from_bearer_header(headers),
        ExtractionMethod::CustomHeader => from_custom_header(headers),
        ExtractionMethod::QueryParam => from_query(uri),
        ExtractionMethod::PathSegment => from_path(uri.path()),
        ExtractionMethod::Unknown(_) => None,
    }
}

fn from_bearer_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix(BEARER_PREFIX)
        .map(str::to_string)
}

fn from_custom_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CUSTOM_HEADER)?
        .to_str()
        .ok()
        .map(str::to_string)
}

fn from_query(uri: &Uri) -> Option<String> {
    let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(uri).ok()?;
    pairs
        .into_iter()
        .find(|(key, _)| key == QUERY_PARAM)
        .map(|(_, value)| value)
}

fn from_path(path: &str) -> Option<String> {
    let (_, rest) = path.split_once(PATH_MARKER)?;
    rest.split('/').next().map(str::to_string)
}
