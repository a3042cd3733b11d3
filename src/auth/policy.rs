//! Manifest `auth` block and its compiled, request-ready form.

use regex::Regex;
use serde::Deserialize;
use subtle::ConstantTimeEq;

/// A named place to look for a candidate token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ExtractionMethod {
    /// `Authorization: Bearer <token>`.
    HeaderBearer,
    /// `X-Auth-Token: <token>`.
    CustomHeader,
    /// `?auth_token=<token>`.
    QueryParam,
    /// `.../token/<token>/...` in the request path.
    PathSegment,
    /// A method name the gateway does not know. Never yields a token.
    Unknown(String),
}

impl From<String> for ExtractionMethod {
    fn from(name: String) -> Self {
        match name.as_str() {
            "header_bearer" => Self::HeaderBearer,
            "custom_header" => Self::CustomHeader,
            "query_param" => Self::QueryParam,
            "path_segment" => Self::PathSegment,
            _ => Self::Unknown(name),
        }
    }
}

/// The rule an extracted token must satisfy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ValidationStrategy {
    /// Token equals `expected_token`.
    #[default]
    ExactMatch,
    /// Token starts with `expected_token`.
    Prefix,
    /// Token fully matches `token_regex`.
    Regex,
    /// Token has three non-empty dot-separated segments.
    ///
    /// No signature or expiry verification is performed: this is a
    /// structural check only and must not be relied on as real JWT
    /// authentication.
    Jwt,
    /// A strategy name the gateway does not know. Always denies.
    Unknown(String),
}

impl From<String> for ValidationStrategy {
    fn from(name: String) -> Self {
        match name.as_str() {
            "exact_match" => Self::ExactMatch,
            "prefix" => Self::Prefix,
            "regex" => Self::Regex,
            "jwt" => Self::Jwt,
            _ => Self::Unknown(name),
        }
    }
}

/// The `auth` block of a service manifest, as written.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Extraction methods, tried in the listed order.
    #[serde(
        default = "default_extraction_methods",
        alias = "supportedExtractionMethods"
    )]
    pub supported_extraction_methods: Vec<ExtractionMethod>,

    /// Validation strategy. Defaults to `exact_match`.
    #[serde(default, alias = "validationStrategy")]
    pub validation_strategy: ValidationStrategy,

    /// Reference token for `exact_match` and `prefix`.
    #[serde(default, alias = "expectedToken")]
    pub expected_token: String,

    /// Pattern for `regex`.
    #[serde(default, alias = "tokenRegex")]
    pub token_regex: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            supported_extraction_methods: default_extraction_methods(),
            validation_strategy: ValidationStrategy::default(),
            expected_token: String::new(),
            token_regex: String::new(),
        }
    }
}

fn default_extraction_methods() -> Vec<ExtractionMethod> {
    vec![
        ExtractionMethod::HeaderBearer,
        ExtractionMethod::CustomHeader,
        ExtractionMethod::QueryParam,
        ExtractionMethod::PathSegment,
    ]
}

/// Validation rule with everything precomputed.
#[derive(Debug, Clone)]
pub enum TokenValidator {
    /// Constant-time equality with the expected token.
    ExactMatch(String),
    /// Prefix match against the expected token.
    Prefix(String),
    /// Anchored whole-string regex match.
    Regex(Regex),
    /// Structural three-segment check.
    Jwt,
    /// The configuration cannot be evaluated; every token is rejected.
    Misconfigured(String),
}

impl TokenValidator {
    /// Returns `true` if `token` satisfies this rule.
    #[must_use]
    pub fn accepts(&self, token: &str) -> bool {
        match self {
            Self::ExactMatch(expected) => constant_time_eq(token, expected),
            Self::Prefix(expected) => token.starts_with(expected.as_str()),
            Self::Regex(pattern) => pattern.is_match(token),
            Self::Jwt => is_jwt_shaped(token),
            Self::Misconfigured(_) => false,
        }
    }
}

/// A service's authentication rules, compiled once at discovery.
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    methods: Vec<ExtractionMethod>,
    validator: TokenValidator,
}

impl AuthPolicy {
    /// Compiles a manifest `auth` block.
    ///
    /// Never fails: problems (unknown strategy, invalid or empty pattern,
    /// empty reference token) produce [`TokenValidator::Misconfigured`],
    /// which denies every request to the service.
    #[must_use]
    pub fn compile(config: &AuthConfig) -> Self {
        let mut methods: Vec<ExtractionMethod> =
            Vec::with_capacity(config.supported_extraction_methods.len());
        for method in &config.supported_extraction_methods {
            if !methods.contains(method) {
                methods.push(method.clone());
            }
        }

        let validator = match &config.validation_strategy {
            ValidationStrategy::ExactMatch | ValidationStrategy::Prefix
                if config.expected_token.is_empty() =>
            {
                TokenValidator::Misconfigured("expected_token is empty".to_string())
            }
            ValidationStrategy::ExactMatch => {
                TokenValidator::ExactMatch(config.expected_token.clone())
            }
            ValidationStrategy::Prefix => TokenValidator::Prefix(config.expected_token.clone()),
            ValidationStrategy::Regex if config.token_regex.is_empty() => {
                TokenValidator::Misconfigured("token_regex is empty".to_string())
            }
            ValidationStrategy::Regex => match Regex::new(&format!("^(?:{})$", config.token_regex))
            {
                Ok(pattern) => TokenValidator::Regex(pattern),
                Err(err) => TokenValidator::Misconfigured(format!("invalid token_regex: {err}")),
            },
            ValidationStrategy::Jwt => TokenValidator::Jwt,
            ValidationStrategy::Unknown(name) => {
                TokenValidator::Misconfigured(format!("unknown validation strategy {name:?}"))
            }
        };

        Self { methods, validator }
    }

    /// Extraction methods in evaluation order, without duplicates.
    #[must_use]
    pub fn methods(&self) -> &[ExtractionMethod] {
        &self.methods
    }

    /// The compiled validation rule.
    #[must_use]
    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Describes the configuration problem, if any.
    #[must_use]
    pub fn misconfiguration(&self) -> Option<&str> {
        match &self.validator {
            TokenValidator::Misconfigured(reason) => Some(reason),
            _ => None,
        }
    }

    /// Names of listed extraction methods the gateway does not know.
    pub fn unknown_methods(&self) -> impl Iterator<Item = &str> {
        self.methods.iter().filter_map(|m| match m {
            ExtractionMethod::Unknown(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

/// Compares two strings without short-circuiting on the first mismatch.
///
/// Both inputs are padded to the longer length with different fill bytes so
/// neither the content nor the length leaks through timing.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let len = a.len().max(b.len());
    let a_padded: Vec<u8> = a.bytes().chain(std::iter::repeat(0x00)).take(len).collect();
    let b_padded: Vec<u8> = b.bytes().chain(std::iter::repeat(0xFF)).take(len).collect();

    let lengths_equal = a.len().ct_eq(&b.len());
    let contents_equal = a_padded.as_slice().ct_eq(b_padded.as_slice());
    (lengths_equal & contents_equal).into()
}

fn is_jwt_shaped(token: &str) -> bool {
    token.split('.').count() == 3 && token.split('.').all(|s| !s.is_empty())
}
